//! AB3380 calibration record stored in the board EEPROM.
//!
//! Little-endian layout:
//!
//! | offset | type         | content                                  |
//! |--------|--------------|------------------------------------------|
//! | 0      | `[u8; 20]`   | serial number, NUL padded                |
//! | 20     | `i16, i16`   | record version (major, minor)            |
//! | 24     | `f32, f32`   | band transition of each filter, pm       |
//! | 32     | `[f32; 97]`  | calibration wavelengths, pm              |
//! | 420    | `[f32; 97]`  | DAC values of filter 1                   |
//! | 808    | `[f32; 97]`  | DAC values of filter 2                   |

use apex_core::error::{ApexError, Result};
use apex_core::limits::AB3380_PTS_NB;
use bytes::{Buf, BufMut, BytesMut};

const SERIAL_LEN: usize = 20;

/// Encoded length of a record.
pub const RECORD_LEN: usize = SERIAL_LEN + 4 + 8 + AB3380_PTS_NB * 12;

/// DAC value and band switch driving one filter to a wavelength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSetting {
    /// Band switch state
    pub switch: bool,
    /// Interpolated DAC value, may be outside the DAC range
    pub dac: i64,
}

/// Decoded AB3380 calibration record.
#[derive(Debug, Clone, PartialEq)]
pub struct Ab3380Eeprom {
    /// Board serial number
    pub serial: String,
    /// Record version (major, minor)
    pub version: (i16, i16),
    /// Wavelength above which each filter switches band, nm
    pub transitions: [f64; 2],
    /// Calibration wavelengths in nm, ascending
    pub wavelengths: Vec<f64>,
    /// DAC values of each filter at the calibration wavelengths
    pub dac: [Vec<f64>; 2],
}

impl Default for Ab3380Eeprom {
    /// Nominal table used until the EEPROM has been read.
    fn default() -> Self {
        let transitions = [1546.0, 1546.0];
        let wavelengths: Vec<f64> = (0..AB3380_PTS_NB)
            .map(|i| 1530.0 + 30.0 * i as f64 / AB3380_PTS_NB as f64)
            .collect();
        let dac = transitions.map(|t| wavelengths.iter().map(|wl| (wl - t).abs().sqrt() * 15000.0).collect());
        Self {
            serial: "XX-3380-A-XXXXXX".to_string(),
            version: (0, 0),
            transitions,
            wavelengths,
            dac,
        }
    }
}

impl Ab3380Eeprom {
    /// Decode a record read from the board.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < RECORD_LEN {
            return Err(ApexError::argument_value("EEPROM record"));
        }
        let mut buf = data;

        let serial = buf[..SERIAL_LEN - 1]
            .iter()
            .filter(|&&c| c != 0)
            .map(|&c| c as char)
            .collect();
        buf.advance(SERIAL_LEN);

        let version = (buf.get_i16_le(), buf.get_i16_le());
        let transitions = [
            f64::from(buf.get_f32_le()) / 1000.0,
            f64::from(buf.get_f32_le()) / 1000.0,
        ];
        let wavelengths = (0..AB3380_PTS_NB)
            .map(|_| f64::from(buf.get_f32_le()) / 1000.0)
            .collect();
        let dac_table = |buf: &mut &[u8]| -> Vec<f64> {
            (0..AB3380_PTS_NB).map(|_| f64::from(buf.get_f32_le()).trunc()).collect()
        };
        let dac = [dac_table(&mut buf), dac_table(&mut buf)];

        Ok(Self {
            serial,
            version,
            transitions,
            wavelengths,
            dac,
        })
    }

    /// Encode the record for the board. Tables must hold one value per
    /// calibration point.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.wavelengths.len() != AB3380_PTS_NB {
            return Err(ApexError::argument_value("Wavelength table"));
        }
        if self.dac.iter().any(|t| t.len() != AB3380_PTS_NB) {
            return Err(ApexError::argument_value("DAC table"));
        }

        let mut buf = BytesMut::with_capacity(RECORD_LEN);
        let mut serial = [0u8; SERIAL_LEN];
        for (dst, src) in serial.iter_mut().zip(self.serial.bytes()) {
            *dst = src;
        }
        buf.put_slice(&serial);
        buf.put_i16_le(self.version.0);
        buf.put_i16_le(self.version.1);
        for t in self.transitions {
            buf.put_f32_le((t * 1000.0) as f32);
        }
        for wl in &self.wavelengths {
            buf.put_f32_le((wl * 1000.0) as f32);
        }
        for table in &self.dac {
            for v in table {
                buf.put_f32_le(*v as f32);
            }
        }
        Ok(buf.to_vec())
    }

    /// Version as written on the board label, `major.minor`.
    pub fn version_string(&self) -> String {
        format!("{}.{}", self.version.0, self.version.1)
    }

    /// A record is usable when it belongs to an AB3380 and has version 0.0.
    pub fn is_valid(&self) -> bool {
        self.serial.contains("3380") && self.version == (0, 0)
    }

    /// Switch state and DAC value for `nm` on filter index `filter` (0 or 1).
    ///
    /// The DAC value is linearly interpolated between the calibration point
    /// nearest to `nm` and its neighbour below.
    pub fn setting_for(&self, nm: f64, filter: usize) -> Result<FilterSetting> {
        let dac = self.dac.get(filter).ok_or_else(|| ApexError::argument_value("Filter"))?;
        let n = self.wavelengths.len().min(dac.len());
        if n < 2 {
            return Err(ApexError::VariableNotDefined("Wavelength".into()));
        }

        let mut index = 0;
        let mut best = f64::INFINITY;
        for (i, wl) in self.wavelengths[..n].iter().enumerate() {
            let err = (wl - nm).powi(2);
            if err < best {
                best = err;
                index = i;
            }
        }
        if self.wavelengths[index] < nm {
            index += 1;
        }
        let index = index.clamp(1, n - 1);

        let dwl = self.wavelengths[index] - self.wavelengths[index - 1];
        if dwl == 0.0 {
            return Err(ApexError::argument_value("Wavelength"));
        }
        let c1 = (dac[index] - dac[index - 1]) / dwl;
        let c0 = dac[index] - self.wavelengths[index] * c1;

        Ok(FilterSetting {
            switch: nm > self.transitions[filter],
            dac: (nm * c1 + c0).trunc() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let record = Ab3380Eeprom::default();
        assert_eq!(record.wavelengths.len(), AB3380_PTS_NB);
        assert_eq!(record.wavelengths[0], 1530.0);
        assert!(record.wavelengths[AB3380_PTS_NB - 1] < 1560.0);
        assert_eq!(record.version_string(), "0.0");
        assert!(record.is_valid());
        assert_eq!(RECORD_LEN, 1196);
    }

    #[test]
    fn test_encoded_layout() {
        let record = Ab3380Eeprom::default();
        let data = record.encode().unwrap();
        assert_eq!(data.len(), RECORD_LEN);
        assert_eq!(&data[..16], b"XX-3380-A-XXXXXX");
        assert_eq!(&data[16..24], &[0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(f32::from_le_bytes([data[24], data[25], data[26], data[27]]), 1_546_000.0);
        assert_eq!(f32::from_le_bytes([data[32], data[33], data[34], data[35]]), 1_530_000.0);
    }

    #[test]
    fn test_decode_truncates_dac_and_checks_version() {
        let mut record = Ab3380Eeprom::default();
        record.version = (1, 2);
        let decoded = Ab3380Eeprom::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded.serial, "XX-3380-A-XXXXXX");
        assert_eq!(decoded.version_string(), "1.2");
        assert!(!decoded.is_valid());
        assert_eq!(decoded.transitions, [1546.0, 1546.0]);
        assert!((decoded.wavelengths[50] - record.wavelengths[50]).abs() < 1e-3);
        assert!(decoded.dac[1].iter().all(|v| v.fract() == 0.0));
        assert_eq!(decoded.dac[0][0], record.dac[0][0].trunc());

        assert!(Ab3380Eeprom::decode(&[0u8; 100]).is_err());
        record.wavelengths.pop();
        assert!(record.encode().is_err());
    }

    #[test]
    fn test_blank_eeprom_is_invalid() {
        let decoded = Ab3380Eeprom::decode(&[0u8; 1200]).unwrap();
        assert!(decoded.serial.is_empty());
        assert!(!decoded.is_valid());
    }

    #[test]
    fn test_setting_interpolates() {
        let mut record = Ab3380Eeprom::default();
        record.wavelengths = (0..AB3380_PTS_NB).map(|i| 1500.0 + i as f64).collect();
        record.dac[0] = (0..AB3380_PTS_NB).map(|i| 1000.0 * i as f64).collect();
        record.transitions[0] = 1540.0;

        let s = record.setting_for(1510.25, 0).unwrap();
        assert_eq!(s, FilterSetting { switch: false, dac: 10250 });

        let s = record.setting_for(1550.0, 0).unwrap();
        assert_eq!(s, FilterSetting { switch: true, dac: 50000 });

        // Outside the table the end segments are extrapolated.
        assert_eq!(record.setting_for(1499.0, 0).unwrap().dac, -1000);
        assert_eq!(record.setting_for(1700.0, 0).unwrap().dac, 200_000);
        assert!(record.setting_for(1550.0, 2).is_err());
    }
}
