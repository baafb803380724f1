//! In-memory AB3380 and AB3510 boards behind the [`ControlTransfer`] seam.
//!
//! Each mock keeps its state behind an `Arc` so a test can hand the mock to
//! a driver and still inspect what the driver wrote through the returned
//! handle.

use std::sync::Arc;

use apex_core::error::{ApexError, Result};
use apex_core::limits::{AB3380_EEPROM_SIZE, AB3510_CHANNELS};
use apex_core::usb::{ab3380, ab3510, ControlTransfer};
use parking_lot::Mutex;

use crate::rng::SimRng;

/// Simulated AB3510 temperature word (25 °C).
pub const SIMU_AB3510_TEMPERATURE_WORD: [u8; 2] = [0x19, 0x00];

/// Observable state of a simulated AB3380.
#[derive(Debug, Clone)]
pub struct Ab3380State {
    /// DAC value of each filter
    pub voltage: [u16; 2],
    /// Band switch of each filter
    pub switch: [bool; 2],
    /// EEPROM content
    pub eeprom: Vec<u8>,
    /// Number of reset requests
    pub resets: usize,
    /// Every request received as `(request, value)`
    pub requests: Vec<(u8, u16)>,
}

/// Simulated AB3380 dual filter board.
#[derive(Debug, Clone)]
pub struct MockAb3380 {
    state: Arc<Mutex<Ab3380State>>,
    failing: Option<u8>,
}

impl Default for MockAb3380 {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAb3380 {
    /// Board with a blank EEPROM.
    pub fn new() -> Self {
        Self::with_eeprom(vec![0; AB3380_EEPROM_SIZE])
    }

    /// Board with the given EEPROM content.
    pub fn with_eeprom(mut eeprom: Vec<u8>) -> Self {
        eeprom.resize(AB3380_EEPROM_SIZE, 0);
        Self {
            state: Arc::new(Mutex::new(Ab3380State {
                voltage: [0; 2],
                switch: [false; 2],
                eeprom,
                resets: 0,
                requests: Vec::new(),
            })),
            failing: None,
        }
    }

    /// Make every transfer of `request` fail.
    pub fn failing_on(mut self, request: u8) -> Self {
        self.failing = Some(request);
        self
    }

    /// Shared view of the board state.
    pub fn state(&self) -> Arc<Mutex<Ab3380State>> {
        Arc::clone(&self.state)
    }
}

impl ControlTransfer for MockAb3380 {
    fn write_control(&mut self, request: u8, value: u16, _index: u16, data: &[u8]) -> Result<usize> {
        if self.failing == Some(request) {
            return Err(ApexError::ControlWrite(request));
        }
        let mut s = self.state.lock();
        s.requests.push((request, value));
        match request {
            ab3380::VR_RESET_ALL => {
                s.resets += 1;
                s.voltage = [0; 2];
                s.switch = [false; 2];
            }
            ab3380::VR_SET_VOLTAGE1 => s.voltage[0] = value,
            ab3380::VR_SET_VOLTAGE2 => s.voltage[1] = value,
            ab3380::VR_SET_SWITCH1 => s.switch[0] = value != 0,
            ab3380::VR_SET_SWITCH2 => s.switch[1] = value != 0,
            ab3380::VR_SET_EEPROM_PARAMETERS => {
                let n = data.len().min(s.eeprom.len());
                s.eeprom[..n].copy_from_slice(&data[..n]);
            }
            _ => return Err(ApexError::ControlWrite(request)),
        }
        Ok(data.len())
    }

    fn read_control(&mut self, request: u8, value: u16, _index: u16, buf: &mut [u8]) -> Result<usize> {
        if self.failing == Some(request) {
            return Err(ApexError::ControlRead(request));
        }
        let mut s = self.state.lock();
        s.requests.push((request, value));
        match request {
            ab3380::VR_GET_EEPROM_PARAMETERS => {
                let n = buf.len().min(s.eeprom.len());
                buf[..n].copy_from_slice(&s.eeprom[..n]);
                Ok(n)
            }
            _ => Err(ApexError::ControlRead(request)),
        }
    }
}

/// Observable state of a simulated AB3510.
#[derive(Debug, Clone)]
pub struct Ab3510State {
    /// Raw temperature word
    pub temperature_word: [u8; 2],
    /// Fixed samples; random when `None`
    pub samples: Option<[u16; AB3510_CHANNELS]>,
    /// EEPROM content
    pub eeprom: Vec<u8>,
    /// Number of reset requests
    pub resets: usize,
    /// Bytes accepted per EEPROM write; all of them when `None`
    pub write_limit: Option<usize>,
}

/// Simulated AB3510 quad photodetector board.
#[derive(Debug, Clone)]
pub struct MockAb3510 {
    state: Arc<Mutex<Ab3510State>>,
    rng: Arc<SimRng>,
}

impl Default for MockAb3510 {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAb3510 {
    /// Board at 25 °C producing random samples.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(Ab3510State {
                temperature_word: SIMU_AB3510_TEMPERATURE_WORD,
                samples: None,
                eeprom: vec![0; 256],
                resets: 0,
                write_limit: None,
            })),
            rng: Arc::new(SimRng::new(None)),
        }
    }

    /// Fixed sample values (14 bit) instead of random ones.
    pub fn with_samples(self, samples: [u16; AB3510_CHANNELS]) -> Self {
        self.state.lock().samples = Some(samples);
        self
    }

    /// Raw temperature word as returned on the wire.
    pub fn with_temperature_word(self, word: [u8; 2]) -> Self {
        self.state.lock().temperature_word = word;
        self
    }

    /// Accept at most `n` bytes per EEPROM write.
    pub fn with_write_limit(self, n: usize) -> Self {
        self.state.lock().write_limit = Some(n);
        self
    }

    /// Shared view of the board state.
    pub fn state(&self) -> Arc<Mutex<Ab3510State>> {
        Arc::clone(&self.state)
    }
}

impl ControlTransfer for MockAb3510 {
    fn write_control(&mut self, request: u8, _value: u16, _index: u16, data: &[u8]) -> Result<usize> {
        let mut s = self.state.lock();
        match request {
            ab3510::VR_RESET_ALL => {
                s.resets += 1;
                Ok(data.len())
            }
            ab3510::VR_SET_EEPROM_PARAMETERS => {
                let n = s.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
                if s.eeprom.len() < n {
                    s.eeprom.resize(n, 0);
                }
                s.eeprom[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            _ => Err(ApexError::ControlWrite(request)),
        }
    }

    fn read_control(&mut self, request: u8, _value: u16, _index: u16, buf: &mut [u8]) -> Result<usize> {
        let s = self.state.lock();
        let reply: Vec<u8> = match request {
            ab3510::VR_GET_TEMPERATURE => s.temperature_word.to_vec(),
            ab3510::VR_GET_SAMPLE => {
                let samples = s.samples.unwrap_or_else(|| {
                    let mut random = [0u16; AB3510_CHANNELS];
                    for v in random.iter_mut() {
                        *v = self.rng.gen_range(0..16384);
                    }
                    random
                });
                samples.iter().flat_map(|v| (v * 4).to_le_bytes()).collect()
            }
            ab3510::VR_GET_EEPROM_PARAMETERS => s.eeprom.clone(),
            _ => return Err(ApexError::ControlRead(request)),
        };
        let n = buf.len().min(reply.len());
        buf[..n].copy_from_slice(&reply[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ab3380_records_requests() {
        let mut board = MockAb3380::new();
        let state = board.state();
        board.write_control(ab3380::VR_SET_VOLTAGE2, 1234, 0, &[]).unwrap();
        board.write_control(ab3380::VR_SET_SWITCH1, 1, 0, &[]).unwrap();
        let s = state.lock();
        assert_eq!(s.voltage, [0, 1234]);
        assert_eq!(s.switch, [true, false]);
        assert_eq!(s.requests.len(), 2);
    }

    #[test]
    fn test_ab3380_failure_injection() {
        let mut board = MockAb3380::new().failing_on(ab3380::VR_RESET_ALL);
        assert!(board.write_control(ab3380::VR_RESET_ALL, 0, 0, &[]).is_err());
    }

    #[test]
    fn test_ab3510_sample_encoding() {
        let mut board = MockAb3510::new().with_samples([1, 2, 3, 16383]);
        let mut buf = [0u8; 8];
        assert_eq!(board.read_control(ab3510::VR_GET_SAMPLE, 0, 0, &mut buf).unwrap(), 8);
        assert_eq!(&buf[..2], &[4, 0]);
        assert_eq!(u16::from_le_bytes([buf[6], buf[7]]), 16383 * 4);
    }
}
