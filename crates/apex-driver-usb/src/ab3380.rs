//! AB3380 dual tunable filter board.
//!
//! Each of the two filters is driven by a 16-bit DAC and a band switch. The
//! calibration record in the board EEPROM maps wavelengths to DAC values;
//! until it has been loaded the nominal table of [`Ab3380Eeprom::default`] is
//! kept but [`Ab3380::set_wavelength`] does nothing.
//!
//! USB transfers are blocking. [`Ab3380Filter`] exposes one filter as a
//! [`WavelengthTunable`] and moves each transfer to the blocking pool.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result as AnyResult};
use apex_core::capabilities::WavelengthTunable;
use apex_core::error::{ApexError, Result};
use apex_core::limits::{ABXXXX_VENDOR_ID, AB3380_EEPROM_SIZE, AB3380_PRODUCT_ID, AB3380_VOLTAGE_MAX};
use apex_core::usb::{self, ab3380, ControlTransfer};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::eeprom::Ab3380Eeprom;

#[derive(Debug)]
struct Calibration {
    record: Ab3380Eeprom,
    loaded: bool,
}

/// AB3380 board.
pub struct Ab3380 {
    dev: Mutex<Box<dyn ControlTransfer>>,
    calibration: Mutex<Calibration>,
}

fn filter_index(filter: u8) -> Result<usize> {
    match filter {
        1 | 2 => Ok(usize::from(filter - 1)),
        _ => Err(ApexError::argument_value("Filter")),
    }
}

impl Ab3380 {
    /// Board behind `dev`, with the nominal calibration table.
    pub fn new(dev: Box<dyn ControlTransfer>) -> Self {
        Self {
            dev: Mutex::new(dev),
            calibration: Mutex::new(Calibration {
                record: Ab3380Eeprom::default(),
                loaded: false,
            }),
        }
    }

    /// Board behind `dev` with its calibration loaded from the EEPROM.
    pub fn open(dev: Box<dyn ControlTransfer>) -> Result<Self> {
        let board = Self::new(dev);
        if !board.load_calibration()? {
            tracing::warn!("AB3380 EEPROM does not hold a valid calibration record");
        }
        Ok(board)
    }

    /// Open the `handle`-th AB3380 connected to the host.
    #[cfg(feature = "usb")]
    pub fn open_usb(handle: usize) -> Result<Self> {
        let dev = crate::backend::UsbBoard::open(AB3380_PRODUCT_ID, handle)?;
        Self::open(Box::new(dev))
    }

    /// USB vendor and product ids.
    pub fn id(&self) -> (u16, u16) {
        (ABXXXX_VENDOR_ID, AB3380_PRODUCT_ID)
    }

    /// Reset both filters.
    pub fn reset(&self) -> Result<()> {
        usb::command(&mut **self.dev.lock(), ab3380::VR_RESET_ALL, 0)
    }

    /// Write a raw DAC value to `filter` (1 or 2).
    pub fn set_voltage(&self, voltage: u32, filter: u8) -> Result<()> {
        let index = filter_index(filter)?;
        if voltage > AB3380_VOLTAGE_MAX {
            return Err(ApexError::argument_value("Voltage"));
        }
        let value = u16::try_from(voltage).map_err(|_| ApexError::argument_value("Voltage"))?;
        let request = [ab3380::VR_SET_VOLTAGE1, ab3380::VR_SET_VOLTAGE2][index];
        tracing::debug!(filter, voltage, "AB3380 set voltage");
        usb::command(&mut **self.dev.lock(), request, value)
    }

    /// Set the band switch of `filter` (1 or 2).
    pub fn set_switch(&self, on: bool, filter: u8) -> Result<()> {
        let index = filter_index(filter)?;
        let request = [ab3380::VR_SET_SWITCH1, ab3380::VR_SET_SWITCH2][index];
        usb::command(&mut **self.dev.lock(), request, u16::from(on))
    }

    /// Write raw bytes to the EEPROM.
    pub fn set_eeprom_data(&self, data: &[u8]) -> Result<()> {
        let len = u16::try_from(data.len()).map_err(|_| ApexError::argument_value("Data"))?;
        let request = ab3380::VR_SET_EEPROM_PARAMETERS;
        let written = self
            .dev
            .lock()
            .write_control(request, len, 0, data)
            .map_err(|_| ApexError::ControlWrite(request))?;
        if written != data.len() {
            tracing::warn!(expected = data.len(), written, "short EEPROM write");
            return Err(ApexError::ControlWrite(request));
        }
        Ok(())
    }

    /// Read `n` raw bytes from the EEPROM.
    pub fn eeprom_data(&self, n: usize) -> Result<Vec<u8>> {
        let len = u16::try_from(n).map_err(|_| ApexError::argument_value("BytesNumber"))?;
        usb::read_exact(&mut **self.dev.lock(), ab3380::VR_GET_EEPROM_PARAMETERS, len, n)
    }

    /// Read the calibration record from the EEPROM.
    ///
    /// The record replaces the current table in every case; the return value
    /// tells whether it is valid.
    pub fn load_calibration(&self) -> Result<bool> {
        let data = self.eeprom_data(AB3380_EEPROM_SIZE)?;
        let record = Ab3380Eeprom::decode(&data)?;
        let valid = record.is_valid();
        tracing::info!(serial = %record.serial, version = %record.version_string(), valid, "AB3380 calibration loaded");
        *self.calibration.lock() = Calibration { record, loaded: valid };
        Ok(valid)
    }

    /// Write the current calibration table to the EEPROM.
    pub fn store_calibration(&self) -> Result<()> {
        let data = self.calibration.lock().record.encode()?;
        self.set_eeprom_data(&data)
    }

    /// Current calibration table.
    pub fn calibration(&self) -> Ab3380Eeprom {
        self.calibration.lock().record.clone()
    }

    /// Replace the calibration table. It is used by
    /// [`Ab3380::set_wavelength`] only when valid.
    pub fn set_calibration(&self, record: Ab3380Eeprom) {
        let loaded = record.is_valid();
        *self.calibration.lock() = Calibration { record, loaded };
    }

    /// Whether a valid calibration table is in use.
    pub fn is_calibrated(&self) -> bool {
        self.calibration.lock().loaded
    }

    /// Tune `filter` (1 or 2) to `nm`.
    ///
    /// Without a valid calibration table nothing is sent. An interpolated
    /// DAC value outside `0..=65535` is rejected.
    pub fn set_wavelength(&self, nm: f64, filter: u8) -> Result<()> {
        let index = filter_index(filter)?;
        let setting = {
            let calibration = self.calibration.lock();
            if !calibration.loaded {
                tracing::warn!(filter, nm, "AB3380 not calibrated, wavelength ignored");
                return Ok(());
            }
            calibration.record.setting_for(nm, index)?
        };
        let voltage = u32::try_from(setting.dac).map_err(|_| ApexError::argument_value("Wavelength"))?;
        if voltage > AB3380_VOLTAGE_MAX {
            return Err(ApexError::argument_value("Wavelength"));
        }
        self.set_switch(setting.switch, filter)?;
        self.set_voltage(voltage, filter)
    }
}

impl fmt::Debug for Ab3380 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ab3380")
            .field("calibrated", &self.is_calibrated())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Ab3380Filter - WavelengthTunable wrapper
// =============================================================================

/// One filter of a shared [`Ab3380`].
#[derive(Debug)]
pub struct Ab3380Filter {
    board: Arc<Ab3380>,
    filter: u8,
    wavelength: Mutex<Option<f64>>,
}

impl Ab3380Filter {
    /// Filter `filter` (1 or 2) of `board`.
    pub fn new(board: Arc<Ab3380>, filter: u8) -> Result<Self> {
        filter_index(filter)?;
        Ok(Self {
            board,
            filter,
            wavelength: Mutex::new(None),
        })
    }

    /// Filter number.
    pub fn filter(&self) -> u8 {
        self.filter
    }
}

#[async_trait]
impl WavelengthTunable for Ab3380Filter {
    async fn set_wavelength(&self, wavelength_nm: f64) -> AnyResult<()> {
        let board = Arc::clone(&self.board);
        let filter = self.filter;
        let applied = tokio::task::spawn_blocking(move || -> Result<bool> {
            board.set_wavelength(wavelength_nm, filter)?;
            Ok(board.is_calibrated())
        })
        .await
        .map_err(|e| anyhow!("Task join error: {}", e))??;
        // An uncalibrated board ignores the request; keep reporting what was applied.
        if applied {
            *self.wavelength.lock() = Some(wavelength_nm);
        }
        Ok(())
    }

    async fn get_wavelength(&self) -> AnyResult<f64> {
        (*self.wavelength.lock()).ok_or_else(|| anyhow!("AB3380 filter {} wavelength not set", self.filter))
    }

    fn wavelength_range(&self) -> (f64, f64) {
        let record = self.board.calibration();
        let first = record.wavelengths.first().copied().unwrap_or(0.0);
        let last = record.wavelengths.last().copied().unwrap_or(0.0);
        (first, last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_driver_mock::MockAb3380;
    use tracing_test::traced_test;

    fn calibrated() -> (Ab3380, Arc<parking_lot::Mutex<apex_driver_mock::usb_board::Ab3380State>>) {
        let mock = MockAb3380::with_eeprom(Ab3380Eeprom::default().encode().unwrap());
        let state = mock.state();
        (Ab3380::open(Box::new(mock)).unwrap(), state)
    }

    #[test]
    fn test_voltage_and_switch() {
        let mock = MockAb3380::new();
        let state = mock.state();
        let board = Ab3380::new(Box::new(mock));

        board.set_voltage(40000, 2).unwrap();
        board.set_switch(true, 1).unwrap();
        assert_eq!(state.lock().voltage, [0, 40000]);
        assert_eq!(state.lock().switch, [true, false]);

        assert!(matches!(board.set_voltage(70000, 1), Err(ApexError::ArgumentValue(_))));
        assert!(board.set_switch(true, 3).is_err());

        board.reset().unwrap();
        assert_eq!(state.lock().resets, 1);
        assert_eq!(state.lock().voltage, [0, 0]);
        assert_eq!(board.id(), (0x04B4, 0x3380));
    }

    #[test]
    #[traced_test]
    fn test_blank_eeprom_disables_tuning() {
        let mock = MockAb3380::new();
        let state = mock.state();
        let board = Ab3380::open(Box::new(mock)).unwrap();
        assert!(!board.is_calibrated());

        board.set_wavelength(1550.0, 1).unwrap();
        assert!(logs_contain("wavelength ignored"));
        let s = state.lock();
        assert_eq!(s.requests.len(), 1);
        assert_eq!(s.requests[0], (ab3380::VR_GET_EEPROM_PARAMETERS, 1200));
    }

    #[test]
    fn test_set_wavelength_from_calibration() {
        let (board, state) = calibrated();
        assert!(board.is_calibrated());
        assert_eq!(board.calibration().serial, "XX-3380-A-XXXXXX");

        // sqrt(4) * 15000 on the nominal table, slightly less once interpolated.
        board.set_wavelength(1550.0, 1).unwrap();
        let s = state.lock().clone();
        assert!(s.switch[0]);
        assert!((29_000..=30_100).contains(&s.voltage[0]), "voltage {}", s.voltage[0]);

        board.set_wavelength(1540.0, 2).unwrap();
        let s = state.lock().clone();
        assert!(!s.switch[1]);
        assert!(s.voltage[1] > 30_000);
    }

    #[test]
    fn test_out_of_range_voltage_rejected() {
        let (board, state) = calibrated();
        let mut record = board.calibration();
        record.dac[0] = record.dac[0].iter().map(|v| v * 10.0).collect();
        board.set_calibration(record);
        assert!(matches!(board.set_wavelength(1559.0, 1), Err(ApexError::ArgumentValue(_))));
        assert_eq!(state.lock().voltage, [0, 0]);
    }

    #[test]
    fn test_store_calibration() {
        let mock = MockAb3380::new();
        let state = mock.state();
        let board = Ab3380::new(Box::new(mock));
        board.store_calibration().unwrap();
        assert_eq!(&state.lock().eeprom[..7], b"XX-3380");
        assert!(board.load_calibration().unwrap());
        assert_eq!(board.eeprom_data(4).unwrap(), b"XX-3".to_vec());
    }

    #[test]
    fn test_transfer_failures() {
        let board = Ab3380::new(Box::new(MockAb3380::new().failing_on(ab3380::VR_SET_EEPROM_PARAMETERS)));
        assert!(matches!(board.store_calibration(), Err(ApexError::ControlWrite(0xB5))));

        let board = Ab3380::new(Box::new(MockAb3380::new().failing_on(ab3380::VR_GET_EEPROM_PARAMETERS)));
        assert!(matches!(board.load_calibration(), Err(ApexError::ControlRead(0xB6))));
    }

    #[tokio::test]
    async fn test_filter_capability() {
        let (board, state) = calibrated();
        let filter = Ab3380Filter::new(Arc::new(board), 2).unwrap();
        assert!(filter.get_wavelength().await.is_err());
        filter.set_wavelength(1555.0).await.unwrap();
        assert_eq!(filter.get_wavelength().await.unwrap(), 1555.0);
        assert!(state.lock().switch[1]);
        assert_eq!(filter.wavelength_range().0, 1530.0);
        assert!(Ab3380Filter::new(filter.board.clone(), 0).is_err());
    }

    #[tokio::test]
    async fn test_uncalibrated_filter_reports_no_wavelength() {
        let mock = MockAb3380::new();
        let state = mock.state();
        let board = Arc::new(Ab3380::open(Box::new(mock)).unwrap());
        let filter = Ab3380Filter::new(board, 1).unwrap();

        filter.set_wavelength(1550.0).await.unwrap();
        assert!(filter.get_wavelength().await.is_err());
        let s = state.lock();
        assert_eq!(s.voltage, [0, 0]);
        assert_eq!(s.requests.len(), 1);
    }
}
