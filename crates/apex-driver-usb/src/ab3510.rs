//! AB3510 quad photodetector board.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result as AnyResult};
use apex_core::capabilities::Readable;
use apex_core::error::{ApexError, Result};
use apex_core::limits::{ABXXXX_VENDOR_ID, AB3510_CHANNELS, AB3510_PRODUCT_ID};
use apex_core::usb::{self, ab3510, ControlTransfer};
use async_trait::async_trait;
use parking_lot::Mutex;

/// AB3510 board.
pub struct Ab3510 {
    dev: Mutex<Box<dyn ControlTransfer>>,
}

impl Ab3510 {
    /// Board behind `dev`.
    pub fn new(dev: Box<dyn ControlTransfer>) -> Self {
        Self { dev: Mutex::new(dev) }
    }

    /// Open the `handle`-th AB3510 connected to the host.
    #[cfg(feature = "usb")]
    pub fn open_usb(handle: usize) -> Result<Self> {
        let dev = crate::backend::UsbBoard::open(AB3510_PRODUCT_ID, handle)?;
        Ok(Self::new(Box::new(dev)))
    }

    /// USB vendor and product ids.
    pub fn id(&self) -> (u16, u16) {
        (ABXXXX_VENDOR_ID, AB3510_PRODUCT_ID)
    }

    /// Reset the board.
    pub fn reset(&self) -> Result<()> {
        usb::command(&mut **self.dev.lock(), ab3510::VR_RESET_ALL, 0)
    }

    /// Board temperature in °C.
    ///
    /// The sensor word is big-endian with 12 significant bits and a
    /// 0.0625 °C resolution.
    pub fn temperature(&self) -> Result<f64> {
        let word = usb::read_exact(&mut **self.dev.lock(), ab3510::VR_GET_TEMPERATURE, 0, 2)?;
        let raw = f64::from(word[0]) * 256.0 + f64::from(word[1]);
        Ok(raw / 16.0 * 0.0625)
    }

    /// One 14-bit sample of each channel.
    pub fn sample(&self) -> Result<[u16; AB3510_CHANNELS]> {
        let data = usb::read_exact(&mut **self.dev.lock(), ab3510::VR_GET_SAMPLE, 0, AB3510_CHANNELS * 2)?;
        let mut samples = [0u16; AB3510_CHANNELS];
        for (sample, word) in samples.iter_mut().zip(data.chunks_exact(2)) {
            *sample = u16::from_le_bytes([word[0], word[1]]) / 4;
        }
        Ok(samples)
    }

    /// Write the EEPROM parameters.
    pub fn set_eeprom_parameters(&self, data: &[u8]) -> Result<()> {
        let len = u16::try_from(data.len()).map_err(|_| ApexError::argument_value("Data"))?;
        let request = ab3510::VR_SET_EEPROM_PARAMETERS;
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

    /// Read `n` bytes of EEPROM parameters.
    pub fn eeprom_parameters(&self, n: usize) -> Result<Vec<u8>> {
        let len = u16::try_from(n).map_err(|_| ApexError::argument_value("BytesNumber"))?;
        usb::read_exact(&mut **self.dev.lock(), ab3510::VR_GET_EEPROM_PARAMETERS, len, n)
    }
}

impl fmt::Debug for Ab3510 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ab3510").finish_non_exhaustive()
    }
}

// =============================================================================
// Ab3510Sensor - Readable wrapper
// =============================================================================

/// Value reported by an [`Ab3510Sensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ab3510Source {
    /// Board temperature, °C
    Temperature,
    /// Raw sample of a channel (1..=4)
    Channel(u8),
}

/// Readable view of a shared [`Ab3510`].
#[derive(Debug, Clone)]
pub struct Ab3510Sensor {
    board: Arc<Ab3510>,
    source: Ab3510Source,
}

impl Ab3510Sensor {
    /// Sensor reading `source` on `board`.
    pub fn new(board: Arc<Ab3510>, source: Ab3510Source) -> Result<Self> {
        if let Ab3510Source::Channel(ch) = source {
            if ch == 0 || usize::from(ch) > AB3510_CHANNELS {
                return Err(ApexError::argument_value("Channel"));
            }
        }
        Ok(Self { board, source })
    }

    fn read_blocking(&self) -> Result<f64> {
        match self.source {
            Ab3510Source::Temperature => self.board.temperature(),
            Ab3510Source::Channel(ch) => Ok(f64::from(self.board.sample()?[usize::from(ch) - 1])),
        }
    }
}

#[async_trait]
impl Readable for Ab3510Sensor {
    async fn read(&self) -> AnyResult<f64> {
        let sensor = self.clone();
        let value = tokio::task::spawn_blocking(move || sensor.read_blocking())
            .await
            .map_err(|e| anyhow!("Task join error: {}", e))??;
        Ok(value)
    }
}
