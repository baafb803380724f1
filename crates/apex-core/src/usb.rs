//! Vendor control transfers on endpoint 0.
//!
//! The AB3380 and AB3510 boards are driven exclusively through vendor
//! requests. [`ControlTransfer`] is the seam between the board drivers and
//! the USB stack: the `rusb` backend implements it for real hardware, the
//! mock crate implements it in memory.

use crate::error::{ApexError, Result};

/// Host-to-device and device-to-host vendor requests on endpoint 0.
pub trait ControlTransfer: Send {
    /// Vendor OUT request (`bmRequestType = 0x40`). Returns the bytes written.
    fn write_control(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<usize>;

    /// Vendor IN request (`bmRequestType = 0xC0`). Returns the bytes read into `buf`.
    fn read_control(&mut self, request: u8, value: u16, index: u16, buf: &mut [u8]) -> Result<usize>;
}

impl<T: ControlTransfer + ?Sized> ControlTransfer for Box<T> {
    fn write_control(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<usize> {
        (**self).write_control(request, value, index, data)
    }

    fn read_control(&mut self, request: u8, value: u16, index: u16, buf: &mut [u8]) -> Result<usize> {
        (**self).read_control(request, value, index, buf)
    }
}

/// AB3380 vendor requests.
pub mod ab3380 {
    /// Reset every output of the board.
    pub const VR_RESET_ALL: u8 = 0xB0;
    /// DAC value of filter 1.
    pub const VR_SET_VOLTAGE1: u8 = 0xB1;
    /// DAC value of filter 2.
    pub const VR_SET_VOLTAGE2: u8 = 0xB2;
    /// Band switch of filter 1.
    pub const VR_SET_SWITCH1: u8 = 0xB3;
    /// Band switch of filter 2.
    pub const VR_SET_SWITCH2: u8 = 0xB4;
    /// Write the EEPROM record.
    pub const VR_SET_EEPROM_PARAMETERS: u8 = 0xB5;
    /// Read the EEPROM record.
    pub const VR_GET_EEPROM_PARAMETERS: u8 = 0xB6;
}

/// AB3510 vendor requests.
pub mod ab3510 {
    /// Reset the board.
    pub const VR_RESET_ALL: u8 = 0xB0;
    /// Two-byte temperature word.
    pub const VR_GET_TEMPERATURE: u8 = 0xB1;
    /// Eight-byte sample of the four channels.
    pub const VR_GET_SAMPLE: u8 = 0xB2;
    /// Write the EEPROM parameters.
    pub const VR_SET_EEPROM_PARAMETERS: u8 = 0xB5;
    /// Read the EEPROM parameters.
    pub const VR_GET_EEPROM_PARAMETERS: u8 = 0xB6;
}

/// Vendor OUT request without data stage.
pub fn command(dev: &mut dyn ControlTransfer, request: u8, value: u16) -> Result<()> {
    dev.write_control(request, value, 0, &[])
        .map(|_| ())
        .map_err(|e| control_error(e, ApexError::ControlWrite(request)))
}

/// Vendor IN request expecting exactly `len` bytes.
pub fn read_exact(dev: &mut dyn ControlTransfer, request: u8, value: u16, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let read = dev
        .read_control(request, value, 0, &mut buf)
        .map_err(|e| control_error(e, ApexError::ControlRead(request)))?;
    if read != len {
        tracing::warn!(request, expected = len, read, "short control read");
        return Err(ApexError::ControlRead(request));
    }
    Ok(buf)
}

fn control_error(source: ApexError, mapped: ApexError) -> ApexError {
    tracing::debug!(error = %source, "control transfer failed");
    match source {
        e @ (ApexError::ControlRead(_) | ApexError::ControlWrite(_)) => e,
        _ => mapped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Loopback {
        last: Vec<u8>,
    }

    impl ControlTransfer for Loopback {
        fn write_control(&mut self, _request: u8, _value: u16, _index: u16, data: &[u8]) -> Result<usize> {
            self.last = data.to_vec();
            Ok(data.len())
        }

        fn read_control(&mut self, request: u8, _value: u16, _index: u16, buf: &mut [u8]) -> Result<usize> {
            if request == 0xFF {
                return Err(ApexError::Communication("usb".into()));
            }
            let n = buf.len().min(self.last.len());
            buf[..n].copy_from_slice(&self.last[..n]);
            Ok(n)
        }
    }

    #[test]
    fn test_short_read_is_control_error() {
        let mut dev = Loopback { last: vec![1, 2] };
        let err = read_exact(&mut dev, 0xB1, 0, 4).unwrap_err();
        assert_eq!(err.code(), crate::error::EP0_READ_ERROR);
        assert_eq!(read_exact(&mut dev, 0xB1, 0, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_backend_error_is_mapped() {
        let mut dev = Loopback { last: vec![] };
        let err = read_exact(&mut dev, 0xFF, 0, 1).unwrap_err();
        assert!(matches!(err, ApexError::ControlRead(0xFF)));
        command(&mut dev, ab3380::VR_RESET_ALL, 0).unwrap();
    }
}
