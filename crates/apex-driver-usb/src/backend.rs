//! libusb access to the boards through `rusb`.

use std::time::Duration;

use apex_core::error::{ApexError, Result};
use apex_core::limits::{ABXXXX_VENDOR_ID, USB_VENDOR_IN, USB_VENDOR_OUT};
use apex_core::usb::ControlTransfer;
use rusb::{Context, Device, DeviceHandle, UsbContext};

/// Timeout of a single vendor request.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(1);

fn board_name(product_id: u16) -> String {
    format!("AB{:04X}", product_id)
}

/// Boards with the given product id, in bus order.
pub fn find(product_id: u16) -> Result<Vec<Device<Context>>> {
    let context = Context::new().map_err(|e| ApexError::Communication(format!("libusb: {}", e)))?;
    let devices = context
        .devices()
        .map_err(|e| ApexError::Communication(format!("libusb: {}", e)))?;
    Ok(devices
        .iter()
        .filter(|device| {
            device
                .device_descriptor()
                .map(|d| d.vendor_id() == ABXXXX_VENDOR_ID && d.product_id() == product_id)
                .unwrap_or(false)
        })
        .collect())
}

/// Open board.
pub struct UsbBoard {
    handle: DeviceHandle<Context>,
    timeout: Duration,
}

impl UsbBoard {
    /// Open the `handle`-th board with `product_id`.
    pub fn open(product_id: u16, handle: usize) -> Result<Self> {
        let name = board_name(product_id);
        let devices = find(product_id)?;
        if devices.is_empty() {
            return Err(ApexError::NoEquipmentFound(name));
        }
        let device = devices.get(handle).ok_or(ApexError::BadHandle(handle))?;
        let usb = device
            .open()
            .map_err(|e| ApexError::Communication(format!("{} #{}: {}", name, handle, e)))?;
        usb.set_active_configuration(1)
            .map_err(|e| ApexError::Communication(format!("{} #{}: {}", name, handle, e)))?;
        tracing::info!(board = %name, handle, "Connected to USB board");
        Ok(Self {
            handle: usb,
            timeout: CONTROL_TIMEOUT,
        })
    }

    /// Change the vendor request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ControlTransfer for UsbBoard {
    fn write_control(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<usize> {
        self.handle
            .write_control(USB_VENDOR_OUT, request, value, index, data, self.timeout)
            .map_err(|e| {
                tracing::debug!(request, error = %e, "vendor OUT request failed");
                ApexError::ControlWrite(request)
            })
    }

    fn read_control(&mut self, request: u8, value: u16, index: u16, buf: &mut [u8]) -> Result<usize> {
        self.handle
            .read_control(USB_VENDOR_IN, request, value, index, buf, self.timeout)
            .map_err(|e| {
                tracing::debug!(request, error = %e, "vendor IN request failed");
                ApexError::ControlRead(request)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_name() {
        assert_eq!(board_name(0x3380), "AB3380");
        assert_eq!(board_name(0x3510), "AB3510");
    }
}
