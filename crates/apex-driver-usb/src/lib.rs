//! Apex AB3380 and AB3510 USB board drivers.
//!
//! Both boards are driven by vendor control requests on endpoint 0 through
//! the [`ControlTransfer`](apex_core::usb::ControlTransfer) seam. Real boards
//! are reached through libusb with the `usb` feature; tests and simulations
//! plug in the in-memory boards of `apex-driver-mock`.
//!
//! - [`Ab3380`]: dual tunable filter with an EEPROM calibration table
//! - [`Ab3510`]: quad photodetector with a temperature sensor

pub mod ab3380;
pub mod ab3510;
#[cfg(feature = "usb")]
pub mod backend;
pub mod eeprom;
pub mod factory;

pub use ab3380::{Ab3380, Ab3380Filter};
pub use ab3510::{Ab3510, Ab3510Sensor, Ab3510Source};
pub use eeprom::{Ab3380Eeprom, FilterSetting};
pub use factory::{Ab3380Config, Ab3380Factory, Ab3510Config, Ab3510Factory};

/// Force the linker to include this crate.
///
/// Call this function from main() to ensure the driver factories are linked
/// into the final binary and not stripped by the linker.
#[inline(never)]
pub fn link() {
    std::hint::black_box(std::any::TypeId::of::<Ab3380Factory>());
    std::hint::black_box(std::any::TypeId::of::<Ab3510Factory>());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_does_not_panic() {
        link();
    }
}
