//! Core types for Apex Technologies instrument drivers.
//!
//! - [`error`]: the [`ApexError`] type and the vendor error-code table
//! - [`transport`]: TCP/serial links and the [`Connection`] command handle
//! - [`protocol`]: command formatting and reply parsing
//! - [`units`]: dBm/mW, nm/GHz and dB/% conversions
//! - [`identity`]: `VENDOR/MODEL/SERIAL/VERSION` decoding
//! - [`limits`]: module codes and hard limits
//! - [`usb`]: the control-transfer seam of the USB boards
//! - [`capabilities`] and [`driver`]: the seam used by the device registry

pub mod capabilities;
pub mod driver;
pub mod error;
pub mod identity;
pub mod limits;
pub mod protocol;
pub mod transport;
pub mod units;
pub mod usb;

pub use error::{ApexError, Result};
pub use identity::Identity;
pub use transport::Connection;
pub use units::{AttenuationUnit, PowerUnit, SpectralUnit};

/// Log a clamped argument and return the value actually used.
///
/// Every module clamps soft limits the same way: the request is corrected and
/// a warning names the quantity and the bound.
pub fn clamp_with_warning(what: &str, unit: &str, value: f64, range: limits::BandRange) -> f64 {
    let (clamped, changed) = range.clamp(value);
    if changed {
        if clamped <= range.min {
            tracing::warn!(requested = value, "{} is set to its minimum value: {} {}", what, clamped, unit);
        } else {
            tracing::warn!(requested = value, "{} is set to its maximum value: {} {}", what, clamped, unit);
        }
    }
    clamped
}
