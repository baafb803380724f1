//! Capability traits implemented by the instrument drivers.
//!
//! Drivers expose their full vendor API as inherent methods. The traits here
//! are the narrow, uniform surface used by the device registry and the CLI:
//! anything that measures a scalar is [`Readable`], every laser is
//! [`WavelengthTunable`] and [`EmissionControl`].

use anyhow::Result;
use async_trait::async_trait;

/// Capability: Scalar Readout
///
/// Devices that produce single scalar values (power meters, polarimeters,
/// thermal chambers).
///
/// # Contract
/// - `read()` performs a measurement and returns the value
/// - Units follow the driver's current unit setting (dBm or mW for power, °C for temperature)
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read current value
    async fn read(&self) -> Result<f64>;
}

/// Capability: Wavelength Tuning
///
/// Lasers, filters and detectors with a settable wavelength.
///
/// # Contract
/// - Wavelength is in nanometers (nm)
/// - Out-of-range values are clamped or rejected according to the module
#[async_trait]
pub trait WavelengthTunable: Send + Sync {
    /// Set wavelength in nm
    async fn set_wavelength(&self, wavelength_nm: f64) -> Result<()>;

    /// Current wavelength in nm
    async fn get_wavelength(&self) -> Result<f64>;

    /// (min_nm, max_nm) tuning range
    fn wavelength_range(&self) -> (f64, f64);
}

/// Capability: Emission Control
///
/// Laser sources with a switchable output.
#[async_trait]
pub trait EmissionControl: Send + Sync {
    /// Switch the optical output on
    async fn enable_emission(&self) -> Result<()>;

    /// Switch the optical output off
    async fn disable_emission(&self) -> Result<()>;

    /// Output state
    async fn is_emission_enabled(&self) -> Result<bool>;
}
