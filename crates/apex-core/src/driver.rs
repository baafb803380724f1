//! Driver Factory and Component Types
//!
//! Drivers implement [`DriverFactory`] and are registered with the device
//! registry of the application at startup. A factory parses one
//! `[[instruments]]` entry of the configuration, connects to the instrument and
//! returns the capability trait objects it supports.
//!
//! # Example: Implementing a Driver Factory
//!
//! ```rust,ignore
//! use apex_core::driver::{Capability, DeviceComponents, DriverFactory};
//!
//! pub struct EtuveFactory;
//!
//! impl DriverFactory for EtuveFactory {
//!     fn driver_type(&self) -> &'static str { "etuve" }
//!     fn name(&self) -> &'static str { "Etuve XU Thermal Chamber" }
//!     fn capabilities(&self) -> &'static [Capability] { &[Capability::Readable] }
//!
//!     fn validate(&self, config: &toml::Value) -> anyhow::Result<()> {
//!         let _cfg: EtuveConfig = config.clone().try_into()?;
//!         Ok(())
//!     }
//!
//!     fn build(&self, config: toml::Value) -> BoxFuture<'static, anyhow::Result<DeviceComponents>> {
//!         Box::pin(async move {
//!             let cfg: EtuveConfig = config.try_into()?;
//!             let driver = Arc::new(Etuve::open(&cfg.port).await?);
//!             Ok(DeviceComponents::new().with_readable(driver))
//!         })
//!     }
//! }
//! ```

use crate::capabilities::{EmissionControl, Readable, WavelengthTunable};
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Capability Enum (Runtime Introspection)
// =============================================================================

/// Runtime capability flags for device introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Can read scalar values (power meters, polarimeters, thermal chambers)
    Readable,

    /// Has a settable wavelength (lasers, filters, power meters)
    WavelengthTunable,

    /// Has a switchable optical output (lasers)
    EmissionControl,
}

impl Capability {
    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Readable => "Readable",
            Capability::WavelengthTunable => "Wavelength Tunable",
            Capability::EmissionControl => "Emission Control",
        }
    }
}

// =============================================================================
// Device Components
// =============================================================================

/// Capability trait objects returned by a factory.
#[derive(Default, Clone)]
pub struct DeviceComponents {
    /// Readable implementation (scalar measurements)
    pub readable: Option<Arc<dyn Readable>>,

    /// WavelengthTunable implementation
    pub wavelength_tunable: Option<Arc<dyn WavelengthTunable>>,

    /// EmissionControl implementation (laser on/off)
    pub emission_control: Option<Arc<dyn EmissionControl>>,

    /// Identity string reported by the instrument
    pub identity: Option<String>,
}

impl std::fmt::Debug for DeviceComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceComponents")
            .field("capabilities", &self.capabilities())
            .field("identity", &self.identity)
            .finish()
    }
}

impl DeviceComponents {
    /// Empty component set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capabilities actually populated.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.readable.is_some() {
            caps.push(Capability::Readable);
        }
        if self.wavelength_tunable.is_some() {
            caps.push(Capability::WavelengthTunable);
        }
        if self.emission_control.is_some() {
            caps.push(Capability::EmissionControl);
        }
        caps
    }

    /// Set the readable component.
    pub fn with_readable(mut self, r: Arc<dyn Readable>) -> Self {
        self.readable = Some(r);
        self
    }

    /// Set the wavelength tunable component.
    pub fn with_wavelength_tunable(mut self, w: Arc<dyn WavelengthTunable>) -> Self {
        self.wavelength_tunable = Some(w);
        self
    }

    /// Set the emission control component.
    pub fn with_emission_control(mut self, e: Arc<dyn EmissionControl>) -> Self {
        self.emission_control = Some(e);
        self
    }

    /// Record the instrument identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }
}

// =============================================================================
// Driver Factory
// =============================================================================

/// Factory building a device from its TOML configuration.
///
/// Both `validate()` and `build()` return `Result`. Validation errors should
/// be descriptive; build errors include connection failures.
pub trait DriverFactory: Send + Sync + 'static {
    /// Driver type name used in the `kind` field of an `[[instruments]]` entry.
    fn driver_type(&self) -> &'static str;

    /// Human-readable name for documentation and error messages.
    fn name(&self) -> &'static str;

    /// Capabilities this driver type can provide.
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Validate configuration without connecting.
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Connect to the instrument and return its components.
    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_name() {
        assert_eq!(Capability::Readable.name(), "Readable");
        assert_eq!(Capability::EmissionControl.name(), "Emission Control");
    }

    #[test]
    fn test_device_components_capabilities() {
        let empty = DeviceComponents::new();
        assert!(empty.capabilities().is_empty());
        assert!(empty.identity.is_none());
    }

    #[test]
    fn test_capability_serde() {
        let cap: Capability = toml::Value::String("wavelength_tunable".into())
            .try_into()
            .unwrap();
        assert_eq!(cap, Capability::WavelengthTunable);
    }
}
