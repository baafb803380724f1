//! # Apex DAQ
//!
//! Application layer over the Apex Technologies driver crates. It loads the
//! instrument configuration, installs logging and connects every configured
//! instrument through the driver factories.
//!
//! ## Crate Structure
//!
//! - **`config`**: `apex.toml` loading with environment overrides. See
//!   [`config::ApexConfig`].
//! - **`logging`**: `tracing` subscriber setup driven by the `[logging]`
//!   section.
//! - **`registry`**: [`registry::DeviceRegistry`], the factory-keyed table of
//!   connected instruments and their capabilities.
//! - **`simulation`**: factories connecting the same configuration entries to
//!   in-process simulators.
//!
//! The drivers themselves live in the workspace crates:
//! `apex-driver-ap1000`, `apex-driver-ap2xxx`, `apex-driver-usb` and
//! `apex-driver-etuve`, all built on `apex-core`.

pub mod config;
pub mod logging;
pub mod registry;
pub mod simulation;

pub use config::{ApexConfig, InstrumentDefinition, InstrumentKind};
pub use registry::{DeviceInfo, DeviceRegistry};

/// Force the linker to include every driver crate.
pub fn link_drivers() {
    apex_driver_ap1000::link();
    apex_driver_ap2xxx::link();
    apex_driver_etuve::link();
    apex_driver_usb::link();
}
