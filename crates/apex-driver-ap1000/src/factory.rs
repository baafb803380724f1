//! Registry factory for AP1000 slot modules.
//!
//! One configuration entry describes one module: the mainframe address, the
//! slot and the module kind. Modules of the same mainframe configured as
//! separate entries each open their own connection.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use apex_core::driver::{Capability, DeviceComponents, DriverFactory};
use apex_core::limits::AP1000_SLOT_MAX;
use apex_core::transport::DEFAULT_TCP_PORT;
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::mainframe::Ap1000;
use crate::power_meter::PowerMeterModel;

// =============================================================================
// Ap1000Factory - DriverFactory implementation
// =============================================================================

/// Module kinds that can be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Optical power meter
    PowerMeter,
    /// Tunable laser source
    TunableLaser,
    /// DFB laser source
    DfbLaser,
    /// Erbium amplifier
    ErbiumAmplifier,
    /// Tunable filter
    Filter,
    /// Polarimeter
    Polarimeter,
}

fn default_port() -> u16 {
    DEFAULT_TCP_PORT
}

/// Configuration of one AP1000 module.
#[derive(Debug, Clone, Deserialize)]
pub struct Ap1000ModuleConfig {
    /// Mainframe host name or IP address
    pub host: String,
    /// TCP port (default 5900)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Module kind
    pub module: ModuleKind,
    /// Slot number
    pub slot: u8,
    /// Power meter prefix variant
    #[serde(default)]
    pub model: PowerMeterModel,
    /// Skip the slot type check
    #[serde(default)]
    pub force: bool,
    /// Initial wavelength in nm
    #[serde(default)]
    pub wavelength_nm: Option<f64>,
}

/// Factory for AP1000 slot modules.
pub struct Ap1000Factory;

/// Union of the capabilities of the supported modules.
static AP1000_CAPABILITIES: &[Capability] = &[
    Capability::Readable,
    Capability::WavelengthTunable,
    Capability::EmissionControl,
];

impl DriverFactory for Ap1000Factory {
    fn driver_type(&self) -> &'static str {
        "ap1000"
    }

    fn name(&self) -> &'static str {
        "Apex AP1000 Mainframe Module"
    }

    fn capabilities(&self) -> &'static [Capability] {
        AP1000_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: Ap1000ModuleConfig = config.clone().try_into()?;
        if cfg.host.trim().is_empty() {
            return Err(anyhow!("AP1000 host must not be empty"));
        }
        if cfg.slot > AP1000_SLOT_MAX {
            return Err(anyhow!("Slot {} out of range (0-{})", cfg.slot, AP1000_SLOT_MAX));
        }
        Ok(())
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: Ap1000ModuleConfig = config.try_into().context("Invalid AP1000 config")?;
            let mainframe = Ap1000::connect(&cfg.host, Some(cfg.port)).await?;
            build_module(&cfg, mainframe).await
        })
    }
}

/// Attach the configured module on an open mainframe.
pub async fn build_module(cfg: &Ap1000ModuleConfig, mainframe: Ap1000) -> Result<DeviceComponents> {
    let slot = cfg.slot;
    let identity = mainframe
        .slot_id(slot, true)
        .await?
        .map(|id| id.to_string())
        .unwrap_or_default();
    let components = match cfg.module {
        ModuleKind::PowerMeter => {
            let driver = Arc::new(mainframe.power_meter_model(slot, cfg.model, cfg.force).await?);
            DeviceComponents::new()
                .with_readable(driver.clone())
                .with_wavelength_tunable(driver)
        }
        ModuleKind::TunableLaser => {
            let driver = Arc::new(mainframe.tunable_laser(slot, cfg.force).await?);
            DeviceComponents::new()
                .with_wavelength_tunable(driver.clone())
                .with_emission_control(driver)
        }
        ModuleKind::DfbLaser => {
            let driver = Arc::new(mainframe.dfb_laser(slot, cfg.force).await?);
            DeviceComponents::new()
                .with_wavelength_tunable(driver.clone())
                .with_emission_control(driver)
        }
        ModuleKind::ErbiumAmplifier => {
            let driver = Arc::new(mainframe.erbium_amplifier(slot, cfg.force).await?);
            DeviceComponents::new().with_readable(driver)
        }
        ModuleKind::Filter => DeviceComponents::new().with_wavelength_tunable(Arc::new(mainframe.filter(slot)?)),
        ModuleKind::Polarimeter => {
            let driver = Arc::new(mainframe.polarimeter(slot)?);
            DeviceComponents::new()
                .with_readable(driver.clone())
                .with_wavelength_tunable(driver)
        }
    };
    if let (Some(nm), Some(tunable)) = (cfg.wavelength_nm, components.wavelength_tunable.as_ref()) {
        tunable.set_wavelength(nm).await?;
    }
    tracing::info!(slot, module = ?cfg.module, "AP1000 module registered");
    Ok(components.with_identity(identity))
}
