//! Registry factory for the AP2XXX embedded instruments.
//!
//! The OSA itself exposes no capability trait; configuration entries register
//! either the embedded powermeter or the embedded tunable laser.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use apex_core::driver::{Capability, DeviceComponents, DriverFactory};
use apex_core::transport::DEFAULT_TCP_PORT;
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::equipment::{Ap2xxx, Ap2xxxModel};

// =============================================================================
// Ap2xxxFactory - DriverFactory implementation
// =============================================================================

/// Embedded instrument registered by one configuration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ap2xxxInstrument {
    /// Embedded powermeter
    #[default]
    Powermeter,
    /// Embedded tunable laser
    Tls,
}

fn default_port() -> u16 {
    DEFAULT_TCP_PORT
}

/// Configuration of one AP2XXX instrument.
#[derive(Debug, Clone, Deserialize)]
pub struct Ap2xxxConfig {
    /// Host name or IP address
    pub host: String,
    /// TCP port (default 5900)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Instrument to register
    #[serde(default)]
    pub instrument: Ap2xxxInstrument,
    /// Model override; detected from the identity when absent
    #[serde(default)]
    pub model: Option<Ap2xxxModel>,
    /// Initial laser wavelength in nm
    #[serde(default)]
    pub wavelength_nm: Option<f64>,
}

/// Factory for AP2XXX instruments.
pub struct Ap2xxxFactory;

static AP2XXX_CAPABILITIES: &[Capability] = &[
    Capability::Readable,
    Capability::WavelengthTunable,
    Capability::EmissionControl,
];

impl DriverFactory for Ap2xxxFactory {
    fn driver_type(&self) -> &'static str {
        "ap2xxx"
    }

    fn name(&self) -> &'static str {
        "Apex AP2XXX Optical Spectrum Analyser"
    }

    fn capabilities(&self) -> &'static [Capability] {
        AP2XXX_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: Ap2xxxConfig = config.clone().try_into()?;
        if cfg.host.trim().is_empty() {
            return Err(anyhow!("AP2XXX host must not be empty"));
        }
        if cfg.wavelength_nm.is_some() && cfg.instrument != Ap2xxxInstrument::Tls {
            return Err(anyhow!("wavelength_nm only applies to the tls instrument"));
        }
        Ok(())
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: Ap2xxxConfig = config.try_into().context("Invalid AP2XXX config")?;
            let mut equipment = Ap2xxx::connect(&cfg.host, Some(cfg.port)).await?;
            if let Some(model) = cfg.model {
                equipment = equipment.with_model(model);
            }
            build_instrument(&cfg, &equipment).await
        })
    }
}

/// Build the configured instrument on an open AP2XXX.
pub async fn build_instrument(cfg: &Ap2xxxConfig, equipment: &Ap2xxx) -> Result<DeviceComponents> {
    let identity = equipment.id().await?.to_string();
    let components = match cfg.instrument {
        Ap2xxxInstrument::Powermeter => {
            DeviceComponents::new().with_readable(Arc::new(equipment.power_meter().await?))
        }
        Ap2xxxInstrument::Tls => {
            let tls = Arc::new(equipment.tls().await?);
            if let Some(nm) = cfg.wavelength_nm {
                tls.set_wavelength(nm).await?;
            }
            DeviceComponents::new()
                .with_wavelength_tunable(tls.clone())
                .with_emission_control(tls)
        }
    };
    tracing::info!(instrument = ?cfg.instrument, model = %equipment.model(), "AP2XXX instrument registered");
    Ok(components.with_identity(identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_driver_mock::Ap2xxxSimulator;

    fn config(instrument: &str) -> toml::Value {
        let mut table = toml::value::Table::new();
        table.insert("host".into(), toml::Value::String("10.0.0.5".into()));
        table.insert("instrument".into(), toml::Value::String(instrument.into()));
        toml::Value::Table(table)
    }

    #[test]
    fn test_validate() {
        let factory = Ap2xxxFactory;
        assert_eq!(factory.driver_type(), "ap2xxx");
        assert!(factory.validate(&config("tls")).is_ok());
        assert!(factory.validate(&config("osa")).is_err());

        let mut bad = config("powermeter");
        if let toml::Value::Table(t) = &mut bad {
            t.insert("wavelength_nm".into(), toml::Value::Float(1550.0));
        }
        assert!(factory.validate(&bad).is_err());

        let cfg: Ap2xxxConfig = config("powermeter").try_into().unwrap();
        assert_eq!(cfg.port, 5900);
        assert_eq!(cfg.model, None);
    }

    #[tokio::test]
    async fn test_build_tls() {
        let (conn, log) = Ap2xxxSimulator::new().spawn();
        let mut cfg: Ap2xxxConfig = config("tls").try_into().unwrap();
        cfg.wavelength_nm = Some(1540.0);
        let components = build_instrument(&cfg, &Ap2xxx::from_connection(conn)).await.unwrap();
        assert_eq!(
            components.capabilities(),
            vec![Capability::WavelengthTunable, Capability::EmissionControl]
        );
        assert!(log.wait_for("TLSSWL1540.000").await);
        assert!(components.identity.unwrap().contains("2050-A"));
    }

    #[tokio::test]
    async fn test_build_powermeter() {
        let (conn, _log) = Ap2xxxSimulator::new().spawn();
        let cfg: Ap2xxxConfig = config("powermeter").try_into().unwrap();
        let components = build_instrument(&cfg, &Ap2xxx::from_connection(conn)).await.unwrap();
        assert_eq!(components.readable.unwrap().read().await.unwrap(), -12.34);
    }
}
