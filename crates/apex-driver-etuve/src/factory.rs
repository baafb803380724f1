//! Registry factory for the Etuve thermal chamber.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use apex_core::driver::{Capability, DeviceComponents, DriverFactory};
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::chamber::Etuve;

/// Configuration of one chamber.
#[derive(Debug, Clone, Deserialize)]
pub struct EtuveConfig {
    /// Serial port path
    pub port: String,
    /// Minimum age of a status reply before a new poll, seconds
    #[serde(default)]
    pub poll_interval_s: Option<f64>,
    /// Setpoint applied at start-up, °C
    #[serde(default)]
    pub setpoint_c: Option<f64>,
}

/// Factory for Etuve chambers.
pub struct EtuveFactory;

static ETUVE_CAPABILITIES: &[Capability] = &[Capability::Readable];

impl DriverFactory for EtuveFactory {
    fn driver_type(&self) -> &'static str {
        "etuve"
    }

    fn name(&self) -> &'static str {
        "Etuve XU Thermal Chamber"
    }

    fn capabilities(&self) -> &'static [Capability] {
        ETUVE_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: EtuveConfig = config.clone().try_into()?;
        if cfg.port.trim().is_empty() {
            return Err(anyhow!("Etuve port must not be empty"));
        }
        if let Some(s) = cfg.poll_interval_s {
            if !s.is_finite() || s < 0.0 {
                return Err(anyhow!("Etuve poll_interval_s must be a positive number, got {}", s));
            }
        }
        Ok(())
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: EtuveConfig = config.try_into().context("Invalid Etuve config")?;
            let etuve = Etuve::open(&cfg.port).await?;
            build_etuve(&cfg, etuve).await
        })
    }
}

/// Register an open chamber.
pub async fn build_etuve(cfg: &EtuveConfig, etuve: Etuve) -> Result<DeviceComponents> {
    let etuve = match cfg.poll_interval_s {
        Some(s) => etuve.with_poll_interval(Duration::from_secs_f64(s)),
        None => etuve,
    };
    if let Some(celsius) = cfg.setpoint_c {
        etuve.set_setpoint(celsius).await?;
    }
    let identity = etuve.to_string();
    Ok(DeviceComponents::new()
        .with_readable(Arc::new(etuve))
        .with_identity(identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_driver_mock::EtuveSimulator;

    fn config(entries: &[(&str, toml::Value)]) -> toml::Value {
        let mut t = toml::value::Table::new();
        t.insert("port".into(), toml::Value::String("/dev/ttyUSB0".into()));
        for (k, v) in entries {
            t.insert((*k).to_string(), v.clone());
        }
        toml::Value::Table(t)
    }

    #[test]
    fn test_validate() {
        assert_eq!(EtuveFactory.driver_type(), "etuve");
        assert!(EtuveFactory.validate(&config(&[])).is_ok());
        assert!(EtuveFactory
            .validate(&config(&[("poll_interval_s", toml::Value::Float(-1.0))]))
            .is_err());
        assert!(EtuveFactory.validate(&toml::Value::Table(toml::value::Table::new())).is_err());
    }

    #[tokio::test]
    async fn test_build_applies_setpoint() {
        let (conn, sim) = EtuveSimulator::new().spawn();
        let cfg: EtuveConfig = config(&[("setpoint_c", toml::Value::Float(60.0))]).try_into().unwrap();
        let components = build_etuve(&cfg, Etuve::from_connection(conn, &cfg.port)).await.unwrap();
        assert_eq!(components.capabilities(), vec![Capability::Readable]);
        assert_eq!(components.readable.unwrap().read().await.unwrap(), 23.5);
        assert_eq!(sim.setpoint(), 60.0);
        assert_eq!(components.identity.as_deref(), Some("Thermal Etuve on /dev/ttyUSB0"));
    }
}
