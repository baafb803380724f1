//! Simulated instruments
//!
//! [`SimulatedFactory`] accepts the same configuration entries as the real
//! factories but connects each instrument to an in-process simulator from
//! `apex-driver-mock`. `apex --simulate` swaps them in so a configuration can
//! be exercised without hardware.

use std::sync::Arc;

use anyhow::{Context, Result};
use apex_core::driver::{Capability, DeviceComponents, DriverFactory};
use apex_driver_ap1000::{factory::build_module, Ap1000, Ap1000ModuleConfig};
use apex_driver_ap2xxx::{factory::build_instrument, Ap2xxx, Ap2xxxConfig};
use apex_driver_etuve::{factory::build_etuve, Etuve, EtuveConfig};
use apex_driver_mock::{Ap1000Simulator, Ap2xxxSimulator, EtuveSimulator, MockAb3380, MockAb3510};
use apex_driver_usb::factory::{build_ab3380, build_ab3510};
use apex_driver_usb::{Ab3380, Ab3380Config, Ab3380Eeprom, Ab3510, Ab3510Config};
use futures::future::BoxFuture;

use crate::config::InstrumentKind;
use crate::registry::DeviceRegistry;

/// Factory building one instrument kind on top of its simulator.
pub struct SimulatedFactory {
    kind: InstrumentKind,
    inner: Box<dyn DriverFactory>,
}

impl SimulatedFactory {
    /// Simulated counterpart of the factory for `kind`.
    pub fn new(kind: InstrumentKind) -> Self {
        let inner: Box<dyn DriverFactory> = match kind {
            InstrumentKind::Ap1000 => Box::new(apex_driver_ap1000::Ap1000Factory),
            InstrumentKind::Ap2xxx => Box::new(apex_driver_ap2xxx::Ap2xxxFactory),
            InstrumentKind::Etuve => Box::new(apex_driver_etuve::EtuveFactory),
            InstrumentKind::Ab3380 => Box::new(apex_driver_usb::Ab3380Factory),
            InstrumentKind::Ab3510 => Box::new(apex_driver_usb::Ab3510Factory),
        };
        Self { kind, inner }
    }
}

impl DriverFactory for SimulatedFactory {
    fn driver_type(&self) -> &'static str {
        self.inner.driver_type()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn capabilities(&self) -> &'static [Capability] {
        self.inner.capabilities()
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        self.inner.validate(config)
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        let kind = self.kind;
        Box::pin(async move { build_simulated(kind, config).await })
    }
}

async fn build_simulated(kind: InstrumentKind, config: toml::Value) -> Result<DeviceComponents> {
    match kind {
        InstrumentKind::Ap1000 => {
            let cfg: Ap1000ModuleConfig = config.try_into().context("Invalid AP1000 config")?;
            let (conn, _log) = Ap1000Simulator::with_default_slots().spawn();
            build_module(&cfg, Ap1000::from_connection(conn)).await
        }
        InstrumentKind::Ap2xxx => {
            let cfg: Ap2xxxConfig = config.try_into().context("Invalid AP2XXX config")?;
            let (conn, _log) = Ap2xxxSimulator::new().spawn();
            let mut equipment = Ap2xxx::from_connection(conn);
            if let Some(model) = cfg.model {
                equipment = equipment.with_model(model);
            }
            build_instrument(&cfg, &equipment).await
        }
        InstrumentKind::Etuve => {
            let cfg: EtuveConfig = config.try_into().context("Invalid Etuve config")?;
            let (conn, _handle) = EtuveSimulator::new().spawn();
            build_etuve(&cfg, Etuve::from_connection(conn, &cfg.port)).await
        }
        InstrumentKind::Ab3380 => {
            let cfg: Ab3380Config = config.try_into().context("Invalid AB3380 config")?;
            let eeprom = Ab3380Eeprom::default().encode()?;
            let board = Ab3380::open(Box::new(MockAb3380::with_eeprom(eeprom)))?;
            build_ab3380(&cfg, Arc::new(board)).await
        }
        InstrumentKind::Ab3510 => {
            let cfg: Ab3510Config = config.try_into().context("Invalid AB3510 config")?;
            build_ab3510(&cfg, Arc::new(Ab3510::new(Box::new(MockAb3510::new()))))
        }
    }
}

impl DeviceRegistry {
    /// Registry whose factories all connect to simulators.
    pub fn with_simulated_factories() -> Self {
        let mut registry = Self::new();
        for kind in [
            InstrumentKind::Ap1000,
            InstrumentKind::Ap2xxx,
            InstrumentKind::Etuve,
            InstrumentKind::Ab3380,
            InstrumentKind::Ab3510,
        ] {
            registry.register_factory(Box::new(SimulatedFactory::new(kind)));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentDefinition;

    fn definition(id: &str, kind: InstrumentKind, settings: &str) -> InstrumentDefinition {
        InstrumentDefinition {
            id: id.into(),
            kind,
            name: Some(format!("Simulated {}", id)),
            enabled: true,
            settings: toml::from_str(settings).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_every_kind_builds() {
        let mut registry = DeviceRegistry::with_simulated_factories();
        let entries = [
            definition("pwm", InstrumentKind::Ap1000, "host = \"sim\"\nmodule = \"power_meter\"\nslot = 1"),
            definition("osa-pm", InstrumentKind::Ap2xxx, "host = \"sim\"\ninstrument = \"powermeter\""),
            definition("chamber", InstrumentKind::Etuve, "port = \"/dev/ttyUSB0\""),
            definition("filter", InstrumentKind::Ab3380, "filter = 1\nwavelength_nm = 1550.0"),
            definition("board-temp", InstrumentKind::Ab3510, ""),
        ];
        for entry in entries {
            registry.register(entry).await.unwrap();
        }
        assert_eq!(registry.len(), 5);

        let listed = registry.list_devices();
        assert!(listed.iter().all(|d| d.identity.is_some()));
        assert_eq!(listed[0].name, "Simulated board-temp");

        assert_eq!(registry.get_readable("chamber").unwrap().read().await.unwrap(), 23.5);
        assert_eq!(registry.get_readable("board-temp").unwrap().read().await.unwrap(), 25.0);
        let filter = registry.get_wavelength_tunable("filter").unwrap();
        assert_eq!(filter.get_wavelength().await.unwrap(), 1550.0);
    }

    #[tokio::test]
    async fn test_simulated_validation_matches_real_factory() {
        let mut registry = DeviceRegistry::with_simulated_factories();
        let bad = definition("pwm", InstrumentKind::Ap1000, "host = \"sim\"\nmodule = \"power_meter\"\nslot = 93");
        assert!(registry.register(bad).await.is_err());
        assert!(registry.is_empty());
    }
}
