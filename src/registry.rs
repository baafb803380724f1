//! Device registry
//!
//! Driver factories are registered once at start-up; each enabled
//! `[[instruments]]` entry is then handed to the factory of its kind, which
//! connects to the instrument and returns its capability trait objects.
//!
//! ```rust,ignore
//! let mut registry = DeviceRegistry::with_default_factories();
//! registry.register_all(&config).await?;
//! let chamber = registry.get_readable("chamber").unwrap();
//! println!("{} °C", chamber.read().await?);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use apex_core::capabilities::{EmissionControl, Readable, WavelengthTunable};
use apex_core::driver::{Capability, DeviceComponents, DriverFactory};

use crate::config::{ApexConfig, InstrumentDefinition, InstrumentKind};

/// Information about a registered instrument.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Instrument family
    pub kind: InstrumentKind,
    /// Identity reported by the instrument
    pub identity: Option<String>,
    /// Capabilities this instrument supports
    pub capabilities: Vec<Capability>,
    /// Tuning range in nm for wavelength-tunable instruments
    pub wavelength_range: Option<(f64, f64)>,
}

struct RegisteredDevice {
    definition: InstrumentDefinition,
    components: DeviceComponents,
}

impl RegisteredDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.definition.id.clone(),
            name: self.definition.display_name().to_string(),
            kind: self.definition.kind,
            identity: self.components.identity.clone(),
            capabilities: self.components.capabilities(),
            wavelength_range: self.components.wavelength_tunable.as_ref().map(|w| w.wavelength_range()),
        }
    }
}

/// Central registry of instruments.
#[derive(Default)]
pub struct DeviceRegistry {
    factories: HashMap<&'static str, Box<dyn DriverFactory>>,
    devices: HashMap<String, RegisteredDevice>,
}

impl DeviceRegistry {
    /// Empty registry without factories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the factories of every Apex driver crate.
    pub fn with_default_factories() -> Self {
        let mut registry = Self::new();
        registry.register_factory(Box::new(apex_driver_ap1000::Ap1000Factory));
        registry.register_factory(Box::new(apex_driver_ap2xxx::Ap2xxxFactory));
        registry.register_factory(Box::new(apex_driver_etuve::EtuveFactory));
        registry.register_factory(Box::new(apex_driver_usb::Ab3380Factory));
        registry.register_factory(Box::new(apex_driver_usb::Ab3510Factory));
        registry
    }

    /// Add a factory, replacing any factory with the same driver type.
    pub fn register_factory(&mut self, factory: Box<dyn DriverFactory>) {
        tracing::debug!(driver = factory.driver_type(), name = factory.name(), "driver factory registered");
        self.factories.insert(factory.driver_type(), factory);
    }

    /// Driver types with a registered factory.
    pub fn driver_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.factories.keys().copied().collect();
        types.sort_unstable();
        types
    }

    fn factory(&self, kind: InstrumentKind) -> Result<&dyn DriverFactory> {
        self.factories
            .get(kind.driver_type())
            .map(|f| f.as_ref())
            .ok_or_else(|| anyhow!("No driver factory registered for '{}'", kind))
    }

    /// Validate an entry with its factory, without connecting.
    pub fn validate(&self, definition: &InstrumentDefinition) -> Result<()> {
        self.factory(definition.kind)?
            .validate(&definition.driver_config())
            .map_err(|e| anyhow!("Configuration validation failed for '{}' ({}): {}", definition.id, definition.kind, e))
    }

    /// Connect the instrument of one entry and register it.
    ///
    /// # Errors
    /// Returns error if:
    /// - the id is already registered
    /// - no factory handles the entry kind
    /// - the factory rejects the settings
    /// - the connection fails
    pub async fn register(&mut self, definition: InstrumentDefinition) -> Result<()> {
        if self.devices.contains_key(&definition.id) {
            return Err(anyhow!("Device '{}' is already registered", definition.id));
        }
        self.validate(&definition)?;

        let components = self
            .factory(definition.kind)?
            .build(definition.driver_config())
            .await
            .map_err(|e| anyhow!("Failed to connect '{}' ({}): {}", definition.id, definition.kind, e))?;
        tracing::info!(
            id = %definition.id,
            kind = %definition.kind,
            identity = components.identity.as_deref().unwrap_or("-"),
            "instrument registered"
        );
        self.insert(definition, components);
        Ok(())
    }

    /// Register components built elsewhere (simulators, tests).
    pub fn insert(&mut self, definition: InstrumentDefinition, components: DeviceComponents) {
        self.devices.insert(
            definition.id.clone(),
            RegisteredDevice {
                definition,
                components,
            },
        );
    }

    /// Validate then register every enabled entry of `config`.
    ///
    /// Validation of all entries happens before the first connection.
    pub async fn register_all(&mut self, config: &ApexConfig) -> Result<()> {
        let enabled = config.enabled_instruments();
        for definition in &enabled {
            self.validate(definition)?;
        }
        for definition in enabled {
            self.register(definition.clone()).await?;
        }
        Ok(())
    }

    /// Remove an instrument. Returns false if it was not registered.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.devices.remove(id).is_some()
    }

    /// Every registered instrument, sorted by id.
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<_> = self.devices.values().map(RegisteredDevice::info).collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Information on one instrument.
    pub fn get_device_info(&self, id: &str) -> Option<DeviceInfo> {
        self.devices.get(id).map(RegisteredDevice::info)
    }

    /// Check if an instrument is registered
    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Number of registered instruments
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Get an instrument as Readable
    pub fn get_readable(&self, id: &str) -> Option<Arc<dyn Readable>> {
        self.devices.get(id).and_then(|d| d.components.readable.clone())
    }

    /// Get an instrument as WavelengthTunable
    pub fn get_wavelength_tunable(&self, id: &str) -> Option<Arc<dyn WavelengthTunable>> {
        self.devices.get(id).and_then(|d| d.components.wavelength_tunable.clone())
    }

    /// Get an instrument as EmissionControl
    pub fn get_emission_control(&self, id: &str) -> Option<Arc<dyn EmissionControl>> {
        self.devices.get(id).and_then(|d| d.components.emission_control.clone())
    }

    /// Ids of the instruments supporting `capability`, sorted.
    pub fn devices_with_capability(&self, capability: Capability) -> Vec<String> {
        let mut ids: Vec<_> = self
            .devices
            .values()
            .filter(|d| d.components.capabilities().contains(&capability))
            .map(|d| d.definition.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_driver_ap2xxx::{Ap2xxx, Ap2xxxConfig};
    use apex_driver_etuve::{factory::build_etuve, Etuve, EtuveConfig};
    use apex_driver_mock::{Ap2xxxSimulator, EtuveSimulator};
    use futures::future::BoxFuture;
    use tracing_test::traced_test;

    fn definition(id: &str, kind: InstrumentKind, settings: &str) -> InstrumentDefinition {
        InstrumentDefinition {
            id: id.into(),
            kind,
            name: None,
            enabled: true,
            settings: toml::from_str(settings).unwrap(),
        }
    }

    /// Etuve factory connected to the chamber simulator.
    struct SimulatedEtuveFactory;

    impl DriverFactory for SimulatedEtuveFactory {
        fn driver_type(&self) -> &'static str {
            "etuve"
        }

        fn name(&self) -> &'static str {
            "Simulated Etuve"
        }

        fn capabilities(&self) -> &'static [Capability] {
            &[Capability::Readable]
        }

        fn validate(&self, config: &toml::Value) -> Result<()> {
            apex_driver_etuve::EtuveFactory.validate(config)
        }

        fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
            Box::pin(async move {
                let cfg: EtuveConfig = config.try_into()?;
                let (conn, _sim) = EtuveSimulator::new().spawn();
                build_etuve(&cfg, Etuve::from_connection(conn, &cfg.port)).await
            })
        }
    }

    #[test]
    fn test_default_factories() {
        let registry = DeviceRegistry::with_default_factories();
        assert_eq!(registry.driver_types(), vec!["ab3380", "ab3510", "ap1000", "ap2xxx", "etuve"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_validate_uses_factory() {
        let registry = DeviceRegistry::with_default_factories();
        assert!(registry
            .validate(&definition("pm", InstrumentKind::Ap2xxx, "host = \"osa\""))
            .is_ok());
        let err = registry
            .validate(&definition("f", InstrumentKind::Ab3380, "filter = 5"))
            .unwrap_err();
        assert!(err.to_string().contains("'f' (ab3380)"));

        let empty = DeviceRegistry::new();
        assert!(empty.validate(&definition("x", InstrumentKind::Etuve, "port = \"COM1\"")).is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_register_and_lookup() {
        let mut registry = DeviceRegistry::new();
        registry.register_factory(Box::new(SimulatedEtuveFactory));

        registry
            .register(definition("chamber", InstrumentKind::Etuve, "port = \"sim0\""))
            .await
            .unwrap();
        assert!(registry.contains("chamber"));
        assert_eq!(registry.len(), 1);
        assert!(logs_contain("instrument registered"));

        let chamber = registry.get_readable("chamber").unwrap();
        assert_eq!(chamber.read().await.unwrap(), 23.5);
        assert!(registry.get_wavelength_tunable("chamber").is_none());

        let info = registry.get_device_info("chamber").unwrap();
        assert_eq!(info.capabilities, vec![Capability::Readable]);
        assert_eq!(info.identity.as_deref(), Some("Thermal Etuve on sim0"));

        let duplicate = registry
            .register(definition("chamber", InstrumentKind::Etuve, "port = \"sim1\""))
            .await;
        assert!(duplicate.is_err());

        assert!(registry.unregister("chamber"));
        assert!(!registry.unregister("chamber"));
    }

    #[tokio::test]
    async fn test_register_all_validates_first() {
        let mut registry = DeviceRegistry::new();
        registry.register_factory(Box::new(SimulatedEtuveFactory));
        let mut config = ApexConfig::default();
        config.instruments = vec![
            definition("a", InstrumentKind::Etuve, "port = \"sim0\""),
            definition("b", InstrumentKind::Etuve, "port = \"\""),
        ];
        assert!(registry.register_all(&config).await.is_err());
        assert!(registry.is_empty());

        config.instruments[1].enabled = false;
        registry.register_all(&config).await.unwrap();
        assert_eq!(registry.devices_with_capability(Capability::Readable), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_insert_simulated_components() {
        let (conn, _log) = Ap2xxxSimulator::new().spawn();
        let def = definition("tls", InstrumentKind::Ap2xxx, "host = \"sim\"\ninstrument = \"tls\"");
        let cfg: Ap2xxxConfig = def.driver_config().try_into().unwrap();
        let components = apex_driver_ap2xxx::factory::build_instrument(&cfg, &Ap2xxx::from_connection(conn))
            .await
            .unwrap();

        let mut registry = DeviceRegistry::new();
        registry.insert(def, components);
        let listed = registry.list_devices();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].wavelength_range.is_some());
        assert!(registry.get_emission_control("tls").is_some());
        assert_eq!(
            registry.devices_with_capability(Capability::WavelengthTunable),
            vec!["tls".to_string()]
        );
    }
}
