//! End-to-end tests: a configuration file on disk, loaded and connected to
//! simulated instruments.

use std::io::Write;

use apex_core::driver::Capability;
use apex_daq::{ApexConfig, DeviceRegistry, InstrumentKind};

const BENCH: &str = r#"
[logging]
level = "debug"
format = "json"

[[instruments]]
id = "laser"
kind = "ap1000"
name = "C-band laser"
host = "192.168.0.10"
module = "tunable_laser"
slot = 3
wavelength_nm = 1550.0

[[instruments]]
id = "osa-pm"
kind = "ap2xxx"
host = "192.168.0.20"
instrument = "powermeter"

[[instruments]]
id = "chamber"
kind = "etuve"
port = "/dev/ttyUSB0"
poll_interval_s = 0.0
setpoint_c = 40.0

[[instruments]]
id = "filter"
kind = "ab3380"
filter = 2
enabled = false
"#;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_bench_file_loads_and_validates() {
    let file = write_config(BENCH);
    let config = ApexConfig::load_from(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.instruments.len(), 4);
    assert_eq!(config.instruments[0].kind, InstrumentKind::Ap1000);
    assert_eq!(config.instruments[0].display_name(), "C-band laser");
    assert_eq!(config.enabled_instruments().len(), 3);
}

#[test]
fn test_bench_file_with_bad_port_rejected() {
    let file = write_config(&BENCH.replace("slot = 3", "slot = 3\nport = 0"));
    let config = ApexConfig::load_from(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("laser"));
}

#[tokio::test]
async fn test_bench_connects_to_simulators() {
    let file = write_config(BENCH);
    let config = ApexConfig::load_from(file.path()).unwrap();

    let mut registry = DeviceRegistry::with_simulated_factories();
    registry.register_all(&config).await.unwrap();
    assert_eq!(registry.len(), 3);
    assert!(!registry.contains("filter"));

    let laser = registry.get_wavelength_tunable("laser").unwrap();
    assert_eq!(laser.get_wavelength().await.unwrap(), 1550.0);
    let emission = registry.get_emission_control("laser").unwrap();
    emission.enable_emission().await.unwrap();
    assert!(emission.is_emission_enabled().await.unwrap());

    let chamber = registry.get_readable("chamber").unwrap();
    assert!(chamber.read().await.is_ok());

    assert_eq!(
        registry.devices_with_capability(Capability::Readable),
        vec!["chamber".to_string(), "osa-pm".to_string()]
    );
}

#[tokio::test]
async fn test_hardware_factories_fail_without_hardware() {
    let file = write_config(
        r#"
[[instruments]]
id = "board"
kind = "ab3510"
channel = 2
"#,
    );
    let config = ApexConfig::load_from(file.path()).unwrap();
    let mut registry = DeviceRegistry::with_default_factories();
    let result = registry.register_all(&config).await;
    assert!(result.is_err());
    assert!(registry.is_empty());
}
