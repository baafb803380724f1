//! AP1000 tunable laser source (`TLS`), C and L band.

use std::fmt;

use anyhow::Result as AnyResult;
use apex_core::capabilities::{EmissionControl, WavelengthTunable};
use apex_core::error::{ApexError, Result};
use apex_core::limits::{
    BandRange, AP1000_TLS_CBAND, AP1000_TLS_DIODES, AP1000_TLS_LBAND, AP1000_TLS_POW, AP1000_TLS_SOA,
    AP1000_TLS_TEMP, AP1000_TLS_WL_CBAND, AP1000_TLS_WL_LBAND,
};
use apex_core::units::{ghz_to_nm, PowerUnit};
use apex_core::Connection;
use async_trait::async_trait;

use crate::laser::{Band, LaserCore};

fn decode(code: u32) -> Option<(Band, BandRange, BandRange)> {
    match code {
        AP1000_TLS_CBAND => Some((Band::C, AP1000_TLS_POW, AP1000_TLS_WL_CBAND)),
        AP1000_TLS_LBAND => Some((Band::L, AP1000_TLS_POW, AP1000_TLS_WL_LBAND)),
        _ => None,
    }
}

/// Target parameters of one laser diode, for calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiodeTarget {
    /// Diode number, 1..=12
    pub diode: u8,
    /// 16-bit temperature code
    pub temperature: u32,
    /// Temperature tuning speed
    pub sweep_speed: u32,
    /// SOA compensation value
    pub soa_compensation: u32,
}

/// Tunable laser in an AP1000 slot.
///
/// The output state is not readable from this module; [`TunableLaser::status`]
/// reports the last state set through this driver.
#[derive(Debug)]
pub struct TunableLaser {
    core: LaserCore,
}

impl TunableLaser {
    /// Attach to the laser in `slot`, decoding its band from the slot identity.
    pub async fn new(conn: Connection, slot: u8) -> Result<Self> {
        let core = LaserCore::attach(conn, "TLS", "TLS", slot, decode).await?;
        Ok(Self { core })
    }

    /// Slot number.
    pub fn slot(&self) -> u8 {
        self.core.link().slot()
    }

    /// Band decoded from the module code.
    pub fn band(&self) -> Band {
        self.core.band()
    }

    /// Select the power unit.
    pub fn set_unit(&self, unit: PowerUnit) {
        self.core.set_unit(unit);
    }

    /// Current power unit.
    pub fn unit(&self) -> PowerUnit {
        self.core.unit()
    }

    /// Set the output power in the current unit, clamped to -30..=13 dBm.
    pub async fn set_power(&self, power: f64) -> Result<()> {
        self.core.set_power(power).await
    }

    /// Output power in the current unit.
    pub async fn power(&self) -> Result<f64> {
        self.core.power().await
    }

    /// Switch the output on and wait for it to settle.
    pub async fn on(&self) -> Result<()> {
        self.core.on().await
    }

    /// Switch the output off.
    pub async fn off(&self) -> Result<()> {
        self.core.off().await
    }

    /// Last output state set through this driver.
    pub fn status(&self) -> bool {
        self.core.cached_status()
    }

    /// Set the wavelength in nm, clamped to the band.
    pub async fn set_wavelength(&self, nm: f64) -> Result<()> {
        self.core.set_wavelength(nm).await
    }

    /// Wavelength in nm.
    pub async fn wavelength(&self) -> Result<f64> {
        self.core.wavelength().await
    }

    /// Last wavelength set or read through this driver, without a query.
    pub fn last_wavelength(&self) -> f64 {
        self.core.cached_wavelength()
    }

    /// Last power set or read through this driver, in the current unit.
    pub fn last_power(&self) -> f64 {
        self.core.cached_power()
    }

    /// Set the frequency in GHz. A non-positive frequency selects the top of the band.
    pub async fn set_frequency(&self, ghz: f64) -> Result<()> {
        if ghz > 0.0 {
            self.core.set_wavelength(ghz_to_nm(ghz)).await
        } else {
            let max = self.core.wavelength_range().max;
            tracing::warn!(slot = self.slot(), "TLS Frequency is set to its minimum value");
            self.core.set_wavelength(max).await
        }
    }

    /// Frequency in GHz.
    pub async fn frequency(&self) -> Result<f64> {
        self.core.frequency().await
    }

    /// Set the SOA current code (calibration only).
    pub async fn set_soa_current(&self, current: u32) -> Result<()> {
        let (min, max) = AP1000_TLS_SOA;
        if !(min..=max).contains(&current) {
            return Err(ApexError::argument_value("Current"));
        }
        self.core.link().send(&format!("SETSOAVALUE{}", current)).await
    }

    /// Select a diode and set its target parameters (calibration only).
    pub async fn set_diode_temp(&self, target: DiodeTarget) -> Result<()> {
        let (first, last) = AP1000_TLS_DIODES;
        if !(first..=last).contains(&target.diode) {
            return Err(ApexError::argument_value("DiodeNumber"));
        }
        let (min, max) = AP1000_TLS_TEMP;
        if !(min..=max).contains(&target.temperature) {
            return Err(ApexError::argument_value("Temperature"));
        }
        self.core
            .link()
            .send(&format!(
                "SETTARGETPARAM{};{};{};{}",
                target.diode, target.temperature, target.sweep_speed, target.soa_compensation
            ))
            .await
    }
}

impl fmt::Display for TunableLaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tunable Laser in slot {}", self.slot())
    }
}

#[async_trait]
impl WavelengthTunable for TunableLaser {
    async fn set_wavelength(&self, wavelength_nm: f64) -> AnyResult<()> {
        Ok(self.core.set_wavelength(wavelength_nm).await?)
    }

    async fn get_wavelength(&self) -> AnyResult<f64> {
        Ok(self.core.wavelength().await?)
    }

    fn wavelength_range(&self) -> (f64, f64) {
        let r = self.core.wavelength_range();
        (r.min, r.max)
    }
}

#[async_trait]
impl EmissionControl for TunableLaser {
    async fn enable_emission(&self) -> AnyResult<()> {
        Ok(self.on().await?)
    }

    async fn disable_emission(&self) -> AnyResult<()> {
        Ok(self.off().await?)
    }

    async fn is_emission_enabled(&self) -> AnyResult<bool> {
        Ok(self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_core::units::nm_to_ghz;
    use apex_driver_mock::ap1000::{Ap1000Simulator, SIMU_ATT_ID, SIMU_TLS_ID};
    use apex_driver_mock::CommandLog;
    use tracing_test::traced_test;

    async fn laser() -> (TunableLaser, CommandLog) {
        let (conn, log) = Ap1000Simulator::new().with_module(3, SIMU_TLS_ID).spawn();
        (TunableLaser::new(conn, 3).await.unwrap(), log)
    }

    #[tokio::test]
    async fn test_band_from_identity() {
        let (tls, _log) = laser().await;
        assert_eq!(tls.band(), Band::C);
        assert_eq!(tls.to_string(), "Tunable Laser in slot 3");

        let (conn, _log) = Ap1000Simulator::new()
            .with_module(3, "APEX-TECHNOLOGIES/3352/10-3352-A-000503/0.0")
            .spawn();
        let tls = TunableLaser::new(conn, 3).await.unwrap();
        assert_eq!(tls.band(), Band::L);
        assert_eq!(WavelengthTunable::wavelength_range(&tls), (1567.0, 1608.0));
    }

    #[tokio::test]
    async fn test_unknown_module_switches_off() {
        let (conn, log) = Ap1000Simulator::new().with_module(3, SIMU_ATT_ID).spawn();
        let err = TunableLaser::new(conn, 3).await.unwrap_err();
        assert_eq!(err.code(), apex_core::error::SLOT_TYPE_NOT_DEFINED);
        assert!(log.wait_for("TLS[03]:L0").await);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_power_is_clamped() {
        let (tls, log) = laser().await;
        tls.set_power(20.0).await.unwrap();
        assert!(log.wait_for("TLS[03]:TPDB13.0").await);
        assert!(logs_contain("TLS Power is set to its maximum value"));
        tls.set_unit(PowerUnit::Mw);
        tls.set_power(1.0).await.unwrap();
        assert!(log.wait_for("TLS[03]:TPDB0.0").await);
        let mw = tls.power().await.unwrap();
        assert!((mw - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_on_off_status() {
        let (tls, log) = laser().await;
        assert!(!tls.status());
        tls.on().await.unwrap();
        assert!(tls.status());
        assert!(log.wait_for("TLS[03]:L1").await);
        tls.off().await.unwrap();
        assert!(!tls.is_emission_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_last_setpoints_follow_writes() {
        let (tls, _log) = laser().await;
        tls.set_wavelength(1540.0).await.unwrap();
        assert_eq!(tls.last_wavelength(), 1540.0);
        tls.set_power(20.0).await.unwrap();
        assert_eq!(tls.last_power(), 13.0);
        tls.set_unit(PowerUnit::Mw);
        assert!((tls.last_power() - 19.952_623).abs() < 1e-3);
        assert_eq!(tls.wavelength().await.unwrap(), 1540.0);
        assert_eq!(tls.last_wavelength(), 1540.0);
    }

    #[tokio::test]
    async fn test_wavelength_and_frequency() {
        let (tls, log) = laser().await;
        assert_eq!(tls.wavelength().await.unwrap(), 1553.31);
        tls.set_wavelength(1500.0).await.unwrap();
        assert!(log.wait_for("TLS[03]:TWL1526.000").await);
        tls.set_frequency(-1.0).await.unwrap();
        assert!(log.wait_for("TLS[03]:TWL1567.000").await);
        tls.set_frequency(nm_to_ghz(1550.0)).await.unwrap();
        let ghz = tls.frequency().await.unwrap();
        assert!((ghz - nm_to_ghz(1550.0)).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_calibration_commands() {
        let (tls, log) = laser().await;
        tls.set_soa_current(40000).await.unwrap();
        assert!(log.wait_for("TLS[03]:SETSOAVALUE40000").await);
        assert!(tls.set_soa_current(70000).await.is_err());

        let target = DiodeTarget {
            diode: 4,
            temperature: 30000,
            sweep_speed: 10,
            soa_compensation: 2,
        };
        tls.set_diode_temp(target).await.unwrap();
        assert!(log.wait_for("TLS[03]:SETTARGETPARAM4;30000;10;2").await);
        let bad = DiodeTarget { diode: 13, ..target };
        assert_eq!(
            tls.set_diode_temp(bad).await.unwrap_err().code(),
            apex_core::error::ARGUMENT_VALUE
        );
    }
}
