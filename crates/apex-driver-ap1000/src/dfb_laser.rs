//! AP1000 DFB laser source (`DFB`), C, L and O band.

use std::fmt;

use anyhow::Result as AnyResult;
use apex_core::capabilities::{EmissionControl, WavelengthTunable};
use apex_core::error::Result;
use apex_core::limits::{
    BandRange, AP1000_DFB_CBAND, AP1000_DFB_LBAND, AP1000_DFB_OBAND, AP1000_DFB_POW, AP1000_DFB_WL_CBAND,
    AP1000_DFB_WL_LBAND, AP1000_DFB_WL_OBAND,
};
use apex_core::units::{ghz_to_nm, PowerUnit};
use apex_core::{clamp_with_warning, Connection};
use async_trait::async_trait;

use crate::laser::{Band, LaserCore};

fn decode(code: u32) -> Option<(Band, BandRange, BandRange)> {
    match code {
        AP1000_DFB_CBAND => Some((Band::C, AP1000_DFB_POW, AP1000_DFB_WL_CBAND)),
        AP1000_DFB_LBAND => Some((Band::L, AP1000_DFB_POW, AP1000_DFB_WL_LBAND)),
        AP1000_DFB_OBAND => Some((Band::O, AP1000_DFB_POW, AP1000_DFB_WL_OBAND)),
        _ => None,
    }
}

/// DFB laser in an AP1000 slot.
#[derive(Debug)]
pub struct DfbLaser {
    core: LaserCore,
}

impl DfbLaser {
    /// Attach to the DFB laser in `slot`.
    pub async fn new(conn: Connection, slot: u8) -> Result<Self> {
        let core = LaserCore::attach(conn, "DFB", "DFB", slot, decode).await?;
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

    /// Set the output power in the current unit, clamped to -10..=10 dBm.
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

    /// Output state read from the module (`L?`).
    pub async fn status(&self) -> Result<bool> {
        let reply = self.core.link().query("L?").await?;
        Ok(reply.trim() == "1")
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

    /// Set the frequency in GHz, clamped to the band frequencies.
    pub async fn set_frequency(&self, ghz: f64) -> Result<()> {
        let ghz = clamp_with_warning(
            &format!("{} Frequency", self.core.label()),
            "GHz",
            ghz,
            self.core.wavelength_range().to_frequency(),
        );
        self.core.set_wavelength(ghz_to_nm(ghz)).await
    }

    /// Frequency in GHz.
    pub async fn frequency(&self) -> Result<f64> {
        self.core.frequency().await
    }

    /// Power range of the module in dBm.
    pub fn power_range(&self) -> (f64, f64) {
        let r = self.core.power_range();
        (r.min, r.max)
    }
}

impl fmt::Display for DfbLaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DFB Laser in slot {}", self.slot())
    }
}

#[async_trait]
impl WavelengthTunable for DfbLaser {
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
impl EmissionControl for DfbLaser {
    async fn enable_emission(&self) -> AnyResult<()> {
        Ok(self.on().await?)
    }

    async fn disable_emission(&self) -> AnyResult<()> {
        Ok(self.off().await?)
    }

    async fn is_emission_enabled(&self) -> AnyResult<bool> {
        Ok(self.status().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_core::units::nm_to_ghz;
    use apex_driver_mock::ap1000::{Ap1000Simulator, SIMU_DFB_ID};
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_o_band_module() {
        let (conn, log) = Ap1000Simulator::new()
            .with_module(5, "APEX-TECHNOLOGIES/3345/11-3345-A-000505/0.0")
            .spawn();
        let dfb = DfbLaser::new(conn, 5).await.unwrap();
        assert_eq!(dfb.band(), Band::O);
        dfb.set_wavelength(1200.0).await.unwrap();
        assert!(log.wait_for("DFB[05]:TWL1290.000").await);
    }

    #[tokio::test]
    async fn test_status_is_read_from_module() {
        let (conn, log) = Ap1000Simulator::new().with_module(5, SIMU_DFB_ID).spawn();
        let dfb = DfbLaser::new(conn, 5).await.unwrap();
        assert!(!dfb.status().await.unwrap());
        dfb.on().await.unwrap();
        assert!(log.wait_for("DFB[05]:L1").await);
        assert!(dfb.status().await.unwrap());
        assert_eq!(log.last().as_deref(), Some("DFB[05]:L?"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_frequency_is_clamped() {
        let (conn, log) = Ap1000Simulator::new().with_module(5, SIMU_DFB_ID).spawn();
        let dfb = DfbLaser::new(conn, 5).await.unwrap();
        dfb.set_frequency(1.0).await.unwrap();
        assert!(logs_contain("DFB Frequency is set to its minimum value"));
        assert!(log.wait_for("DFB[05]:TWL1567.000").await);
        dfb.set_frequency(nm_to_ghz(1550.0)).await.unwrap();
        assert!(log.wait_for("DFB[05]:TWL1550.000").await);
    }

    #[tokio::test]
    async fn test_power_defaults() {
        let (conn, log) = Ap1000Simulator::new().with_module(5, SIMU_DFB_ID).spawn();
        let dfb = DfbLaser::new(conn, 5).await.unwrap();
        assert_eq!(dfb.power().await.unwrap(), 3.0);
        dfb.set_power(-20.0).await.unwrap();
        assert!(log.wait_for("DFB[05]:TPDB-10.0").await);
        assert_eq!(dfb.power_range(), (-10.0, 10.0));
    }
}
