//! AP1000 tunable optical filter (`FIL`).
//!
//! The filter reports its own tuning limits, so every setter queries them
//! first and rejects out-of-range requests instead of clamping.

use std::fmt;

use anyhow::Result as AnyResult;
use apex_core::capabilities::WavelengthTunable;
use apex_core::error::{ApexError, Result};
use apex_core::limits::{BandRange, AP1000_FIL_WL};
use apex_core::units::SpectralUnit;
use apex_core::Connection;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::slot::SlotLink;

/// Optical filter in an AP1000 slot.
#[derive(Debug)]
pub struct Filter {
    link: SlotLink,
    unit: Mutex<SpectralUnit>,
}

impl Filter {
    /// Attach to the filter in `slot`.
    pub fn new(conn: Connection, slot: u8) -> Self {
        Self {
            link: SlotLink::new(conn, "FIL", slot),
            unit: Mutex::new(SpectralUnit::Nm),
        }
    }

    /// Slot number.
    pub fn slot(&self) -> u8 {
        self.link.slot()
    }

    /// Preferred spectral unit of the caller.
    pub fn set_unit(&self, unit: SpectralUnit) {
        *self.unit.lock() = unit;
    }

    /// Preferred spectral unit.
    pub fn unit(&self) -> SpectralUnit {
        *self.unit.lock()
    }

    async fn limits(&self, min: &str, max: &str) -> Result<BandRange> {
        Ok(BandRange {
            min: self.link.query_f64(min).await?,
            max: self.link.query_f64(max).await?,
        })
    }

    /// Wavelength limits in nm (`WLMIN?`, `WLMAX?`).
    pub async fn wavelength_limits(&self) -> Result<BandRange> {
        self.limits("WLMIN?", "WLMAX?").await
    }

    /// Frequency limits in GHz (`FRMIN?`, `FRMAX?`).
    pub async fn frequency_limits(&self) -> Result<BandRange> {
        self.limits("FRMIN?", "FRMAX?").await
    }

    /// Tune the filter to a wavelength in nm.
    pub async fn set_wavelength(&self, nm: f64) -> Result<()> {
        if !self.wavelength_limits().await?.contains(nm) {
            return Err(ApexError::argument_value("Wavelength"));
        }
        self.link.send(&format!("TWL{:.3}", nm)).await
    }

    /// Filter wavelength in nm.
    pub async fn wavelength(&self) -> Result<f64> {
        self.link.query_f64("TWL?").await
    }

    /// Tune the filter to a frequency in GHz.
    pub async fn set_frequency(&self, ghz: f64) -> Result<()> {
        if !self.frequency_limits().await?.contains(ghz) {
            return Err(ApexError::argument_value("Frequency"));
        }
        self.link.send(&format!("TFR{:.3}", ghz)).await
    }

    /// Filter frequency in GHz.
    pub async fn frequency(&self) -> Result<f64> {
        self.link.query_f64("TFR?").await
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Optical Filter in slot {}", self.slot())
    }
}

#[async_trait]
impl WavelengthTunable for Filter {
    async fn set_wavelength(&self, wavelength_nm: f64) -> AnyResult<()> {
        Ok(Filter::set_wavelength(self, wavelength_nm).await?)
    }

    async fn get_wavelength(&self) -> AnyResult<f64> {
        Ok(self.wavelength().await?)
    }

    /// Nominal range; the module itself may report a narrower one.
    fn wavelength_range(&self) -> (f64, f64) {
        (AP1000_FIL_WL.min, AP1000_FIL_WL.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_core::units::nm_to_ghz;
    use apex_driver_mock::Ap1000Simulator;

    #[tokio::test]
    async fn test_wavelength_is_validated_against_module_limits() {
        let (conn, log) = Ap1000Simulator::new().spawn();
        let fil = Filter::new(conn, 7);
        fil.set_wavelength(1540.0).await.unwrap();
        assert!(log.wait_for("FIL[07]:TWL1540.000").await);
        assert_eq!(
            log.commands()[..2],
            ["FIL[07]:WLMIN?".to_string(), "FIL[07]:WLMAX?".to_string()]
        );
        assert_eq!(fil.wavelength().await.unwrap(), 1540.0);

        let err = fil.set_wavelength(1600.0).await.unwrap_err();
        assert_eq!(err.code(), apex_core::error::ARGUMENT_VALUE);
    }

    #[tokio::test]
    async fn test_frequency() {
        let (conn, log) = Ap1000Simulator::new().spawn();
        let fil = Filter::new(conn, 7);
        let limits = fil.frequency_limits().await.unwrap();
        assert!(limits.min < limits.max);
        fil.set_frequency(194_000.0).await.unwrap();
        assert!(log.wait_for("FIL[07]:TFR194000.000").await);
        assert_eq!(fil.frequency().await.unwrap(), 194_000.0);
        let nm = fil.wavelength().await.unwrap();
        assert!((nm - nm_to_ghz(194_000.0)).abs() < 1e-3);
        assert!(fil.set_frequency(100.0).await.is_err());
    }
}
