//! Behaviour shared by the tunable and DFB laser modules.
//!
//! Both modules accept the same power (`TPDB`), wavelength (`TWL`) and output
//! (`L0`/`L1`) verbs; they differ in their module prefix, band limits and a
//! few extra commands implemented in [`crate::tunable_laser`] and
//! [`crate::dfb_laser`].

use std::fmt;

use apex_core::error::{ApexError, Result};
use apex_core::limits::{BandRange, LASER_ON_DELAY};
use apex_core::protocol::zero_padded;
use apex_core::units::{nm_to_ghz, PowerUnit};
use apex_core::{clamp_with_warning, Connection};
use parking_lot::Mutex;

use crate::slot::SlotLink;

/// Spectral band of a laser module, decoded from its module code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// C band
    C,
    /// L band
    L,
    /// O band (DFB only)
    O,
}

impl Band {
    /// Vendor sub-type index (C 0, L 2, O 5).
    pub fn index(self) -> usize {
        match self {
            Band::C => 0,
            Band::L => 2,
            Band::O => 5,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Band::C => write!(f, "C"),
            Band::L => write!(f, "L"),
            Band::O => write!(f, "O"),
        }
    }
}

#[derive(Debug)]
struct LaserState {
    unit: PowerUnit,
    enabled: bool,
    wavelength: f64,
    power: f64,
}

/// Slot link plus the limits and cached state of one laser.
#[derive(Debug)]
pub(crate) struct LaserCore {
    link: SlotLink,
    label: &'static str,
    band: Band,
    power: BandRange,
    wavelength: BandRange,
    state: Mutex<LaserState>,
}

impl LaserCore {
    /// Read the slot identity and decode the band with `decode`.
    ///
    /// An unknown module code switches the output off before failing.
    pub(crate) async fn attach(
        conn: Connection,
        module: &'static str,
        label: &'static str,
        slot: u8,
        decode: fn(u32) -> Option<(Band, BandRange, BandRange)>,
    ) -> Result<Self> {
        let link = SlotLink::new(conn, module, slot);
        let identity = link.identity().await?;
        let Some((band, power, wavelength)) = identity.module_code().and_then(decode) else {
            tracing::warn!(slot, identity = %identity, "{} band cannot be decoded", label);
            link.send("L0").await?;
            return Err(ApexError::SlotTypeNotDefined(slot));
        };
        tracing::info!(slot, band = %band, "{} attached", label);
        Ok(Self {
            link,
            label,
            band,
            power,
            wavelength,
            state: Mutex::new(LaserState {
                unit: PowerUnit::Dbm,
                enabled: false,
                wavelength: 1550.0,
                power: 0.0,
            }),
        })
    }

    pub(crate) fn link(&self) -> &SlotLink {
        &self.link
    }

    pub(crate) fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn band(&self) -> Band {
        self.band
    }

    pub(crate) fn power_range(&self) -> BandRange {
        self.power
    }

    pub(crate) fn wavelength_range(&self) -> BandRange {
        self.wavelength
    }

    pub(crate) fn set_unit(&self, unit: PowerUnit) {
        self.state.lock().unit = unit;
    }

    pub(crate) fn unit(&self) -> PowerUnit {
        self.state.lock().unit
    }

    pub(crate) fn cached_status(&self) -> bool {
        self.state.lock().enabled
    }

    pub(crate) async fn set_power(&self, power: f64) -> Result<()> {
        let dbm = self.unit().to_dbm(power)?;
        let dbm = clamp_with_warning(&format!("{} Power", self.label), "dBm", dbm, self.power);
        self.link.send(&format!("TPDB{:.1}", dbm)).await?;
        self.state.lock().power = dbm;
        Ok(())
    }

    pub(crate) async fn power(&self) -> Result<f64> {
        let dbm = self.link.query_f64("TPDB?").await?;
        self.state.lock().power = dbm;
        Ok(self.unit().from_dbm(dbm))
    }

    /// Last power written or read, in the current unit.
    pub(crate) fn cached_power(&self) -> f64 {
        let state = self.state.lock();
        state.unit.from_dbm(state.power)
    }

    /// Last wavelength written or read, in nm.
    pub(crate) fn cached_wavelength(&self) -> f64 {
        self.state.lock().wavelength
    }

    pub(crate) async fn on(&self) -> Result<()> {
        self.link.send("L1").await?;
        self.state.lock().enabled = true;
        tokio::time::sleep(LASER_ON_DELAY).await;
        Ok(())
    }

    pub(crate) async fn off(&self) -> Result<()> {
        self.link.send("L0").await?;
        self.state.lock().enabled = false;
        Ok(())
    }

    pub(crate) async fn set_wavelength(&self, nm: f64) -> Result<()> {
        let nm = clamp_with_warning(&format!("{} Wavelength", self.label), "nm", nm, self.wavelength);
        self.link.send(&format!("TWL{}", zero_padded(nm))).await?;
        self.state.lock().wavelength = nm;
        Ok(())
    }

    pub(crate) async fn wavelength(&self) -> Result<f64> {
        let nm = self.link.query_f64("TWL?").await?;
        self.state.lock().wavelength = nm;
        Ok(nm)
    }

    pub(crate) async fn frequency(&self) -> Result<f64> {
        Ok(nm_to_ghz(self.wavelength().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_index() {
        assert_eq!(Band::C.index(), 0);
        assert_eq!(Band::L.index(), 2);
        assert_eq!(Band::O.index(), 5);
        assert_eq!(Band::O.to_string(), "O");
    }
}
