//! AP1000 two channel optical attenuator (`ATT`).

use std::fmt;

use apex_core::error::{ApexError, Result};
use apex_core::limits::{AP1000_ATT_ATTMAX, AP1000_ATT_ATTMIN, AP1000_ATT_CHNUMBER};
use apex_core::units::AttenuationUnit;
use apex_core::Connection;
use parking_lot::Mutex;

use crate::slot::SlotLink;

/// Attenuator in an AP1000 slot.
///
/// Channels are numbered 1 and 2; on the wire they are addressed 0 and 1.
#[derive(Debug)]
pub struct Attenuator {
    link: SlotLink,
    unit: Mutex<AttenuationUnit>,
}

impl Attenuator {
    /// Attach to the attenuator in `slot`.
    pub fn new(conn: Connection, slot: u8) -> Self {
        Self {
            link: SlotLink::new(conn, "ATT", slot),
            unit: Mutex::new(AttenuationUnit::Db),
        }
    }

    /// Slot number.
    pub fn slot(&self) -> u8 {
        self.link.slot()
    }

    /// Select the unit of attenuation values.
    pub fn set_unit(&self, unit: AttenuationUnit) {
        *self.unit.lock() = unit;
    }

    /// Current attenuation unit.
    pub fn unit(&self) -> AttenuationUnit {
        *self.unit.lock()
    }

    fn wire_channel(channel: u8) -> Result<u8> {
        if (1..=AP1000_ATT_CHNUMBER).contains(&channel) {
            Ok(channel - 1)
        } else {
            Err(ApexError::argument_value("Channel"))
        }
    }

    /// Set the attenuation of a channel in the current unit.
    ///
    /// Values outside 0..=31 dB are rejected, not clamped.
    pub async fn set_attenuation(&self, value: f64, channel: u8) -> Result<()> {
        let ch = Self::wire_channel(channel)?;
        let db = self.unit().to_db(value)?;
        if !(AP1000_ATT_ATTMIN..=AP1000_ATT_ATTMAX).contains(&db) {
            return Err(ApexError::argument_value("Attenuation"));
        }
        self.link.send(&format!("DB[{}]{:.1}", ch, db)).await
    }

    /// Attenuation of a channel in the current unit.
    pub async fn attenuation(&self, channel: u8) -> Result<f64> {
        let ch = Self::wire_channel(channel)?;
        let db = self.link.query_f64(&format!("DB[{}]?", ch)).await?;
        Ok(self.unit().from_db(db))
    }
}

impl fmt::Display for Attenuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Optical Attenuator in slot {}", self.slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_driver_mock::ap1000::{Ap1000Simulator, SIMU_ATT_ID};

    #[tokio::test]
    async fn test_set_attenuation_db() {
        let (conn, log) = Ap1000Simulator::new().with_module(2, SIMU_ATT_ID).spawn();
        let att = Attenuator::new(conn, 2);
        att.set_attenuation(12.34, 2).await.unwrap();
        assert!(log.wait_for("ATT[02]:DB[1]12.3").await);
        assert_eq!(att.attenuation(2).await.unwrap(), 12.3);
        assert_eq!(att.attenuation(1).await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn test_percent_unit() {
        let (conn, log) = Ap1000Simulator::new().spawn();
        let att = Attenuator::new(conn, 2);
        att.set_unit(AttenuationUnit::Percent);
        att.set_attenuation(10.0, 1).await.unwrap();
        assert!(log.wait_for("ATT[02]:DB[0]10.0").await);
        let pct = att.attenuation(1).await.unwrap();
        assert!((pct - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let (conn, log) = Ap1000Simulator::new().spawn();
        let att = Attenuator::new(conn, 2);
        let err = att.set_attenuation(40.0, 1).await.unwrap_err();
        assert_eq!(err.code(), apex_core::error::ARGUMENT_VALUE);
        assert!(att.set_attenuation(1.0, 3).await.is_err());
        assert!(att.attenuation(0).await.is_err());
        att.set_unit(AttenuationUnit::Percent);
        assert!(att.set_attenuation(0.0, 1).await.is_err());
        assert!(log.commands().is_empty());
    }
}
