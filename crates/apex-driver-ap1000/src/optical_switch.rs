//! AP1000 1x2 / 2x2 optical switch (`SWI`).

use std::fmt;
use std::str::FromStr;

use apex_core::error::{ApexError, Result};
use apex_core::Connection;
use serde::{Deserialize, Serialize};

use crate::slot::SlotLink;

/// Switch configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchPath {
    /// `CONF0`
    #[default]
    Straight,
    /// `CONF1`
    Crossed,
}

impl SwitchPath {
    /// Wire code.
    pub fn code(self) -> u8 {
        match self {
            SwitchPath::Straight => 0,
            SwitchPath::Crossed => 1,
        }
    }
}

impl From<bool> for SwitchPath {
    fn from(crossed: bool) -> Self {
        if crossed {
            SwitchPath::Crossed
        } else {
            SwitchPath::Straight
        }
    }
}

impl From<i64> for SwitchPath {
    /// `1` is crossed, anything else straight.
    fn from(code: i64) -> Self {
        SwitchPath::from(code == 1)
    }
}

impl FromStr for SwitchPath {
    type Err = std::convert::Infallible;

    /// `"crossed"` (any case) or `1` is crossed, anything else straight.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("crossed") {
            return Ok(SwitchPath::Crossed);
        }
        Ok(s.parse::<i64>().map(SwitchPath::from).unwrap_or_default())
    }
}

impl fmt::Display for SwitchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchPath::Straight => write!(f, "straight"),
            SwitchPath::Crossed => write!(f, "crossed"),
        }
    }
}

/// Optical switch in an AP1000 slot.
#[derive(Debug)]
pub struct OpticalSwitch {
    link: SlotLink,
}

impl OpticalSwitch {
    /// Attach to the switch in `slot`.
    pub fn new(conn: Connection, slot: u8) -> Self {
        Self {
            link: SlotLink::new(conn, "SWI", slot),
        }
    }

    /// Slot number.
    pub fn slot(&self) -> u8 {
        self.link.slot()
    }

    /// Select the path.
    pub async fn set_path(&self, path: impl Into<SwitchPath>) -> Result<()> {
        let path = path.into();
        tracing::debug!(slot = self.slot(), %path, "switch path");
        self.link.send(&format!("CONF{}", path.code())).await
    }

    /// Current path.
    pub async fn path(&self) -> Result<SwitchPath> {
        match self.link.query_i64("CONF?").await? {
            0 => Ok(SwitchPath::Straight),
            1 => Ok(SwitchPath::Crossed),
            other => Err(ApexError::invalid_reply(self.link.command("CONF?"), other.to_string())),
        }
    }
}

impl fmt::Display for OpticalSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Optical Switch in slot {}", self.slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_driver_mock::Ap1000Simulator;

    #[test]
    fn test_path_parsing() {
        assert_eq!("Crossed".parse::<SwitchPath>().unwrap(), SwitchPath::Crossed);
        assert_eq!("1".parse::<SwitchPath>().unwrap(), SwitchPath::Crossed);
        assert_eq!("straight".parse::<SwitchPath>().unwrap(), SwitchPath::Straight);
        assert_eq!("anything".parse::<SwitchPath>().unwrap(), SwitchPath::Straight);
        assert_eq!(SwitchPath::from(true), SwitchPath::Crossed);
        assert_eq!(SwitchPath::from(2i64), SwitchPath::Straight);
    }

    #[tokio::test]
    async fn test_set_and_read_path() {
        let (conn, log) = Ap1000Simulator::with_default_slots().spawn();
        let osw = OpticalSwitch::new(conn, 6);
        assert_eq!(osw.path().await.unwrap(), SwitchPath::Straight);
        osw.set_path(true).await.unwrap();
        assert!(log.wait_for("SWI[06]:CONF1").await);
        assert_eq!(osw.path().await.unwrap(), SwitchPath::Crossed);
    }
}
