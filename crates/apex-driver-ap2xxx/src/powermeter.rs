//! Powermeter embedded in the AP2XXX.

use std::fmt;

use anyhow::Result as AnyResult;
use apex_core::capabilities::Readable;
use apex_core::error::Result;
use apex_core::identity::Identity;
use apex_core::units::PowerUnit;
use apex_core::Connection;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Embedded powermeter.
#[derive(Debug)]
pub struct Powermeter {
    conn: Connection,
    identity: Identity,
    unit: Mutex<PowerUnit>,
}

impl Powermeter {
    /// Powermeter of the AP2XXX identified by `identity`.
    pub fn new(conn: Connection, identity: Identity) -> Self {
        Self {
            conn,
            identity,
            unit: Mutex::new(PowerUnit::Dbm),
        }
    }

    /// Select the unit of [`Powermeter::power`].
    pub fn set_unit(&self, unit: PowerUnit) {
        *self.unit.lock() = unit;
    }

    /// Current unit.
    pub fn unit(&self) -> PowerUnit {
        *self.unit.lock()
    }

    /// Measured power in the current unit. The detector always answers in dBm.
    pub async fn power(&self) -> Result<f64> {
        let dbm = self.conn.query_f64("SPMEASDETECTORDBM1").await?;
        Ok(self.unit().from_dbm(dbm))
    }
}

impl fmt::Display for Powermeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Powermeter of {}", self.identity)
    }
}

#[async_trait]
impl Readable for Powermeter {
    async fn read(&self) -> AnyResult<f64> {
        Ok(self.power().await?)
    }
}
