//! Slot-addressed command helper shared by every module driver.

use apex_core::error::{ApexError, Result};
use apex_core::identity::Identity;
use apex_core::limits::{AP1000_SLOT_MAX, AP1000_SLOT_MIN};
use apex_core::protocol::slot_command;
use apex_core::Connection;

/// Reject slot numbers outside the card cage.
pub fn check_slot(slot: u8) -> Result<()> {
    if (AP1000_SLOT_MIN..=AP1000_SLOT_MAX).contains(&slot) {
        Ok(())
    } else {
        Err(ApexError::argument_value("SlotNumber"))
    }
}

/// Connection bound to one `MODULE[nn]` prefix.
#[derive(Debug, Clone)]
pub(crate) struct SlotLink {
    conn: Connection,
    module: &'static str,
    slot: u8,
}

impl SlotLink {
    pub(crate) fn new(conn: Connection, module: &'static str, slot: u8) -> Self {
        Self { conn, module, slot }
    }

    pub(crate) fn slot(&self) -> u8 {
        self.slot
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn command(&self, verb: &str) -> String {
        slot_command(self.module, self.slot, verb)
    }

    pub(crate) async fn send(&self, verb: &str) -> Result<()> {
        self.conn.send(&self.command(verb)).await
    }

    pub(crate) async fn query(&self, verb: &str) -> Result<String> {
        self.conn.query(&self.command(verb)).await
    }

    pub(crate) async fn query_f64(&self, verb: &str) -> Result<f64> {
        self.conn.query_f64(&self.command(verb)).await
    }

    pub(crate) async fn query_i64(&self, verb: &str) -> Result<i64> {
        self.conn.query_i64(&self.command(verb)).await
    }

    /// Identity of the module in this slot (`SLT[nn]:IDN?`).
    pub(crate) async fn identity(&self) -> Result<Identity> {
        let reply = self.conn.query(&slot_command("SLT", self.slot, "IDN?")).await?;
        Ok(Identity::new(reply))
    }
}
