//! AP1000 mainframe: identity, slot discovery and module drivers.
//!
//! The mainframe owns the TCP connection. Every module driver obtained from
//! it holds a clone of that connection, so all modules share one link and
//! their commands are serialised by the link lock.
//!
//! ```rust,ignore
//! let ap1000 = Ap1000::connect("192.168.1.10", 5900).await?;
//! let tls = ap1000.tunable_laser(3, false).await?;
//! tls.set_wavelength(1550.0).await?;
//! tls.on().await?;
//! ```

use std::fmt;

use apex_core::error::{ApexError, Result};
use apex_core::identity::{slot_module_code, slot_serial_number, Identity};
use apex_core::limits::{
    module_name, AP1000_ATT, AP1000_DFB_CBAND, AP1000_DFB_LBAND, AP1000_DFB_OBAND, AP1000_EFA_BOOST,
    AP1000_EFA_INLINE, AP1000_EFA_PREAMP, AP1000_OSW, AP1000_PWM, AP1000_SLOT_MAX, AP1000_SLOT_MIN,
    AP1000_TLS_CBAND, AP1000_TLS_LBAND,
};
use apex_core::protocol::slot_command;
use apex_core::transport::{DEFAULT_TCP_PORT, DEFAULT_TIMEOUT};
use apex_core::Connection;

use crate::attenuator::Attenuator;
use crate::dfb_laser::DfbLaser;
use crate::erbium_amplifier::ErbiumAmplifier;
use crate::filter::Filter;
use crate::optical_switch::OpticalSwitch;
use crate::osa::Osa;
use crate::polarimeter::Polarimeter;
use crate::power_meter::{PowerMeter, PowerMeterModel};
use crate::slot::check_slot;
use crate::tunable_laser::TunableLaser;

/// What a slot holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotContent {
    /// No module in the slot
    Empty,
    /// Identified module
    Module {
        /// Module code from the slot identity
        code: u32,
        /// Display name of the module
        name: &'static str,
    },
}

impl fmt::Display for SlotContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotContent::Empty => write!(f, "Slot not used"),
            SlotContent::Module { name, .. } => write!(f, "{}", name),
        }
    }
}

/// AP1000 mainframe.
#[derive(Debug, Clone)]
pub struct Ap1000 {
    conn: Connection,
}

impl Ap1000 {
    /// Connect to a mainframe over TCP.
    pub async fn connect(host: &str, port: Option<u16>) -> Result<Self> {
        let port = port.unwrap_or(DEFAULT_TCP_PORT);
        let conn = Connection::connect_tcp(host, port, DEFAULT_TIMEOUT, "AP1000").await?;
        tracing::info!(host, port, "connected to AP1000");
        Ok(Self { conn })
    }

    /// Wrap an existing connection (simulators, tests, custom transports).
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Shared connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Mainframe identity (`*IDN?`).
    pub async fn id(&self) -> Result<Identity> {
        Ok(Identity::new(self.conn.query("*IDN?").await?))
    }

    /// Reset the mainframe (`*RST`).
    pub async fn reset(&self) -> Result<()> {
        self.conn.send("*RST").await
    }

    /// True when a module sits in `slot`.
    pub async fn slot_used(&self, slot: u8) -> Result<bool> {
        check_slot(slot)?;
        let command = slot_command("SLT", slot, "EMPTY?");
        match self.conn.query(&command).await?.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(ApexError::invalid_reply(command, other)),
        }
    }

    /// Identity of the module in `slot`, `None` when the slot is empty.
    ///
    /// With `force` the emptiness check is skipped.
    pub async fn slot_id(&self, slot: u8, force: bool) -> Result<Option<Identity>> {
        check_slot(slot)?;
        if !force && !self.slot_used(slot).await? {
            return Ok(None);
        }
        let reply = self.conn.query(&slot_command("SLT", slot, "IDN?")).await?;
        Ok(Some(Identity::new(reply)))
    }

    /// Serial number of the module in `slot`.
    pub async fn slot_serial(&self, slot: u8, force: bool) -> Result<u64> {
        let identity = self
            .slot_id(slot, force)
            .await?
            .ok_or(ApexError::SlotNotDefined(slot))?;
        slot_serial_number(slot, &identity)
    }

    /// Module type of `slot`.
    pub async fn slot_type(&self, slot: u8) -> Result<SlotContent> {
        let Some(identity) = self.slot_id(slot, false).await? else {
            return Ok(SlotContent::Empty);
        };
        let code = slot_module_code(slot, &identity)?;
        let name = module_name(code).ok_or(ApexError::SlotNotDefined(slot))?;
        Ok(SlotContent::Module { code, name })
    }

    /// Type of every slot in `0..=max_slot`, skipping empty ones.
    pub async fn scan_slots(&self, max_slot: u8) -> Result<Vec<(u8, SlotContent)>> {
        let mut found = Vec::new();
        for slot in AP1000_SLOT_MIN..=max_slot.min(AP1000_SLOT_MAX) {
            match self.slot_type(slot).await {
                Ok(SlotContent::Empty) => {}
                Ok(content) => found.push((slot, content)),
                Err(e) if e.is_communication() => return Err(e),
                Err(e) => tracing::warn!(slot, error = %e, "slot skipped"),
            }
        }
        Ok(found)
    }

    async fn require_module(&self, slot: u8, codes: &[u32], force: bool) -> Result<()> {
        check_slot(slot)?;
        if force {
            return Ok(());
        }
        match self.slot_type(slot).await? {
            SlotContent::Module { code, .. } if codes.contains(&code) => Ok(()),
            other => {
                tracing::warn!(slot, found = %other, "slot does not hold the requested module");
                Err(ApexError::SlotNotGoodType(slot))
            }
        }
    }

    /// Power meter in `slot` with the standard `POW` prefix.
    pub async fn power_meter(&self, slot: u8, force: bool) -> Result<PowerMeter> {
        self.power_meter_model(slot, PowerMeterModel::Standard, force).await
    }

    /// Power meter in `slot` with an explicit prefix variant.
    pub async fn power_meter_model(&self, slot: u8, model: PowerMeterModel, force: bool) -> Result<PowerMeter> {
        self.require_module(slot, &[AP1000_PWM], force).await?;
        PowerMeter::new(self.conn.clone(), slot, model).await
    }

    /// Attenuator in `slot`.
    pub async fn attenuator(&self, slot: u8, force: bool) -> Result<Attenuator> {
        self.require_module(slot, &[AP1000_ATT], force).await?;
        Ok(Attenuator::new(self.conn.clone(), slot))
    }

    /// Tunable laser in `slot`.
    pub async fn tunable_laser(&self, slot: u8, force: bool) -> Result<TunableLaser> {
        self.require_module(slot, &[AP1000_TLS_CBAND, AP1000_TLS_LBAND], force)
            .await?;
        TunableLaser::new(self.conn.clone(), slot).await
    }

    /// DFB laser in `slot`.
    pub async fn dfb_laser(&self, slot: u8, force: bool) -> Result<DfbLaser> {
        self.require_module(slot, &[AP1000_DFB_CBAND, AP1000_DFB_LBAND, AP1000_DFB_OBAND], force)
            .await?;
        DfbLaser::new(self.conn.clone(), slot).await
    }

    /// Erbium amplifier in `slot`.
    pub async fn erbium_amplifier(&self, slot: u8, force: bool) -> Result<ErbiumAmplifier> {
        self.require_module(slot, &[AP1000_EFA_PREAMP, AP1000_EFA_BOOST, AP1000_EFA_INLINE], force)
            .await?;
        ErbiumAmplifier::new(self.conn.clone(), slot).await
    }

    /// Optical switch in `slot`.
    pub async fn optical_switch(&self, slot: u8, force: bool) -> Result<OpticalSwitch> {
        self.require_module(slot, &[AP1000_OSW], force).await?;
        Ok(OpticalSwitch::new(self.conn.clone(), slot))
    }

    /// Filter in `slot`. Filters have no module code, so only the slot number is checked.
    pub fn filter(&self, slot: u8) -> Result<Filter> {
        check_slot(slot)?;
        Ok(Filter::new(self.conn.clone(), slot))
    }

    /// Polarimeter in `slot`. Only the slot number is checked.
    pub fn polarimeter(&self, slot: u8) -> Result<Polarimeter> {
        check_slot(slot)?;
        Ok(Polarimeter::new(self.conn.clone(), slot))
    }

    /// OSA addressed through the power meter or polarimeter in `power_slot`.
    pub fn osa(&self, power_slot: u8) -> Result<Osa> {
        check_slot(power_slot)?;
        Ok(Osa::new(self.conn.clone(), power_slot))
    }

    /// Close the link.
    pub async fn close(&self) -> Result<()> {
        self.conn.close().await
    }
}
