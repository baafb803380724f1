//! AP1000 erbium doped fiber amplifier (`AMP`).

use std::fmt;

use anyhow::Result as AnyResult;
use apex_core::capabilities::Readable;
use apex_core::error::{ApexError, Result};
use apex_core::limits::{BandRange, AP1000_EFA_IPMAX, AP1000_EFA_VOLT_PER_LSB};
use apex_core::protocol::parse_i64;
use apex_core::units::PowerUnit;
use apex_core::{clamp_with_warning, Connection};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::slot::SlotLink;

/// Amplifier class, from the option letter of the slot identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmplifierClass {
    /// Option `A`
    Booster,
    /// Option `B`
    InLine,
    /// Option `C`
    PreAmplifier,
}

impl AmplifierClass {
    fn from_option(letter: &str) -> Option<Self> {
        match letter {
            "A" => Some(AmplifierClass::Booster),
            "B" => Some(AmplifierClass::InLine),
            "C" => Some(AmplifierClass::PreAmplifier),
            _ => None,
        }
    }

    /// Vendor sub-type index.
    pub fn index(self) -> usize {
        match self {
            AmplifierClass::Booster => 0,
            AmplifierClass::InLine => 1,
            AmplifierClass::PreAmplifier => 2,
        }
    }

    /// Maximum pump current in mA.
    pub fn max_pump_current(self) -> f64 {
        AP1000_EFA_IPMAX[self.index()]
    }
}

impl fmt::Display for AmplifierClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmplifierClass::Booster => write!(f, "Booster"),
            AmplifierClass::InLine => write!(f, "In-Line"),
            AmplifierClass::PreAmplifier => write!(f, "Pre-Amplifier"),
        }
    }
}

/// Photodiode converter code to volts.
pub fn code_to_volts(code: i64) -> f64 {
    code as f64 * AP1000_EFA_VOLT_PER_LSB
}

/// Erbium amplifier in an AP1000 slot.
#[derive(Debug)]
pub struct ErbiumAmplifier {
    link: SlotLink,
    class: AmplifierClass,
    unit: Mutex<PowerUnit>,
}

impl ErbiumAmplifier {
    /// Attach to the amplifier in `slot` and decode its class.
    pub async fn new(conn: Connection, slot: u8) -> Result<Self> {
        let link = SlotLink::new(conn, "AMP", slot);
        let identity = link.identity().await?;
        let class = identity
            .option_letter()
            .and_then(AmplifierClass::from_option)
            .ok_or(ApexError::SlotTypeNotDefined(slot))?;
        tracing::info!(slot, class = %class, "erbium amplifier attached");
        Ok(Self {
            link,
            class,
            unit: Mutex::new(PowerUnit::Dbm),
        })
    }

    /// Slot number.
    pub fn slot(&self) -> u8 {
        self.link.slot()
    }

    /// Amplifier class.
    pub fn class(&self) -> AmplifierClass {
        self.class
    }

    /// Select the power unit.
    pub fn set_unit(&self, unit: PowerUnit) {
        *self.unit.lock() = unit;
    }

    /// Current power unit.
    pub fn unit(&self) -> PowerUnit {
        *self.unit.lock()
    }

    async fn voltage_code(&self, verb: &str) -> Result<i64> {
        let reply = self.link.query(verb).await?;
        parse_i64(&self.link.command(verb), &reply)
    }

    /// Input photodiode code (1 LSB = 2.048/4096 V).
    pub async fn in_voltage(&self) -> Result<i64> {
        self.voltage_code("POWERINVALUE").await
    }

    /// Output photodiode code (1 LSB = 2.048/4096 V).
    pub async fn out_voltage(&self) -> Result<i64> {
        self.voltage_code("POWEROUTVALUE").await
    }

    /// Set the pump current in mA, clamped to the class maximum.
    pub async fn set_pump_current(&self, ma: f64) -> Result<()> {
        let range = BandRange {
            min: 0.0,
            max: self.class.max_pump_current(),
        };
        let ma = clamp_with_warning("EFA Pump current", "mA", ma, range);
        self.link.send(&format!("PUMP{:.1}", ma)).await
    }

    /// Input power in the current unit.
    pub async fn in_power(&self) -> Result<f64> {
        Ok(self.unit().from_dbm(self.link.query_f64("INDB?").await?))
    }

    /// Output power in the current unit.
    pub async fn out_power(&self) -> Result<f64> {
        Ok(self.unit().from_dbm(self.link.query_f64("OTDB?").await?))
    }
}

impl fmt::Display for ErbiumAmplifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Erbium Amplifier in slot {}", self.slot())
    }
}

#[async_trait]
impl Readable for ErbiumAmplifier {
    async fn read(&self) -> AnyResult<f64> {
        Ok(self.out_power().await?)
    }
}
