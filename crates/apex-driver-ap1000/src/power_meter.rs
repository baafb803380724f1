//! AP1000 optical power meter module (`POW`, `POWB`, `POW1`).
//!
//! The module has one or more detector channels; the channel types are the
//! variant digits of the slot identity (`13` = Standard then High Power).
//! Channel numbers start at 1 and a channel above the channel count falls
//! back to channel 1 with a warning.

use std::fmt;

use anyhow::Result as AnyResult;
use apex_core::capabilities::{Readable, WavelengthTunable};
use apex_core::error::{ApexError, Result};
use apex_core::limits::{
    BandRange, AP1000_PWM_AVGMAX, AP1000_PWM_AVGMIN, AP1000_PWM_CHTYPE, AP1000_PWM_WLMAX, AP1000_PWM_WLMIN,
};
use apex_core::protocol::{float_repr, zero_padded};
use apex_core::units::{ghz_to_nm, nm_to_ghz, PowerUnit};
use apex_core::{clamp_with_warning, Connection};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::slot::SlotLink;

const WAVELENGTH: BandRange = BandRange {
    min: AP1000_PWM_WLMIN,
    max: AP1000_PWM_WLMAX,
};

const AVERAGE_TIME: BandRange = BandRange {
    min: AP1000_PWM_AVGMIN,
    max: AP1000_PWM_AVGMAX,
};

/// Command prefix variants of the power meter module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerMeterModel {
    /// `POW`
    #[default]
    Standard,
    /// `POWB`
    B,
    /// `POW1`
    One,
}

impl PowerMeterModel {
    /// Command prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            PowerMeterModel::Standard => "POW",
            PowerMeterModel::B => "POWB",
            PowerMeterModel::One => "POW1",
        }
    }
}

/// Detector type of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// Standard detector (digit `1`)
    Standard,
    /// High power detector (digit `3`)
    HighPower,
}

impl ChannelType {
    fn from_digit(digit: char) -> Option<Self> {
        AP1000_PWM_CHTYPE
            .iter()
            .find(|(d, _)| *d == digit)
            .map(|(d, _)| if *d == '3' { ChannelType::HighPower } else { ChannelType::Standard })
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::Standard => write!(f, "Standard"),
            ChannelType::HighPower => write!(f, "High Power"),
        }
    }
}

#[derive(Debug)]
struct PowerMeterState {
    unit: PowerUnit,
    wavelength: f64,
    average_time: f64,
}

/// Power meter in an AP1000 slot.
#[derive(Debug)]
pub struct PowerMeter {
    link: SlotLink,
    model: PowerMeterModel,
    channels: Vec<ChannelType>,
    state: Mutex<PowerMeterState>,
}

impl PowerMeter {
    /// Attach to the power meter in `slot` and read its channel layout.
    pub async fn new(conn: Connection, slot: u8, model: PowerMeterModel) -> Result<Self> {
        let link = SlotLink::new(conn, model.prefix(), slot);
        let identity = link.identity().await?;
        let digits = identity.variant().ok_or(ApexError::SlotNotDefined(slot))?;
        let channels: Vec<ChannelType> = digits.chars().filter_map(ChannelType::from_digit).collect();
        if channels.is_empty() {
            return Err(ApexError::SlotTypeNotDefined(slot));
        }
        tracing::info!(slot, model = model.prefix(), channels = channels.len(), "power meter attached");
        Ok(Self {
            link,
            model,
            channels,
            state: Mutex::new(PowerMeterState {
                unit: PowerUnit::Dbm,
                wavelength: 1550.0,
                average_time: 1000.0,
            }),
        })
    }

    /// Slot number.
    pub fn slot(&self) -> u8 {
        self.link.slot()
    }

    /// Command prefix variant.
    pub fn model(&self) -> PowerMeterModel {
        self.model
    }

    /// Detector type of each channel, channel 1 first.
    pub fn channels(&self) -> &[ChannelType] {
        &self.channels
    }

    fn channel(&self, channel: u8) -> u8 {
        if channel == 0 || usize::from(channel) > self.channels.len() {
            tracing::warn!(slot = self.slot(), requested = channel, "PWM channel is set to 1");
            1
        } else {
            channel
        }
    }

    /// Set the averaging time in ms (clamped to 15..=10000).
    pub async fn set_average_time(&self, ms: f64) -> Result<()> {
        let ms = clamp_with_warning("PWM average time", "ms", ms, AVERAGE_TIME);
        self.link.send(&format!("SETAVERAGE{}", float_repr(ms))).await?;
        self.state.lock().average_time = ms;
        Ok(())
    }

    /// Averaging time in ms.
    pub async fn average_time(&self) -> Result<f64> {
        let query = match self.model {
            PowerMeterModel::One => "GETAVERAGE",
            PowerMeterModel::Standard | PowerMeterModel::B => "SETAVERAGE?",
        };
        let ms = self.link.query_f64(query).await?;
        self.state.lock().average_time = ms;
        Ok(ms)
    }

    /// Set the calibration wavelength of a channel in nm (clamped to 800..=1700).
    pub async fn set_wavelength(&self, nm: f64, channel: u8) -> Result<()> {
        let nm = clamp_with_warning("PWM wavelength", "nm", nm, WAVELENGTH);
        let ch = self.channel(channel);
        self.link
            .send(&format!("SETWAVELENGTH[{}]{}", ch, zero_padded(nm)))
            .await?;
        self.state.lock().wavelength = nm;
        Ok(())
    }

    /// Calibration wavelength of a channel in nm.
    pub async fn wavelength(&self, channel: u8) -> Result<f64> {
        let ch = self.channel(channel);
        let nm = self.link.query_f64(&format!("WAV[{}]?", ch)).await?;
        self.state.lock().wavelength = nm;
        Ok(nm)
    }

    /// Set the calibration frequency of a channel in GHz.
    ///
    /// A non-positive frequency selects the maximum wavelength.
    pub async fn set_frequency(&self, ghz: f64, channel: u8) -> Result<()> {
        if ghz > 0.0 {
            self.set_wavelength(ghz_to_nm(ghz), channel).await
        } else {
            tracing::warn!(slot = self.slot(), "PWM wavelength is set to its maximum value");
            self.set_wavelength(AP1000_PWM_WLMAX, channel).await
        }
    }

    /// Calibration frequency of a channel in GHz.
    pub async fn frequency(&self, channel: u8) -> Result<f64> {
        Ok(nm_to_ghz(self.wavelength(channel).await?))
    }

    /// Select the unit of [`PowerMeter::power`].
    pub fn set_unit(&self, unit: PowerUnit) {
        self.state.lock().unit = unit;
    }

    /// Current power unit.
    pub fn unit(&self) -> PowerUnit {
        self.state.lock().unit
    }

    /// Measured power of a channel in the current unit.
    pub async fn power(&self, channel: u8) -> Result<f64> {
        let ch = self.channel(channel);
        let verb = match self.unit() {
            PowerUnit::Dbm => format!("DBM[{}]?", ch),
            PowerUnit::Mw => format!("MW[{}]?", ch),
        };
        self.link.query_f64(&verb).await
    }
}

impl fmt::Display for PowerMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Optical Power Meter in slot {}", self.slot())
    }
}

#[async_trait]
impl Readable for PowerMeter {
    async fn read(&self) -> AnyResult<f64> {
        Ok(self.power(1).await?)
    }
}

#[async_trait]
impl WavelengthTunable for PowerMeter {
    async fn set_wavelength(&self, wavelength_nm: f64) -> AnyResult<()> {
        Ok(PowerMeter::set_wavelength(self, wavelength_nm, 1).await?)
    }

    async fn get_wavelength(&self) -> AnyResult<f64> {
        Ok(self.wavelength(1).await?)
    }

    fn wavelength_range(&self) -> (f64, f64) {
        (AP1000_PWM_WLMIN, AP1000_PWM_WLMAX)
    }
}
