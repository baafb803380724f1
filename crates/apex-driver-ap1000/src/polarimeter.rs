//! AP1000 polarimeter (`POL`).
//!
//! Measurement replies that cannot be parsed are returned as NaN rather than
//! as errors: a polarimeter reading mid-acquisition may answer garbage for a
//! single detector, and callers usually keep the other values.

use std::fmt;

use anyhow::Result as AnyResult;
use apex_core::capabilities::{Readable, WavelengthTunable};
use apex_core::error::Result;
use apex_core::limits::{AP1000_POL_ACQ, AP1000_POL_WL};
use apex_core::protocol::{float_repr, parse_float_list, tokens, zero_padded};
use apex_core::units::{ghz_to_nm, nm_to_ghz, PowerUnit};
use apex_core::{clamp_with_warning, Connection};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::slot::SlotLink;

/// Identity of the detector board inside the polarimeter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoardId {
    /// Board serial number
    pub serial: String,
    /// Firmware version
    pub firmware: String,
    /// EEPROM layout version
    pub eeprom_version: String,
}

impl BoardId {
    fn parse(reply: &str) -> Self {
        let mut fields = tokens(reply, ' ').map(str::to_string);
        Self {
            serial: fields.next().unwrap_or_default(),
            firmware: fields.next().unwrap_or_default(),
            eeprom_version: fields.next().unwrap_or_default(),
        }
    }
}

/// Polarimeter in an AP1000 slot.
#[derive(Debug)]
pub struct Polarimeter {
    link: SlotLink,
    unit: Mutex<PowerUnit>,
}

impl Polarimeter {
    /// Attach to the polarimeter in `slot`.
    pub fn new(conn: Connection, slot: u8) -> Self {
        Self {
            link: SlotLink::new(conn, "POL", slot),
            unit: Mutex::new(PowerUnit::Dbm),
        }
    }

    /// Slot number.
    pub fn slot(&self) -> u8 {
        self.link.slot()
    }

    /// Select the power unit.
    pub fn set_unit(&self, unit: PowerUnit) {
        *self.unit.lock() = unit;
    }

    /// Current power unit.
    pub fn unit(&self) -> PowerUnit {
        *self.unit.lock()
    }

    /// Set the acquisition time in ms, clamped to 1..=10000.
    pub async fn set_acquisition_time(&self, ms: f64) -> Result<()> {
        let ms = clamp_with_warning("POL Acquisition time", "ms", ms, AP1000_POL_ACQ);
        self.link.send(&format!("ACQTIME{}", float_repr(ms))).await
    }

    /// Acquisition time in ms.
    pub async fn acquisition_time(&self) -> Result<f64> {
        self.link.query_f64("ACQTIME?").await
    }

    /// Set the calibration wavelength in nm, clamped to 1250..=1650.
    pub async fn set_wavelength(&self, nm: f64) -> Result<()> {
        let nm = clamp_with_warning("POL Wavelength", "nm", nm, AP1000_POL_WL);
        self.link.send(&format!("WL{}", zero_padded(nm))).await
    }

    /// Calibration wavelength in nm.
    pub async fn wavelength(&self) -> Result<f64> {
        self.link.query_f64("WL?").await
    }

    /// Set the calibration frequency in GHz. A non-positive frequency selects the maximum wavelength.
    pub async fn set_frequency(&self, ghz: f64) -> Result<()> {
        if ghz > 0.0 {
            self.set_wavelength(ghz_to_nm(ghz)).await
        } else {
            tracing::warn!(slot = self.slot(), "POL Frequency is set to its minimum value");
            self.set_wavelength(AP1000_POL_WL.max).await
        }
    }

    /// Calibration frequency in GHz.
    pub async fn frequency(&self) -> Result<f64> {
        Ok(nm_to_ghz(self.wavelength().await?))
    }

    /// Total power in the current unit, NaN when unparsable.
    pub async fn power(&self) -> Result<f64> {
        let verb = match self.unit() {
            PowerUnit::Dbm => "DBM?",
            PowerUnit::Mw => "MW?",
        };
        self.nan_on_error(verb).await
    }

    /// Normalised Stokes parameters (S0..S3 as reported).
    pub async fn sop(&self) -> Result<Vec<f64>> {
        Ok(parse_float_list(&self.link.query("SOP?").await?, ' '))
    }

    /// Detector board identity (calibration only).
    pub async fn board_id(&self) -> Result<BoardId> {
        Ok(BoardId::parse(&self.link.query("BOARDID?").await?))
    }

    /// Raw codes of the four detectors (calibration only).
    pub async fn raw_values(&self) -> Result<Vec<Option<i64>>> {
        let reply = self.link.query("RAW4?").await?;
        Ok(tokens(&reply, ' ').map(|t| t.parse().ok()).collect())
    }

    /// Power of the four detectors in dBm (calibration only).
    pub async fn power_values(&self) -> Result<Vec<f64>> {
        Ok(parse_float_list(&self.link.query("POW4?").await?, ' '))
    }

    /// Board temperature in °C, NaN when unparsable.
    pub async fn temperature(&self) -> Result<f64> {
        self.nan_on_error("TEMP?").await
    }

    async fn nan_on_error(&self, verb: &str) -> Result<f64> {
        let reply = self.link.query(verb).await?;
        Ok(reply.trim().parse().unwrap_or(f64::NAN))
    }
}

impl fmt::Display for Polarimeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Polarimeter in slot {}", self.slot())
    }
}

#[async_trait]
impl Readable for Polarimeter {
    async fn read(&self) -> AnyResult<f64> {
        Ok(self.power().await?)
    }
}

#[async_trait]
impl WavelengthTunable for Polarimeter {
    async fn set_wavelength(&self, wavelength_nm: f64) -> AnyResult<()> {
        Ok(Polarimeter::set_wavelength(self, wavelength_nm).await?)
    }

    async fn get_wavelength(&self) -> AnyResult<f64> {
        Ok(self.wavelength().await?)
    }

    fn wavelength_range(&self) -> (f64, f64) {
        (AP1000_POL_WL.min, AP1000_POL_WL.max)
    }
}
