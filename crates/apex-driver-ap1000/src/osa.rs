//! AP1000 optical spectrum analyser built from two modules (`OSA`).
//!
//! A power meter or polarimeter slot measures while a filter slot sweeps.
//! Commands are addressed with the power meter slot; changing that slot with
//! [`Osa::set_power_meter_slot`] also changes the prefix of every later
//! command.

use std::fmt;
use std::str::FromStr;

use apex_core::error::{ApexError, Result};
use apex_core::protocol::{parse_float_list_skipping, slot_command, zero_padded};
use apex_core::units::{ghz_to_nm, nm_to_ghz, SpectralUnit};
use apex_core::Connection;
use parking_lot::Mutex;

/// Sweep mode of [`Osa::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepMode {
    /// `SWEEP1`
    #[default]
    Single,
    /// `SWEEP2`
    Repeat,
}

impl FromStr for SweepMode {
    type Err = std::convert::Infallible;

    /// `"repeat"` or `2` selects a repeat sweep, anything else a single one.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if s.eq_ignore_ascii_case("repeat") || s == "2" {
            SweepMode::Repeat
        } else {
            SweepMode::Single
        })
    }
}

/// Y axis quantity of [`Osa::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OsaTrace {
    /// Power in dBm
    #[default]
    Log,
    /// Stokes S1
    S1,
    /// Stokes S2
    S2,
    /// Stokes S3
    S3,
    /// Power in mW
    Lin,
    /// Degree of polarisation
    Dop,
}

impl OsaTrace {
    /// `DATAY` code.
    pub fn code(self) -> u8 {
        match self {
            OsaTrace::Log => 0,
            OsaTrace::S1 => 1,
            OsaTrace::S2 => 2,
            OsaTrace::S3 => 3,
            OsaTrace::Lin => 4,
            OsaTrace::Dop => 5,
        }
    }
}

impl FromStr for OsaTrace {
    type Err = std::convert::Infallible;

    /// Unknown names select the logarithmic power trace.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "lin" => OsaTrace::Lin,
            "s1" => OsaTrace::S1,
            "s2" => OsaTrace::S2,
            "s3" => OsaTrace::S3,
            "dop" => OsaTrace::Dop,
            _ => OsaTrace::Log,
        })
    }
}

/// Measured spectrum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    /// X axis (nm or GHz)
    pub x: Vec<f64>,
    /// Y axis
    pub y: Vec<f64>,
}

#[derive(Debug)]
struct OsaSlots {
    power: u8,
    filter: Option<u8>,
}

/// Spectrum analyser made of a power meter slot and a filter slot.
#[derive(Debug)]
pub struct Osa {
    conn: Connection,
    slots: Mutex<OsaSlots>,
}

impl Osa {
    /// OSA addressed through the power meter in `power_slot`.
    pub fn new(conn: Connection, power_slot: u8) -> Self {
        Self {
            conn,
            slots: Mutex::new(OsaSlots {
                power: power_slot,
                filter: None,
            }),
        }
    }

    fn command(&self, verb: &str) -> String {
        slot_command("OSA", self.slots.lock().power, verb)
    }

    async fn send(&self, verb: &str) -> Result<()> {
        self.conn.send(&self.command(verb)).await
    }

    async fn query(&self, verb: &str) -> Result<String> {
        self.conn.query(&self.command(verb)).await
    }

    async fn query_f64(&self, verb: &str) -> Result<f64> {
        self.conn.query_f64(&self.command(verb)).await
    }

    async fn query_slot(&self, verb: &str) -> Result<u8> {
        let command = self.command(verb);
        let value = self.conn.query_i64(&command).await?;
        u8::try_from(value).map_err(|_| ApexError::invalid_reply(command, value.to_string()))
    }

    /// Select the power meter or polarimeter slot.
    pub async fn set_power_meter_slot(&self, slot: u8) -> Result<()> {
        self.send(&format!("POWER{}", slot)).await?;
        self.slots.lock().power = slot;
        Ok(())
    }

    /// Power meter or polarimeter slot.
    pub async fn power_meter_slot(&self) -> Result<u8> {
        let slot = self.query_slot("POWER?").await?;
        self.slots.lock().power = slot;
        Ok(slot)
    }

    /// Select the filter slot.
    pub async fn set_filter_slot(&self, slot: u8) -> Result<()> {
        self.send(&format!("FILTER{}", slot)).await?;
        self.slots.lock().filter = Some(slot);
        Ok(())
    }

    /// Filter slot.
    pub async fn filter_slot(&self) -> Result<u8> {
        let slot = self.query_slot("FILTER?").await?;
        self.slots.lock().filter = Some(slot);
        Ok(slot)
    }

    /// Set the start wavelength in nm.
    pub async fn set_start_wavelength(&self, nm: f64) -> Result<()> {
        self.send(&format!("STARTWL{}", zero_padded(nm))).await
    }

    /// Start wavelength in nm.
    pub async fn start_wavelength(&self) -> Result<f64> {
        self.query_f64("STARTWL?").await
    }

    /// Set the stop wavelength in nm.
    pub async fn set_stop_wavelength(&self, nm: f64) -> Result<()> {
        self.send(&format!("STOPWL{}", zero_padded(nm))).await
    }

    /// Stop wavelength in nm.
    pub async fn stop_wavelength(&self) -> Result<f64> {
        self.query_f64("STOPWL?").await
    }

    /// Set the start frequency in GHz (the stop wavelength). Ignored when not positive.
    pub async fn set_start_frequency(&self, ghz: f64) -> Result<()> {
        if ghz > 0.0 {
            self.set_stop_wavelength(ghz_to_nm(ghz)).await?;
        }
        Ok(())
    }

    /// Start frequency in GHz.
    pub async fn start_frequency(&self) -> Result<f64> {
        Ok(nm_to_ghz(self.stop_wavelength().await?))
    }

    /// Set the stop frequency in GHz (the start wavelength). Ignored when not positive.
    pub async fn set_stop_frequency(&self, ghz: f64) -> Result<()> {
        if ghz > 0.0 {
            self.set_start_wavelength(ghz_to_nm(ghz)).await?;
        }
        Ok(())
    }

    /// Stop frequency in GHz.
    pub async fn stop_frequency(&self) -> Result<f64> {
        Ok(nm_to_ghz(self.start_wavelength().await?))
    }

    /// Set the number of sweep points.
    pub async fn set_points(&self, points: u32) -> Result<()> {
        self.send(&format!("NBPTS{}", points)).await
    }

    /// Number of sweep points.
    pub async fn points(&self) -> Result<u32> {
        let command = self.command("NBPTS?");
        let value = self.conn.query_i64(&command).await?;
        u32::try_from(value).map_err(|_| ApexError::invalid_reply(command, value.to_string()))
    }

    /// Start a sweep.
    pub async fn run(&self, mode: SweepMode) -> Result<()> {
        let code = match mode {
            SweepMode::Single => 1,
            SweepMode::Repeat => 2,
        };
        self.send(&format!("SWEEP{}", code)).await
    }

    /// Stop the sweep.
    pub async fn stop(&self) -> Result<()> {
        self.send("SWEEP0").await
    }

    /// True while sweeping.
    pub async fn is_running(&self) -> Result<bool> {
        Ok(self.conn.query_i64(&self.command("SWEEP?")).await? == 1)
    }

    /// Read the last sweep. Tokens that are not numbers are skipped.
    pub async fn data(&self, x: SpectralUnit, y: OsaTrace) -> Result<Spectrum> {
        let x_code = match x {
            SpectralUnit::Nm => 0,
            SpectralUnit::Ghz => 1,
        };
        let x_reply = self.query(&format!("DATAX{}", x_code)).await?;
        let y_reply = self.query(&format!("DATAY{}", y.code())).await?;
        Ok(Spectrum {
            x: parse_float_list_skipping(&x_reply, ','),
            y: parse_float_list_skipping(&y_reply, ','),
        })
    }
}

impl fmt::Display for Osa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        match slots.filter {
            Some(filter) => write!(f, "O.S.A. based on slots {} and {}", slots.power, filter),
            None => write!(f, "O.S.A. based on slot {}", slots.power),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_driver_mock::Ap1000Simulator;

    #[test]
    fn test_selector_parsing() {
        assert_eq!("repeat".parse::<SweepMode>().unwrap(), SweepMode::Repeat);
        assert_eq!("x".parse::<SweepMode>().unwrap(), SweepMode::Single);
        assert_eq!("DOP".parse::<OsaTrace>().unwrap().code(), 5);
        assert_eq!("lin".parse::<OsaTrace>().unwrap().code(), 4);
        assert_eq!("other".parse::<OsaTrace>().unwrap(), OsaTrace::Log);
    }

    #[tokio::test]
    async fn test_slots_and_prefix() {
        let (conn, log) = Ap1000Simulator::new().spawn();
        let osa = Osa::new(conn, 1);
        osa.set_filter_slot(7).await.unwrap();
        assert!(log.wait_for("OSA[01]:FILTER7").await);
        assert_eq!(osa.to_string(), "O.S.A. based on slots 1 and 7");
        osa.set_power_meter_slot(3).await.unwrap();
        assert!(log.wait_for("OSA[01]:POWER3").await);
        assert_eq!(osa.power_meter_slot().await.unwrap(), 3);
        assert_eq!(log.last().as_deref(), Some("OSA[03]:POWER?"));
    }

    #[tokio::test]
    async fn test_range_and_points() {
        let (conn, log) = Ap1000Simulator::new().spawn();
        let osa = Osa::new(conn, 1);
        osa.set_start_wavelength(980.25).await.unwrap();
        assert!(log.wait_for("OSA[01]:STARTWL0980.250").await);
        osa.set_start_frequency(nm_to_ghz(1565.0)).await.unwrap();
        assert!(log.wait_for("OSA[01]:STOPWL1565.000").await);
        assert!((osa.start_frequency().await.unwrap() - nm_to_ghz(1565.0)).abs() < 1e-2);
        osa.set_points(20).await.unwrap();
        assert_eq!(osa.points().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_sweep_and_data() {
        let (conn, log) = Ap1000Simulator::new().spawn();
        let osa = Osa::new(conn, 1);
        osa.set_points(10).await.unwrap();
        osa.run(SweepMode::Single).await.unwrap();
        assert!(osa.is_running().await.unwrap());
        osa.stop().await.unwrap();
        assert!(!osa.is_running().await.unwrap());
        osa.run(SweepMode::Repeat).await.unwrap();
        assert!(log.wait_for("OSA[01]:SWEEP2").await);

        let spectrum = osa.data(SpectralUnit::Nm, OsaTrace::Dop).await.unwrap();
        assert_eq!(spectrum.x.len(), 10);
        assert_eq!(spectrum.y, vec![0.99; 10]);
        assert_eq!(spectrum.x[0], 1530.0);
        assert!(log.contains("OSA[01]:DATAY5"));
    }
}
