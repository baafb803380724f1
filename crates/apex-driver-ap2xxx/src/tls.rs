//! Tunable laser embedded in the AP2XXX (`TLS*` commands).

use std::fmt;

use anyhow::Result as AnyResult;
use apex_core::capabilities::{EmissionControl, WavelengthTunable};
use apex_core::error::{ApexError, Result};
use apex_core::identity::Identity;
use apex_core::limits::AP2XXX_LIMITS;
use apex_core::protocol::float_repr;
use apex_core::units::PowerUnit;
use apex_core::Connection;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Sweep repetition of [`Tls::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsSweep {
    /// One sweep (`TLSSWP0`)
    #[default]
    Single,
    /// Continuous sweeps (`TLSSWP1`)
    Repeat,
}

/// Embedded tunable laser.
#[derive(Debug)]
pub struct Tls {
    conn: Connection,
    identity: Identity,
    unit: Mutex<PowerUnit>,
    status: Mutex<bool>,
}

impl Tls {
    /// Laser of the AP2XXX identified by `identity`.
    pub fn new(conn: Connection, identity: Identity) -> Self {
        Self {
            conn,
            identity,
            unit: Mutex::new(PowerUnit::Dbm),
            status: Mutex::new(false),
        }
    }

    /// Select the power unit used by [`Tls::set_power`] and [`Tls::power`].
    pub fn set_unit(&self, unit: PowerUnit) {
        *self.unit.lock() = unit;
    }

    /// Current power unit.
    pub fn unit(&self) -> PowerUnit {
        *self.unit.lock()
    }

    /// Set the power unit code of the instrument display.
    pub async fn set_power_unit_code(&self, code: u8) -> Result<()> {
        self.conn.send(&format!("TLSPWRUNT{}", code)).await
    }

    /// Power unit code of the instrument display.
    pub async fn power_unit_code(&self) -> Result<i64> {
        self.conn.query_i64("TLSPWRUNT?").await
    }

    /// Set the wavelength unit code (0 nm, 1 GHz).
    pub async fn set_wavelength_unit_code(&self, code: u8) -> Result<()> {
        self.conn.send(&format!("TLSWLUNT{}", code)).await
    }

    /// Wavelength unit code.
    pub async fn wavelength_unit_code(&self) -> Result<i64> {
        self.conn.query_i64("TLSWLUNT?").await
    }

    /// Set the output power in the current unit.
    pub async fn set_power(&self, power: f64) -> Result<()> {
        let dbm = self.unit().to_dbm(power)?;
        self.conn.send(&format!("TLSPWR{:.1}", dbm)).await
    }

    /// Output power in the current unit.
    pub async fn power(&self) -> Result<f64> {
        let dbm = self.conn.query_f64("TLSPWR?").await?;
        Ok(self.unit().from_dbm(dbm))
    }

    /// Set the static wavelength in nm.
    pub async fn set_wavelength(&self, nm: f64) -> Result<()> {
        self.conn.send(&format!("TLSSWL{:.3}", nm)).await
    }

    /// Static wavelength in nm.
    pub async fn wavelength(&self) -> Result<f64> {
        self.conn.query_f64("TLSSWL?").await
    }

    /// Set the static frequency in GHz.
    pub async fn set_frequency(&self, ghz: f64) -> Result<()> {
        self.conn.send(&format!("TLSSFR{:.3}", ghz)).await
    }

    /// Static frequency in GHz.
    pub async fn frequency(&self) -> Result<f64> {
        self.conn.query_f64("TLSSFR?").await
    }

    /// Switch the output on.
    pub async fn on(&self) -> Result<()> {
        self.conn.send("TLSOUT1").await?;
        *self.status.lock() = true;
        Ok(())
    }

    /// Switch the output off.
    pub async fn off(&self) -> Result<()> {
        self.conn.send("TLSOUT0").await?;
        *self.status.lock() = false;
        Ok(())
    }

    /// True when the output is on.
    pub async fn status(&self) -> Result<bool> {
        let on = self.conn.query_i64("TLSOUT?").await? == 1;
        *self.status.lock() = on;
        Ok(on)
    }

    /// Last output state written or read.
    pub fn cached_status(&self) -> bool {
        *self.status.lock()
    }

    /// Static emission mode.
    pub async fn set_static(&self) -> Result<()> {
        self.conn.send("TLSS").await
    }

    /// Sweep emission mode.
    pub async fn set_sweep(&self, mode: u8) -> Result<()> {
        self.conn.send(&format!("TLSSW{}", mode)).await
    }

    /// Set the sweep start wavelength in nm.
    pub async fn set_sweep_start(&self, nm: f64) -> Result<()> {
        self.conn.send(&format!("TLSSTAR{}", float_repr(nm))).await
    }

    /// Sweep start wavelength in nm.
    pub async fn sweep_start(&self) -> Result<f64> {
        self.conn.query_f64("TLSSTAR?").await
    }

    /// Set the sweep stop wavelength in nm.
    pub async fn set_sweep_stop(&self, nm: f64) -> Result<()> {
        self.conn.send(&format!("TLSSTOP{}", float_repr(nm))).await
    }

    /// Sweep stop wavelength in nm.
    pub async fn sweep_stop(&self) -> Result<f64> {
        self.conn.query_f64("TLSSTOP?").await
    }

    /// Set the sweep speed.
    pub async fn set_sweep_speed(&self, speed: f64) -> Result<()> {
        self.conn.send(&format!("TLSSPE{}", float_repr(speed))).await
    }

    /// Sweep speed.
    pub async fn sweep_speed(&self) -> Result<f64> {
        self.conn.query_f64("TLSSPE?").await
    }

    /// Set the power held constant during sweeps.
    pub async fn set_continuous_power(&self, power: f64) -> Result<()> {
        self.conn.send(&format!("TLSCONTPWR{}", float_repr(power))).await
    }

    /// Power held constant during sweeps.
    pub async fn continuous_power(&self) -> Result<f64> {
        self.conn.query_f64("TLSCONTPWR?").await
    }

    /// Set the delay between sweep steps.
    pub async fn set_step_delay(&self, delay: f64) -> Result<()> {
        self.conn.send(&format!("TLSSTEPDELAY{}", float_repr(delay))).await
    }

    /// Delay between sweep steps.
    pub async fn step_delay(&self) -> Result<f64> {
        self.conn.query_f64("TLSSTEPDELAY?").await
    }

    /// Set the number of sweep steps.
    pub async fn set_step_count(&self, steps: u32) -> Result<()> {
        self.conn.send(&format!("TLSSTEPNUM{}", steps)).await
    }

    /// Number of sweep steps.
    pub async fn step_count(&self) -> Result<u32> {
        let value = self.conn.query_i64("TLSSTEPNUM?").await?;
        u32::try_from(value).map_err(|_| ApexError::invalid_reply("TLSSTEPNUM?", value.to_string()))
    }

    /// Start a sweep.
    ///
    /// The reply timeout of the connection is lifted while the command is
    /// issued and restored afterwards, even on error.
    pub async fn run(&self, sweep: TlsSweep) -> Result<()> {
        let command = match sweep {
            TlsSweep::Single => "TLSSWP0",
            TlsSweep::Repeat => "TLSSWP1",
        };
        let saved = self.conn.timeout();
        self.conn.set_timeout(None);
        let result = self.conn.send(command).await;
        self.conn.set_timeout(saved);
        result
    }

    /// Stop the sweep.
    pub async fn stop(&self) -> Result<()> {
        self.conn.send("TLSSWP2").await
    }
}

impl fmt::Display for Tls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TLS of {}", self.identity)
    }
}

#[async_trait]
impl WavelengthTunable for Tls {
    async fn set_wavelength(&self, wavelength_nm: f64) -> AnyResult<()> {
        Ok(Tls::set_wavelength(self, wavelength_nm).await?)
    }

    async fn get_wavelength(&self) -> AnyResult<f64> {
        Ok(self.wavelength().await?)
    }

    fn wavelength_range(&self) -> (f64, f64) {
        (AP2XXX_LIMITS.wavelength.min, AP2XXX_LIMITS.wavelength.max)
    }
}

#[async_trait]
impl EmissionControl for Tls {
    async fn enable_emission(&self) -> AnyResult<()> {
        Ok(self.on().await?)
    }

    async fn disable_emission(&self) -> AnyResult<()> {
        Ok(self.off().await?)
    }

    async fn is_emission_enabled(&self) -> AnyResult<bool> {
        Ok(self.status().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_core::units::nm_to_ghz;
    use apex_driver_mock::Ap2xxxSimulator;
    use std::time::Duration;

    fn tls() -> (Tls, apex_driver_mock::CommandLog) {
        let (conn, log) = Ap2xxxSimulator::new().spawn();
        (Tls::new(conn, Identity::new("APEX Technologies/2083-A/1/1.0")), log)
    }

    #[tokio::test]
    async fn test_power_units() {
        let (tls, log) = tls();
        tls.set_power(3.04).await.unwrap();
        assert!(log.wait_for("TLSPWR3.0").await);
        tls.set_unit(PowerUnit::Mw);
        tls.set_power(10.0).await.unwrap();
        assert!(log.wait_for("TLSPWR10.0").await);
        assert!((tls.power().await.unwrap() - 10.0).abs() < 1e-9);
        assert!(tls.set_power(0.0).await.is_err());

        tls.set_power_unit_code(1).await.unwrap();
        assert_eq!(tls.power_unit_code().await.unwrap(), 1);
        tls.set_wavelength_unit_code(0).await.unwrap();
        assert_eq!(tls.wavelength_unit_code().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wavelength_and_frequency() {
        let (tls, log) = tls();
        tls.set_wavelength(1545.5).await.unwrap();
        assert!(log.wait_for("TLSSWL1545.500").await);
        assert!((tls.frequency().await.unwrap() - nm_to_ghz(1545.5)).abs() < 1e-2);
        tls.set_frequency(194_000.0).await.unwrap();
        assert!(log.wait_for("TLSSFR194000.000").await);
        assert!((tls.wavelength().await.unwrap() - 1545.3).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_output() {
        let (tls, log) = tls();
        assert!(!tls.status().await.unwrap());
        tls.on().await.unwrap();
        assert!(tls.cached_status());
        assert!(tls.is_emission_enabled().await.unwrap());
        tls.disable_emission().await.unwrap();
        assert!(!tls.status().await.unwrap());
        assert!(log.contains("TLSOUT0"));
        assert_eq!(tls.to_string(), "TLS of APEX Technologies/2083-A/1/1.0");
    }

    #[tokio::test]
    async fn test_sweep_settings() {
        let (tls, log) = tls();
        tls.set_static().await.unwrap();
        tls.set_sweep(1).await.unwrap();
        tls.set_sweep_start(1530.0).await.unwrap();
        tls.set_sweep_stop(1565.0).await.unwrap();
        tls.set_sweep_speed(20.0).await.unwrap();
        tls.set_continuous_power(1.0).await.unwrap();
        tls.set_step_delay(0.5).await.unwrap();
        tls.set_step_count(250).await.unwrap();
        assert_eq!(tls.sweep_start().await.unwrap(), 1530.0);
        assert_eq!(tls.sweep_stop().await.unwrap(), 1565.0);
        assert_eq!(tls.sweep_speed().await.unwrap(), 20.0);
        assert_eq!(tls.continuous_power().await.unwrap(), 1.0);
        assert_eq!(tls.step_delay().await.unwrap(), 0.5);
        assert_eq!(tls.step_count().await.unwrap(), 250);
        for cmd in ["TLSS", "TLSSW1", "TLSSTAR1530.0", "TLSSTOP1565.0", "TLSSTEPNUM250"] {
            assert!(log.contains(cmd), "missing {}", cmd);
        }
    }

    #[tokio::test]
    async fn test_run_restores_timeout() {
        let (tls, log) = tls();
        let conn_timeout = tls.conn.timeout();
        assert_eq!(conn_timeout, Some(Duration::from_secs(10)));
        tls.run(TlsSweep::Repeat).await.unwrap();
        assert!(log.wait_for("TLSSWP1").await);
        assert_eq!(tls.conn.timeout(), conn_timeout);
        tls.stop().await.unwrap();
        assert!(log.wait_for("TLSSWP2").await);
    }
}
