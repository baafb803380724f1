//! OSA fast-sweep of the AP2XXX (`OSAFS*` commands).
//!
//! Span and centre have no command of their own: they are computed from the
//! start and stop wavelengths, and setting them rewrites both.

use std::fmt;
use std::str::FromStr;

use apex_core::error::Result;
use apex_core::identity::Identity;
use apex_core::protocol::{float_repr, parse_float_list_or};
use apex_core::Connection;

use crate::osa::{check_trace, RunMode, Scale, Spectrum, SweepWindow};

/// Acquisition mode of the fast-sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FastSweepMode {
    /// Fast acquisition (`1`)
    Fast,
    /// High sensitivity (`2`)
    #[default]
    Sensitive,
}

impl FastSweepMode {
    /// `OSAFSMODE` code.
    pub fn code(self) -> u8 {
        match self {
            FastSweepMode::Fast => 1,
            FastSweepMode::Sensitive => 2,
        }
    }

    /// Mode of a code, `None` for unknown codes.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(FastSweepMode::Fast),
            2 => Some(FastSweepMode::Sensitive),
            _ => None,
        }
    }
}

impl FromStr for FastSweepMode {
    type Err = std::convert::Infallible;

    /// `fast` or `1` selects the fast mode, anything else the sensitive one.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if s.eq_ignore_ascii_case("fast") || s == "1" {
            FastSweepMode::Fast
        } else {
            FastSweepMode::Sensitive
        })
    }
}

impl fmt::Display for FastSweepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FastSweepMode::Fast => write!(f, "Fast"),
            FastSweepMode::Sensitive => write!(f, "Sensitive"),
        }
    }
}

/// OSA fast-sweep.
#[derive(Debug)]
pub struct OsaFastSweep {
    conn: Connection,
    identity: Identity,
}

impl OsaFastSweep {
    /// Fast-sweep of the AP2XXX identified by `identity`.
    pub fn new(conn: Connection, identity: Identity) -> Self {
        Self { conn, identity }
    }

    /// Set the start wavelength in nm.
    pub async fn set_start_wavelength(&self, nm: f64) -> Result<()> {
        self.conn.send(&format!("OSAFSSTARTWL{}", float_repr(nm))).await
    }

    /// Start wavelength in nm.
    pub async fn start_wavelength(&self) -> Result<f64> {
        self.conn.query_f64("OSAFSSTARTWL?").await
    }

    /// Set the stop wavelength in nm.
    pub async fn set_stop_wavelength(&self, nm: f64) -> Result<()> {
        self.conn.send(&format!("OSAFSSTOPWL{}", float_repr(nm))).await
    }

    /// Stop wavelength in nm.
    pub async fn stop_wavelength(&self) -> Result<f64> {
        self.conn.query_f64("OSAFSSTOPWL?").await
    }

    /// Sweep window read back from the instrument.
    pub async fn window(&self) -> Result<SweepWindow> {
        Ok(SweepWindow {
            start: self.start_wavelength().await?,
            stop: self.stop_wavelength().await?,
        })
    }

    /// Span in nm.
    pub async fn span(&self) -> Result<f64> {
        Ok(self.window().await?.span())
    }

    /// Centre in nm.
    pub async fn center(&self) -> Result<f64> {
        Ok(self.window().await?.center())
    }

    /// Set the span around the current centre and return the resulting window.
    pub async fn set_span(&self, span: f64) -> Result<SweepWindow> {
        let center = self.center().await?;
        self.write_window(center, span).await
    }

    /// Move the centre keeping the current span and return the resulting window.
    pub async fn set_center(&self, center: f64) -> Result<SweepWindow> {
        let span = self.span().await?;
        self.write_window(center, span).await
    }

    async fn write_window(&self, center: f64, span: f64) -> Result<SweepWindow> {
        self.set_start_wavelength(center - span / 2.0).await?;
        self.set_stop_wavelength(center + span / 2.0).await?;
        self.window().await
    }

    /// Select the acquisition mode.
    pub async fn set_mode(&self, mode: FastSweepMode) -> Result<()> {
        self.conn.send(&format!("OSAFSMODE{}", mode.code())).await
    }

    /// Acquisition mode, `None` when the instrument reports an unknown code.
    pub async fn mode(&self) -> Result<Option<FastSweepMode>> {
        Ok(FastSweepMode::from_code(self.conn.query_i64("OSAFSMODE?").await?))
    }

    /// Start a measurement. Auto runs are not supported and start a single one.
    pub async fn run(&self, mode: RunMode) -> Result<()> {
        let code = match mode {
            RunMode::Repeat => 2,
            RunMode::Auto | RunMode::Single => 1,
        };
        self.conn.send(&format!("OSAFSRUN{}", code)).await
    }

    /// Stop a repeated measurement.
    pub async fn stop(&self) -> Result<()> {
        self.conn.send("OSAFSSTOP").await
    }

    /// Number of points of a trace, 0 when unparsable.
    pub async fn points(&self, trace: u8) -> Result<u32> {
        check_trace(trace)?;
        let reply = self.conn.query(&format!("OSAFSPOINTS{}", trace)).await?;
        Ok(reply.trim().parse().unwrap_or(0))
    }

    /// Read a trace. Unlike the OSA traces, every value is data.
    pub async fn data(&self, scale: Scale, trace: u8) -> Result<Spectrum> {
        check_trace(trace)?;
        let y_command = match scale {
            Scale::Lin => format!("OSAFSDATAL{}", trace),
            Scale::Log => format!("OSAFSDATAD{}", trace),
        };
        let y_reply = self.conn.query(&y_command).await?;
        let x_reply = self.conn.query(&format!("OSAFSDATAWL{}", trace)).await?;
        Ok(Spectrum {
            x: parse_float_list_or(&x_reply, ' ', 0.0),
            y: parse_float_list_or(&y_reply, ' ', 0.0),
        })
    }
}

impl fmt::Display for OsaFastSweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OSA Fast-Sweep of {}", self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_driver_mock::Ap2xxxSimulator;

    fn fast_sweep(sim: Ap2xxxSimulator) -> (OsaFastSweep, apex_driver_mock::CommandLog) {
        let (conn, log) = sim.spawn();
        (OsaFastSweep::new(conn, Identity::new("APEX Technologies/2083-A/1/1.0")), log)
    }

    #[test]
    fn test_mode_codes() {
        assert_eq!("FAST".parse::<FastSweepMode>().unwrap(), FastSweepMode::Fast);
        assert_eq!("x".parse::<FastSweepMode>().unwrap().code(), 2);
        assert_eq!(FastSweepMode::from_code(3), None);
        assert_eq!(FastSweepMode::Sensitive.to_string(), "Sensitive");
    }

    #[tokio::test]
    async fn test_window() {
        let (fs, log) = fast_sweep(Ap2xxxSimulator::new());
        assert_eq!(fs.span().await.unwrap(), 30.0);
        assert_eq!(fs.center().await.unwrap(), 1545.0);

        let window = fs.set_span(10.0).await.unwrap();
        assert_eq!(window, SweepWindow { start: 1540.0, stop: 1550.0 });
        assert!(log.contains("OSAFSSTARTWL1540.0"));
        assert!(log.contains("OSAFSSTOPWL1550.0"));

        let window = fs.set_center(1555.0).await.unwrap();
        assert_eq!(window, SweepWindow { start: 1550.0, stop: 1560.0 });
    }

    #[tokio::test]
    async fn test_mode_and_run() {
        let (fs, log) = fast_sweep(Ap2xxxSimulator::new());
        assert_eq!(fs.mode().await.unwrap(), Some(FastSweepMode::Sensitive));
        fs.set_mode(FastSweepMode::Fast).await.unwrap();
        assert_eq!(fs.mode().await.unwrap(), Some(FastSweepMode::Fast));
        fs.run(RunMode::Repeat).await.unwrap();
        fs.stop().await.unwrap();
        assert!(log.wait_for("OSAFSSTOP").await);
        assert!(log.contains("OSAFSRUN2"));
        assert!(fs.to_string().starts_with("OSA Fast-Sweep of"));
    }

    #[tokio::test]
    async fn test_points_and_data() {
        let (fs, log) = fast_sweep(Ap2xxxSimulator::new().with_seed(7).with_reply("OSAFSPOINTS", "n/a"));
        assert_eq!(fs.points(1).await.unwrap(), 0);
        assert!(fs.points(7).await.is_err());

        let spectrum = fs.data(Scale::Lin, 1).await.unwrap();
        assert_eq!(spectrum.x.len(), 500);
        assert_eq!(spectrum.y.len(), 500);
        assert_eq!(spectrum.x[0], 1530.0);
        assert!(spectrum.y.iter().all(|v| (0.0..=10.0).contains(v)));
        assert!(log.contains("OSAFSDATAL1"));
        assert!(log.contains("OSAFSDATAWL1"));
    }
}
