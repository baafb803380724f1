//! Heterodyne OSA of the AP2XXX (`SP*` commands).
//!
//! The sweep window (start, stop, span, centre) is mirrored locally and
//! updated by every setter, so [`Osa::window`] answers without a round trip.
//! Range checks use the limit table of the model the OSA was created for.
//!
//! Trace commands take a trace number between 0 and 6. Trace replies start
//! with the number of points, which [`Osa::data`] drops.

use std::path::Path;
use std::str::FromStr;

use apex_core::error::{ApexError, Result};
use apex_core::limits::{Ap2xxxLimits, AP2XXX_TRACES};
use apex_core::protocol::{float_repr, parse_float_list_or, tokens};
use apex_core::units::SpectralUnit;
use apex_core::Connection;
use parking_lot::Mutex;

/// Unit words that may follow a value in marker and line-width replies.
const UNIT_WORDS: [&str; 4] = ["dbm", "mw", "nm", "ghz"];

/// Threshold used by [`Osa::auto_measure`] to look for the main peak (dB).
const AUTO_MEASURE_THRESHOLD: f64 = 20.0;

/// Reject trace numbers outside 0..=6.
pub fn check_trace(trace: u8) -> Result<()> {
    let (min, max) = AP2XXX_TRACES;
    if (min..=max).contains(&trace) {
        Ok(())
    } else {
        Err(ApexError::argument_value("TraceNumber"))
    }
}

/// Sweep kind of [`Osa::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Auto-measurement (`SPSWP0`)
    Auto,
    /// Single sweep (`SPSWP1`)
    #[default]
    Single,
    /// Repeated sweeps (`SPSWP2`)
    Repeat,
}

impl RunMode {
    fn code(self) -> u8 {
        match self {
            RunMode::Auto => 0,
            RunMode::Single => 1,
            RunMode::Repeat => 2,
        }
    }
}

impl FromStr for RunMode {
    type Err = std::convert::Infallible;

    /// `auto`/`0` and `repeat`/`2` are recognised, anything else is a single sweep.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if s.eq_ignore_ascii_case("auto") || s == "0" {
            RunMode::Auto
        } else if s.eq_ignore_ascii_case("repeat") || s == "2" {
            RunMode::Repeat
        } else {
            RunMode::Single
        })
    }
}

/// Linear (mW) or logarithmic (dBm) power scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    /// mW
    Lin,
    /// dBm
    #[default]
    Log,
}

impl Scale {
    /// `SPLINSC` code.
    pub fn code(self) -> u8 {
        match self {
            Scale::Lin => 0,
            Scale::Log => 1,
        }
    }
}

impl FromStr for Scale {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(if s.trim().eq_ignore_ascii_case("lin") {
            Scale::Lin
        } else {
            Scale::Log
        })
    }
}

/// Measured polarisation channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarization {
    /// Total power, `"1+2"`
    #[default]
    Total,
    /// One measurement per channel, `"1&2"`
    Both,
    /// Channel 1 only
    Channel1,
    /// Channel 2 only
    Channel2,
}

impl Polarization {
    /// `SPPOLAR` code.
    pub fn code(self) -> u8 {
        match self {
            Polarization::Total => 0,
            Polarization::Both => 1,
            Polarization::Channel1 => 2,
            Polarization::Channel2 => 3,
        }
    }
}

impl FromStr for Polarization {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            "1&2" => Polarization::Both,
            "1" => Polarization::Channel1,
            "2" => Polarization::Channel2,
            _ => Polarization::Total,
        })
    }
}

/// Marker axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Wavelength or frequency
    X,
    /// Power
    Y,
}

impl FromStr for Axis {
    type Err = ApexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "0" | "x" | "X" => Ok(Axis::X),
            "1" | "y" | "Y" => Ok(Axis::Y),
            _ => Err(ApexError::argument_value("Axis")),
        }
    }
}

/// Reduction applied to the peaks found by [`Osa::find_peak`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeakSelect {
    /// Highest value
    #[default]
    Max,
    /// Lowest value
    Min,
    /// Mean of all values
    Mean,
}

impl PeakSelect {
    /// Reduce a list of peak values; an empty list gives 0.0.
    pub fn reduce(self, peaks: &[f64]) -> f64 {
        if peaks.is_empty() {
            return 0.0;
        }
        match self {
            PeakSelect::Max => peaks.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            PeakSelect::Min => peaks.iter().copied().fold(f64::INFINITY, f64::min),
            PeakSelect::Mean => peaks.iter().sum::<f64>() / peaks.len() as f64,
        }
    }
}

/// 3 dB line width measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LineWidth {
    /// Width in the X unit
    pub width: f64,
    /// Centre in the X unit
    pub center: f64,
    /// Peak level in the Y unit
    pub level: f64,
}

/// File format of [`Osa::save_to_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// Binary (`SPSAVEA`)
    #[default]
    Dat,
    /// Text (`SPSAVEB`)
    Txt,
}

/// One trace: X in the current X unit, Y in the requested scale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    /// X axis
    pub x: Vec<f64>,
    /// Y axis
    pub y: Vec<f64>,
}

/// Start and stop of the sweep window in nm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepWindow {
    /// Start wavelength
    pub start: f64,
    /// Stop wavelength
    pub stop: f64,
}

impl SweepWindow {
    /// Stop minus start.
    pub fn span(&self) -> f64 {
        self.stop - self.start
    }

    /// Middle of the window.
    pub fn center(&self) -> f64 {
        self.start + self.span() / 2.0
    }

    fn recentre(&mut self, center: f64, span: f64) {
        self.start = center - span / 2.0;
        self.stop = center + span / 2.0;
    }
}

#[derive(Debug)]
struct OsaState {
    window: SweepWindow,
    x_unit: SpectralUnit,
    y_scale: Scale,
    polarization: Polarization,
    noise_mask: f64,
}

/// AP2XXX optical spectrum analyser.
#[derive(Debug)]
pub struct Osa {
    conn: Connection,
    limits: Ap2xxxLimits,
    state: Mutex<OsaState>,
}

impl Osa {
    /// OSA on `conn`, range-checked against `limits`.
    pub fn new(conn: Connection, limits: Ap2xxxLimits) -> Self {
        Self {
            conn,
            limits,
            state: Mutex::new(OsaState {
                window: SweepWindow {
                    start: limits.wavelength.min,
                    stop: limits.wavelength.max,
                },
                x_unit: SpectralUnit::Nm,
                y_scale: Scale::Log,
                polarization: Polarization::Total,
                noise_mask: -70.0,
            }),
        }
    }

    /// Limits in use.
    pub fn limits(&self) -> &Ap2xxxLimits {
        &self.limits
    }

    /// Last sweep window written.
    pub fn window(&self) -> SweepWindow {
        self.state.lock().window
    }

    // =========================================================================
    // Sweep window
    // =========================================================================

    /// Set the start wavelength in nm.
    pub async fn set_start_wavelength(&self, nm: f64) -> Result<()> {
        if !self.limits.wavelength.contains(nm) {
            return Err(ApexError::argument_value("Wavelength"));
        }
        self.conn.send(&format!("SPSTRTWL{}", float_repr(nm))).await?;
        self.state.lock().window.start = nm;
        Ok(())
    }

    /// Start wavelength in nm.
    pub async fn start_wavelength(&self) -> Result<f64> {
        self.conn.query_f64("SPSTRTWL?").await
    }

    /// Set the stop wavelength in nm.
    pub async fn set_stop_wavelength(&self, nm: f64) -> Result<()> {
        if !self.limits.wavelength.contains(nm) {
            return Err(ApexError::argument_value("Wavelength"));
        }
        self.conn.send(&format!("SPSTOPWL{}", float_repr(nm))).await?;
        self.state.lock().window.stop = nm;
        Ok(())
    }

    /// Stop wavelength in nm.
    pub async fn stop_wavelength(&self) -> Result<f64> {
        self.conn.query_f64("SPSTOPWL?").await
    }

    /// Set the span in nm around the current centre.
    pub async fn set_span(&self, span: f64) -> Result<()> {
        if !self.limits.span.contains(span) {
            return Err(ApexError::argument_value("Span"));
        }
        self.conn.send(&format!("SPSPANWL{}", float_repr(span))).await?;
        let mut state = self.state.lock();
        let center = state.window.center();
        state.window.recentre(center, span);
        Ok(())
    }

    /// Span in nm.
    pub async fn span(&self) -> Result<f64> {
        self.conn.query_f64("SPSPANWL?").await
    }

    /// Set the centre in nm keeping the current span.
    pub async fn set_center(&self, center: f64) -> Result<()> {
        if !self.limits.center_for_span(self.limits.span.min).contains(center) {
            return Err(ApexError::argument_value("Center"));
        }
        self.conn.send(&format!("SPCTRWL{}", float_repr(center))).await?;
        let mut state = self.state.lock();
        let span = state.window.span();
        state.window.recentre(center, span);
        Ok(())
    }

    /// Centre in nm.
    pub async fn center(&self) -> Result<f64> {
        self.conn.query_f64("SPCTRWL?").await
    }

    // =========================================================================
    // Acquisition settings
    // =========================================================================

    /// Set the X resolution, in the current X unit.
    pub async fn set_x_resolution(&self, resolution: f64) -> Result<()> {
        self.conn.send(&format!("SPSWPRES{}", float_repr(resolution))).await
    }

    /// X resolution in the current X unit.
    pub async fn x_resolution(&self) -> Result<f64> {
        self.conn.query_f64("SPSWPRES?").await
    }

    /// Set the power per Y division.
    pub async fn set_y_resolution(&self, resolution: f64) -> Result<()> {
        if !self.limits.y_resolution.contains(resolution) {
            return Err(ApexError::argument_value("Resolution"));
        }
        self.conn.send(&format!("SPDIVY{}", float_repr(resolution))).await
    }

    /// Power per Y division.
    pub async fn y_resolution(&self) -> Result<f64> {
        self.conn.query_f64("SPDIVY?").await
    }

    /// Set the number of sweep points.
    pub async fn set_points(&self, points: u32) -> Result<()> {
        let (min, max) = self.limits.points;
        if !(min..=max).contains(&points) {
            return Err(ApexError::argument_value("NPoints"));
        }
        self.conn.send(&format!("SPNBPTSWP{}", points)).await
    }

    /// Number of sweep points.
    pub async fn points(&self) -> Result<u32> {
        let value = self.conn.query_i64("SPNBPTSWP?").await?;
        u32::try_from(value).map_err(|_| ApexError::invalid_reply("SPNBPTSWP?", value.to_string()))
    }

    /// Enable or disable the automatic number of points.
    pub async fn set_auto_points(&self, enabled: bool) -> Result<()> {
        self.conn.send(&format!("SPAUTONBPT{}", u8::from(enabled))).await
    }

    /// Set the noise mask; values below it are replaced by it.
    pub async fn set_noise_mask(&self, value: f64) -> Result<()> {
        self.conn.send(&format!("SPSWPMSK{}", float_repr(value))).await?;
        self.state.lock().noise_mask = value;
        Ok(())
    }

    /// Last noise mask written.
    pub fn noise_mask(&self) -> f64 {
        self.state.lock().noise_mask
    }

    /// Select the X axis unit (`SPXUNT`, 0 GHz, 1 nm).
    pub async fn set_x_unit(&self, unit: SpectralUnit) -> Result<()> {
        let code = match unit {
            SpectralUnit::Ghz => 0,
            SpectralUnit::Nm => 1,
        };
        self.conn.send(&format!("SPXUNT{}", code)).await?;
        self.state.lock().x_unit = unit;
        Ok(())
    }

    /// Current X axis unit.
    pub fn x_unit(&self) -> SpectralUnit {
        self.state.lock().x_unit
    }

    /// Select the Y axis scale.
    pub async fn set_y_scale(&self, scale: Scale) -> Result<()> {
        self.conn.send(&format!("SPLINSC{}", scale.code())).await?;
        self.state.lock().y_scale = scale;
        Ok(())
    }

    /// Current Y axis scale.
    pub fn y_scale(&self) -> Scale {
        self.state.lock().y_scale
    }

    /// Select the measured polarisation channels.
    pub async fn set_polarization(&self, mode: Polarization) -> Result<()> {
        self.conn.send(&format!("SPPOLAR{}", mode.code())).await?;
        self.state.lock().polarization = mode;
        Ok(())
    }

    /// Current polarisation mode.
    pub fn polarization(&self) -> Polarization {
        self.state.lock().polarization
    }

    /// Enable or disable trace averaging.
    pub async fn set_average_mode(&self, enabled: bool) -> Result<()> {
        self.conn.send(&format!("SPAVERAGE{}", u8::from(enabled))).await
    }

    /// Wavelength calibration; a running sweep is stopped first by the instrument.
    pub async fn wavelength_calibration(&self) -> Result<()> {
        self.conn.send("SPWLCALM").await
    }

    /// Clear all traces.
    pub async fn delete_all(&self) -> Result<()> {
        self.conn.send("SPTRDELAL").await
    }

    // =========================================================================
    // Sweeps and traces
    // =========================================================================

    /// Start a sweep and return the status code of the instrument.
    pub async fn run(&self, mode: RunMode) -> Result<i64> {
        let reply = self.conn.query(&format!("SPSWP{}", mode.code())).await?;
        Ok(sweep_status(&reply))
    }

    /// Stop the sweep.
    pub async fn stop(&self) -> Result<()> {
        self.conn.send("SPSWP3").await
    }

    /// Read a trace. Unparsable values read as 0.0.
    pub async fn data(&self, scale: Scale, trace: u8) -> Result<Spectrum> {
        check_trace(trace)?;
        let y_command = match scale {
            Scale::Lin => format!("SPDATAL{}", trace),
            Scale::Log => format!("SPDATAD{}", trace),
        };
        let y_reply = self.conn.query(&y_command).await?;
        let x_reply = self.conn.query(&format!("SPDATAWL{}", trace)).await?;
        Ok(Spectrum {
            x: trace_values(&x_reply),
            y: trace_values(&y_reply),
        })
    }

    /// Save a trace on the instrument side.
    ///
    /// The parent directory of `path` must exist.
    pub async fn save_to_file(&self, path: &Path, trace: u8, format: FileFormat) -> Result<()> {
        check_trace(trace)?;
        if !path.parent().is_some_and(Path::is_dir) {
            return Err(ApexError::BadFilename(path.display().to_string()));
        }
        let verb = match format {
            FileFormat::Txt => "SPSAVEB",
            FileFormat::Dat => "SPSAVEA",
        };
        self.conn.send(&format!("{}{}_{}", verb, trace, path.display())).await
    }

    // =========================================================================
    // Markers and analysis
    // =========================================================================

    /// Add a marker at `position` (current X unit).
    pub async fn add_marker(&self, position: f64, trace: u8) -> Result<()> {
        check_trace(trace)?;
        self.conn
            .send(&format!("SPMKRAD{}_{}", trace, float_repr(position)))
            .await
    }

    /// Marker values of a trace on one axis.
    pub async fn markers(&self, trace: u8, axis: Axis) -> Result<Vec<f64>> {
        check_trace(trace)?;
        let command = match axis {
            Axis::X => format!("SPDATAMKRX{}", trace),
            Axis::Y => format!("SPDATAMKRY{}", trace),
        };
        let reply = self.conn.query(&command).await?;
        Ok(measurement_values(tokens(&reply, ' ').skip(1)))
    }

    /// Delete all markers of a trace.
    pub async fn delete_markers(&self, trace: u8) -> Result<()> {
        check_trace(trace)?;
        self.conn.send(&format!("SPMKRDELAL{}", trace)).await
    }

    /// Place markers on the peaks above `threshold` dB and return their values.
    pub async fn find_peaks(&self, trace: u8, threshold: f64, axis: Axis) -> Result<Vec<f64>> {
        check_trace(trace)?;
        self.conn
            .send(&format!("SPPKFIND{}_{}", trace, float_repr(threshold)))
            .await?;
        self.markers(trace, axis).await
    }

    /// [`Osa::find_peaks`] reduced to one value (0.0 when no peak is found).
    pub async fn find_peak(&self, trace: u8, threshold: f64, axis: Axis, select: PeakSelect) -> Result<f64> {
        let peaks = self.find_peaks(trace, threshold, axis).await?;
        Ok(select.reduce(&peaks))
    }

    /// Sweep the full range, zoom on the highest peak and average `n_average`
    /// sweeps there.
    ///
    /// Returns the peak position, or `None` when no peak was found and the
    /// window was left on the full range.
    pub async fn auto_measure(&self, trace: u8, n_average: u32) -> Result<Option<f64>> {
        check_trace(trace)?;
        let n_average = n_average.max(1);
        self.delete_all().await?;
        self.set_start_wavelength(self.limits.wavelength.min).await?;
        self.set_stop_wavelength(self.limits.wavelength.max).await?;
        self.run(RunMode::Single).await?;
        let peak = self
            .find_peak(trace, AUTO_MEASURE_THRESHOLD, Axis::X, PeakSelect::Max)
            .await?;
        if peak == 0.0 {
            tracing::warn!(trace, "no peak found, auto measurement left on the full range");
            return Ok(None);
        }

        let span = match self.x_unit() {
            SpectralUnit::Ghz => 125.0,
            SpectralUnit::Nm => 1.0,
        };
        self.set_span(span).await?;
        self.set_center(peak).await?;
        self.delete_all().await?;
        self.delete_markers(trace).await?;
        if n_average > 1 {
            self.set_average_mode(true).await?;
        }
        for _ in 0..n_average {
            self.run(RunMode::Single).await?;
        }
        if n_average > 1 {
            self.set_average_mode(false).await?;
        }
        tracing::info!(trace, peak, n_average, "auto measurement done");
        Ok(Some(peak))
    }

    /// 3 dB line width of a trace.
    pub async fn line_width(&self, trace: u8) -> Result<LineWidth> {
        check_trace(trace)?;
        let reply = self.conn.query(&format!("SPLWTH{}_3.0", trace)).await?;
        let mut values = measurement_values(reply.split('_').flat_map(|part| tokens(part, ' ')));
        values.resize(values.len().max(3), 0.0);
        Ok(LineWidth {
            width: values[0],
            center: values[1],
            level: values[2],
        })
    }
}

/// Sweep status reply; an unparsable status reads as 0.
fn sweep_status(reply: &str) -> i64 {
    reply.trim().parse().unwrap_or(0)
}

/// Space separated trace reply without its leading point count.
fn trace_values(reply: &str) -> Vec<f64> {
    parse_float_list_or(reply, ' ', 0.0).into_iter().skip(1).collect()
}

/// Numbers among `tokens`, unit words and garbage skipped.
fn measurement_values<'a>(tokens: impl Iterator<Item = &'a str>) -> Vec<f64> {
    tokens
        .filter(|t| !UNIT_WORDS.contains(&t.to_ascii_lowercase().as_str()))
        .filter_map(|t| t.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_core::error::{ARGUMENT_VALUE, BAD_FILENAME};
    use apex_core::limits::AP2XXX_LIMITS;
    use apex_driver_mock::Ap2xxxSimulator;
    use tracing_test::traced_test;

    fn osa() -> (Osa, apex_driver_mock::CommandLog) {
        let (conn, log) = Ap2xxxSimulator::new().spawn();
        (Osa::new(conn, AP2XXX_LIMITS), log)
    }

    #[test]
    fn test_selectors() {
        assert_eq!("AUTO".parse::<RunMode>().unwrap(), RunMode::Auto);
        assert_eq!("2".parse::<RunMode>().unwrap(), RunMode::Repeat);
        assert_eq!("whatever".parse::<RunMode>().unwrap(), RunMode::Single);
        assert_eq!("1&2".parse::<Polarization>().unwrap().code(), 1);
        assert_eq!("2".parse::<Polarization>().unwrap().code(), 3);
        assert_eq!("lin".parse::<Scale>().unwrap().code(), 0);
        assert_eq!("y".parse::<Axis>().unwrap(), Axis::Y);
        assert!("z".parse::<Axis>().is_err());
        assert!(check_trace(6).is_ok());
        assert_eq!(check_trace(7).unwrap_err().code(), ARGUMENT_VALUE);
    }

    #[test]
    fn test_reply_parsing() {
        assert_eq!(sweep_status("1"), 1);
        assert_eq!(sweep_status("busy"), 0);
        assert_eq!(trace_values("3 1.5 x -2.0"), vec![1.5, 0.0, -2.0]);
        assert_eq!(
            measurement_values(tokens("1545.000 nm 1550.000 GHz oops", ' ')),
            vec![1545.0, 1550.0]
        );
        assert_eq!(PeakSelect::Max.reduce(&[]), 0.0);
        assert_eq!(PeakSelect::Min.reduce(&[3.0, 1.0, 2.0]), 1.0);
        assert_eq!(PeakSelect::Mean.reduce(&[3.0, 1.0, 2.0]), 2.0);
    }

    #[tokio::test]
    async fn test_window_mirror_and_checks() {
        let (osa, log) = osa();
        osa.set_start_wavelength(1540.0).await.unwrap();
        osa.set_stop_wavelength(1550.0).await.unwrap();
        assert_eq!(osa.span().await.unwrap(), 10.0);
        assert_eq!(osa.center().await.unwrap(), 1545.0);
        assert!(log.contains("SPSTRTWL1540.0"));

        osa.set_span(2.0).await.unwrap();
        assert_eq!(osa.window(), SweepWindow { start: 1544.0, stop: 1546.0 });
        assert_eq!(osa.start_wavelength().await.unwrap(), 1544.0);

        osa.set_center(1550.0).await.unwrap();
        assert_eq!(osa.window().center(), 1550.0);
        assert_eq!(osa.stop_wavelength().await.unwrap(), 1551.0);

        let before = log.commands().len();
        assert_eq!(osa.set_start_wavelength(1500.0).await.unwrap_err().code(), ARGUMENT_VALUE);
        assert!(osa.set_span(41.0).await.is_err());
        assert!(osa.set_center(1566.0).await.is_err());
        assert_eq!(log.commands().len(), before);
    }

    #[tokio::test]
    async fn test_acquisition_settings() {
        let (osa, log) = osa();
        assert!(osa.set_points(1).await.is_err());
        osa.set_points(5).await.unwrap();
        assert_eq!(osa.points().await.unwrap(), 5);
        assert!(osa.set_y_resolution(200.0).await.is_err());
        osa.set_y_resolution(0.5).await.unwrap();
        assert_eq!(osa.y_resolution().await.unwrap(), 0.5);
        osa.set_x_resolution(0.02).await.unwrap();
        assert_eq!(osa.x_resolution().await.unwrap(), 0.02);

        osa.set_x_unit(SpectralUnit::Ghz).await.unwrap();
        osa.set_y_scale(Scale::Lin).await.unwrap();
        osa.set_polarization(Polarization::Channel1).await.unwrap();
        osa.set_noise_mask(-60.0).await.unwrap();
        osa.set_auto_points(true).await.unwrap();
        osa.wavelength_calibration().await.unwrap();
        assert!(log.wait_for("SPWLCALM").await);
        for cmd in ["SPXUNT0", "SPLINSC0", "SPPOLAR2", "SPSWPMSK-60.0", "SPAUTONBPT1"] {
            assert!(log.contains(cmd), "missing {}", cmd);
        }
        assert_eq!(osa.x_unit(), SpectralUnit::Ghz);
        assert_eq!(osa.y_scale(), Scale::Lin);
        assert_eq!(osa.polarization(), Polarization::Channel1);
        assert_eq!(osa.noise_mask(), -60.0);
    }

    #[tokio::test]
    async fn test_run_and_data() {
        let (osa, log) = osa();
        osa.set_points(5).await.unwrap();
        assert_eq!(osa.run(RunMode::Single).await.unwrap(), 1);
        osa.stop().await.unwrap();
        assert!(log.wait_for("SPSWP3").await);

        let spectrum = osa.data(Scale::Log, 1).await.unwrap();
        assert_eq!(spectrum.x, vec![1526.0, 1536.0, 1546.0, 1556.0, 1566.0]);
        assert_eq!(spectrum.y.len(), 5);
        assert!((spectrum.y[2] + 10.0).abs() < 1e-9);
        assert!(log.contains("SPDATAD1"));
        assert!(log.contains("SPDATAWL1"));

        let lin = osa.data(Scale::Lin, 2).await.unwrap();
        assert!((lin.y[2] - 0.1).abs() < 1e-4);
        assert!(osa.data(Scale::Log, 9).await.is_err());
    }

    #[tokio::test]
    async fn test_peaks_and_markers() {
        let (osa, log) = osa();
        let peaks = osa.find_peaks(1, 20.0, Axis::X).await.unwrap();
        assert_eq!(peaks, vec![1536.0, 1546.0, 1556.0]);
        assert!(log.contains("SPPKFIND1_20.0"));
        assert_eq!(osa.find_peak(1, 20.0, Axis::Y, PeakSelect::Max).await.unwrap(), -10.0);
        assert_eq!(osa.find_peak(1, 20.0, Axis::X, PeakSelect::Mean).await.unwrap(), 1546.0);

        osa.delete_markers(1).await.unwrap();
        assert!(osa.markers(1, Axis::X).await.unwrap().is_empty());
        osa.add_marker(1550.5, 2).await.unwrap();
        assert_eq!(osa.markers(2, Axis::X).await.unwrap(), vec![1550.5]);
        assert!(log.contains("SPMKRAD2_1550.5"));
    }

    #[tokio::test]
    async fn test_line_width() {
        let (osa, log) = osa();
        let lw = osa.line_width(1).await.unwrap();
        assert_eq!(
            lw,
            LineWidth {
                width: 0.1,
                center: 1546.0,
                level: 2.25
            }
        );
        assert!(log.contains("SPLWTH1_3.0"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_auto_measure_zooms_on_peak() {
        let (osa, log) = osa();
        let peak = osa.auto_measure(1, 3).await.unwrap();
        assert_eq!(peak, Some(1556.0));
        assert!(logs_contain("auto measurement done"));
        assert!(log.wait_for("SPAVERAGE0").await);
        for cmd in ["SPTRDELAL", "SPSTRTWL1526.0", "SPSTOPWL1566.0", "SPSPANWL1.0", "SPCTRWL1556.0", "SPAVERAGE1"] {
            assert!(log.contains(cmd), "missing {}", cmd);
        }
        assert_eq!(log.commands().iter().filter(|c| *c == "SPSWP1").count(), 4);
        assert_eq!(osa.window(), SweepWindow { start: 1555.5, stop: 1556.5 });
        assert_eq!(osa.center().await.unwrap(), 1556.0);
    }

    #[tokio::test]
    async fn test_save_to_file() {
        let (osa, log) = osa();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        osa.save_to_file(&path, 2, FileFormat::Txt).await.unwrap();
        assert!(log.wait_for(&format!("SPSAVEB2_{}", path.display())).await);
        osa.save_to_file(&path, 2, FileFormat::Dat).await.unwrap();
        assert!(log.wait_for(&format!("SPSAVEA2_{}", path.display())).await);

        let missing = dir.path().join("nope").join("trace.dat");
        let err = osa.save_to_file(&missing, 1, FileFormat::Dat).await.unwrap_err();
        assert_eq!(err.code(), BAD_FILENAME);
    }
}
