//! AP2XXX heterodyne OSA simulator.
//!
//! Covers the OSA sweep, trace, marker and line-width verbs, the embedded
//! tunable laser (`TLS*`), the powermeter and the OSA fast-sweep (`OSAFS*`).
//! Trace replies of the OSA start with the point count, fast-sweep replies
//! carry values only.

use std::collections::HashMap;

use apex_core::units::VACUUM_LIGHT_SPEED;
use apex_core::Connection;

use crate::rng::SimRng;
use crate::server::{spawn_line_simulator, split_setter, CommandLog, Responder};

/// AP2050 identity.
pub const SIMU_AP2050_ID: &str = "APEX Technologies/2050-A/09-2050-A-000000/9.14";
/// AP2040 identity.
pub const SIMU_AP2040_ID: &str = "APEX Technologies/2041-B/14-2041-B-000601/9.27";

const DEFAULT_START: f64 = 1526.0;
const DEFAULT_STOP: f64 = 1566.0;
const DEFAULT_POINTS: usize = 1000;
const FS_DEFAULT_POINTS: usize = 500;

/// Stateful AP2XXX simulator.
#[derive(Debug)]
pub struct Ap2xxxSimulator {
    id: String,
    values: HashMap<String, String>,
    markers: HashMap<u8, Vec<(f64, f64)>>,
    rng: SimRng,
}

impl Default for Ap2xxxSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Ap2xxxSimulator {
    /// AP2050 simulator.
    pub fn new() -> Self {
        Self {
            id: SIMU_AP2050_ID.to_string(),
            values: HashMap::new(),
            markers: HashMap::new(),
            rng: SimRng::new(None),
        }
    }

    /// Override the identity (selects the reported model).
    pub fn with_identity(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Force the reply of a query: `with_reply("SPMEASDETECTORDBM1", "-3.0")`.
    pub fn with_reply(mut self, key: &str, reply: &str) -> Self {
        self.values.insert(key.to_string(), reply.to_string());
        self
    }

    /// Seed the generator of simulated fast-sweep traces.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SimRng::new(Some(seed));
        self
    }

    /// Start the simulator and return a connection to it.
    pub fn spawn(self) -> (Connection, CommandLog) {
        spawn_line_simulator(self, "ap2xxx-sim")
    }

    fn number(&self, key: &str, default: f64) -> f64 {
        self.values
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn set_number(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), format!("{:.3}", value));
    }

    fn start(&self) -> f64 {
        self.number("SPSTRTWL", DEFAULT_START)
    }

    fn stop(&self) -> f64 {
        self.number("SPSTOPWL", DEFAULT_STOP)
    }

    fn points(&self) -> usize {
        self.number("SPNBPTSWP", DEFAULT_POINTS as f64).max(2.0) as usize
    }

    fn x_in_ghz(&self) -> bool {
        self.values.get("SPXUNT").map(String::as_str) == Some("0")
    }

    fn axis(&self, start: f64, stop: f64, points: usize) -> Vec<f64> {
        (0..points)
            .map(|i| start + (stop - start) * i as f64 / (points - 1).max(1) as f64)
            .collect()
    }

    fn spectrum(&self, axis: &[f64], linear: bool) -> Vec<f64> {
        let center = (self.start() + self.stop()) / 2.0;
        axis.iter()
            .map(|x| {
                let u = (x - center) / 0.05;
                let dbm = -70.0 + 60.0 * (-u * u).exp();
                if linear {
                    10f64.powf(dbm / 10.0)
                } else {
                    dbm
                }
            })
            .collect()
    }

    fn query(&self, name: &str) -> String {
        let start = self.start();
        let stop = self.stop();
        match name {
            "SPSPANWL" => return format!("{:.3}", stop - start),
            "SPCTRWL" => return format!("{:.3}", (start + stop) / 2.0),
            _ => {}
        }
        if let Some(v) = self.values.get(name) {
            return v.clone();
        }
        let reply = match name {
            "SPSTRTWL" => "1526.000",
            "SPSTOPWL" => "1566.000",
            "SPSWPRES" => "0.100",
            "SPDIVY" => "2.000",
            "SPNBPTSWP" => return DEFAULT_POINTS.to_string(),
            "TLSPWRUNT" | "TLSWLUNT" | "TLSOUT" => "0",
            "TLSPWR" => "0.0",
            "TLSSWL" => "1550.000",
            "TLSSFR" => return format!("{:.3}", VACUUM_LIGHT_SPEED / 1550.0),
            "TLSSTAR" => "1530.0",
            "TLSSTOP" => "1560.0",
            "TLSSPE" => "10.0",
            "TLSCONTPWR" => "0",
            "TLSSTEPDELAY" => "1.0",
            "TLSSTEPNUM" => "100",
            "OSAFSSTARTWL" => "1530.0",
            "OSAFSSTOPWL" => "1560.0",
            "OSAFSMODE" => "2",
            _ => "0",
        };
        reply.to_string()
    }

    fn store(&mut self, verb: &str) {
        let (name, value) = split_setter(verb);
        let parsed = value.parse::<f64>().ok();
        match (name, parsed) {
            ("SPSPANWL", Some(span)) => {
                let center = (self.start() + self.stop()) / 2.0;
                self.set_number("SPSTRTWL", center - span / 2.0);
                self.set_number("SPSTOPWL", center + span / 2.0);
            }
            ("SPCTRWL", Some(center)) => {
                let span = self.stop() - self.start();
                self.set_number("SPSTRTWL", center - span / 2.0);
                self.set_number("SPSTOPWL", center + span / 2.0);
            }
            ("TLSSWL", Some(wl)) if wl > 0.0 => {
                self.values.insert("TLSSWL".into(), value.to_string());
                self.set_number("TLSSFR", VACUUM_LIGHT_SPEED / wl);
            }
            ("TLSSFR", Some(fr)) if fr > 0.0 => {
                self.values.insert("TLSSFR".into(), value.to_string());
                self.set_number("TLSSWL", VACUUM_LIGHT_SPEED / fr);
            }
            _ => {
                self.values.insert(name.to_string(), value.to_string());
            }
        }
    }

    fn trace_reply(&self, values: &[f64], with_count: bool) -> String {
        let mut out: Vec<String> = Vec::with_capacity(values.len() + 1);
        if with_count {
            out.push(values.len().to_string());
        }
        out.extend(values.iter().map(|v| format!("{:.4}", v)));
        out.join(" ")
    }

    fn find_peaks(&mut self, trace: u8) {
        let start = self.start();
        let stop = self.stop();
        let center = (start + stop) / 2.0;
        let quarter = (stop - start) / 4.0;
        self.markers.insert(
            trace,
            vec![(center - quarter, -25.0), (center, -10.0), (center + quarter, -20.0)],
        );
    }

    fn marker_reply(&self, trace: u8, axis_x: bool) -> String {
        let markers = self.markers.get(&trace).cloned().unwrap_or_default();
        let mut out = vec![markers.len().to_string()];
        for (x, y) in markers {
            if axis_x {
                if self.x_in_ghz() {
                    out.push(format!("{:.3} GHz", VACUUM_LIGHT_SPEED / x));
                } else {
                    out.push(format!("{:.3} nm", x));
                }
            } else {
                out.push(format!("{:.2} dBm", y));
            }
        }
        out.join(" ")
    }

    fn fast_sweep_axis(&self) -> Vec<f64> {
        let start = self.number("OSAFSSTARTWL", 1530.0);
        let stop = self.number("OSAFSSTOPWL", 1560.0);
        self.axis(start, stop, FS_DEFAULT_POINTS)
    }
}

impl Responder for Ap2xxxSimulator {
    fn respond(&mut self, command: &str) -> Option<String> {
        if command == "*IDN?" {
            return Some(self.id.clone());
        }
        if let Some(name) = command.strip_suffix('?') {
            return Some(self.query(name));
        }

        let (name, arg) = split_setter(command);
        let trace: u8 = arg.split('_').next().and_then(|t| t.parse().ok()).unwrap_or(1);
        match name {
            "SPSWP" if arg != "3" => Some("1".to_string()),
            "SPSWP" => None,
            "SPDATAD" | "SPDATAL" => {
                let axis = self.axis(self.start(), self.stop(), self.points());
                let y = self.spectrum(&axis, name == "SPDATAL");
                Some(self.trace_reply(&y, true))
            }
            "SPDATAWL" => {
                let axis = self.axis(self.start(), self.stop(), self.points());
                Some(self.trace_reply(&axis, true))
            }
            "SPPKFIND" => {
                self.find_peaks(trace);
                None
            }
            "SPMKRAD" => {
                if let Some(pos) = arg.split_once('_').and_then(|(_, p)| p.parse::<f64>().ok()) {
                    self.markers.entry(trace).or_default().push((pos, -30.0));
                }
                None
            }
            "SPDATAMKRX" => Some(self.marker_reply(trace, true)),
            "SPDATAMKRY" => Some(self.marker_reply(trace, false)),
            "SPMKRDELAL" => {
                self.markers.remove(&trace);
                None
            }
            "SPTRDELAL" => {
                self.markers.clear();
                None
            }
            "SPLWTH" => Some(format!(
                "0.100 nm_{:.3} nm_2.25 dBm",
                (self.start() + self.stop()) / 2.0
            )),
            "SPMEASDETECTORDBM" => Some(
                self.values
                    .get("SPMEASDETECTORDBM1")
                    .cloned()
                    .unwrap_or_else(|| "-12.34".to_string()),
            ),
            "OSAFSPOINTS" => Some(
                self.values
                    .get("OSAFSPOINTS")
                    .cloned()
                    .unwrap_or_else(|| FS_DEFAULT_POINTS.to_string()),
            ),
            "OSAFSDATAD" | "OSAFSDATAL" => {
                let n = self.fast_sweep_axis().len();
                let linear = name == "OSAFSDATAL";
                let y: Vec<f64> = (0..n)
                    .map(|_| {
                        let r = self.rng.next_f64();
                        if linear {
                            10.0 * r
                        } else {
                            60.0 * r - 50.0
                        }
                    })
                    .collect();
                Some(self.trace_reply(&y, false))
            }
            "OSAFSDATAWL" => Some(self.trace_reply(&self.fast_sweep_axis(), false)),
            "SPSAVEA" | "SPSAVEB" | "OSAFSRUN" | "OSAFSSTOP" | "TLSSWP" | "SPWLCALM" => None,
            _ => {
                self.store(command);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_span_and_center_follow_start_stop() {
        let (conn, _log) = Ap2xxxSimulator::new().spawn();
        conn.send("SPSTRTWL1540.0").await.unwrap();
        conn.send("SPSTOPWL1550.0").await.unwrap();
        assert_eq!(conn.query("SPSPANWL?").await.unwrap(), "10.000");
        assert_eq!(conn.query("SPCTRWL?").await.unwrap(), "1545.000");
        conn.send("SPSPANWL2.0").await.unwrap();
        assert_eq!(conn.query("SPSTRTWL?").await.unwrap(), "1544.000");
    }

    #[tokio::test]
    async fn test_trace_reply_has_count_prefix() {
        let (conn, _log) = Ap2xxxSimulator::new().spawn();
        conn.send("SPNBPTSWP5").await.unwrap();
        let y = conn.query("SPDATAD1").await.unwrap();
        let tokens: Vec<&str> = y.split(' ').collect();
        assert_eq!(tokens.len(), 6);
        assert_eq!(tokens[0], "5");
    }

    #[tokio::test]
    async fn test_markers() {
        let (conn, log) = Ap2xxxSimulator::new().spawn();
        conn.send("SPMKRAD1_1550.5").await.unwrap();
        assert_eq!(conn.query("SPDATAMKRX1").await.unwrap(), "1 1550.500 nm");
        conn.send("SPMKRDELAL1").await.unwrap();
        assert_eq!(conn.query("SPDATAMKRX1").await.unwrap(), "0");
        assert!(log.contains("SPMKRDELAL1"));
    }

    #[tokio::test]
    async fn test_sweep_status_reply() {
        let (conn, _log) = Ap2xxxSimulator::new().spawn();
        assert_eq!(conn.query("SPSWP1").await.unwrap(), "1");
        assert_eq!(conn.query("*IDN?").await.unwrap(), SIMU_AP2050_ID);
    }
}
