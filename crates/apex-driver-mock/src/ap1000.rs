//! AP1000 mainframe simulator.
//!
//! Answers `*IDN?`, the `SLT[nn]` slot queries and the slot module verbs.
//! Setters are remembered per slot and echoed back by the matching query,
//! so a driver reading back what it just wrote sees its own value.
//! Queries that were never set answer with the vendor's simulation values.

use std::collections::{BTreeMap, HashMap};

use apex_core::units::VACUUM_LIGHT_SPEED;
use apex_core::Connection;

use crate::server::{spawn_line_simulator, split_setter, split_slot_command, CommandLog, Responder};

/// Mainframe identity.
pub const SIMU_AP1000_ID: &str = "APEX-TECHNOLOGIES/AP1000-8/00001/1.0";
/// Power meter with one standard and one high power channel.
pub const SIMU_PWM_ID: &str = "APEX-TECHNOLOGIES/3314/13-3314-A-13-000502/1.0";
/// Two channel attenuator.
pub const SIMU_ATT_ID: &str = "APEX-TECHNOLOGIES/3364/12-3364-A-2-000504/0.0";
/// C band tunable laser.
pub const SIMU_TLS_ID: &str = "APEX-TECHNOLOGIES/3350/10-3350-A-000503/0.0";
/// Booster erbium amplifier.
pub const SIMU_EFA_ID: &str = "APEX-TECHNOLOGIES/3371/09-3371-A-000500/0.0";
/// C band DFB laser.
pub const SIMU_DFB_ID: &str = "APEX-TECHNOLOGIES/3340/11-3340-A-000505/0.0";
/// Optical switch.
pub const SIMU_OSW_ID: &str = "APEX-TECHNOLOGIES/3344/11-3344-A-000506/0.0";

/// Stateful AP1000 simulator.
#[derive(Debug, Clone)]
pub struct Ap1000Simulator {
    id: String,
    slots: BTreeMap<u8, String>,
    values: HashMap<String, String>,
}

impl Default for Ap1000Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Ap1000Simulator {
    /// Empty mainframe.
    pub fn new() -> Self {
        Self {
            id: SIMU_AP1000_ID.to_string(),
            slots: BTreeMap::new(),
            values: HashMap::new(),
        }
    }

    /// Mainframe populated with one module of each identified type:
    /// PWM in slot 1, ATT 2, TLS 3, EFA 4, DFB 5, OSW 6.
    pub fn with_default_slots() -> Self {
        Self::new()
            .with_module(1, SIMU_PWM_ID)
            .with_module(2, SIMU_ATT_ID)
            .with_module(3, SIMU_TLS_ID)
            .with_module(4, SIMU_EFA_ID)
            .with_module(5, SIMU_DFB_ID)
            .with_module(6, SIMU_OSW_ID)
    }

    /// Override the mainframe identity.
    pub fn with_identity(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Insert a module with the given identity string.
    pub fn with_module(mut self, slot: u8, identity: &str) -> Self {
        self.slots.insert(slot, identity.to_string());
        self
    }

    /// Force the reply of a query: `with_reply("POW[01]:DBM[1]", "-7.5")`.
    pub fn with_reply(mut self, key: &str, reply: &str) -> Self {
        self.values.insert(key.to_string(), reply.to_string());
        self
    }

    /// Start the simulator and return a connection to it.
    pub fn spawn(self) -> (Connection, CommandLog) {
        spawn_line_simulator(self, "ap1000-sim")
    }

    fn slot_query(&self, slot: u8, verb: &str) -> Option<String> {
        let module = self.slots.get(&slot);
        match verb {
            "EMPTY?" => Some(if module.is_some() { "1" } else { "0" }.to_string()),
            "IDN?" => Some(module.cloned().unwrap_or_else(|| "0".to_string())),
            _ => None,
        }
    }

    fn store(&mut self, module: &str, slot: u8, verb: &str) {
        let (name, value) = split_setter(verb);
        let key = slot_key(module, slot, name);
        self.values.insert(key, value.to_string());

        // The filter answers in both domains whichever one was set.
        if module == "FIL" {
            if let Ok(v) = value.parse::<f64>() {
                match name {
                    "TWL" => {
                        self.values
                            .insert(slot_key(module, slot, "TFR"), format!("{:.3}", VACUUM_LIGHT_SPEED / v));
                    }
                    "TFR" => {
                        self.values
                            .insert(slot_key(module, slot, "TWL"), format!("{:.3}", VACUUM_LIGHT_SPEED / v));
                    }
                    _ => {}
                }
            }
        }
    }

    fn osa_value(&self, slot: u8, name: &str, default: f64) -> f64 {
        self.values
            .get(&slot_key("OSA", slot, name))
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn osa_axis(&self, slot: u8) -> Vec<f64> {
        let start = self.osa_value(slot, "STARTWL", 1530.0);
        let stop = self.osa_value(slot, "STOPWL", 1560.0);
        let points = self.osa_value(slot, "NBPTS", 400.0).max(2.0) as usize;
        (0..points)
            .map(|i| start + (stop - start) * i as f64 / (points - 1) as f64)
            .collect()
    }

    fn osa_data(&self, slot: u8, verb: &str) -> String {
        let axis = self.osa_axis(slot);
        let n = axis.len();
        let values: Vec<String> = match verb {
            "DATAX1" => axis.iter().map(|x| format!("{:.3}", VACUUM_LIGHT_SPEED / x)).collect(),
            v if v.starts_with("DATAX") => axis.iter().map(|x| format!("{:.3}", x)).collect(),
            v => {
                let kind: u8 = v.trim_start_matches("DATAY").parse().unwrap_or(0);
                (0..n)
                    .map(|i| {
                        let u = (i as f64 - n as f64 / 2.0) / (n as f64 / 20.0);
                        let log = -60.0 + 55.0 * (-u * u).exp();
                        let y = match kind {
                            1 => (u / 4.0).cos(),
                            2 => (u / 4.0).sin(),
                            3 => 0.1,
                            4 => 10f64.powf(log / 10.0),
                            5 => 0.99,
                            _ => log,
                        };
                        format!("{:.4}", y)
                    })
                    .collect()
            }
        };
        values.join(",")
    }
}

impl Responder for Ap1000Simulator {
    fn respond(&mut self, command: &str) -> Option<String> {
        match command {
            "*IDN?" => return Some(self.id.clone()),
            "*RST" => {
                self.values.clear();
                return None;
            }
            _ => {}
        }

        let (module, slot, verb) = split_slot_command(command)?;
        if module == "SLT" {
            return self.slot_query(slot, verb);
        }

        if let Some(query) = verb.strip_suffix('?') {
            let key = slot_key(module, slot, &stored_name(query));
            let reply = self
                .values
                .get(&key)
                .cloned()
                .unwrap_or_else(|| default_reply(module, slot, query));
            return Some(reply);
        }

        match verb {
            "POWERINVALUE" => Some("512".to_string()),
            "POWEROUTVALUE" => Some("624".to_string()),
            "GETAVERAGE" => {
                let key = slot_key(module, slot, "SETAVERAGE");
                Some(self.values.get(&key).cloned().unwrap_or_else(|| "1000".to_string()))
            }
            v if module == "OSA" && (v.starts_with("DATAX") || v.starts_with("DATAY")) => {
                Some(self.osa_data(slot, v))
            }
            v => {
                self.store(module, slot, v);
                None
            }
        }
    }
}

fn slot_key(module: &str, slot: u8, name: &str) -> String {
    format!("{}[{:02}]:{}", module, slot, name)
}

/// Query name to the setter name that stores its value.
fn stored_name(query: &str) -> String {
    match query.strip_prefix("WAV[") {
        Some(rest) => format!("SETWAVELENGTH[{}", rest),
        None => query.to_string(),
    }
}

fn default_reply(module: &str, slot: u8, query: &str) -> String {
    let reply = match (module, query) {
        ("POW" | "POWB" | "POW1", "SETAVERAGE") => "1000",
        ("POW" | "POWB" | "POW1", q) if q.starts_with("WAV[") => "1550.000",
        ("POW" | "POWB" | "POW1", q) if q.starts_with("DBM[") => "2.45",
        ("POW" | "POWB" | "POW1", q) if q.starts_with("MW[") => "1.85",
        ("ATT", q) if q.starts_with("DB[") => "10",
        ("TLS", "TPDB") => "5",
        ("TLS", "TWL") => "1553.310",
        ("DFB", "TPDB") => "3.0",
        ("DFB", "TWL") => "1550.120",
        ("TLS" | "DFB", "L") => "0",
        ("AMP", "INDB") => "-10",
        ("AMP", "OTDB") => "15",
        ("SWI", "CONF") => "0",
        ("FIL", "TWL") => "1550.000",
        ("FIL", "TFR") => return format!("{:.3}", VACUUM_LIGHT_SPEED / 1550.0),
        ("FIL", "WLMIN") => "1520.000",
        ("FIL", "WLMAX") => "1570.000",
        ("FIL", "FRMIN") => return format!("{:.3}", VACUUM_LIGHT_SPEED / 1570.0),
        ("FIL", "FRMAX") => return format!("{:.3}", VACUUM_LIGHT_SPEED / 1520.0),
        ("POL", "ACQTIME") => "100",
        ("POL", "WL") => "1550.000",
        ("POL", "DBM") => "-3.50",
        ("POL", "MW") => "0.447",
        ("POL", "SOP") => "0.5000 -0.5000 0.7071 0.9800",
        ("POL", "BOARDID") => "POL-000123 1.2 0.0",
        ("POL", "RAW4") => "1024 2048 512 256",
        ("POL", "POW4") => "-3.1 -4.2 -5.3 -6.4",
        ("POL", "TEMP") => "25.5",
        ("OSA", "POWER") => return slot.to_string(),
        ("OSA", "FILTER") => "0",
        ("OSA", "STARTWL") => "1530.000",
        ("OSA", "STOPWL") => "1560.000",
        ("OSA", "NBPTS") => "400",
        ("OSA", "SWEEP") => "0",
        _ => "0",
    };
    reply.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slot_queries() {
        let (conn, log) = Ap1000Simulator::with_default_slots().spawn();
        assert_eq!(conn.query("*IDN?").await.unwrap(), SIMU_AP1000_ID);
        assert_eq!(conn.query("SLT[01]:EMPTY?").await.unwrap(), "1");
        assert_eq!(conn.query("SLT[09]:EMPTY?").await.unwrap(), "0");
        assert_eq!(conn.query("SLT[03]:IDN?").await.unwrap(), SIMU_TLS_ID);
        assert_eq!(log.commands().len(), 4);
    }

    #[tokio::test]
    async fn test_setter_is_echoed_by_query() {
        let (conn, _log) = Ap1000Simulator::with_default_slots().spawn();
        assert_eq!(conn.query("POW[01]:WAV[1]?").await.unwrap(), "1550.000");
        conn.send("POW[01]:SETWAVELENGTH[1]1310.000").await.unwrap();
        assert_eq!(conn.query("POW[01]:WAV[1]?").await.unwrap(), "1310.000");
        conn.send("FIL[07]:TWL1540.000").await.unwrap();
        let fr: f64 = conn.query("FIL[07]:TFR?").await.unwrap().parse().unwrap();
        assert!((fr - VACUUM_LIGHT_SPEED / 1540.0).abs() < 1e-2);
    }

    #[tokio::test]
    async fn test_osa_trace_length_follows_points() {
        let (conn, _log) = Ap1000Simulator::new().spawn();
        conn.send("OSA[01]:NBPTS10").await.unwrap();
        let x = conn.query("OSA[01]:DATAX0").await.unwrap();
        assert_eq!(x.split(',').count(), 10);
        assert!(x.starts_with("1530.000"));
    }

    #[tokio::test]
    async fn test_reset_forgets_values() {
        let (conn, _log) = Ap1000Simulator::with_default_slots()
            .with_reply("ATT[02]:DB[0]", "3.5")
            .spawn();
        assert_eq!(conn.query("ATT[02]:DB[0]?").await.unwrap(), "3.5");
        conn.send("*RST").await.unwrap();
        assert_eq!(conn.query("ATT[02]:DB[0]?").await.unwrap(), "10");
    }
}
