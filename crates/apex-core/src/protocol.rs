//! ASCII command grammar shared by the AP1000 and AP2XXX families.
//!
//! Commands are `<MODULE>[<slot:02d>]:<VERB><value>` for AP1000 slot
//! modules and a bare `<VERB><value>` for AP2XXX equipment. Queries end in
//! `?` and the reply is a single line whose terminator is stripped.

use crate::error::{ApexError, Result};

/// Format a slot-addressed command: `slot_command("TLS", 3, "TWL?")` gives `TLS[03]:TWL?`.
pub fn slot_command(module: &str, slot: u8, verb: &str) -> String {
    format!("{}[{:02}]:{}", module, slot, verb)
}

/// Fixed-width wavelength field: three decimals, left zero-padded to 8 characters.
///
/// `980.5` gives `0980.500`, `1550.0` gives `1550.000`.
pub fn zero_padded(value: f64) -> String {
    format!("{:08.3}", value)
}

/// Shortest round-trip rendering that always keeps a decimal point.
///
/// `1000.0` gives `1000.0`, `15.5` gives `15.5`.
pub fn float_repr(value: f64) -> String {
    format!("{:?}", value)
}

/// Remove the reply terminator (`\n` and an optional preceding `\r`).
pub fn strip_terminator(reply: &str) -> &str {
    let reply = reply.strip_suffix('\n').unwrap_or(reply);
    reply.strip_suffix('\r').unwrap_or(reply)
}

/// Parse a numeric reply.
pub fn parse_f64(command: &str, reply: &str) -> Result<f64> {
    reply
        .trim()
        .parse::<f64>()
        .map_err(|_| ApexError::invalid_reply(command, reply))
}

/// Parse an integer reply. Accepts a float-formatted integer such as `3.0`.
pub fn parse_i64(command: &str, reply: &str) -> Result<i64> {
    let trimmed = reply.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.is_finite() => Ok(v as i64),
        _ => Err(ApexError::invalid_reply(command, reply)),
    }
}

/// Parse a `0`/`1` reply.
pub fn parse_bool(command: &str, reply: &str) -> Result<bool> {
    match reply.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(ApexError::invalid_reply(command, reply)),
    }
}

/// Split a list reply on `sep`; unparsable tokens become NaN.
pub fn parse_float_list(reply: &str, sep: char) -> Vec<f64> {
    tokens(reply, sep)
        .map(|t| t.parse::<f64>().unwrap_or(f64::NAN))
        .collect()
}

/// Split a list reply on `sep`; unparsable tokens are dropped.
pub fn parse_float_list_skipping(reply: &str, sep: char) -> Vec<f64> {
    tokens(reply, sep).filter_map(|t| t.parse::<f64>().ok()).collect()
}

/// Split a list reply on `sep`; unparsable tokens become `fallback`.
pub fn parse_float_list_or(reply: &str, sep: char, fallback: f64) -> Vec<f64> {
    tokens(reply, sep)
        .map(|t| t.parse::<f64>().unwrap_or(fallback))
        .collect()
}

/// Non-empty trimmed tokens of a list reply.
pub fn tokens(reply: &str, sep: char) -> impl Iterator<Item = &str> {
    reply.split(sep).map(str::trim).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_repr() {
        assert_eq!(float_repr(1000.0), "1000.0");
        assert_eq!(float_repr(15.5), "15.5");
        assert_eq!(float_repr(-3.25), "-3.25");
    }

    #[test]
    fn test_slot_command() {
        assert_eq!(slot_command("TLS", 3, "TWL?"), "TLS[03]:TWL?");
        assert_eq!(slot_command("SLT", 12, "IDN?"), "SLT[12]:IDN?");
        assert_eq!(slot_command("POW", 0, "DBM1?"), "POW[00]:DBM1?");
    }

    #[test]
    fn test_zero_padded() {
        assert_eq!(zero_padded(1550.0), "1550.000");
        assert_eq!(zero_padded(980.5), "0980.500");
        assert_eq!(zero_padded(1553.3104), "1553.310");
    }

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_terminator("5.00\n"), "5.00");
        assert_eq!(strip_terminator("5.00\r\n"), "5.00");
        assert_eq!(strip_terminator("5.00"), "5.00");
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_f64("TPDB?", " 2.45 ").unwrap(), 2.45);
        assert!(parse_f64("TPDB?", "abc").is_err());
        assert_eq!(parse_i64("NBPTS?", "1000").unwrap(), 1000);
        assert_eq!(parse_i64("NBPTS?", "3.0").unwrap(), 3);
        assert!(parse_i64("NBPTS?", "3.5").is_err());
        assert!(parse_bool("L?", "1").unwrap());
        assert!(parse_bool("L?", "2").is_err());
    }

    #[test]
    fn test_list_parsing() {
        let sop = parse_float_list("0.1 0.2 x 0.4", ' ');
        assert_eq!(sop.len(), 4);
        assert!(sop[2].is_nan());

        assert_eq!(parse_float_list_skipping("1.0,abc,3.0", ','), vec![1.0, 3.0]);
        assert_eq!(parse_float_list_or("1 x 3", ' ', 0.0), vec![1.0, 0.0, 3.0]);
    }
}
