//! Unit conversions and unit selectors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ApexError, Result};

/// Speed of light in vacuum (m/s). Dividing it by a wavelength in nm gives GHz.
pub const VACUUM_LIGHT_SPEED: f64 = 299_792_458.0;

/// Wavelength (nm) to frequency (GHz).
pub fn nm_to_ghz(wavelength_nm: f64) -> f64 {
    VACUUM_LIGHT_SPEED / wavelength_nm
}

/// Frequency (GHz) to wavelength (nm).
pub fn ghz_to_nm(frequency_ghz: f64) -> f64 {
    VACUUM_LIGHT_SPEED / frequency_ghz
}

/// dBm to mW.
pub fn dbm_to_mw(power_dbm: f64) -> f64 {
    10f64.powf(power_dbm / 10.0)
}

/// mW to dBm. Non-positive powers have no logarithm.
pub fn mw_to_dbm(power_mw: f64) -> Result<f64> {
    if power_mw <= 0.0 || !power_mw.is_finite() {
        return Err(ApexError::argument_value("Power"));
    }
    Ok(10.0 * power_mw.log10())
}

/// Attenuation in dB to transmission in percent.
pub fn db_to_percent(attenuation_db: f64) -> f64 {
    100.0 * 10f64.powf(-attenuation_db / 10.0)
}

/// Transmission in percent to attenuation in dB.
pub fn percent_to_db(transmission: f64) -> Result<f64> {
    if transmission <= 0.0 || !transmission.is_finite() {
        return Err(ApexError::argument_value("Attenuation"));
    }
    Ok(-10.0 * (transmission / 100.0).log10())
}

macro_rules! unit_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let label = match self {
                    $($name::$variant => $label,)+
                };
                write!(f, "{}", label)
            }
        }

        impl FromStr for $name {
            type Err = ApexError;

            fn from_str(s: &str) -> Result<Self> {
                $(
                    if s.trim().eq_ignore_ascii_case($label) {
                        return Ok($name::$variant);
                    }
                )+
                Err(ApexError::argument_value(s))
            }
        }
    };
}

unit_enum! {
    /// Optical power unit.
    PowerUnit {
        /// Decibel-milliwatt
        #[default]
        Dbm => "dBm",
        /// Milliwatt
        Mw => "mW",
    }
}

unit_enum! {
    /// Spectral axis unit.
    SpectralUnit {
        /// Nanometre
        #[default]
        Nm => "nm",
        /// Gigahertz
        Ghz => "GHz",
    }
}

unit_enum! {
    /// Attenuation unit.
    AttenuationUnit {
        /// Decibel
        #[default]
        Db => "dB",
        /// Transmission in percent
        Percent => "%",
    }
}

impl PowerUnit {
    /// Convert a dBm reading into this unit.
    pub fn from_dbm(self, power_dbm: f64) -> f64 {
        match self {
            PowerUnit::Dbm => power_dbm,
            PowerUnit::Mw => dbm_to_mw(power_dbm),
        }
    }

    /// Convert a value in this unit into dBm.
    pub fn to_dbm(self, power: f64) -> Result<f64> {
        match self {
            PowerUnit::Dbm => Ok(power),
            PowerUnit::Mw => mw_to_dbm(power),
        }
    }
}

impl AttenuationUnit {
    /// Convert a value in this unit into dB.
    pub fn to_db(self, value: f64) -> Result<f64> {
        match self {
            AttenuationUnit::Db => Ok(value),
            AttenuationUnit::Percent => percent_to_db(value),
        }
    }

    /// Convert a dB value into this unit.
    pub fn from_db(self, attenuation_db: f64) -> f64 {
        match self {
            AttenuationUnit::Db => attenuation_db,
            AttenuationUnit::Percent => db_to_percent(attenuation_db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_wavelength_frequency() {
        assert!((nm_to_ghz(1550.0) - 193_414.489).abs() < 1e-3);
        assert!(close(ghz_to_nm(nm_to_ghz(1550.0)), 1550.0));
    }

    #[test]
    fn test_power_conversion() {
        assert!(close(dbm_to_mw(0.0), 1.0));
        assert!(close(dbm_to_mw(10.0), 10.0));
        assert!(close(mw_to_dbm(1.0).unwrap(), 0.0));
        assert!(close(mw_to_dbm(0.1).unwrap(), -10.0));
        assert!(mw_to_dbm(0.0).is_err());
        assert!(close(PowerUnit::Mw.from_dbm(3.0), dbm_to_mw(3.0)));
    }

    #[test]
    fn test_attenuation_conversion() {
        assert!(close(percent_to_db(10.0).unwrap(), 10.0));
        assert!(close(db_to_percent(3.0), 100.0 * 10f64.powf(-0.3)));
        assert!(percent_to_db(-1.0).is_err());
        assert!(close(AttenuationUnit::Percent.from_db(20.0), 1.0));
    }

    #[test]
    fn test_unit_from_str() {
        assert_eq!("MW".parse::<PowerUnit>().unwrap(), PowerUnit::Mw);
        assert_eq!("dbm".parse::<PowerUnit>().unwrap(), PowerUnit::Dbm);
        assert_eq!("ghz".parse::<SpectralUnit>().unwrap(), SpectralUnit::Ghz);
        assert_eq!("%".parse::<AttenuationUnit>().unwrap(), AttenuationUnit::Percent);
        assert_eq!("W".parse::<PowerUnit>().unwrap_err().code(), crate::error::ARGUMENT_VALUE);
    }
}
