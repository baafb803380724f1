//! Vendor constants: module codes, slot range and per-module hard limits.
//!
//! Limits indexed by module sub-type use the band index decoded from the
//! slot identity (C band 0, L band 2, O band 5).

use std::time::Duration;

use crate::units::VACUUM_LIGHT_SPEED;

// =============================================================================
// AP1000 Module Codes
// =============================================================================

/// Optical power meter.
pub const AP1000_PWM: u32 = 3314;
/// C band tunable laser.
pub const AP1000_TLS_CBAND: u32 = 3350;
/// L band tunable laser.
pub const AP1000_TLS_LBAND: u32 = 3352;
/// C band DFB laser.
pub const AP1000_DFB_CBAND: u32 = 3340;
/// L band DFB laser.
pub const AP1000_DFB_LBAND: u32 = 3342;
/// O band DFB laser.
pub const AP1000_DFB_OBAND: u32 = 3345;
/// Optical switch.
pub const AP1000_OSW: u32 = 3344;
/// Optical attenuator.
pub const AP1000_ATT: u32 = 3364;
/// Erbium pre-amplifier.
pub const AP1000_EFA_PREAMP: u32 = 3370;
/// Erbium booster amplifier.
pub const AP1000_EFA_BOOST: u32 = 3371;
/// Erbium in-line amplifier.
pub const AP1000_EFA_INLINE: u32 = 3372;

/// Code to display name table of known AP1000 modules.
pub const AP1000_MODULES: &[(u32, &str)] = &[
    (AP1000_TLS_CBAND, "C Band Tunable Laser Source"),
    (AP1000_TLS_LBAND, "L Band Tunable Laser Source"),
    (AP1000_DFB_CBAND, "C Band DFB Laser Source"),
    (AP1000_DFB_LBAND, "L Band DFB Laser Source"),
    (AP1000_DFB_OBAND, "O Band DFB Laser Source"),
    (AP1000_PWM, "Optical Power Meter"),
    (AP1000_ATT, "Optical Attenuator"),
    (AP1000_EFA_PREAMP, "Erbium Doped Fiber Pre-Amplifier"),
    (AP1000_EFA_BOOST, "Erbium Doped Fiber Booster Amplifier"),
    (AP1000_EFA_INLINE, "Erbium Doped Fiber In-Line Amplifier"),
    (AP1000_OSW, "Optical Switch"),
];

/// Display name of an AP1000 module code.
pub fn module_name(code: u32) -> Option<&'static str> {
    AP1000_MODULES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

// =============================================================================
// AP1000 Slots
// =============================================================================

/// Lowest slot number.
pub const AP1000_SLOT_MIN: u8 = 0;
/// Highest slot number.
pub const AP1000_SLOT_MAX: u8 = 92;

// =============================================================================
// Power Meter
// =============================================================================

/// Channel type digits in the power meter identity.
pub const AP1000_PWM_CHTYPE: &[(char, &str)] = &[('1', "Standard"), ('3', "High Power")];
/// Calibration wavelength range (nm).
pub const AP1000_PWM_WLMIN: f64 = 800.0;
/// Calibration wavelength range (nm).
pub const AP1000_PWM_WLMAX: f64 = 1700.0;
/// Averaging time range (ms).
pub const AP1000_PWM_AVGMIN: f64 = 15.0;
/// Averaging time range (ms).
pub const AP1000_PWM_AVGMAX: f64 = 10000.0;

// =============================================================================
// Attenuator
// =============================================================================

/// Number of attenuator channels.
pub const AP1000_ATT_CHNUMBER: u8 = 2;
/// Attenuation range (dB).
pub const AP1000_ATT_ATTMIN: f64 = 0.0;
/// Attenuation range (dB).
pub const AP1000_ATT_ATTMAX: f64 = 31.0;
/// Wavelength range (nm).
pub const AP1000_ATT_WLMIN: f64 = 1300.0;
/// Wavelength range (nm).
pub const AP1000_ATT_WLMAX: f64 = 1700.0;

// =============================================================================
// Lasers
// =============================================================================

/// Band-indexed range: `[C, -, L, -, -, O]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandRange {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

impl BandRange {
    /// Clamp a value into the range, returning whether it was changed.
    pub fn clamp(&self, value: f64) -> (f64, bool) {
        if value < self.min {
            (self.min, true)
        } else if value > self.max {
            (self.max, true)
        } else {
            (value, false)
        }
    }

    /// Inclusive containment.
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Convert a wavelength range (nm) into the frequency range (GHz).
    pub fn to_frequency(&self) -> BandRange {
        BandRange {
            min: VACUUM_LIGHT_SPEED / self.max,
            max: VACUUM_LIGHT_SPEED / self.min,
        }
    }
}

/// Tunable laser output power (dBm), C and L bands.
pub const AP1000_TLS_POW: BandRange = BandRange { min: -30.0, max: 13.0 };
/// Tunable laser C band wavelength (nm).
pub const AP1000_TLS_WL_CBAND: BandRange = BandRange { min: 1526.0, max: 1567.0 };
/// Tunable laser L band wavelength (nm).
pub const AP1000_TLS_WL_LBAND: BandRange = BandRange { min: 1567.0, max: 1608.0 };
/// Tunable laser SOA current code range.
pub const AP1000_TLS_SOA: (u32, u32) = (0, 65535);
/// Tunable laser diode temperature code range.
pub const AP1000_TLS_TEMP: (u32, u32) = (0, 65535);
/// Tunable laser diode numbers.
pub const AP1000_TLS_DIODES: (u8, u8) = (1, 12);

/// DFB laser output power (dBm).
pub const AP1000_DFB_POW: BandRange = BandRange { min: -10.0, max: 10.0 };
/// DFB C band wavelength (nm).
pub const AP1000_DFB_WL_CBAND: BandRange = BandRange { min: 1527.0, max: 1567.0 };
/// DFB L band wavelength (nm).
pub const AP1000_DFB_WL_LBAND: BandRange = BandRange { min: 1567.0, max: 1607.0 };
/// DFB O band wavelength (nm).
pub const AP1000_DFB_WL_OBAND: BandRange = BandRange { min: 1290.0, max: 1330.0 };

/// Settling delay after switching a laser output on.
pub const LASER_ON_DELAY: Duration = Duration::from_millis(200);

// =============================================================================
// Erbium Amplifier
// =============================================================================

/// Maximum pump current (mA) for booster, in-line and pre-amplifier.
pub const AP1000_EFA_IPMAX: [f64; 3] = [1000.0, 600.0, 600.0];
/// Volts per LSB of the photodiode converters (2.048 V over 12 bits).
pub const AP1000_EFA_VOLT_PER_LSB: f64 = 2.048 / 4096.0;

// =============================================================================
// Filter
// =============================================================================

/// Default filter wavelength range (nm), used until the module is queried.
pub const AP1000_FIL_WL: BandRange = BandRange { min: 1520.0, max: 1570.0 };

// =============================================================================
// Polarimeter
// =============================================================================

/// Acquisition time range (ms).
pub const AP1000_POL_ACQ: BandRange = BandRange { min: 1.0, max: 10000.0 };
/// Wavelength range (nm).
pub const AP1000_POL_WL: BandRange = BandRange { min: 1250.0, max: 1650.0 };

// =============================================================================
// AP2XXX
// =============================================================================

/// Wavelength, span, centre, resolution and point-count limits of an AP2XXX model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ap2xxxLimits {
    /// Wavelength range (nm)
    pub wavelength: BandRange,
    /// Span range (nm)
    pub span: BandRange,
    /// Y resolution (dB/div)
    pub y_resolution: BandRange,
    /// Number of sweep points
    pub points: (u32, u32),
}

impl Ap2xxxLimits {
    /// Allowed centre for a given span.
    pub fn center_for_span(&self, span: f64) -> BandRange {
        BandRange {
            min: self.wavelength.min + span / 2.0,
            max: self.wavelength.max - span / 2.0,
        }
    }
}

/// Limits shared by the AP2XXX family and the legacy AP2040/AP2050.
pub const AP2XXX_LIMITS: Ap2xxxLimits = Ap2xxxLimits {
    wavelength: BandRange { min: 1526.0, max: 1566.0 },
    span: BandRange { min: 0.01, max: 40.0 },
    y_resolution: BandRange { min: 0.001, max: 100.0 },
    points: (2, 20000),
};

/// Trace numbers accepted by AP2XXX trace commands.
pub const AP2XXX_TRACES: (u8, u8) = (0, 6);

// =============================================================================
// USB Boards
// =============================================================================

/// USB vendor id of the Apex boards.
pub const ABXXXX_VENDOR_ID: u16 = 0x04B4;
/// AB3380 product id.
pub const AB3380_PRODUCT_ID: u16 = 0x3380;
/// AB3510 product id.
pub const AB3510_PRODUCT_ID: u16 = 0x3510;
/// bmRequestType for host-to-device vendor requests.
pub const USB_VENDOR_OUT: u8 = 0x40;
/// bmRequestType for device-to-host vendor requests.
pub const USB_VENDOR_IN: u8 = 0xC0;
/// Size of the AB3380 EEPROM record.
pub const AB3380_EEPROM_SIZE: usize = 1200;
/// Number of calibration points in the AB3380 record.
pub const AB3380_PTS_NB: usize = 97;
/// Full-scale DAC value of the AB3380.
pub const AB3380_VOLTAGE_MAX: u32 = 65535;
/// Number of AB3510 photodetector channels.
pub const AB3510_CHANNELS: usize = 4;
/// Size of an AB3510 per-channel power table.
pub const AB3510_POWER_TABLE: usize = 16384;

// =============================================================================
// Etuve
// =============================================================================

/// Etuve serial baud rate.
pub const ETUVE_BAUD_RATE: u32 = 9600;
/// Minimum age of the cached Etuve frame before it is polled again.
pub const ETUVE_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_names() {
        assert_eq!(module_name(3314), Some("Optical Power Meter"));
        assert_eq!(module_name(3352), Some("L Band Tunable Laser Source"));
        assert_eq!(module_name(1), None);
    }

    #[test]
    fn test_band_range() {
        assert_eq!(AP1000_TLS_WL_CBAND.clamp(1500.0), (1526.0, true));
        assert_eq!(AP1000_TLS_WL_CBAND.clamp(1550.0), (1550.0, false));
        let fr = AP1000_TLS_WL_CBAND.to_frequency();
        assert!(fr.min < fr.max);
        assert!(fr.contains(VACUUM_LIGHT_SPEED / 1550.0));
    }

    #[test]
    fn test_center_for_span() {
        let c = AP2XXX_LIMITS.center_for_span(20.0);
        assert_eq!(c.min, 1536.0);
        assert_eq!(c.max, 1556.0);
    }

    #[test]
    fn test_eeprom_record_fits() {
        assert!(32 + AB3380_PTS_NB * 12 <= AB3380_EEPROM_SIZE);
    }
}
