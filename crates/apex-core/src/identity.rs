//! Decoding of `VENDOR/MODEL/SERIAL/VERSION` identity strings.
//!
//! Examples:
//! - mainframe: `APEX-TECHNOLOGIES/AP1000-8/00001/1.0`
//! - slot module: `APEX-TECHNOLOGIES/3314/13-3314-A-13-000502/1.0`
//! - AP2XXX: `APEX Technologies/2050-A/09-2050-A-000000/9.14`

use crate::error::{ApexError, Result};

/// Split view over an identity string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    raw: String,
}

impl Identity {
    /// Wrap a raw identity reply.
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Raw text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `/`-separated field, `None` when missing.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.raw.split('/').nth(index)
    }

    /// Vendor name (field 0).
    pub fn vendor(&self) -> Option<&str> {
        self.field(0)
    }

    /// Model field (field 1), e.g. `3314` or `2050-A`.
    pub fn model(&self) -> Option<&str> {
        self.field(1)
    }

    /// Module code: leading digits of the model field before any `-`.
    pub fn module_code(&self) -> Option<u32> {
        let model = self.model()?;
        first_integer(model.split('-').next()?)
    }

    /// Serial number: digits of the last `-` segment of field 2.
    pub fn serial_number(&self) -> Option<u64> {
        let serial = self.field(2)?;
        let last = serial.rsplit('-').next()?;
        let digits: String = last.chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    /// `-` separated part of the serial field (field 2).
    pub fn serial_part(&self, index: usize) -> Option<&str> {
        self.field(2)?.split('-').nth(index)
    }

    /// Option letter of a slot module (`A` in `13-3314-A-13-000502`).
    pub fn option_letter(&self) -> Option<&str> {
        self.serial_part(2)
    }

    /// Variant digits of a slot module (`13` in `13-3314-A-13-000502`).
    ///
    /// Power meters encode one channel-type digit per channel here.
    pub fn variant(&self) -> Option<&str> {
        self.serial_part(3)
    }

    /// Firmware version (field 3).
    pub fn version(&self) -> Option<&str> {
        self.field(3)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Module code of a slot identity, or [`ApexError::SlotNotDefined`].
pub fn slot_module_code(slot: u8, identity: &Identity) -> Result<u32> {
    identity.module_code().ok_or(ApexError::SlotNotDefined(slot))
}

/// Serial number of a slot identity, or [`ApexError::SlotNotDefined`].
pub fn slot_serial_number(slot: u8, identity: &Identity) -> Result<u64> {
    identity.serial_number().ok_or(ApexError::SlotNotDefined(slot))
}

fn first_integer(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_identity() {
        let id = Identity::new("APEX-TECHNOLOGIES/3314/13-3314-A-13-000502/1.0");
        assert_eq!(id.vendor(), Some("APEX-TECHNOLOGIES"));
        assert_eq!(id.module_code(), Some(3314));
        assert_eq!(id.serial_number(), Some(502));
        assert_eq!(id.serial_part(2), Some("A"));
        assert_eq!(id.serial_part(3), Some("13"));
        assert_eq!(id.option_letter(), Some("A"));
        assert_eq!(id.variant(), Some("13"));
        assert_eq!(id.version(), Some("1.0"));
    }

    #[test]
    fn test_ap2xxx_identity() {
        let id = Identity::new("APEX Technologies/2050-A/09-2050-A-000000/9.14");
        assert_eq!(id.model(), Some("2050-A"));
        assert_eq!(id.module_code(), Some(2050));
        assert_eq!(id.serial_number(), Some(0));
    }

    #[test]
    fn test_malformed_identity() {
        let id = Identity::new("Slot not used");
        assert_eq!(id.module_code(), None);
        assert_eq!(
            slot_module_code(4, &id).unwrap_err().code(),
            crate::error::SLOT_NOT_DEFINED
        );
        assert!(slot_serial_number(4, &id).is_err());
    }
}
