//! Error type shared by every Apex instrument driver.
//!
//! Apex instruments report failures with a flat table of negative integer
//! codes. [`ApexError`] keeps the human-readable message of each condition
//! and [`ApexError::code`] recovers the integer, so callers that log or
//! forward vendor codes do not have to match on variants.
//!
//! ## Code table
//!
//! | Code | Condition |
//! |------|-----------|
//! | -1   | communication failure (I/O, timeout, unparsable reply) |
//! | -2   | command rejected by the equipment |
//! | -11  | wrong argument type |
//! | -12  | wrong argument value |
//! | -13  | bad file name |
//! | -21..-24 | USB board errors |
//! | -151 | slot without a defined type |
//! | -152 | slot of the wrong type |
//! | -153 | slot module sub-type unknown |
//! | -301 | internal variable not defined |

use thiserror::Error;

/// Result alias used by all driver operations.
pub type Result<T> = std::result::Result<T, ApexError>;

/// Communication failure.
pub const COMMUNICATION: i32 = -1;
/// Command not understood by the equipment.
pub const BAD_COMMAND: i32 = -2;
/// Argument of the wrong type.
pub const ARGUMENT_TYPE: i32 = -11;
/// Argument outside the accepted values.
pub const ARGUMENT_VALUE: i32 = -12;
/// File name or parent directory not valid.
pub const BAD_FILENAME: i32 = -13;
/// No USB board of the requested model is attached.
pub const NO_EQUIPMENT_FOUND: i32 = -21;
/// Board handle does not refer to an open board.
pub const BAD_HANDLE: i32 = -22;
/// Vendor-request read on endpoint 0 failed.
pub const EP0_READ_ERROR: i32 = -23;
/// Vendor-request write on endpoint 0 failed.
pub const EP0_WRITE_ERROR: i32 = -24;
/// Slot identity cannot be decoded.
pub const SLOT_NOT_DEFINED: i32 = -151;
/// Slot holds a different module than requested.
pub const SLOT_NOT_GOOD_TYPE: i32 = -152;
/// Module sub-type (band, amplifier class) is unknown.
pub const SLOT_TYPE_NOT_DEFINED: i32 = -153;
/// Internal variable used before being set.
pub const VARIABLE_NOT_DEFINED: i32 = -301;

/// Errors raised by Apex instrument drivers.
#[derive(Error, Debug)]
pub enum ApexError {
    /// The equipment cannot be reached or the link dropped.
    #[error("Communication with equipment {0} cannot be established")]
    Communication(String),

    /// The equipment did not understand a command.
    #[error("Command '{0}' can't be interpreted by the equipment")]
    BadCommand(String),

    /// An argument had the wrong type (string where a number was expected...).
    #[error("Wrong argument type for '{0}'")]
    ArgumentType(String),

    /// An argument value is outside the accepted range or set.
    #[error("Wrong argument value for '{0}'")]
    ArgumentValue(String),

    /// A file path is not usable (missing parent directory).
    #[error("File name '{0}' is not valid")]
    BadFilename(String),

    /// No USB board of the given model was found.
    #[error("No {0} equipment found")]
    NoEquipmentFound(String),

    /// A board index does not match any connected board.
    #[error("Handle {0} does not match a connected board")]
    BadHandle(usize),

    /// A USB vendor-request read failed.
    #[error("USB control read failed for request 0x{0:02X}")]
    ControlRead(u8),

    /// A USB vendor-request write failed.
    #[error("USB control write failed for request 0x{0:02X}")]
    ControlWrite(u8),

    /// The slot identity could not be decoded into a module type.
    #[error("Slot n° {0} has not a defined type")]
    SlotNotDefined(u8),

    /// The slot holds a module other than the one requested.
    #[error("Slot n° {0} has not the good type")]
    SlotNotGoodType(u8),

    /// The module in the slot has an unknown sub-type.
    #[error("Slot n° {0} has not the good type")]
    SlotTypeNotDefined(u8),

    /// An internal variable was read before being defined.
    #[error("Internal variable '{0}' is not defined")]
    VariableNotDefined(String),

    /// No reply arrived within the configured timeout.
    #[error("Timeout waiting for reply to '{0}'")]
    Timeout(String),

    /// A reply could not be decoded.
    #[error("Invalid reply '{reply}' to '{command}'")]
    InvalidReply {
        /// Command that was sent
        command: String,
        /// Raw reply text
        reply: String,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApexError {
    /// Vendor integer code of this error.
    pub fn code(&self) -> i32 {
        match self {
            ApexError::Communication(_)
            | ApexError::Timeout(_)
            | ApexError::InvalidReply { .. }
            | ApexError::Io(_) => COMMUNICATION,
            ApexError::BadCommand(_) => BAD_COMMAND,
            ApexError::ArgumentType(_) => ARGUMENT_TYPE,
            ApexError::ArgumentValue(_) => ARGUMENT_VALUE,
            ApexError::BadFilename(_) => BAD_FILENAME,
            ApexError::NoEquipmentFound(_) => NO_EQUIPMENT_FOUND,
            ApexError::BadHandle(_) => BAD_HANDLE,
            ApexError::ControlRead(_) => EP0_READ_ERROR,
            ApexError::ControlWrite(_) => EP0_WRITE_ERROR,
            ApexError::SlotNotDefined(_) => SLOT_NOT_DEFINED,
            ApexError::SlotNotGoodType(_) => SLOT_NOT_GOOD_TYPE,
            ApexError::SlotTypeNotDefined(_) => SLOT_TYPE_NOT_DEFINED,
            ApexError::VariableNotDefined(_) => VARIABLE_NOT_DEFINED,
        }
    }

    /// Shorthand for [`ApexError::ArgumentValue`].
    pub fn argument_value(name: impl Into<String>) -> Self {
        ApexError::ArgumentValue(name.into())
    }

    /// Shorthand for [`ApexError::InvalidReply`].
    pub fn invalid_reply(command: impl Into<String>, reply: impl Into<String>) -> Self {
        ApexError::InvalidReply {
            command: command.into(),
            reply: reply.into(),
        }
    }

    /// True for errors caused by the link rather than by the caller.
    pub fn is_communication(&self) -> bool {
        self.code() == COMMUNICATION
    }
}
