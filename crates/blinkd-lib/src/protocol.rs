//! One-byte control protocol.
//!
//! Layout, most significant bit first:
//!
//! ```text
//!   7 6   5   4 3 2 1 0
//!  [tgt] [r] [rate field]
//! ```
//!
//! `tgt` selects Caps (0), Num (1), Scroll (2) or all LEDs (3). The rate
//! field carries an absolute rate, except for its two largest values which
//! mean increment ([`RATE_INC`]) and decrement ([`RATE_DEC`]). Bit 5 is
//! reserved and ignored by the decoder.
//!
//! The client writes one byte and closes. The server never replies.

use std::fmt;

use crate::led::{Led, Target};

/// Rate field value meaning "decrement".
pub const RATE_DEC: u8 = 0x1F;
/// Rate field value meaning "increment".
pub const RATE_INC: u8 = RATE_DEC - 1;
/// Largest absolute rate a command can carry.
pub const RATE_CEILING: i32 = RATE_INC as i32 - 1;
/// Stored rate for an LED that has no worker and must never be lit.
pub const DISABLED: i32 = -1;

/// Shift of the two target bits.
pub const TARGET_SHIFT: u8 = 6;
/// Mask of the five-bit rate field.
pub const RATE_FIELD_MASK: u8 = 0x1F;
/// Bit between target and rate field, unused by the protocol.
pub const RESERVED_BIT: u8 = 0x20;

/// Default TCP port for the control channel.
pub const DEFAULT_PORT: u16 = 12345;

/// What a command does to its target's rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Replace the rate outright.
    Set(u8),
    Increment,
    Decrement,
}

/// A decoded control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub target: Target,
    pub action: Action,
}

impl Command {
    pub fn new(target: Target, action: Action) -> Self {
        Self { target, action }
    }

    pub fn set(led: Led, rate: u8) -> Self {
        Self::new(Target::Led(led), Action::Set(rate))
    }

    /// Decode one wire byte. Total over all 256 values.
    pub fn decode(byte: u8) -> Self {
        let target = Target::from_wire((byte >> TARGET_SHIFT) & 0b11);
        let action = match byte & RATE_FIELD_MASK {
            RATE_INC => Action::Increment,
            RATE_DEC => Action::Decrement,
            rate => Action::Set(rate),
        };
        Self { target, action }
    }

    /// Encode into a wire byte.
    ///
    /// Fails for `Set` values above [`RATE_CEILING`], which would collide with
    /// the increment/decrement encodings or spill into the reserved bit.
    pub fn encode(&self) -> Result<u8, String> {
        let field = match self.action {
            Action::Set(rate) if i32::from(rate) > RATE_CEILING => {
                return Err(format!(
                    "rate {rate} is out of range (0 to {RATE_CEILING})"
                ));
            }
            Action::Set(rate) => rate,
            Action::Increment => RATE_INC,
            Action::Decrement => RATE_DEC,
        };
        Ok((self.target.wire() << TARGET_SHIFT) | field)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            Action::Set(rate) => write!(f, "{} set {rate}", self.target),
            Action::Increment => write!(f, "{} +1", self.target),
            Action::Decrement => write!(f, "{} -1", self.target),
        }
    }
}

/// Whether `byte` has bits set that the protocol does not define.
///
/// Such bytes are still decoded and applied; the listener only logs them.
pub fn has_reserved_bits(byte: u8) -> bool {
    byte & RESERVED_BIT != 0
}
