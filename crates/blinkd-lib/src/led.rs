//! Keyboard LED identities and their console register bits.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bit for Scroll-Lock in the console LED register (`LED_SCR` in `linux/kd.h`).
pub const LED_SCR: u8 = 0x01;
/// Bit for Num-Lock (`LED_NUM`).
pub const LED_NUM: u8 = 0x02;
/// Bit for Caps-Lock (`LED_CAP`).
pub const LED_CAP: u8 = 0x04;

/// One of the three controllable keyboard indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Led {
    Caps,
    Num,
    Scroll,
}

impl Led {
    /// Every real LED, in wire order.
    pub const ALL: [Led; 3] = [Led::Caps, Led::Num, Led::Scroll];

    /// Wire index: Caps = 0, Num = 1, Scroll = 2.
    pub fn index(self) -> usize {
        match self {
            Led::Caps => 0,
            Led::Num => 1,
            Led::Scroll => 2,
        }
    }

    pub fn from_index(index: u8) -> Option<Led> {
        match index {
            0 => Some(Led::Caps),
            1 => Some(Led::Num),
            2 => Some(Led::Scroll),
            _ => None,
        }
    }

    /// Register bit for this LED.
    pub fn bit(self) -> u8 {
        match self {
            Led::Caps => LED_CAP,
            Led::Num => LED_NUM,
            Led::Scroll => LED_SCR,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Led::Caps => "caps",
            Led::Num => "num",
            Led::Scroll => "scroll",
        }
    }

    /// Apply this LED's bit to a register value, leaving every other bit alone.
    pub fn apply(self, register: u8, on: bool) -> u8 {
        if on {
            register | self.bit()
        } else {
            register & !self.bit()
        }
    }
}

impl fmt::Display for Led {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command target: a single LED, or every enabled LED.
///
/// `All` only exists on the wire; it is never a rate table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Led(Led),
    All,
}

impl Target {
    /// Wire index of the "all LEDs" pseudo-target.
    pub const ALL_INDEX: u8 = 3;

    /// Decode the two target bits. Only the low two bits of `value` are used.
    pub fn from_wire(value: u8) -> Target {
        match value & 0b11 {
            Self::ALL_INDEX => Target::All,
            i => Led::from_index(i).map_or(Target::All, Target::Led),
        }
    }

    pub fn wire(self) -> u8 {
        match self {
            Target::Led(led) => led.index() as u8,
            Target::All => Self::ALL_INDEX,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Led(led) => write!(f, "{led}"),
            Target::All => f.write_str("all"),
        }
    }
}
