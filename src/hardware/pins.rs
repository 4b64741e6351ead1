//! Propeller I/O pins and the DIRA/OUTA register pair.
//!
//! Pins start at 0; there are 32 of them, P0 - P31. Every update goes through
//! a single-bit mask so writing one pin never disturbs the others.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::HardwareError;

pub const PIN_COUNT: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Pin(u8);

impl Pin {
    pub fn new(number: u8) -> Result<Self, HardwareError> {
        if number >= PIN_COUNT {
            return Err(HardwareError::InvalidPin(number));
        }
        Ok(Self(number))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn mask(&self) -> u32 {
        1u32 << self.0
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(&self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// Direction and output registers of one Propeller port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinRegister {
    dira: u32,
    outa: u32,
}

impl PinRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_output(&mut self, pin: Pin) {
        self.dira |= pin.mask();
    }

    pub fn set_input(&mut self, pin: Pin) {
        self.dira &= !pin.mask();
    }

    pub fn set_high(&mut self, pin: Pin) {
        self.outa |= pin.mask();
    }

    pub fn set_low(&mut self, pin: Pin) {
        self.outa &= !pin.mask();
    }

    pub fn write(&mut self, pin: Pin, level: Level) {
        let bit = if level.is_high() { pin.mask() } else { 0 };
        self.outa = (self.outa & !pin.mask()) | bit;
    }

    pub fn level(&self, pin: Pin) -> Level {
        Level::from(self.outa & pin.mask() != 0)
    }

    pub fn is_output(&self, pin: Pin) -> bool {
        self.dira & pin.mask() != 0
    }

    pub fn dira(&self) -> u32 {
        self.dira
    }

    pub fn outa(&self) -> u32 {
        self.outa
    }
}
