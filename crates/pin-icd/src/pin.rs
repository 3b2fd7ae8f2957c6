use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{BANK0_LAST_PIN, MAX_PIN};

/// A validated BCM pin number in `0..=MAX_PIN`.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Clone, Copy,
)]
#[serde(try_from = "i32", into = "i32")]
pub struct Pin(u8);

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct InvalidPin(pub i32);

impl fmt::Display for InvalidPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin {} outside 0..={}", self.0, MAX_PIN)
    }
}

impl Pin {
    pub const fn number(self) -> u8 {
        self.0
    }

    /// Whether the pin sits in the first bank, where PWM and edge
    /// detection are available.
    pub const fn in_bank0(self) -> bool {
        self.0 <= BANK0_LAST_PIN
    }
}

impl TryFrom<i32> for Pin {
    type Error = InvalidPin;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if (0..=MAX_PIN as i32).contains(&value) {
            Ok(Pin(value as u8))
        } else {
            Err(InvalidPin(value))
        }
    }
}

impl From<Pin> for i32 {
    fn from(pin: Pin) -> Self {
        pin.0 as i32
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct InvalidValue(pub i32);

define_code_enum!(Level, InvalidValue, {
    Low = 0,
    High = 1,
});

impl Level {
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

define_code_enum!(Direction, InvalidValue, {
    Input = 0,
    Output = 1,
});

define_code_enum!(PullMode, InvalidValue, {
    PullDown = -1,
    None = 0,
    PullUp = 1,
});

define_code_enum!(EdgeWaitResult, InvalidValue, {
    Error = -1,
    TimedOut = 0,
    Triggered = 1,
});
