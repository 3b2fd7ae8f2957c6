#![cfg_attr(not(feature = "use-std"), no_std)]
//! Wire-level types for the pin-control command interface.
//!
//! A caller sends a [`Request`], either the zero-argument board revision
//! query or a [`CommandRecord`] of `{code, pin, arg}`, and receives a
//! [`Response`]. Validation helpers here are pure; nothing in this crate
//! touches hardware.

use serde::{Deserialize, Serialize};

macro_rules! define_code_enum {
    ($wrapper:ident, $err:ident, { $($variant:ident = $code:expr),* $(,)? }) => {
        #[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
        pub enum $wrapper {
            $($variant),*
        }

        impl TryFrom<i32> for $wrapper {
            type Error = $err;

            fn try_from(value: i32) -> Result<Self, $err> {
                match value {
                    $(x if x == $code => Ok($wrapper::$variant)),*,
                    other => Err($err(other)),
                }
            }
        }

        impl From<$wrapper> for i32 {
            fn from(value: $wrapper) -> Self {
                match value {
                    $(<$wrapper>::$variant => $code),*
                }
            }
        }
    };
}

mod command;
pub use command::*;

mod pin;
pub use pin::*;

// Constants
/// Full-scale PWM duty cycle. Every pin used for PWM is ranged to this.
pub const MAX_PWM: u16 = 1024;
/// Highest BCM pin number the controller exposes.
pub const MAX_PIN: u8 = 53;
/// Last pin of the first GPIO bank; PWM and edge detection stop here.
pub const BANK0_LAST_PIN: u8 = 31;
/// Argument value meaning "no argument supplied".
pub const ARG_ABSENT: i32 = -1000;
/// Edge-wait timeout argument meaning "wait forever".
pub const WAIT_FOREVER: i32 = -1;
