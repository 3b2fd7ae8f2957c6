use std::fmt;

use controller_manager::ManagerError;
use derive_more::{Display, From};

use crate::icd::{InvalidPin, Pin, UnknownCode};

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal outcome of a single command. The controller stays usable.
#[derive(Debug, Display, From, Clone, PartialEq, Eq)]
pub enum Error {
    #[display("failed to initialize pin controller: {_0}")]
    Initialization(String),
    #[display("{command}: argument missing")]
    MissingArgument { command: &'static str },
    #[display("{command}: argument {value} out of range")]
    InvalidRange { command: &'static str, value: i32 },
    #[from]
    #[display("{_0}")]
    InvalidPin(InvalidPin),
    #[from]
    #[display("{_0}")]
    UnknownCommand(UnknownCode),
    #[display("{operation} on {pin} failed with hardware code {code}")]
    HardwareOperationFailed { operation: &'static str, pin: Pin, code: i32 },
    #[display("pin controller is not open")]
    NotInitialized,
    #[display("pin controller is busy")]
    ControllerBusy,
    #[display("pin controller manager is poisoned")]
    ControllerPoisoned,
}

impl std::error::Error for Error {}

impl<E: fmt::Debug + fmt::Display> From<ManagerError<E>> for Error {
    fn from(err: ManagerError<E>) -> Self {
        match err {
            ManagerError::Open(e) => Error::Initialization(e.to_string()),
            ManagerError::NotInitialized => Error::NotInitialized,
            ManagerError::Busy => Error::ControllerBusy,
            ManagerError::Poisoned => Error::ControllerPoisoned,
        }
    }
}
