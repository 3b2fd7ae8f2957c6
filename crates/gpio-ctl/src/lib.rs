//! Pin-control command interface for Raspberry Pi GPIO.
//!
//! A [`Dispatcher`] validates `{code, pin, arg}` command records and routes
//! them to a [`hal::PinController`], opening the controller lazily through a
//! [`controller_manager::ControllerManager`]. Edge waits bridge the
//! controller's callback thread into a synchronous, timeout-bounded call.

pub mod config;
pub mod dispatcher;
pub mod edge_wait;
pub mod error;
pub mod hal;
pub mod logging;
pub mod pin_state;
pub mod serve;

pub use pin_icd as icd;

pub use config::{Backend, Config};
pub use dispatcher::{Dispatcher, Operation};
pub use error::{Error, Result};
pub use serve::serve;
