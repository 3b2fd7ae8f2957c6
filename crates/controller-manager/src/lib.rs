#![no_std]
//! Lifecycle manager for an exclusively owned hardware controller.
//!
//! The controller connection is opened lazily by
//! [`ControllerManager::ensure_initialized`], shared by every caller through
//! a single lock, and closed again by [`ControllerManager::release`]. After a
//! release the manager holds its configuration and can open a fresh
//! connection, which lets test harnesses attach and detach repeatedly.

mod error;
mod factory;
mod guard;
mod manager;

pub use error::ManagerError;
pub use factory::ControllerFactory;
pub use guard::ReleaseGuard;
pub use manager::{ControllerManager, Init};
