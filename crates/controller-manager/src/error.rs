use core::fmt;

/// Errors that can occur during controller lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerError<E: fmt::Debug> {
    /// The factory failed to open the controller connection.
    Open(E),
    /// No connection is open.
    NotInitialized,
    /// The controller is already borrowed by the calling context.
    Busy,
    /// Manager is in an unrecoverable state.
    Poisoned,
}

impl<E: fmt::Debug + fmt::Display> fmt::Display for ManagerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerError::Open(err) => {
                write!(f, "failed to open controller: {}", err)
            }
            ManagerError::NotInitialized => {
                write!(f, "controller connection is not open")
            }
            ManagerError::Busy => write!(f, "controller is already in use"),
            ManagerError::Poisoned => {
                write!(f, "controller manager is poisoned")
            }
        }
    }
}
