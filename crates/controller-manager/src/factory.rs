/// Abstracts opening and closing the controller connection.
///
/// Implementors define how to open a controller from its configuration and
/// how to recover that configuration when the controller is closed.
pub trait ControllerFactory {
    /// The open connection handed to callers.
    type Controller;
    /// Everything needed to open the connection (address, board model, ...).
    type Config;
    /// Error type for open failures.
    type Error: core::fmt::Debug;

    /// Open a controller from the given configuration.
    ///
    /// On failure, returns the error **and** the original configuration so
    /// a later attempt can retry.
    fn open(
        config: Self::Config,
    ) -> Result<Self::Controller, (Self::Error, Self::Config)>;

    /// Close the connection and hand back the configuration it was opened
    /// with.
    fn close(controller: Self::Controller) -> Self::Config;
}
