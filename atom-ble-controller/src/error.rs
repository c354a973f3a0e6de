use atom_proto::InvalidCommand;

/// Everything that can end a single client operation
///
/// None of these are fatal for an interactive session: the operation is
/// reported and the user decides what to do next.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid address format: {0:?}")]
    InvalidAddressFormat(String),
    #[error("bluetooth connect failed: {0}")]
    ConnectFailed(String),
    #[error("UART service not found")]
    ServiceNotFound,
    #[error("request access failed: {0}")]
    AccessDenied(String),
    #[error("{0} characteristic not found")]
    CharacteristicNotFound(&'static str),
    #[error("failed to enable notifications: {0}")]
    NotificationSubscribeFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("disconnect failed: {0}")]
    DisconnectFailed(String),
    #[error(transparent)]
    InvalidCommand(#[from] InvalidCommand),
    #[error("not connected, please connect first")]
    NotConnected,
    #[error("already connected, disconnect first")]
    AlreadyConnected,
    #[error("no response received")]
    ResponseTimeout,
    #[error("connection closed while waiting for a response")]
    ConnectionClosed,
    #[error("another request is still waiting for its response")]
    RequestPending,
}

impl Error {
    /// Map a btleplug failure during connection setup
    pub(crate) fn connect(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::PermissionDenied => Error::AccessDenied(e.to_string()),
            e => Error::ConnectFailed(e.to_string()),
        }
    }
}
