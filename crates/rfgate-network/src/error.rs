use thiserror::Error;

/// Errors from the connection supervisor.
///
/// Only [`SupervisorError::RetriesExhausted`] ever escapes
/// [`Supervisor::run`](crate::Supervisor::run); the others end a session and
/// feed the reconnect loop.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Connection attempt timed out
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Write did not complete in time
    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    /// Codec error
    #[error("Protocol error: {0}")]
    Protocol(#[from] rfgate_protocol::ProtocolError),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Reconnect budget spent. Fatal: the process is expected to exit
    #[error("Giving up after {max} reconnect attempts")]
    RetriesExhausted { max: u32 },

    /// The supervisor is no longer running
    #[error("Supervisor stopped")]
    Stopped,
}
