use thiserror::Error;

/// Errors raised while reading frames off the socket.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Declared frame length exceeds the codec limit
    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
