use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identity errors
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid direction: {0}")]
    InvalidDirection(String),

    #[error("Invalid tag format: {0}")]
    InvalidTagFormat(String),

    // Protocol errors
    #[error("Invalid command frame: {0}")]
    InvalidCommandFrame(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
