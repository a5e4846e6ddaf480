use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to connect to {device} at {addr}: {source}")]
    Connect {
        device: &'static str,
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("{device} connection is down")]
    Disconnected { device: &'static str },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, LoggerError>;
