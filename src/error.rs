use std::collections::TryReserveError;
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unknown pid 0x{0:04x}")]
    UnknownPid(u16),

    #[error("stream 0x{pid:04x} needs codec setup before its first frame")]
    MissingSetup { pid: u16 },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    #[error("writer is unusable after a failed batch")]
    Poisoned,

    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

pub type Result<T> = std::result::Result<T, MuxError>;
