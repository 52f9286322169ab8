//! Codec parameter tables.
//!
//! Each setup type validates what the caller supplied and derives the T-STD
//! buffer sizes and leak rates for its stream from the tables of the relevant
//! standard (ISO/IEC 13818-1, ETSI TS 101 154, EN 300 743, SMPTE 302M).

pub mod audio;
pub mod subtitle;
pub mod video;

use crate::error::{MuxError, Result};

/// Transport buffer size in bits.
pub const TB_SIZE: u64 = 512 * 8;

/// Leak rate of the system transport buffer.
pub const RX_SYS: u64 = 1_000_000;

/// Minimum leak rate of the system main buffer.
pub const R_SYS_DEFAULT: u64 = 80_000;

/// System main buffer size in bits.
pub const BS_SYS: u64 = 1536 * 8;

/// Buffer sizes (bits) and leak rates (bits/s) of one elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TstdParams {
    pub tb_size: u64,
    pub rx: u64,
    pub mb_size: u64,
    pub rbx: u64,
    pub eb_size: u64,
}

impl TstdParams {
    /// Streams with a single decoder buffer that drains at the transport rate.
    pub fn single_buffer(rx: u64, bs: u64) -> Self {
        Self {
            tb_size: TB_SIZE,
            rx,
            mb_size: bs,
            rbx: rx,
            eb_size: bs,
        }
    }

    pub fn with_tb_size(mut self, tb_size: u64) -> Self {
        self.tb_size = tb_size;
        self
    }
}

/// Checks an ISO 639-2 language code.
pub fn language_code(lang: &str) -> Result<[u8; 3]> {
    match lang.as_bytes() {
        &[a, b, c] if lang.is_ascii() => Ok([a, b, c]),
        _ => Err(MuxError::Config(format!(
            "language code '{}' must be three ascii characters",
            lang
        ))),
    }
}
