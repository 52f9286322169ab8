//! # Utility Functions and Types
//!
//! Bit-level writing and reading plus the MPEG-2 CRC used by every PSI/SI
//! section.
//!
//! ## Bit Operations
//!
//! ```rust
//! use tsmux::utils::{BitReader, BitWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut buf = Vec::new();
//! let mut w = BitWriter::new(&mut buf);
//! w.write(3, 0b101);
//! w.flush();
//!
//! let mut reader = BitReader::new(&buf);
//! assert_eq!(reader.read_bits(3)?, 0b101);
//! # Ok(())
//! # }
//! ```
//!
//! ## CRC Calculation
//!
//! ```rust
//! use tsmux::utils::Crc32Mpeg2;
//!
//! let crc = Crc32Mpeg2::calculate(b"Hello, world!");
//! println!("CRC32: {:08x}", crc);
//! ```

/// Bitstream writing and reading
pub mod bits;

/// CRC calculation implementations
pub mod crc;

pub use bits::{BitReader, BitWriter};
pub use crc::Crc32Mpeg2;
