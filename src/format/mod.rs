//! Container formats.

/// MPEG transport stream muxing
pub mod ts;

pub use self::ts::{MuxOutput, TsWriter};
