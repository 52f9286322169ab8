#![doc(html_root_url = "https://docs.rs/tsmux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsmux - MPEG Transport Stream Muxer
//!
//! `tsmux` interleaves coded audio, video and subtitle frames into a
//! constant or capped-variable bitrate MPEG-2 transport stream. Packets are
//! scheduled against a model of the decoder's transport, main and elementary
//! buffers, so the output can be handed to a hardware decoder or a broadcast
//! multiplexer as is.
//!
//! ## Features
//!
//! - PCR insertion at the exact byte position it describes
//! - PAT/PMT and DVB/ATSC/Blu-ray SI tables at their mandated periods
//! - MPEG-2 and AVC video, MPEG audio, AAC, AC-3, E-AC-3, DTS, LPCM,
//!   SMPTE 302M, DVB subtitles, teletext and VBI
//! - 192-byte Blu-ray packets with arrival time stamps
//! - DVB AU_information in the adaptation field
//!
//! ## Quick Start
//!
//! ```rust
//! use tsmux::av::{AudioCodec, Frame, StreamFormat};
//! use tsmux::config::{ProgramConfig, StreamConfig, WriterConfig};
//! use tsmux::format::ts::{Profile, TsWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WriterConfig::new(1_000_000, Profile::Dvb).with_program(
//!     ProgramConfig::new(1, 0x100, 0x101)
//!         .with_stream(StreamConfig::new(0x101, StreamFormat::Audio(AudioCodec::Mpeg2))),
//! );
//! let mut writer = TsWriter::new(config)?;
//!
//! let mut ts = Vec::new();
//! for i in 0..10u64 {
//!     let frame = Frame::new(0x101, vec![0xff; 576]).with_pts(900_000 + i * 2160);
//!     ts.extend_from_slice(writer.write_frames(&[frame])?.data);
//! }
//! ts.extend_from_slice(writer.write_frames(&[])?.data);
//! assert_eq!(ts[0], 0x47);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: frames and stream formats
//! - `codec`: codec setup parameters and their T-STD buffer tables
//! - `config`: writer, program and stream configuration
//! - `format`: the transport stream writer, its PSI/SI tables and a packet
//!   parser for inspecting output
//! - `error`: error type and result alias
//! - `utils`: bit writing/reading and the MPEG-2 CRC

/// Frames and stream formats
pub mod av;

/// Codec parameters and buffer tables
pub mod codec;

/// Configuration module
pub mod config;

/// Error types and utilities
pub mod error;

/// Container formats
pub mod format;

/// Common utilities and helper functions
pub mod utils;

pub use error::{MuxError, Result};
pub use format::ts::{MuxOutput, TsWriter};
