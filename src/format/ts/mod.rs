//! # MPEG Transport Stream Muxing
//!
//! A single-program transport stream writer with a T-STD buffer model.
//!
//! - **Scheduling**: every 188-byte slot is filled with PAT/PMT, SI, PES data,
//!   a PCR-only packet or stuffing, in that priority
//! - **PCR**: written at the byte offset it describes, at most 40 ms apart by
//!   default
//! - **Buffers**: transport, main and elementary buffers per stream plus the
//!   system buffers, dripped once per slot
//! - **Profiles**: DVB, ATSC, CableLabs, ISDB and Blu-ray stream types,
//!   descriptors and SI tables
//!
//! ## Example
//!
//! ```rust
//! use tsmux::av::{Frame, StreamFormat, VideoCodec};
//! use tsmux::codec::video::{AvcProfile, VideoSetup};
//! use tsmux::config::{ProgramConfig, StreamConfig, WriterConfig};
//! use tsmux::format::ts::{Profile, TsWriter, TS_PACKET_SIZE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WriterConfig::new(20_000_000, Profile::Generic).with_program(
//!     ProgramConfig::new(1, 0x100, 0x101)
//!         .with_stream(StreamConfig::new(0x101, StreamFormat::Video(VideoCodec::Avc))),
//! );
//! let mut writer = TsWriter::new(config)?;
//! writer.setup_mpegvideo_stream(
//!     0x101,
//!     VideoSetup::avc(AvcProfile::High, 40, 20_000_000, 25_000_000),
//! )?;
//!
//! let frame = Frame::new(0x101, vec![0u8; 4000])
//!     .with_pts(945_000)
//!     .with_random_access(true);
//! writer.write_frames(&[frame])?;
//!
//! let output = writer.write_frames(&[])?;
//! assert_eq!(output.data.len(), output.pcr_list.len() * TS_PACKET_SIZE);
//! # Ok(())
//! # }
//! ```

pub mod adaptation;
pub mod clock;
pub mod descriptors;
pub mod muxer;
pub mod parser;
pub mod pes;
pub mod psi;
mod scheduler;
pub mod stream;
pub mod tstd;
pub mod types;

pub use adaptation::{AdaptationField, AuInformation};
pub use muxer::{MuxOutput, TsWriter};
pub use parser::{Pat, Pmt, TsPacketParser};
pub use pes::PesPacket;
pub use stream::{CodecContext, Program, Stream};
pub use tstd::Buffer;
pub use types::{
    PacketHeader, Profile, BLURAY_PACKET_SIZE, PCR_HZ, PID_NIT, PID_NULL, PID_PAT, PID_SDT,
    PID_SIT, PID_TDT, PTS_HZ, TS_PACKET_SIZE,
};
