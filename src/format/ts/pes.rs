use super::types::write_timestamp;
use crate::av::{Frame, StreamFormat};
use crate::error::Result;
use crate::utils::BitWriter;
use bytes::Bytes;
use log::warn;

/// Teletext and VBI PES headers are padded to exactly this many bytes.
pub const FIXED_PES_HEADER_SIZE: usize = 45;

/// Packetized Elementary Stream (PES) header
///
/// Only the fields this muxer ever sets are kept: no ESCR, ES rate, trick
/// mode, CRC or extension.
#[derive(Debug, Clone)]
pub struct PesHeader {
    /// Stream identifier indicating content type (video/audio/etc.)
    pub stream_id: u8,
    /// Bytes following the length field, or 0 for unbounded video packets
    pub packet_length: u16,
    /// PES_priority
    pub priority: bool,
    /// data_alignment_indicator
    pub data_alignment: bool,
    /// Presentation Time Stamp (33 bits)
    pub pts: u64,
    /// Decoding Time Stamp, only present when it differs from the PTS
    pub dts: Option<u64>,
    /// 0xff stuffing bytes at the end of the header
    pub stuffing: usize,
}

impl PesHeader {
    /// Creates a header with a PTS and no DTS.
    pub fn new(stream_id: u8, pts: u64) -> Self {
        Self {
            stream_id,
            packet_length: 0,
            priority: false,
            data_alignment: true,
            pts,
            dts: None,
            stuffing: 0,
        }
    }

    pub fn header_data_length(&self) -> usize {
        5 + if self.dts.is_some() { 5 } else { 0 } + self.stuffing
    }

    /// Total header size in bytes.
    pub fn len(&self) -> usize {
        9 + self.header_data_length()
    }

    pub fn write_to(&self, w: &mut BitWriter) {
        w.write(24, 0x000001);
        w.write(8, self.stream_id as u64);
        w.write(16, self.packet_length as u64);

        w.write(2, 0b10);
        w.write(2, 0); // scrambling control
        w.write_bit(self.priority);
        w.write_bit(self.data_alignment);
        w.write_bit(false); // copyright
        w.write_bit(false); // original_or_copy

        w.write(2, if self.dts.is_some() { 0b11 } else { 0b10 });
        w.write(6, 0); // ESCR, ES rate, DSM trick mode, copy info, CRC, extension
        w.write(8, self.header_data_length() as u64);

        match self.dts {
            Some(dts) => {
                write_timestamp(w, 0x3, self.pts);
                write_timestamp(w, 0x1, dts);
            }
            None => write_timestamp(w, 0x2, self.pts),
        }

        for _ in 0..self.stuffing {
            w.write(8, 0xff);
        }
    }
}

/// Fields of the DVB AU_information that are written once, with the first packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuFields {
    pub frame_type: u8,
    pub ref_pic_idc: u8,
    pub pic_struct: u8,
    pub write_pulldown_info: bool,
}

/// A PES being emitted, possibly across many transport packets.
///
/// Arrival times are 27 MHz clock values: the PES may start entering the
/// decoder at `initial_arrival` and must be complete by `final_arrival`.
#[derive(Debug)]
pub struct PesPacket {
    pub pid: u16,
    data: Bytes,
    cursor: usize,
    pub dts: u64,
    pub pts: u64,
    pub initial_arrival: u64,
    pub final_arrival: u64,
    pub random_access: bool,
    pub priority: bool,
    pub au: AuFields,
}

impl PesPacket {
    /// Wraps one frame into a PES.
    pub fn new(frame: &Frame, format: StreamFormat, stream_id: u8) -> Result<Self> {
        if frame.dts > frame.pts {
            warn!(
                "pid 0x{:04x}: dts {} is later than pts {}",
                frame.pid, frame.dts, frame.pts
            );
        }

        let mut header = PesHeader {
            priority: frame.priority,
            data_alignment: format != StreamFormat::Ancillary,
            dts: (frame.dts != frame.pts).then_some(frame.dts),
            ..PesHeader::new(stream_id, frame.pts)
        };

        if matches!(format, StreamFormat::Teletext | StreamFormat::Vbi) {
            header.stuffing = FIXED_PES_HEADER_SIZE - header.len();
        }

        if !format.is_video() {
            let length = header.len() - 6 + frame.data.len();
            header.packet_length = match u16::try_from(length) {
                Ok(length) => length,
                Err(_) => {
                    warn!(
                        "pid 0x{:04x}: pes of {} bytes written with unbounded length",
                        frame.pid, length
                    );
                    0
                }
            };
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(header.len() + frame.data.len())?;
        let mut w = BitWriter::new(&mut buf);
        header.write_to(&mut w);
        buf.extend_from_slice(&frame.data);

        let final_arrival = frame.dts * 300;
        Ok(Self {
            pid: frame.pid,
            data: Bytes::from(buf),
            cursor: 0,
            dts: frame.dts,
            pts: frame.pts,
            initial_arrival: final_arrival,
            final_arrival,
            random_access: frame.random_access,
            priority: frame.priority,
            au: AuFields {
                frame_type: frame.frame_type,
                ref_pic_idc: frame.ref_pic_idc,
                pic_struct: frame.pic_struct,
                write_pulldown_info: frame.write_pulldown_info,
            },
        })
    }

    /// Sets the initial arrival time `window` ticks before the decoding time.
    pub fn set_arrival_window(&mut self, window: u64) {
        self.initial_arrival = self.final_arrival.saturating_sub(window);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn is_started(&self) -> bool {
        self.cursor > 0
    }

    pub fn is_finished(&self) -> bool {
        self.cursor == self.data.len()
    }

    /// Returns the next `n` bytes and moves the cursor past them.
    pub fn take(&mut self, n: usize) -> &[u8] {
        let start = self.cursor;
        self.cursor = (start + n).min(self.data.len());
        &self.data[start..self.cursor]
    }

    /// Whether the PES has fallen behind a linear drip between its arrival
    /// times, or its deadline has passed.
    pub fn is_behind(&self, now: u64) -> bool {
        if now >= self.final_arrival || self.final_arrival <= self.initial_arrival {
            return true;
        }

        let total = self.data.len() as u128;
        let left = self.remaining() as u128;
        total * ((self.final_arrival - now) as u128)
            < left * ((self.final_arrival - self.initial_arrival) as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{AudioCodec, VideoCodec};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_audio_pes_header() {
        let frame = Frame::new(0x101, vec![0xaa; 10]).with_pts(90_000);
        let pes = PesPacket::new(&frame, StreamFormat::Audio(AudioCodec::Ac3), 0xbd).unwrap();

        assert_eq!(pes.len(), 14 + 10);
        let mut pes = pes;
        let bytes = pes.take(14).to_vec();
        assert_eq!(
            bytes,
            vec![
                0x00, 0x00, 0x01, 0xbd, // start code, stream id
                0x00, 0x12, // 3 + 5 + 10 bytes follow
                0x84, 0x80, 0x05, // alignment, PTS only, 5 header bytes
                0x21, 0x00, 0x05, 0xbf, 0x21,
            ]
        );
        assert!(pes.is_started());
        assert_eq!(pes.remaining(), 10);
    }

    #[test]
    fn test_video_pes_is_unbounded() {
        let frame = Frame::new(0x100, vec![0; 100])
            .with_timestamps(900_000, 903_600)
            .with_priority(true);
        let mut pes = PesPacket::new(&frame, StreamFormat::Video(VideoCodec::Avc), 0xe0).unwrap();

        assert_eq!(pes.len(), 19 + 100);
        let header = pes.take(9).to_vec();
        assert_eq!(&header[4..6], &[0x00, 0x00]);
        assert_eq!(header[6], 0x8c);
        assert_eq!(header[7], 0xc0);
        assert_eq!(header[8], 10);
    }

    #[test]
    fn test_teletext_header_is_45_bytes() {
        let frame = Frame::new(0x102, vec![0x10; 46]).with_pts(90_000);
        let mut pes = PesPacket::new(&frame, StreamFormat::Teletext, 0xbd).unwrap();

        let header = pes.take(FIXED_PES_HEADER_SIZE).to_vec();
        assert_eq!(header[8], 36);
        assert!(header[14..].iter().all(|&b| b == 0xff));
        assert_eq!(pes.take(1), &[0x10]);
    }

    #[test]
    fn test_ancillary_is_not_aligned() {
        let frame = Frame::new(0x103, vec![0; 4]).with_pts(90_000);
        let mut pes = PesPacket::new(&frame, StreamFormat::Ancillary, 0xbd).unwrap();
        assert_eq!(pes.take(7)[6], 0x80);
    }

    #[test]
    fn test_drip_schedule() {
        let frame = Frame::new(0x101, vec![0; 986]).with_pts(1_000);
        let mut pes = PesPacket::new(&frame, StreamFormat::Audio(AudioCodec::Mpeg1), 0xc0).unwrap();
        assert_eq!(pes.final_arrival, 300_000);
        pes.set_arrival_window(100_000);
        assert_eq!(pes.initial_arrival, 200_000);

        // Nothing sent: due as soon as the window opens
        assert!(!pes.is_behind(200_000));
        assert!(pes.is_behind(200_001));

        // Half sent: due once past the midpoint
        pes.take(500);
        assert!(!pes.is_behind(250_000));
        assert!(pes.is_behind(250_001));

        // Deadline reached
        assert!(pes.is_behind(300_000));
    }
}
