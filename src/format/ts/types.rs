use crate::error::MuxError;
use crate::utils::BitWriter;
use std::str::FromStr;

// Stream IDs
pub const STREAM_ID_PRIVATE_1: u8 = 0xbd;
pub const STREAM_ID_PRIVATE_2: u8 = 0xbf;
pub const STREAM_ID_MPEG_AUDIO: u8 = 0xc0;
pub const STREAM_ID_MPEG_VIDEO: u8 = 0xe0;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_NIT: u16 = 0x0010;
pub const PID_SDT: u16 = 0x0011;
pub const PID_TDT: u16 = 0x0014;
pub const PID_SIT: u16 = 0x001f;
pub const PID_NULL: u16 = 0x1fff;
pub const PID_MAX: u16 = 0x1ffe;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const TABLE_ID_NIT: u8 = 0x40;
pub const TABLE_ID_SDT: u8 = 0x42;
pub const TABLE_ID_TDT: u8 = 0x70;
pub const TABLE_ID_SIT: u8 = 0x7f;

// Elementary Stream Types
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
pub const STREAM_TYPE_PRIVATE_DATA: u8 = 0x06;
pub const STREAM_TYPE_ADTS: u8 = 0x0f;
pub const STREAM_TYPE_LATM: u8 = 0x11;
pub const STREAM_TYPE_AVC: u8 = 0x1b;
pub const STREAM_TYPE_LPCM: u8 = 0x80;
pub const STREAM_TYPE_AC3: u8 = 0x81;
pub const STREAM_TYPE_DTS: u8 = 0x82;
pub const STREAM_TYPE_DOLBY_LOSSLESS: u8 = 0x83;
pub const STREAM_TYPE_EAC3_BLURAY: u8 = 0x84;
pub const STREAM_TYPE_DTS_HD: u8 = 0x85;
pub const STREAM_TYPE_DTS_HD_XLL: u8 = 0x86;
pub const STREAM_TYPE_EAC3: u8 = 0x87;
pub const STREAM_TYPE_PRESENTATION_GRAPHICS: u8 = 0x90;
pub const STREAM_TYPE_INTERACTIVE_GRAPHICS: u8 = 0x91;
pub const STREAM_TYPE_TEXT_SUBTITLE: u8 = 0x92;
pub const STREAM_TYPE_EAC3_SECONDARY: u8 = 0xa1;
pub const STREAM_TYPE_DTS_HD_SECONDARY: u8 = 0xa2;

// Constants
pub const TS_PACKET_SIZE: usize = 188;
pub const BLURAY_PACKET_SIZE: usize = 192;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
pub const SYNC_BYTE: u8 = 0x47;
pub const PTS_HZ: u64 = 90_000;
pub const PCR_HZ: u64 = 27_000_000;

/// The system clock starts ten seconds in so early DTS values never underflow.
pub const TS_CLOCK_START: u64 = 10 * PCR_HZ;

/// Byte offset within a packet of the byte carrying the last bit of the PCR base.
pub const PCR_BYTE_OFFSET: u64 = 11;

pub const DEFAULT_NETWORK_ID: u16 = 0xff01;
pub const DEFAULT_PCR_PERIOD_MS: u64 = 40;
pub const DEFAULT_PAT_PERIOD_MS: u64 = 100;
pub const DEFAULT_SDT_PERIOD_MS: u64 = 1000;
pub const DEFAULT_NIT_PERIOD_MS: u64 = 10_000;
pub const DEFAULT_TDT_PERIOD_MS: u64 = 25_000;

/// Transport stream flavour. Selects stream types, descriptors and SI tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Generic,
    Dvb,
    Atsc,
    CableLabs,
    Isdb,
    BluRay,
}

impl Profile {
    /// Size of one packet on the wire, including the Blu-ray TP_extra_header.
    pub fn packet_size(self) -> usize {
        match self {
            Profile::BluRay => BLURAY_PACKET_SIZE,
            _ => TS_PACKET_SIZE,
        }
    }

    /// DVB and ISDB share the DVB SI tables and descriptors.
    pub fn is_dvb_like(self) -> bool {
        matches!(self, Profile::Dvb | Profile::Isdb)
    }

    /// ATSC and CableLabs share the ATSC audio conventions.
    pub fn is_atsc_like(self) -> bool {
        matches!(self, Profile::Atsc | Profile::CableLabs)
    }
}

impl FromStr for Profile {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(Profile::Generic),
            "dvb" => Ok(Profile::Dvb),
            "atsc" => Ok(Profile::Atsc),
            "cablelabs" => Ok(Profile::CableLabs),
            "isdb" => Ok(Profile::Isdb),
            "bluray" | "blu-ray" | "hdmv" => Ok(Profile::BluRay),
            other => Err(MuxError::Config(format!("unknown profile '{}'", other))),
        }
    }
}

/// The fixed 4-byte transport packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self {
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: 0,
            scrambling_control: 0,
            adaptation_field_exists: false,
            contains_payload: true,
            continuity_counter: 0,
        }
    }
}

impl PacketHeader {
    pub fn new(pid: u16, continuity_counter: u8) -> Self {
        Self {
            pid,
            continuity_counter,
            ..Default::default()
        }
    }

    pub fn write_to(&self, w: &mut BitWriter) {
        w.write(8, SYNC_BYTE as u64);
        w.write_bit(self.transport_error);
        w.write_bit(self.payload_unit_start);
        w.write_bit(self.transport_priority);
        w.write(13, self.pid as u64);
        w.write(2, self.scrambling_control as u64);
        w.write_bit(self.adaptation_field_exists);
        w.write_bit(self.contains_payload);
        w.write(4, (self.continuity_counter & 0x0f) as u64);
    }
}

/// Writes a 5-byte PTS/DTS field: 4-bit prefix, 33-bit timestamp, marker bits.
pub fn write_timestamp(w: &mut BitWriter, prefix: u8, ts: u64) {
    let ts = ts & 0x1_ffff_ffff;
    w.write(4, prefix as u64);
    w.write(3, ts >> 30);
    w.write_bit(true);
    w.write(15, (ts >> 15) & 0x7fff);
    w.write_bit(true);
    w.write(15, ts & 0x7fff);
    w.write_bit(true);
}

/// Splits a 27 MHz clock value into the 33-bit base and the 9-bit extension.
pub fn pcr_base_ext(pcr: u64) -> (u64, u16) {
    ((pcr / 300) & 0x1_ffff_ffff, (pcr % 300) as u16)
}

/// Writes the 48-bit program_clock_reference field.
pub fn write_pcr(w: &mut BitWriter, pcr: u64) {
    let (base, ext) = pcr_base_ext(pcr);
    w.write(33, base);
    w.write(6, 0x3f);
    w.write(9, ext as u64);
}

pub fn ms_to_ticks(ms: u64) -> u64 {
    ms * (PCR_HZ / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render<F: FnOnce(&mut BitWriter)>(f: F) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut w = BitWriter::new(&mut buf);
        f(&mut w);
        w.flush();
        buf
    }

    #[test]
    fn test_packet_header() {
        let header = PacketHeader {
            payload_unit_start: true,
            adaptation_field_exists: true,
            ..PacketHeader::new(0x1fff, 0x1f)
        };
        let buf = render(|w| header.write_to(w));
        assert_eq!(buf, vec![0x47, 0x5f, 0xff, 0x3f]);
    }

    #[test]
    fn test_timestamp_encoding() {
        // PTS of 1 second with the PTS-only prefix
        let buf = render(|w| write_timestamp(w, 0x2, 90_000));
        assert_eq!(buf, vec![0x21, 0x00, 0x05, 0xbf, 0x21]);

        // Values wrap at 33 bits
        let wrapped = render(|w| write_timestamp(w, 0x1, (1 << 33) + 90_000));
        assert_eq!(wrapped, vec![0x11, 0x00, 0x05, 0xbf, 0x21]);
    }

    #[test]
    fn test_pcr_encoding() {
        let pcr = 27_000_000 * 11 + 299;
        assert_eq!(pcr_base_ext(pcr), (990_000, 299));

        let buf = render(|w| write_pcr(w, pcr));
        assert_eq!(buf.len(), 6);
        let base = ((buf[0] as u64) << 25)
            | ((buf[1] as u64) << 17)
            | ((buf[2] as u64) << 9)
            | ((buf[3] as u64) << 1)
            | (buf[4] as u64 >> 7);
        let ext = (((buf[4] & 0x01) as u16) << 8) | buf[5] as u16;
        assert_eq!(base, 990_000);
        assert_eq!(ext, 299);
        assert_eq!(buf[4] & 0x7e, 0x7e);
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("DVB".parse::<Profile>().unwrap(), Profile::Dvb);
        assert_eq!("blu-ray".parse::<Profile>().unwrap(), Profile::BluRay);
        assert!("mpeg".parse::<Profile>().is_err());
        assert_eq!(Profile::BluRay.packet_size(), 192);
    }
}
