//! Transport stream inspection: packet headers, adaptation fields and
//! PAT/PMT sections. Used to check muxer output.

use super::types::*;
use crate::error::{MuxError, Result};
use crate::utils::Crc32Mpeg2;
use bytes::BytesMut;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAdaptationField {
    /// adaptation_field_length
    pub length: usize,
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    /// 27 MHz value
    pub pcr: Option<u64>,
    pub private_data: Option<Vec<u8>>,
    /// Trailing 0xff bytes
    pub stuffing: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub tag: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatEntry {
    pub program_number: u16,
    /// Network PID when `program_number` is 0, PMT PID otherwise
    pub pid: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    pub transport_stream_id: u16,
    pub entries: Vec<PatEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt {
    pub program_number: u16,
    pub version: u8,
    pub pcr_pid: u16,
    pub program_descriptors: Vec<Descriptor>,
    pub streams: Vec<ElementaryStreamInfo>,
}

pub struct TsPacketParser {
    packet_size: usize,
    sections: HashMap<u16, BytesMut>,
}

impl Default for TsPacketParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TsPacketParser {
    pub fn new() -> Self {
        Self::with_packet_size(TS_PACKET_SIZE)
    }

    /// 192 for Blu-ray streams with a TP_extra_header in front of each packet.
    pub fn with_packet_size(packet_size: usize) -> Self {
        Self {
            packet_size,
            sections: HashMap::new(),
        }
    }

    /// Splits a stream into 188-byte packets, dropping any arrival headers.
    pub fn packets<'a>(&self, data: &'a [u8]) -> Result<Vec<&'a [u8]>> {
        if data.len() % self.packet_size != 0 {
            return Err(MuxError::InvalidData(format!(
                "{} bytes is not a whole number of {} byte packets",
                data.len(),
                self.packet_size
            )));
        }
        let skip = self.packet_size - TS_PACKET_SIZE;
        Ok(data.chunks(self.packet_size).map(|p| &p[skip..]).collect())
    }

    /// Arrival timestamps of a Blu-ray stream.
    pub fn arrival_timestamps(&self, data: &[u8]) -> Vec<u32> {
        if self.packet_size != BLURAY_PACKET_SIZE {
            return Vec::new();
        }
        data.chunks_exact(BLURAY_PACKET_SIZE)
            .map(|p| u32::from_be_bytes([p[0], p[1], p[2], p[3]]) & 0x3fff_ffff)
            .collect()
    }

    pub fn parse_header(&self, data: &[u8]) -> Result<PacketHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(MuxError::InvalidData("TS packet too short".into()));
        }

        if data[0] != SYNC_BYTE {
            return Err(MuxError::InvalidData("Invalid sync byte".into()));
        }

        Ok(PacketHeader {
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Offset of the first payload byte.
    pub fn payload_offset(&self, data: &[u8]) -> Result<usize> {
        let header = self.parse_header(data)?;
        let offset = if header.adaptation_field_exists {
            TS_HEADER_SIZE + 1 + data[TS_HEADER_SIZE] as usize
        } else {
            TS_HEADER_SIZE
        };
        if offset > data.len() {
            return Err(MuxError::InvalidData("Adaptation field too long".into()));
        }
        Ok(offset)
    }

    pub fn parse_adaptation_field(&self, data: &[u8]) -> Result<Option<ParsedAdaptationField>> {
        let header = self.parse_header(data)?;
        if !header.adaptation_field_exists {
            return Ok(None);
        }

        let offset = TS_HEADER_SIZE;
        let length = data[offset] as usize;
        if data.len() < offset + length + 1 {
            return Err(MuxError::InvalidData("Adaptation field too short".into()));
        }

        let mut field = ParsedAdaptationField {
            length,
            discontinuity: false,
            random_access: false,
            es_priority: false,
            pcr: None,
            private_data: None,
            stuffing: 0,
        };
        if length == 0 {
            return Ok(Some(field));
        }

        let end = offset + 1 + length;
        let flags = data[offset + 1];
        field.discontinuity = (flags & 0x80) != 0;
        field.random_access = (flags & 0x40) != 0;
        field.es_priority = (flags & 0x20) != 0;

        let mut pos = offset + 2;

        if (flags & 0x10) != 0 {
            if end < pos + 6 {
                return Err(MuxError::InvalidData("PCR data too short".into()));
            }
            let pcr_base = ((data[pos] as u64) << 25)
                | ((data[pos + 1] as u64) << 17)
                | ((data[pos + 2] as u64) << 9)
                | ((data[pos + 3] as u64) << 1)
                | ((data[pos + 4] & 0x80) as u64 >> 7);
            let pcr_ext = (((data[pos + 4] & 0x01) as u64) << 8) | (data[pos + 5] as u64);
            field.pcr = Some(pcr_base * 300 + pcr_ext);
            pos += 6;
        }

        if (flags & 0x08) != 0 {
            pos += 6; // OPCR
        }
        if (flags & 0x04) != 0 {
            pos += 1; // splice_countdown
        }

        if (flags & 0x02) != 0 {
            if end < pos + 1 {
                return Err(MuxError::InvalidData(
                    "Private data length byte missing".into(),
                ));
            }
            let private_data_length = data[pos] as usize;
            pos += 1;
            if end < pos + private_data_length {
                return Err(MuxError::InvalidData("Private data too short".into()));
            }
            field.private_data = Some(data[pos..pos + private_data_length].to_vec());
            pos += private_data_length;
        }

        field.stuffing = data[pos.min(end)..end].iter().take_while(|&&b| b == 0xff).count();
        Ok(Some(field))
    }

    /// Feeds one packet of a section-carrying PID. Returns a section once it
    /// is complete and its CRC checks out.
    pub fn push_section_packet(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        let header = self.parse_header(data)?;
        let mut pos = self.payload_offset(data)?;
        if !header.contains_payload || pos >= data.len() {
            return Ok(None);
        }

        if header.payload_unit_start {
            let pointer = data[pos] as usize;
            pos += 1 + pointer;
            if pos > data.len() {
                return Err(MuxError::InvalidData("pointer_field past packet end".into()));
            }
            self.sections.insert(header.pid, BytesMut::new());
        }

        let buffer = match self.sections.get_mut(&header.pid) {
            Some(buffer) => buffer,
            None => return Ok(None),
        };
        buffer.extend_from_slice(&data[pos..]);

        if buffer.len() < 3 {
            return Ok(None);
        }
        let total = 3 + (((buffer[1] & 0x0f) as usize) << 8 | buffer[2] as usize);
        if buffer.len() < total {
            return Ok(None);
        }

        let section = buffer.split_to(total).to_vec();
        self.sections.remove(&header.pid);

        let has_crc = section[1] & 0x80 != 0;
        if has_crc && Crc32Mpeg2::calculate(&section) != 0 {
            return Err(MuxError::InvalidData(format!(
                "CRC mismatch in table 0x{:02x} on pid 0x{:04x}",
                section[0], header.pid
            )));
        }
        Ok(Some(section))
    }

    pub fn parse_pat(&self, section: &[u8]) -> Result<Pat> {
        let (body, ext, _) = long_section_body(section, TABLE_ID_PAT)?;
        let entries = body
            .chunks_exact(4)
            .map(|e| PatEntry {
                program_number: u16::from_be_bytes([e[0], e[1]]),
                pid: ((e[2] as u16 & 0x1F) << 8) | e[3] as u16,
            })
            .collect();

        Ok(Pat {
            transport_stream_id: ext,
            entries,
        })
    }

    pub fn parse_pmt(&self, section: &[u8]) -> Result<Pmt> {
        let (data, program_number, version) = long_section_body(section, TABLE_ID_PMT)?;
        let end = data.len();

        if end < 4 {
            return Err(MuxError::InvalidData("PMT too short for PCR PID".into()));
        }

        let pcr_pid = ((data[0] as u16 & 0x1F) << 8) | data[1] as u16;
        let program_info_length = ((data[2] as usize & 0x0F) << 8) | data[3] as usize;
        let mut pos = 4;

        if pos + program_info_length > end {
            return Err(MuxError::InvalidData("Program info data too short".into()));
        }
        let program_descriptors = self.parse_descriptors(&data[pos..pos + program_info_length])?;
        pos += program_info_length;

        let mut streams = Vec::new();
        while pos + 5 <= end {
            let stream_type = data[pos];
            let elementary_pid = ((data[pos + 1] as u16 & 0x1F) << 8) | data[pos + 2] as u16;
            let es_info_length = ((data[pos + 3] as usize & 0x0F) << 8) | data[pos + 4] as usize;
            pos += 5;

            if pos + es_info_length > end {
                return Err(MuxError::InvalidData("ES info data too short".into()));
            }

            let descriptors = self.parse_descriptors(&data[pos..pos + es_info_length])?;
            pos += es_info_length;

            streams.push(ElementaryStreamInfo {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(Pmt {
            program_number,
            version,
            pcr_pid,
            program_descriptors,
            streams,
        })
    }

    fn parse_descriptors(&self, data: &[u8]) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();
        let mut pos = 0;

        while pos + 2 <= data.len() {
            let tag = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(MuxError::InvalidData("Descriptor data too short".into()));
            }

            descriptors.push(Descriptor {
                tag,
                data: data[pos..pos + length].to_vec(),
            });
            pos += length;
        }

        Ok(descriptors)
    }
}

/// Returns the bytes between last_section_number and the CRC, the
/// table_id_extension and the version.
fn long_section_body(section: &[u8], table_id: u8) -> Result<(&[u8], u16, u8)> {
    if section.len() < 12 {
        return Err(MuxError::InvalidData("section too short".into()));
    }
    if section[0] != table_id {
        return Err(MuxError::InvalidData(format!(
            "expected table 0x{:02x}, found 0x{:02x}",
            table_id, section[0]
        )));
    }
    let ext = u16::from_be_bytes([section[3], section[4]]);
    let version = (section[5] >> 1) & 0x1f;
    Ok((&section[8..section.len() - 4], ext, version))
}
