//! PSI/SI section rendering and packetization.
//!
//! Every builder returns the complete section bytes, CRC included, ready for
//! [`packetize_section`].

use super::descriptors;
use super::stream::{CodecContext, Program, Stream};
use super::types::*;
use crate::av::{AudioCodec, StreamFormat, SubtitleCodec, VideoCodec};
use crate::config::{HdmvVideo, ServiceConfig};
use crate::error::{MuxError, Result};
use crate::utils::{BitWriter, Crc32Mpeg2};
use bytes::Bytes;
use chrono::{DateTime, Timelike, Utc};

/// Largest section_length allowed for PSI and SI sections.
pub const MAX_SECTION_LENGTH: usize = 1021;

/// Days between the MJD epoch and the Unix epoch.
const MJD_UNIX_EPOCH: i64 = 40587;

/// Service type written in the NIT service list when no SDT service is set.
const DEFAULT_SERVICE_TYPE: u8 = 0x01;

/// Renders a long-form section. `body` writes everything between
/// last_section_number and the CRC.
fn long_section<F>(table_id: u8, table_id_extension: u16, version: u8, body: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut BitWriter) -> Result<()>,
{
    let mut buf = Vec::new();
    let mut w = BitWriter::new(&mut buf);

    w.write(8, table_id as u64);
    w.write_bit(true); // section_syntax_indicator
    w.write_bit(matches!(table_id, TABLE_ID_NIT | TABLE_ID_SDT | TABLE_ID_SIT));
    w.write(2, 0x3);
    w.write(12, 0); // section_length, patched below
    w.write(16, table_id_extension as u64);
    w.write(2, 0x3);
    w.write(5, (version & 0x1f) as u64);
    w.write_bit(true); // current_next_indicator
    w.write(8, 0); // section_number
    w.write(8, 0); // last_section_number

    body(&mut w)?;
    w.flush();

    let section_length = w.position_bits() / 8 - 3 + 4;
    if section_length > MAX_SECTION_LENGTH {
        return Err(MuxError::Config(format!(
            "table 0x{:02x} needs a {} byte section, more than {}",
            table_id, section_length, MAX_SECTION_LENGTH
        )));
    }
    w.rewrite(12, 12, section_length as u64);

    let crc = Crc32Mpeg2::calculate(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    Ok(buf)
}

/// Writes a 12-bit length followed by whatever `body` writes, then patches
/// the length. The caller writes the 4 bits in front of it.
fn length_prefixed<F>(w: &mut BitWriter, body: F) -> Result<()>
where
    F: FnOnce(&mut BitWriter) -> Result<()>,
{
    let len_pos = w.position_bits();
    w.write(12, 0);
    let start = w.position_bits();
    body(w)?;
    let len = (w.position_bits() - start) / 8;
    if len > 0x3ff {
        return Err(MuxError::Config(format!("descriptor loop of {} bytes too long", len)));
    }
    w.rewrite(len_pos, 12, len as u64);
    Ok(())
}

pub fn pat(ts_id: u16, program_number: u16, pmt_pid: u16, network_pid: Option<u16>) -> Result<Vec<u8>> {
    long_section(TABLE_ID_PAT, ts_id, 0, |w| {
        if let Some(network_pid) = network_pid {
            w.write(16, 0);
            w.write(3, 0x7);
            w.write(13, network_pid as u64);
        }
        w.write(16, program_number as u64);
        w.write(3, 0x7);
        w.write(13, pmt_pid as u64);
        Ok(())
    })
}

pub fn pmt(program: &Program, profile: Profile, dtcp: Option<[u8; 2]>) -> Result<Vec<u8>> {
    long_section(TABLE_ID_PMT, program.number, program.version, |w| {
        w.write(3, 0x7);
        w.write(13, program.pcr_pid as u64);

        w.write(4, 0xf);
        length_prefixed(w, |w| {
            program_descriptors(w, program, profile, dtcp);
            Ok(())
        })?;

        for stream in &program.streams {
            w.write(8, stream.stream_type as u64);
            w.write(3, 0x7);
            w.write(13, stream.pid as u64);
            w.write(4, 0xf);
            length_prefixed(w, |w| stream_descriptors(w, stream, profile))?;
        }
        Ok(())
    })
}

fn program_descriptors(w: &mut BitWriter, program: &Program, profile: Profile, dtcp: Option<[u8; 2]>) {
    match profile {
        Profile::BluRay => {
            descriptors::registration(w, b"HDMV");
            if let Some(dtcp) = dtcp {
                descriptors::hdmv_copy_control(w, dtcp);
            }
        }
        Profile::Atsc => {
            if let Some(sb) = program.smoothing_buffer {
                descriptors::smoothing_buffer(w, sb.leak_rate, sb.size);
            }
        }
        Profile::CableLabs => {
            if program.is_3d {
                descriptors::cablelabs_3d(w);
            }
        }
        Profile::Generic | Profile::Dvb | Profile::Isdb => {}
    }
}

fn stream_descriptors(w: &mut BitWriter, stream: &Stream, profile: Profile) -> Result<()> {
    let bluray = profile == Profile::BluRay;
    let dvb = profile.is_dvb_like();

    match (stream.format, &stream.codec) {
        (StreamFormat::Video(_), _) if bluray => {
            let hdmv = stream.hdmv_video.unwrap_or_default();
            write_hdmv_video(w, stream.stream_type, hdmv);
        }
        (StreamFormat::Video(VideoCodec::Avc), Some(CodecContext::Video(setup))) => {
            descriptors::avc_video(w, setup)
        }
        (StreamFormat::Video(VideoCodec::Mpeg2), Some(CodecContext::Video(setup))) => {
            descriptors::mpeg2_video_stream(w, setup)
        }
        (StreamFormat::Video(_), _) => {}

        (StreamFormat::Audio(AudioCodec::Ac3), _) if dvb => descriptors::dvb_ac3(w),
        (StreamFormat::Audio(AudioCodec::Ac3), codec) => {
            if !bluray {
                descriptors::registration(w, b"AC-3");
            }
            if let (true, Some(CodecContext::Ac3(info))) = (profile.is_atsc_like(), codec) {
                descriptors::atsc_ac3(w, info);
            }
        }
        (StreamFormat::Audio(AudioCodec::Eac3), _) if dvb => descriptors::dvb_eac3(w),
        (StreamFormat::Audio(AudioCodec::Eac3), _) if !bluray => {
            descriptors::registration(w, b"EAC3")
        }
        (StreamFormat::Audio(AudioCodec::Adts | AudioCodec::Latm), Some(CodecContext::Aac(aac))) => {
            if dvb {
                descriptors::dvb_aac(w, aac.profile_and_level);
            } else {
                descriptors::mpeg4_audio(w, aac.profile_and_level);
            }
        }
        (StreamFormat::Audio(AudioCodec::Lpcm), Some(CodecContext::Lpcm(lpcm))) => {
            descriptors::hdmv_lpcm(w, stream.stream_type, lpcm)
        }
        (StreamFormat::Audio(AudioCodec::Smpte302m), _) => descriptors::registration(w, b"BSSD"),
        (StreamFormat::Audio(_), _) => {}

        (StreamFormat::Subtitle(SubtitleCodec::Dvb), Some(CodecContext::DvbSubtitles(subs))) => {
            descriptors::dvb_subtitling(w, subs)?
        }
        (StreamFormat::Teletext, Some(CodecContext::Teletext(pages))) => {
            descriptors::dvb_teletext(w, pages)?
        }
        (StreamFormat::Vbi, Some(CodecContext::Vbi(services))) => descriptors::vbi_data(w, services)?,
        (StreamFormat::Ancillary, _) => descriptors::ancillary_data(w),
        (StreamFormat::Subtitle(_) | StreamFormat::Teletext | StreamFormat::Vbi, _) => {}
    }

    if let Some(language) = &stream.language {
        descriptors::iso639_language(w, language, stream.audio_type);
    }
    if let Some(tag) = stream.stream_identifier {
        descriptors::stream_identifier(w, tag);
    }
    Ok(())
}

fn write_hdmv_video(w: &mut BitWriter, stream_type: u8, hdmv: HdmvVideo) {
    descriptors::hdmv_video_registration(
        w,
        stream_type,
        hdmv.video_format,
        hdmv.frame_rate,
        hdmv.aspect_ratio,
    );
}

pub fn sdt(ts_id: u16, original_network_id: u16, program_number: u16, service: &ServiceConfig) -> Result<Vec<u8>> {
    long_section(TABLE_ID_SDT, ts_id, 0, |w| {
        w.write(16, original_network_id as u64);
        w.write(8, 0xff);

        w.write(16, program_number as u64);
        w.write(6, 0x3f);
        w.write_bit(false); // EIT_schedule_flag
        w.write_bit(false); // EIT_present_following_flag
        w.write(3, 4); // running
        w.write_bit(false); // free_CA_mode
        length_prefixed(w, |w| {
            descriptors::service(
                w,
                service.service_type,
                &service.provider_name,
                &service.service_name,
            )
        })
    })
}

/// NIT of the actual network describing this transport stream.
pub fn nit(
    network_id: u16,
    network_name: Option<&str>,
    ts_id: u16,
    program_number: u16,
    service_type: Option<u8>,
) -> Result<Vec<u8>> {
    long_section(TABLE_ID_NIT, network_id, 0, |w| {
        w.write(4, 0xf);
        length_prefixed(w, |w| match network_name {
            Some(name) => descriptors::network_name(w, name),
            None => Ok(()),
        })?;

        w.write(4, 0xf);
        length_prefixed(w, |w| {
            w.write(16, ts_id as u64);
            w.write(16, network_id as u64); // original_network_id
            w.write(4, 0xf);
            length_prefixed(w, |w| {
                descriptors::service_list(
                    w,
                    program_number,
                    service_type.unwrap_or(DEFAULT_SERVICE_TYPE),
                );
                Ok(())
            })
        })
    })
}

/// Blu-ray selection information table.
pub fn sit(program_number: u16, muxrate: u64) -> Result<Vec<u8>> {
    long_section(TABLE_ID_SIT, 0xffff, 0, |w| {
        w.write(4, 0xf);
        length_prefixed(w, |w| {
            descriptors::partial_ts(w, muxrate);
            Ok(())
        })?;

        w.write(16, program_number as u64);
        w.write_bit(true);
        w.write(3, 0); // running_status
        length_prefixed(w, |_| Ok(()))
    })
}

/// Time and date table. Short section without CRC.
pub fn tdt(utc: DateTime<Utc>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8);
    let mut w = BitWriter::new(&mut buf);

    w.write(8, TABLE_ID_TDT as u64);
    w.write_bit(false); // section_syntax_indicator
    w.write_bit(true);
    w.write(2, 0x3);
    w.write(12, 5);

    let mjd = utc.timestamp().div_euclid(86_400) + MJD_UNIX_EPOCH;
    w.write(16, (mjd as u64) & 0xffff);
    w.write(8, bcd(utc.hour()));
    w.write(8, bcd(utc.minute()));
    w.write(8, bcd(utc.second()));
    buf
}

fn bcd(value: u32) -> u64 {
    (((value / 10) << 4) | (value % 10)) as u64
}

/// Splits a section into transport packets with consecutive continuity
/// counters, starting at `*cc`.
pub fn packetize_section(section: &[u8], pid: u16, cc: &mut u8) -> Vec<Bytes> {
    // pointer_field in front of the first byte
    let mut payload = Vec::with_capacity(section.len() + 1);
    payload.push(0x00);
    payload.extend_from_slice(section);

    payload
        .chunks(TS_PAYLOAD_SIZE)
        .enumerate()
        .map(|(i, chunk)| {
            let mut packet = Vec::with_capacity(TS_PACKET_SIZE);
            let header = PacketHeader {
                payload_unit_start: i == 0,
                ..PacketHeader::new(pid, *cc)
            };
            *cc = (*cc + 1) & 0x0f;

            let mut w = BitWriter::new(&mut packet);
            header.write_to(&mut w);
            packet.extend_from_slice(chunk);
            packet.resize(TS_PACKET_SIZE, 0xff);
            Bytes::from(packet)
        })
        .collect()
}
