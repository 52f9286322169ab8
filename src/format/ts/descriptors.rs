//! Fixed-layout descriptor writers for the PMT, SDT, NIT and SIT.

use crate::codec::audio::{Ac3Info, LpcmSetup};
use crate::codec::subtitle::{DvbSubtitle, TeletextPage, VbiService};
use crate::codec::video::{Mpeg2Profile, VideoProfile, VideoSetup};
use crate::error::{MuxError, Result};
use crate::utils::BitWriter;

pub const VIDEO_STREAM_DESCRIPTOR_TAG: u8 = 0x02;
pub const REGISTRATION_DESCRIPTOR_TAG: u8 = 0x05;
pub const ISO639_DESCRIPTOR_TAG: u8 = 0x0a;
pub const SMOOTHING_BUFFER_DESCRIPTOR_TAG: u8 = 0x10;
pub const MPEG4_AUDIO_DESCRIPTOR_TAG: u8 = 0x1c;
pub const AVC_DESCRIPTOR_TAG: u8 = 0x28;
pub const NETWORK_NAME_DESCRIPTOR_TAG: u8 = 0x40;
pub const SERVICE_LIST_DESCRIPTOR_TAG: u8 = 0x41;
pub const VBI_DATA_DESCRIPTOR_TAG: u8 = 0x45;
pub const SERVICE_DESCRIPTOR_TAG: u8 = 0x48;
pub const STREAM_IDENTIFIER_DESCRIPTOR_TAG: u8 = 0x52;
pub const TELETEXT_DESCRIPTOR_TAG: u8 = 0x56;
pub const SUBTITLING_DESCRIPTOR_TAG: u8 = 0x59;
pub const HDMV_PARTIAL_TS_DESCRIPTOR_TAG: u8 = 0x63;
pub const DVB_AC3_DESCRIPTOR_TAG: u8 = 0x6a;
pub const DVB_EAC3_DESCRIPTOR_TAG: u8 = 0x7a;
pub const DVB_AAC_DESCRIPTOR_TAG: u8 = 0x7c;
pub const ATSC_AC3_DESCRIPTOR_TAG: u8 = 0x81;
pub const HDMV_COPY_CTRL_DESCRIPTOR_TAG: u8 = 0x88;
pub const USER_DEFINED_DESCRIPTOR_TAG: u8 = 0xc4;
pub const CABLELABS_3D_DESCRIPTOR_TAG: u8 = 0xe8;

fn header(w: &mut BitWriter, tag: u8, len: usize) -> Result<()> {
    if len > 255 {
        return Err(MuxError::Config(format!(
            "descriptor 0x{:02x} needs {} bytes, more than 255",
            tag, len
        )));
    }
    w.write(8, tag as u64);
    w.write(8, len as u64);
    Ok(())
}

pub fn registration(w: &mut BitWriter, format_identifier: &[u8; 4]) {
    w.write(8, REGISTRATION_DESCRIPTOR_TAG as u64);
    w.write(8, 4);
    w.write_bytes(format_identifier);
}

/// HDMV registration for video, carrying coding type, format, frame rate and aspect ratio.
pub fn hdmv_video_registration(
    w: &mut BitWriter,
    stream_type: u8,
    video_format: u8,
    frame_rate: u8,
    aspect_ratio: u8,
) {
    w.write(8, REGISTRATION_DESCRIPTOR_TAG as u64);
    w.write(8, 8);
    w.write_bytes(b"HDMV");
    w.write(8, 0xff);
    w.write(8, stream_type as u64);
    w.write(4, video_format as u64);
    w.write(4, frame_rate as u64);
    w.write(4, aspect_ratio as u64);
    w.write(4, 0xf);
}

pub fn hdmv_lpcm(w: &mut BitWriter, stream_type: u8, lpcm: &LpcmSetup) {
    w.write(8, REGISTRATION_DESCRIPTOR_TAG as u64);
    w.write(8, 8);
    w.write_bytes(b"HDMV");
    w.write(8, 0xff);
    w.write(8, stream_type as u64);
    w.write(4, lpcm.audio_presentation_type() as u64);
    w.write(4, lpcm.sampling_frequency() as u64);
    w.write(2, lpcm.bits_per_sample_code() as u64);
    w.write(6, 0x3f);
}

pub fn hdmv_copy_control(w: &mut BitWriter, dtcp: [u8; 2]) {
    w.write(8, HDMV_COPY_CTRL_DESCRIPTOR_TAG as u64);
    w.write(8, 4);
    w.write(16, 0x0fff); // CA_System_ID
    w.write_bytes(&dtcp);
}

pub fn partial_ts(w: &mut BitWriter, muxrate: u64) {
    w.write(8, HDMV_PARTIAL_TS_DESCRIPTOR_TAG as u64);
    w.write(8, 8);
    w.write(2, 0x3);
    w.write(22, (muxrate / 400) & 0x3f_ffff); // peak_rate
    w.write(2, 0x3);
    w.write(22, 0x3f_ffff); // minimum_overall_smoothing_rate
    w.write(2, 0x3);
    w.write(14, 0x3fff); // maximum_overall_smoothing_buffer
}

pub fn avc_video(w: &mut BitWriter, video: &VideoSetup) {
    w.write(8, AVC_DESCRIPTOR_TAG as u64);
    w.write(8, 4);
    w.write(8, video.profile_idc() as u64);
    w.write(6, video.constraint_flags() as u64);
    w.write(2, 0); // AVC_compatible_flags
    w.write(8, video.level_idc() as u64);
    w.write_bit(false); // AVC_still_present
    w.write_bit(false); // AVC_24_hour_picture_flag
    w.write(6, 0x3f);
}

pub fn mpeg2_video_stream(w: &mut BitWriter, video: &VideoSetup) {
    let chroma_format = match video.profile {
        VideoProfile::Mpeg2 {
            profile: Mpeg2Profile::Profile422,
            ..
        } => 2,
        _ => 1,
    };

    w.write(8, VIDEO_STREAM_DESCRIPTOR_TAG as u64);
    w.write(8, 3);
    w.write_bit(false); // multiple_frame_rate_flag
    w.write(4, video.frame_rate as u64);
    w.write_bit(false); // MPEG_1_only_flag
    w.write_bit(false); // constrained_parameter_flag
    w.write_bit(false); // still_picture_flag
    w.write(8, video.profile_and_level().unwrap_or(0) as u64);
    w.write(2, chroma_format);
    w.write_bit(false); // frame_rate_extension_flag
    w.write(5, 0x1f);
}

pub fn iso639_language(w: &mut BitWriter, language: &[u8; 3], audio_type: u8) {
    w.write(8, ISO639_DESCRIPTOR_TAG as u64);
    w.write(8, 4);
    w.write_bytes(language);
    w.write(8, audio_type as u64);
}

pub fn stream_identifier(w: &mut BitWriter, component_tag: u8) {
    w.write(8, STREAM_IDENTIFIER_DESCRIPTOR_TAG as u64);
    w.write(8, 1);
    w.write(8, component_tag as u64);
}

pub fn dvb_ac3(w: &mut BitWriter) {
    w.write(8, DVB_AC3_DESCRIPTOR_TAG as u64);
    w.write(8, 1);
    w.write(8, 0); // no optional fields
}

pub fn dvb_eac3(w: &mut BitWriter) {
    w.write(8, DVB_EAC3_DESCRIPTOR_TAG as u64);
    w.write(8, 1);
    w.write(8, 0);
}

pub fn dvb_aac(w: &mut BitWriter, profile_and_level: u8) {
    w.write(8, DVB_AAC_DESCRIPTOR_TAG as u64);
    w.write(8, 2);
    w.write(8, profile_and_level as u64);
    w.write_bit(false); // AAC_type_flag
    w.write_bit(false); // SAOC_DE_flag
    w.write(6, 0);
}

pub fn mpeg4_audio(w: &mut BitWriter, profile_and_level: u8) {
    w.write(8, MPEG4_AUDIO_DESCRIPTOR_TAG as u64);
    w.write(8, 1);
    w.write(8, profile_and_level as u64);
}

pub fn atsc_ac3(w: &mut BitWriter, info: &Ac3Info) {
    w.write(8, ATSC_AC3_DESCRIPTOR_TAG as u64);
    w.write(8, 3);
    w.write(3, info.sample_rate_code as u64);
    w.write(5, info.bsid as u64);
    w.write(6, info.bit_rate_code as u64);
    w.write(2, info.surround_mode as u64);
    w.write(3, info.bsmod as u64);
    w.write(4, info.num_channels as u64);
    w.write_bit(true); // full_svc
}

pub fn dvb_subtitling(w: &mut BitWriter, subtitles: &[DvbSubtitle]) -> Result<()> {
    header(w, SUBTITLING_DESCRIPTOR_TAG, subtitles.len() * 8)?;
    for sub in subtitles {
        w.write_bytes(&sub.language);
        w.write(8, sub.subtitling_type as u64);
        w.write(16, sub.composition_page_id as u64);
        w.write(16, sub.ancillary_page_id as u64);
    }
    Ok(())
}

pub fn dvb_teletext(w: &mut BitWriter, pages: &[TeletextPage]) -> Result<()> {
    header(w, TELETEXT_DESCRIPTOR_TAG, pages.len() * 5)?;
    for page in pages {
        w.write_bytes(&page.language);
        w.write(5, page.teletext_type as u64);
        w.write(3, page.magazine as u64);
        w.write(8, page.page_number as u64);
    }
    Ok(())
}

pub fn vbi_data(w: &mut BitWriter, services: &[VbiService]) -> Result<()> {
    let len = services.iter().map(|s| 2 + s.lines.len()).sum();
    header(w, VBI_DATA_DESCRIPTOR_TAG, len)?;
    for service in services {
        w.write(8, service.data_service_id as u64);
        w.write(8, service.lines.len() as u64);
        for line in &service.lines {
            w.write(2, 0x3);
            w.write_bit(line.field_parity);
            w.write(5, line.line_offset as u64);
        }
    }
    Ok(())
}

/// Leak rate in units of 400 bit/s, size in bytes.
pub fn smoothing_buffer(w: &mut BitWriter, leak_rate: u32, size: u32) {
    w.write(8, SMOOTHING_BUFFER_DESCRIPTOR_TAG as u64);
    w.write(8, 6);
    w.write(2, 0x3);
    w.write(22, (leak_rate & 0x3f_ffff) as u64);
    w.write(2, 0x3);
    w.write(22, (size & 0x3f_ffff) as u64);
}

pub fn cablelabs_3d(w: &mut BitWriter) {
    w.write(8, CABLELABS_3D_DESCRIPTOR_TAG as u64);
    w.write(8, 1);
    w.write_bit(true); // 3d_frame_packing_data_present
    w.write(7, 0);
}

pub fn ancillary_data(w: &mut BitWriter) {
    w.write(8, USER_DEFINED_DESCRIPTOR_TAG as u64);
    w.write(8, 0);
}

pub fn service(w: &mut BitWriter, service_type: u8, provider: &str, name: &str) -> Result<()> {
    if provider.len() > 255 || name.len() > 255 {
        return Err(MuxError::Config("service or provider name too long".into()));
    }
    header(w, SERVICE_DESCRIPTOR_TAG, 3 + provider.len() + name.len())?;
    w.write(8, service_type as u64);
    w.write(8, provider.len() as u64);
    w.write_bytes(provider.as_bytes());
    w.write(8, name.len() as u64);
    w.write_bytes(name.as_bytes());
    Ok(())
}

pub fn network_name(w: &mut BitWriter, name: &str) -> Result<()> {
    header(w, NETWORK_NAME_DESCRIPTOR_TAG, name.len())?;
    w.write_bytes(name.as_bytes());
    Ok(())
}

pub fn service_list(w: &mut BitWriter, service_id: u16, service_type: u8) {
    w.write(8, SERVICE_LIST_DESCRIPTOR_TAG as u64);
    w.write(8, 3);
    w.write(16, service_id as u64);
    w.write(8, service_type as u64);
}
