use crate::format::ts::types::*;

/// Video coding formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Mpeg2,
    Avc,
}

/// Audio coding formats. The Blu-ray-only variants are rejected elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Mpeg1,
    Mpeg2,
    Adts,
    Latm,
    Ac3,
    Eac3,
    Lpcm,
    Dts,
    DolbyLossless,
    DtsHd,
    DtsHdXll,
    Eac3Secondary,
    DtsHdSecondary,
    Smpte302m,
}

/// Subtitle formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleCodec {
    Dvb,
    PresentationGraphics,
    InteractiveGraphics,
    Text,
}

/// What an elementary stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Video(VideoCodec),
    Audio(AudioCodec),
    Subtitle(SubtitleCodec),
    Teletext,
    Vbi,
    Ancillary,
}

impl StreamFormat {
    pub fn is_video(self) -> bool {
        matches!(self, StreamFormat::Video(_))
    }

    /// Formats that cannot be muxed until their codec setup call has been made.
    pub fn requires_setup(self) -> bool {
        matches!(
            self,
            StreamFormat::Video(_)
                | StreamFormat::Audio(
                    AudioCodec::Adts | AudioCodec::Latm | AudioCodec::Lpcm | AudioCodec::Smpte302m
                )
                | StreamFormat::Subtitle(SubtitleCodec::Dvb)
                | StreamFormat::Teletext
                | StreamFormat::Vbi
        )
    }

    pub fn is_bluray_only(self) -> bool {
        matches!(
            self,
            StreamFormat::Audio(
                AudioCodec::Lpcm
                    | AudioCodec::DolbyLossless
                    | AudioCodec::DtsHd
                    | AudioCodec::DtsHdXll
                    | AudioCodec::Eac3Secondary
                    | AudioCodec::DtsHdSecondary
            ) | StreamFormat::Subtitle(
                SubtitleCodec::PresentationGraphics
                    | SubtitleCodec::InteractiveGraphics
                    | SubtitleCodec::Text
            )
        )
    }

    /// The stream_type byte written in the PMT.
    pub fn stream_type(self, profile: Profile) -> u8 {
        match self {
            StreamFormat::Video(VideoCodec::Mpeg2) => STREAM_TYPE_MPEG2_VIDEO,
            StreamFormat::Video(VideoCodec::Avc) => STREAM_TYPE_AVC,
            StreamFormat::Audio(codec) => match codec {
                AudioCodec::Mpeg1 => STREAM_TYPE_MPEG1_AUDIO,
                AudioCodec::Mpeg2 => STREAM_TYPE_MPEG2_AUDIO,
                AudioCodec::Adts => STREAM_TYPE_ADTS,
                AudioCodec::Latm => STREAM_TYPE_LATM,
                AudioCodec::Ac3 if profile.is_dvb_like() => STREAM_TYPE_PRIVATE_DATA,
                AudioCodec::Ac3 => STREAM_TYPE_AC3,
                AudioCodec::Eac3 if profile == Profile::BluRay => STREAM_TYPE_EAC3_BLURAY,
                AudioCodec::Eac3 if profile.is_dvb_like() => STREAM_TYPE_PRIVATE_DATA,
                AudioCodec::Eac3 => STREAM_TYPE_EAC3,
                AudioCodec::Lpcm => STREAM_TYPE_LPCM,
                AudioCodec::Dts => STREAM_TYPE_DTS,
                AudioCodec::DolbyLossless => STREAM_TYPE_DOLBY_LOSSLESS,
                AudioCodec::DtsHd => STREAM_TYPE_DTS_HD,
                AudioCodec::DtsHdXll => STREAM_TYPE_DTS_HD_XLL,
                AudioCodec::Eac3Secondary => STREAM_TYPE_EAC3_SECONDARY,
                AudioCodec::DtsHdSecondary => STREAM_TYPE_DTS_HD_SECONDARY,
                AudioCodec::Smpte302m => STREAM_TYPE_PRIVATE_DATA,
            },
            StreamFormat::Subtitle(SubtitleCodec::Dvb) => STREAM_TYPE_PRIVATE_DATA,
            StreamFormat::Subtitle(SubtitleCodec::PresentationGraphics) => {
                STREAM_TYPE_PRESENTATION_GRAPHICS
            }
            StreamFormat::Subtitle(SubtitleCodec::InteractiveGraphics) => {
                STREAM_TYPE_INTERACTIVE_GRAPHICS
            }
            StreamFormat::Subtitle(SubtitleCodec::Text) => STREAM_TYPE_TEXT_SUBTITLE,
            StreamFormat::Teletext | StreamFormat::Vbi | StreamFormat::Ancillary => {
                STREAM_TYPE_PRIVATE_DATA
            }
        }
    }

    /// The PES stream_id used when the caller does not pick one.
    pub fn default_stream_id(self) -> u8 {
        match self {
            StreamFormat::Video(_) => STREAM_ID_MPEG_VIDEO,
            StreamFormat::Audio(
                AudioCodec::Mpeg1 | AudioCodec::Mpeg2 | AudioCodec::Adts | AudioCodec::Latm,
            ) => STREAM_ID_MPEG_AUDIO,
            StreamFormat::Subtitle(SubtitleCodec::Text) => STREAM_ID_PRIVATE_2,
            _ => STREAM_ID_PRIVATE_1,
        }
    }
}

mod frame;
pub use frame::*;
