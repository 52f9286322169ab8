//! Program and elementary stream state owned by the writer.

use super::tstd::{Buffer, PACKET_BITS};
use super::types::{Profile, PCR_HZ};
use crate::av::{AudioCodec, StreamFormat, SubtitleCodec};
use crate::codec::audio::{self, AacSetup, Ac3Info, LpcmSetup, Smpte302mSetup};
use crate::codec::subtitle::{self, DvbSubtitle, TeletextPage, VbiService};
use crate::codec::video::VideoSetup;
use crate::codec::{language_code, TstdParams};
use crate::config::{HdmvVideo, ProgramConfig, ServiceConfig, SmoothingBuffer, StreamConfig};
use crate::error::Result;
use bytes::Bytes;
use log::warn;
use std::collections::VecDeque;

/// Codec parameters attached to a stream by its setup call.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecContext {
    Video(VideoSetup),
    Aac(AacSetup),
    Lpcm(LpcmSetup),
    Smpte302m(Smpte302mSetup),
    Ac3(Ac3Info),
    DvbSubtitles(Vec<DvbSubtitle>),
    Teletext(Vec<TeletextPage>),
    Vbi(Vec<VbiService>),
}

/// One elementary stream and its T-STD buffers.
#[derive(Debug)]
pub struct Stream {
    pub pid: u16,
    pub cc: u8,
    pub format: StreamFormat,
    pub stream_type: u8,
    pub stream_id: u8,
    pub codec: Option<CodecContext>,
    pub tb: Buffer,
    pub mb: Buffer,
    pub eb: Buffer,
    /// TB to MB leak rate in bit/s
    pub rx: u64,
    /// MB to EB leak rate in bit/s
    pub rbx: u64,
    pub language: Option<[u8; 3]>,
    pub audio_type: u8,
    pub stream_identifier: Option<u8>,
    pub dvb_au: bool,
    pub dvb_au_frame_rate: u8,
    pub hdmv_video: Option<HdmvVideo>,
    pub last_pkt_pcr: Option<u64>,
}

impl Stream {
    pub fn new(config: &StreamConfig, profile: Profile) -> Result<Self> {
        let language = config.language.as_deref().map(language_code).transpose()?;

        let mut stream = Self {
            pid: config.pid,
            cc: 0,
            format: config.format,
            stream_type: config.format.stream_type(profile),
            stream_id: config
                .stream_id
                .unwrap_or_else(|| config.format.default_stream_id()),
            codec: None,
            tb: Buffer::new(0),
            mb: Buffer::new(0),
            eb: Buffer::new(0),
            rx: 0,
            rbx: 0,
            language,
            audio_type: config.audio_type,
            stream_identifier: config.stream_identifier,
            dvb_au: config.dvb_au,
            dvb_au_frame_rate: config.dvb_au_frame_rate,
            hdmv_video: config.hdmv_video,
            last_pkt_pcr: None,
        };

        if let Some(params) = default_tstd(config.format, profile) {
            stream.apply_tstd(params);
        }
        Ok(stream)
    }

    pub fn apply_tstd(&mut self, params: TstdParams) {
        self.tb.resize(params.tb_size);
        self.mb.resize(params.mb_size);
        self.eb.resize(params.eb_size);
        self.rx = params.rx;
        self.rbx = params.rbx;
    }

    /// The buffer sizes and rates currently in effect.
    pub fn tstd_params(&self) -> TstdParams {
        TstdParams {
            tb_size: self.tb.size(),
            rx: self.rx,
            mb_size: self.mb.size(),
            rbx: self.rbx,
            eb_size: self.eb.size(),
        }
    }

    pub fn set_codec(&mut self, codec: CodecContext, params: TstdParams) {
        self.apply_tstd(params);
        self.codec = Some(codec);
    }

    pub fn is_ready(&self) -> bool {
        self.codec.is_some() || !self.format.requires_setup()
    }

    pub fn video_setup(&self) -> Option<&VideoSetup> {
        match &self.codec {
            Some(CodecContext::Video(setup)) => Some(setup),
            _ => None,
        }
    }

    /// Ticks needed to fill the decoding buffer at its input rate.
    pub fn arrival_window(&self) -> u64 {
        let (size, rate) = if self.format.is_video() {
            (self.eb.size(), self.rbx)
        } else {
            (self.mb.size(), self.rx)
        };
        if rate == 0 {
            return 0;
        }
        (size as u128 * PCR_HZ as u128 / rate as u128) as u64
    }

    /// Returns the counter for the next payload-carrying packet.
    pub fn next_cc(&mut self) -> u8 {
        let cc = self.cc;
        self.cc = (self.cc + 1) & 0x0f;
        cc
    }

    /// Drains TB into MB and MB into the decoder.
    /// Whether a packet sent now fits: the transport buffer is empty and the
    /// main buffer has room for everything it will pass on.
    pub fn can_accept(&self) -> bool {
        self.tb.is_empty() && self.mb.fill() + PACKET_BITS <= self.mb.size()
    }

    pub fn drip(&mut self, now: u64) {
        let moved = self.tb.drip(self.rx, now);
        if moved > 0 && !self.mb.add_bits(moved) {
            warn!("pid 0x{:04x}: main buffer overflow", self.pid);
        }
        self.mb.drip(self.rbx, now);
    }
}

/// Buffer sizes for formats usable without a setup call.
fn default_tstd(format: StreamFormat, profile: Profile) -> Option<TstdParams> {
    match format {
        StreamFormat::Audio(codec) => match codec {
            AudioCodec::Ac3 | AudioCodec::Eac3 => Some(audio::ac3_tstd(profile.is_atsc_like())),
            AudioCodec::DolbyLossless | AudioCodec::DtsHd | AudioCodec::DtsHdXll => {
                Some(audio::lossless_audio_tstd())
            }
            AudioCodec::Mpeg1
            | AudioCodec::Mpeg2
            | AudioCodec::Dts
            | AudioCodec::Eac3Secondary
            | AudioCodec::DtsHdSecondary => Some(audio::misc_audio_tstd()),
            AudioCodec::Adts | AudioCodec::Latm | AudioCodec::Lpcm | AudioCodec::Smpte302m => None,
        },
        StreamFormat::Subtitle(
            SubtitleCodec::PresentationGraphics
            | SubtitleCodec::InteractiveGraphics
            | SubtitleCodec::Text,
        ) => Some(subtitle::graphics_tstd()),
        StreamFormat::Ancillary => Some(audio::misc_audio_tstd()),
        StreamFormat::Video(_)
        | StreamFormat::Subtitle(SubtitleCodec::Dvb)
        | StreamFormat::Teletext
        | StreamFormat::Vbi => None,
    }
}

/// The single program of a writer.
#[derive(Debug)]
pub struct Program {
    pub number: u16,
    pub pmt_pid: u16,
    pub pmt_cc: u8,
    pub version: u8,
    pub pcr_pid: u16,
    /// In PMT loop order
    pub streams: Vec<Stream>,
    pub service: Option<ServiceConfig>,
    pub is_3d: bool,
    pub smoothing_buffer: Option<SmoothingBuffer>,
    pub last_pcr: Option<u64>,
    /// Rendered PMT packets still waiting after the first
    pub pmt_spare: VecDeque<Bytes>,
    /// Latest DTS seen on the pacing stream, 90 kHz
    pub last_pacing_dts: Option<u64>,
}

impl Program {
    pub fn new(config: &ProgramConfig, profile: Profile) -> Result<Self> {
        let streams = config
            .streams
            .iter()
            .map(|s| Stream::new(s, profile))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            number: config.program_number,
            pmt_pid: config.pmt_pid,
            pmt_cc: 0,
            version: 0,
            pcr_pid: config.pcr_pid,
            streams,
            service: config.service.clone(),
            is_3d: config.is_3d,
            smoothing_buffer: config.smoothing_buffer,
            last_pcr: None,
            pmt_spare: VecDeque::new(),
            last_pacing_dts: None,
        })
    }

    pub fn stream(&self, pid: u16) -> Option<&Stream> {
        self.streams.iter().find(|s| s.pid == pid)
    }

    pub fn stream_mut(&mut self, pid: u16) -> Option<&mut Stream> {
        self.streams.iter_mut().find(|s| s.pid == pid)
    }

    pub fn has_video(&self) -> bool {
        self.streams.iter().any(|s| s.format.is_video())
    }

    /// Whether frames of `pid` pace the output.
    pub fn is_pacing(&self, pid: u16) -> bool {
        !self.has_video() || self.stream(pid).is_some_and(|s| s.format.is_video())
    }
}
