use super::clock::Clock;
use super::pes::PesPacket;
use super::psi;
use super::stream::{CodecContext, Program, Stream};
use super::tstd::Buffer;
use super::types::*;
use crate::av::{AudioCodec, Frame, StreamFormat, SubtitleCodec, VideoCodec};
use crate::codec::audio::{AacSetup, Ac3Info, LpcmSetup, Smpte302mSetup};
use crate::codec::subtitle::{self, DvbSubtitle, TeletextPage, VbiService};
use crate::codec::video::{VideoProfile, VideoSetup};
use crate::codec::{TstdParams, BS_SYS, R_SYS_DEFAULT, TB_SIZE};
use crate::config::WriterConfig;
use crate::error::{MuxError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::VecDeque;

/// Bytes and PCR values produced by one [`TsWriter::write_frames`] call.
///
/// Both slices borrow the writer and are replaced by the next call.
#[derive(Debug, Clone, Copy)]
pub struct MuxOutput<'a> {
    pub data: &'a [u8],
    /// 27 MHz clock at the start of every packet in `data`
    pub pcr_list: &'a [u64],
}

/// Single-program transport stream writer.
///
/// Frames are buffered until the following pacing frame arrives, then the
/// packets due before it are scheduled. Each call returns only the packets
/// produced by that call.
///
/// ```
/// use tsmux::av::{AudioCodec, Frame, StreamFormat};
/// use tsmux::config::{ProgramConfig, StreamConfig, WriterConfig};
/// use tsmux::format::ts::{Profile, TsWriter, TS_PACKET_SIZE};
///
/// let config = WriterConfig::new(2_000_000, Profile::Dvb).with_program(
///     ProgramConfig::new(1, 0x100, 0x101)
///         .with_stream(StreamConfig::new(0x101, StreamFormat::Audio(AudioCodec::Mpeg1))),
/// );
/// let mut writer = TsWriter::new(config)?;
///
/// let frames = [
///     Frame::new(0x101, vec![0xff; 384]).with_pts(900_000),
///     Frame::new(0x101, vec![0xff; 384]).with_pts(902_160),
/// ];
/// writer.write_frames(&frames)?;
/// let output = writer.write_frames(&[])?;
/// assert_eq!(output.data.len() % TS_PACKET_SIZE, 0);
/// # Ok::<(), tsmux::error::MuxError>(())
/// ```
pub struct TsWriter {
    pub(super) profile: Profile,
    pub(super) cbr: bool,
    pub(super) ts_id: u16,
    pub(super) network_pid: Option<u16>,
    pub(super) network_id: u16,
    pub(super) network_name: Option<String>,
    pub(super) pcr_period: u64,
    pub(super) pat_period: u64,
    pub(super) sdt_period: u64,
    pub(super) nit_period: u64,
    pub(super) tdt_period: u64,
    pub(super) write_tdt: bool,
    pub(super) start_time: DateTime<Utc>,
    pub(super) program: Program,
    pub(super) clock: Clock,
    pub(super) pat_cc: u8,
    pub(super) sdt_cc: u8,
    pub(super) nit_cc: u8,
    pub(super) sit_cc: u8,
    pub(super) tdt_cc: u8,
    pub(super) last_pat: Option<u64>,
    pub(super) last_sdt: Option<u64>,
    pub(super) last_nit: Option<u64>,
    pub(super) last_sit: Option<u64>,
    pub(super) last_tdt: Option<u64>,
    pub(super) sys_tb: Buffer,
    pub(super) sys_mb: Buffer,
    pub(super) r_sys: u64,
    pub(super) queue: VecDeque<PesPacket>,
    pub(super) si_spare: VecDeque<Bytes>,
    pub(super) dtcp: Option<[u8; 2]>,
    pub(super) out: Vec<u8>,
    pub(super) pcr_list: Vec<u64>,
    poisoned: bool,
}

impl TsWriter {
    /// Validates `config` and creates a writer for it.
    pub fn new(config: WriterConfig) -> Result<Self> {
        config.validate()?;

        let program_config = config
            .programs
            .first()
            .ok_or_else(|| MuxError::Config("no program configured".into()))?;
        let program = Program::new(program_config, config.profile)?;

        let writer = Self {
            profile: config.profile,
            cbr: config.cbr,
            ts_id: config.ts_id,
            network_pid: config.network_pid,
            network_id: config.network_id,
            network_name: config.network_name.clone(),
            pcr_period: ms_to_ticks(config.pcr_period_ms),
            pat_period: ms_to_ticks(config.pat_period_ms),
            sdt_period: ms_to_ticks(config.sdt_period_ms),
            nit_period: ms_to_ticks(config.nit_period_ms),
            tdt_period: ms_to_ticks(config.tdt_period_ms),
            write_tdt: config.write_tdt,
            start_time: config.start_time.unwrap_or_else(Utc::now),
            program,
            clock: Clock::new(config.muxrate),
            pat_cc: 0,
            sdt_cc: 0,
            nit_cc: 0,
            sit_cc: 0,
            tdt_cc: 0,
            last_pat: None,
            last_sdt: None,
            last_nit: None,
            last_sit: None,
            last_tdt: None,
            sys_tb: Buffer::new(TB_SIZE),
            sys_mb: Buffer::new(BS_SYS),
            r_sys: R_SYS_DEFAULT.max(config.muxrate / 500),
            queue: VecDeque::new(),
            si_spare: VecDeque::new(),
            dtcp: None,
            out: Vec::new(),
            pcr_list: Vec::new(),
            poisoned: false,
        };

        // Every table must fit in a section before any packet is written
        writer.render_pmt()?;
        for table in writer.enabled_si_tables() {
            writer.render_si(table)?;
        }

        info!(
            "ts writer: {:?} profile, {} bit/s {}, program {} on pmt pid 0x{:04x}",
            writer.profile,
            writer.clock.muxrate(),
            if writer.cbr { "cbr" } else { "capped vbr" },
            writer.program.number,
            writer.program.pmt_pid
        );
        Ok(writer)
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Packets scheduled so far, imaginary ones included.
    pub fn packets_written(&self) -> u64 {
        self.clock.packets_written()
    }

    /// Current 27 MHz system clock.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.len()
    }

    /// Transport, main and elementary buffer of a stream.
    pub fn stream_buffers(&self, pid: u16) -> Option<(&Buffer, &Buffer, &Buffer)> {
        self.program.stream(pid).map(|s| (&s.tb, &s.mb, &s.eb))
    }

    /// System transport and main buffer shared by all PSI/SI.
    pub fn system_buffers(&self) -> (&Buffer, &Buffer) {
        (&self.sys_tb, &self.sys_mb)
    }

    pub fn setup_mpegvideo_stream(&mut self, pid: u16, setup: VideoSetup) -> Result<()> {
        let expected = match setup.profile {
            VideoProfile::Mpeg2 { .. } => VideoCodec::Mpeg2,
            VideoProfile::Avc { .. } => VideoCodec::Avc,
        };
        let params = setup.tstd_params()?;
        self.setup_stream(
            pid,
            |format| format == StreamFormat::Video(expected),
            CodecContext::Video(setup),
            params,
        )
    }

    pub fn setup_mpeg4_aac_stream(&mut self, pid: u16, setup: AacSetup) -> Result<()> {
        let params = setup.tstd_params()?;
        self.setup_stream(
            pid,
            |format| matches!(format, StreamFormat::Audio(AudioCodec::Adts | AudioCodec::Latm)),
            CodecContext::Aac(setup),
            params,
        )
    }

    pub fn setup_302m_stream(&mut self, pid: u16, setup: Smpte302mSetup) -> Result<()> {
        let params = setup.tstd_params()?;
        self.setup_stream(
            pid,
            |format| format == StreamFormat::Audio(AudioCodec::Smpte302m),
            CodecContext::Smpte302m(setup),
            params,
        )
    }

    pub fn setup_hdmv_lpcm_stream(&mut self, pid: u16, setup: LpcmSetup) -> Result<()> {
        let params = setup.tstd_params()?;
        self.setup_stream(
            pid,
            |format| format == StreamFormat::Audio(AudioCodec::Lpcm),
            CodecContext::Lpcm(setup),
            params,
        )
    }

    /// Reads the descriptor fields from the first bytes of an AC-3 sync frame.
    pub fn setup_ac3_stream(&mut self, pid: u16, sync_frame: &[u8]) -> Result<()> {
        let info = Ac3Info::parse(sync_frame)?;
        let params = self
            .program
            .stream(pid)
            .map(Stream::tstd_params)
            .ok_or(MuxError::UnknownPid(pid))?;
        self.setup_stream(
            pid,
            |format| format == StreamFormat::Audio(AudioCodec::Ac3),
            CodecContext::Ac3(info),
            params,
        )
    }

    pub fn setup_dvb_subtitles(&mut self, pid: u16, subtitles: Vec<DvbSubtitle>) -> Result<()> {
        let params = subtitle::dvb_subtitle_tstd(&subtitles)?;
        self.setup_stream(
            pid,
            |format| format == StreamFormat::Subtitle(SubtitleCodec::Dvb),
            CodecContext::DvbSubtitles(subtitles),
            params,
        )
    }

    pub fn setup_dvb_teletext(&mut self, pid: u16, pages: Vec<TeletextPage>) -> Result<()> {
        let params = subtitle::teletext_tstd(&pages)?;
        self.setup_stream(
            pid,
            |format| format == StreamFormat::Teletext,
            CodecContext::Teletext(pages),
            params,
        )
    }

    pub fn setup_dvb_vbi(&mut self, pid: u16, services: Vec<VbiService>) -> Result<()> {
        let params = subtitle::vbi_tstd(&services)?;
        self.setup_stream(
            pid,
            |format| format == StreamFormat::Vbi,
            CodecContext::Vbi(services),
            params,
        )
    }

    /// Blu-ray copy control bytes for the PMT.
    pub fn setup_dtcp(&mut self, byte_1: u8, byte_2: u8) -> Result<()> {
        if self.profile != Profile::BluRay {
            return Err(MuxError::Unsupported(
                "DTCP copy control is only carried in Blu-ray streams".into(),
            ));
        }
        self.dtcp = Some([byte_1, byte_2]);
        info!("dtcp copy control 0x{:02x} 0x{:02x}", byte_1, byte_2);
        Ok(())
    }

    fn setup_stream<F>(&mut self, pid: u16, accepts: F, codec: CodecContext, params: TstdParams) -> Result<()>
    where
        F: Fn(StreamFormat) -> bool,
    {
        let stream = self.program.stream_mut(pid).ok_or(MuxError::UnknownPid(pid))?;
        if !accepts(stream.format) {
            return Err(MuxError::Config(format!(
                "pid 0x{:04x} carries {:?}, which does not take this setup",
                pid, stream.format
            )));
        }

        let previous = (stream.codec.take(), stream.tstd_params());
        stream.set_codec(codec, params);

        // The new descriptors must still fit the PMT
        if let Err(e) = self.render_pmt() {
            if let Some(stream) = self.program.stream_mut(pid) {
                stream.codec = previous.0;
                stream.apply_tstd(previous.1);
            }
            return Err(e);
        }

        info!(
            "pid 0x{:04x}: rx {} bit/s, rbx {} bit/s, tb/mb/eb {}/{}/{} bits",
            pid,
            params.rx,
            params.rbx,
            params.tb_size,
            params.mb_size,
            params.eb_size
        );
        Ok(())
    }

    /// Buffers `frames` and writes every packet due before the newest pacing
    /// frame may start. An empty slice flushes everything buffered.
    ///
    /// After an allocation failure the writer refuses further batches.
    pub fn write_frames(&mut self, frames: &[Frame]) -> Result<MuxOutput<'_>> {
        if self.poisoned {
            return Err(MuxError::Poisoned);
        }

        self.out.clear();
        self.pcr_list.clear();

        if let Err(e) = self.mux_batch(frames) {
            if matches!(e, MuxError::Alloc(_)) {
                self.poisoned = true;
            }
            return Err(e);
        }

        Ok(MuxOutput {
            data: &self.out,
            pcr_list: &self.pcr_list,
        })
    }

    fn mux_batch(&mut self, frames: &[Frame]) -> Result<()> {
        for frame in frames {
            let stream = self
                .program
                .stream(frame.pid)
                .ok_or(MuxError::UnknownPid(frame.pid))?;
            if !stream.is_ready() {
                return Err(MuxError::MissingSetup { pid: frame.pid });
            }
        }

        self.queue.try_reserve(frames.len())?;
        for frame in frames {
            self.enqueue(frame)?;
        }

        match self.stop_target(frames.is_empty()) {
            Some(stop) => self.run(stop),
            None => Ok(()),
        }
    }

    pub(super) fn enqueue(&mut self, frame: &Frame) -> Result<()> {
        let now = self.clock.now();
        let is_pacing = self.program.is_pacing(frame.pid);
        let stream = self
            .program
            .stream(frame.pid)
            .ok_or(MuxError::UnknownPid(frame.pid))?;

        let mut pes = PesPacket::new(frame, stream.format, stream.stream_id)?;
        pes.set_arrival_window(stream.arrival_window());

        if pes.final_arrival < now {
            warn!(
                "pid 0x{:04x}: dts {} is already behind the system clock {}",
                frame.pid,
                frame.dts,
                now / 300
            );
        }

        if is_pacing {
            let last = self.program.last_pacing_dts.get_or_insert(frame.dts);
            *last = (*last).max(frame.dts);
        }

        debug!(
            "queued {} byte pes on pid 0x{:04x}, arrival {}..{}",
            pes.len(),
            pes.pid,
            pes.initial_arrival,
            pes.final_arrival
        );
        self.queue.push_back(pes);
        Ok(())
    }

    pub(super) fn render_pmt(&self) -> Result<Vec<u8>> {
        psi::pmt(&self.program, self.profile, self.dtcp)
    }
}
