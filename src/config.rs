use crate::av::{AudioCodec, StreamFormat};
use crate::codec::language_code;
use crate::error::{MuxError, Result};
use crate::format::ts::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;

/// Environment variables read by [`WriterConfig::apply_env`] and the keys they set.
const ENV_KEYS: &[(&str, &str)] = &[
    ("TSMUX_MUXRATE", "muxrate"),
    ("TSMUX_TS_ID", "ts_id"),
    ("TSMUX_CBR", "cbr"),
    ("TSMUX_PROFILE", "profile"),
    ("TSMUX_PCR_PERIOD_MS", "pcr_period_ms"),
    ("TSMUX_PAT_PERIOD_MS", "pat_period_ms"),
    ("TSMUX_SDT_PERIOD_MS", "sdt_period_ms"),
    ("TSMUX_NETWORK_PID", "network_pid"),
];

/// Video attributes written in the HDMV registration descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdmvVideo {
    pub video_format: u8,
    pub frame_rate: u8,
    pub aspect_ratio: u8,
}

impl Default for HdmvVideo {
    /// 1080i, 29.97 Hz, 16:9
    fn default() -> Self {
        Self {
            video_format: 4,
            frame_rate: 4,
            aspect_ratio: 3,
        }
    }
}

/// One elementary stream of a program.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub pid: u16,
    pub format: StreamFormat,
    /// PES stream_id, defaults to the usual id for the format
    pub stream_id: Option<u8>,
    /// ISO 639-2 language code
    pub language: Option<String>,
    pub audio_type: u8,
    /// DVB component tag
    pub stream_identifier: Option<u8>,
    /// Carry DVB AU_information on the first packet of each access unit
    pub dvb_au: bool,
    pub dvb_au_frame_rate: u8,
    pub hdmv_video: Option<HdmvVideo>,
}

impl StreamConfig {
    pub fn new(pid: u16, format: StreamFormat) -> Self {
        Self {
            pid,
            format,
            stream_id: None,
            language: None,
            audio_type: 0,
            stream_identifier: None,
            dvb_au: false,
            dvb_au_frame_rate: 0,
            hdmv_video: None,
        }
    }

    pub fn with_stream_id(mut self, stream_id: u8) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    pub fn with_language(mut self, language: &str, audio_type: u8) -> Self {
        self.language = Some(language.to_string());
        self.audio_type = audio_type;
        self
    }

    pub fn with_stream_identifier(mut self, component_tag: u8) -> Self {
        self.stream_identifier = Some(component_tag);
        self
    }

    pub fn with_dvb_au(mut self, frame_rate_code: u8) -> Self {
        self.dvb_au = true;
        self.dvb_au_frame_rate = frame_rate_code;
        self
    }

    pub fn with_hdmv_video(mut self, hdmv_video: HdmvVideo) -> Self {
        self.hdmv_video = Some(hdmv_video);
        self
    }
}

/// SDT service entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub service_type: u8,
    pub provider_name: String,
    pub service_name: String,
}

impl ServiceConfig {
    pub fn new(service_type: u8, provider_name: &str, service_name: &str) -> Self {
        Self {
            service_type,
            provider_name: provider_name.to_string(),
            service_name: service_name.to_string(),
        }
    }
}

/// ATSC smoothing buffer descriptor values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingBuffer {
    /// sb_leak_rate in units of 400 bit/s
    pub leak_rate: u32,
    /// sb_size in bytes
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramConfig {
    pub program_number: u16,
    pub pmt_pid: u16,
    pub pcr_pid: u16,
    pub streams: Vec<StreamConfig>,
    pub service: Option<ServiceConfig>,
    /// CableLabs 3DTV signalling
    pub is_3d: bool,
    pub smoothing_buffer: Option<SmoothingBuffer>,
}

impl ProgramConfig {
    pub fn new(program_number: u16, pmt_pid: u16, pcr_pid: u16) -> Self {
        Self {
            program_number,
            pmt_pid,
            pcr_pid,
            streams: Vec::new(),
            service: None,
            is_3d: false,
            smoothing_buffer: None,
        }
    }

    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn with_service(mut self, service: ServiceConfig) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_3d(mut self, is_3d: bool) -> Self {
        self.is_3d = is_3d;
        self
    }

    pub fn with_smoothing_buffer(mut self, smoothing_buffer: SmoothingBuffer) -> Self {
        self.smoothing_buffer = Some(smoothing_buffer);
        self
    }

    fn validate(&self, profile: Profile, network_pid: Option<u16>) -> Result<()> {
        let mut reserved: HashSet<u16> = [PID_PAT, PID_NIT, PID_SDT, PID_TDT, PID_SIT, PID_NULL]
            .into_iter()
            .collect();
        reserved.extend(network_pid);

        if self.pmt_pid < 0x10 || self.pmt_pid > PID_MAX || reserved.contains(&self.pmt_pid) {
            return Err(MuxError::Config(format!(
                "pmt pid 0x{:04x} is reserved or out of range",
                self.pmt_pid
            )));
        }
        reserved.insert(self.pmt_pid);

        if self.streams.iter().filter(|s| s.format.is_video()).count() > 1 {
            return Err(MuxError::Config(
                "a program carries at most one video stream".into(),
            ));
        }

        let mut seen = HashSet::new();
        for stream in &self.streams {
            if stream.pid < 0x10 || stream.pid > PID_MAX || reserved.contains(&stream.pid) {
                return Err(MuxError::Config(format!(
                    "stream pid 0x{:04x} is reserved or out of range",
                    stream.pid
                )));
            }
            if !seen.insert(stream.pid) {
                return Err(MuxError::Config(format!(
                    "duplicate stream pid 0x{:04x}",
                    stream.pid
                )));
            }
            if stream.format.is_bluray_only() && profile != Profile::BluRay {
                return Err(MuxError::Config(format!(
                    "{:?} on pid 0x{:04x} is only allowed in Blu-ray streams",
                    stream.format, stream.pid
                )));
            }
            if stream.format == StreamFormat::Audio(AudioCodec::Smpte302m)
                && profile == Profile::BluRay
            {
                return Err(MuxError::Config(
                    "SMPTE 302M audio cannot be carried in Blu-ray streams".into(),
                ));
            }
            if let Some(language) = &stream.language {
                language_code(language)?;
            }
        }

        if !seen.contains(&self.pcr_pid) {
            return Err(MuxError::Config(format!(
                "pcr pid 0x{:04x} does not name a stream of program {}",
                self.pcr_pid, self.program_number
            )));
        }

        if let Some(service) = &self.service {
            if service.provider_name.len() + service.service_name.len() > 250 {
                return Err(MuxError::Config("service and provider names too long".into()));
            }
        }

        Ok(())
    }
}

/// Everything fixed at writer creation.
///
/// Values can be layered: defaults, then a `key = value` file, then
/// `TSMUX_*` environment variables, then code.
///
/// ```
/// use tsmux::config::WriterConfig;
///
/// let mut config = WriterConfig::default();
/// config
///     .apply_overrides([("muxrate", "15000000"), ("profile", "dvb")])
///     .unwrap();
/// assert_eq!(config.muxrate, 15_000_000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WriterConfig {
    /// Output rate in bit/s, counted over 188-byte packets
    pub muxrate: u64,
    /// Pad with null packets; otherwise idle slots only advance the clock
    pub cbr: bool,
    pub ts_id: u16,
    pub profile: Profile,
    pub network_pid: Option<u16>,
    pub network_id: u16,
    pub network_name: Option<String>,
    pub pcr_period_ms: u64,
    pub pat_period_ms: u64,
    pub sdt_period_ms: u64,
    pub nit_period_ms: u64,
    pub tdt_period_ms: u64,
    pub write_tdt: bool,
    /// UTC time of the first packet, used by the TDT
    pub start_time: Option<DateTime<Utc>>,
    pub programs: Vec<ProgramConfig>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            muxrate: 0,
            cbr: true,
            ts_id: 1,
            profile: Profile::Generic,
            network_pid: None,
            network_id: DEFAULT_NETWORK_ID,
            network_name: None,
            pcr_period_ms: DEFAULT_PCR_PERIOD_MS,
            pat_period_ms: DEFAULT_PAT_PERIOD_MS,
            sdt_period_ms: DEFAULT_SDT_PERIOD_MS,
            nit_period_ms: DEFAULT_NIT_PERIOD_MS,
            tdt_period_ms: DEFAULT_TDT_PERIOD_MS,
            write_tdt: false,
            start_time: None,
            programs: Vec::new(),
        }
    }
}

impl WriterConfig {
    pub fn new(muxrate: u64, profile: Profile) -> Self {
        Self {
            muxrate,
            profile,
            ..Default::default()
        }
    }

    pub fn with_cbr(mut self, cbr: bool) -> Self {
        self.cbr = cbr;
        self
    }

    pub fn with_ts_id(mut self, ts_id: u16) -> Self {
        self.ts_id = ts_id;
        self
    }

    pub fn with_network(mut self, network_pid: u16, network_name: Option<&str>) -> Self {
        self.network_pid = Some(network_pid);
        self.network_name = network_name.map(str::to_string);
        self
    }

    pub fn with_pcr_period_ms(mut self, ms: u64) -> Self {
        self.pcr_period_ms = ms;
        self
    }

    pub fn with_pat_period_ms(mut self, ms: u64) -> Self {
        self.pat_period_ms = ms;
        self
    }

    pub fn with_sdt_period_ms(mut self, ms: u64) -> Self {
        self.sdt_period_ms = ms;
        self
    }

    pub fn with_tdt(mut self, start_time: DateTime<Utc>) -> Self {
        self.write_tdt = true;
        self.start_time = Some(start_time);
        self
    }

    pub fn with_program(mut self, program: ProgramConfig) -> Self {
        self.programs.push(program);
        self
    }

    /// Checks everything that can be checked before the first frame.
    pub fn validate(&self) -> Result<()> {
        if self.muxrate == 0 {
            return Err(MuxError::Config("muxrate must be non-zero".into()));
        }

        let periods = [
            self.pcr_period_ms,
            self.pat_period_ms,
            self.sdt_period_ms,
            self.nit_period_ms,
            self.tdt_period_ms,
        ];
        if periods.contains(&0) {
            return Err(MuxError::Config("retransmission periods must be non-zero".into()));
        }

        if let Some(pid) = self.network_pid {
            if !(PID_NIT..=PID_MAX).contains(&pid) {
                return Err(MuxError::Config(format!(
                    "network pid 0x{:04x} not in 0x0010..=0x1ffe",
                    pid
                )));
            }
        }
        if let Some(name) = &self.network_name {
            if name.len() > 255 {
                return Err(MuxError::Config("network name too long".into()));
            }
        }

        match self.programs.len() {
            0 => return Err(MuxError::Config("no program configured".into())),
            1 => {}
            n => {
                return Err(MuxError::Unsupported(format!(
                    "{} programs configured, only single program streams are supported",
                    n
                )))
            }
        }

        for program in &self.programs {
            program.validate(self.profile, self.network_pid)?;
        }

        Ok(())
    }

    /// Sets one writer field from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "muxrate" => self.muxrate = parse_int(value)?,
            "ts_id" => self.ts_id = parse_u16(key, value)?,
            "cbr" => self.cbr = parse_bool(value)?,
            "profile" => self.profile = value.parse()?,
            "pcr_period_ms" => self.pcr_period_ms = parse_int(value)?,
            "pat_period_ms" => self.pat_period_ms = parse_int(value)?,
            "sdt_period_ms" => self.sdt_period_ms = parse_int(value)?,
            "nit_period_ms" => self.nit_period_ms = parse_int(value)?,
            "tdt_period_ms" => self.tdt_period_ms = parse_int(value)?,
            "network_pid" => self.network_pid = Some(parse_u16(key, value)?),
            "network_id" => self.network_id = parse_u16(key, value)?,
            "network_name" => self.network_name = Some(value.to_string()),
            "write_tdt" => self.write_tdt = parse_bool(value)?,
            other => {
                return Err(MuxError::Config(format!("unknown configuration key '{}'", other)))
            }
        }
        Ok(())
    }

    pub fn apply_overrides<'a, I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in pairs {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Overlays the `TSMUX_*` environment variables that are set.
    pub fn apply_env(&mut self) -> Result<()> {
        for (var, key) in ENV_KEYS {
            if let Ok(value) = env::var(var) {
                self.set(key, &value)?;
            }
        }
        Ok(())
    }

    /// Overlays a `key = value` file. Blank lines and `#` comments are skipped.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let content = fs::read_to_string(path)?;
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| MuxError::Config(format!("expected key = value, got '{}'", line)))?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            self.set(key.trim(), value)?;
        }
        Ok(())
    }
}

fn parse_int(value: &str) -> Result<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => Ok(u64::from_str_radix(hex, 16)?),
        None => Ok(value.parse()?),
    }
}

fn parse_u16(key: &str, value: &str) -> Result<u16> {
    let n = parse_int(value)?;
    u16::try_from(n)
        .map_err(|_| MuxError::Config(format!("{} {} does not fit in 16 bits", key, n)))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(MuxError::Config(format!("'{}' is not a boolean", other))),
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# tsmux configuration
# Environment variables (TSMUX_MUXRATE, TSMUX_PROFILE, ...) override these values.

# Output rate in bit/s
muxrate = 20000000
cbr = true
ts_id = 1

# generic, dvb, atsc, cablelabs, isdb or bluray
profile = "dvb"

pcr_period_ms = 40
pat_period_ms = 100
sdt_period_ms = 1000

# network_pid = 0x10
# network_name = "tsmux"
"#;
        fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::VideoCodec;
    use pretty_assertions::assert_eq;

    fn program() -> ProgramConfig {
        ProgramConfig::new(1, 0x100, 0x101)
            .with_stream(StreamConfig::new(0x101, StreamFormat::Video(VideoCodec::Avc)))
            .with_stream(StreamConfig::new(0x102, StreamFormat::Audio(AudioCodec::Ac3)))
    }

    #[test]
    fn test_valid_config() {
        let config = WriterConfig::new(20_000_000, Profile::Dvb).with_program(program());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_muxrate() {
        let config = WriterConfig::new(0, Profile::Dvb).with_program(program());
        assert!(matches!(config.validate(), Err(MuxError::Config(_))));
    }

    #[test]
    fn test_program_count() {
        let config = WriterConfig::new(20_000_000, Profile::Dvb);
        assert!(matches!(config.validate(), Err(MuxError::Config(_))));

        let config = config.with_program(program()).with_program(program());
        assert!(matches!(config.validate(), Err(MuxError::Unsupported(_))));
    }

    #[test]
    fn test_network_pid_range() {
        let config = WriterConfig::new(20_000_000, Profile::Dvb)
            .with_network(0x0f, None)
            .with_program(program());
        assert!(config.validate().is_err());

        let config = WriterConfig::new(20_000_000, Profile::Dvb)
            .with_network(0x10, Some("net"))
            .with_program(program());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pid_collisions() {
        let dup = program().with_stream(StreamConfig::new(0x102, StreamFormat::Teletext));
        let config = WriterConfig::new(20_000_000, Profile::Dvb).with_program(dup);
        assert!(config.validate().is_err());

        let on_sdt = ProgramConfig::new(1, 0x100, 0x11)
            .with_stream(StreamConfig::new(0x11, StreamFormat::Audio(AudioCodec::Mpeg1)));
        let config = WriterConfig::new(20_000_000, Profile::Dvb).with_program(on_sdt);
        assert!(config.validate().is_err());

        let on_pmt = ProgramConfig::new(1, 0x100, 0x100)
            .with_stream(StreamConfig::new(0x100, StreamFormat::Audio(AudioCodec::Mpeg1)));
        let config = WriterConfig::new(20_000_000, Profile::Dvb).with_program(on_pmt);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_second_video_stream_rejected() {
        let two = program().with_stream(StreamConfig::new(
            0x103,
            StreamFormat::Video(VideoCodec::Mpeg2),
        ));
        let config = WriterConfig::new(20_000_000, Profile::Atsc).with_program(two);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pcr_pid_must_name_stream() {
        let mut p = program();
        p.pcr_pid = 0x200;
        let config = WriterConfig::new(20_000_000, Profile::Dvb).with_program(p);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profile_restricted_formats() {
        let lpcm = program().with_stream(StreamConfig::new(0x103, StreamFormat::Audio(AudioCodec::Lpcm)));
        let config = WriterConfig::new(20_000_000, Profile::Dvb).with_program(lpcm.clone());
        assert!(config.validate().is_err());
        let config = WriterConfig::new(48_000_000, Profile::BluRay).with_program(lpcm);
        assert!(config.validate().is_ok());

        let s302m = program().with_stream(StreamConfig::new(
            0x103,
            StreamFormat::Audio(AudioCodec::Smpte302m),
        ));
        let config = WriterConfig::new(48_000_000, Profile::BluRay).with_program(s302m);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_language() {
        let p = program().with_stream(
            StreamConfig::new(0x103, StreamFormat::Audio(AudioCodec::Mpeg1)).with_language("en", 0),
        );
        let config = WriterConfig::new(20_000_000, Profile::Dvb).with_program(p);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = WriterConfig::default();
        config
            .apply_overrides([
                ("muxrate", "15000000"),
                ("network_pid", "0x1f0"),
                ("cbr", "no"),
                ("profile", "atsc"),
            ])
            .unwrap();
        assert_eq!(config.muxrate, 15_000_000);
        assert_eq!(config.network_pid, Some(0x1f0));
        assert!(!config.cbr);
        assert_eq!(config.profile, Profile::Atsc);

        assert!(config.set("bogus", "1").is_err());
        assert!(matches!(config.set("muxrate", "fast"), Err(MuxError::ParseInt(_))));
        assert!(config.set("cbr", "maybe").is_err());
    }

    #[test]
    fn test_set_rejects_wide_ids() {
        let mut config = WriterConfig::default();
        for key in ["ts_id", "network_pid", "network_id"] {
            let err = config.set(key, "0x10010").unwrap_err();
            assert!(matches!(err, MuxError::Config(_)), "{}: {:?}", key, err);
        }
        assert_eq!(config.network_pid, WriterConfig::default().network_pid);

        config.set("network_id", "0xffff").unwrap();
        assert_eq!(config.network_id, 0xffff);
    }

    #[test]
    fn test_env_overlay() {
        env::set_var("TSMUX_PAT_PERIOD_MS", "80");
        let mut config = WriterConfig::default();
        config.apply_env().unwrap();
        env::remove_var("TSMUX_PAT_PERIOD_MS");
        assert_eq!(config.pat_period_ms, 80);
    }

    #[test]
    fn test_template_round_trip() {
        let path = env::temp_dir().join(format!("tsmux_template_{}.conf", std::process::id()));
        let _ = fs::remove_file(&path);
        create_default_config_template(&path).unwrap();

        let mut config = WriterConfig::default();
        config.load_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.muxrate, 20_000_000);
        assert_eq!(config.profile, Profile::Dvb);
        assert_eq!(config.sdt_period_ms, 1000);
    }

    #[test]
    fn test_missing_file() {
        let mut config = WriterConfig::default();
        let err = config.load_file("/nonexistent/tsmux.conf").unwrap_err();
        assert!(matches!(err, MuxError::Io(_)));
    }
}
