use super::{TstdParams, TB_SIZE};
use crate::error::{MuxError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mpeg2Level {
    Low,
    Main,
    High1440,
    High,
    HighP,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mpeg2Profile {
    Simple,
    Main,
    Profile422,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcProfile {
    Baseline,
    Main,
    High,
    High10,
    High422,
    High444Predictive,
    High10Intra,
    High422Intra,
    High444Intra,
    Cavlc444Intra,
}

impl AvcProfile {
    pub fn profile_idc(self) -> u8 {
        match self {
            AvcProfile::Baseline => 66,
            AvcProfile::Main => 77,
            AvcProfile::High => 100,
            AvcProfile::High10 | AvcProfile::High10Intra => 110,
            AvcProfile::High422 | AvcProfile::High422Intra => 122,
            AvcProfile::High444Predictive | AvcProfile::High444Intra => 244,
            AvcProfile::Cavlc444Intra => 44,
        }
    }

    /// cpbBrNalFactor from H.264 Table A-2.
    fn cpb_factor(self) -> u64 {
        match self {
            AvcProfile::Baseline | AvcProfile::Main => 1200,
            AvcProfile::High => 1500,
            AvcProfile::High10 | AvcProfile::High10Intra => 3600,
            AvcProfile::High422
            | AvcProfile::High422Intra
            | AvcProfile::High444Predictive
            | AvcProfile::High444Intra
            | AvcProfile::Cavlc444Intra => 4800,
        }
    }

    fn is_intra(self) -> bool {
        matches!(
            self,
            AvcProfile::High10Intra
                | AvcProfile::High422Intra
                | AvcProfile::High444Intra
                | AvcProfile::Cavlc444Intra
        )
    }
}

// (level, profile, max bitrate, max vbv buffer size)
const MPEG2_LEVELS: &[(Mpeg2Level, Mpeg2Profile, u64, u64)] = &[
    (Mpeg2Level::Low, Mpeg2Profile::Main, 4_000_000, 475_136),
    (Mpeg2Level::Main, Mpeg2Profile::Simple, 15_000_000, 1_835_008),
    (Mpeg2Level::Main, Mpeg2Profile::Main, 15_000_000, 1_835_008),
    (Mpeg2Level::Main, Mpeg2Profile::Profile422, 50_000_000, 9_437_184),
    // 896 * 8192 bits
    (Mpeg2Level::High1440, Mpeg2Profile::Main, 60_000_000, 7_340_032),
    (Mpeg2Level::High, Mpeg2Profile::Main, 80_000_000, 9_781_248),
    (Mpeg2Level::HighP, Mpeg2Profile::Main, 80_000_000, 9_781_248),
];

// (level_idc, MaxBR, MaxCPB) in units of cpbBrNalFactor bits; 9 is level 1b
const AVC_LEVELS: &[(u8, u64, u64)] = &[
    (10, 64, 64),
    (9, 128, 350),
    (11, 192, 500),
    (12, 384, 1000),
    (13, 768, 2000),
    (20, 2000, 2000),
    (21, 4000, 4000),
    (22, 4000, 4000),
    (30, 10000, 10000),
    (31, 14000, 14000),
    (32, 20000, 20000),
    (40, 20000, 25000),
    (41, 50000, 62500),
    (42, 50000, 62500),
    (50, 135000, 135000),
    (51, 240000, 240000),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoProfile {
    Mpeg2 {
        profile: Mpeg2Profile,
        level: Mpeg2Level,
    },
    Avc {
        profile: AvcProfile,
        level_idc: u8,
    },
}

/// Parameters of an MPEG-2 or AVC video stream.
///
/// `frame_rate` is the MPEG-2 frame_rate_code and is ignored for AVC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSetup {
    pub profile: VideoProfile,
    pub vbv_maxrate: u64,
    pub vbv_bufsize: u64,
    pub frame_rate: u8,
}

impl VideoSetup {
    pub fn mpeg2(profile: Mpeg2Profile, level: Mpeg2Level, vbv_maxrate: u64, vbv_bufsize: u64) -> Self {
        Self {
            profile: VideoProfile::Mpeg2 { profile, level },
            vbv_maxrate,
            vbv_bufsize,
            frame_rate: 0,
        }
    }

    pub fn avc(profile: AvcProfile, level_idc: u8, vbv_maxrate: u64, vbv_bufsize: u64) -> Self {
        Self {
            profile: VideoProfile::Avc { profile, level_idc },
            vbv_maxrate,
            vbv_bufsize,
            frame_rate: 0,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: u8) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Derives the T-STD parameters and checks the VBV against the level limits.
    pub fn tstd_params(&self) -> Result<TstdParams> {
        if self.vbv_maxrate == 0 || self.vbv_bufsize == 0 {
            return Err(MuxError::Config("vbv maxrate and bufsize must be set".into()));
        }

        let params = match self.profile {
            VideoProfile::Mpeg2 { profile, level } => {
                let &(_, _, max_rate, max_vbv) = MPEG2_LEVELS
                    .iter()
                    .find(|(l, p, _, _)| *l == level && *p == profile)
                    .ok_or_else(|| {
                        MuxError::Config(format!(
                            "unsupported mpeg-2 profile/level {:?}@{:?}",
                            profile, level
                        ))
                    })?;

                self.check_limits(max_rate, max_vbv)?;

                let mut mb_size = max_rate / 250 + max_rate / 750;
                if matches!(level, Mpeg2Level::Low | Mpeg2Level::Main) {
                    mb_size += max_vbv - self.vbv_bufsize;
                }

                TstdParams {
                    tb_size: TB_SIZE,
                    rx: max_rate * 6 / 5,
                    mb_size,
                    rbx: max_rate,
                    eb_size: self.vbv_bufsize,
                }
            }
            VideoProfile::Avc { profile, level_idc } => {
                let &(_, max_br, max_cpb) = AVC_LEVELS
                    .iter()
                    .find(|(l, _, _)| *l == level_idc)
                    .ok_or_else(|| {
                        MuxError::Config(format!("unsupported avc level_idc {}", level_idc))
                    })?;

                let factor = profile.cpb_factor();
                let rbx = factor * max_br;
                self.check_limits(rbx, factor * max_cpb)?;

                let mux_rate = rbx.max(2_000_000);
                TstdParams {
                    tb_size: TB_SIZE,
                    rx: rbx * 6 / 5,
                    mb_size: mux_rate / 250 + mux_rate / 750,
                    rbx,
                    eb_size: self.vbv_bufsize,
                }
            }
        };

        Ok(params)
    }

    fn check_limits(&self, max_rate: u64, max_buffer: u64) -> Result<()> {
        if self.vbv_maxrate > max_rate {
            return Err(MuxError::Config(format!(
                "vbv maxrate {} exceeds the level limit {}",
                self.vbv_maxrate, max_rate
            )));
        }
        if self.vbv_bufsize > max_buffer {
            return Err(MuxError::Config(format!(
                "vbv bufsize {} exceeds the level limit {}",
                self.vbv_bufsize, max_buffer
            )));
        }
        Ok(())
    }

    /// AU_coding_format of the DVB AU_information field.
    pub fn au_coding_format(&self) -> u8 {
        match self.profile {
            VideoProfile::Mpeg2 { .. } => 1,
            VideoProfile::Avc { .. } => 2,
        }
    }

    /// profile_idc for AVC, the MPEG-2 profile code otherwise.
    pub fn profile_idc(&self) -> u8 {
        match self.profile {
            VideoProfile::Mpeg2 { profile, level } => mpeg2_profile_and_level(profile, level) >> 4,
            VideoProfile::Avc { profile, .. } => profile.profile_idc(),
        }
    }

    /// level_idc for AVC, the MPEG-2 level code otherwise.
    pub fn level_idc(&self) -> u8 {
        match self.profile {
            VideoProfile::Mpeg2 { profile, level } => mpeg2_profile_and_level(profile, level) & 0x0f,
            // Level 1b in the Baseline and Main profiles is signalled as 11 + constraint_set3
            VideoProfile::Avc { profile, level_idc: 9 }
                if matches!(profile, AvcProfile::Baseline | AvcProfile::Main) =>
            {
                11
            }
            VideoProfile::Avc { level_idc, .. } => level_idc,
        }
    }

    /// constraint_set0..5 flags, MSB first in the low 6 bits. Zero for MPEG-2.
    pub fn constraint_flags(&self) -> u8 {
        match self.profile {
            VideoProfile::Mpeg2 { .. } => 0,
            VideoProfile::Avc { profile, level_idc } => {
                let set0 = profile == AvcProfile::Baseline;
                let set1 = matches!(profile, AvcProfile::Baseline | AvcProfile::Main);
                let set3 = (level_idc == 9 && set1) || profile.is_intra();
                (set0 as u8) << 5 | (set1 as u8) << 4 | (set3 as u8) << 2
            }
        }
    }

    /// profile_and_level_indication of the MPEG-2 video stream descriptor.
    pub fn profile_and_level(&self) -> Option<u8> {
        match self.profile {
            VideoProfile::Mpeg2 { profile, level } => Some(mpeg2_profile_and_level(profile, level)),
            VideoProfile::Avc { .. } => None,
        }
    }
}

fn mpeg2_profile_and_level(profile: Mpeg2Profile, level: Mpeg2Level) -> u8 {
    let level_code = match level {
        Mpeg2Level::Low => 0x0a,
        Mpeg2Level::Main => 0x08,
        Mpeg2Level::High1440 => 0x06,
        Mpeg2Level::High => 0x04,
        Mpeg2Level::HighP => 0x02,
    };

    match profile {
        Mpeg2Profile::Simple => 0x50 | level_code,
        Mpeg2Profile::Main => 0x40 | level_code,
        // 4:2:2 uses the escape range
        Mpeg2Profile::Profile422 => match level {
            Mpeg2Level::High | Mpeg2Level::HighP | Mpeg2Level::High1440 => 0x82,
            _ => 0x85,
        },
    }
}
