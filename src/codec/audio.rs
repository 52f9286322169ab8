use super::TstdParams;
use crate::error::{MuxError, Result};

/// MPEG audio, DTS and other audio without a dedicated buffer table.
pub const MISC_AUDIO_RX: u64 = 2_000_000;
pub const MISC_AUDIO_BS: u64 = 3584 * 8;

pub const AC3_RX: u64 = 2_000_000;
pub const AC3_BS_ATSC: u64 = 2592 * 8;
pub const AC3_BS_DVB: u64 = 5696 * 8;

pub const SMPTE_302M_BS: u64 = 65024 * 8;
pub const SMPTE_302M_SAMPLE_RATE: u64 = 48_000;

// (max channels, Rxn, BSn)
const AAC_BUFFERS: &[(u8, u64, u64)] = &[
    (2, 2_000_000, 3584 * 8),
    (8, 5_529_600, 8976 * 8),
    (12, 8_294_400, 12804 * 8),
    (48, 33_177_600, 51216 * 8),
];

pub fn misc_audio_tstd() -> TstdParams {
    TstdParams::single_buffer(MISC_AUDIO_RX, MISC_AUDIO_BS)
}

/// Lossless Blu-ray audio uses the largest AAC buffer class.
pub fn lossless_audio_tstd() -> TstdParams {
    let (_, rx, bs) = AAC_BUFFERS[AAC_BUFFERS.len() - 1];
    TstdParams::single_buffer(rx, bs)
}

pub fn ac3_tstd(atsc: bool) -> TstdParams {
    TstdParams::single_buffer(AC3_RX, if atsc { AC3_BS_ATSC } else { AC3_BS_DVB })
}

/// ADTS or LATM AAC. `profile_and_level` is the ISO/IEC 14496-3 audioProfileLevelIndication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AacSetup {
    pub profile_and_level: u8,
    pub num_channels: u8,
}

impl AacSetup {
    pub fn tstd_params(&self) -> Result<TstdParams> {
        if self.num_channels == 0 {
            return Err(MuxError::Config("aac stream needs at least one channel".into()));
        }

        AAC_BUFFERS
            .iter()
            .find(|(max_channels, _, _)| self.num_channels <= *max_channels)
            .map(|&(_, rx, bs)| TstdParams::single_buffer(rx, bs))
            .ok_or_else(|| {
                MuxError::Config(format!("{} aac channels not supported", self.num_channels))
            })
    }
}

/// Blu-ray LPCM. The sample rate is given in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpcmSetup {
    pub num_channels: u8,
    pub sample_rate_khz: u32,
    pub bits_per_sample: u8,
}

impl LpcmSetup {
    pub fn validate(&self) -> Result<()> {
        if !(1..=8).contains(&self.num_channels) {
            return Err(MuxError::Config(format!(
                "lpcm channel count {} not in 1..=8",
                self.num_channels
            )));
        }
        if !matches!(self.sample_rate_khz, 48 | 96 | 192) {
            return Err(MuxError::Config(format!(
                "lpcm sample rate {} kHz not supported",
                self.sample_rate_khz
            )));
        }
        if !matches!(self.bits_per_sample, 16 | 20 | 24) {
            return Err(MuxError::Config(format!(
                "lpcm sample size {} not supported",
                self.bits_per_sample
            )));
        }
        Ok(())
    }

    /// Channels are carried in pairs, so odd counts are padded.
    pub fn tstd_params(&self) -> Result<TstdParams> {
        self.validate()?;
        let channels = (self.num_channels as u64 + 1) & !1;
        let bitrate = channels * self.bits_per_sample as u64 * self.sample_rate_khz as u64 * 1000;
        Ok(TstdParams::single_buffer(bitrate * 6 / 5, SMPTE_302M_BS))
    }

    pub fn audio_presentation_type(&self) -> u8 {
        match self.num_channels {
            1 => 0x01,
            2 => 0x03,
            _ => 0x06,
        }
    }

    pub fn sampling_frequency(&self) -> u8 {
        match self.sample_rate_khz {
            48 => 0x01,
            96 => 0x04,
            _ => 0x05,
        }
    }

    pub fn bits_per_sample_code(&self) -> u8 {
        match self.bits_per_sample {
            16 => 0x01,
            20 => 0x02,
            _ => 0x03,
        }
    }
}

/// SMPTE 302M PCM in private stream 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smpte302mSetup {
    pub bit_depth: u8,
    pub num_channels: u8,
}

impl Smpte302mSetup {
    pub fn tstd_params(&self) -> Result<TstdParams> {
        if !matches!(self.bit_depth, 16 | 20 | 24) {
            return Err(MuxError::Config(format!(
                "302m bit depth {} not in 16, 20, 24",
                self.bit_depth
            )));
        }
        if !matches!(self.num_channels, 2 | 4 | 6 | 8) {
            return Err(MuxError::Config(format!(
                "302m channel count {} not in 2, 4, 6, 8",
                self.num_channels
            )));
        }

        // Each channel pair packs into (bit_depth / 4 + 1) bytes per sample, so
        // the leak rate scales with the pair count
        let pair_bytes = (self.bit_depth as u64 >> 2) + 1;
        let pairs = self.num_channels as u64 / 2;
        let rate = pair_bytes * pairs * SMPTE_302M_SAMPLE_RATE * 8;
        Ok(TstdParams::single_buffer(rate * 6 / 5, SMPTE_302M_BS))
    }
}

/// AC-3 sync frame fields needed by the ATSC AC-3 audio descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ac3Info {
    pub sample_rate_code: u8,
    pub bsid: u8,
    pub bit_rate_code: u8,
    pub surround_mode: u8,
    pub bsmod: u8,
    pub num_channels: u8,
}

impl Ac3Info {
    /// Reads the syncinfo and the start of the bsi of an AC-3 frame.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < 8 {
            return Err(MuxError::InvalidData("ac-3 frame too short".into()));
        }
        if frame[0] != 0x0b || frame[1] != 0x77 {
            return Err(MuxError::InvalidData("missing ac-3 sync word".into()));
        }

        Ok(Self {
            sample_rate_code: frame[4] >> 6,
            bsid: frame[5] >> 3,
            bit_rate_code: (frame[4] & 0x3f) >> 1,
            surround_mode: (frame[6] & 1) << 1 | (frame[7] >> 7),
            bsmod: frame[5] & 0x7,
            num_channels: frame[6] >> 5,
        })
    }
}
