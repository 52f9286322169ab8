use super::{TstdParams, TB_SIZE};
use crate::error::{MuxError, Result};

pub const DVB_SUB_RX: u64 = 192_000;
pub const DVB_SUB_MB: u64 = 24_000 * 8;
/// 1024 bytes, twice the standard transport buffer.
pub const DVB_SUB_DDS_TB: u64 = 2 * TB_SIZE;
pub const DVB_SUB_DDS_RX: u64 = 400_000;
pub const DVB_SUB_DDS_MB: u64 = 100_000 * 8;

pub const TELETEXT_TB: u64 = 480 * 8;
pub const TELETEXT_RX: u64 = 6_750_000;
pub const TELETEXT_BTTX: u64 = 1504 * 8;

pub const VBI_RX: u64 = 324_539;
pub const VBI_MB: u64 = 2256 * 8;

/// One entry of a DVB subtitling descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DvbSubtitle {
    pub language: [u8; 3],
    pub subtitling_type: u8,
    pub composition_page_id: u16,
    pub ancillary_page_id: u16,
}

impl DvbSubtitle {
    /// HD and disparity subtitling types carry a display definition segment.
    pub fn has_display_definition(&self) -> bool {
        matches!(self.subtitling_type, 0x14 | 0x15 | 0x24 | 0x25)
    }
}

pub fn dvb_subtitle_tstd(subtitles: &[DvbSubtitle]) -> Result<TstdParams> {
    if subtitles.is_empty() {
        return Err(MuxError::Config("dvb subtitle setup needs at least one entry".into()));
    }

    Ok(if subtitles.iter().any(DvbSubtitle::has_display_definition) {
        graphics_tstd()
    } else {
        TstdParams::single_buffer(DVB_SUB_RX, DVB_SUB_MB)
    })
}

/// HD subtitles and Blu-ray graphics streams.
pub fn graphics_tstd() -> TstdParams {
    TstdParams::single_buffer(DVB_SUB_DDS_RX, DVB_SUB_DDS_MB).with_tb_size(DVB_SUB_DDS_TB)
}

/// One entry of a DVB teletext descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeletextPage {
    pub language: [u8; 3],
    pub teletext_type: u8,
    pub magazine: u8,
    pub page_number: u8,
}

pub fn teletext_tstd(pages: &[TeletextPage]) -> Result<TstdParams> {
    if pages.is_empty() {
        return Err(MuxError::Config("teletext setup needs at least one page".into()));
    }
    if let Some(page) = pages.iter().find(|p| p.teletext_type > 0x1f || p.magazine > 7) {
        return Err(MuxError::Config(format!("invalid teletext page {:?}", page)));
    }

    Ok(TstdParams::single_buffer(TELETEXT_RX, TELETEXT_BTTX).with_tb_size(TELETEXT_TB))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VbiLine {
    pub field_parity: bool,
    pub line_offset: u8,
}

/// One data service of a DVB VBI data descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VbiService {
    pub data_service_id: u8,
    pub lines: Vec<VbiLine>,
}

pub fn vbi_tstd(services: &[VbiService]) -> Result<TstdParams> {
    if services.is_empty() {
        return Err(MuxError::Config("vbi setup needs at least one service".into()));
    }
    if services.iter().flat_map(|s| &s.lines).any(|l| l.line_offset > 0x1f) {
        return Err(MuxError::Config("vbi line offset does not fit in 5 bits".into()));
    }

    Ok(TstdParams::single_buffer(VBI_RX, VBI_MB))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn subtitle(subtitling_type: u8) -> DvbSubtitle {
        DvbSubtitle {
            language: *b"eng",
            subtitling_type,
            composition_page_id: 1,
            ancillary_page_id: 1,
        }
    }

    #[test]
    fn test_dvb_subtitle_buffers() {
        let sd = dvb_subtitle_tstd(&[subtitle(0x10)]).unwrap();
        assert_eq!(sd.rx, DVB_SUB_RX);
        assert_eq!(sd.tb_size, TB_SIZE);

        let hd = dvb_subtitle_tstd(&[subtitle(0x10), subtitle(0x14)]).unwrap();
        assert_eq!(hd.rx, DVB_SUB_DDS_RX);
        assert_eq!(hd.tb_size, 1024 * 8);

        assert!(dvb_subtitle_tstd(&[]).is_err());
    }

    #[test]
    fn test_teletext_validation() {
        let page = TeletextPage {
            language: *b"deu",
            teletext_type: 2,
            magazine: 8,
            page_number: 0x88,
        };
        assert!(teletext_tstd(&[page.clone()]).is_err());

        let page = TeletextPage { magazine: 1, ..page };
        let params = teletext_tstd(&[page]).unwrap();
        assert_eq!(params.tb_size, TELETEXT_TB);
        assert_eq!(params.rx, TELETEXT_RX);
    }

    #[test]
    fn test_vbi_validation() {
        let service = VbiService {
            data_service_id: 0x02,
            lines: vec![VbiLine { field_parity: true, line_offset: 40 }],
        };
        assert!(vbi_tstd(&[service]).is_err());
        assert!(vbi_tstd(&[]).is_err());
    }
}
