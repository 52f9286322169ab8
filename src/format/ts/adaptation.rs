use super::types::write_pcr;
use crate::utils::BitWriter;

/// data_field_tag of the DVB AU_information field (ETSI TS 101 154).
pub const AU_INFORMATION_DATA_FIELD: u8 = 0x02;

/// DVB AU_information, carried as transport private data on the first packet
/// of each video access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuInformation {
    /// 1 for MPEG-2 video, 2 for AVC
    pub coding_format: u8,
    pub coding_type: u8,
    pub ref_pic_idc: u8,
    pub pic_struct: u8,
    /// 90 kHz PTS of the access unit; the low 32 bits are written
    pub pts: u64,
    pub frame_rate_code: u8,
    pub profile_idc: u8,
    /// constraint_set0..5 flags in the low 6 bits
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub pulldown_info: Option<u8>,
}

impl AuInformation {
    fn field_len(&self) -> usize {
        11 + self.pulldown_info.is_some() as usize
    }

    /// Size including data_field_tag and data_field_length.
    pub fn len(&self) -> usize {
        2 + self.field_len()
    }

    pub fn write_to(&self, w: &mut BitWriter) {
        w.write(8, AU_INFORMATION_DATA_FIELD as u64);
        w.write(8, self.field_len() as u64);

        w.write(4, self.coding_format as u64);
        w.write(4, self.coding_type as u64);
        w.write(2, self.ref_pic_idc as u64);
        w.write(2, self.pic_struct as u64);
        w.write_bit(true); // AU_PTS_present_flag
        w.write_bit(true); // AU_profile_info_present_flag
        w.write_bit(true); // AU_stream_info_present_flag
        w.write_bit(false); // AU_trick_mode_info_present_flag

        w.write(32, self.pts & 0xffff_ffff);

        w.write(4, 0);
        w.write(4, self.frame_rate_code as u64);

        w.write(8, self.profile_idc as u64);
        w.write(6, self.constraint_flags as u64);
        w.write(2, 0); // AU_AVC_compatible_flags
        w.write(8, self.level_idc as u64);

        w.write_bit(self.pulldown_info.is_some());
        w.write(6, 0);
        w.write_bit(false); // AU_flags_extension_1
        if let Some(pulldown) = self.pulldown_info {
            w.write(4, 0);
            w.write(4, (pulldown & 0x0f) as u64);
        }
    }
}

/// Adaptation field contents of one packet. Stuffing is added on write.
#[derive(Debug, Clone, Default)]
pub struct AdaptationField {
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    pub pcr: Option<u64>,
    pub private_data: Option<AuInformation>,
}

impl AdaptationField {
    pub fn has_content(&self) -> bool {
        self.discontinuity
            || self.random_access
            || self.es_priority
            || self.pcr.is_some()
            || self.private_data.is_some()
    }

    /// Bytes needed including the length byte, or 0 when there is nothing to say.
    pub fn min_len(&self) -> usize {
        if !self.has_content() {
            return 0;
        }

        let mut len = 2;
        if self.pcr.is_some() {
            len += 6;
        }
        if let Some(info) = &self.private_data {
            len += 1 + info.len();
        }
        len
    }

    /// Writes the field padded to `total_len` bytes, length byte included.
    ///
    /// A single byte of slack with no content is a zero adaptation_field_length.
    pub fn write_to(&self, w: &mut BitWriter, total_len: usize) {
        debug_assert!(total_len >= self.min_len().max(1));

        w.write(8, (total_len - 1) as u64);
        if total_len == 1 {
            return;
        }

        w.write_bit(self.discontinuity);
        w.write_bit(self.random_access);
        w.write_bit(self.es_priority);
        w.write_bit(self.pcr.is_some());
        w.write_bit(false); // OPCR
        w.write_bit(false); // splicing point
        w.write_bit(self.private_data.is_some());
        w.write_bit(false); // extension

        let mut written = 2;
        if let Some(pcr) = self.pcr {
            write_pcr(w, pcr);
            written += 6;
        }
        if let Some(info) = &self.private_data {
            w.write(8, info.len() as u64);
            info.write_to(w);
            written += 1 + info.len();
        }

        for _ in written..total_len {
            w.write(8, 0xff);
        }
    }
}
