use bytes::Bytes;

/// One coded access unit handed to the muxer.
///
/// Timestamps are in 90 kHz units. The AU fields are only used by streams
/// carrying DVB AU_information in their adaptation fields.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pid: u16,
    pub data: Bytes,
    pub dts: u64,
    pub pts: u64,
    pub random_access: bool,
    pub priority: bool,
    pub frame_type: u8,
    pub ref_pic_idc: u8,
    pub pic_struct: u8,
    pub write_pulldown_info: bool,
}

impl Frame {
    pub fn new(pid: u16, data: impl Into<Bytes>) -> Self {
        Self {
            pid,
            data: data.into(),
            dts: 0,
            pts: 0,
            random_access: false,
            priority: false,
            frame_type: 0,
            ref_pic_idc: 0,
            pic_struct: 0,
            write_pulldown_info: false,
        }
    }

    /// Sets both timestamps.
    pub fn with_timestamps(mut self, dts: u64, pts: u64) -> Self {
        self.dts = dts;
        self.pts = pts;
        self
    }

    /// Sets DTS and PTS to the same value.
    pub fn with_pts(mut self, pts: u64) -> Self {
        self.dts = pts;
        self.pts = pts;
        self
    }

    pub fn with_random_access(mut self, random_access: bool) -> Self {
        self.random_access = random_access;
        self
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_au_info(mut self, frame_type: u8, ref_pic_idc: u8, pic_struct: u8) -> Self {
        self.frame_type = frame_type;
        self.ref_pic_idc = ref_pic_idc;
        self.pic_struct = pic_struct;
        self
    }

    pub fn with_pulldown_info(mut self, write_pulldown_info: bool) -> Self {
        self.write_pulldown_info = write_pulldown_info;
        self
    }
}
