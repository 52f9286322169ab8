#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;
    use std::collections::HashMap;
    use tsmux::av::{AudioCodec, Frame, StreamFormat, VideoCodec};
    use tsmux::codec::video::{AvcProfile, VideoSetup};
    use tsmux::config::{ProgramConfig, ServiceConfig, StreamConfig, WriterConfig};
    use tsmux::error::MuxError;
    use tsmux::format::ts::{
        Profile, TsPacketParser, TsWriter, BLURAY_PACKET_SIZE, PID_NULL, PID_PAT, PID_SDT,
        PID_SIT, PID_TDT, TS_PACKET_SIZE,
    };

    const PMT_PID: u16 = 0x100;
    const VIDEO_PID: u16 = 0x101;
    const AUDIO_PID: u16 = 0x102;

    /// 40 ms at 27 MHz
    const MAX_PCR_GAP: u64 = 1_080_000;
    /// 100 ms at 27 MHz
    const MAX_PAT_GAP: u64 = 2_700_000;

    /// One PES as it went out.
    struct Delivery {
        finish: u64,
        bytes: usize,
    }

    /// Everything one writer produced, concatenated over all calls.
    #[derive(Default)]
    struct Capture {
        data: Vec<u8>,
        pcr_list: Vec<u64>,
    }

    impl Capture {
        fn write(&mut self, writer: &mut TsWriter, frames: &[Frame]) {
            let output = writer.write_frames(frames).unwrap();
            self.data.extend_from_slice(output.data);
            self.pcr_list.extend_from_slice(output.pcr_list);
        }

        fn packets(&self) -> Vec<&[u8]> {
            TsPacketParser::new().packets(&self.data).unwrap()
        }

        /// Clock values of the packets on `pid` that start a section or PES.
        fn unit_starts(&self, pid: u16) -> Vec<u64> {
            let parser = TsPacketParser::new();
            self.packets()
                .iter()
                .zip(&self.pcr_list)
                .filter(|(p, _)| {
                    let header = parser.parse_header(p).unwrap();
                    header.pid == pid && header.payload_unit_start
                })
                .map(|(_, &pcr)| pcr)
                .collect()
        }

        /// Clock, unit start flag and payload size of the packets on `pid`
        /// that carry payload.
        fn payloads(&self, pid: u16) -> Vec<(u64, bool, usize)> {
            let parser = TsPacketParser::new();
            self.packets()
                .iter()
                .zip(&self.pcr_list)
                .filter_map(|(p, &pcr)| {
                    let header = parser.parse_header(p).unwrap();
                    if header.pid != pid || !header.contains_payload {
                        return None;
                    }
                    let bytes = p.len() - parser.payload_offset(p).unwrap();
                    Some((pcr, header.payload_unit_start, bytes))
                })
                .collect()
        }

        fn deliveries(&self, pid: u16) -> Vec<Delivery> {
            let mut out: Vec<Delivery> = Vec::new();
            for (pcr, start, bytes) in self.payloads(pid) {
                match out.last_mut() {
                    Some(last) if !start => {
                        last.finish = pcr;
                        last.bytes += bytes;
                    }
                    _ => out.push(Delivery { finish: pcr, bytes }),
                }
            }
            out
        }
    }

    fn pid_of(packet: &[u8]) -> u16 {
        ((packet[1] as u16 & 0x1f) << 8) | packet[2] as u16
    }

    fn avc_ac3_writer(profile: Profile) -> TsWriter {
        avc_ac3_writer_at(WriterConfig::new(20_000_000, profile))
    }

    fn avc_ac3_writer_at(config: WriterConfig) -> TsWriter {
        let config = config.with_program(
            ProgramConfig::new(1, PMT_PID, VIDEO_PID)
                .with_stream(StreamConfig::new(VIDEO_PID, StreamFormat::Video(VideoCodec::Avc)))
                .with_stream(StreamConfig::new(AUDIO_PID, StreamFormat::Audio(AudioCodec::Ac3))),
        );
        let mut writer = TsWriter::new(config).unwrap();
        writer
            .setup_mpegvideo_stream(
                VIDEO_PID,
                VideoSetup::avc(AvcProfile::Main, 31, 14_000_000, 14_000_000),
            )
            .unwrap();
        writer
    }

    fn audio_writer(config: WriterConfig) -> TsWriter {
        let config = config.with_program(
            ProgramConfig::new(1, PMT_PID, VIDEO_PID)
                .with_stream(StreamConfig::new(VIDEO_PID, StreamFormat::Audio(AudioCodec::Mpeg1)))
                .with_service(ServiceConfig::new(0x02, "tsmux", "radio")),
        );
        TsWriter::new(config).unwrap()
    }

    fn assert_continuity(capture: &Capture) {
        let parser = TsPacketParser::new();
        let mut last: HashMap<u16, u8> = HashMap::new();

        for packet in capture.packets() {
            let header = parser.parse_header(packet).unwrap();
            if header.pid == PID_NULL {
                continue;
            }
            if let Some(&prev) = last.get(&header.pid) {
                let expected = if header.contains_payload {
                    (prev + 1) & 0x0f
                } else {
                    prev
                };
                assert_eq!(
                    header.continuity_counter, expected,
                    "continuity on pid 0x{:04x}",
                    header.pid
                );
            }
            last.insert(header.pid, header.continuity_counter);
        }
    }

    fn assert_pcr_gaps(capture: &Capture, pcr_pid: u16) {
        let parser = TsPacketParser::new();
        let pcrs: Vec<u64> = capture
            .packets()
            .iter()
            .filter(|p| pid_of(p) == pcr_pid)
            .filter_map(|p| parser.parse_adaptation_field(p).unwrap())
            .filter_map(|af| af.pcr)
            .collect();

        assert!(!pcrs.is_empty());
        for pair in pcrs.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!(pair[1] - pair[0] <= MAX_PCR_GAP, "pcr gap {}", pair[1] - pair[0]);
        }
    }

    fn assert_max_gap(times: &[u64], max: u64) {
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] <= max, "gap {} above {}", pair[1] - pair[0], max);
        }
    }

    /// 25 fps video plus AC-3 every 32 ms, in decoding order.
    fn av_frames(video_sizes: &[usize]) -> Vec<Frame> {
        let start = 945_000;
        let mut frames: Vec<Frame> = video_sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                Frame::new(VIDEO_PID, vec![0u8; size])
                    .with_pts(start + i as u64 * 3600)
                    .with_random_access(i % 12 == 0)
            })
            .collect();

        let end = start + video_sizes.len() as u64 * 3600;
        frames.extend(
            (start..end)
                .step_by(2880)
                .map(|dts| Frame::new(AUDIO_PID, vec![0u8; 1536]).with_pts(dts)),
        );
        frames.sort_by_key(|f| f.dts);
        frames
    }

    /// Sends `frames` one per call, flushes, and checks every timing and
    /// buffer constraint on the result.
    fn assert_streams_in_time(config: WriterConfig, frames: &[Frame]) {
        let mut writer = avc_ac3_writer_at(config);
        let mut capture = Capture::default();
        for frame in frames {
            capture.write(&mut writer, std::slice::from_ref(frame));
        }
        capture.write(&mut writer, &[]);
        assert_eq!(writer.queued_frames(), 0);

        for pid in [VIDEO_PID, AUDIO_PID] {
            let sent: Vec<&Frame> = frames.iter().filter(|f| f.pid == pid).collect();
            let deliveries = capture.deliveries(pid);
            assert_eq!(deliveries.len(), sent.len(), "pes count on pid 0x{:04x}", pid);
            for (delivery, frame) in deliveries.iter().zip(&sent) {
                assert!(
                    delivery.finish <= frame.dts * 300,
                    "pid 0x{:04x}: dts {} finished {} ticks late",
                    pid,
                    frame.dts,
                    delivery.finish - frame.dts * 300
                );
            }

            let (tb, mb, _) = writer.stream_buffers(pid).unwrap();
            assert!(tb.peak() <= tb.size());
            assert!(mb.peak() <= mb.size());
        }

        // Elementary buffer: delivered bytes minus the access units already
        // decoded. PES headers are counted too, which only overestimates.
        let (_, _, eb) = writer.stream_buffers(VIDEO_PID).unwrap();
        let video: Vec<u64> = frames
            .iter()
            .filter(|f| f.pid == VIDEO_PID)
            .map(|f| f.dts * 300)
            .collect();
        let sizes: Vec<usize> = capture.deliveries(VIDEO_PID).iter().map(|d| d.bytes).collect();
        let (mut delivered, mut decoded, mut next) = (0usize, 0usize, 0usize);
        for (pcr, _, bytes) in capture.payloads(VIDEO_PID) {
            while next < video.len() && video[next] <= pcr {
                decoded += sizes[next];
                next += 1;
            }
            delivered += bytes;
            let fill = delivered.saturating_sub(decoded) as u64 * 8;
            assert!(fill <= eb.size(), "eb fill {} above {}", fill, eb.size());
        }

        let (sys_tb, sys_mb) = writer.system_buffers();
        assert!(sys_tb.peak() <= sys_tb.size());
        assert!(sys_mb.peak() <= sys_mb.size());

        assert_continuity(&capture);
        assert_pcr_gaps(&capture, VIDEO_PID);
        assert_max_gap(&capture.unit_starts(PID_PAT), MAX_PAT_GAP);
    }

    #[test]
    fn test_streamed_keyframes_arrive_before_decoding() {
        // 80 KB keyframes take 64 ms at 10 Mbit/s, longer than a frame period
        let sizes: Vec<usize> = (0..150)
            .map(|i| if i % 12 == 0 { 80_000 } else { 20_000 })
            .collect();
        let frames = av_frames(&sizes);

        assert_streams_in_time(WriterConfig::new(10_000_000, Profile::Generic), &frames);
        assert_streams_in_time(
            WriterConfig::new(10_000_000, Profile::Generic).with_cbr(false),
            &frames,
        );
    }

    #[quickcheck]
    fn prop_random_frame_sizes_arrive_in_time(sizes: Vec<u16>) -> TestResult {
        if sizes.len() < 2 {
            return TestResult::discard();
        }
        // At most 8 Mbit/s of video at 25 fps
        let sizes: Vec<usize> = sizes
            .iter()
            .take(60)
            .map(|&s| 1_000 + s as usize % 39_000)
            .collect();

        assert_streams_in_time(
            WriterConfig::new(10_000_000, Profile::Generic),
            &av_frames(&sizes),
        );
        TestResult::passed()
    }

    #[test]
    fn test_avc_ac3_flush() {
        let mut writer = avc_ac3_writer(Profile::Generic);
        let mut capture = Capture::default();

        let video = Frame::new(VIDEO_PID, vec![0u8; 20_000])
            .with_pts(945_000)
            .with_random_access(true);
        let audio = Frame::new(AUDIO_PID, vec![0u8; 1536]).with_pts(945_000);

        let output = writer.write_frames(&[video, audio]).unwrap();
        assert!(output.data.is_empty());
        assert!(output.pcr_list.is_empty());

        capture.write(&mut writer, &[]);
        assert_eq!(writer.queued_frames(), 0);

        assert!(!capture.data.is_empty());
        assert_eq!(capture.data.len() % TS_PACKET_SIZE, 0);
        assert_eq!(capture.pcr_list.len(), capture.data.len() / TS_PACKET_SIZE);
        assert_eq!(pid_of(capture.packets()[0]), PID_PAT);
        assert!(capture.pcr_list.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(capture.unit_starts(VIDEO_PID).len(), 1);
        assert_eq!(capture.unit_starts(AUDIO_PID).len(), 1);
        assert_continuity(&capture);
        assert_pcr_gaps(&capture, VIDEO_PID);
        assert_max_gap(&capture.unit_starts(PID_PAT), MAX_PAT_GAP);

        for pid in [VIDEO_PID, AUDIO_PID] {
            let (tb, mb, _) = writer.stream_buffers(pid).unwrap();
            assert!(tb.peak() <= tb.size());
            assert!(mb.peak() <= mb.size());
        }
        let (sys_tb, _) = writer.system_buffers();
        assert!(sys_tb.peak() <= sys_tb.size());
    }

    #[test]
    fn test_pmt_in_output() {
        let mut writer = avc_ac3_writer(Profile::Dvb);
        let mut capture = Capture::default();
        capture.write(&mut writer, &[]);

        let mut parser = TsPacketParser::new();
        let section = capture
            .packets()
            .into_iter()
            .filter(|p| pid_of(p) == PMT_PID)
            .find_map(|p| parser.push_section_packet(p).unwrap())
            .unwrap();
        let pmt = parser.parse_pmt(&section).unwrap();

        assert_eq!(pmt.program_number, 1);
        assert_eq!(pmt.pcr_pid, VIDEO_PID);
        let streams: Vec<(u8, u16)> = pmt
            .streams
            .iter()
            .map(|s| (s.stream_type, s.elementary_pid))
            .collect();
        assert_eq!(streams, vec![(0x1b, VIDEO_PID), (0x06, AUDIO_PID)]);
    }

    #[test]
    fn test_idle_cbr_stream() {
        let config = WriterConfig::new(15_000_000, Profile::Generic).with_program(
            ProgramConfig::new(1, PMT_PID, VIDEO_PID)
                .with_stream(StreamConfig::new(VIDEO_PID, StreamFormat::Audio(AudioCodec::Mpeg1))),
        );
        let mut writer = TsWriter::new(config).unwrap();
        let mut capture = Capture::default();
        capture.write(&mut writer, &[]);

        let pids: Vec<u16> = capture.packets().into_iter().map(pid_of).collect();
        assert_eq!(&pids[..2], &[PID_PAT, PMT_PID]);
        assert!(pids.iter().all(|&pid| [PID_PAT, PMT_PID, PID_NULL].contains(&pid)));
        assert!(pids.iter().filter(|&&pid| pid == PID_NULL).count() > 900);

        let null = capture.packets()[2];
        assert_eq!(&null[..4], &[0x47, 0x1f, 0xff, 0x10]);
        assert!(null[4..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn test_capped_vbr_skips_null_packets() {
        let config = WriterConfig::new(15_000_000, Profile::Generic)
            .with_cbr(false)
            .with_program(
                ProgramConfig::new(1, PMT_PID, VIDEO_PID).with_stream(StreamConfig::new(
                    VIDEO_PID,
                    StreamFormat::Audio(AudioCodec::Mpeg1),
                )),
            );
        let mut writer = TsWriter::new(config).unwrap();
        let mut capture = Capture::default();
        capture.write(&mut writer, &[]);

        let pids: Vec<u16> = capture.packets().into_iter().map(pid_of).collect();
        assert!(!pids.contains(&PID_NULL));
        assert_eq!(&pids[..2], &[PID_PAT, PMT_PID]);
        assert!(writer.packets_written() > pids.len() as u64);
        assert_eq!(capture.pcr_list.len(), pids.len());
    }

    #[test]
    fn test_one_byte_of_stuffing() {
        let config = WriterConfig::new(2_000_000, Profile::Generic).with_program(
            ProgramConfig::new(1, PMT_PID, VIDEO_PID)
                .with_stream(StreamConfig::new(VIDEO_PID, StreamFormat::Audio(AudioCodec::Mpeg1)))
                .with_stream(StreamConfig::new(AUDIO_PID, StreamFormat::Audio(AudioCodec::Mpeg1))),
        );
        let mut writer = TsWriter::new(config).unwrap();
        let mut capture = Capture::default();

        // 14 byte PES header plus 169 bytes leaves one byte of the payload area
        let frame = Frame::new(AUDIO_PID, vec![0xaa; 169]).with_pts(900_000);
        capture.write(&mut writer, &[frame]);
        capture.write(&mut writer, &[]);

        let packets = capture.packets();
        let packet = packets
            .iter()
            .find(|p| pid_of(p) == AUDIO_PID)
            .expect("audio packet");
        assert_eq!(packet[1] & 0x40, 0x40);
        assert_eq!(packet[3], 0x30);
        assert_eq!(packet[4], 0);
        assert_eq!(&packet[5..9], &[0x00, 0x00, 0x01, 0xc0]);
        assert!(packet[19..].iter().all(|&b| b == 0xaa));
    }

    #[test]
    fn test_bluray_output() {
        let config = WriterConfig::new(20_000_000, Profile::BluRay).with_program(
            ProgramConfig::new(1, PMT_PID, VIDEO_PID)
                .with_stream(StreamConfig::new(VIDEO_PID, StreamFormat::Video(VideoCodec::Avc)))
                .with_stream(StreamConfig::new(AUDIO_PID, StreamFormat::Audio(AudioCodec::Ac3))),
        );
        let mut writer = TsWriter::new(config).unwrap();
        writer
            .setup_mpegvideo_stream(
                VIDEO_PID,
                VideoSetup::avc(AvcProfile::High, 41, 40_000_000, 30_000_000),
            )
            .unwrap();
        writer.setup_dtcp(0x00, 0x00).unwrap();

        let mut capture = Capture::default();
        let frames = [
            Frame::new(VIDEO_PID, vec![0u8; 50_000])
                .with_timestamps(945_000, 948_003)
                .with_random_access(true),
            Frame::new(AUDIO_PID, vec![0u8; 1536]).with_pts(945_000),
        ];
        capture.write(&mut writer, &frames);
        capture.write(&mut writer, &[]);

        assert_eq!(capture.data.len() % BLURAY_PACKET_SIZE, 0);
        assert_eq!(capture.pcr_list.len(), capture.data.len() / BLURAY_PACKET_SIZE);

        let parser = TsPacketParser::with_packet_size(BLURAY_PACKET_SIZE);
        let ats = parser.arrival_timestamps(&capture.data);
        for (ats, pcr) in ats.iter().zip(&capture.pcr_list) {
            assert_eq!(*ats as u64, pcr & 0x3fff_ffff);
        }

        let pids: Vec<u16> = parser
            .packets(&capture.data)
            .unwrap()
            .into_iter()
            .map(pid_of)
            .collect();
        assert!(pids.contains(&PID_SIT));
        assert!(!pids.contains(&PID_SDT));
    }

    #[test]
    fn test_dvb_au_information() {
        let config = WriterConfig::new(20_000_000, Profile::Dvb).with_program(
            ProgramConfig::new(1, PMT_PID, VIDEO_PID).with_stream(
                StreamConfig::new(VIDEO_PID, StreamFormat::Video(VideoCodec::Avc)).with_dvb_au(3),
            ),
        );
        let mut writer = TsWriter::new(config).unwrap();
        writer
            .setup_mpegvideo_stream(
                VIDEO_PID,
                VideoSetup::avc(AvcProfile::High, 40, 20_000_000, 25_000_000),
            )
            .unwrap();

        let mut capture = Capture::default();
        let frame = Frame::new(VIDEO_PID, vec![0u8; 8000])
            .with_pts(945_000)
            .with_random_access(true)
            .with_au_info(1, 3, 0);
        capture.write(&mut writer, &[frame]);
        capture.write(&mut writer, &[]);

        let parser = TsPacketParser::new();
        let packets = capture.packets();
        let first = packets
            .iter()
            .find(|p| pid_of(p) == VIDEO_PID && p[1] & 0x40 != 0)
            .expect("first video packet");

        let af = parser.parse_adaptation_field(first).unwrap().unwrap();
        assert!(af.random_access);
        assert!(af.pcr.is_some());
        let private = af.private_data.unwrap();
        assert_eq!(private[0], 0x02);
        assert_eq!(private[1] as usize, private.len() - 2);
        // AVC, coding type 1
        assert_eq!(private[2], 0x21);
        // Frame rate code in the low nibble
        assert_eq!(private[8] & 0x0f, 3);
        assert_eq!(private[9], 100);
    }

    #[test]
    fn test_dvb_si_periods() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut writer = audio_writer(
            WriterConfig::new(2_000_000, Profile::Dvb)
                .with_sdt_period_ms(500)
                .with_tdt(start),
        );
        let mut capture = Capture::default();

        for i in 0..125u64 {
            let frame = Frame::new(VIDEO_PID, vec![0xff; 384]).with_pts(900_000 + i * 2160);
            capture.write(&mut writer, &[frame]);
        }
        capture.write(&mut writer, &[]);

        assert_eq!(capture.data.len(), capture.pcr_list.len() * TS_PACKET_SIZE);
        assert_continuity(&capture);
        assert_pcr_gaps(&capture, VIDEO_PID);
        assert_max_gap(&capture.unit_starts(PID_PAT), MAX_PAT_GAP);

        let sdts = capture.unit_starts(PID_SDT);
        assert!(sdts.len() >= 5);
        assert_max_gap(&sdts, 500 * 27_000);

        let tdts = capture.unit_starts(PID_TDT);
        assert_eq!(tdts.len(), 1);

        let (sys_tb, _) = writer.system_buffers();
        assert!(sys_tb.peak() <= sys_tb.size());
    }

    #[test]
    fn test_tdt_carries_start_time() {
        let start = Utc.with_ymd_and_hms(1993, 10, 13, 12, 45, 0).unwrap();
        let mut writer = audio_writer(WriterConfig::new(2_000_000, Profile::Dvb).with_tdt(start));
        let mut capture = Capture::default();
        capture.write(&mut writer, &[]);

        let packets = capture.packets();
        let tdt = packets
            .iter()
            .find(|p| pid_of(p) == PID_TDT)
            .expect("tdt packet");
        // pointer_field, then table 0x70 with MJD 49273 and 12:45:00
        assert_eq!(&tdt[4..13], &[0x00, 0x70, 0x70, 0x05, 0xc0, 0x79, 0x12, 0x45, 0x00]);
    }

    #[test]
    fn test_configuration_errors() {
        let program = || {
            ProgramConfig::new(1, PMT_PID, VIDEO_PID)
                .with_stream(StreamConfig::new(VIDEO_PID, StreamFormat::Audio(AudioCodec::Mpeg1)))
        };

        let no_rate = WriterConfig::new(0, Profile::Generic).with_program(program());
        assert!(matches!(TsWriter::new(no_rate), Err(MuxError::Config(_))));

        let no_program = WriterConfig::new(2_000_000, Profile::Generic);
        assert!(matches!(TsWriter::new(no_program), Err(MuxError::Config(_))));

        let two_programs = WriterConfig::new(2_000_000, Profile::Generic)
            .with_program(program())
            .with_program(program());
        assert!(matches!(TsWriter::new(two_programs), Err(MuxError::Unsupported(_))));

        let duplicate = WriterConfig::new(2_000_000, Profile::Generic).with_program(
            program().with_stream(StreamConfig::new(VIDEO_PID, StreamFormat::Audio(AudioCodec::Ac3))),
        );
        assert!(matches!(TsWriter::new(duplicate), Err(MuxError::Config(_))));

        let bad_pcr = WriterConfig::new(2_000_000, Profile::Generic).with_program(
            ProgramConfig::new(1, PMT_PID, 0x200)
                .with_stream(StreamConfig::new(VIDEO_PID, StreamFormat::Audio(AudioCodec::Mpeg1))),
        );
        assert!(matches!(TsWriter::new(bad_pcr), Err(MuxError::Config(_))));

        let lpcm_outside_bluray = WriterConfig::new(2_000_000, Profile::Dvb).with_program(
            ProgramConfig::new(1, PMT_PID, VIDEO_PID)
                .with_stream(StreamConfig::new(VIDEO_PID, StreamFormat::Audio(AudioCodec::Lpcm))),
        );
        assert!(matches!(TsWriter::new(lpcm_outside_bluray), Err(MuxError::Config(_))));
    }

    #[test]
    fn test_missing_setup_leaves_writer_usable() {
        let mut writer = avc_ac3_writer(Profile::Generic);
        let config = WriterConfig::new(20_000_000, Profile::Generic).with_program(
            ProgramConfig::new(1, PMT_PID, VIDEO_PID)
                .with_stream(StreamConfig::new(VIDEO_PID, StreamFormat::Video(VideoCodec::Mpeg2))),
        );
        let mut unset = TsWriter::new(config).unwrap();
        let frame = Frame::new(VIDEO_PID, vec![0u8; 100]).with_pts(945_000);
        assert!(matches!(
            unset.write_frames(&[frame.clone()]),
            Err(MuxError::MissingSetup { pid: VIDEO_PID })
        ));
        assert_eq!(unset.queued_frames(), 0);

        assert!(writer.write_frames(&[frame]).is_ok());
        assert_eq!(writer.queued_frames(), 1);
    }
}
