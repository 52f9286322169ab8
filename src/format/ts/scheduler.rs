//! Packet scheduling: decides what fills each transport packet slot.
//!
//! Every slot runs the same phases in order: stop check, PAT/PMT
//! retransmission, PCR check, PSI/SI drain, PES selection, and finally an
//! idle packet when nothing else is eligible. All buffers drip at the end of
//! each slot, imaginary VBR slots included.

use super::adaptation::{AdaptationField, AuInformation};
use super::muxer::TsWriter;
use super::pes::PesPacket;
use super::psi;
use super::tstd::PACKET_BITS;
use super::types::*;
use crate::codec::video::VideoSetup;
use crate::codec::RX_SYS;
use crate::error::{MuxError, Result};
use crate::utils::BitWriter;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use std::collections::VecDeque;

/// Ticks the system TB needs to drain one packet.
const PSI_DRAIN_TICKS: u64 = PACKET_BITS * PCR_HZ / RX_SYS;

/// SI tables become due this long before their period runs out, so waiting
/// for an empty system TB cannot stretch the interval.
const SI_EARLY_TICKS: u64 = 10 * PCR_HZ / 1000;

/// Free space kept in the output buffers, in packets.
const RESERVE_PACKETS: usize = 100;

/// When a batch stops scheduling packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StopTarget {
    /// Once the clock reaches the value
    At(u64),
    /// Once the queue is empty and the clock reaches the value
    Drained(u64),
}

/// Periodic tables on their own PIDs, in drain priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SiTable {
    Sit,
    Nit,
    Sdt,
    Tdt,
}

impl SiTable {
    const ALL: [SiTable; 4] = [SiTable::Sit, SiTable::Nit, SiTable::Sdt, SiTable::Tdt];

    fn pid(self, network_pid: Option<u16>) -> u16 {
        match self {
            SiTable::Sit => PID_SIT,
            SiTable::Nit => network_pid.unwrap_or(PID_NIT),
            SiTable::Sdt => PID_SDT,
            SiTable::Tdt => PID_TDT,
        }
    }
}

impl TsWriter {
    /// Where the current batch ends, or `None` when a non-flush batch lacks
    /// the pacing frame it needs to look ahead.
    pub(super) fn stop_target(&self, flush: bool) -> Option<StopTarget> {
        if !flush {
            let mut pacing = self.queue.iter().filter(|p| self.program.is_pacing(p.pid));
            // The oldest pacing frame waits until a newer one is known
            pacing.next()?;
            let newest = pacing.last()?;
            return Some(StopTarget::At(newest.initial_arrival));
        }

        let deadline = self
            .program
            .last_pacing_dts
            .map(|dts| dts * 300)
            .into_iter()
            .chain(self.queue.iter().map(|p| p.final_arrival))
            .max();

        Some(match deadline {
            Some(deadline) => StopTarget::Drained(deadline),
            None => StopTarget::At(self.clock.now() + self.pat_period),
        })
    }

    fn should_stop(&self, stop: StopTarget) -> bool {
        let now = self.clock.now();
        match stop {
            StopTarget::At(target) => now >= target,
            StopTarget::Drained(target) => self.queue.is_empty() && now >= target,
        }
    }

    /// Fills packet slots until `stop` is reached.
    pub(super) fn run(&mut self, stop: StopTarget) -> Result<()> {
        let start = self.clock.packets_written();

        while !self.should_stop(stop) {
            self.ensure_capacity()?;

            if self.pat_due() {
                self.write_pat_pmt()?;
                continue;
            }

            let pcr_due = self.pcr_due();
            if !pcr_due && self.drain_psi()? {
                continue;
            }

            match self.select(pcr_due) {
                Some(index) => self.emit_pes(index, pcr_due),
                None if pcr_due => self.emit_pcr_only(),
                None => self.emit_idle(),
            }
        }

        debug!(
            "batch done: {} slots, {} bytes, {} frames still queued",
            self.clock.packets_written() - start,
            self.out.len(),
            self.queue.len()
        );
        Ok(())
    }

    fn ensure_capacity(&mut self) -> Result<()> {
        let bytes = RESERVE_PACKETS * self.profile.packet_size();
        if self.out.capacity() - self.out.len() < bytes {
            self.out.try_reserve(bytes)?;
        }
        if self.pcr_list.capacity() - self.pcr_list.len() < RESERVE_PACKETS {
            self.pcr_list.try_reserve(RESERVE_PACKETS)?;
        }
        Ok(())
    }

    fn pat_due(&self) -> bool {
        if !self.program.pmt_spare.is_empty() {
            return false;
        }
        match self.last_pat {
            None => true,
            Some(last) => self.clock.next() - last > self.pat_period,
        }
    }

    /// Whether a PSI packet sent now could still sit in the system TB when
    /// the next PAT and PMT arrive.
    fn pat_due_soon(&self) -> bool {
        match self.last_pat {
            None => true,
            Some(last) => {
                let packets = self.clock.packets_written();
                self.clock.at(packets + 2, 0) + PSI_DRAIN_TICKS - last > self.pat_period
            }
        }
    }

    fn write_pat_pmt(&mut self) -> Result<()> {
        let pat = psi::pat(
            self.ts_id,
            self.program.number,
            self.program.pmt_pid,
            self.network_pid,
        )?;
        let pmt = self.render_pmt()?;

        let pat_packets = psi::packetize_section(&pat, PID_PAT, &mut self.pat_cc);
        let mut pmt_packets: VecDeque<Bytes> =
            psi::packetize_section(&pmt, self.program.pmt_pid, &mut self.program.pmt_cc).into();

        debug!(
            "pat and pmt at {}, {} pmt packets",
            self.clock.now(),
            pmt_packets.len()
        );
        self.last_pat = Some(self.clock.now());

        for packet in &pat_packets {
            self.write_psi_packet(packet);
        }
        if let Some(first) = pmt_packets.pop_front() {
            self.write_psi_packet(&first);
        }
        self.program.pmt_spare = pmt_packets;
        Ok(())
    }

    fn pcr_due(&self) -> bool {
        match self.program.last_pcr {
            Some(last) => self.clock.pcr_due(last, self.pcr_period),
            None => self.queue.iter().any(|p| p.pid == self.program.pcr_pid),
        }
    }

    /// Sends one pending PMT or SI packet. Returns whether the slot was used.
    fn drain_psi(&mut self) -> Result<bool> {
        if !self.sys_tb.is_empty() || self.pat_due_soon() {
            return Ok(false);
        }

        if let Some(packet) = self.program.pmt_spare.pop_front() {
            self.write_psi_packet(&packet);
            return Ok(true);
        }
        if let Some(packet) = self.si_spare.pop_front() {
            self.write_psi_packet(&packet);
            return Ok(true);
        }

        let now = self.clock.now();
        let Some(table) = self.enabled_si_tables().find(|&t| self.si_due(t, now)) else {
            return Ok(false);
        };

        let section = self.render_si(table)?;
        let pid = table.pid(self.network_pid);
        let mut packets: VecDeque<Bytes> =
            psi::packetize_section(&section, pid, self.si_cc_mut(table)).into();
        *self.last_si_mut(table) = Some(now);
        debug!("{:?} on pid 0x{:04x} at {}", table, pid, now);

        let Some(first) = packets.pop_front() else {
            return Ok(false);
        };
        self.si_spare.extend(packets);
        self.write_psi_packet(&first);
        Ok(true)
    }

    /// SI tables this writer transmits.
    pub(super) fn enabled_si_tables(&self) -> impl Iterator<Item = SiTable> + '_ {
        SiTable::ALL.into_iter().filter(move |table| match table {
            SiTable::Sit => self.profile == Profile::BluRay,
            SiTable::Nit => self.network_pid.is_some(),
            SiTable::Sdt => self.profile.is_dvb_like() && self.program.service.is_some(),
            SiTable::Tdt => self.profile.is_dvb_like() && self.write_tdt,
        })
    }

    fn si_period(&self, table: SiTable) -> u64 {
        match table {
            SiTable::Sit | SiTable::Sdt => self.sdt_period,
            SiTable::Nit => self.nit_period,
            SiTable::Tdt => self.tdt_period,
        }
    }

    fn si_due(&self, table: SiTable, now: u64) -> bool {
        let last = match table {
            SiTable::Sit => self.last_sit,
            SiTable::Nit => self.last_nit,
            SiTable::Sdt => self.last_sdt,
            SiTable::Tdt => self.last_tdt,
        };
        last.map_or(true, |last| now + SI_EARLY_TICKS - last > self.si_period(table))
    }

    fn si_cc_mut(&mut self, table: SiTable) -> &mut u8 {
        match table {
            SiTable::Sit => &mut self.sit_cc,
            SiTable::Nit => &mut self.nit_cc,
            SiTable::Sdt => &mut self.sdt_cc,
            SiTable::Tdt => &mut self.tdt_cc,
        }
    }

    fn last_si_mut(&mut self, table: SiTable) -> &mut Option<u64> {
        match table {
            SiTable::Sit => &mut self.last_sit,
            SiTable::Nit => &mut self.last_nit,
            SiTable::Sdt => &mut self.last_sdt,
            SiTable::Tdt => &mut self.last_tdt,
        }
    }

    pub(super) fn render_si(&self, table: SiTable) -> Result<Vec<u8>> {
        match table {
            SiTable::Sit => psi::sit(self.program.number, self.clock.muxrate()),
            SiTable::Nit => psi::nit(
                self.network_id,
                self.network_name.as_deref(),
                self.ts_id,
                self.program.number,
                self.program.service.as_ref().map(|s| s.service_type),
            ),
            SiTable::Sdt => {
                let service = self.program.service.as_ref().ok_or_else(|| {
                    MuxError::Config("sdt needs a service description".into())
                })?;
                psi::sdt(self.ts_id, self.network_id, self.program.number, service)
            }
            SiTable::Tdt => Ok(psi::tdt(self.utc_now())),
        }
    }

    /// Wall clock time matching the current system clock.
    fn utc_now(&self) -> DateTime<Utc> {
        let elapsed = self.clock.now().saturating_sub(TS_CLOCK_START);
        self.start_time + Duration::microseconds((elapsed / (PCR_HZ / 1_000_000)) as i64)
    }

    /// Index of the PES to send next, if any may go out in this slot.
    ///
    /// Only the oldest PES of each PID is a candidate. It paces itself across
    /// its arrival window until a newer PES on the same PID is queued, and
    /// from then on goes out as fast as its buffers allow.
    fn select(&self, pcr_due: bool) -> Option<usize> {
        let now = self.clock.now();

        if pcr_due {
            let pcr_pid = self.program.pcr_pid;
            let index = self.queue.iter().position(|p| p.pid == pcr_pid)?;
            let stream = self.program.stream(pcr_pid)?;
            return (stream.can_accept() && now >= self.queue[index].initial_arrival)
                .then_some(index);
        }

        let mut seen = Vec::with_capacity(self.program.streams.len());
        let mut audio: Option<usize> = None;
        let mut video: Option<usize> = None;

        for (i, pes) in self.queue.iter().enumerate() {
            if seen.contains(&pes.pid) {
                continue;
            }
            seen.push(pes.pid);

            let Some(stream) = self.program.stream(pes.pid) else {
                continue;
            };
            if !stream.can_accept() || now < pes.initial_arrival {
                continue;
            }
            let followed = self.queue.iter().skip(i + 1).any(|p| p.pid == pes.pid);
            if !followed && !pes.is_behind(now) {
                continue;
            }

            let best = if stream.format.is_video() {
                &mut video
            } else {
                &mut audio
            };
            if best.map_or(true, |j| pes.dts < self.queue[j].dts) {
                *best = Some(i);
            }
        }

        audio.or(video)
    }

    fn emit_pes(&mut self, index: usize, pcr_due: bool) {
        let now = self.clock.now();
        let pcr = self.clock.pcr();
        let pcr_pid = self.program.pcr_pid;
        let profile = self.profile;

        let Some(pes) = self.queue.get_mut(index) else {
            return;
        };
        let Some(stream) = self.program.stream_mut(pes.pid) else {
            return;
        };

        let is_start = !pes.is_started();
        if is_start && now > pes.final_arrival {
            warn!(
                "pid 0x{:04x}: pes with dts {} starts {} ticks late",
                pes.pid,
                pes.dts,
                now - pes.final_arrival
            );
        }

        let mut af = AdaptationField::default();
        if pes.pid == pcr_pid && (is_start || pcr_due) {
            af.pcr = Some(pcr);
        }
        if is_start {
            af.random_access = pes.random_access;
            af.es_priority = pes.priority;
            if stream.dvb_au && profile.is_dvb_like() {
                af.private_data = stream
                    .video_setup()
                    .map(|setup| au_information(setup, stream.dvb_au_frame_rate, pes));
            }
        }

        let af_min = af.min_len();
        let room = TS_PAYLOAD_SIZE - af_min;
        let remaining = pes.remaining();
        let (af_len, take) = if remaining < room {
            (TS_PAYLOAD_SIZE - remaining, remaining)
        } else {
            (af_min, room)
        };

        let header = PacketHeader {
            payload_unit_start: is_start,
            adaptation_field_exists: af_len > 0,
            ..PacketHeader::new(pes.pid, stream.next_cc())
        };

        let mut packet = Vec::with_capacity(TS_PACKET_SIZE);
        let mut w = BitWriter::new(&mut packet);
        header.write_to(&mut w);
        if af_len > 0 {
            af.write_to(&mut w, af_len);
        }
        packet.extend_from_slice(pes.take(take));
        debug_assert_eq!(packet.len(), TS_PACKET_SIZE);

        if !stream.tb.add_packet() {
            warn!("pid 0x{:04x}: transport buffer overflow", stream.pid);
        }
        if af.pcr.is_some() {
            stream.last_pkt_pcr = Some(pcr);
            self.program.last_pcr = Some(pcr);
        }

        if pes.is_finished() {
            if now > pes.final_arrival {
                warn!(
                    "pid 0x{:04x}: pes with dts {} finished {} ticks late",
                    pes.pid,
                    pes.dts,
                    now - pes.final_arrival
                );
            }
            self.queue.remove(index);
        }
        self.push_packet(&packet);
        self.end_slot();
    }

    /// Adaptation-field-only packet carrying a PCR on the PCR PID.
    fn emit_pcr_only(&mut self) {
        let pcr = self.clock.pcr();
        let pcr_pid = self.program.pcr_pid;
        let Some(stream) = self.program.stream_mut(pcr_pid) else {
            return;
        };

        // No payload, so the counter repeats the last one sent
        let header = PacketHeader {
            adaptation_field_exists: true,
            contains_payload: false,
            ..PacketHeader::new(stream.pid, (stream.cc + 15) & 0x0f)
        };
        let af = AdaptationField {
            pcr: Some(pcr),
            ..Default::default()
        };

        let mut packet = Vec::with_capacity(TS_PACKET_SIZE);
        let mut w = BitWriter::new(&mut packet);
        header.write_to(&mut w);
        af.write_to(&mut w, TS_PAYLOAD_SIZE);

        stream.last_pkt_pcr = Some(pcr);
        self.program.last_pcr = Some(pcr);
        self.push_packet(&packet);
        self.end_slot();
    }

    /// Null packet in CBR mode, an imaginary slot otherwise.
    fn emit_idle(&mut self) {
        if self.cbr {
            let mut packet = Vec::with_capacity(TS_PACKET_SIZE);
            let mut w = BitWriter::new(&mut packet);
            PacketHeader::new(PID_NULL, 0).write_to(&mut w);
            packet.resize(TS_PACKET_SIZE, 0xff);
            self.push_packet(&packet);
        }
        self.end_slot();
    }

    fn write_psi_packet(&mut self, packet: &[u8]) {
        if !self.sys_tb.add_packet() {
            warn!("system transport buffer overflow");
        }
        self.push_packet(packet);
        self.end_slot();
    }

    fn push_packet(&mut self, packet: &[u8]) {
        let now = self.clock.now();
        if self.profile == Profile::BluRay {
            // copy_permission_indicator 0, then the arrival time stamp
            let ats = (now & 0x3fff_ffff) as u32;
            self.out.extend_from_slice(&ats.to_be_bytes());
        }
        self.out.extend_from_slice(packet);
        self.pcr_list.push(now);
    }

    fn end_slot(&mut self) {
        self.clock.advance();
        let now = self.clock.now();

        let moved = self.sys_tb.drip(RX_SYS, now);
        if moved > 0 && !self.sys_mb.add_bits(moved) {
            warn!("system main buffer overflow");
        }
        self.sys_mb.drip(self.r_sys, now);

        for stream in &mut self.program.streams {
            stream.drip(now);
        }
    }
}

fn au_information(setup: &VideoSetup, frame_rate_code: u8, pes: &PesPacket) -> AuInformation {
    AuInformation {
        coding_format: setup.au_coding_format(),
        coding_type: pes.au.frame_type,
        ref_pic_idc: pes.au.ref_pic_idc,
        pic_struct: pes.au.pic_struct,
        pts: pes.pts,
        frame_rate_code,
        profile_idc: setup.profile_idc(),
        constraint_flags: setup.constraint_flags(),
        level_idc: setup.level_idc(),
        pulldown_info: pes.au.write_pulldown_info.then_some(pes.au.pic_struct),
    }
}
