//! The 27 MHz system clock, derived from the number of packets written.

use super::types::{PCR_BYTE_OFFSET, PCR_HZ, TS_CLOCK_START, TS_PACKET_SIZE};

/// Packets a PCR decision looks ahead, so that a PAT+PMT pair taking the next
/// slots cannot push the PCR gap past its period.
const PCR_LOOKAHEAD: u64 = 3;

#[derive(Debug, Clone)]
pub struct Clock {
    muxrate: u64,
    packets: u64,
}

impl Clock {
    pub fn new(muxrate: u64) -> Self {
        Self { muxrate, packets: 0 }
    }

    pub fn muxrate(&self) -> u64 {
        self.muxrate
    }

    pub fn packets_written(&self) -> u64 {
        self.packets
    }

    /// Clock value at byte `offset` of packet number `packets`.
    ///
    /// Blu-ray arrival headers are not counted: the muxrate describes the
    /// 188-byte stream.
    pub fn at(&self, packets: u64, offset: u64) -> u64 {
        let bits = (packets as u128 * TS_PACKET_SIZE as u128 + offset as u128) * 8;
        let rate = self.muxrate as u128;
        let ticks = (bits * PCR_HZ as u128 + rate / 2) / rate;
        ticks as u64 + TS_CLOCK_START
    }

    /// Clock value at the start of the next packet.
    pub fn now(&self) -> u64 {
        self.at(self.packets, 0)
    }

    /// PCR value to write into the next packet.
    pub fn pcr(&self) -> u64 {
        self.at(self.packets, PCR_BYTE_OFFSET)
    }

    /// Whether a PCR must go out now to keep the gap to `last` within `period`.
    pub fn pcr_due(&self, last: u64, period: u64) -> bool {
        self.at(self.packets + PCR_LOOKAHEAD, PCR_BYTE_OFFSET) - last > period
    }

    /// Clock value one packet ahead.
    pub fn next(&self) -> u64 {
        self.at(self.packets + 1, 0)
    }

    pub fn advance(&mut self) {
        self.packets += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clock_starts_at_ten_seconds() {
        let clock = Clock::new(15_000_000);
        assert_eq!(clock.now(), TS_CLOCK_START);
    }

    #[test]
    fn test_packet_duration() {
        let mut clock = Clock::new(1_504_000);
        // 1504 bits at 1.504 Mbit/s take exactly 1 ms.
        clock.advance();
        assert_eq!(clock.now() - TS_CLOCK_START, 27_000);
        assert_eq!(clock.pcr() - clock.now(), 1_580);
    }

    #[test]
    fn test_clock_is_computed_not_accumulated() {
        let mut clock = Clock::new(19_392_658);
        for _ in 0..1_000_000 {
            clock.advance();
        }
        let exact = 1_000_000u128 * 188 * 8 * 27_000_000 / 19_392_658;
        let diff = (clock.now() - TS_CLOCK_START) as i128 - exact as i128;
        assert!(diff.abs() <= 1);
    }

    #[test]
    fn test_pcr_due_looks_ahead() {
        let mut clock = Clock::new(1_504_000);
        let last = clock.pcr();
        let period = 40 * 27_000;
        // Packets are 1 ms apart: due once three packets ahead would exceed 40 ms.
        for _ in 0..37 {
            assert!(!clock.pcr_due(last, period));
            clock.advance();
        }
        assert!(!clock.pcr_due(last, period));
        clock.advance();
        assert!(clock.pcr_due(last, period));
    }
}
