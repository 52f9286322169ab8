//! Leaky-bucket buffers of the transport stream system target decoder.

use super::types::{PCR_HZ, TS_PACKET_SIZE};

/// Bits entering a buffer for each transport packet.
pub const PACKET_BITS: u64 = 8 * TS_PACKET_SIZE as u64;

#[derive(Debug, Clone, Copy)]
struct Leak {
    origin: u64,
    rate: u64,
    bytes: u64,
}

/// A T-STD buffer.
///
/// Bits leave at a constant rate, one byte at a time. The number of bytes
/// removable since the buffer was primed is recomputed from the clock on every
/// call, so long runs never accumulate rounding error.
#[derive(Debug, Clone)]
pub struct Buffer {
    size: u64,
    fill: u64,
    peak: u64,
    leak: Option<Leak>,
}

impl Buffer {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            fill: 0,
            peak: 0,
            leak: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn fill(&self) -> u64 {
        self.fill
    }

    /// Highest fill seen since creation.
    pub fn peak(&self) -> u64 {
        self.peak
    }

    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    pub fn resize(&mut self, size: u64) {
        self.size = size;
    }

    /// Adds one transport packet. Returns false when the buffer overflows.
    pub fn add_packet(&mut self) -> bool {
        self.add_bits(PACKET_BITS)
    }

    /// Returns false when the buffer overflows.
    pub fn add_bits(&mut self, bits: u64) -> bool {
        self.fill += bits;
        self.peak = self.peak.max(self.fill);
        self.fill <= self.size
    }

    /// Removes whatever has leaked out at `rate` bits/s up to `now` (27 MHz)
    /// and returns the number of bits removed.
    pub fn drip(&mut self, rate: u64, now: u64) -> u64 {
        if rate == 0 {
            return 0;
        }

        let leak = match self.leak {
            Some(leak) if leak.rate == rate && now >= leak.origin => leak,
            Some(_) => {
                self.leak = Some(Leak {
                    origin: now,
                    rate,
                    bytes: 0,
                });
                return 0;
            }
            None => {
                // The first byte is already on its way out.
                self.leak = Some(Leak {
                    origin: now,
                    rate,
                    bytes: 0,
                });
                return self.remove(8);
            }
        };

        let total = ((now - leak.origin) as u128 * rate as u128 / (8 * PCR_HZ as u128)) as u64;
        let bytes = total - leak.bytes;
        self.leak = Some(Leak {
            bytes: total,
            ..leak
        });
        self.remove(bytes * 8)
    }

    fn remove(&mut self, bits: u64) -> u64 {
        let removed = bits.min(self.fill);
        self.fill -= removed;
        removed
    }
}
