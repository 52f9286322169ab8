use crate::error::{MuxError, Result};

/// An MSB-first bit writer appending to a growable byte buffer.
///
/// Bits are packed exactly as they appear on the wire. Whole bytes are
/// committed to the underlying `Vec` as soon as they fill up; a partial byte
/// stays in the writer until [`BitWriter::flush`] pads it with zeros.
///
/// Fields whose value is only known later (section lengths, CRCs) are
/// patched in place with [`BitWriter::rewrite`].
///
/// Example:
/// ```
/// use tsmux::utils::BitWriter;
///
/// let mut buf = Vec::new();
/// let mut w = BitWriter::new(&mut buf);
/// w.write(3, 0b101);
/// w.write(5, 0b10011);
/// w.flush();
/// assert_eq!(buf, vec![0b1011_0011]);
/// ```
pub struct BitWriter<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
    cache: u8,
    cache_bits: u8,
}

impl<'a> BitWriter<'a> {
    /// Creates a writer appending at the current end of `buf`.
    ///
    /// Bit positions reported by the writer are relative to that starting point.
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        BitWriter {
            buf,
            start,
            cache: 0,
            cache_bits: 0,
        }
    }

    /// Writes the `n` least significant bits of `value`, most significant first.
    pub fn write(&mut self, n: u32, value: u64) {
        debug_assert!(n <= 64);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        self.cache = (self.cache << 1) | bit as u8;
        self.cache_bits += 1;
        if self.cache_bits == 8 {
            self.buf.push(self.cache);
            self.cache = 0;
            self.cache_bits = 0;
        }
    }

    /// Copies raw bytes. Takes the fast path when the writer is byte aligned.
    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.cache_bits == 0 {
            self.buf.extend_from_slice(data);
        } else {
            for &byte in data {
                self.write(8, byte as u64);
            }
        }
    }

    /// Pads the current byte with zero bits. No-op when already aligned.
    pub fn flush(&mut self) {
        if self.cache_bits > 0 {
            let pad = 8 - self.cache_bits;
            self.buf.push(self.cache << pad);
            self.cache = 0;
            self.cache_bits = 0;
        }
    }

    /// Number of bits written through this writer, including uncommitted ones.
    pub fn position_bits(&self) -> usize {
        (self.buf.len() - self.start) * 8 + self.cache_bits as usize
    }

    /// Whether the next bit starts a new byte.
    pub fn is_aligned(&self) -> bool {
        self.cache_bits == 0
    }

    /// Overwrites `n` already committed bits starting at `bit_pos`.
    ///
    /// # Panics
    ///
    /// Panics if the range reaches past the bytes committed so far.
    pub fn rewrite(&mut self, bit_pos: usize, n: u32, value: u64) {
        let committed = (self.buf.len() - self.start) * 8;
        assert!(
            bit_pos + n as usize <= committed,
            "rewrite of {} bits at {} past committed length {}",
            n,
            bit_pos,
            committed
        );

        for i in 0..n as usize {
            let bit = (value >> (n as usize - 1 - i)) & 1;
            let pos = bit_pos + i;
            let byte = self.start + pos / 8;
            let mask = 0x80u8 >> (pos % 8);
            if bit == 1 {
                self.buf[byte] |= mask;
            } else {
                self.buf[byte] &= !mask;
            }
        }
    }
}

/// A bit-level reader used to inspect produced packets and sections.
///
/// Example:
/// ```
/// use tsmux::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);   // 1
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011); // 011
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit from the stream.
    ///
    /// Returns error if end of data is reached.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(MuxError::InvalidData("reached end of data".into()));
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads up to 32 bits as a big-endian number.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(MuxError::InvalidData("too many bits requested".into()));
        }
        Ok(self.read_bits_u64(n)? as u32)
    }

    /// Reads up to 64 bits, for fields such as the 33-bit PCR base.
    pub fn read_bits_u64(&mut self, n: u32) -> Result<u64> {
        if n > 64 {
            return Err(MuxError::InvalidData("too many bits requested".into()));
        }

        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Ok(value)
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        for _ in 0..n {
            self.read_bit()?;
        }
        Ok(())
    }

    /// Aligns reader to next byte boundary by skipping remaining bits in current byte.
    pub fn align_byte(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    /// Returns number of bits available to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len().saturating_sub(self.byte_offset)) * 8 - self.bit_offset as usize
    }
}
