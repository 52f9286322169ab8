/// CRC32 implementation specifically for MPEG-2 TS PSI tables
/// Based on ITU-T H.222.0 / ISO/IEC 13818-1
/// Polynomial: x32 + x26 + x23 + x22 + x16 + x12 + x11 + x10 + x8 + x7 + x5 + x4 + x2 + x + 1
/// Initial value: 0xFFFFFFFF, no reflection, no final xor

const CRC32_MPEG2: u32 = 0x04C11DB7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if (crc & 0x80000000) != 0 {
                (crc << 1) ^ CRC32_MPEG2
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// MPEG-2 CRC32 calculator used to protect PSI/SI sections
///
/// The lookup table is built at compile time, so the calculator carries no state.
pub struct Crc32Mpeg2;

impl Crc32Mpeg2 {
    /// Calculates the CRC32 checksum for the given data using the MPEG-2 algorithm
    ///
    /// Running it over a section followed by its own CRC yields zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use tsmux::utils::Crc32Mpeg2;
    ///
    /// assert_eq!(Crc32Mpeg2::calculate(b"123456789"), 0x0376E6E7);
    /// ```
    pub fn calculate(data: &[u8]) -> u32 {
        let mut crc = 0xFFFFFFFF;
        for &byte in data {
            let index = ((crc >> 24) ^ (byte as u32)) & 0xFF;
            crc = (crc << 8) ^ TABLE[index as usize];
        }
        crc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_crc32_mpeg2() {
        // Check value of the CRC-32/MPEG-2 catalogue entry
        assert_eq!(Crc32Mpeg2::calculate(b"123456789"), 0x0376E6E7);

        // Test vector from STMicroelectronics community forum post
        assert_eq!(Crc32Mpeg2::calculate(&[0x01, 0x01]), 0xD66FB816);
    }

    #[test]
    fn test_pat_section_crc() {
        let mut pat = vec![
            0x00, // Table ID (PAT)
            0xB0, 0x0D, // Section syntax indicator, section length 13
            0x00, 0x01, // Transport stream ID
            0xC1, // Version 0, current/next
            0x00, 0x00, // Section number, last section number
            0x00, 0x01, // Program number
            0xF0, 0x00, // Program map PID 0x1000
        ];

        let crc = Crc32Mpeg2::calculate(&pat);
        assert_eq!(crc, 0x2AB104B2);

        pat.extend_from_slice(&crc.to_be_bytes());
        assert_eq!(Crc32Mpeg2::calculate(&pat), 0);
    }
}
