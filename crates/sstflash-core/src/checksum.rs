//! Integrity checks returned by the write commands
//!
//! `WRBK` answers with an 8-bit additive sum of the block, `WRSECT` with a
//! CRC16/XMODEM (poly 0x1021, init 0, no reflection) of the sector. Both
//! sides compute the same function so a mismatch means the data in flash
//! differs from what the host sent.

/// Sum of all bytes modulo 256
pub fn additive(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// CRC16/XMODEM digest
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    crc16::State::<crc16::XMODEM>::calculate(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_crc(data: &[u8]) -> u16 {
        let mut crc: u16 = 0;
        for &byte in data {
            crc ^= (byte as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ 0x1021
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    #[test]
    fn test_crc_check_value() {
        assert_eq!(crc16_xmodem(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_crc_sector_vectors() {
        assert_eq!(crc16_xmodem(&[0u8; 4096]), 0);
        let ones = [0xFFu8; 4096];
        assert_eq!(crc16_xmodem(&ones), reference_crc(&ones));

        let mut ramp = [0u8; 4096];
        for (i, b) in ramp.iter_mut().enumerate() {
            *b = (i * 7) as u8;
        }
        assert_eq!(crc16_xmodem(&ramp), reference_crc(&ramp));
    }

    #[test]
    fn test_additive() {
        assert_eq!(additive(&[]), 0);
        assert_eq!(additive(&[1, 2, 3]), 6);
        assert_eq!(additive(&[0xFF; 256]), 0);
        assert_eq!(additive(&[0x80, 0x81]), 0x01);

        let block: [u8; 256] = core::array::from_fn(|i| i as u8);
        let expected = block.iter().map(|&b| b as u32).sum::<u32>() % 256;
        assert_eq!(additive(&block) as u32, expected);
    }
}
