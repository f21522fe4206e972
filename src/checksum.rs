//! Internet checksum (RFC 1071), shared by the TCP and ICMP builders.

/// One's-complement checksum over `data` read as big-endian 16-bit words.
/// A trailing odd byte is padded with a zero byte.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    if let [last] = words.remainder() {
        sum = sum.wrapping_add((*last as u32) << 8);
    }

    // two folds are enough for anything shorter than 2^16 words
    sum = (sum >> 16) + (sum & 0xFFFF);
    sum += sum >> 16;

    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_give_all_ones() {
        assert_eq!(checksum(&[0u8; 20]), 0xFFFF);
    }

    #[test]
    fn all_ones_fold_to_zero() {
        assert_eq!(checksum(&[0xFFu8; 20]), 0);
    }

    #[test]
    fn rfc1071_worked_example() {
        // RFC 1071 section 3: sum of these words is 0xddf2
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&data), !0xddf2);
    }

    #[test]
    fn known_ipv4_header() {
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(checksum(&header), 0xb861);
    }

    #[test]
    fn odd_byte_is_high_order() {
        assert_eq!(checksum(&[0xAB]), !0xAB00);
        assert_eq!(checksum(&[0x12, 0x34, 0x56]), !(0x1234u16 + 0x5600));
    }

    #[test]
    fn embedded_checksum_validates_to_zero() {
        let mut data = [
            0x45, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06, 0x00, 0x00, 0xac, 0x10,
            0x0a, 0x63, 0xac, 0x10, 0x0a, 0x0c,
        ];
        let sum = checksum(&data);
        data[10..12].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(checksum(&data), 0);
    }

    #[test]
    fn carries_are_folded() {
        // 0xFFFF + 0x0001 overflows 16 bits once
        assert_eq!(checksum(&[0xFF, 0xFF, 0x00, 0x01]), !0x0001);
    }
}
