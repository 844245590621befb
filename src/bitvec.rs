// src/bitvec.rs
//! Single-bit access into a byte buffer, addressed by global block index.
//! Bit `i` lives in byte `i / 8` at position `i % 8` (LSB first).
//! Callers guarantee `index < buffer.len() * 8`.

pub fn set_bit(buffer: &mut [u8], index: usize) {
    buffer[index / 8] |= 1 << (index % 8);
}

pub fn unset_bit(buffer: &mut [u8], index: usize) {
    buffer[index / 8] &= !(1 << (index % 8));
}

pub fn get_bit(buffer: &[u8], index: usize) -> u8 {
    (buffer[index / 8] >> (index % 8)) & 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_unset() {
        let mut buf = [0u8; 4];
        set_bit(&mut buf, 0);
        set_bit(&mut buf, 9);
        set_bit(&mut buf, 31);
        assert_eq!(buf, [0b0000_0001, 0b0000_0010, 0, 0b1000_0000]);
        assert_eq!(get_bit(&buf, 9), 1);
        assert_eq!(get_bit(&buf, 10), 0);

        unset_bit(&mut buf, 9);
        assert_eq!(get_bit(&buf, 9), 0);
        assert_eq!(buf[1], 0);
        assert_eq!(get_bit(&buf, 31), 1);
    }

    #[test]
    fn neighbours_untouched() {
        let mut buf = [0xFFu8; 2];
        unset_bit(&mut buf, 12);
        assert_eq!(buf, [0xFF, 0b1110_1111]);
        set_bit(&mut buf, 12);
        assert_eq!(buf, [0xFF, 0xFF]);
    }
}
