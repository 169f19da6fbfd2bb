//! Buffer layout shared by `rewrite`, novel prefixes and [`BufferSource`].
//!
//! A buffer carries no framing of its own. Each draw of `n` bits occupies the
//! next `ceil(n / 8)` bytes, read big-endian and masked down to `n` bits, so
//! how a buffer splits into draws is decided entirely by whoever reads it.

use byteorder::{BigEndian, ByteOrder};

use crate::data::{mask, Draw, DrawSource};

/// Number of bytes a draw of `n_bits` bits occupies in a buffer.
pub fn bytes_for_bits(n_bits: u32) -> usize {
    ((n_bits + 7) / 8) as usize
}

/// Read a draw of `n_bits` bits from the front of `buffer`.
/// Returns the masked value and the number of bytes consumed, or `None` if the
/// buffer is too short.
pub fn read_draw(buffer: &[u8], n_bits: u32) -> Option<(u64, usize)> {
    let n_bytes = bytes_for_bits(n_bits);
    if n_bytes == 0 || buffer.len() < n_bytes {
        return None;
    }
    let raw = BigEndian::read_uint(&buffer[..n_bytes], n_bytes);
    Some((raw & mask(n_bits), n_bytes))
}

/// Append the canonical encoding of `value` as an `n_bits` draw.
pub fn write_draw(out: &mut Vec<u8>, n_bits: u32, value: u64) {
    let n_bytes = bytes_for_bits(n_bits);
    let start = out.len();
    out.resize(start + n_bytes, 0);
    BigEndian::write_uint(&mut out[start..], value & mask(n_bits), n_bytes);
}

/// Encode a sequence of draws (such as a novel prefix) as a buffer.
pub fn encode_draws(draws: &[Draw]) -> Vec<u8> {
    let mut out = Vec::with_capacity(draws.iter().map(|d| bytes_for_bits(d.bit_width)).sum());
    for draw in draws {
        write_draw(&mut out, draw.bit_width, draw.value);
    }
    out
}

/// A [`DrawSource`] that replays a fixed buffer and overruns once it is used up.
///
/// Forced draws still take up their bytes but yield the forced value.
#[derive(Debug, Clone)]
pub struct BufferSource<'a> {
    buffer: &'a [u8],
    index: usize,
    draws: Vec<Draw>,
}

impl<'a> BufferSource<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            index: 0,
            draws: Vec::new(),
        }
    }

    /// Bytes consumed so far
    pub fn index(&self) -> usize {
        self.index
    }

    /// Draws handed out so far
    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.buffer.len()
    }
}

impl<'a> DrawSource for BufferSource<'a> {
    fn draw_bits(&mut self, n_bits: u32, forced: Option<u64>) -> Option<u64> {
        let (read, n_bytes) = read_draw(&self.buffer[self.index..], n_bits)?;
        self.index += n_bytes;
        let draw = match forced {
            Some(value) => Draw::forced(n_bits, value & mask(n_bits)),
            None => Draw::new(n_bits, read),
        };
        self.draws.push(draw);
        Some(draw.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_for_bits() {
        assert_eq!(bytes_for_bits(1), 1);
        assert_eq!(bytes_for_bits(8), 1);
        assert_eq!(bytes_for_bits(9), 2);
        assert_eq!(bytes_for_bits(64), 8);
    }

    #[test]
    fn test_read_draw_masks_to_bit_width() {
        assert_eq!(read_draw(&[0xff], 4), Some((0x0f, 1)));
        assert_eq!(read_draw(&[0x01, 0x02, 0x03], 16), Some((0x0102, 2)));
        assert_eq!(read_draw(&[0x01], 16), None);
        assert_eq!(read_draw(&[], 1), None);
    }

    #[test]
    fn test_encode_draws_uses_big_endian_chunks() {
        let draws = vec![Draw::new(8, 3), Draw::new(12, 0x0abc), Draw::forced(1, 1)];
        assert_eq!(encode_draws(&draws), vec![0x03, 0x0a, 0xbc, 0x01]);
    }

    #[test]
    fn test_buffer_source_overruns_when_empty() {
        let buffer = [0x05, 0xff];
        let mut source = BufferSource::new(&buffer);

        assert_eq!(source.draw_bits(8, None), Some(5));
        assert_eq!(source.draw_bits(2, Some(1)), Some(1));
        assert!(source.is_exhausted());
        assert_eq!(source.draw_bits(8, None), None);
        assert_eq!(source.index(), 2);
        assert_eq!(source.draws(), &[Draw::new(8, 5), Draw::forced(2, 1)][..]);
    }
}
