//! Timecode burn-in.
//!
//! The eight timecode digits are written as a row of binary blocks in the
//! top-left corner of the frame: four bits per digit, most significant bit
//! first, each bit a `BLOCK_SIZE` square that is white for 1 and black for 0.
//! A downstream checker can read the timecode back from the picture alone.

use ajamedia_common::{SampleFormat, Timecode};

/// Edge length of one bit block in pixels.
pub const BLOCK_SIZE: u32 = 6;

const BITS_PER_DIGIT: u32 = 4;
const DIGITS: u32 = 8;

/// Narrowest frame able to carry the pattern.
pub const MIN_WIDTH: u32 = DIGITS * BITS_PER_DIGIT * BLOCK_SIZE;

// Video-range luma levels.
const Y8_BLACK: u8 = 16;
const Y8_WHITE: u8 = 235;
const Y10_BLACK: u32 = 64;
const Y10_WHITE: u32 = 940;
const C8_NEUTRAL: u8 = 128;
const C10_NEUTRAL: u32 = 512;

/// Whether a frame of this size can hold the pattern.
pub fn fits(width: u32, height: u32) -> bool {
    width >= MIN_WIDTH && height >= BLOCK_SIZE
}

/// Burn `timecode` into `buffer`. Returns `false` if the frame is too small
/// or the buffer is shorter than the pattern rows.
pub fn encode_timecode(
    buffer: &mut [u8],
    stride: u32,
    width: u32,
    height: u32,
    format: SampleFormat,
    timecode: &Timecode,
) -> bool {
    let stride = stride as usize;
    if !fits(width, height) || buffer.len() < stride * BLOCK_SIZE as usize {
        return false;
    }

    for (index, digit) in timecode.digits().iter().enumerate() {
        for bit in 0..BITS_PER_DIGIT {
            let on = (digit >> (BITS_PER_DIGIT - 1 - bit)) & 1 == 1;
            let block = index as u32 * BITS_PER_DIGIT + bit;
            for y in 0..BLOCK_SIZE as usize {
                let row = &mut buffer[y * stride..(y + 1) * stride];
                fill_block(row, block, format, on);
            }
        }
    }
    true
}

/// Write one row of block `block` (0-based, left to right).
fn fill_block(row: &mut [u8], block: u32, format: SampleFormat, on: bool) {
    let x0 = (block * BLOCK_SIZE) as usize;
    match format {
        SampleFormat::CharBgra => {
            let value = if on { 0xFF } else { 0x00 };
            for px in row[x0 * 4..(x0 + BLOCK_SIZE as usize) * 4].chunks_exact_mut(4) {
                px.copy_from_slice(&[value, value, value, 0xFF]);
            }
        }
        SampleFormat::CharBgr10a2 => {
            let word: u32 = if on { 0xFFFF_FFFF } else { 0xC000_0000 };
            for px in row[x0 * 4..(x0 + BLOCK_SIZE as usize) * 4].chunks_exact_mut(4) {
                px.copy_from_slice(&word.to_le_bytes());
            }
        }
        SampleFormat::CharUyvy => {
            let y = if on { Y8_WHITE } else { Y8_BLACK };
            // Blocks start on even pixels, so each pair is whole.
            for pair in row[x0 * 2..(x0 + BLOCK_SIZE as usize) * 2].chunks_exact_mut(4) {
                pair.copy_from_slice(&[C8_NEUTRAL, y, C8_NEUTRAL, y]);
            }
        }
        SampleFormat::YuvV210 => {
            // One block is exactly one 6-pixel v210 group.
            let y = if on { Y10_WHITE } else { Y10_BLACK };
            let c = C10_NEUTRAL;
            let words = [
                c | (y << 10) | (c << 20),
                y | (c << 10) | (y << 20),
                c | (y << 10) | (c << 20),
                y | (c << 10) | (y << 20),
            ];
            let offset = (x0 / 6) * 16;
            for (i, word) in words.iter().enumerate() {
                row[offset + i * 4..offset + i * 4 + 4].copy_from_slice(&word.to_le_bytes());
            }
        }
    }
}

/// Read a burned-in timecode back. Returns `None` if the frame is too small
/// or a digit decodes above 9.
pub fn decode_timecode(
    buffer: &[u8],
    stride: u32,
    width: u32,
    height: u32,
    format: SampleFormat,
) -> Option<Timecode> {
    let stride = stride as usize;
    if !fits(width, height) || buffer.len() < stride * BLOCK_SIZE as usize {
        return None;
    }
    // Sample the middle row of the blocks.
    let mid = (BLOCK_SIZE / 2) as usize;
    let row = &buffer[mid * stride..(mid + 1) * stride];

    let mut digits = [0u8; DIGITS as usize];
    for (index, digit) in digits.iter_mut().enumerate() {
        for bit in 0..BITS_PER_DIGIT {
            let block = index as u32 * BITS_PER_DIGIT + bit;
            if block_is_on(row, block, format) {
                *digit |= 1 << (BITS_PER_DIGIT - 1 - bit);
            }
        }
        if *digit > 9 {
            return None;
        }
    }

    let pair = |i: usize| digits[i] as u32 * 10 + digits[i + 1] as u32;
    Some(Timecode::new(pair(0), pair(2), pair(4), pair(6), false))
}

fn block_is_on(row: &[u8], block: u32, format: SampleFormat) -> bool {
    let x = (block * BLOCK_SIZE + BLOCK_SIZE / 2) as usize;
    match format {
        SampleFormat::CharBgra => row[x * 4 + 1] > 0x7F,
        SampleFormat::CharBgr10a2 => {
            let word = u32::from_le_bytes([row[x * 4], row[x * 4 + 1], row[x * 4 + 2], row[x * 4 + 3]]);
            (word >> 10) & 0x3FF > 0x1FF
        }
        SampleFormat::CharUyvy => row[(x / 2) * 4 + 1] > C8_NEUTRAL,
        SampleFormat::YuvV210 => {
            // Second word of the group carries the first luma in bits 0..10.
            let offset = block as usize * 16 + 4;
            let word = u32::from_le_bytes([
                row[offset],
                row[offset + 1],
                row[offset + 2],
                row[offset + 3],
            ]);
            word & 0x3FF > C10_NEUTRAL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(format: SampleFormat, width: u32, height: u32) -> (Vec<u8>, u32) {
        let stride = format.min_stride(width).unwrap();
        (vec![0u8; (stride * height) as usize], stride)
    }

    #[test]
    fn test_burn_and_read_back_all_formats() {
        let timecode = Timecode::new(12, 34, 56, 29, false);
        for format in [
            SampleFormat::CharBgra,
            SampleFormat::CharBgr10a2,
            SampleFormat::CharUyvy,
            SampleFormat::YuvV210,
        ] {
            let (mut buffer, stride) = frame(format, 1920, 1080);
            assert!(encode_timecode(&mut buffer, stride, 1920, 1080, format, &timecode));
            assert_eq!(
                decode_timecode(&buffer, stride, 1920, 1080, format),
                Some(timecode),
                "{:?}",
                format
            );
        }
    }

    #[test]
    fn test_bgra_block_layout() {
        // Digits 0,1,...: the second digit's last bit (block 7) is on.
        let timecode = Timecode::new(1, 0, 0, 0, false);
        let (mut buffer, stride) = frame(SampleFormat::CharBgra, 256, 8);
        assert!(encode_timecode(&mut buffer, stride, 256, 8, SampleFormat::CharBgra, &timecode));

        let pixel = |x: usize, y: usize| &buffer[y * stride as usize + x * 4..][..4];
        assert_eq!(pixel(0, 0), &[0, 0, 0, 0xFF]);
        assert_eq!(pixel(7 * 6, 0), &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(pixel(7 * 6 + 5, 5), &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(pixel(8 * 6, 0), &[0, 0, 0, 0xFF]);
        // Nothing below the pattern or right of it is touched.
        assert_eq!(pixel(7 * 6, 6), &[0, 0, 0, 0]);
        assert_eq!(pixel(MIN_WIDTH as usize, 0), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_small_frames_are_skipped() {
        let timecode = Timecode::new(1, 2, 3, 4, false);
        let (mut buffer, stride) = frame(SampleFormat::CharBgra, 128, 72);
        assert!(!encode_timecode(&mut buffer, stride, 128, 72, SampleFormat::CharBgra, &timecode));
        assert!(buffer.iter().all(|&b| b == 0));

        let (mut buffer, stride) = frame(SampleFormat::CharBgra, 1920, 4);
        assert!(!encode_timecode(&mut buffer, stride, 1920, 4, SampleFormat::CharBgra, &timecode));
    }

    #[test]
    fn test_blank_frame_reads_as_zero() {
        let (buffer, stride) = frame(SampleFormat::CharBgra, 1920, 8);
        assert_eq!(
            decode_timecode(&buffer, stride, 1920, 8, SampleFormat::CharBgra),
            Some(Timecode::default())
        );
    }
}
