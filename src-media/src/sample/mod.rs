//! Texture samples built from hardware video frames.
//!
//! A [`TextureSample`] is a self-describing, reusable video frame ready for
//! the renderer: pixel buffer plus layout, timing and colour metadata. Samples
//! are checked out of a fixed-capacity [`TextureSamplePool`] so the per-frame
//! path never allocates once the pool is warm.
//!
//! ```text
//! hardware frame (borrowed)
//!        │
//!        ▼
//! TextureSample::initialize_progressive / initialize_interlaced_halved
//!        │
//!        ▼
//! PooledSample ──► renderer ──► drop (reset + back to pool)
//! ```

pub mod color;
pub mod pool;
pub mod texture_sample;

use std::fmt;
use std::time::Duration;

use ajamedia_common::{FrameRate, Timecode};

pub use color::{ColorMatrix, YUV_OFFSET_10BIT, YUV_OFFSET_8BIT, YUV_TO_RGB_REC709_FULL};
pub use pool::{PoolStats, PooledSample, TextureSamplePool};
pub use texture_sample::TextureSample;

/// A raw video frame as delivered by the hardware channel.
///
/// Borrowed for the duration of one conversion call only.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrameData<'a> {
    /// Pixel bytes, `stride * height` at minimum
    pub buffer: &'a [u8],
    /// Row pitch in bytes
    pub stride: u32,
    pub width: u32,
    pub height: u32,
}

impl<'a> VideoFrameData<'a> {
    pub fn new(buffer: &'a [u8], stride: u32, width: u32, height: u32) -> Self {
        Self {
            buffer,
            stride,
            width,
            height,
        }
    }
}

/// Presentation timing attached to a sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleTiming {
    /// Sample time in the player's own clock
    pub time: Duration,
    /// Frame rate of the media producing the sample
    pub frame_rate: FrameRate,
    pub timecode: Option<Timecode>,
}

impl SampleTiming {
    pub fn new(time: Duration, frame_rate: FrameRate, timecode: Option<Timecode>) -> Self {
        Self {
            time,
            frame_rate,
            timecode,
        }
    }
}

/// Error type for sample operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    /// The source buffer is smaller than `stride * height`
    BufferMismatch { expected: usize, actual: usize },
    /// The row pitch cannot hold a full row of the declared format
    InvalidStride { stride: u32, min: u32 },
    /// Zero width or height, or no rows left in the requested field
    InvalidDimensions { width: u32, height: u32 },
    /// Every sample in the pool is checked out
    PoolExhausted { capacity: usize },
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::BufferMismatch { expected, actual } => write!(
                f,
                "Buffer size mismatch: expected at least {} bytes, got {}",
                expected, actual
            ),
            SampleError::InvalidStride { stride, min } => {
                write!(f, "Invalid stride: {} bytes (min {})", stride, min)
            }
            SampleError::InvalidDimensions { width, height } => {
                write!(f, "Invalid dimensions: {}x{}", width, height)
            }
            SampleError::PoolExhausted { capacity } => {
                write!(f, "Sample pool exhausted ({} samples in use)", capacity)
            }
        }
    }
}

impl std::error::Error for SampleError {}
