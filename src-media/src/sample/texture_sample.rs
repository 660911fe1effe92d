//! Texture sample populated from a hardware video frame.

use std::time::Duration;

use ajamedia_common::{FrameRate, InterlaceField, SampleFormat, Timecode};

use super::color::{ColorMatrix, YUV_TO_RGB_REC709_FULL};
use super::{SampleError, SampleTiming, VideoFrameData};

/// One decoded video frame ready for engine consumption.
///
/// The pixel buffer is owned and reused across pool checkouts. Once
/// populated, `stride * height <= buffer().len()` and `stride` is at least
/// the minimum row pitch of `format` at `width`. A failed initialize or
/// update leaves pixels, layout and timing as they were; only the sRGB flag
/// passed to the call is kept.
#[derive(Debug, Default)]
pub struct TextureSample {
    buffer: Vec<u8>,
    stride: u32,
    width: u32,
    height: u32,
    /// `None` until populated
    format: Option<SampleFormat>,
    time: Duration,
    frame_rate: FrameRate,
    timecode: Option<Timecode>,
    /// Whether the pixels are sRGB encoded and need linearising
    is_srgb: bool,
    field: InterlaceField,
}

impl TextureSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty sample whose buffer can hold `bytes` without growing.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    /// Copy a full progressive frame into the sample.
    pub fn initialize_progressive(
        &mut self,
        frame: &VideoFrameData<'_>,
        format: SampleFormat,
        timing: &SampleTiming,
        is_srgb: bool,
    ) -> Result<(), SampleError> {
        self.is_srgb = is_srgb;
        let required = check_frame(frame, format)?;

        self.buffer.clear();
        self.buffer.extend_from_slice(&frame.buffer[..required]);
        self.set_properties(
            frame.stride,
            frame.width,
            frame.height,
            format,
            timing,
            InterlaceField::None,
        );
        Ok(())
    }

    /// Copy only the even or odd scan lines of an interlaced frame.
    ///
    /// The result is a half-height progressive sample. Rows keep the source
    /// stride and are packed back to back, so row `n` of the sample is source
    /// row `2n` (even field) or `2n + 1` (odd field).
    pub fn initialize_interlaced_halved(
        &mut self,
        frame: &VideoFrameData<'_>,
        format: SampleFormat,
        timing: &SampleTiming,
        take_even_field: bool,
        is_srgb: bool,
    ) -> Result<(), SampleError> {
        self.is_srgb = is_srgb;
        check_frame(frame, format)?;

        let (first_row, field_rows) = if take_even_field {
            (0, frame.height.div_ceil(2))
        } else {
            (1, frame.height / 2)
        };
        if field_rows == 0 {
            return Err(SampleError::InvalidDimensions {
                width: frame.width,
                height: frame.height,
            });
        }

        let stride = frame.stride as usize;
        self.buffer.clear();
        self.buffer.reserve(stride * field_rows as usize);
        for row in (first_row..frame.height as usize).step_by(2) {
            let start = row * stride;
            self.buffer
                .extend_from_slice(&frame.buffer[start..start + stride]);
        }

        let field = if take_even_field {
            InterlaceField::Even
        } else {
            InterlaceField::Odd
        };
        self.set_properties(
            frame.stride,
            frame.width,
            field_rows,
            format,
            timing,
            field,
        );
        Ok(())
    }

    /// Re-tag the sample without touching its pixels.
    ///
    /// The new layout must still fit the buffer already held by the sample.
    pub fn update_properties(
        &mut self,
        stride: u32,
        width: u32,
        height: u32,
        format: SampleFormat,
        timing: &SampleTiming,
        is_srgb: bool,
    ) -> Result<(), SampleError> {
        self.is_srgb = is_srgb;
        check_layout(stride, width, height, format)?;
        let required = stride as usize * height as usize;
        if self.buffer.len() < required {
            return Err(SampleError::BufferMismatch {
                expected: required,
                actual: self.buffer.len(),
            });
        }

        let field = self.field;
        self.set_properties(stride, width, height, format, timing, field);
        Ok(())
    }

    fn set_properties(
        &mut self,
        stride: u32,
        width: u32,
        height: u32,
        format: SampleFormat,
        timing: &SampleTiming,
        field: InterlaceField,
    ) {
        self.stride = stride;
        self.width = width;
        self.height = height;
        self.format = Some(format);
        self.time = timing.time;
        self.frame_rate = timing.frame_rate;
        self.timecode = timing.timecode;
        self.field = field;
    }

    /// Whether the renderer must linearise the pixels.
    pub fn is_output_srgb(&self) -> bool {
        self.is_srgb
    }

    /// Matrix used to convert YUV samples to RGB.
    ///
    /// Always full-range Rec.709; no colour-space negotiation happens here.
    pub fn yuv_to_rgb_matrix(&self) -> &'static ColorMatrix {
        &YUV_TO_RGB_REC709_FULL
    }

    /// Clear metadata and pixels, keeping the buffer allocation.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.stride = 0;
        self.width = 0;
        self.height = 0;
        self.format = None;
        self.time = Duration::ZERO;
        self.frame_rate = FrameRate::default();
        self.timecode = None;
        self.is_srgb = false;
        self.field = InterlaceField::None;
    }

    pub fn is_populated(&self) -> bool {
        self.format.is_some()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Bytes the buffer can hold without reallocating.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// One row of pixels including stride padding.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride as usize;
        self.buffer.get(start..start + self.stride as usize)
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> Option<SampleFormat> {
        self.format
    }

    pub fn time(&self) -> Duration {
        self.time
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn timecode(&self) -> Option<Timecode> {
        self.timecode
    }

    pub fn field(&self) -> InterlaceField {
        self.field
    }
}

fn check_layout(
    stride: u32,
    width: u32,
    height: u32,
    format: SampleFormat,
) -> Result<(), SampleError> {
    if width == 0 || height == 0 {
        return Err(SampleError::InvalidDimensions { width, height });
    }
    let min = format
        .min_stride(width)
        .ok_or(SampleError::InvalidDimensions { width, height })?;
    if stride < min {
        return Err(SampleError::InvalidStride { stride, min });
    }
    Ok(())
}

/// Validate a source frame, returning the number of bytes it covers.
fn check_frame(frame: &VideoFrameData<'_>, format: SampleFormat) -> Result<usize, SampleError> {
    check_layout(frame.stride, frame.width, frame.height, format)?;
    let required = frame.stride as usize * frame.height as usize;
    if frame.buffer.len() < required {
        return Err(SampleError::BufferMismatch {
            expected: required,
            actual: frame.buffer.len(),
        });
    }
    Ok(required)
}
