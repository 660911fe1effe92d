//! Shared types for AJA capture and output.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::validation::{self, ValidationError};

/// A rational frame rate (e.g. 30000/1001 for 29.97 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub const FPS_23_976: FrameRate = FrameRate::new(24000, 1001);
    pub const FPS_24: FrameRate = FrameRate::new(24, 1);
    pub const FPS_25: FrameRate = FrameRate::new(25, 1);
    pub const FPS_29_97: FrameRate = FrameRate::new(30000, 1001);
    pub const FPS_30: FrameRate = FrameRate::new(30, 1);
    pub const FPS_50: FrameRate = FrameRate::new(50, 1);
    pub const FPS_59_94: FrameRate = FrameRate::new(60000, 1001);
    pub const FPS_60: FrameRate = FrameRate::new(60, 1);

    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Frames per second as a float.
    pub fn as_decimal(&self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        self.numerator as f64 / self.denominator as f64
    }

    /// Duration of a single frame. Zero for a zero numerator.
    pub fn frame_duration(&self) -> Duration {
        if self.numerator == 0 {
            return Duration::ZERO;
        }
        let nanos = 1_000_000_000u128 * self.denominator as u128 / self.numerator as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Integer frame count used for timecode (29.97 counts as 30).
    pub fn nominal_fps(&self) -> u32 {
        self.as_decimal().round() as u32
    }

    /// Whether SMPTE drop-frame counting applies (29.97 and 59.94).
    pub fn is_drop_frame_compatible(&self) -> bool {
        self.denominator == 1001 && self.numerator % 30000 == 0
    }

    /// Parse from `"30000/1001"`, `"59.94"` or `"60"`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some((num, den)) = s.split_once('/') {
            let numerator = num.trim().parse().ok()?;
            let denominator = den.trim().parse().ok()?;
            return Some(Self::new(numerator, denominator));
        }
        match s {
            "23.976" | "23.98" => return Some(Self::FPS_23_976),
            "29.97" => return Some(Self::FPS_29_97),
            "47.95" => return Some(Self::new(48000, 1001)),
            "59.94" => return Some(Self::FPS_59_94),
            _ => {}
        }
        if let Ok(fps) = s.parse::<u32>() {
            return Some(Self::new(fps, 1));
        }
        let fps = s.parse::<f64>().ok()?;
        if fps.fract() == 0.0 && fps > 0.0 && fps <= u32::MAX as f64 {
            Some(Self::new(fps as u32, 1))
        } else {
            None
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

/// SMPTE timecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
    /// Drop-frame counting (displayed with `;` before the frames field)
    #[serde(default)]
    pub drop_frame: bool,
}

impl Timecode {
    pub fn new(hours: u32, minutes: u32, seconds: u32, frames: u32, drop_frame: bool) -> Self {
        Self {
            hours,
            minutes,
            seconds,
            frames,
            drop_frame,
        }
    }

    /// Build a timecode from an absolute frame count.
    ///
    /// Drop-frame counting is only applied when requested and the rate is
    /// 29.97 or 59.94. Hours roll over at 24.
    pub fn from_frame_number(frame_number: u64, rate: FrameRate, drop_frame: bool) -> Self {
        let fps = rate.nominal_fps().max(1) as u64;
        let drop_frame = drop_frame && rate.is_drop_frame_compatible();
        let mut n = frame_number;

        if drop_frame {
            let dropped = (fps / 30) * 2;
            let frames_per_ten_minutes = fps * 600 - dropped * 9;
            let frames_per_minute = fps * 60 - dropped;
            // A drop-frame day is 144 ten-minute blocks.
            n %= frames_per_ten_minutes * 144;
            let tens = n / frames_per_ten_minutes;
            let rem = n % frames_per_ten_minutes;
            n += dropped * 9 * tens;
            if rem > dropped {
                n += dropped * ((rem - dropped) / frames_per_minute);
            }
        } else {
            n %= fps * 86_400;
        }

        let frames = (n % fps) as u32;
        let total_seconds = n / fps;
        Self {
            hours: ((total_seconds / 3600) % 24) as u32,
            minutes: ((total_seconds / 60) % 60) as u32,
            seconds: (total_seconds % 60) as u32,
            frames,
            drop_frame,
        }
    }

    /// Timecode of the frame containing `elapsed`.
    pub fn from_duration(elapsed: Duration, rate: FrameRate) -> Self {
        if rate.denominator == 0 {
            return Self::default();
        }
        let frame_number = elapsed.as_nanos() * rate.numerator as u128
            / (rate.denominator as u128 * 1_000_000_000);
        Self::from_frame_number(
            frame_number as u64,
            rate,
            rate.is_drop_frame_compatible(),
        )
    }

    /// Timecode for a wall-clock time of day.
    pub fn from_time_of_day(time: NaiveTime, rate: FrameRate) -> Self {
        let elapsed = Duration::new(
            time.num_seconds_from_midnight() as u64,
            // Leap seconds report nanosecond values above one second.
            time.nanosecond().min(999_999_999),
        );
        Self::from_duration(elapsed, rate)
    }

    /// Absolute frame count for this timecode at `rate`.
    pub fn to_frame_number(&self, rate: FrameRate) -> u64 {
        let fps = rate.nominal_fps().max(1) as u64;
        let total_seconds =
            self.hours as u64 * 3600 + self.minutes as u64 * 60 + self.seconds as u64;
        let mut n = total_seconds * fps + self.frames as u64;
        if self.drop_frame && rate.is_drop_frame_compatible() {
            let dropped = (fps / 30) * 2;
            let total_minutes = self.hours as u64 * 60 + self.minutes as u64;
            n -= dropped * (total_minutes - total_minutes / 10);
        }
        n
    }

    /// The eight decimal digits `HHMMSSFF`, most significant first.
    pub fn digits(&self) -> [u8; 8] {
        let pair = |v: u32| [((v / 10) % 10) as u8, (v % 10) as u8];
        let [h0, h1] = pair(self.hours);
        let [m0, m1] = pair(self.minutes);
        let [s0, s1] = pair(self.seconds);
        let [f0, f1] = pair(self.frames);
        [h0, h1, m0, m1, s0, s1, f0, f1]
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, separator, self.frames
        )
    }
}

/// Memory layout of an engine texture sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 8-bit 4:2:2 YUV, Cb Y0 Cr Y1 byte order
    CharUyvy,
    /// 8-bit BGRA
    CharBgra,
    /// 10-bit RGB with 2-bit alpha in a 32-bit word
    CharBgr10a2,
    /// 10-bit 4:2:2 YUV packed as v210 (6 pixels per 16 bytes)
    YuvV210,
}

impl SampleFormat {
    /// Smallest valid row pitch in bytes for `width` pixels.
    ///
    /// v210 rows are padded to groups of 48 pixels (128 bytes). Returns
    /// `None` when the pitch does not fit in a `u32`.
    pub fn min_stride(&self, width: u32) -> Option<u32> {
        match self {
            SampleFormat::CharUyvy => width.div_ceil(2).checked_mul(4),
            SampleFormat::CharBgra | SampleFormat::CharBgr10a2 => width.checked_mul(4),
            SampleFormat::YuvV210 => width.div_ceil(48).checked_mul(128),
        }
    }

    pub fn is_yuv(&self) -> bool {
        matches!(self, SampleFormat::CharUyvy | SampleFormat::YuvV210)
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, SampleFormat::CharBgra | SampleFormat::CharBgr10a2)
    }
}

/// Pixel format of frames sent to an output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputPixelFormat {
    /// 8-bit YUV 4:2:2
    #[default]
    Yuv8Bit,
    /// 10-bit YUV 4:2:2 (v210)
    Yuv10Bit,
    /// 8-bit RGBA
    Rgba8Bit,
    /// 10-bit RGB with 2-bit alpha
    Rgb10Bit,
}

impl OutputPixelFormat {
    /// Sample layout of frames in this format.
    pub fn sample_format(&self) -> SampleFormat {
        match self {
            OutputPixelFormat::Yuv8Bit => SampleFormat::CharUyvy,
            OutputPixelFormat::Yuv10Bit => SampleFormat::YuvV210,
            OutputPixelFormat::Rgba8Bit => SampleFormat::CharBgra,
            OutputPixelFormat::Rgb10Bit => SampleFormat::CharBgr10a2,
        }
    }

    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "yuv8" | "yuv8bit" | "8bit-yuv" => Some(OutputPixelFormat::Yuv8Bit),
            "yuv10" | "yuv10bit" | "10bit-yuv" | "v210" => Some(OutputPixelFormat::Yuv10Bit),
            "rgba8" | "rgba8bit" | "8bit-rgba" | "bgra" => Some(OutputPixelFormat::Rgba8Bit),
            "rgb10" | "rgb10bit" | "10bit-rgb" => Some(OutputPixelFormat::Rgb10Bit),
            _ => None,
        }
    }
}

/// What the output port carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// Fill (colour) signal only
    #[default]
    FillOnly,
    /// Fill on the primary link, key (alpha) on the secondary
    FillAndKey,
}

/// Which scan lines of an interlaced frame a sample holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterlaceField {
    /// Progressive, all lines
    #[default]
    None,
    /// Lines 0, 2, 4, ...
    Even,
    /// Lines 1, 3, 5, ...
    Odd,
}

/// Identifier of an output port: `device<N>/single<M>`.
///
/// Port indices are 1-based, matching the connector labels on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortName {
    pub device_index: u32,
    pub port_index: u32,
}

impl PortName {
    pub fn new(device_index: u32, port_index: u32) -> Self {
        Self {
            device_index,
            port_index,
        }
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device{}/single{}", self.device_index, self.port_index)
    }
}

impl FromStr for PortName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validation::parse_port_name(s)
    }
}

/// Output configuration for one capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output port, e.g. `device0/single1`
    #[serde(default = "default_port")]
    pub port: String,
    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,
    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub frame_rate: FrameRate,
    #[serde(default)]
    pub pixel_format: OutputPixelFormat,
    #[serde(default)]
    pub output_type: OutputType,
    /// Block the render thread until the device is ready for the next frame
    #[serde(default)]
    pub wait_for_sync_event: bool,
    /// Log a warning when the device reports dropped frames
    #[serde(default = "default_log_drop_frame")]
    pub log_drop_frame: bool,
    /// Burn the frame timecode into the top-left texels
    #[serde(default)]
    pub encode_timecode_in_texel: bool,
}

fn default_port() -> String {
    "device0/single1".to_string()
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_log_drop_frame() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            width: default_width(),
            height: default_height(),
            frame_rate: FrameRate::default(),
            pixel_format: OutputPixelFormat::default(),
            output_type: OutputType::default(),
            wait_for_sync_event: false,
            log_drop_frame: default_log_drop_frame(),
            encode_timecode_in_texel: false,
        }
    }
}

impl OutputConfig {
    /// Parsed output port.
    pub fn port_name(&self) -> Result<PortName, ValidationError> {
        self.port.parse()
    }

    /// Row pitch in bytes of an output frame.
    ///
    /// Saturates for widths past the validated range.
    pub fn stride(&self) -> u32 {
        self.pixel_format
            .sample_format()
            .min_stride(self.width)
            .unwrap_or(u32::MAX)
    }

    /// Size in bytes of an output frame.
    pub fn frame_size(&self) -> usize {
        self.stride() as usize * self.height as usize
    }

    pub fn uses_key(&self) -> bool {
        self.output_type == OutputType::FillAndKey
    }
}
