//! Seams between a capture session and the output hardware.
//!
//! An [`OutputDevice`] validates configurations and opens channels. The
//! channel receives frames; everything it has to say back (readiness,
//! completions, drops, faults) goes through the [`ChannelEventSink`] handed
//! to [`OutputDevice::open`].
//!
//! Sink methods may be called from any thread, including from inside
//! `open`. They are never called from inside [`OutputChannel::submit`] or
//! [`OutputChannel::close`], since the session holds its channel lock there.

use std::any::Any;
use std::sync::Arc;

use ajamedia_common::{OutputConfig, OutputPixelFormat, PortName, SampleFormat, Timecode};

use super::CaptureError;

/// Opaque per-frame value passed through to the device untouched.
pub type CaptureUserData = Arc<dyn Any + Send + Sync>;

/// What a device can do, used for validation and reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    /// Number of SDI outputs, ports are numbered from 1
    pub port_count: u32,
    /// Whether a second port can carry the key signal
    pub supports_key: bool,
    pub pixel_formats: Vec<OutputPixelFormat>,
    pub max_width: u32,
    pub max_height: u32,
}

impl DeviceCapabilities {
    /// Check `config` against these capabilities.
    pub fn check(&self, port: PortName, config: &OutputConfig) -> Result<(), CaptureError> {
        if port.port_index > self.port_count {
            return Err(CaptureError::Configuration(format!(
                "Port {} does not exist (device has {} outputs)",
                port, self.port_count
            )));
        }
        if config.uses_key() {
            if !self.supports_key {
                return Err(CaptureError::Configuration(
                    "Device does not support key/fill output".to_string(),
                ));
            }
            // The key signal goes out on the next port.
            if port.port_index + 1 > self.port_count {
                return Err(CaptureError::Configuration(format!(
                    "No port left for the key signal of {}",
                    port
                )));
            }
        }
        if !self.pixel_formats.contains(&config.pixel_format) {
            return Err(CaptureError::Configuration(format!(
                "Pixel format {:?} not supported",
                config.pixel_format
            )));
        }
        if config.width > self.max_width || config.height > self.max_height {
            return Err(CaptureError::Configuration(format!(
                "{}x{} exceeds device maximum {}x{}",
                config.width, config.height, self.max_width, self.max_height
            )));
        }
        Ok(())
    }
}

/// One outgoing frame, borrowed for the duration of `submit`.
#[derive(Debug, Clone, Copy)]
pub struct OutputFrame<'a> {
    /// Exactly `stride * height` bytes
    pub buffer: &'a [u8],
    pub stride: u32,
    pub width: u32,
    pub height: u32,
    pub format: SampleFormat,
    pub timecode: Timecode,
    /// Source frame number, echoed back in completions
    pub frame_number: u64,
    pub user_data: Option<&'a CaptureUserData>,
}

/// Receives asynchronous notifications from an open channel.
pub trait ChannelEventSink: Send + Sync {
    /// The device finished configuring the output (or failed to).
    fn on_initialization_completed(&self, success: bool);

    /// A submitted frame has been scanned out.
    fn on_frame_completed(&self, frame_number: u64);

    /// The device repeated or skipped `count` frames.
    fn on_frames_dropped(&self, count: u32);

    /// Unrecoverable I/O error on the channel.
    fn on_fault(&self, message: &str);
}

/// Output hardware able to open channels on its ports.
pub trait OutputDevice: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> &str;

    fn capabilities(&self) -> DeviceCapabilities;

    /// Check a configuration without opening anything.
    fn validate(&self, port: PortName, config: &OutputConfig) -> Result<(), CaptureError> {
        self.capabilities().check(port, config)
    }

    /// Open an output channel. Readiness is reported later through `sink`.
    fn open(
        &self,
        port: PortName,
        config: &OutputConfig,
        sink: Arc<dyn ChannelEventSink>,
    ) -> Result<Box<dyn OutputChannel>, CaptureError>;
}

/// An open output channel.
pub trait OutputChannel: Send {
    /// Queue one frame for output.
    fn submit(&mut self, frame: &OutputFrame<'_>) -> Result<(), CaptureError>;

    /// Release the channel. No sink calls follow.
    fn close(&mut self);
}
