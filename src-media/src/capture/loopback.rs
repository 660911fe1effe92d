//! In-process output device.
//!
//! Stands in for a card: frames are accepted, the last one is kept for
//! inspection, and completions are produced either by hand through a
//! [`LoopbackController`] or by a frame-clock thread running at the output
//! rate.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use ajamedia_common::{OutputConfig, OutputPixelFormat, PortName, SampleFormat, Timecode};

use super::channel::{ChannelEventSink, DeviceCapabilities, OutputChannel, OutputDevice, OutputFrame};
use super::CaptureError;

/// How submitted frames get completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Only through the controller
    #[default]
    Manual,
    /// One frame per frame period, on a background thread
    FrameClock,
}

/// Copy of the most recent frame sent to the device.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackFrame {
    pub data: Vec<u8>,
    pub stride: u32,
    pub width: u32,
    pub height: u32,
    pub format: SampleFormat,
    pub timecode: Timecode,
    pub frame_number: u64,
}

#[derive(Default)]
struct Inner {
    sink: Option<Arc<dyn ChannelEventSink>>,
    open: bool,
    /// Frame numbers submitted and not yet completed, oldest first
    pending: VecDeque<u64>,
    last_frame: Option<LoopbackFrame>,
    submitted: u64,
    open_count: u64,
}

#[derive(Default)]
struct Shared {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Shared {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self) -> Option<Arc<dyn ChannelEventSink>> {
        self.inner().sink.clone()
    }
}

/// A software output device.
pub struct LoopbackDevice {
    name: String,
    capabilities: DeviceCapabilities,
    mode: CompletionMode,
    ready_on_open: bool,
    fail_initialization: bool,
    shared: Arc<Shared>,
}

impl Default for LoopbackDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackDevice {
    /// Four-port device accepting every pixel format up to 4096x2160.
    pub fn new() -> Self {
        Self {
            name: "Loopback".to_string(),
            capabilities: DeviceCapabilities {
                port_count: 4,
                supports_key: true,
                pixel_formats: vec![
                    OutputPixelFormat::Yuv8Bit,
                    OutputPixelFormat::Yuv10Bit,
                    OutputPixelFormat::Rgba8Bit,
                    OutputPixelFormat::Rgb10Bit,
                ],
                max_width: 4096,
                max_height: 2160,
            },
            mode: CompletionMode::Manual,
            ready_on_open: true,
            fail_initialization: false,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn with_completion_mode(mut self, mode: CompletionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_port_count(mut self, port_count: u32) -> Self {
        self.capabilities.port_count = port_count;
        self
    }

    pub fn without_key_support(mut self) -> Self {
        self.capabilities.supports_key = false;
        self
    }

    /// Do not report readiness from `open`; use [`LoopbackController::report_ready`].
    pub fn with_deferred_readiness(mut self) -> Self {
        self.ready_on_open = false;
        self
    }

    /// Report a failed initialization from `open`.
    pub fn failing_initialization(mut self) -> Self {
        self.fail_initialization = true;
        self
    }

    pub fn controller(&self) -> LoopbackController {
        LoopbackController {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl OutputDevice for LoopbackDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.clone()
    }

    fn validate(&self, port: PortName, config: &OutputConfig) -> Result<(), CaptureError> {
        if port.device_index != 0 {
            return Err(CaptureError::Configuration(format!(
                "No device at index {}",
                port.device_index
            )));
        }
        self.capabilities.check(port, config)
    }

    fn open(
        &self,
        port: PortName,
        config: &OutputConfig,
        sink: Arc<dyn ChannelEventSink>,
    ) -> Result<Box<dyn OutputChannel>, CaptureError> {
        let epoch = {
            let mut inner = self.shared.inner();
            if inner.open {
                return Err(CaptureError::Device(format!("{} is already in use", port)));
            }
            inner.open = true;
            inner.sink = Some(Arc::clone(&sink));
            inner.pending.clear();
            inner.open_count += 1;
            inner.open_count
        };
        info!(
            "{}: opened {} ({}x{} @ {})",
            self.name, port, config.width, config.height, config.frame_rate
        );

        if self.mode == CompletionMode::FrameClock {
            let shared = Arc::clone(&self.shared);
            let period = config.frame_rate.frame_duration();
            thread::spawn(move || run_frame_clock(shared, period, epoch));
        }

        if self.ready_on_open {
            sink.on_initialization_completed(!self.fail_initialization);
        }

        Ok(Box::new(LoopbackChannel {
            port,
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Completes one pending frame per period until the channel opened as
/// `epoch` closes.
fn run_frame_clock(shared: Arc<Shared>, period: Duration, epoch: u64) {
    let controller = LoopbackController { shared };
    let mut next_tick = Instant::now() + period;
    loop {
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        }
        next_tick += period;
        if !controller.is_open() || controller.open_count() != epoch {
            break;
        }
        controller.complete_next();
    }
    debug!("Frame clock stopped");
}

struct LoopbackChannel {
    port: PortName,
    shared: Arc<Shared>,
}

impl OutputChannel for LoopbackChannel {
    fn submit(&mut self, frame: &OutputFrame<'_>) -> Result<(), CaptureError> {
        let mut inner = self.shared.inner();
        if !inner.open {
            return Err(CaptureError::ChannelFault(format!("{} is closed", self.port)));
        }

        // Reuse the previous copy's allocation.
        let mut copy = inner.last_frame.take().unwrap_or_else(|| LoopbackFrame {
            data: Vec::new(),
            stride: 0,
            width: 0,
            height: 0,
            format: frame.format,
            timecode: Timecode::default(),
            frame_number: 0,
        });
        copy.data.clear();
        copy.data.extend_from_slice(frame.buffer);
        copy.stride = frame.stride;
        copy.width = frame.width;
        copy.height = frame.height;
        copy.format = frame.format;
        copy.timecode = frame.timecode;
        copy.frame_number = frame.frame_number;
        inner.last_frame = Some(copy);

        inner.pending.push_back(frame.frame_number);
        inner.submitted += 1;
        self.shared.changed.notify_all();
        Ok(())
    }

    fn close(&mut self) {
        let mut inner = self.shared.inner();
        inner.open = false;
        inner.sink = None;
        inner.pending.clear();
        self.shared.changed.notify_all();
        debug!("Loopback channel {} closed", self.port);
    }
}

/// Drives a [`LoopbackDevice`] from the outside.
///
/// Sink callbacks are made without holding the device lock, so the session
/// may close the channel from inside them.
#[derive(Clone)]
pub struct LoopbackController {
    shared: Arc<Shared>,
}

impl LoopbackController {
    /// Complete the oldest pending frame. Returns false if none was pending.
    pub fn complete_next(&self) -> bool {
        let (sink, frame_number) = {
            let mut inner = self.shared.inner();
            let Some(frame_number) = inner.pending.pop_front() else {
                return false;
            };
            (inner.sink.clone(), frame_number)
        };
        self.shared.changed.notify_all();
        if let Some(sink) = sink {
            sink.on_frame_completed(frame_number);
        }
        true
    }

    /// Complete every pending frame; returns how many there were.
    pub fn complete_all(&self) -> usize {
        let mut count = 0;
        while self.complete_next() {
            count += 1;
        }
        count
    }

    pub fn drop_frames(&self, count: u32) {
        if let Some(sink) = self.shared.sink() {
            sink.on_frames_dropped(count);
        }
    }

    pub fn inject_fault(&self, message: &str) {
        if let Some(sink) = self.shared.sink() {
            sink.on_fault(message);
        }
    }

    /// Report the result of a deferred initialization.
    pub fn report_ready(&self, success: bool) {
        if let Some(sink) = self.shared.sink() {
            sink.on_initialization_completed(success);
        }
    }

    /// Block until at least `count` frames are pending or `timeout` elapses.
    pub fn wait_for_pending(&self, count: usize, timeout: Duration) -> bool {
        let inner = self.shared.inner();
        let (inner, _) = self
            .shared
            .changed
            .wait_timeout_while(inner, timeout, |inner| inner.pending.len() < count)
            .unwrap_or_else(PoisonError::into_inner);
        inner.pending.len() >= count
    }

    pub fn pending(&self) -> usize {
        self.shared.inner().pending.len()
    }

    pub fn submitted(&self) -> u64 {
        self.shared.inner().submitted
    }

    pub fn open_count(&self) -> u64 {
        self.shared.inner().open_count
    }

    pub fn is_open(&self) -> bool {
        self.shared.inner().open
    }

    pub fn last_frame(&self) -> Option<LoopbackFrame> {
        self.shared.inner().last_frame.clone()
    }
}
