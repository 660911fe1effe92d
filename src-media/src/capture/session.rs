//! Capture session state machine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use ajamedia_common::{validation, OutputConfig, PortName, Timecode};

use super::channel::{CaptureUserData, ChannelEventSink, OutputChannel, OutputDevice, OutputFrame};
use super::timecode_burn;
use super::viewport::{Viewport, ViewportBinding};
use super::{CaptureError, CaptureEvent, CaptureState, SyncEvent};

/// How long the render thread waits for the device before giving up.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_millis(1000);

const EVENT_CAPACITY: usize = 64;

/// Per-frame data supplied by the render thread.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CaptureBaseData {
    pub source_frame_number: u64,
    /// Derived from the frame number and output rate when absent
    pub source_frame_timecode: Option<Timecode>,
}

impl CaptureBaseData {
    pub fn new(source_frame_number: u64) -> Self {
        Self {
            source_frame_number,
            source_frame_timecode: None,
        }
    }

    pub fn with_timecode(mut self, timecode: Timecode) -> Self {
        self.source_frame_timecode = Some(timecode);
        self
    }
}

/// The open channel plus the configuration it was opened with.
struct ActiveChannel {
    channel: Box<dyn OutputChannel>,
    config: OutputConfig,
    port: PortName,
}

#[derive(Debug, Default)]
struct Progress {
    in_flight: u64,
    submitted: u64,
    completed: u64,
}

struct SessionShared {
    /// Critical section around the hardware channel. Held while submitting;
    /// may nest the state lock, never the other way round.
    channel: Mutex<Option<ActiveChannel>>,
    state: Mutex<CaptureState>,
    progress: Mutex<Progress>,
    drained: Condvar,
    wake_up: SyncEvent,
    viewport: Mutex<Option<ViewportBinding>>,
    last_error: Mutex<Option<CaptureError>>,
    /// Incremented per start; callbacks from older channels are ignored
    generation: AtomicU64,
    event_tx: broadcast::Sender<CaptureEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionShared {
    fn state(&self) -> CaptureState {
        *lock(&self.state)
    }

    fn set_state(&self, state: CaptureState) {
        *lock(&self.state) = state;
        debug!("Capture state: {}", state);
        self.broadcast(CaptureEvent::StateChanged(state));
    }

    /// Move from `from` to `to`; returns false if the session was elsewhere.
    fn transition(&self, from: CaptureState, to: CaptureState) -> bool {
        {
            let mut state = lock(&self.state);
            if *state != from {
                return false;
            }
            *state = to;
        }
        debug!("Capture state: {} -> {}", from, to);
        self.broadcast(CaptureEvent::StateChanged(to));
        true
    }

    fn broadcast(&self, event: CaptureEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Close the channel and restore the viewport. Safe to call repeatedly.
    fn release(&self) {
        let active = lock(&self.channel).take();
        if let Some(mut active) = active {
            debug!("Closing output channel on {}", active.port);
            active.channel.close();
        }
        if let Some(binding) = lock(&self.viewport).take() {
            binding.restore();
        }
    }

    /// Tear down after a fatal channel error. Ignored unless the session is
    /// Initializing or Active.
    fn fail(&self, err: CaptureError) {
        {
            let mut state = lock(&self.state);
            if !matches!(*state, CaptureState::Initializing | CaptureState::Active) {
                debug!("Ignoring channel error while {}: {}", *state, err);
                return;
            }
            *state = CaptureState::Stopping;
        }
        error!("{}. Stopping capture.", err);
        self.broadcast(CaptureEvent::StateChanged(CaptureState::Stopping));

        *lock(&self.last_error) = Some(err.clone());
        // A render thread blocked on the device must not wait out its timeout.
        self.wake_up.signal();
        self.release();
        self.set_state(CaptureState::Idle);
        self.broadcast(CaptureEvent::Fault(err));
    }

    fn frame_completed(&self) {
        {
            let mut progress = lock(&self.progress);
            progress.in_flight = progress.in_flight.saturating_sub(1);
            progress.completed += 1;
        }
        self.drained.notify_all();
        self.wake_up.signal();
    }

    /// Wait until no frame is in flight. Returns false on timeout.
    fn wait_drained(&self, timeout: Duration) -> bool {
        let progress = lock(&self.progress);
        let (progress, _) = self
            .drained
            .wait_timeout_while(progress, timeout, |p| p.in_flight > 0)
            .unwrap_or_else(PoisonError::into_inner);
        progress.in_flight == 0
    }
}

/// Sink handed to the device for one channel.
struct SessionCallback {
    shared: Weak<SessionShared>,
    generation: u64,
    port: PortName,
    log_drop_frame: bool,
}

impl SessionCallback {
    fn shared(&self) -> Option<Arc<SessionShared>> {
        let shared = self.shared.upgrade()?;
        if shared.generation.load(Ordering::SeqCst) != self.generation {
            trace!("Dropping callback from a previous channel on {}", self.port);
            return None;
        }
        Some(shared)
    }
}

impl ChannelEventSink for SessionCallback {
    fn on_initialization_completed(&self, success: bool) {
        let Some(shared) = self.shared() else { return };
        if success {
            if shared.transition(CaptureState::Initializing, CaptureState::Active) {
                info!("Output {} ready", self.port);
            }
        } else {
            shared.fail(CaptureError::ChannelFault(format!(
                "The AJA output port {} could not be opened",
                self.port
            )));
        }
    }

    fn on_frame_completed(&self, frame_number: u64) {
        let Some(shared) = self.shared() else { return };
        trace!("Frame {} completed on {}", frame_number, self.port);
        shared.frame_completed();
    }

    fn on_frames_dropped(&self, count: u32) {
        let Some(shared) = self.shared() else { return };
        if self.log_drop_frame {
            warn!(
                "Lost {} frames on output {}. Frame rate may be too slow.",
                count, self.port
            );
        }
        shared.broadcast(CaptureEvent::FramesDropped {
            port: self.port,
            count,
        });
    }

    fn on_fault(&self, message: &str) {
        let Some(shared) = self.shared() else { return };
        shared.fail(CaptureError::ChannelFault(message.to_string()));
    }
}

/// Drives one output device from the render thread.
///
/// All methods take `&self`; share the session across threads with an `Arc`.
/// `capture_frame` is meant for the render thread, the rest for the control
/// thread.
pub struct CaptureSession {
    device: Arc<dyn OutputDevice>,
    shared: Arc<SessionShared>,
    sync_timeout: Duration,
}

impl CaptureSession {
    pub fn new(device: Arc<dyn OutputDevice>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            device,
            shared: Arc::new(SessionShared {
                channel: Mutex::new(None),
                state: Mutex::new(CaptureState::Idle),
                progress: Mutex::new(Progress::default()),
                drained: Condvar::new(),
                wake_up: SyncEvent::new(),
                viewport: Mutex::new(None),
                last_error: Mutex::new(None),
                generation: AtomicU64::new(0),
                event_tx,
            }),
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }

    /// Override how long `capture_frame` waits for the device.
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state()
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Error that ended the last session, if it ended with one.
    pub fn last_error(&self) -> Option<CaptureError> {
        lock(&self.shared.last_error).clone()
    }

    /// Port of the open channel.
    pub fn port(&self) -> Option<PortName> {
        lock(&self.shared.channel).as_ref().map(|active| active.port)
    }

    pub fn frames_submitted(&self) -> u64 {
        lock(&self.shared.progress).submitted
    }

    pub fn frames_completed(&self) -> u64 {
        lock(&self.shared.progress).completed
    }

    /// Check `config` against the port syntax, key/fill rules and the device.
    pub fn validate_output_config(&self, config: &OutputConfig) -> Result<PortName, CaptureError> {
        let port = validation::validate_output_config(config)?;

        if config.uses_key() && !config.pixel_format.sample_format().has_alpha() {
            return Err(CaptureError::Configuration(
                "Key/fill output requires an RGB pixel format".to_string(),
            ));
        }
        if config.encode_timecode_in_texel && !timecode_burn::fits(config.width, config.height) {
            warn!(
                "{}x{} is too small for timecode burn-in, frames will be sent without it",
                config.width, config.height
            );
        }

        self.device.validate(port, config)?;
        Ok(port)
    }

    /// Validate `config`, open the channel and wait for the device to report
    /// ready. The session is Initializing until then.
    ///
    /// On error the session is back in Idle.
    pub fn start_capture(
        &self,
        config: &OutputConfig,
        viewport: Option<Arc<dyn Viewport>>,
    ) -> Result<(), CaptureError> {
        if !self
            .shared
            .transition(CaptureState::Idle, CaptureState::Initializing)
        {
            return Err(CaptureError::InvalidState {
                expected: CaptureState::Idle,
                actual: self.state(),
            });
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.shared.last_error) = None;
        *lock(&self.shared.progress) = Progress::default();
        self.shared.wake_up.reset();

        let port = match self.validate_output_config(config) {
            Ok(port) => port,
            Err(err) => {
                warn!("Rejected output configuration: {}", err);
                self.shared.set_state(CaptureState::Idle);
                return Err(err);
            }
        };

        let sink = Arc::new(SessionCallback {
            shared: Arc::downgrade(&self.shared),
            generation,
            port,
            log_drop_frame: config.log_drop_frame,
        });
        let channel = match self.device.open(port, config, sink) {
            Ok(channel) => channel,
            Err(err) => {
                error!("Failed to open {} on {}: {}", port, self.device.name(), err);
                *lock(&self.shared.last_error) = Some(err.clone());
                self.shared.set_state(CaptureState::Idle);
                return Err(err);
            }
        };

        *lock(&self.shared.channel) = Some(ActiveChannel {
            channel,
            config: config.clone(),
            port,
        });
        *lock(&self.shared.viewport) =
            viewport.map(|viewport| ViewportBinding::apply(viewport, config.uses_key()));

        // The device may already have failed initialization from inside open.
        if self.state() == CaptureState::Idle {
            self.shared.release();
            return Err(self.last_error().unwrap_or_else(|| {
                CaptureError::ChannelFault(format!("Initialization of {} failed", port))
            }));
        }

        info!(
            "Capture started on {} ({}x{} @ {} fps, {:?}, {:?})",
            port,
            config.width,
            config.height,
            config.frame_rate,
            config.pixel_format,
            config.output_type
        );
        Ok(())
    }

    /// Send one rendered frame to the device.
    ///
    /// Frames arriving while the session is not Active are skipped. With
    /// `wait_for_sync_event` set, blocks until the device completes a frame,
    /// the session stops, or the sync timeout elapses. A timeout while still
    /// Active is treated as a channel fault.
    pub fn capture_frame(
        &self,
        base: &CaptureBaseData,
        user_data: Option<&CaptureUserData>,
        buffer: &mut [u8],
        width: u32,
        height: u32,
    ) -> Result<(), CaptureError> {
        let submitted = {
            let mut slot = lock(&self.shared.channel);
            let Some(active) = slot.as_mut() else {
                trace!("No output channel, skipping frame {}", base.source_frame_number);
                return Ok(());
            };
            if self.shared.state() != CaptureState::Active {
                trace!("Capture not active, skipping frame {}", base.source_frame_number);
                return Ok(());
            }

            let config = &active.config;
            if width != config.width || height != config.height {
                return Err(CaptureError::Configuration(format!(
                    "Frame is {}x{}, output expects {}x{}",
                    width, height, config.width, config.height
                )));
            }
            let stride = config.stride();
            let frame_size = config.frame_size();
            if buffer.len() < frame_size {
                return Err(CaptureError::BufferMismatch {
                    expected: frame_size,
                    actual: buffer.len(),
                });
            }

            let format = config.pixel_format.sample_format();
            let timecode = base.source_frame_timecode.unwrap_or_else(|| {
                Timecode::from_frame_number(
                    base.source_frame_number,
                    config.frame_rate,
                    config.frame_rate.is_drop_frame_compatible(),
                )
            });
            let buffer = &mut buffer[..frame_size];
            if config.encode_timecode_in_texel {
                timecode_burn::encode_timecode(buffer, stride, width, height, format, &timecode);
            }

            let frame = OutputFrame {
                buffer,
                stride,
                width,
                height,
                format,
                timecode,
                frame_number: base.source_frame_number,
                user_data,
            };
            let wait = config.wait_for_sync_event;
            // Counted before submit: the completion may arrive before it returns.
            {
                let mut progress = lock(&self.shared.progress);
                progress.in_flight += 1;
                progress.submitted += 1;
            }
            active.channel.submit(&frame).map(|()| wait).map_err(|err| {
                let mut progress = lock(&self.shared.progress);
                progress.in_flight = progress.in_flight.saturating_sub(1);
                progress.submitted = progress.submitted.saturating_sub(1);
                err
            })
        };

        match submitted {
            Err(err) => {
                self.shared.fail(err.clone());
                Err(err)
            }
            Ok(true) => self.wait_for_sync(),
            Ok(false) => Ok(()),
        }
    }

    fn wait_for_sync(&self) -> Result<(), CaptureError> {
        if self.shared.wake_up.wait_timeout(self.sync_timeout) {
            return Ok(());
        }
        if self.state() != CaptureState::Active {
            return Ok(());
        }
        let err = CaptureError::ChannelFault("Could not synchronize with the device".to_string());
        self.shared.fail(err.clone());
        Err(err)
    }

    /// True once every submitted frame has completed, or no channel is open.
    pub fn has_finished_processing(&self) -> bool {
        if lock(&self.shared.channel).is_none() {
            return true;
        }
        lock(&self.shared.progress).in_flight == 0
    }

    /// Point the session at a different viewport. The old viewport gets its
    /// alpha flag back before the new one is changed.
    pub fn update_viewport(&self, viewport: Option<Arc<dyn Viewport>>) -> Result<(), CaptureError> {
        let uses_key = {
            let slot = lock(&self.shared.channel);
            match slot.as_ref() {
                Some(active) => active.config.uses_key(),
                None => {
                    return Err(CaptureError::InvalidState {
                        expected: CaptureState::Active,
                        actual: self.state(),
                    })
                }
            }
        };

        let mut binding = lock(&self.shared.viewport);
        if let Some(previous) = binding.take() {
            previous.restore();
        }
        *binding = viewport.map(|viewport| ViewportBinding::apply(viewport, uses_key));
        Ok(())
    }

    /// Stop the session and release the channel.
    ///
    /// A render thread blocked in `capture_frame` is woken before teardown.
    /// With `allow_pending_frame_to_process` the frames already submitted
    /// get up to one sync timeout to complete first. Does nothing when Idle
    /// or already stopping.
    pub fn stop_capture(&self, allow_pending_frame_to_process: bool) {
        let from = {
            let mut state = lock(&self.shared.state);
            match *state {
                CaptureState::Idle | CaptureState::Stopping => return,
                current => {
                    *state = CaptureState::Stopping;
                    current
                }
            }
        };
        info!("Stopping capture (was {})", from);
        self.shared
            .broadcast(CaptureEvent::StateChanged(CaptureState::Stopping));

        self.shared.wake_up.signal();

        if allow_pending_frame_to_process && !self.shared.wait_drained(self.sync_timeout) {
            warn!("Frames still in flight after {:?}, releasing anyway", self.sync_timeout);
        }

        self.shared.release();
        self.shared.set_state(CaptureState::Idle);
        info!(
            "Capture stopped ({} frames submitted, {} completed)",
            self.frames_submitted(),
            self.frames_completed()
        );
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop_capture(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::loopback::LoopbackDevice;
    use crate::capture::timecode_burn::decode_timecode;
    use crate::capture::SceneViewport;
    use ajamedia_common::{FrameRate, OutputPixelFormat, OutputType, SampleFormat};
    use std::thread;
    use std::time::Instant;

    fn key_config() -> OutputConfig {
        OutputConfig {
            pixel_format: OutputPixelFormat::Rgba8Bit,
            output_type: OutputType::FillAndKey,
            ..OutputConfig::default()
        }
    }

    fn frame_for(config: &OutputConfig) -> Vec<u8> {
        vec![0u8; config.frame_size()]
    }

    fn drain(rx: &mut broadcast::Receiver<CaptureEvent>) -> Vec<CaptureEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_lifecycle_restores_viewport_alpha() {
        let device = LoopbackDevice::new();
        let controller = device.controller();
        let session = CaptureSession::new(Arc::new(device));
        let mut rx = session.subscribe();
        let viewport = Arc::new(SceneViewport::new(true));

        let config = key_config();
        session.start_capture(&config, Some(viewport.clone())).unwrap();
        assert_eq!(session.state(), CaptureState::Active);
        assert!(!viewport.ignore_texture_alpha());

        let mut buffer = frame_for(&config);
        session
            .capture_frame(&CaptureBaseData::new(0), None, &mut buffer, 1920, 1080)
            .unwrap();
        assert_eq!(controller.submitted(), 1);

        session.stop_capture(false);
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(viewport.ignore_texture_alpha());
        assert!(!controller.is_open());
        assert!(session.has_finished_processing());

        let states: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                CaptureEvent::StateChanged(state) => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                CaptureState::Initializing,
                CaptureState::Active,
                CaptureState::Stopping,
                CaptureState::Idle
            ]
        );
    }

    #[test]
    fn test_wait_for_sync_blocks_until_completion() {
        let device = LoopbackDevice::new();
        let controller = device.controller();
        let session = Arc::new(CaptureSession::new(Arc::new(device)));
        let config = OutputConfig {
            frame_rate: FrameRate::FPS_60,
            wait_for_sync_event: true,
            ..OutputConfig::default()
        };
        session.start_capture(&config, None).unwrap();

        let render = {
            let session = Arc::clone(&session);
            let config = config.clone();
            thread::spawn(move || {
                let mut buffer = frame_for(&config);
                for n in 0..3 {
                    session
                        .capture_frame(&CaptureBaseData::new(n), None, &mut buffer, 1920, 1080)
                        .unwrap();
                }
            })
        };

        for _ in 0..3 {
            assert!(controller.wait_for_pending(1, Duration::from_secs(5)));
            assert!(!session.has_finished_processing());
            assert!(controller.complete_next());
        }
        render.join().unwrap();

        assert!(session.has_finished_processing());
        assert_eq!(session.frames_submitted(), 3);
        assert_eq!(session.frames_completed(), 3);
        session.stop_capture(true);
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn test_stop_unblocks_waiting_render_thread() {
        let device = LoopbackDevice::new();
        let controller = device.controller();
        let session = Arc::new(
            CaptureSession::new(Arc::new(device)).with_sync_timeout(Duration::from_secs(30)),
        );
        let config = OutputConfig {
            wait_for_sync_event: true,
            ..OutputConfig::default()
        };
        session.start_capture(&config, None).unwrap();

        let render = {
            let session = Arc::clone(&session);
            let config = config.clone();
            thread::spawn(move || {
                let mut buffer = frame_for(&config);
                let start = Instant::now();
                let result =
                    session.capture_frame(&CaptureBaseData::new(0), None, &mut buffer, 1920, 1080);
                (result, start.elapsed())
            })
        };

        assert!(controller.wait_for_pending(1, Duration::from_secs(5)));
        session.stop_capture(false);

        let (result, elapsed) = render.join().unwrap();
        assert_eq!(result, Ok(()));
        assert!(elapsed < Duration::from_secs(30));
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_sync_timeout_is_a_fault() {
        let device = LoopbackDevice::new();
        let session =
            CaptureSession::new(Arc::new(device)).with_sync_timeout(Duration::from_millis(20));
        let config = OutputConfig {
            wait_for_sync_event: true,
            ..OutputConfig::default()
        };
        session.start_capture(&config, None).unwrap();

        let mut buffer = frame_for(&config);
        let err = session
            .capture_frame(&CaptureBaseData::new(0), None, &mut buffer, 1920, 1080)
            .unwrap_err();
        assert!(matches!(err, CaptureError::ChannelFault(_)));
        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(session.last_error(), Some(err));
    }

    #[test]
    fn test_invalid_config_stays_idle() {
        let device = LoopbackDevice::new();
        let controller = device.controller();
        let session = CaptureSession::new(Arc::new(device));
        let viewport = Arc::new(SceneViewport::new(true));

        // Key output needs alpha; 8-bit YUV has none.
        let config = OutputConfig {
            output_type: OutputType::FillAndKey,
            ..OutputConfig::default()
        };
        let err = session.start_capture(&config, Some(viewport.clone())).unwrap_err();
        assert!(matches!(err, CaptureError::Configuration(_)));
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(viewport.ignore_texture_alpha());
        assert_eq!(controller.open_count(), 0);

        let bad_port = OutputConfig {
            port: "device0/single9".to_string(),
            ..OutputConfig::default()
        };
        assert!(session.validate_output_config(&bad_port).is_err());
        assert!(session.start_capture(&bad_port, None).is_err());
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let session = CaptureSession::new(Arc::new(LoopbackDevice::new()));
        session.start_capture(&OutputConfig::default(), None).unwrap();
        assert_eq!(
            session.start_capture(&OutputConfig::default(), None),
            Err(CaptureError::InvalidState {
                expected: CaptureState::Idle,
                actual: CaptureState::Active,
            })
        );
    }

    #[test]
    fn test_fault_returns_to_idle_with_error() {
        let device = LoopbackDevice::new();
        let controller = device.controller();
        let session = CaptureSession::new(Arc::new(device));
        let mut rx = session.subscribe();
        let viewport = Arc::new(SceneViewport::new(true));
        session.start_capture(&key_config(), Some(viewport.clone())).unwrap();

        controller.inject_fault("SDI link lost");

        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(
            session.last_error(),
            Some(CaptureError::ChannelFault("SDI link lost".to_string()))
        );
        assert!(viewport.ignore_texture_alpha());
        assert!(!controller.is_open());
        assert!(drain(&mut rx)
            .iter()
            .any(|event| matches!(event, CaptureEvent::Fault(_))));

        // Frames after the fault are skipped, and a fresh start works.
        let config = key_config();
        let mut buffer = frame_for(&config);
        session
            .capture_frame(&CaptureBaseData::new(1), None, &mut buffer, 1920, 1080)
            .unwrap();
        session.start_capture(&config, None).unwrap();
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_initialization_failure() {
        let device = LoopbackDevice::new().failing_initialization();
        let controller = device.controller();
        let session = CaptureSession::new(Arc::new(device));

        let err = session.start_capture(&OutputConfig::default(), None).unwrap_err();
        assert!(matches!(err, CaptureError::ChannelFault(_)));
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(!controller.is_open());
    }

    #[test]
    fn test_deferred_readiness() {
        let device = LoopbackDevice::new().with_deferred_readiness();
        let controller = device.controller();
        let session = CaptureSession::new(Arc::new(device));
        let config = OutputConfig::default();
        session.start_capture(&config, None).unwrap();
        assert_eq!(session.state(), CaptureState::Initializing);

        // Not active yet: the frame is skipped.
        let mut buffer = frame_for(&config);
        session
            .capture_frame(&CaptureBaseData::new(0), None, &mut buffer, 1920, 1080)
            .unwrap();
        assert_eq!(controller.submitted(), 0);

        controller.report_ready(true);
        assert_eq!(session.state(), CaptureState::Active);
        session
            .capture_frame(&CaptureBaseData::new(1), None, &mut buffer, 1920, 1080)
            .unwrap();
        assert_eq!(controller.submitted(), 1);
    }

    #[test]
    fn test_dropped_frames_are_reported() {
        let device = LoopbackDevice::new();
        let controller = device.controller();
        let session = CaptureSession::new(Arc::new(device));
        let mut rx = session.subscribe();
        session.start_capture(&OutputConfig::default(), None).unwrap();

        controller.drop_frames(3);

        assert!(drain(&mut rx).contains(&CaptureEvent::FramesDropped {
            port: PortName::new(0, 1),
            count: 3,
        }));
        assert_eq!(session.state(), CaptureState::Active);
    }

    #[test]
    fn test_frame_checks() {
        let session = CaptureSession::new(Arc::new(LoopbackDevice::new()));
        let config = OutputConfig::default();
        session.start_capture(&config, None).unwrap();

        let mut short = vec![0u8; 16];
        assert_eq!(
            session.capture_frame(&CaptureBaseData::new(0), None, &mut short, 1920, 1080),
            Err(CaptureError::BufferMismatch {
                expected: config.frame_size(),
                actual: 16,
            })
        );
        let mut buffer = frame_for(&config);
        assert!(matches!(
            session.capture_frame(&CaptureBaseData::new(0), None, &mut buffer, 1280, 720),
            Err(CaptureError::Configuration(_))
        ));
        // Per-frame errors do not end the session.
        assert_eq!(session.state(), CaptureState::Active);
    }

    #[test]
    fn test_timecode_burn_in() {
        let device = LoopbackDevice::new();
        let controller = device.controller();
        let session = CaptureSession::new(Arc::new(device));
        let config = OutputConfig {
            pixel_format: OutputPixelFormat::Rgba8Bit,
            encode_timecode_in_texel: true,
            ..OutputConfig::default()
        };
        session.start_capture(&config, None).unwrap();

        let timecode = Timecode::new(10, 20, 30, 15, false);
        let mut buffer = frame_for(&config);
        session
            .capture_frame(
                &CaptureBaseData::new(7).with_timecode(timecode),
                None,
                &mut buffer,
                1920,
                1080,
            )
            .unwrap();

        let frame = controller.last_frame().unwrap();
        assert_eq!(frame.timecode, timecode);
        assert_eq!(frame.frame_number, 7);
        assert_eq!(
            decode_timecode(&frame.data, frame.stride, 1920, 1080, SampleFormat::CharBgra),
            Some(timecode)
        );
    }

    #[test]
    fn test_timecode_from_frame_number() {
        let device = LoopbackDevice::new();
        let controller = device.controller();
        let session = CaptureSession::new(Arc::new(device));
        let config = OutputConfig {
            frame_rate: FrameRate::FPS_25,
            ..OutputConfig::default()
        };
        session.start_capture(&config, None).unwrap();

        let mut buffer = frame_for(&config);
        session
            .capture_frame(&CaptureBaseData::new(26), None, &mut buffer, 1920, 1080)
            .unwrap();
        assert_eq!(
            controller.last_frame().unwrap().timecode,
            Timecode::new(0, 0, 1, 1, false)
        );
    }

    #[test]
    fn test_update_viewport_swaps_restore_target() {
        let session = CaptureSession::new(Arc::new(LoopbackDevice::new()));
        let first = Arc::new(SceneViewport::new(true));
        let second = Arc::new(SceneViewport::new(true));

        assert!(session.update_viewport(Some(first.clone())).is_err());

        session.start_capture(&key_config(), Some(first.clone())).unwrap();
        session.update_viewport(Some(second.clone())).unwrap();
        assert!(first.ignore_texture_alpha());
        assert!(!second.ignore_texture_alpha());

        session.stop_capture(false);
        assert!(second.ignore_texture_alpha());
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let session = CaptureSession::new(Arc::new(LoopbackDevice::new()));
        let mut rx = session.subscribe();
        session.stop_capture(true);
        assert_eq!(session.state(), CaptureState::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_drop_releases_channel() {
        let device = LoopbackDevice::new();
        let controller = device.controller();
        let viewport = Arc::new(SceneViewport::new(true));
        {
            let session = CaptureSession::new(Arc::new(device));
            session.start_capture(&key_config(), Some(viewport.clone())).unwrap();
            assert!(controller.is_open());
        }
        assert!(!controller.is_open());
        assert!(viewport.ignore_texture_alpha());
    }
}
