//! Capture session driving an AJA output channel.
//!
//! ## Lifecycle
//!
//! ```text
//!          start_capture                 device ready
//!   Idle ───────────────► Initializing ───────────────► Active
//!    ▲                        │  validation/open error     │
//!    │◄───────────────────────┘                            │ stop_capture
//!    │                                                     ▼
//!    └──────────────────────────────────────────────── Stopping
//!            channel released, viewport alpha restored
//! ```
//!
//! A channel fault while Initializing or Active tears the session down to
//! Idle immediately and records the error; nothing is retried.
//!
//! The render thread calls [`CaptureSession::capture_frame`] once per frame.
//! The device reports completions, drops and faults through a
//! [`ChannelEventSink`] registered when the channel is opened.

pub mod channel;
pub mod error;
pub mod loopback;
pub mod session;
pub mod sync_event;
pub mod timecode_burn;
pub mod viewport;

use serde::{Deserialize, Serialize};
use std::fmt;

use ajamedia_common::PortName;

pub use channel::{
    CaptureUserData, ChannelEventSink, DeviceCapabilities, OutputChannel, OutputDevice,
    OutputFrame,
};
pub use error::CaptureError;
pub use loopback::{CompletionMode, LoopbackController, LoopbackDevice, LoopbackFrame};
pub use session::{CaptureBaseData, CaptureSession, DEFAULT_SYNC_TIMEOUT};
pub use sync_event::SyncEvent;
pub use viewport::{SceneViewport, Viewport};

/// Capture session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// No channel open, ready to start
    Idle,
    /// Configuration validated, waiting for the device to report ready
    Initializing,
    /// Frames are being sent to the device
    Active,
    /// Draining and releasing the channel
    Stopping,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::Initializing => "initializing",
            CaptureState::Active => "active",
            CaptureState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Events broadcast to session subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Session state changed
    StateChanged(CaptureState),
    /// The device skipped frames
    FramesDropped { port: PortName, count: u32 },
    /// The channel failed and the session returned to Idle
    Fault(CaptureError),
}
