//! AJA video I/O: texture samples for incoming frames and capture sessions
//! for outgoing ones.
//!
//! - [`sample`]: pooled [`TextureSample`]s built from hardware frames,
//!   progressive or one field of an interlaced frame.
//! - [`capture`]: the [`CaptureSession`] state machine sending rendered
//!   frames to an output port, with a [`LoopbackDevice`] for running
//!   without hardware.
//! - [`config`]: persisted user configuration.

pub mod capture;
pub mod config;
pub mod sample;

pub use capture::{
    CaptureBaseData, CaptureError, CaptureEvent, CaptureSession, CaptureState, LoopbackDevice,
    OutputDevice, Viewport,
};
pub use config::{load_config, save_config, MediaConfig, PoolConfig};
pub use sample::{PooledSample, SampleError, SampleTiming, TextureSample, TextureSamplePool, VideoFrameData};
