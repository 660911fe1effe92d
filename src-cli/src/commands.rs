//! CLI command implementations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Local;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use ajamedia::capture::timecode_burn::decode_timecode;
use ajamedia::capture::{CompletionMode, LoopbackFrame, SceneViewport};
use ajamedia::config::{self, MediaConfig, PoolConfig};
use ajamedia::{
    CaptureBaseData, CaptureError, CaptureEvent, CaptureSession, CaptureState, LoopbackDevice,
    SampleError, SampleTiming, TextureSamplePool, VideoFrameData, Viewport,
};
use ajamedia_common::{
    FrameRate, InterlaceField, OutputConfig, OutputPixelFormat, OutputType, SampleFormat, Timecode,
};

use crate::colors;
use crate::exit_codes::ExitCode;
use crate::{FieldArg, OutputArgs, RunOptions};

/// Apply command-line overrides to the configured output.
pub fn apply_overrides(output: &mut OutputConfig, args: &OutputArgs) -> Result<(), String> {
    if let Some(port) = &args.port {
        output.port = port.clone();
    }
    if let Some(width) = args.width {
        output.width = width;
    }
    if let Some(height) = args.height {
        output.height = height;
    }
    if let Some(rate) = &args.rate {
        output.frame_rate =
            FrameRate::parse(rate).ok_or_else(|| format!("Invalid frame rate: '{}'", rate))?;
    }
    if let Some(format) = &args.pixel_format {
        output.pixel_format = OutputPixelFormat::parse(format).ok_or_else(|| {
            format!(
                "Invalid pixel format: '{}'. Valid: yuv8, yuv10, rgba8, rgb10",
                format
            )
        })?;
    }
    if args.key {
        output.output_type = OutputType::FillAndKey;
    }
    if args.wait_sync {
        output.wait_for_sync_event = true;
    }
    if args.burn_timecode {
        output.encode_timecode_in_texel = true;
    }
    Ok(())
}

fn effective_config(args: &OutputArgs, quiet: bool) -> Result<MediaConfig, ExitCode> {
    let mut config = config::load_config();
    if let Err(e) = apply_overrides(&mut config.output, args) {
        if !quiet {
            eprintln!("{}", colors::error(&e));
        }
        return Err(ExitCode::InvalidArguments);
    }
    Ok(config)
}

fn loopback_session() -> (CaptureSession, ajamedia::capture::LoopbackController) {
    let device = LoopbackDevice::new().with_completion_mode(CompletionMode::FrameClock);
    let controller = device.controller();
    (CaptureSession::new(Arc::new(device)), controller)
}

/// Validate the effective output configuration.
pub fn validate(args: &OutputArgs, json: bool, quiet: bool) -> ExitCode {
    let config = match effective_config(args, quiet) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let (session, _) = loopback_session();

    match session.validate_output_config(&config.output) {
        Ok(port) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "valid": true,
                        "port": port.to_string(),
                        "frame_size": config.output.frame_size(),
                    })
                );
            } else if !quiet {
                println!(
                    "{} {} {}x{} @ {} fps ({} bytes per frame)",
                    colors::success("Valid:"),
                    colors::bold(&port.to_string()),
                    config.output.width,
                    config.output.height,
                    config.output.frame_rate,
                    config.output.frame_size()
                );
            }
            ExitCode::Success
        }
        Err(e) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "valid": false, "error": e.to_string() })
                );
            } else if !quiet {
                eprintln!("{}", colors::error(&e.to_string()));
            }
            ExitCode::InvalidConfiguration
        }
    }
}

/// Last frame read back through a texture sample.
#[derive(Debug, Serialize)]
struct Readback {
    width: u32,
    height: u32,
    stride: u32,
    format: SampleFormat,
    field: InterlaceField,
    srgb: bool,
    timecode: Option<String>,
    /// Timecode decoded from the burned-in texels
    burned_timecode: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    port: String,
    state: CaptureState,
    frames_sent: u64,
    frames_submitted: u64,
    frames_completed: u64,
    frames_dropped: u64,
    elapsed_ms: u128,
    error: Option<String>,
    readback: Option<Readback>,
}

/// Run a capture session on the loopback device.
pub async fn run(args: OutputArgs, options: RunOptions, json: bool, quiet: bool) -> ExitCode {
    let config = match effective_config(&args, quiet) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let output = config.output.clone();
    let (session, controller) = loopback_session();
    let session = Arc::new(session);
    let viewport = Arc::new(SceneViewport::new(options.ignore_alpha));

    // Drops and state changes arrive on the session's event channel.
    let mut events = session.subscribe();
    let event_task = tokio::spawn(async move {
        let mut dropped = 0u64;
        loop {
            match events.recv().await {
                Ok(CaptureEvent::FramesDropped { count, .. }) => dropped += count as u64,
                Ok(CaptureEvent::StateChanged(state)) => debug!("Session {}", state),
                Ok(CaptureEvent::Fault(e)) => debug!("Session fault: {}", e),
                Err(RecvError::Lagged(n)) => warn!("Missed {} session events", n),
                Err(RecvError::Closed) => break,
            }
        }
        dropped
    });

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    if let Err(e) = session.start_capture(&output, Some(viewport.clone())) {
        if json {
            println!(
                "{}",
                serde_json::json!({ "status": "failed", "error": e.to_string() })
            );
        } else if !quiet {
            eprintln!("{}", colors::error(&e.to_string()));
        }
        return match e {
            CaptureError::Configuration(_) => ExitCode::InvalidConfiguration,
            _ => ExitCode::CaptureFailedToStart,
        };
    }
    if !quiet && !json {
        println!(
            "{} {} on {} ({}x{} @ {} fps, viewport alpha {})",
            colors::info("Capture"),
            colors::state(&session.state().to_string()),
            colors::bold(&output.port),
            output.width,
            output.height,
            output.frame_rate,
            if viewport.ignore_texture_alpha() {
                colors::dim("ignored")
            } else {
                colors::success("enabled")
            }
        );
    }

    let start = Instant::now();
    let render = {
        let session = session.clone();
        let output = output.clone();
        let shutdown = shutdown.clone();
        let frames = options.frames;
        let wall_clock = options.wall_clock;
        tokio::task::spawn_blocking(move || {
            let result = render_frames(&session, &output, frames, wall_clock, &shutdown);
            session.stop_capture(true);
            result
        })
    };
    let rendered = match render.await {
        Ok(result) => result,
        Err(e) => {
            if !quiet {
                eprintln!("{}", colors::error(&format!("Render thread failed: {}", e)));
            }
            return ExitCode::GeneralError;
        }
    };
    let elapsed = start.elapsed();

    let readback = match controller.last_frame() {
        Some(frame) => match read_back(&frame, options.field, &config.pool, output.frame_rate) {
            Ok(readback) => Some(readback),
            Err(e) => {
                if !quiet {
                    eprintln!("{}", colors::warning(&format!("Readback failed: {}", e)));
                }
                None
            }
        },
        None => None,
    };

    let error = match &rendered {
        Err(e) => Some(e.clone()),
        Ok(_) => session.last_error(),
    };
    let summary = RunSummary {
        port: output.port.clone(),
        state: session.state(),
        frames_sent: *rendered.as_ref().unwrap_or(&0),
        frames_submitted: session.frames_submitted(),
        frames_completed: session.frames_completed(),
        frames_dropped: 0,
        elapsed_ms: elapsed.as_millis(),
        error: error.as_ref().map(|e| e.to_string()),
        readback,
    };

    // Dropping the last session handle closes the event channel.
    drop(session);
    let summary = RunSummary {
        frames_dropped: event_task.await.unwrap_or(0),
        ..summary
    };

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("{}", colors::error(&e.to_string())),
        }
    } else if !quiet {
        print_summary(&summary, viewport.ignore_texture_alpha());
    }

    if error.is_some() {
        ExitCode::CaptureFailedDuringOutput
    } else {
        ExitCode::Success
    }
}

/// Send up to `frames` frames, paced to the output rate unless the session
/// waits on the device. Returns the number of frames sent.
fn render_frames(
    session: &CaptureSession,
    output: &OutputConfig,
    frames: u64,
    wall_clock: bool,
    shutdown: &AtomicBool,
) -> Result<u64, CaptureError> {
    let mut buffer = vec![0u8; output.frame_size()];
    let period = output.frame_rate.frame_duration();
    let start = Instant::now();
    let mut sent = 0;

    for n in 0..frames {
        if shutdown.load(Ordering::SeqCst) || session.state() != CaptureState::Active {
            break;
        }
        buffer.fill(test_level(n));

        let mut base = CaptureBaseData::new(n);
        if wall_clock {
            base = base.with_timecode(Timecode::from_time_of_day(
                Local::now().time(),
                output.frame_rate,
            ));
        }
        session.capture_frame(&base, None, &mut buffer, output.width, output.height)?;
        sent += 1;

        if !output.wait_for_sync_event {
            let target = start + period.mul_f64((n + 1) as f64);
            if let Some(remaining) = target.checked_duration_since(Instant::now()) {
                thread::sleep(remaining);
            }
        }
    }
    Ok(sent)
}

/// Flat grey level cycling with the frame count.
fn test_level(frame_number: u64) -> u8 {
    (frame_number.wrapping_mul(4) % 256) as u8
}

fn read_back(
    frame: &LoopbackFrame,
    field: FieldArg,
    pool_config: &PoolConfig,
    rate: FrameRate,
) -> Result<Readback, SampleError> {
    let capacity = pool_config.capacity.max(1);
    let pool = if pool_config.preallocate {
        TextureSamplePool::with_preallocated(capacity, frame.data.len())
    } else {
        TextureSamplePool::new(capacity)
    };
    let mut sample = pool.acquire()?;

    let data = VideoFrameData::new(&frame.data, frame.stride, frame.width, frame.height);
    let time = rate.frame_duration().mul_f64(frame.frame_number as f64);
    let timing = SampleTiming::new(time, rate, Some(frame.timecode));
    let is_srgb = !frame.format.is_yuv();
    match field {
        FieldArg::None => sample.initialize_progressive(&data, frame.format, &timing, is_srgb)?,
        FieldArg::Even => {
            sample.initialize_interlaced_halved(&data, frame.format, &timing, true, is_srgb)?
        }
        FieldArg::Odd => {
            sample.initialize_interlaced_halved(&data, frame.format, &timing, false, is_srgb)?
        }
    }

    // Only a progressive sample keeps the full block rows of the pattern.
    let burned_timecode = if field == FieldArg::None {
        decode_timecode(
            sample.buffer(),
            sample.stride(),
            sample.width(),
            sample.height(),
            frame.format,
        )
        .map(|tc| tc.to_string())
    } else {
        None
    };

    Ok(Readback {
        width: sample.width(),
        height: sample.height(),
        stride: sample.stride(),
        format: frame.format,
        field: sample.field(),
        srgb: sample.is_output_srgb(),
        timecode: sample.timecode().map(|tc| tc.to_string()),
        burned_timecode,
    })
}

fn print_summary(summary: &RunSummary, ignore_alpha_after: bool) {
    println!();
    println!("{}", colors::header("Session"));
    println!("  {}  {}", colors::pad_left("Port", 12, colors::dim), summary.port);
    println!(
        "  {}  {}",
        colors::pad_left("State", 12, colors::dim),
        colors::state(&summary.state.to_string())
    );
    println!(
        "  {}  {} sent, {} completed, {} dropped in {} ms",
        colors::pad_left("Frames", 12, colors::dim),
        colors::number(&summary.frames_sent.to_string()),
        colors::number(&summary.frames_completed.to_string()),
        colors::number(&summary.frames_dropped.to_string()),
        summary.elapsed_ms
    );
    println!(
        "  {}  {}",
        colors::pad_left("Alpha ignored", 12, colors::dim),
        if ignore_alpha_after {
            colors::yes()
        } else {
            colors::no()
        }
    );
    if let Some(error) = &summary.error {
        println!("  {}  {}", colors::pad_left("Error", 12, colors::dim), error);
    }

    if let Some(readback) = &summary.readback {
        println!("{}", colors::header("Last frame"));
        println!(
            "  {}  {}x{} ({} bytes/row, {:?}, field {:?})",
            colors::pad_left("Sample", 12, colors::dim),
            readback.width,
            readback.height,
            readback.stride,
            readback.format,
            readback.field
        );
        println!(
            "  {}  {}",
            colors::pad_left("sRGB", 12, colors::dim),
            if readback.srgb { colors::yes() } else { colors::no() }
        );
        if let Some(timecode) = &readback.timecode {
            println!(
                "  {}  {}",
                colors::pad_left("Timecode", 12, colors::dim),
                colors::number(timecode)
            );
        }
        if let Some(burned) = &readback.burned_timecode {
            println!(
                "  {}  {}",
                colors::pad_left("Burned in", 12, colors::dim),
                colors::number(burned)
            );
        }
    }
}

/// Print the configuration file location.
pub fn config_path(json: bool, quiet: bool) -> ExitCode {
    match config::get_config_path() {
        Ok(path) => {
            let path = path.display().to_string();
            if json {
                println!("{}", serde_json::json!({ "path": path }));
            } else {
                println!("{}", colors::path(&path));
            }
            ExitCode::Success
        }
        Err(e) => {
            if !quiet {
                eprintln!("{}", colors::error(&e));
            }
            ExitCode::GeneralError
        }
    }
}

/// Print the effective configuration as JSON.
pub fn config_show(json: bool) -> ExitCode {
    let config = config::load_config();
    match serde_json::to_string_pretty(&config) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::Success
        }
        Err(e) => {
            if !json {
                eprintln!("{}", colors::error(&e.to_string()));
            }
            ExitCode::GeneralError
        }
    }
}

/// Write the default configuration file.
pub fn config_init(force: bool, json: bool, quiet: bool) -> ExitCode {
    if !force {
        if let Ok(path) = config::get_config_path() {
            if path.exists() {
                if !quiet {
                    eprintln!(
                        "{}",
                        colors::warning(&format!(
                            "{} already exists (use --force to overwrite)",
                            path.display()
                        ))
                    );
                }
                return ExitCode::GeneralError;
            }
        }
    }

    match config::save_config(&MediaConfig::default()) {
        Ok(path) => {
            let path = path.display().to_string();
            if json {
                println!("{}", serde_json::json!({ "status": "written", "path": path }));
            } else if !quiet {
                println!("{} {}", colors::success("Wrote"), colors::path(&path));
            }
            ExitCode::Success
        }
        Err(e) => {
            if !quiet {
                eprintln!("{}", colors::error(&e));
            }
            ExitCode::GeneralError
        }
    }
}

/// Show version information.
pub fn version(json: bool) {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        println!(r#"{{"version": "{}"}}"#, version);
    } else {
        println!("{} {}", colors::bold("ajamedia"), version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let mut output = OutputConfig::default();
        let args = OutputArgs {
            port: Some("device0/single3".to_string()),
            width: Some(1280),
            height: Some(720),
            rate: Some("59.94".to_string()),
            pixel_format: Some("rgb10".to_string()),
            key: true,
            wait_sync: true,
            burn_timecode: false,
        };
        apply_overrides(&mut output, &args).unwrap();

        assert_eq!(output.port, "device0/single3");
        assert_eq!((output.width, output.height), (1280, 720));
        assert_eq!(output.frame_rate, FrameRate::FPS_59_94);
        assert_eq!(output.pixel_format, OutputPixelFormat::Rgb10Bit);
        assert!(output.uses_key());
        assert!(output.wait_for_sync_event);
        assert!(!output.encode_timecode_in_texel);
    }

    #[test]
    fn test_bad_overrides() {
        let mut output = OutputConfig::default();
        let bad_rate = OutputArgs {
            rate: Some("fast".to_string()),
            ..OutputArgs::default()
        };
        assert!(apply_overrides(&mut output, &bad_rate).is_err());

        let bad_format = OutputArgs {
            pixel_format: Some("rgb565".to_string()),
            ..OutputArgs::default()
        };
        assert!(apply_overrides(&mut output, &bad_format).is_err());
        assert_eq!(output, OutputConfig::default());
    }

    #[test]
    fn test_render_and_read_back() {
        let (session, controller) = loopback_session();
        let output = OutputConfig {
            width: 640,
            height: 480,
            frame_rate: FrameRate::FPS_60,
            pixel_format: OutputPixelFormat::Rgba8Bit,
            encode_timecode_in_texel: true,
            ..OutputConfig::default()
        };
        session.start_capture(&output, None).unwrap();

        let shutdown = AtomicBool::new(false);
        assert_eq!(render_frames(&session, &output, 3, false, &shutdown), Ok(3));
        session.stop_capture(true);

        let frame = controller.last_frame().unwrap();
        let progressive =
            read_back(&frame, FieldArg::None, &PoolConfig::default(), output.frame_rate).unwrap();
        assert_eq!((progressive.width, progressive.height), (640, 480));
        assert!(progressive.srgb);
        assert_eq!(progressive.burned_timecode.as_deref(), Some("00:00:00:02"));

        let odd = read_back(&frame, FieldArg::Odd, &PoolConfig::default(), output.frame_rate)
            .unwrap();
        assert_eq!(odd.height, 240);
        assert_eq!(odd.field, InterlaceField::Odd);
        assert!(odd.burned_timecode.is_none());
    }

    #[test]
    fn test_shutdown_stops_rendering() {
        let (session, _controller) = loopback_session();
        let output = OutputConfig {
            width: 320,
            height: 240,
            ..OutputConfig::default()
        };
        session.start_capture(&output, None).unwrap();

        let shutdown = AtomicBool::new(true);
        assert_eq!(render_frames(&session, &output, 10, false, &shutdown), Ok(0));
    }

    #[test]
    fn test_test_level_cycles() {
        assert_eq!(test_level(0), 0);
        assert_eq!(test_level(1), 4);
        assert_eq!(test_level(64), 0);
    }
}
