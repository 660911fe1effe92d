//! Input validation for output configuration parameters.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{FrameRate, OutputConfig, PortName};

/// Port identifier pattern: `device<N>/single<M>`, case-insensitive.
static PORT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)device(\d{1,3})/single(\d{1,2})$").unwrap());

/// Maximum dimension value per side (8K DCI)
pub const MAX_DIMENSION: u32 = 8192;

/// Maximum supported frame rate in frames per second
pub const MAX_FRAME_RATE: f64 = 240.0;

/// Validation error types.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Port identifier does not match `device<N>/single<M>`
    InvalidPortName(String),
    /// Dimension (width/height) is out of valid range
    DimensionOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
    /// Frame rate is zero, malformed or too fast
    InvalidFrameRate(FrameRate),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidPortName(name) => write!(
                f,
                "Invalid port name: '{}' (expected device<N>/single<M>)",
                name
            ),
            ValidationError::DimensionOutOfRange { field, value, max } => {
                write!(f, "{} out of range: {} (max {})", field, value, max)
            }
            ValidationError::InvalidFrameRate(rate) => {
                write!(f, "Invalid frame rate: {}", rate)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Parse a port identifier such as `device0/single1`.
pub fn parse_port_name(name: &str) -> Result<PortName, ValidationError> {
    let invalid = || ValidationError::InvalidPortName(name.to_string());
    let captures = PORT_PATTERN.captures(name.trim()).ok_or_else(invalid)?;
    let device_index = captures[1].parse().map_err(|_| invalid())?;
    let port_index: u32 = captures[2].parse().map_err(|_| invalid())?;
    if port_index == 0 {
        return Err(invalid());
    }
    Ok(PortName::new(device_index, port_index))
}

/// Validate dimension values (width, height).
///
/// Dimensions must be positive and not exceed MAX_DIMENSION (8192).
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), ValidationError> {
    if width == 0 || width > MAX_DIMENSION {
        return Err(ValidationError::DimensionOutOfRange {
            field: "width",
            value: width,
            max: MAX_DIMENSION,
        });
    }
    if height == 0 || height > MAX_DIMENSION {
        return Err(ValidationError::DimensionOutOfRange {
            field: "height",
            value: height,
            max: MAX_DIMENSION,
        });
    }
    Ok(())
}

/// Validate a frame rate: non-zero terms, at most MAX_FRAME_RATE.
pub fn validate_frame_rate(rate: FrameRate) -> Result<(), ValidationError> {
    if rate.numerator == 0 || rate.denominator == 0 || rate.as_decimal() > MAX_FRAME_RATE {
        return Err(ValidationError::InvalidFrameRate(rate));
    }
    Ok(())
}

/// Validate the syntactic parts of an output configuration.
///
/// Device capabilities are checked separately by the device itself.
pub fn validate_output_config(config: &OutputConfig) -> Result<PortName, ValidationError> {
    let port = parse_port_name(&config.port)?;
    validate_dimensions(config.width, config.height)?;
    validate_frame_rate(config.frame_rate)?;
    Ok(port)
}
