//! AJA Media Common Library
//!
//! Shared value types, input validation and log directory resolution used by
//! the capture/output library and the command-line front end.

pub mod logging;
pub mod types;
pub mod validation;

pub use types::*;
pub use validation::ValidationError;
