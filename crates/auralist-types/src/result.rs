//! Result type alias for Auralist operations

use crate::Error;

/// Result type alias for Auralist operations
pub type Result<T> = std::result::Result<T, Error>;
