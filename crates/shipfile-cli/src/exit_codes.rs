//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: u8 = 0;

/// General error - unspecified failure
pub const ERROR: u8 = 1;

/// Validation error - malformed selector or state value
pub const VALIDATION_ERROR: u8 = 2;

/// Template error - manifest or release template failed to render
pub const TEMPLATE_ERROR: u8 = 3;

/// State error - invalid manifest, import or environment
pub const STATE_ERROR: u8 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: u8 = 5;

/// Release error - a helm operation or hook failed
pub const RELEASE_ERROR: u8 = 6;
