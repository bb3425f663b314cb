//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
#[allow(dead_code)]
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Values error - an assignment or values file could not be used
pub const VALUES_ERROR: i32 = 2;

/// Template error - a template failed to parse or render
pub const TEMPLATE_ERROR: i32 = 3;

/// Project error - missing or invalid Chart.yaml, unknown preset
pub const PROJECT_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Connectivity error - a live lookup could not reach the node
pub const CONNECTIVITY_ERROR: i32 = 6;

/// Merge error - full-mode assembly did not produce a valid document
pub const MERGE_ERROR: i32 = 7;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
