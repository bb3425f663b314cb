//! CLI command implementations

pub mod init;
pub mod template;
