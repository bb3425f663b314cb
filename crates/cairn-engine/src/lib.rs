//! Cairn Engine - Jinja2 rendering of machine configuration templates
//!
//! This crate provides:
//! - A MiniJinja environment with a YAML-oriented function library
//! - Node discovery helpers backed by a lookup provider, empty when offline
//! - Named blocks shared across every file of a render
//! - Patch and full-document assembly
//! - Diagnostics with file, line and "did you mean" hints

pub mod assembler;
pub mod base;
pub mod definitions;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod pipeline;
pub mod suggestions;

pub use assembler::{Assembler, AssemblyMode, FullOptions};
pub use base::{BaseConfig, BaseConfigInput};
pub use discovery::Discovery;
pub use engine::{Engine, EngineBuilder, RenderedFragment, TemplateSource};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use pipeline::{RenderOptions, RenderOutput, render};
pub use suggestions::{AVAILABLE_FILTERS, AVAILABLE_FUNCTIONS};
