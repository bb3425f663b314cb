//! Cairn Core - Core types for the machine configuration renderer
//!
//! This crate provides the foundational types used throughout cairn:
//! - `Values`: Configuration values with deep merge and `--set` layering
//! - `Project`: The `Chart.yaml` project definition and its static defaults
//! - `TemplateContext`: Template rendering context
//! - `VersionContract`: Target operating system version
//! - `SecretsBundle`: Read-only cluster secrets
//! - `Modeline`: Metadata line prefixed to rendered output
//! - `SchemaValidator`: Shape validation of assembled documents

pub mod context;
pub mod error;
pub mod modeline;
pub mod project;
pub mod schema;
pub mod secrets;
pub mod strvals;
pub mod values;
pub mod version;

pub use context::{ChartInfo, TemplateContext, VersionInfo};
pub use error::{CoreError, Result};
pub use modeline::Modeline;
pub use project::{Chart, ChartKind, GlobalOptions, Project, TemplateOptions};
pub use schema::{SchemaValidator, ValidationErrorInfo, ValidationResult};
pub use secrets::SecretsBundle;
pub use values::{SetKind, SetSpec, ValueSources, Values, deep_merge};
pub use version::VersionContract;
