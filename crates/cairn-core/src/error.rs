//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A `--set` style assignment or key path could not be parsed
    #[error("Invalid value assignment '{input}': {message}")]
    ValueParse { input: String, message: String },

    /// A values file was unreadable or not structured data
    #[error("Invalid values file {path}: {message}")]
    ValueFile { path: String, message: String },

    #[error("Project not found: {path}")]
    ProjectNotFound { path: String },

    #[error("Invalid Chart.yaml: {message}")]
    InvalidProject { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version contract '{input}': {message}")]
    InvalidVersion { input: String, message: String },

    #[error("Invalid secrets bundle {path}: {message}")]
    InvalidSecrets { path: String, message: String },

    #[error("Invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("Invalid modeline: {message}")]
    Modeline { message: String },
}

impl CoreError {
    pub(crate) fn value_parse(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValueParse {
            input: input.into(),
            message: message.into(),
        }
    }

    pub(crate) fn value_file(path: &std::path::Path, message: impl ToString) -> Self {
        Self::ValueFile {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
