//! CLI error type with exit code handling
//!
//! Library errors pass through with their diagnostics intact; the variant
//! decides the process exit code.

use cairn_core::CoreError;
use cairn_engine::EngineError;
use cairn_node::NodeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Rendering, assembly or value layering failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    /// The lookup provider could not be set up
    #[error(transparent)]
    #[diagnostic(
        code(cairn::cli::node),
        help("Pass --offline to render without a node, or check --node-config")
    )]
    Node(#[from] NodeError),

    /// Project loading or option parsing failed
    #[error(transparent)]
    #[diagnostic(code(cairn::cli::project))]
    Project(#[from] CoreError),

    /// Invalid arguments
    #[error("{message}")]
    #[diagnostic(code(cairn::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file exists, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(cairn::cli::io))]
    Io {
        message: String,
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(e) => match e {
                EngineError::TemplateSyntax(_) | EngineError::TemplateExecution(_) => {
                    exit_codes::TEMPLATE_ERROR
                }
                EngineError::Connectivity(_) => exit_codes::CONNECTIVITY_ERROR,
                EngineError::MergeConflict { .. } => exit_codes::MERGE_ERROR,
                EngineError::Values(core) => core_exit_code(core),
                EngineError::Io(_) => exit_codes::IO_ERROR,
                EngineError::Yaml(_) => exit_codes::ERROR,
            },
            CliError::Node(e) if e.is_connectivity() => exit_codes::CONNECTIVITY_ERROR,
            CliError::Node(_) => exit_codes::ERROR,
            CliError::Project(core) => core_exit_code(core),
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
        }
    }

    pub fn usage(message: impl Into<String>, help: Option<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help,
        }
    }

    pub fn io_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

fn core_exit_code(err: &CoreError) -> i32 {
    match err {
        CoreError::ValueParse { .. } | CoreError::ValueFile { .. } => exit_codes::VALUES_ERROR,
        CoreError::Io(_) | CoreError::InvalidSecrets { .. } => exit_codes::IO_ERROR,
        CoreError::InvalidVersion { .. } => exit_codes::USAGE_ERROR,
        _ => exit_codes::PROJECT_ERROR,
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
            help: None,
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
