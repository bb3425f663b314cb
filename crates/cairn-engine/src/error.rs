//! Engine error types with source-annotated template diagnostics

use std::ops::Range;

use cairn_core::CoreError;
use cairn_node::NodeError;
use miette::{Diagnostic, NamedSource, SourceSpan};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::suggestions::{
    AVAILABLE_FUNCTIONS, extract_quoted_name, suggest_iteration_fix, suggest_undefined, suggest_unknown_filter,
    suggest_unknown_function,
};

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    /// A template failed to parse; nothing was rendered
    #[error(transparent)]
    #[diagnostic(transparent)]
    TemplateSyntax(TemplateError),

    /// A template failed while rendering; nothing is returned
    #[error(transparent)]
    #[diagnostic(transparent)]
    TemplateExecution(TemplateError),

    /// A live lookup could not reach the node
    #[error(transparent)]
    #[diagnostic(
        code(cairn::node::connectivity),
        help("Check the endpoint, or render with --offline to skip lookups")
    )]
    Connectivity(#[from] NodeError),

    /// Full-mode assembly produced a document that is not a machine config
    #[error("Merge conflict at {path}: {message}")]
    #[diagnostic(code(cairn::merge::conflict))]
    MergeConflict { path: String, message: String },

    #[error(transparent)]
    #[diagnostic(code(cairn::values))]
    Values(#[from] CoreError),

    #[error("IO error: {0}")]
    #[diagnostic(code(cairn::io))]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    #[diagnostic(code(cairn::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    pub fn merge_conflict(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MergeConflict {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The template diagnostic, for syntax and execution failures
    pub fn template_error(&self) -> Option<&TemplateError> {
        match self {
            Self::TemplateSyntax(e) | Self::TemplateExecution(e) => Some(e),
            _ => None,
        }
    }
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

impl TemplateErrorKind {
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::UndefinedVariable => "undefined_variable",
            Self::UnknownFilter => "unknown_filter",
            Self::UnknownFunction => "unknown_function",
            Self::SyntaxError => "syntax",
            Self::TypeError => "type",
            Self::InvalidOperation => "invalid_operation",
            Self::Other => "render",
        }
    }
}

/// Where a MiniJinja error points, after undoing engine-side source rewrites
#[derive(Debug, Clone)]
pub struct Origin<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub line: Option<usize>,
    /// Byte range in `source`
    pub range: Option<Range<usize>>,
}

/// Template error with the offending file, line and a fix hint
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{location}: {message}")]
#[diagnostic(code(cairn::template))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    /// `file` or `file:line`
    pub location: String,

    pub template: String,

    pub line: Option<usize>,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Build from an error whose name, line and range refer to `source` as-is
    pub fn from_minijinja(err: &minijinja::Error, template_name: &str, template_source: &str) -> Self {
        Self::at(
            err,
            Origin {
                name: template_name,
                source: template_source,
                line: err.line(),
                range: err.range(),
            },
            None,
        )
    }

    /// Build from an error at an explicit origin; `values` sharpens the hint
    pub fn at(err: &minijinja::Error, origin: Origin<'_>, values: Option<&JsonValue>) -> Self {
        let expression = origin
            .range
            .as_ref()
            .and_then(|r| origin.source.get(r.clone()))
            .map(str::trim)
            .filter(|e| !e.is_empty() && !e.contains('\n'))
            .map(str::to_string);

        let kind = match categorize(err) {
            // A helper that failed keeps its own message
            TemplateErrorKind::UnknownFunction if !is_unknown_callable(err, expression.as_deref()) => {
                TemplateErrorKind::Other
            }
            kind => kind,
        };

        let message = describe(err, kind, expression.as_deref());
        let suggestion = suggest(err, kind, expression.as_deref(), values);

        let span = match (&origin.range, origin.line) {
            (Some(range), _) if range.end <= origin.source.len() => {
                Some(SourceSpan::new(range.start.into(), range.end - range.start))
            }
            (_, Some(line)) => line_span(origin.source, line),
            _ => None,
        };

        let location = match origin.line {
            Some(line) => format!("{}:{}", origin.name, line),
            None => origin.name.to_string(),
        };

        Self {
            message,
            kind,
            location,
            template: origin.name.to_string(),
            line: origin.line,
            src: NamedSource::new(origin.name, origin.source.to_string()),
            span,
            suggestion,
        }
    }

    /// Error without source mapping
    pub fn simple(template: impl Into<String>, message: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            message: message.into(),
            kind: TemplateErrorKind::Other,
            location: template.clone(),
            src: NamedSource::new(template.clone(), String::new()),
            template,
            line: None,
            span: None,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

fn categorize(err: &minijinja::Error) -> TemplateErrorKind {
    use minijinja::ErrorKind;

    match err.kind() {
        ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        ErrorKind::NonPrimitive
        | ErrorKind::NonKey
        | ErrorKind::MissingArgument
        | ErrorKind::TooManyArguments => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::Other,
    }
}

// minijinja reports a missing callable as "<name> is unknown"
fn is_unknown_callable(err: &minijinja::Error, expression: Option<&str>) -> bool {
    let registered = expression.is_some_and(|e| AVAILABLE_FUNCTIONS.contains(&function_name(e).as_str()));
    !registered && err.detail().is_none_or(|d| d.ends_with(" is unknown"))
}

fn describe(err: &minijinja::Error, kind: TemplateErrorKind, expression: Option<&str>) -> String {
    let detail = err.detail().map(str::to_string);

    match (kind, expression) {
        (TemplateErrorKind::UndefinedVariable, Some(expr)) => format!("undefined variable `{expr}`"),
        (TemplateErrorKind::UnknownFilter, Some(expr)) => {
            format!("unknown filter `{}`", filter_name(expr))
        }
        (TemplateErrorKind::UnknownFunction, Some(expr)) => {
            format!("unknown function `{}`", function_name(expr))
        }
        (TemplateErrorKind::SyntaxError, _) => {
            format!("syntax error: {}", detail.unwrap_or_else(|| err.kind().to_string()))
        }
        _ => detail.unwrap_or_else(|| err.kind().to_string()),
    }
}

fn suggest(
    err: &minijinja::Error,
    kind: TemplateErrorKind,
    expression: Option<&str>,
    values: Option<&JsonValue>,
) -> Option<String> {
    let detail = err.detail().unwrap_or_default();

    match kind {
        TemplateErrorKind::UndefinedVariable => expression
            .and_then(|e| suggest_undefined(e.split('|').next().unwrap_or(e).trim(), values))
            .or_else(|| Some("Guard optional values with `{% if %}` or `| default(...)`".to_string())),
        TemplateErrorKind::UnknownFilter => expression
            .map(filter_name)
            .or_else(|| extract_quoted_name(detail))
            .map(|name| suggest_unknown_filter(&name)),
        TemplateErrorKind::UnknownFunction => expression
            .map(function_name)
            .or_else(|| extract_quoted_name(detail))
            .map(|name| suggest_unknown_function(&name)),
        TemplateErrorKind::SyntaxError => Some(
            "Check tag pairs: `{{ }}` for expressions, `{% %}` for statements, `{# #}` for comments"
                .to_string(),
        ),
        TemplateErrorKind::InvalidOperation | TemplateErrorKind::TypeError
            if detail.contains("not iterable") =>
        {
            let type_name = detail.split_whitespace().next().unwrap_or("value");
            Some(suggest_iteration_fix(type_name))
        }
        _ => None,
    }
}

// `values.x | toyml(2)` -> `toyml`; a bare `toyml` stays as is
fn filter_name(expression: &str) -> String {
    let tail = expression.rsplit('|').next().unwrap_or(expression);
    function_name(tail)
}

fn function_name(expression: &str) -> String {
    expression
        .trim()
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or(expression)
        .to_string()
}

/// Span covering a whole 1-based line
pub(crate) fn line_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (i, line) in source.split_inclusive('\n').enumerate() {
        if i + 1 == line_num {
            let len = line.trim_end_matches(['\n', '\r']).len();
            return Some(SourceSpan::new(offset.into(), len));
        }
        offset += line.len();
    }
    None
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
