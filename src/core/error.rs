//! Error handling for the template engine
//!
//! Two types cooperate here:
//! - [`BladeError`] - enumerated failure cases raised by compilation, caching and rendering
//! - [`ErrorContext`] - wrapper that adds user-facing details and suggestions
//!
//! # Error Categories
//!
//! - **Compile errors** abort the current render and carry the offending template name:
//!   [`BladeError::SourceNotFound`], [`BladeError::DirectiveSyntax`],
//!   [`BladeError::HostSyntax`], [`BladeError::CircularReference`]
//! - **Render errors** come from Tera while executing a compiled template:
//!   [`BladeError::Render`]
//! - **Cache errors** never fail a render: [`BladeError::CacheFull`] is returned by
//!   the cache and logged by the engine, [`BladeError::InvalidationIo`] is only logged
//! - **Configuration and I/O**: [`BladeError::Config`], [`BladeError::IoError`],
//!   [`BladeError::JsonError`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use blade_engine::core::{BladeError, user_friendly_error};
//!
//! let error = BladeError::SourceNotFound {
//!     name: "pages/hom.blade.tpl".to_string(),
//!     referenced_by: None,
//!     suggestions: vec!["pages/home.blade.tpl".to_string()],
//! };
//!
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // colored error with "did you mean" suggestion
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T, E = BladeError> = std::result::Result<T, E>;

/// The main error type for engine operations.
///
/// Compile-time variants always name the template that failed so a caller
/// rendering many pages can tell which one is broken.
#[derive(Error, Debug)]
pub enum BladeError {
    /// A template, layout or include target could not be resolved
    #[error("Template '{name}' not found{}", referenced_suffix(.referenced_by))]
    SourceNotFound {
        /// Logical name that failed to resolve
        name: String,
        /// Template whose `@extends` / `@include` pointed at the missing name
        referenced_by: Option<String>,
        /// Similar names that do exist
        suggestions: Vec<String>,
    },

    /// Malformed directive syntax (unbalanced markers, bad arguments)
    #[error("Directive syntax error in '{template}' at line {line}: {message}")]
    DirectiveSyntax {
        /// Template being compiled
        template: String,
        /// 1-based line of the offending directive
        line: usize,
        /// What went wrong
        message: String,
    },

    /// The compiled text was rejected by the Tera parser
    #[error("Compiled template '{template}' failed Tera validation: {message}")]
    HostSyntax {
        /// Template being compiled
        template: String,
        /// Cleaned Tera error chain
        message: String,
    },

    /// An `@include` / `@extends` chain loops back on itself or nests too deep
    #[error("Circular template reference: {}", .chain.join(" -> "))]
    CircularReference {
        /// Load stack at the point the cycle was found, ending with the repeated name
        chain: Vec<String>,
    },

    /// Tera failed while executing a compiled template
    #[error("Failed to render '{template}': {message}")]
    Render {
        /// Template being rendered
        template: String,
        /// Cleaned Tera error chain
        message: String,
    },

    /// An artifact did not fit into the cache even after eviction
    #[error("Cache full: '{name}' needs {size} bytes but the budget is {max_size} bytes")]
    CacheFull {
        /// Logical name of the rejected artifact
        name: String,
        /// Size of the rejected artifact
        size: usize,
        /// Configured budget
        max_size: usize,
    },

    /// Best-effort cleanup of a derived disk artifact failed
    #[error("Failed to remove derived artifact {path}")]
    InvalidationIo {
        /// File that could not be removed
        path: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Invalid engine configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong
        message: String,
    },

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

fn referenced_suffix(referenced_by: &Option<String>) -> String {
    referenced_by
        .as_ref()
        .map(|parent| format!(" (referenced by '{parent}')"))
        .unwrap_or_default()
}

impl BladeError {
    /// Name of the template the error is about, when there is one.
    #[must_use]
    pub fn template(&self) -> Option<&str> {
        match self {
            Self::SourceNotFound { name, .. } | Self::CacheFull { name, .. } => Some(name),
            Self::DirectiveSyntax { template, .. }
            | Self::HostSyntax { template, .. }
            | Self::Render { template, .. } => Some(template),
            Self::CircularReference { chain } => chain.first().map(String::as_str),
            _ => None,
        }
    }

    /// Whether the error aborts a render (as opposed to cache-only failures).
    #[must_use]
    pub const fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::DirectiveSyntax { .. }
                | Self::HostSyntax { .. }
                | Self::CircularReference { .. }
        )
    }

    pub(crate) fn directive(template: &str, line: usize, message: impl Into<String>) -> Self {
        Self::DirectiveSyntax {
            template: template.to_string(),
            line,
            message: message.into(),
        }
    }
}

// `std::io::Error` and `serde_json::Error` are not `Clone`, so those variants
// are rebuilt from their kind and message.
impl Clone for BladeError {
    fn clone(&self) -> Self {
        match self {
            Self::SourceNotFound {
                name,
                referenced_by,
                suggestions,
            } => Self::SourceNotFound {
                name: name.clone(),
                referenced_by: referenced_by.clone(),
                suggestions: suggestions.clone(),
            },
            Self::DirectiveSyntax {
                template,
                line,
                message,
            } => Self::DirectiveSyntax {
                template: template.clone(),
                line: *line,
                message: message.clone(),
            },
            Self::HostSyntax { template, message } => Self::HostSyntax {
                template: template.clone(),
                message: message.clone(),
            },
            Self::CircularReference { chain } => Self::CircularReference {
                chain: chain.clone(),
            },
            Self::Render { template, message } => Self::Render {
                template: template.clone(),
                message: message.clone(),
            },
            Self::CacheFull {
                name,
                size,
                max_size,
            } => Self::CacheFull {
                name: name.clone(),
                size: *size,
                max_size: *max_size,
            },
            Self::InvalidationIo { path, source } => Self::InvalidationIo {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::Config { message } => Self::Config {
                message: message.clone(),
            },
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::JsonError(e) => Self::Config {
                message: format!("JSON error: {e}"),
            },
        }
    }
}

/// Error wrapper carrying user-facing details and a suggestion.
///
/// This is what the `blade` binary prints when a command fails.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: BladeError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: BladeError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr: error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`].
///
/// Recognizes [`BladeError`] (anywhere in the anyhow chain), [`std::io::Error`]
/// and [`toml::de::Error`]; everything else is wrapped as a configuration error
/// carrying the full message.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(blade_error) = cause.downcast_ref::<BladeError>() {
            return create_error_context(blade_error.clone());
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let kind = io_error.kind();
        let ctx = ErrorContext::new(BladeError::IoError(std::io::Error::new(
            kind,
            format!("{error:#}"),
        )));
        return match kind {
            std::io::ErrorKind::PermissionDenied => ctx
                .with_suggestion("Check file ownership and permissions of the templates and cache directories"),
            std::io::ErrorKind::NotFound => {
                ctx.with_suggestion("Check that the file or directory exists and the path is correct")
            }
            _ => ctx,
        };
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(BladeError::Config {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of your configuration file");
    }

    ErrorContext::new(BladeError::Config {
        message: format!("{error:#}"),
    })
}

fn create_error_context(error: BladeError) -> ErrorContext {
    match &error {
        BladeError::SourceNotFound { suggestions, .. } => {
            let ctx = ErrorContext::new(error.clone())
                .with_details("Template names are resolved relative to the templates directory");
            if suggestions.is_empty() {
                ctx.with_suggestion("Check the spelling and extension of the template name")
            } else {
                ctx.with_suggestion(format!("Did you mean: {}?", suggestions.join(", ")))
            }
        }
        BladeError::DirectiveSyntax { .. } => ErrorContext::new(error).with_suggestion(
            "Make sure every @section, @if, @unless, @foreach and @block has its matching closing directive",
        ),
        BladeError::HostSyntax { .. } => ErrorContext::new(error)
            .with_details("The compiled output could not be parsed by Tera")
            .with_suggestion("Run 'blade compile <name>' to inspect the generated template"),
        BladeError::CircularReference { .. } => ErrorContext::new(error)
            .with_suggestion("Remove the @include or @extends that points back into the chain"),
        BladeError::Render { .. } => ErrorContext::new(error)
            .with_suggestion("Check that the data passed to the template defines every variable it uses"),
        BladeError::CacheFull { .. } => ErrorContext::new(error)
            .with_suggestion("Increase cache.max_size_mb in the configuration file"),
        _ => ErrorContext::new(error),
    }
}
