//! Error types for runscribe.
//!
//! The recorder observes a run it must never break, so most of these errors
//! end their life as a `warn!` in the dispatcher. They are still typed so that
//! callers driving the renderer or writer directly can react to them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for runscribe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for runscribe.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Template Errors
    // ========================================================================
    /// Template source failed to compile.
    #[error("Template syntax error in '{template}': {message}")]
    TemplateSyntax {
        /// Template identifier
        template: String,
        /// Error message
        message: String,
    },

    /// Template evaluation failed.
    #[error("Template rendering failed for '{template}': {message}")]
    TemplateRender {
        /// Template identifier
        template: String,
        /// Error message
        message: String,
    },

    /// A variable could not be resolved while rendering in strict mode.
    #[error("Undefined variable in '{template}': {message}")]
    UndefinedVariable {
        /// Template identifier
        template: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Artifact Errors
    // ========================================================================
    /// Writing a rendered artifact failed.
    #[error("Failed to write artifact '{path}': {source}")]
    ArtifactWrite {
        /// Destination path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // IO and Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new template syntax error.
    pub fn template_syntax(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateSyntax {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Creates a new template render error.
    pub fn template_render(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateRender {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Creates a new artifact write error.
    pub fn artifact_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArtifactWrite {
            path: path.into(),
            source,
        }
    }

    /// Maps a minijinja error onto the template taxonomy.
    pub fn from_template(template: &str, err: &minijinja::Error) -> Self {
        let message = err.to_string();
        match err.kind() {
            minijinja::ErrorKind::SyntaxError | minijinja::ErrorKind::BadEscape => {
                Self::template_syntax(template, message)
            }
            minijinja::ErrorKind::UndefinedError => Self::UndefinedVariable {
                template: template.to_string(),
                message,
            },
            _ => Self::template_render(template, message),
        }
    }

    /// Returns true if this error only affects a single artifact.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UndefinedVariable { .. }
                | Error::ArtifactWrite { .. }
                | Error::TemplateRender { .. }
        )
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::InvalidConfig { .. } => 2,
            Error::Json(_) | Error::Yaml(_) | Error::Toml(_) => 3,
            Error::Io(_) | Error::ArtifactWrite { .. } => 4,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_errors_are_classified() {
        let env = minijinja::Environment::new();
        let err = env.template_from_str("{% if %}").unwrap_err();
        let mapped = Error::from_template("broken", &err);
        assert!(matches!(mapped, Error::TemplateSyntax { .. }));
        assert!(!mapped.is_recoverable());
    }

    #[test]
    fn test_undefined_errors_are_recoverable() {
        let mut env = minijinja::Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        let err = env
            .render_str("{{ missing }}", minijinja::context! {})
            .unwrap_err();
        let mapped = Error::from_template("strict", &err);
        assert!(matches!(mapped, Error::UndefinedVariable { .. }));
        assert!(mapped.is_recoverable());
    }

    #[test]
    fn test_context_wraps_source() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.context("writing README").unwrap_err();
        assert_eq!(err.to_string(), "writing README");
        assert_eq!(err.exit_code(), 1);
    }
}
