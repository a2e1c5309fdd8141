//! # Error Handling
//!
//! Error taxonomy for the certificate issuance engine, built with `thiserror`.
//!
//! - [`Error::Config`]: CA material missing, corrupt or undecryptable. Fatal at startup.
//! - [`Error::Validation`]: a single request is rejected before any key material exists.
//! - [`Error::Signing`]: key generation, serialization or external-tool failure.
//! - [`Error::Parse`]: a supplied certificate could not be decoded.

/// Custom result type for certforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the certificate issuance engine
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors (CA material, environment)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Key generation, signing or serialization failures
    #[error("Signing error: {message}")]
    Signing {
        message: String,
        /// Captured diagnostic output of a failed external tool
        diagnostics: Option<String>,
    },

    /// Malformed certificate input
    #[error("Parse error: {0}")]
    Parse(String),

    /// Duplicate unique key in the persistence collaborator
    #[error("Resource conflict: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a signing error
    pub fn signing<S: Into<String>>(message: S) -> Self {
        Self::Signing {
            message: message.into(),
            diagnostics: None,
        }
    }

    /// Create a signing error carrying the output of a failed tool invocation
    pub fn signing_with_diagnostics<S: Into<String>, D: Into<String>>(
        message: S,
        diagnostics: D,
    ) -> Self {
        Self::Signing {
            message: message.into(),
            diagnostics: Some(diagnostics.into()),
        }
    }

    /// Create a parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io {
            source,
            context: context.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Short machine-readable name of the error kind, used in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration",
            Error::Validation { .. } => "validation",
            Error::Signing { .. } => "signing",
            Error::Parse(_) => "parse",
            Error::Conflict(_) => "conflict",
            Error::NotFound(_) => "not_found",
            Error::Io { .. } => "io",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            source: error,
            context: "I/O operation failed".to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
