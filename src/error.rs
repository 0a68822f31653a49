//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Sprocket.
//! Every error maps to a stable error code for JSON output.
//!
//! # Error Categories
//! - Parameter errors: `DuplicateParameter`, `ParameterNotFound`
//! - Decoding errors: `ScalarCast`, `InvalidCast`, `UnsupportedConversion`, `EnumParse`
//! - Driver errors: `ConnectionFailed`, `QueryFailed`, `EngineError`
//! - Caller errors: `InvalidInput`
//! - Configuration errors: `ConfigError`
//!
//! Driver errors are mapped once, at the driver boundary. The executor never
//! rewraps them, so a failure reaches the caller exactly as the driver reported it.

use thiserror::Error;

/// Main error type for Sprocket operations
#[derive(Error, Debug)]
pub enum SprocketError {
    /// A parameter with the same name is already in the set
    #[error("Duplicate parameter: '{0}' is already defined in this parameter set")]
    DuplicateParameter(String),

    /// Lookup of a parameter name that was never added
    #[error("Parameter not found: '{0}'")]
    ParameterNotFound(String),

    /// The scalar returned by a procedure cannot be converted to the requested type
    #[error("Scalar cast failed: procedure returned {actual}, caller requested {expected}")]
    ScalarCast { expected: &'static str, actual: &'static str },

    /// `read` was asked to convert NULL or an incompatible value
    #[error(
        "Cannot cast {actual} to {expected}. If the value may be NULL, use read_nullable instead"
    )]
    InvalidCast { expected: &'static str, actual: &'static str },

    /// `read_nullable` found a non-NULL value of a type that can never convert.
    ///
    /// This signals a programming error (the column was expected to hold
    /// the requested type or NULL), not a recoverable runtime condition.
    #[error("Unsupported conversion: expected {expected} or NULL, found {actual}")]
    UnsupportedConversion { expected: &'static str, actual: &'static str },

    /// Label or numeric value does not name a member of the enum
    #[error("'{input}' is not a member of enum {enum_name}")]
    EnumParse { enum_name: &'static str, input: String },

    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Procedure execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Engine-specific database error
    #[error("Engine error ({engine}): {detail}")]
    EngineError { engine: String, detail: String },

    /// Configuration error (file not found, invalid JSON, missing connection)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SprocketError {
    /// Convert error to error code string for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateParameter(_) => "DUPLICATE_PARAMETER",
            Self::ParameterNotFound(_) => "PARAMETER_NOT_FOUND",
            Self::ScalarCast { .. } => "SCALAR_CAST",
            Self::InvalidCast { .. } => "INVALID_CAST",
            Self::UnsupportedConversion { .. } => "UNSUPPORTED_CONVERSION",
            Self::EnumParse { .. } => "ENUM_PARSE",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::EngineError { .. } => "ENGINE_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Human-readable message, safe for JSON output (never contains connection strings)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a duplicate parameter error
    pub fn duplicate_parameter(name: impl Into<String>) -> Self {
        Self::DuplicateParameter(name.into())
    }

    /// Create a parameter not found error
    pub fn parameter_not_found(name: impl Into<String>) -> Self {
        Self::ParameterNotFound(name.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an engine-specific error
    pub fn engine_error(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::EngineError { engine: engine.into(), detail: detail.into() }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create an enum parse error
    pub fn enum_parse(enum_name: &'static str, input: impl Into<String>) -> Self {
        Self::EnumParse { enum_name, input: input.into() }
    }
}

/// Result type alias for Sprocket operations
pub type Result<T> = std::result::Result<T, SprocketError>;
