//! # Error Handling
//!
//! Central error taxonomy for the apidex engine. Every fallible operation in
//! the crate returns [`Result`]; errors carry a stable machine-readable code
//! (see [`ApidexError::code`]) that survives message rewording.

use std::fmt;

/// Custom result type for apidex operations
pub type Result<T> = std::result::Result<T, ApidexError>;

/// Main error type for the apidex engine
#[derive(thiserror::Error, Debug)]
pub enum ApidexError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Connection-level database failures; retriable
    #[error("Database connection error: {context}")]
    DatabaseConnection {
        context: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Input validation errors, with actionable suggestions for the caller
    #[error("Validation error: {message}")]
    Validation { message: String, parameter: Option<String>, suggestions: Vec<String> },

    /// A requested entity does not exist
    #[error("Resource not found: {resource_type} '{identifier}'")]
    ResourceNotFound { resource_type: String, identifier: String, suggestions: Vec<String> },

    /// Resource conflict errors (e.g. duplicate key)
    #[error("Resource conflict: {message}")]
    Conflict { message: String, resource_type: String },

    /// The document declares an OpenAPI/Swagger version we do not support
    #[error("Unsupported specification version: {version}")]
    UnsupportedVersion { version: String },

    /// Transient internal failure; safe to retry
    #[error("Transient error: {message}")]
    Transient { message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Circuit breaker is open for the named method
    #[error("Circuit open for '{method}', retry after {retry_after_ms}ms")]
    CircuitOpen { method: String, retry_after_ms: u64 },

    /// Bounded pool could not hand out a permit within the deadline
    #[error("Resource exhausted: {resource}")]
    ResourceExhausted { resource: String },

    /// Schema dependency resolution failed
    #[error("Schema resolution error: {message}")]
    SchemaResolution { message: String, circular_references: Vec<String> },

    /// Example/code generation failed
    #[error("Code generation error: {message}")]
    CodeGeneration { message: String },

    /// An applied migration no longer matches its source checksum
    #[error("Migration integrity error: {message}")]
    MigrationIntegrity { message: String },

    /// Persistent store failed an integrity check
    #[error("Data integrity error: {message}")]
    DataIntegrity { message: String },

    /// The input file is not valid JSON
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String, line: Option<u64>, column: Option<u64> },

    /// Input file exceeds the configured maximum size
    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    /// Input file does not exist or is unreadable
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// The parser crossed the configured memory ceiling
    #[error("Memory limit exceeded: {used_bytes} bytes (limit {limit_bytes})")]
    MemoryLimitExceeded { used_bytes: u64, limit_bytes: u64 },

    /// The document parsed but violates the OpenAPI skeleton
    #[error("Structure validation failed: {message}")]
    StructureValidation { message: String, path: Option<String>, suggestion: Option<String> },

    /// Generic repository failure wrapping an unexpected storage error
    #[error("Repository error: {message}")]
    Repository {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal server errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Stable machine-readable error codes surfaced to MCP clients and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    ResourceNotFound,
    UnsupportedVersion,
    DatabaseConnection,
    Transient,
    Timeout,
    CircuitOpen,
    ResourceExhausted,
    SchemaResolution,
    CodeGeneration,
    MigrationIntegrity,
    DataIntegrity,
    InvalidJson,
    FileTooLarge,
    FileNotFound,
    MemoryLimitExceeded,
    StructureValidation,
    Conflict,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "ValidationError",
            ErrorCode::ResourceNotFound => "ResourceNotFound",
            ErrorCode::UnsupportedVersion => "UnsupportedVersion",
            ErrorCode::DatabaseConnection => "DatabaseConnection",
            ErrorCode::Transient => "Transient",
            ErrorCode::Timeout => "Timeout",
            ErrorCode::CircuitOpen => "CircuitOpen",
            ErrorCode::ResourceExhausted => "ResourceExhausted",
            ErrorCode::SchemaResolution => "SchemaResolution",
            ErrorCode::CodeGeneration => "CodeGeneration",
            ErrorCode::MigrationIntegrity => "MigrationIntegrity",
            ErrorCode::DataIntegrity => "DataIntegrity",
            ErrorCode::InvalidJson => "InvalidJSON",
            ErrorCode::FileTooLarge => "FileTooLarge",
            ErrorCode::FileNotFound => "FileNotFound",
            ErrorCode::MemoryLimitExceeded => "MemoryLimitExceeded",
            ErrorCode::StructureValidation => "StructureValidation",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ApidexError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), parameter: None, suggestions: Vec::new() }
    }

    /// Create a validation error naming the offending parameter
    pub fn validation_param<S: Into<String>, P: Into<String>>(
        message: S,
        parameter: P,
        suggestions: Vec<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            parameter: Some(parameter.into()),
            suggestions,
        }
    }

    /// Create a not-found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, identifier: I) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
            suggestions: Vec::new(),
        }
    }

    /// Create a not-found error carrying lookup suggestions
    pub fn not_found_with_suggestions<R: Into<String>, I: Into<String>>(
        resource_type: R,
        identifier: I,
        suggestions: Vec<String>,
    ) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
            suggestions,
        }
    }

    /// Create a conflict error
    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    /// Create a database error with context
    pub fn database(source: sqlx::Error, context: impl Into<String>) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Create a transient error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient { message: message.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// Create a repository error wrapping an unexpected failure
    pub fn repository<S: Into<String>>(message: S) -> Self {
        Self::Repository { message: message.into(), source: None }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Create an invalid-JSON error with a best-effort location
    pub fn invalid_json<S: Into<String>>(message: S, line: Option<u64>, column: Option<u64>) -> Self {
        Self::InvalidJson { message: message.into(), line, column }
    }

    /// Create a structure-validation error
    pub fn structure<S: Into<String>>(message: S, path: Option<String>, suggestion: Option<String>) -> Self {
        Self::StructureValidation { message: message.into(), path, suggestion }
    }

    /// Stable error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            ApidexError::Validation { .. } => ErrorCode::ValidationError,
            ApidexError::ResourceNotFound { .. } => ErrorCode::ResourceNotFound,
            ApidexError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
            ApidexError::DatabaseConnection { .. } => ErrorCode::DatabaseConnection,
            ApidexError::Transient { .. } => ErrorCode::Transient,
            ApidexError::Timeout { .. } => ErrorCode::Timeout,
            ApidexError::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            ApidexError::ResourceExhausted { .. } => ErrorCode::ResourceExhausted,
            ApidexError::SchemaResolution { .. } => ErrorCode::SchemaResolution,
            ApidexError::CodeGeneration { .. } => ErrorCode::CodeGeneration,
            ApidexError::MigrationIntegrity { .. } => ErrorCode::MigrationIntegrity,
            ApidexError::DataIntegrity { .. } => ErrorCode::DataIntegrity,
            ApidexError::InvalidJson { .. } => ErrorCode::InvalidJson,
            ApidexError::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            ApidexError::FileNotFound { .. } => ErrorCode::FileNotFound,
            ApidexError::MemoryLimitExceeded { .. } => ErrorCode::MemoryLimitExceeded,
            ApidexError::StructureValidation { .. } => ErrorCode::StructureValidation,
            ApidexError::Conflict { .. } => ErrorCode::Conflict,
            ApidexError::Database { .. }
            | ApidexError::Config { .. }
            | ApidexError::Io { .. }
            | ApidexError::Serialization { .. }
            | ApidexError::Repository { .. }
            | ApidexError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Check whether a retry with unchanged input can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApidexError::DatabaseConnection { .. }
                | ApidexError::Transient { .. }
                | ApidexError::Timeout { .. }
        )
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for ApidexError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::PoolTimedOut => {
                Self::ResourceExhausted { resource: "database connection pool".to_string() }
            }
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) => Self::DatabaseConnection {
                context: "Database connection failed".to_string(),
                source: Some(error),
            },
            sqlx::Error::RowNotFound => {
                Self::not_found("Row", "query returned no rows")
            }
            sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE constraint") => {
                Self::Conflict {
                    message: db_err.message().to_string(),
                    resource_type: "row".to_string(),
                }
            }
            _ => Self::Database { source: error, context: "Database operation failed".to_string() },
        }
    }
}

impl From<std::io::Error> for ApidexError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for ApidexError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for ApidexError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for ApidexError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut first_field: Option<String> = None;
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                if first_field.is_none() {
                    first_field = Some(field.to_string());
                }
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::Validation {
            message: format!("Validation failed: {}", message),
            parameter: first_field,
            suggestions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = ApidexError::config("Test configuration error");
        assert!(matches!(error, ApidexError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: Test configuration error");
    }

    #[test]
    fn test_validation_error_with_parameter() {
        let error = ApidexError::validation_param(
            "keywords must not be empty",
            "keywords",
            vec!["Provide at least one keyword".to_string()],
        );
        if let ApidexError::Validation { parameter, suggestions, .. } = &error {
            assert_eq!(parameter.as_deref(), Some("keywords"));
            assert_eq!(suggestions.len(), 1);
        } else {
            panic!("expected validation error");
        }
        assert_eq!(error.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_stable_codes() {
        assert_eq!(ApidexError::not_found("Schema", "User").code().as_str(), "ResourceNotFound");
        assert_eq!(
            ApidexError::InvalidJson { message: "bad".into(), line: Some(3), column: None }
                .code()
                .as_str(),
            "InvalidJSON"
        );
        assert_eq!(
            ApidexError::MigrationIntegrity { message: "checksum drift".into() }.code().as_str(),
            "MigrationIntegrity"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ApidexError::timeout("search", 1000).is_retryable());
        assert!(ApidexError::transient("pool hiccup").is_retryable());
        assert!(!ApidexError::validation("test").is_retryable());
        assert!(!ApidexError::not_found("Endpoint", "users-get").is_retryable());
        assert!(
            !ApidexError::CircuitOpen { method: "getSchema".into(), retry_after_ms: 500 }
                .is_retryable(),
            "circuit-open short-circuits instead of retrying"
        );
    }

    #[test]
    fn test_sqlx_pool_timeout_maps_to_resource_exhausted() {
        let error: ApidexError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(error, ApidexError::ResourceExhausted { .. }));
        assert_eq!(error.code(), ErrorCode::ResourceExhausted);
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ApidexError = io_error.into();
        assert!(matches!(err, ApidexError::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: ApidexError = json_error.into();
        assert!(matches!(err, ApidexError::Serialization { .. }));
    }
}
