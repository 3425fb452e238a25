//! Unified Error Type System
//!
//! Centralized error types for the copilot service.
//! Provides classification of upstream failures for retry decisions and a
//! stable code/status mapping for the HTTP surface.
//!
//! ## Error Categories
//!
//! - **Server**: Upstream 5xx (retry with backoff)
//! - **Network**: Connectivity issues (retry with backoff)
//! - **RateLimit**: Upstream 429 (surfaced, not retried)
//! - **Auth**: Upstream credential rejected (fail fast)
//! - **BadRequest**: Other 4xx (fail fast)
//! - **ParseError**: Upstream body could not be decoded (fail fast)

use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Upstream failure categories used by the completion retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited by the upstream API
    RateLimit,
    /// Upstream rejected our credentials
    Auth,
    /// Any other 4xx response
    BadRequest,
    /// Upstream 5xx response
    Server,
    /// Connection, DNS or timeout failure before a response arrived
    Network,
    /// Response arrived but could not be decoded
    ParseError,
    /// Anything we could not classify
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::Server => write!(f, "SERVER"),
            Self::Network => write!(f, "NETWORK"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Only server-side and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server | Self::Network)
    }
}

// =============================================================================
// AI Service Error
// =============================================================================

/// HTTP status reported to callers once upstream retries are exhausted.
pub const UPSTREAM_FAILURE_STATUS: u16 = 502;

/// Completion API failure with routing metadata
#[derive(Debug, Clone)]
pub struct AiServiceError {
    pub category: ErrorCategory,
    /// Status surfaced to our caller
    pub status: u16,
    /// Status returned by the upstream API, when one was received
    pub upstream_status: Option<u16>,
    pub retryable: bool,
    pub message: String,
    pub provider: Option<String>,
}

impl std::fmt::Display for AiServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.provider {
            Some(provider) => write!(
                f,
                "[{}:{}] {} (status {})",
                provider, self.category, self.message, self.status
            ),
            None => write!(f, "[{}] {} (status {})", self.category, self.message, self.status),
        }
    }
}

impl std::error::Error for AiServiceError {}

impl AiServiceError {
    pub fn new(category: ErrorCategory, status: u16, message: impl Into<String>) -> Self {
        Self {
            category,
            status,
            upstream_status: None,
            retryable: category.is_retryable(),
            message: message.into(),
            provider: None,
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn upstream(mut self, status: u16) -> Self {
        self.upstream_status = Some(status);
        self
    }

    /// Convert a transient failure into the terminal shape surfaced after the
    /// retry budget is spent.
    pub fn exhausted(self, attempts: usize) -> Self {
        Self {
            status: UPSTREAM_FAILURE_STATUS,
            retryable: true,
            message: format!("{} (after {} attempts)", self.message, attempts),
            ..self
        }
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps raw upstream outcomes onto [`AiServiceError`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an HTTP status code returned by the completion API.
    ///
    /// 4xx responses keep their own status and are never retried; 5xx
    /// responses are retryable and surface as 502 once exhausted.
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> AiServiceError {
        let category = match status {
            429 => ErrorCategory::RateLimit,
            401 | 403 => ErrorCategory::Auth,
            400..=499 => ErrorCategory::BadRequest,
            500..=599 => ErrorCategory::Server,
            _ => ErrorCategory::Unknown,
        };

        let surfaced = if category == ErrorCategory::Server || category == ErrorCategory::Unknown {
            UPSTREAM_FAILURE_STATUS
        } else {
            status
        };

        AiServiceError::new(category, surfaced, message)
            .upstream(status)
            .provider(provider)
    }

    /// Classify a transport failure (no HTTP response received).
    pub fn classify_transport(err: &reqwest::Error, provider: &str) -> AiServiceError {
        if let Some(status) = err.status() {
            return Self::classify_http_status(status.as_u16(), &err.to_string(), provider);
        }
        if err.is_decode() {
            return AiServiceError::new(
                ErrorCategory::ParseError,
                UPSTREAM_FAILURE_STATUS,
                err.to_string(),
            )
            .provider(provider);
        }
        AiServiceError::new(ErrorCategory::Network, UPSTREAM_FAILURE_STATUS, err.to_string())
            .provider(provider)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Structured validation error with context
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "Validation failed for '{}': {}", field, self.message)
        } else {
            write!(f, "Validation failed: {}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            message: message.into(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn missing(field: &str) -> Self {
        Self::new(ValidationErrorKind::MissingField, "value is required").with_field(field)
    }
}

/// Validation error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Schema validation failed
    Schema,
    /// Required field missing
    MissingField,
    /// Invalid format
    Format,
    /// Value out of range
    Range,
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum FairError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Turn Errors (terminal for the current turn)
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(ValidationError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Message blocked by moderation ({})", categories.join(", "))]
    ContentBlocked { categories: Vec<String> },

    #[error("Moderation service failed: {0}")]
    ModerationFailure(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("AI service error: {0}")]
    AiService(AiServiceError),
}

impl From<AiServiceError> for FairError {
    fn from(err: AiServiceError) -> Self {
        FairError::AiService(err)
    }
}

impl From<ValidationError> for FairError {
    fn from(err: ValidationError) -> Self {
        FairError::Validation(err)
    }
}

impl From<r2d2::Error> for FairError {
    fn from(err: r2d2::Error) -> Self {
        FairError::Storage(format!("Connection pool error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, FairError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl FairError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(ValidationErrorKind::Format, message).with_field(field))
    }

    /// Stable machine-readable classification code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIGURATION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::ContentBlocked { .. } => "CONTENT_BLOCKED",
            Self::ModerationFailure(_) => "MODERATION_FAILURE",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::AiService(_) => "AI_SERVICE_ERROR",
            Self::Io(_) | Self::Database(_) | Self::Json(_) | Self::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status surfaced for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::ContentBlocked { .. } => 400,
            Self::Unauthorized(_) => 401,
            Self::SessionNotFound(_) => 404,
            Self::ModerationFailure(_) => 502,
            Self::AiService(e) => e.status,
            _ => 500,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AiService(e) => e.retryable,
            Self::ModerationFailure(_) => true,
            _ => false,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| FairError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| FairError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Wire Shape
// =============================================================================

/// `{ code, message, retryable, status? }` as sent to clients
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

impl From<&FairError> for ErrorPayload {
    fn from(err: &FairError) -> Self {
        let (status, upstream_status) = match err {
            FairError::AiService(e) => (Some(e.status), e.upstream_status),
            _ => (None, None),
        };
        // Internal failures are not described to clients.
        let message = if err.code() == "INTERNAL_ERROR" {
            "Internal server error".to_string()
        } else {
            err.to_string()
        };
        Self {
            code: err.code(),
            message,
            retryable: err.is_retryable(),
            status,
            upstream_status,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
