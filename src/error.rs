use std::fmt;

use crate::detection::RequestId;

/// Custom error types for the Gadget SDK.
///
/// This module defines specific error types that can occur throughout the
/// SDK, providing better error handling and more informative error messages
/// for different failure scenarios.

/// Convenience result type used across the SDK's public API.
pub type Result<T> = std::result::Result<T, GadgetError>;

/// Well-known error type string for failures inside the SDK itself.
///
/// Passed to `on_error` callbacks alongside any failure that did not come
/// with an error type from the service.
pub const ERROR_TYPE_INTERNAL: &str = "OE_SDK_ERROR";

/// Well-known error type string for failures in a caller-provided callback.
pub const ERROR_TYPE_CALLBACK: &str = "OE_SDK_CALLBACK_EXCEPTION";

/// Main error type for Gadget SDK operations.
#[derive(Debug)]
pub enum GadgetError {
    /// Errors related to credential validation or rejection.
    Auth(AuthError),

    /// Errors related to malformed caller input.
    Validation(ValidationError),

    /// Network and connectivity errors.
    Transport(TransportError),

    /// Deadline and request timeout errors.
    Timeout(TimeoutError),

    /// Errors reported by or about the detection service API.
    Api(ApiError),

    /// Inspection session lifecycle errors.
    Session(SessionError),
}

impl GadgetError {
    /// The error type string to report through `on_error` callbacks.
    ///
    /// Errors the service reported itself keep the service's error type;
    /// everything else maps to [`ERROR_TYPE_INTERNAL`].
    pub fn error_type(&self) -> &str {
        match self {
            GadgetError::Api(ApiError::ErrorResponse { error_type, .. }) => error_type,
            _ => ERROR_TYPE_INTERNAL,
        }
    }
}

/// Errors related to the API key credential.
#[derive(Debug)]
pub enum AuthError {
    /// No API key was provided.
    MissingApiKey,

    /// The API key is not a plausible credential.
    MalformedApiKey { reason: String },

    /// The service rejected the credential.
    Rejected { details: String },
}

/// Errors for malformed caller-supplied input.
#[derive(Debug)]
pub enum ValidationError {
    /// A submitted frame contained no data.
    EmptyFrame,

    /// A submitted frame was not JPEG encoded.
    NotJpeg { detected: String },

    /// A confidence level was outside the 1-5 range accepted by the service.
    InvalidConfidenceLevel { field: String, value: u8 },

    /// A configuration value could not be used.
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors related to network connectivity and communication.
#[derive(Debug)]
pub enum TransportError {
    /// A network request failed.
    RequestFailed { url: String, reason: String },

    /// All retry attempts for an upload were exhausted.
    RetriesExhausted { url: String, attempts: u32 },
}

/// Errors raised when a deadline elapses.
#[derive(Debug)]
pub enum TimeoutError {
    /// A network request timed out.
    Request { url: String, timeout_secs: u64 },

    /// Waiting for a correlated detection result exceeded the deadline.
    ResultWait {
        request_id: RequestId,
        timeout_secs: u64,
    },
}

/// Errors reported by the detection service or caused by its responses.
#[derive(Debug)]
pub enum ApiError {
    /// The service returned a documented `{ErrorType, ErrorDetails}` body.
    ErrorResponse { error_type: String, details: String },

    /// The service returned an error status with no parseable error body.
    UnexpectedStatus { status: u16, body: String },

    /// A success response was missing a required field.
    MissingField { field: String },
}

/// Errors related to the inspection session lifecycle.
#[derive(Debug)]
pub enum SessionError {
    /// The session was already started once; each session is single-use.
    AlreadyStarted,

    /// The session has not been started yet.
    NotStarted,

    /// The session was stopped while the operation was waiting.
    Stopped,
}

// Implement Display trait for user-friendly error messages
impl fmt::Display for GadgetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GadgetError::Auth(e) => write!(f, "Authentication error: {}", e),
            GadgetError::Validation(e) => write!(f, "Validation error: {}", e),
            GadgetError::Transport(e) => write!(f, "Transport error: {}", e),
            GadgetError::Timeout(e) => write!(f, "Timeout error: {}", e),
            GadgetError::Api(e) => write!(f, "API error: {}", e),
            GadgetError::Session(e) => write!(f, "Session error: {}", e),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingApiKey => write!(f, "An API key must be provided"),
            AuthError::MalformedApiKey { reason } => {
                write!(f, "The API key is malformed: {}", reason)
            }
            AuthError::Rejected { details } => {
                write!(f, "The service rejected the API key: {}", details)
            }
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyFrame => write!(f, "The frame contains no image data"),
            ValidationError::NotJpeg { detected } => {
                write!(
                    f,
                    "Frames must be JPEG encoded, detected format: {}",
                    detected
                )
            }
            ValidationError::InvalidConfidenceLevel { field, value } => {
                write!(f, "{} must be between 1 and 5, got {}", field, value)
            }
            ValidationError::InvalidValue {
                field,
                value,
                reason,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, reason
                )
            }
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::RequestFailed { url, reason } => {
                write!(f, "Network request to '{}' failed: {}", url, reason)
            }
            TransportError::RetriesExhausted { url, attempts } => {
                write!(f, "Upload to '{}' failed after {} attempts", url, attempts)
            }
        }
    }
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutError::Request { url, timeout_secs } => {
                write!(
                    f,
                    "Request to '{}' timed out after {} seconds",
                    url, timeout_secs
                )
            }
            TimeoutError::ResultWait {
                request_id,
                timeout_secs,
            } => {
                write!(
                    f,
                    "No result for {} within {} seconds",
                    request_id, timeout_secs
                )
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::ErrorResponse {
                error_type,
                details,
            } => {
                write!(f, "Service error {}: {}", error_type, details)
            }
            ApiError::UnexpectedStatus { status, body } => {
                write!(f, "Unexpected HTTP status {}: {}", status, body)
            }
            ApiError::MissingField { field } => {
                write!(f, "Response is missing a valid '{}' field", field)
            }
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyStarted => {
                write!(
                    f,
                    "The session has already been started, each session can only be used once"
                )
            }
            SessionError::NotStarted => write!(f, "The session has not been started"),
            SessionError::Stopped => write!(f, "The session was stopped"),
        }
    }
}

// Implement std::error::Error trait
impl std::error::Error for GadgetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GadgetError::Auth(e) => Some(e),
            GadgetError::Validation(e) => Some(e),
            GadgetError::Transport(e) => Some(e),
            GadgetError::Timeout(e) => Some(e),
            GadgetError::Api(e) => Some(e),
            GadgetError::Session(e) => Some(e),
        }
    }
}

impl std::error::Error for AuthError {}
impl std::error::Error for ValidationError {}
impl std::error::Error for TransportError {}
impl std::error::Error for TimeoutError {}
impl std::error::Error for ApiError {}
impl std::error::Error for SessionError {}

// Conversion traits for easy error propagation
impl From<AuthError> for GadgetError {
    fn from(err: AuthError) -> Self {
        GadgetError::Auth(err)
    }
}

impl From<ValidationError> for GadgetError {
    fn from(err: ValidationError) -> Self {
        GadgetError::Validation(err)
    }
}

impl From<TransportError> for GadgetError {
    fn from(err: TransportError) -> Self {
        GadgetError::Transport(err)
    }
}

impl From<TimeoutError> for GadgetError {
    fn from(err: TimeoutError) -> Self {
        GadgetError::Timeout(err)
    }
}

impl From<ApiError> for GadgetError {
    fn from(err: ApiError) -> Self {
        GadgetError::Api(err)
    }
}

impl From<SessionError> for GadgetError {
    fn from(err: SessionError) -> Self {
        GadgetError::Session(err)
    }
}
