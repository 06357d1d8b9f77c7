use crate::error::{AuthError, Result, ValidationError};

/// Configuration for a single Gadget inspection session.
///
/// Each session tracks exactly one print job, so the configuration is
/// immutable once the session's client has been created. All values can also
/// be loaded from environment variables to support containerized deployments.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The OctoEverywhere API key used to authenticate every request.
    ///
    /// See the OctoEverywhere developer page or contact support to get an
    /// API key.
    /// Environment variable: `GADGET_API_KEY`
    pub api_key: String,

    /// Minimum interval between processing requests, in seconds.
    ///
    /// When 0 (the default) the SDK follows the dynamic interval the service
    /// requests after each processed frame. A positive value acts as a floor:
    /// whichever is larger wins.
    /// Environment variable: `GADGET_MIN_INTERVAL_SECS`
    pub min_processing_interval_secs: u64,

    /// How confident the temporal combination model must be before it
    /// suggests warning the user, from 1 (least confident, more warnings)
    /// to 5 (most confident, fewer warnings). The service defaults to 3
    /// when unset.
    /// Environment variable: `GADGET_WARNING_CONFIDENCE`
    pub warning_confidence_level: Option<u8>,

    /// How confident the temporal combination model must be before it
    /// suggests pausing the print, from 1 (pauses with less confidence) to
    /// 5 (only pauses when very confident). The service defaults to 3
    /// when unset.
    /// Environment variable: `GADGET_PAUSE_CONFIDENCE`
    pub pause_confidence_level: Option<u8>,

    /// Override of the production service endpoint, for debugging against a
    /// local server.
    /// Environment variable: `GADGET_BASE_URL`
    pub base_url: Option<String>,

    /// Opaque printer identifier attached to every detection request the
    /// session creates.
    /// Environment variable: `GADGET_PRINTER_ID`
    pub printer_id: Option<String>,

    /// Opaque print job identifier attached to every detection request the
    /// session creates.
    /// Environment variable: `GADGET_JOB_ID`
    pub job_id: Option<String>,

    /// Maximum attempts for a single frame upload before the submission
    /// fails with a transport error.
    pub upload_max_retries: u32,

    /// Delay between frame upload attempts, in seconds.
    pub upload_retry_delay_secs: u64,
}

impl SessionConfig {
    /// Create a configuration with the given API key and default values for
    /// everything else.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            min_processing_interval_secs: 0,
            warning_confidence_level: None,
            pause_confidence_level: None,
            base_url: None,
            printer_id: None,
            job_id: None,
            upload_max_retries: constants::MAX_UPLOAD_RETRIES,
            upload_retry_delay_secs: constants::UPLOAD_RETRY_DELAY_SECS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `GADGET_API_KEY` is not set, or if any of the
    /// optional numeric variables cannot be parsed:
    /// - `GADGET_API_KEY`: API key (required)
    /// - `GADGET_MIN_INTERVAL_SECS`: processing interval floor (default: "0")
    /// - `GADGET_WARNING_CONFIDENCE`: warning confidence level 1-5 (optional)
    /// - `GADGET_PAUSE_CONFIDENCE`: pause confidence level 1-5 (optional)
    /// - `GADGET_BASE_URL`: service endpoint override (optional)
    /// - `GADGET_PRINTER_ID`: printer identifier (optional)
    /// - `GADGET_JOB_ID`: print job identifier (optional)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GADGET_API_KEY").map_err(|_| AuthError::MissingApiKey)?;

        let min_processing_interval_secs = parse_env_u64("GADGET_MIN_INTERVAL_SECS", 0)?;

        let warning_confidence_level = parse_env_opt_u8("GADGET_WARNING_CONFIDENCE")?;
        let pause_confidence_level = parse_env_opt_u8("GADGET_PAUSE_CONFIDENCE")?;

        let config = Self {
            api_key,
            min_processing_interval_secs,
            warning_confidence_level,
            pause_confidence_level,
            base_url: std::env::var("GADGET_BASE_URL").ok(),
            printer_id: std::env::var("GADGET_PRINTER_ID").ok(),
            job_id: std::env::var("GADGET_JOB_ID").ok(),
            upload_max_retries: constants::MAX_UPLOAD_RETRIES,
            upload_retry_delay_secs: constants::UPLOAD_RETRY_DELAY_SECS,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can open a session.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The API key is empty or contains whitespace/control characters
    /// - A confidence level is outside the 1-5 range
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(AuthError::MissingApiKey.into());
        }
        if self.api_key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AuthError::MalformedApiKey {
                reason: "key contains whitespace or control characters".to_string(),
            }
            .into());
        }
        check_confidence_level("warning_confidence_level", self.warning_confidence_level)?;
        check_confidence_level("pause_confidence_level", self.pause_confidence_level)?;
        Ok(())
    }

    /// The service endpoint this session talks to.
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(constants::DEFAULT_BASE_URL)
    }
}

fn check_confidence_level(field: &str, value: Option<u8>) -> Result<()> {
    if let Some(level) = value {
        if !(constants::MIN_CONFIDENCE_LEVEL..=constants::MAX_CONFIDENCE_LEVEL).contains(&level) {
            return Err(ValidationError::InvalidConfidenceLevel {
                field: field.to_string(),
                value: level,
            }
            .into());
        }
    }
    Ok(())
}

fn parse_env_u64(var: &str, default: u64) -> Result<u64> {
    match std::env::var(var) {
        Ok(raw) => raw.parse::<u64>().map_err(|e| {
            ValidationError::InvalidValue {
                field: var.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_opt_u8(var: &str) -> Result<Option<u8>> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<u8>()
            .map(Some)
            .map_err(|e| {
                ValidationError::InvalidValue {
                    field: var.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                }
                .into()
            }),
        Err(_) => Ok(None),
    }
}

/// Service constants used throughout the SDK.
pub mod constants {
    /// Production endpoint of the Gadget detection service.
    pub const DEFAULT_BASE_URL: &str = "https://gadget-pv1-oeapi.octoeverywhere.com";

    /// Path of the context creation API.
    pub const CREATE_CONTEXT_PATH: &str = "/api/gadget/v1/createcontext";

    /// Header carrying the API key on every request.
    pub const API_KEY_HEADER: &str = "X-API-Key";

    /// Lower bound the service-requested processing interval is clamped to.
    pub const MIN_SERVER_INTERVAL_SECS: u64 = 20;

    /// Upper bound the service-requested processing interval is clamped to.
    pub const MAX_SERVER_INTERVAL_SECS: u64 = 30 * 60;

    /// Processing interval used before the service has requested one.
    pub const INITIAL_INTERVAL_SECS: u64 = 60;

    /// Sleep before retrying after a failed context creation.
    pub const CONTEXT_RETRY_DELAY_SECS: u64 = 30;

    /// Timeout for the context creation request.
    pub const CREATE_CONTEXT_TIMEOUT_SECS: u64 = 30;

    /// Timeout for a frame processing request. Long, to give the service
    /// time to run the models.
    pub const PROCESS_TIMEOUT_SECS: u64 = 2 * 60;

    /// Default maximum attempts for a single frame upload.
    pub const MAX_UPLOAD_RETRIES: u32 = 3;

    /// Default delay between frame upload attempts in seconds.
    pub const UPLOAD_RETRY_DELAY_SECS: u64 = 5;

    /// Smallest confidence level accepted by the service.
    pub const MIN_CONFIDENCE_LEVEL: u8 = 1;

    /// Largest confidence level accepted by the service.
    pub const MAX_CONFIDENCE_LEVEL: u8 = 5;

    /// Default maximum retry attempts when fetching camera snapshots fails.
    pub const SNAPSHOT_MAX_RETRIES: u32 = 5;

    /// Default delay between snapshot retry attempts in seconds.
    pub const SNAPSHOT_RETRY_DELAY_SECS: u64 = 10;
}
