use std::{thread, time::Duration};

use log::{debug, error, info, warn};
use reqwest::StatusCode;
use reqwest::blocking::multipart;
use serde_json::{Value, json};

use crate::config::{SessionConfig, constants};
use crate::detection::{DetectionRequest, DetectionResult, field_str};
use crate::error::{
    ApiError, AuthError, GadgetError, Result, TimeoutError, TransportError,
};

/// Server-side inspection context backing one session.
///
/// A context is what the service uses to track a single print over time; the
/// temporal combination model accumulates state under it. When a new print
/// begins, a new context (and so a new client) must be created.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Identifier of this inspection context.
    pub context_id: String,

    /// URL processing requests should be sent to.
    pub process_url: String,

    /// URL to fall back to once a processing request against the main URL
    /// has failed.
    pub fallback_process_url: String,
}

/// Client for the Gadget print failure detection API.
///
/// Handles authenticated context creation, frame submission with bounded
/// retry, and interpretation of the service's pacing requests. One client
/// serves one print job; the credential is fixed for its lifetime.
pub struct InferenceClient {
    config: SessionConfig,
    http: reqwest::blocking::Client,
    context: Option<SessionContext>,
    use_fallback_url: bool,
    next_interval_secs: u64,
}

impl InferenceClient {
    /// Create a new client for the given session configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation, for example
    /// an empty or malformed API key or an out-of-range confidence level.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            http: reqwest::blocking::Client::new(),
            context: None,
            use_fallback_url: false,
            next_interval_secs: constants::INITIAL_INTERVAL_SECS,
        })
    }

    /// Validate the credential with the service and open an inspection
    /// context.
    ///
    /// The context creation call is where the service checks the API key, so
    /// this is the authentication step. Calling it again once a context
    /// exists is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The service rejects the credential (HTTP 401/403)
    /// - The request fails or times out
    /// - The response is missing the context fields
    pub fn authenticate(&mut self) -> Result<&SessionContext> {
        if self.context.is_none() {
            let context = self.create_context()?;
            info!("Created inspection context {}", context.context_id);
            self.context = Some(context);
        }
        match self.context.as_ref() {
            Some(context) => Ok(context),
            None => unreachable!("context was created above"),
        }
    }

    /// The open inspection context, if `authenticate` has succeeded.
    pub fn context(&self) -> Option<&SessionContext> {
        self.context.as_ref()
    }

    /// The session configuration this client was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The interval to wait before submitting the next frame.
    ///
    /// Starts at 60 seconds and follows the service's pacing requests after
    /// each processed frame, clamped to the 20 second to 30 minute window
    /// and floored by the configured minimum interval.
    pub fn next_interval(&self) -> Duration {
        Duration::from_secs(self.next_interval_secs)
    }

    /// Upload one frame for processing and return its detection result.
    ///
    /// The frame is validated locally first, then sent as a multipart upload
    /// to the context's processing URL. Transient network failures are
    /// retried a bounded number of times; HTTP error responses are not
    /// retried. Once any processing call has failed, the context's fallback
    /// URL is used for the rest of the session.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The frame is empty or not JPEG encoded
    /// - No context can be created
    /// - The retry budget is exhausted
    /// - The service answers with an error status or a malformed body
    pub fn submit_frame(&mut self, request: DetectionRequest) -> Result<DetectionResult> {
        request.validate()?;
        self.authenticate()?;

        // Use the main process URL unless one has failed before; once we
        // switch to the fallback URL we keep it for the rest of the session.
        let url = match (&self.context, self.use_fallback_url) {
            (Some(context), false) => context.process_url.clone(),
            (Some(context), true) => context.fallback_process_url.clone(),
            (None, _) => unreachable!("authenticate ensures a context"),
        };

        let response = self.upload_with_retry(&url, &request)?;

        let status = response.status();
        if !status.is_success() {
            self.use_fallback_url = true;
            return Err(map_error_status(&url, status, response));
        }

        let body: Value = response.json().map_err(|e| TransportError::RequestFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let result = DetectionResult::from_response(request.request_id, &body)?;

        self.next_interval_secs = clamp_interval(
            result.next_process_interval_secs,
            self.config.min_processing_interval_secs,
        );
        debug!(
            "Processed {}: score {}, quality {}/10, next frame in {}s",
            result.request_id, result.score, result.print_quality, self.next_interval_secs
        );

        Ok(result)
    }

    // POST the frame as a multipart form, retrying transient network
    // failures with a fixed delay. The image goes in a file part named
    // "attachment" with filename "snapshot", per the API contract.
    fn upload_with_retry(
        &mut self,
        url: &str,
        request: &DetectionRequest,
    ) -> Result<reqwest::blocking::Response> {
        let max_attempts = self.config.upload_max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;

            let part = multipart::Part::bytes(request.jpeg.clone())
                .file_name("snapshot")
                .mime_str("image/jpeg")
                .map_err(|e| TransportError::RequestFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            let form = multipart::Form::new().part("attachment", part);

            let sent = self
                .http
                .post(url)
                .header(constants::API_KEY_HEADER, &self.config.api_key)
                .multipart(form)
                .timeout(Duration::from_secs(constants::PROCESS_TIMEOUT_SECS))
                .send();

            match sent {
                Ok(response) => return Ok(response),
                Err(e) if attempt < max_attempts => {
                    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                    warn!(
                        "{}: Frame upload failed (attempt {}/{}): {}",
                        timestamp, attempt, max_attempts, e
                    );
                    thread::sleep(Duration::from_secs(self.config.upload_retry_delay_secs));
                }
                Err(e) => {
                    error!("Frame upload failed after {} attempts: {}", max_attempts, e);
                    self.use_fallback_url = true;
                    if e.is_timeout() {
                        return Err(TimeoutError::Request {
                            url: url.to_string(),
                            timeout_secs: constants::PROCESS_TIMEOUT_SECS,
                        }
                        .into());
                    }
                    return Err(TransportError::RetriesExhausted {
                        url: url.to_string(),
                        attempts: max_attempts,
                    }
                    .into());
                }
            }
        }
    }

    // Create a fresh inspection context. The confidence levels are optional,
    // the service uses its default of 3 for any that are null.
    fn create_context(&self) -> Result<SessionContext> {
        let url = format!(
            "{}{}",
            self.config.effective_base_url(),
            constants::CREATE_CONTEXT_PATH
        );
        let payload = json!({
            "WarningConfidenceLevel": self.config.warning_confidence_level,
            "PauseConfidenceLevel": self.config.pause_confidence_level,
        });

        let response = self
            .http
            .post(&url)
            .header(constants::API_KEY_HEADER, &self.config.api_key)
            .json(&payload)
            .timeout(Duration::from_secs(constants::CREATE_CONTEXT_TIMEOUT_SECS))
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    GadgetError::Timeout(TimeoutError::Request {
                        url: url.clone(),
                        timeout_secs: constants::CREATE_CONTEXT_TIMEOUT_SECS,
                    })
                } else {
                    GadgetError::Transport(TransportError::RequestFailed {
                        url: url.clone(),
                        reason: e.to_string(),
                    })
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_error_status(&url, status, response));
        }

        let body: Value = response.json().map_err(|e| TransportError::RequestFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        Ok(SessionContext {
            context_id: field_str(&body, "ContextId")?,
            process_url: field_str(&body, "ProcessRequestUrl")?,
            fallback_process_url: field_str(&body, "FallbackProcessRequestUrl")?,
        })
    }
}

// Map an HTTP error response to the most specific error we can: credential
// rejections first, then the service's documented error body, then the raw
// status and text.
fn map_error_status(
    url: &str,
    status: StatusCode,
    response: reqwest::blocking::Response,
) -> GadgetError {
    let body = response.text().unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return AuthError::Rejected {
            details: format!("HTTP {} from '{}'", status.as_u16(), url),
        }
        .into();
    }
    if let Some((error_type, details)) = try_parse_api_error(&body) {
        return ApiError::ErrorResponse {
            error_type,
            details,
        }
        .into();
    }
    ApiError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    }
    .into()
}

// Try to pull the well-known {ErrorType, ErrorDetails} pair out of an error
// response body.
pub(crate) fn try_parse_api_error(body: &str) -> Option<(String, String)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error_type = value.get("ErrorType")?.as_str()?.to_string();
    let details = value.get("ErrorDetails")?.as_str()?.to_string();
    Some((error_type, details))
}

// Clamp the service-requested interval to a sane window, then apply the
// caller's floor. The floor is applied last so a caller may deliberately
// exceed the window's maximum.
pub(crate) fn clamp_interval(server_secs: u64, floor_secs: u64) -> u64 {
    server_secs
        .clamp(
            constants::MIN_SERVER_INTERVAL_SECS,
            constants::MAX_SERVER_INTERVAL_SECS,
        )
        .max(floor_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_clamped_into_the_service_window() {
        assert_eq!(clamp_interval(5, 0), 20);
        assert_eq!(clamp_interval(20, 0), 20);
        assert_eq!(clamp_interval(60, 0), 60);
        assert_eq!(clamp_interval(1800, 0), 1800);
        assert_eq!(clamp_interval(86_400, 0), 1800);
    }

    #[test]
    fn caller_floor_is_applied_after_the_window() {
        assert_eq!(clamp_interval(5, 120), 120);
        assert_eq!(clamp_interval(300, 120), 300);
        // A floor above the window maximum wins, the caller asked for it.
        assert_eq!(clamp_interval(60, 3600), 3600);
    }

    #[test]
    fn parses_the_documented_error_body() {
        let body = r#"{"ErrorType": "OE_INVALID_API_KEY", "ErrorDetails": "Key expired"}"#;
        let (error_type, details) = try_parse_api_error(body).unwrap();
        assert_eq!(error_type, "OE_INVALID_API_KEY");
        assert_eq!(details, "Key expired");
    }

    #[test]
    fn incomplete_error_bodies_are_ignored() {
        assert!(try_parse_api_error("not json").is_none());
        assert!(try_parse_api_error(r#"{"ErrorType": "X"}"#).is_none());
        assert!(try_parse_api_error(r#"{"ErrorDetails": "Y"}"#).is_none());
    }
}
