use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{ApiError, Result, ValidationError};

/// Identifier correlating a submitted frame with its detection result.
///
/// Ids are assigned in increasing order by whoever creates the requests, so
/// they double as a submission sequence number within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A single webcam frame queued for print failure inspection.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    /// Correlation id echoed on the matching [`DetectionResult`].
    pub request_id: RequestId,

    /// The snapshot as full JPEG bytes, headers included.
    pub jpeg: Vec<u8>,

    /// When the snapshot was captured.
    pub captured_at: DateTime<Utc>,

    /// Opaque printer identifier, if the integration tracks one.
    pub printer_id: Option<String>,

    /// Opaque print job identifier, if the integration tracks one.
    pub job_id: Option<String>,
}

impl DetectionRequest {
    /// Create a request for the given frame, captured now.
    pub fn new(request_id: RequestId, jpeg: Vec<u8>) -> Self {
        Self {
            request_id,
            jpeg,
            captured_at: Utc::now(),
            printer_id: None,
            job_id: None,
        }
    }

    /// Check the frame before any network traffic is spent on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is empty or is not JPEG encoded. The
    /// service only accepts JPEG snapshots.
    pub fn validate(&self) -> Result<()> {
        if self.jpeg.is_empty() {
            return Err(ValidationError::EmptyFrame.into());
        }
        match image::guess_format(&self.jpeg) {
            Ok(image::ImageFormat::Jpeg) => Ok(()),
            Ok(other) => Err(ValidationError::NotJpeg {
                detected: format!("{:?}", other),
            }
            .into()),
            Err(_) => Err(ValidationError::NotJpeg {
                detected: "unknown".to_string(),
            }
            .into()),
        }
    }
}

/// The temporal combination model's verdict for one processed frame.
///
/// The model combines many signals over time, so a result describes the
/// state of the whole print as of this frame rather than the frame alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionResult {
    /// Correlation id of the request this result answers.
    pub request_id: RequestId,

    /// Raw failure score from 0 to 100. 0 is a perfect print, 100 a very
    /// strong likelihood of failure. Useful for custom smoothing logic.
    pub score: u8,

    /// User-facing print quality from 1 to 10, where 10 is perfect.
    pub print_quality: u8,

    /// True when the model is confident enough that the user should be told
    /// about a possible issue.
    pub warning_suggested: bool,

    /// True when the model is confident the print has probably failed and
    /// should be paused.
    pub pause_suggested: bool,

    /// Interval the service wants before the next processed frame, before
    /// any client-side clamping.
    pub next_process_interval_secs: u64,
}

impl DetectionResult {
    /// Parse a result out of a process API response body.
    ///
    /// Every field the service documents is required; a missing or ill-typed
    /// field is an API error, not a default.
    pub(crate) fn from_response(request_id: RequestId, body: &Value) -> Result<Self> {
        Ok(Self {
            request_id,
            score: field_u8(body, "Score")?,
            print_quality: field_u8(body, "PrintQuality")?,
            warning_suggested: field_bool(body, "WarningSuggested")?,
            pause_suggested: field_bool(body, "PauseSuggested")?,
            next_process_interval_secs: field_u64(body, "NextProcessIntervalSec")?,
        })
    }

    /// Overall classification of the print as of this frame.
    pub fn verdict(&self) -> Verdict {
        if self.pause_suggested {
            Verdict::Failure
        } else if self.warning_suggested {
            Verdict::PossibleFailure
        } else {
            Verdict::Ok
        }
    }

    /// What the model suggests the integration do in response.
    pub fn recommended_action(&self) -> RecommendedAction {
        if self.pause_suggested {
            RecommendedAction::Pause
        } else if self.warning_suggested {
            RecommendedAction::Warn
        } else {
            RecommendedAction::None
        }
    }

    /// The raw score as a 0.0 to 1.0 failure confidence.
    pub fn confidence(&self) -> f32 {
        f32::from(self.score) / 100.0
    }

    /// Human-readable interpretation of the print quality value.
    pub fn quality_label(&self) -> &'static str {
        match self.print_quality {
            1 => "print failure",
            2 => "probable print failure",
            3 => "possible print failure",
            4 | 5 => "monitoring a possible issue",
            6 | 7 => "good print quality",
            8 | 9 => "great print quality",
            10 => "perfect print quality",
            _ => "unknown",
        }
    }
}

/// Classification of a detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The print looks fine.
    Ok,

    /// The model sees signs of a possible failure.
    PossibleFailure,

    /// The model is confident the print has failed.
    Failure,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ok => write!(f, "ok"),
            Verdict::PossibleFailure => write!(f, "possible-failure"),
            Verdict::Failure => write!(f, "failure"),
        }
    }
}

/// Action the model suggests in response to a detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedAction {
    /// Nothing to do.
    None,

    /// Inform the user there might be a print issue.
    Warn,

    /// Pause the print and have the user check it.
    Pause,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendedAction::None => write!(f, "none"),
            RecommendedAction::Warn => write!(f, "warn"),
            RecommendedAction::Pause => write!(f, "pause"),
        }
    }
}

pub(crate) fn field_str(body: &Value, field: &str) -> Result<String> {
    body.get(field)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| missing(field))
}

pub(crate) fn field_u64(body: &Value, field: &str) -> Result<u64> {
    body.get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| missing(field))
}

pub(crate) fn field_bool(body: &Value, field: &str) -> Result<bool> {
    body.get(field)
        .and_then(Value::as_bool)
        .ok_or_else(|| missing(field))
}

fn field_u8(body: &Value, field: &str) -> Result<u8> {
    let value = field_u64(body, field)?;
    u8::try_from(value).map_err(|_| missing(field))
}

fn missing(field: &str) -> crate::error::GadgetError {
    ApiError::MissingField {
        field: field.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_with(score: u8, quality: u8, warning: bool, pause: bool) -> DetectionResult {
        DetectionResult {
            request_id: RequestId::new(1),
            score,
            print_quality: quality,
            warning_suggested: warning,
            pause_suggested: pause,
            next_process_interval_secs: 60,
        }
    }

    #[test]
    fn parses_a_complete_process_response() {
        let body = json!({
            "Score": 12,
            "PrintQuality": 9,
            "WarningSuggested": false,
            "PauseSuggested": false,
            "NextProcessIntervalSec": 45
        });
        let result = DetectionResult::from_response(RequestId::new(7), &body).unwrap();
        assert_eq!(result.request_id, RequestId::new(7));
        assert_eq!(result.score, 12);
        assert_eq!(result.print_quality, 9);
        assert!(!result.warning_suggested);
        assert!(!result.pause_suggested);
        assert_eq!(result.next_process_interval_secs, 45);
    }

    #[test]
    fn each_response_field_is_required() {
        let complete = json!({
            "Score": 12,
            "PrintQuality": 9,
            "WarningSuggested": false,
            "PauseSuggested": false,
            "NextProcessIntervalSec": 45
        });
        for field in [
            "Score",
            "PrintQuality",
            "WarningSuggested",
            "PauseSuggested",
            "NextProcessIntervalSec",
        ] {
            let mut body = complete.clone();
            body.as_object_mut().unwrap().remove(field);
            let err = DetectionResult::from_response(RequestId::new(1), &body).unwrap_err();
            assert!(err.to_string().contains(field), "missing {}", field);
        }
    }

    #[test]
    fn ill_typed_fields_are_rejected() {
        let body = json!({
            "Score": "twelve",
            "PrintQuality": 9,
            "WarningSuggested": false,
            "PauseSuggested": false,
            "NextProcessIntervalSec": 45
        });
        assert!(DetectionResult::from_response(RequestId::new(1), &body).is_err());
    }

    #[test]
    fn pause_takes_precedence_over_warning() {
        let result = result_with(95, 1, true, true);
        assert_eq!(result.verdict(), Verdict::Failure);
        assert_eq!(result.recommended_action(), RecommendedAction::Pause);
    }

    #[test]
    fn warning_maps_to_possible_failure() {
        let result = result_with(60, 4, true, false);
        assert_eq!(result.verdict(), Verdict::PossibleFailure);
        assert_eq!(result.recommended_action(), RecommendedAction::Warn);
    }

    #[test]
    fn quiet_result_is_ok() {
        let result = result_with(5, 10, false, false);
        assert_eq!(result.verdict(), Verdict::Ok);
        assert_eq!(result.recommended_action(), RecommendedAction::None);
        assert_eq!(result.quality_label(), "perfect print quality");
    }

    #[test]
    fn quality_labels_cover_the_documented_scale() {
        for (quality, label) in [
            (1, "print failure"),
            (2, "probable print failure"),
            (3, "possible print failure"),
            (4, "monitoring a possible issue"),
            (5, "monitoring a possible issue"),
            (6, "good print quality"),
            (7, "good print quality"),
            (8, "great print quality"),
            (9, "great print quality"),
            (10, "perfect print quality"),
            (0, "unknown"),
        ] {
            assert_eq!(result_with(50, quality, false, false).quality_label(), label);
        }
    }

    #[test]
    fn confidence_scales_the_raw_score() {
        assert!((result_with(50, 5, false, false).confidence() - 0.5).abs() < f32::EPSILON);
    }
}
