use std::sync::{Arc, Mutex};
use std::time::Duration;

use gadget_sdk::error::{
    ApiError, AuthError, GadgetError, SessionError, TimeoutError, ERROR_TYPE_INTERNAL,
};
use gadget_sdk::{
    DetectionRequest, DetectionResult, InferenceClient, InspectionHandler, InspectionSession,
    RequestId, SessionConfig, SnapshotFetcher,
};

// Endpoint nothing listens on; requests fail fast with connection refused.
const UNREACHABLE: &str = "http://127.0.0.1:9";

fn test_config() -> SessionConfig {
    let mut config = SessionConfig::new("test-api-key");
    config.base_url = Some(UNREACHABLE.to_string());
    config.upload_max_retries = 1;
    config.upload_retry_delay_secs = 0;
    config
}

fn tiny_jpeg() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        8,
        8,
        image::Rgb([120, 40, 200]),
    ));
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    img.write_to(&mut cursor, image::ImageFormat::Jpeg)
        .expect("encode failed");
    buffer
}

#[test]
fn test_config_validation() {
    assert!(SessionConfig::new("some-key").validate().is_ok());

    let empty = SessionConfig::new("");
    assert!(matches!(
        empty.validate(),
        Err(GadgetError::Auth(AuthError::MissingApiKey))
    ));

    let spaced = SessionConfig::new("key with spaces");
    assert!(matches!(
        spaced.validate(),
        Err(GadgetError::Auth(AuthError::MalformedApiKey { .. }))
    ));

    let mut bad_level = SessionConfig::new("some-key");
    bad_level.warning_confidence_level = Some(6);
    assert!(matches!(
        bad_level.validate(),
        Err(GadgetError::Validation(_))
    ));

    let mut ok_level = SessionConfig::new("some-key");
    ok_level.warning_confidence_level = Some(1);
    ok_level.pause_confidence_level = Some(5);
    assert!(ok_level.validate().is_ok());
}

#[test]
fn test_config_base_url_override() {
    let config = SessionConfig::new("some-key");
    assert_eq!(
        config.effective_base_url(),
        "https://gadget-pv1-oeapi.octoeverywhere.com"
    );

    let overridden = test_config();
    assert_eq!(overridden.effective_base_url(), UNREACHABLE);
}

#[test]
fn test_frame_validation() {
    let empty = DetectionRequest::new(RequestId::new(1), Vec::new());
    assert!(matches!(
        empty.validate(),
        Err(GadgetError::Validation(_))
    ));

    // PNG magic bytes are recognized but rejected, only JPEG is accepted.
    let png = DetectionRequest::new(
        RequestId::new(2),
        vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
    );
    assert!(matches!(png.validate(), Err(GadgetError::Validation(_))));

    let jpeg = DetectionRequest::new(RequestId::new(3), tiny_jpeg());
    assert!(jpeg.validate().is_ok());
}

#[test]
fn test_request_id_display() {
    assert_eq!(RequestId::new(42).to_string(), "req-42");
    assert_eq!(RequestId::new(42).value(), 42);
}

#[test]
fn test_error_type_mapping() {
    let api: GadgetError = ApiError::ErrorResponse {
        error_type: "OE_INVALID_API_KEY".to_string(),
        details: "Key expired".to_string(),
    }
    .into();
    assert_eq!(api.error_type(), "OE_INVALID_API_KEY");

    let auth: GadgetError = AuthError::MissingApiKey.into();
    assert_eq!(auth.error_type(), ERROR_TYPE_INTERNAL);
    assert!(auth.to_string().contains("API key"));
}

#[test]
fn test_client_rejects_invalid_config() {
    assert!(InferenceClient::new(SessionConfig::new("")).is_err());
}

#[test]
fn test_client_initial_interval() {
    let client = InferenceClient::new(test_config()).expect("valid config");
    assert_eq!(client.next_interval(), Duration::from_secs(60));
    assert!(client.context().is_none());
}

#[test]
fn test_client_authenticate_unreachable_server() {
    let mut client = InferenceClient::new(test_config()).expect("valid config");
    let err = client.authenticate().expect_err("no server is listening");
    assert!(matches!(err, GadgetError::Transport(_)));
    assert!(client.context().is_none());
}

#[test]
fn test_submit_frame_validates_before_any_network() {
    // A malformed frame must fail fast even though the endpoint is
    // unreachable; validation happens before the context is created.
    let mut client = InferenceClient::new(test_config()).expect("valid config");
    let err = client
        .submit_frame(DetectionRequest::new(RequestId::new(1), vec![0x00, 0x01]))
        .expect_err("frame is not a JPEG");
    assert!(matches!(err, GadgetError::Validation(_)));
}

#[test]
fn test_submit_frame_unreachable_server() {
    let mut client = InferenceClient::new(test_config()).expect("valid config");
    let err = client
        .submit_frame(DetectionRequest::new(RequestId::new(1), tiny_jpeg()))
        .expect_err("no server is listening");
    assert!(matches!(err, GadgetError::Transport(_)));
}

#[test]
fn test_snapshot_fetcher_basic_methods() {
    let urls = vec!["http://camera.local/snapshot.jpg".to_string()];
    let mut fetcher = SnapshotFetcher::new(urls.clone(), 3, 1);
    assert_eq!(fetcher.snapshot_urls(), &urls);
    assert_eq!(fetcher.max_retries(), 3);
    assert_eq!(fetcher.retry_count(), 0);
    assert!(!fetcher.is_offline());
    fetcher.reset();
    assert_eq!(fetcher.retry_count(), 0);
}

#[test]
fn test_snapshot_fetcher_requires_urls() {
    let mut fetcher = SnapshotFetcher::new(Vec::new(), 3, 0);
    assert!(matches!(
        fetcher.fetch(),
        Err(GadgetError::Validation(_))
    ));
}

#[test]
fn test_snapshot_fetcher_exhausts_retries() {
    let mut fetcher = SnapshotFetcher::new(vec![format!("{}/snapshot.jpg", UNREACHABLE)], 2, 0);
    let err = fetcher.fetch().expect_err("no camera is listening");
    assert!(matches!(err, GadgetError::Transport(_)));
    assert!(fetcher.is_offline());
    assert_eq!(fetcher.retry_count(), 2);
}

#[test]
fn test_flip_transform_preserves_dimensions() {
    let flipped = gadget_sdk::snapshot::flip_vertical_jpeg(&tiny_jpeg()).expect("flip failed");
    assert!(!flipped.is_empty());
    let decoded = image::load_from_memory(&flipped).expect("flipped output must stay decodable");
    assert_eq!(decoded.width(), 8);
    assert_eq!(decoded.height(), 8);

    assert!(gadget_sdk::snapshot::flip_vertical_jpeg(&[0x00, 0x01]).is_err());
}

struct RecordingHandler {
    errors: Arc<Mutex<Vec<String>>>,
}

impl InspectionHandler for RecordingHandler {
    fn next_frame(&mut self) -> gadget_sdk::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn on_state_update(&mut self, _result: &DetectionResult) {}

    fn on_error(&mut self, error_type: &str, details: &str) {
        self.errors
            .lock()
            .unwrap()
            .push(format!("{}: {}", error_type, details));
    }
}

#[test]
fn test_session_lifecycle() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let handler = RecordingHandler {
        errors: Arc::clone(&errors),
    };
    let mut session = InspectionSession::new(test_config(), handler).expect("valid config");

    // Results cannot be waited on before the worker exists.
    assert!(matches!(
        session.get_result(RequestId::new(1), Duration::from_millis(10)),
        Err(GadgetError::Session(SessionError::NotStarted))
    ));
    assert!(!session.is_running());

    session.start().expect("first start succeeds");
    assert!(session.is_running());

    // A session is single-use.
    assert!(matches!(
        session.start(),
        Err(GadgetError::Session(SessionError::AlreadyStarted))
    ));

    // The worker hits the unreachable endpoint and reports it.
    std::thread::sleep(Duration::from_millis(500));
    assert!(!errors.lock().unwrap().is_empty());

    // No frame was ever submitted, so waiting for an unknown id times out.
    assert!(matches!(
        session.get_result(RequestId::new(99), Duration::from_millis(100)),
        Err(GadgetError::Timeout(TimeoutError::ResultWait { .. }))
    ));
    assert!(session.last_request_id().is_none());
    assert!(session.try_get_result(RequestId::new(99)).is_none());

    session.pause();
    assert!(session.is_paused());
    session.resume();
    assert!(!session.is_paused());

    session.stop();
    assert!(!session.is_running());

    // After stop, waiting returns the stopped error rather than blocking.
    assert!(matches!(
        session.get_result(RequestId::new(99), Duration::from_secs(5)),
        Err(GadgetError::Session(SessionError::Stopped))
    ));

    // Stopped sessions cannot be restarted either.
    assert!(matches!(
        session.start(),
        Err(GadgetError::Session(SessionError::AlreadyStarted))
    ));
}
