use anyhow::{Context, Result};
use log::{error, info, warn};
use std::{thread, time::Duration};

use gadget_sdk::config::constants;
use gadget_sdk::{
    DetectionResult, InspectionHandler, InspectionSession, RecommendedAction, SessionConfig,
    SnapshotFetcher,
};

/// Gadget Monitor - watches a 3D print through the Gadget detection service.
///
/// This binary polls a webcam snapshot endpoint and submits each frame to
/// the remote AI failure detection API, logging the model's print quality
/// verdicts and its warning/pause suggestions.
///
/// # Environment Variables
///
/// Required:
/// * `GADGET_API_KEY` - OctoEverywhere API key
/// * `GADGET_SNAPSHOT_URL` - Camera snapshot URL(s) (single URL or comma-separated list for round-robin)
///
/// Optional (with defaults):
/// * `GADGET_MIN_INTERVAL_SECS` - Floor for the processing interval (default: "0", follow the service)
/// * `GADGET_WARNING_CONFIDENCE` - Warning confidence level 1-5 (default: service default of 3)
/// * `GADGET_PAUSE_CONFIDENCE` - Pause confidence level 1-5 (default: service default of 3)
/// * `GADGET_BASE_URL` - Service endpoint override for local debugging
/// * `GADGET_PRINTER_ID` / `GADGET_JOB_ID` - Identifiers attached to each request
/// * `GADGET_FLIP_IMAGE` - Flip snapshots vertically (default: "false")
///
/// # Usage
///
/// ```bash
/// export GADGET_API_KEY="your-api-key"
/// export GADGET_SNAPSHOT_URL="http://camera.local/snapshot.jpg"
/// export GADGET_FLIP_IMAGE="true"  # Optional: camera is mounted upside-down
/// ./gadget-sdk
/// ```
fn main() -> Result<()> {
    // Initialize logger to output to stdout, using RUST_LOG env var or info level by default
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stdout)
        .filter_level(
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(log::LevelFilter::Info),
        )
        .init();

    let config = SessionConfig::from_env()
        .context("Failed to load configuration, ensure GADGET_API_KEY is set")?;

    let snapshot_urls: Vec<String> = std::env::var("GADGET_SNAPSHOT_URL")
        .context("GADGET_SNAPSHOT_URL environment variable is required")?
        .split(',')
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect();

    let flip_image = std::env::var("GADGET_FLIP_IMAGE")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .context("Invalid GADGET_FLIP_IMAGE (must be 'true' or 'false')")?;

    info!("Gadget Monitor starting...");
    info!("Using service endpoint: {}", config.effective_base_url());
    info!(
        "Monitoring {} camera(s): {}",
        snapshot_urls.len(),
        snapshot_urls.join(", ")
    );

    let fetcher = SnapshotFetcher::new(
        snapshot_urls,
        constants::SNAPSHOT_MAX_RETRIES,
        constants::SNAPSHOT_RETRY_DELAY_SECS,
    )
    .with_flip_vertical(flip_image);

    let mut session = InspectionSession::new(config, Monitor { fetcher })?;
    session.start()?;

    info!("Gadget Monitor initialized successfully. Watching the print...");

    // The worker thread does the monitoring; a new session must be created
    // for each new print, so this process simply lives for one print.
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

/// Bridges the snapshot fetcher and the inspection session, logging the
/// model's verdicts as they arrive.
struct Monitor {
    fetcher: SnapshotFetcher,
}

impl InspectionHandler for Monitor {
    fn next_frame(&mut self) -> gadget_sdk::Result<Option<Vec<u8>>> {
        match self.fetcher.fetch() {
            Ok(jpeg) => Ok(Some(jpeg)),
            Err(e) => {
                // Skip the cycle rather than abort; the camera may come back.
                error!("Failed to fetch snapshot: {}", e);
                Ok(None)
            }
        }
    }

    fn on_state_update(&mut self, result: &DetectionResult) {
        info!(
            "{}: quality {}/10 ({}), raw score {}, verdict: {}",
            result.request_id,
            result.print_quality,
            result.quality_label(),
            result.score,
            result.verdict()
        );
        match result.recommended_action() {
            RecommendedAction::Pause => warn!(
                "The model suggests pausing the print ({}% failure confidence)",
                result.score
            ),
            RecommendedAction::Warn => warn!(
                "The model sees a possible print issue ({}% failure confidence)",
                result.score
            ),
            RecommendedAction::None => {}
        }
    }

    fn on_error(&mut self, error_type: &str, details: &str) {
        error!("Detection error [{}]: {}", error_type, details);
    }
}
