//! Gadget SDK - client for the OctoEverywhere AI print failure detection service.
//!
//! This library submits webcam snapshots of an in-progress 3D print to the
//! remote Gadget inference API and surfaces its temporal combination model
//! verdicts (print quality, raw failure score, warning and pause suggestions)
//! back to the integration.
//!
//! # Core Components
//!
//! * [`config`] - Session configuration and service constants
//! * [`client`] - Low-level authenticated API client with retry and fallback
//! * [`session`] - Background inspection session driving the client
//! * [`detection`] - Request/result data model and verdict interpretation
//! * [`snapshot`] - Webcam snapshot fetching with retry logic
//! * [`error`] - Comprehensive error types and handling
//!
//! # Quick Start
//!
//! ```no_run
//! use gadget_sdk::{DetectionResult, InspectionHandler, InspectionSession, SessionConfig};
//!
//! struct Monitor;
//!
//! impl InspectionHandler for Monitor {
//!     fn next_frame(&mut self) -> gadget_sdk::Result<Option<Vec<u8>>> {
//!         // Return the latest webcam snapshot as JPEG bytes, or None to
//!         // skip this cycle.
//!         Ok(std::fs::read("snapshot.jpg").ok())
//!     }
//!
//!     fn on_state_update(&mut self, result: &DetectionResult) {
//!         println!(
//!             "print quality {}/10 ({}), suggested action: {}",
//!             result.print_quality,
//!             result.quality_label(),
//!             result.recommended_action()
//!         );
//!     }
//! }
//!
//! fn main() -> gadget_sdk::Result<()> {
//!     let config = SessionConfig::new("your-api-key");
//!     let mut session = InspectionSession::new(config, Monitor)?;
//!     session.start()?;
//!     // The worker thread now polls the camera and the service; stop the
//!     // session when the print ends.
//!     std::thread::sleep(std::time::Duration::from_secs(600));
//!     session.stop();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod detection;
pub mod error;
pub mod session;
pub mod snapshot;

// Re-export commonly used types for convenience
pub use client::{InferenceClient, SessionContext};
pub use config::SessionConfig;
pub use detection::{DetectionRequest, DetectionResult, RecommendedAction, RequestId, Verdict};
pub use error::{GadgetError, Result};
pub use session::{InspectionHandler, InspectionSession};
pub use snapshot::SnapshotFetcher;
