use std::{thread, time::Duration};

use log::{info, warn};

use crate::error::{Result, TransportError, ValidationError};

/// Webcam snapshot source with retry logic and error handling.
///
/// Most Gadget integrations feed the session from a camera's HTTP snapshot
/// endpoint, so the SDK ships a fetcher for it. Handles transient network
/// failures with bounded retry and supports multiple URLs with round-robin
/// multiplexing for redundancy.
pub struct SnapshotFetcher {
    snapshot_urls: Vec<String>,
    current_url_index: usize,
    max_retries: u32,
    retry_delay_secs: u64,
    retry_count: u32,
    offline: bool,
    flip_vertical: bool,
}

impl SnapshotFetcher {
    /// Create a new SnapshotFetcher with the specified configuration.
    ///
    /// # Arguments
    ///
    /// * `snapshot_urls` - URLs to fetch snapshots from (round-robin)
    /// * `max_retries` - Maximum number of attempts before giving up
    /// * `retry_delay_secs` - Delay between retry attempts
    pub fn new(snapshot_urls: Vec<String>, max_retries: u32, retry_delay_secs: u64) -> Self {
        Self {
            snapshot_urls,
            current_url_index: 0,
            max_retries,
            retry_delay_secs,
            retry_count: 0,
            offline: false,
            flip_vertical: false,
        }
    }

    /// Re-encode fetched snapshots flipped vertically, for cameras mounted
    /// upside down.
    pub fn with_flip_vertical(mut self, flip_vertical: bool) -> Self {
        self.flip_vertical = flip_vertical;
        self
    }

    /// Fetch a snapshot with automatic retry logic.
    ///
    /// Attempts to download a snapshot from the configured URLs. On failure
    /// it retries up to `max_retries` times with delays between attempts,
    /// and logs offline/recovery transitions so an operator can tell when
    /// the camera drops out.
    ///
    /// # Errors
    ///
    /// Returns an error if no URLs are configured, if all retry attempts are
    /// exhausted, or if the flip transform cannot decode the image.
    pub fn fetch(&mut self) -> Result<Vec<u8>> {
        if self.snapshot_urls.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "snapshot_urls".to_string(),
                value: String::new(),
                reason: "at least one snapshot URL is required".to_string(),
            }
            .into());
        }

        loop {
            match self.attempt_fetch() {
                Ok(data) => {
                    if self.offline {
                        info!("Camera back online, snapshot fetch succeeded again");
                        self.offline = false;
                    }
                    self.retry_count = 0;
                    if self.flip_vertical {
                        return flip_vertical_jpeg(&data);
                    }
                    return Ok(data);
                }
                Err(e) => {
                    self.retry_count += 1;
                    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                    warn!(
                        "{}: Failed to fetch snapshot (attempt {}/{}): {}",
                        timestamp, self.retry_count, self.max_retries, e
                    );

                    if self.retry_count >= self.max_retries {
                        if !self.offline {
                            warn!(
                                "Camera offline after {} failed attempts: {}",
                                self.max_retries,
                                self.snapshot_urls.join(", ")
                            );
                            self.offline = true;
                        }
                        return Err(TransportError::RetriesExhausted {
                            url: self.snapshot_urls.join(", "),
                            attempts: self.max_retries,
                        }
                        .into());
                    }

                    thread::sleep(Duration::from_secs(self.retry_delay_secs));
                }
            }
        }
    }

    // Single fetch without retry logic, advancing the round-robin index.
    fn attempt_fetch(&mut self) -> Result<Vec<u8>> {
        let url = self.snapshot_urls[self.current_url_index].clone();
        self.current_url_index = (self.current_url_index + 1) % self.snapshot_urls.len();

        let response =
            reqwest::blocking::get(&url).map_err(|e| TransportError::RequestFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(TransportError::RequestFailed {
                url,
                reason: format!("HTTP {}", response.status()),
            }
            .into());
        }

        let data = response.bytes().map_err(|e| TransportError::RequestFailed {
            url,
            reason: e.to_string(),
        })?;
        Ok(data.to_vec())
    }

    /// The number of failed attempts since the last successful fetch.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether the camera is currently considered offline.
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// The configured snapshot URLs.
    pub fn snapshot_urls(&self) -> &[String] {
        &self.snapshot_urls
    }

    /// The maximum retry count.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Reset retry and offline bookkeeping and the round-robin index.
    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.offline = false;
        self.current_url_index = 0;
    }
}

/// Flip a JPEG snapshot vertically and re-encode it as JPEG.
///
/// # Errors
///
/// Returns an error if the data cannot be decoded or re-encoded.
pub fn flip_vertical_jpeg(data: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(data).map_err(|e| ValidationError::InvalidValue {
        field: "snapshot".to_string(),
        value: format!("{} bytes", data.len()),
        reason: e.to_string(),
    })?;

    let flipped = decoded.flipv();

    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    flipped
        .write_to(&mut cursor, image::ImageFormat::Jpeg)
        .map_err(|e| ValidationError::InvalidValue {
            field: "snapshot".to_string(),
            value: format!("{} bytes", data.len()),
            reason: e.to_string(),
        })?;

    Ok(buffer)
}
