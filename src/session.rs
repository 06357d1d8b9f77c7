use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::client::InferenceClient;
use crate::config::{SessionConfig, constants};
use crate::detection::{DetectionRequest, DetectionResult, RequestId};
use crate::error::{self, Result, SessionError, TimeoutError};

/// Callbacks a session needs from its integration.
///
/// The session calls these from its worker thread, so implementations must
/// be `Send`. `on_error` has a logging default for integrations that only
/// care about frames and verdicts.
pub trait InspectionHandler: Send {
    /// Provide the next webcam snapshot to process, as full JPEG bytes.
    ///
    /// `Ok(None)` skips this processing cycle, for example when the camera
    /// has no fresh frame. An `Err` is reported through `on_error` with the
    /// callback failure error type and the cycle is skipped.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;

    /// Called after each processed frame with the new model state.
    fn on_state_update(&mut self, result: &DetectionResult);

    /// Called when an error occurs, with one of the well-known error type
    /// strings or a type sent by the service, plus a detail message.
    fn on_error(&mut self, error_type: &str, details: &str) {
        warn!("Inspection session error [{}]: {}", error_type, details);
    }
}

struct ControlState {
    running: bool,
    paused: bool,
}

struct Shared {
    control: Mutex<ControlState>,
    worker_cv: Condvar,
    results: Mutex<HashMap<RequestId, DetectionResult>>,
    results_cv: Condvar,
    stopped: AtomicBool,
    last_request_id: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            control: Mutex::new(ControlState {
                running: false,
                paused: false,
            }),
            worker_cv: Condvar::new(),
            results: Mutex::new(HashMap::new()),
            results_cv: Condvar::new(),
            stopped: AtomicBool::new(false),
            last_request_id: AtomicU64::new(0),
        }
    }
}

/// A monitoring session against the Gadget detection service.
///
/// The session runs a worker thread that pulls snapshots from the handler,
/// submits them for inference at the pace the service requests, and fires
/// the handler's state callbacks. One session tracks a single print; once
/// stopped it cannot be started again.
pub struct InspectionSession {
    shared: Arc<Shared>,
    client: Option<InferenceClient>,
    handler: Option<Box<dyn InspectionHandler>>,
    worker: Option<JoinHandle<()>>,
    started: bool,
}

impl InspectionSession {
    /// Create a session from a configuration and a handler.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn new<H>(config: SessionConfig, handler: H) -> Result<Self>
    where
        H: InspectionHandler + 'static,
    {
        let client = InferenceClient::new(config)?;
        Ok(Self {
            shared: Arc::new(Shared::new()),
            client: Some(client),
            handler: Some(Box::new(handler)),
            worker: None,
            started: false,
        })
    }

    /// Start the session's worker thread.
    ///
    /// After this returns, a context will be created and the handler's
    /// callbacks will start firing.
    ///
    /// # Errors
    ///
    /// Returns an error if the session was already started; each session can
    /// only be used once.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(SessionError::AlreadyStarted.into());
        }
        self.started = true;

        let client = match self.client.take() {
            Some(client) => client,
            None => return Err(SessionError::AlreadyStarted.into()),
        };
        let handler = match self.handler.take() {
            Some(handler) => handler,
            None => return Err(SessionError::AlreadyStarted.into()),
        };

        lock(&self.shared.control).running = true;
        let shared = Arc::clone(&self.shared);
        self.worker = Some(thread::spawn(move || run_worker(client, handler, shared)));
        Ok(())
    }

    /// Pause processing without stopping the session.
    ///
    /// The worker keeps waking at its interval but skips capture and upload
    /// until `resume` is called. Useful for not burning API calls while a
    /// failure is being checked.
    pub fn pause(&self) {
        lock(&self.shared.control).paused = true;
        info!("Inspection session paused");
    }

    /// Resume a paused session.
    pub fn resume(&self) {
        lock(&self.shared.control).paused = false;
        self.shared.worker_cv.notify_all();
        info!("Inspection session resumed");
    }

    /// Whether the worker thread is running.
    pub fn is_running(&self) -> bool {
        lock(&self.shared.control).running
    }

    /// Whether the session is currently paused.
    pub fn is_paused(&self) -> bool {
        lock(&self.shared.control).paused
    }

    /// Stop the session and join the worker thread.
    ///
    /// Safe to call more than once. A stopped session cannot be restarted;
    /// create a new session for the next print.
    pub fn stop(&mut self) {
        lock(&self.shared.control).running = false;
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.worker_cv.notify_all();
        self.shared.results_cv.notify_all();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Inspection worker panicked");
            }
        }
    }

    /// The id of the most recently submitted frame, if any.
    pub fn last_request_id(&self) -> Option<RequestId> {
        match self.shared.last_request_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(RequestId::new(id)),
        }
    }

    /// Wait for the result correlated with a submitted frame.
    ///
    /// Blocks until the result arrives or the deadline passes. A claimed
    /// result is removed from the session's store, so every result can be
    /// claimed exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The session has not been started
    /// - The session is stopped while waiting
    /// - The deadline passes before the result arrives
    pub fn get_result(&self, request_id: RequestId, timeout: Duration) -> Result<DetectionResult> {
        if !self.started {
            return Err(SessionError::NotStarted.into());
        }
        let deadline = Instant::now() + timeout;
        let mut results = lock(&self.shared.results);
        loop {
            if let Some(result) = results.remove(&request_id) {
                return Ok(result);
            }
            if self.shared.stopped.load(Ordering::SeqCst) {
                return Err(SessionError::Stopped.into());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TimeoutError::ResultWait {
                    request_id,
                    timeout_secs: timeout.as_secs(),
                }
                .into());
            }
            let (guard, _) = self
                .shared
                .results_cv
                .wait_timeout(results, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            results = guard;
        }
    }

    /// Claim the result for a frame if it has already arrived.
    pub fn try_get_result(&self, request_id: RequestId) -> Option<DetectionResult> {
        lock(&self.shared.results).remove(&request_id)
    }
}

impl Drop for InspectionSession {
    fn drop(&mut self) {
        self.stop();
    }
}

// Locks recover from poisoning: the shared state is plain data and a
// panicked worker must not wedge the caller's stop or get_result.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// Sleep up to `duration`, waking early if the session is stopped. Returns
// whether the session is still running.
fn sleep_interruptible(shared: &Shared, duration: Duration) -> bool {
    let guard = lock(&shared.control);
    let (guard, _) = shared
        .worker_cv
        .wait_timeout_while(guard, duration, |control| control.running)
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.running
}

fn run_worker(
    mut client: InferenceClient,
    mut handler: Box<dyn InspectionHandler>,
    shared: Arc<Shared>,
) {
    info!("Inspection worker started");
    loop {
        let (running, paused) = {
            let control = lock(&shared.control);
            (control.running, control.paused)
        };
        if !running {
            break;
        }

        if !paused {
            // Ensure we have a context before asking for a frame. The
            // service may be down, so keep trying at a slow cadence.
            if client.context().is_none() {
                if let Err(e) = client.authenticate() {
                    let error_type = e.error_type().to_string();
                    handler.on_error(&error_type, &e.to_string());
                    if !sleep_interruptible(
                        &shared,
                        Duration::from_secs(constants::CONTEXT_RETRY_DELAY_SECS),
                    ) {
                        break;
                    }
                    continue;
                }
            }

            match handler.next_frame() {
                Ok(Some(jpeg)) => {
                    let id =
                        RequestId::new(shared.last_request_id.fetch_add(1, Ordering::SeqCst) + 1);
                    let mut request = DetectionRequest::new(id, jpeg);
                    request.printer_id = client.config().printer_id.clone();
                    request.job_id = client.config().job_id.clone();

                    match client.submit_frame(request) {
                        Ok(result) => {
                            lock(&shared.results).insert(id, result.clone());
                            shared.results_cv.notify_all();
                            handler.on_state_update(&result);
                        }
                        Err(e) => {
                            let error_type = e.error_type().to_string();
                            handler.on_error(&error_type, &e.to_string());
                        }
                    }
                }
                Ok(None) => debug!("No frame available this cycle"),
                Err(e) => handler.on_error(error::ERROR_TYPE_CALLBACK, &e.to_string()),
            }
        }

        // Always sleep the requested interval at the end of a cycle,
        // processed or paused.
        if !sleep_interruptible(&shared, client.next_interval()) {
            break;
        }
    }
    info!("Inspection worker stopped");
}
