//! Debounced release scheduling.
//!
//! Status updates for one tag arrive in bursts (several CI providers, each
//! flipping contexts independently). The scheduler collapses those bursts
//! into at most one dispatch per quiet period: a green aggregate arms a
//! timer, any further event for the same tag cancels it, and only a timer
//! that survives the full window runs the release. Once a dispatch has
//! begun it runs to completion and later events are ignored until it
//! finishes.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use greenlight_log::Logger;

use crate::types::AggregateState;

/// Environment variable overriding the debounce window, in seconds.
pub const RELEASE_TIMEOUT_ENV: &str = "RELEASE_TIMEOUT";

/// Default debounce window.
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(60);

/// The configured debounce window. An empty or unparseable override falls
/// back to the default.
pub fn release_timeout() -> Duration {
    match std::env::var(RELEASE_TIMEOUT_ENV) {
        Ok(value) => {
            let value = value.trim();
            if value.is_empty() {
                DEFAULT_RELEASE_TIMEOUT
            } else {
                value
                    .parse()
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RELEASE_TIMEOUT)
            }
        }
        Err(_) => DEFAULT_RELEASE_TIMEOUT,
    }
}

enum EntryState {
    Scheduled {
        generation: u64,
        // Dropping the sender wakes the timer thread early; the receiver
        // reads that as cancellation.
        _cancel: mpsc::Sender<()>,
    },
    Dispatching,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, EntryState>,
    next_generation: u64,
}

/// Per-tag debounce state machine. All transitions happen under one lock,
/// which orders cancellation strictly before any replacement schedule.
pub struct ReleaseScheduler {
    inner: Arc<Mutex<Inner>>,
    timeout: Duration,
    logger: Arc<dyn Logger>,
}

impl ReleaseScheduler {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self::with_timeout(release_timeout(), logger)
    }

    pub fn with_timeout(timeout: Duration, logger: Arc<dyn Logger>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            timeout,
            logger,
        }
    }

    /// Whether a release for `id` is currently armed.
    pub fn scheduled(&self, id: &str) -> bool {
        matches!(
            self.inner.lock().unwrap().entries.get(id),
            Some(EntryState::Scheduled { .. })
        )
    }

    /// Feed one evaluated event into the state machine. `job` runs on a
    /// timer thread if the schedule survives the debounce window.
    pub fn evaluate(
        &self,
        id: &str,
        state: AggregateState,
        has_targets: bool,
        job: impl FnOnce() + Send + 'static,
    ) {
        let mut inner = self.inner.lock().unwrap();

        match inner.entries.get(id) {
            Some(EntryState::Dispatching) => {
                self.logger
                    .debug(&format!("release {id} is already dispatching; event ignored"));
                return;
            }
            Some(EntryState::Scheduled { .. }) => {
                inner.entries.remove(id);
                self.logger
                    .debug(&format!("cancelled scheduled release for {id}"));
            }
            None => {}
        }

        match state {
            AggregateState::Pending => {
                self.logger
                    .debug(&format!("status checks still pending for {id}"));
            }
            AggregateState::Failed => {
                self.logger
                    .info(&format!("status checks have failed for {id}"));
            }
            AggregateState::Success if !has_targets => {
                self.logger
                    .info(&format!("no release targets configured for {id}"));
            }
            AggregateState::Success => {
                inner.next_generation += 1;
                let generation = inner.next_generation;
                let (cancel, armed) = mpsc::channel();
                inner.entries.insert(
                    id.to_string(),
                    EntryState::Scheduled {
                        generation,
                        _cancel: cancel,
                    },
                );
                self.logger.info(&format!(
                    "scheduling release for {id} in {}s",
                    self.timeout.as_secs_f64()
                ));
                self.arm(id.to_string(), generation, armed, job);
            }
        }
    }

    fn arm(
        &self,
        id: String,
        generation: u64,
        armed: mpsc::Receiver<()>,
        job: impl FnOnce() + Send + 'static,
    ) {
        let inner = Arc::clone(&self.inner);
        let logger = Arc::clone(&self.logger);
        let timeout = self.timeout;
        thread::spawn(move || {
            match armed.recv_timeout(timeout) {
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                // Cancelled: the entry was removed or replaced.
                _ => return,
            }

            {
                let mut inner = inner.lock().unwrap();
                match inner.entries.get(&id) {
                    Some(EntryState::Scheduled { generation: current, .. })
                        if *current == generation =>
                    {
                        inner.entries.insert(id.clone(), EntryState::Dispatching);
                    }
                    _ => return,
                }
            }

            if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                logger.error(&format!("release dispatch for {id} panicked"));
            }
            inner.lock().unwrap().entries.remove(&id);
        });
    }
}
