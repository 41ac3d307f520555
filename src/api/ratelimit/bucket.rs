use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use snafu::prelude::*;
use tokio::{
    sync::{oneshot, Mutex as AdmissionLock, Notify},
    time::Instant,
};

/// How long an exhausted bucket with no known reset time waits for server info
/// before restoring its quota.
const UNKNOWN_RESET_FALLBACK: Duration = Duration::from_secs(1);

/// Reset times closer than this describe the same window, server epochs are
/// mapped onto the local clock per response and jitter slightly.
const WINDOW_TOLERANCE: Duration = Duration::from_millis(50);

/// Error returned to callers waiting in a cleared bucket
#[derive(Debug, Clone, Snafu)]
#[snafu(display("bucket cleared: {reason}"))]
pub struct BucketCleared {
    /// clear reason
    pub reason: String,
}

type Waiter = oneshot::Sender<Result<(), BucketCleared>>;

#[derive(Debug)]
struct BucketState {
    // both stay unknown, and admission ungated, until the server reports them
    limit: Option<u32>,
    remaining: Option<u32>,
    reset_at: Option<Instant>,
    // end of the last window whose quota was already restored locally
    consumed_reset: Option<Instant>,
    bucket_id: Option<String>,
    queue: VecDeque<Waiter>,
    processing: bool,
}

impl BucketState {
    fn reset_elapsed(&self, now: Instant) -> bool {
        matches!(self.reset_at, Some(at) if at <= now)
    }

    fn restore(&mut self) {
        log::trace!("Restore bucket quota to {:?}", self.limit);
        self.remaining = self.limit;
        self.consumed_reset = self.reset_at.take().or(self.consumed_reset);
    }

    fn is_stale(&self, reset_at: Instant) -> bool {
        matches!(self.reset_at, Some(current) if reset_at + WINDOW_TOLERANCE < current)
            || matches!(self.consumed_reset, Some(consumed) if reset_at <= consumed + WINDOW_TOLERANCE)
    }

    /// Take one slot, `false` when the window is exhausted
    fn take_slot(&mut self) -> bool {
        match &mut self.remaining {
            None => true,
            Some(0) => false,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
        }
    }

    fn admit_queued(&mut self) -> usize {
        let mut admitted = 0;
        while self.remaining != Some(0) {
            let Some(waiter) = self.queue.pop_front() else {
                break;
            };
            // a dropped receiver means the caller gave up, its slot stays free
            if waiter.send(Ok(())).is_ok() {
                self.take_slot();
                admitted += 1;
            }
        }
        admitted
    }
}

/// Rate-limit partition of one route group.
///
/// Admission is serialized: each [`acquire`](Self::acquire) takes its turn on a
/// FIFO lock, and only the entrant holding the turn reads or writes the
/// remaining count. Callers arriving when the quota is exhausted are queued and
/// released by a background queue processor once the window resets.
#[derive(Debug)]
pub struct Bucket {
    key: String,
    admission: AdmissionLock<()>,
    state: Mutex<BucketState>,
    updated: Notify,
}

impl Bucket {
    /// A new bucket admits every call until the server reports its real limit
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self {
            key: key.into(),
            admission: AdmissionLock::new(()),
            state: Mutex::new(BucketState {
                limit: None,
                remaining: None,
                reset_at: None,
                consumed_reset: None,
                bucket_id: None,
                queue: VecDeque::new(),
                processing: false,
            }),
            updated: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// bucket key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// calls allowed per window, if known
    pub fn limit(&self) -> Option<u32> {
        self.lock().limit
    }

    /// calls left in current window, if known
    pub fn remaining(&self) -> Option<u32> {
        self.lock().remaining
    }

    /// end of current window, if known
    pub fn reset_at(&self) -> Option<Instant> {
        self.lock().reset_at
    }

    /// server side bucket id
    pub fn bucket_id(&self) -> Option<String> {
        self.lock().bucket_id.clone()
    }

    /// number of callers waiting for next window
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Wait for a call slot in this bucket.
    pub async fn acquire(self: &Arc<Self>) -> Result<(), BucketCleared> {
        let admitted = {
            let _turn = self.admission.lock().await;
            let mut state = self.lock();

            if state.reset_elapsed(Instant::now()) {
                state.restore();
            }
            // callers queued earlier go first
            state.admit_queued();

            if state.queue.is_empty() && state.take_slot() {
                log::trace!(
                    "Bucket {} admitted, {:?} remaining",
                    self.key,
                    state.remaining
                );
                return Ok(());
            }

            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);

            log::debug!(
                "Bucket {} exhausted, {} caller(s) queued",
                self.key,
                state.queue.len()
            );

            if !state.processing {
                state.processing = true;
                tokio::spawn(Arc::clone(self).process_queue());
            }

            rx
        };

        match admitted.await {
            Ok(result) => result,
            Err(_) => Err(BucketCleared {
                reason: "queue processor stopped".to_string(),
            }),
        }
    }

    async fn process_queue(self: Arc<Self>) {
        log::debug!("Bucket {} queue processor start", self.key);

        loop {
            let (slept_until, consumed_before) = {
                let mut state = self.lock();
                if state.queue.is_empty() {
                    state.processing = false;
                    break;
                }
                (state.reset_at, state.consumed_reset)
            };

            match slept_until {
                Some(at) => tokio::time::sleep_until(at).await,
                None => {
                    tokio::select! {
                        _ = self.updated.notified() => {}
                        _ = tokio::time::sleep(UNKNOWN_RESET_FALLBACK) => {}
                    }
                }
            }

            let now = Instant::now();
            let mut state = self.lock();

            let restore = match (slept_until, state.reset_at) {
                (_, Some(current)) if current > now => {
                    log::debug!("Bucket {} reset moved to a later window", self.key);
                    false
                }
                (_, Some(_)) => true,
                // an admission check restored the window first
                (Some(_), None) => false,
                (None, None) => state.consumed_reset == consumed_before,
            };

            if restore {
                state.restore();
            }
            let admitted = state.admit_queued();

            log::debug!(
                "Bucket {} woke (restored: {}), admitted {} queued caller(s), {} still waiting",
                self.key,
                restore,
                admitted,
                state.queue.len()
            );
        }

        log::debug!("Bucket {} queue processor stop", self.key);
    }

    /// Apply rate-limit info reported by the server.
    ///
    /// Server values overwrite the local estimate, except remaining/reset
    /// values that describe an older window than the one already known.
    pub fn update(
        &self,
        limit: Option<u32>,
        remaining: Option<u32>,
        reset_at: Option<Instant>,
        bucket_id: Option<String>,
    ) {
        {
            let mut state = self.lock();

            if limit.is_some() {
                state.limit = limit;
            }
            if bucket_id.is_some() {
                state.bucket_id = bucket_id;
            }

            match reset_at {
                Some(at) if state.is_stale(at) => {
                    log::trace!("Bucket {} ignore stale window info", self.key);
                }
                _ => {
                    if remaining.is_some() {
                        state.remaining = remaining;
                    }
                    if reset_at.is_some() {
                        state.reset_at = reset_at;
                    }
                }
            }

            log::trace!(
                "Bucket {} updated: limit {:?}, remaining {:?}, reset {:?}",
                self.key,
                state.limit,
                state.remaining,
                state.reset_at
            );
        }

        self.updated.notify_waiters();
    }

    /// Reject every queued caller with `reason`.
    pub fn clear<S: Into<String>>(&self, reason: S) {
        let reason = reason.into();
        let waiters = std::mem::take(&mut self.lock().queue);

        if !waiters.is_empty() {
            log::debug!(
                "Bucket {} cleared, rejecting {} caller(s): {}",
                self.key,
                waiters.len(),
                reason
            );
        }

        for waiter in waiters {
            let _ = waiter.send(Err(BucketCleared {
                reason: reason.clone(),
            }));
        }

        self.updated.notify_waiters();
    }
}
