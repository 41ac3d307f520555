use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

/// Process wide limit, gates every bucket while active.
#[derive(Debug, Default)]
pub struct GlobalLimit {
    until: Mutex<Option<Instant>>,
}

impl GlobalLimit {
    fn lock(&self) -> MutexGuard<'_, Option<Instant>> {
        self.until.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark all routes limited until `until`, last write wins
    pub fn limit_until(&self, until: Instant) {
        log::warn!(
            "Global rate limit hit, all requests paused for {:?}",
            until.saturating_duration_since(Instant::now())
        );
        *self.lock() = Some(until);
    }

    /// When the active global limit ends, `None` if not limited
    pub fn limited_until(&self) -> Option<Instant> {
        let mut until = self.lock();
        match *until {
            Some(t) if t > Instant::now() => Some(t),
            Some(_) => {
                *until = None;
                None
            }
            None => None,
        }
    }

    /// Is a global limit active now
    pub fn is_limited(&self) -> bool {
        self.limited_until().is_some()
    }

    /// Suspend until no global limit is active
    pub async fn wait(&self) {
        while let Some(until) = self.limited_until() {
            log::debug!("Waiting global rate limit until {:?}", until);
            tokio::time::sleep_until(until).await;
        }
    }
}
