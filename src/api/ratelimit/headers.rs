use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;
use tokio::time::Instant;

static LIMIT: &str = "x-ratelimit-limit";
static REMAINING: &str = "x-ratelimit-remaining";
static RESET: &str = "x-ratelimit-reset";
static BUCKET: &str = "x-ratelimit-bucket";
static GLOBAL: &str = "x-ratelimit-global";

/// Rate-limit metadata of one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// calls allowed per window
    pub limit: Option<u32>,
    /// calls left in current window
    pub remaining: Option<u32>,
    /// when the current window ends
    pub reset: Option<Instant>,
    /// server side bucket id
    pub bucket: Option<String>,
    /// the response reports a global limit
    pub global: bool,
}

impl RateLimitHeaders {
    /// Parse from response headers, malformed values are treated as absent
    pub fn parse(headers: &HeaderMap) -> Self {
        let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        Self {
            limit: get(LIMIT).and_then(|v| v.parse().ok()),
            remaining: get(REMAINING).and_then(|v| v.parse().ok()),
            reset: get(RESET)
                .and_then(|v| v.parse::<f64>().ok())
                .and_then(epoch_secs_to_instant),
            bucket: get(BUCKET).map(str::to_string),
            global: get(GLOBAL)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or_default(),
        }
    }
}

/// Map a server epoch timestamp(seconds, may be fractional) onto the tokio clock
pub fn epoch_secs_to_instant(epoch_secs: f64) -> Option<Instant> {
    if !epoch_secs.is_finite() || epoch_secs < 0.0 {
        return None;
    }

    let now = Instant::now();
    let now_epoch = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let target = Duration::try_from_secs_f64(epoch_secs).ok()?;

    match target.checked_sub(now_epoch) {
        Some(ahead) => now.checked_add(ahead),
        // already passed, clamp to now
        None => Some(now),
    }
}
