//! Rate-limit bookkeeping: per-route buckets and the global limit.

mod bucket;
mod global;
mod headers;
mod registry;

pub use bucket::{Bucket, BucketCleared};
pub use global::GlobalLimit;
pub use headers::{epoch_secs_to_instant, RateLimitHeaders};
pub use registry::BucketRegistry;
