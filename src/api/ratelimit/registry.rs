use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::Bucket;

/// Bucket key to bucket map, entries live as long as the client.
#[derive(Debug, Default)]
pub struct BucketRegistry {
    buckets: Mutex<HashMap<String, Arc<Bucket>>>,
}

impl BucketRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Bucket>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the bucket of `key`, create it on first use
    pub fn get(&self, key: &str) -> Arc<Bucket> {
        let mut buckets = self.lock();
        if let Some(bucket) = buckets.get(key) {
            return Arc::clone(bucket);
        }

        log::debug!("Create bucket {}", key);

        let bucket = Arc::new(Bucket::new(key));
        buckets.insert(key.to_string(), Arc::clone(&bucket));
        bucket
    }

    /// number of known buckets
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// no bucket created yet
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clear every bucket, rejecting all queued callers
    pub fn clear_all(&self, reason: &str) {
        let buckets = self.lock().values().cloned().collect::<Vec<_>>();
        for bucket in buckets {
            bucket.clear(reason);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_same_key_same_bucket() {
        let registry = BucketRegistry::default();

        let a = registry.get("GET /servers/1");
        let b = registry.get("GET /servers/1");
        let c = registry.get("GET /servers/2");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_first_use_stores_one_bucket() {
        let registry = Arc::new(BucketRegistry::default());

        let handles = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.get("POST /channels/1/messages"))
            })
            .collect::<Vec<_>>();

        let buckets = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert!(buckets.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }
}
