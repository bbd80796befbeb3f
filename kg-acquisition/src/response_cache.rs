//! Keyed JSON response cache with typed-namespace partitioning (C4, spec §4.4).
//!
//! Keys are deterministic: `source + method + sorted-kwargs-hash`. Namespaces
//! partition TTL and eviction policy; paper records are retained longest,
//! search results shortest. Safe under concurrent access via a `Mutex`
//! guarding a bounded per-namespace map.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Partitions with distinct retention/eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Paper,
    Author,
    Search,
}

impl Namespace {
    fn default_ttl(self) -> Duration {
        match self {
            Namespace::Paper => Duration::from_secs(7 * 24 * 3600),
            Namespace::Author => Duration::from_secs(24 * 3600),
            Namespace::Search => Duration::from_secs(3600),
        }
    }

    fn max_entries(self) -> usize {
        match self {
            Namespace::Paper => 20_000,
            Namespace::Author => 5_000,
            Namespace::Search => 1_000,
        }
    }
}

struct Entry {
    value: Value,
    expires_at: Instant,
    inserted_at: Instant,
}

#[derive(Default)]
struct Partition {
    entries: BTreeMap<String, Entry>,
}

pub struct ResponseCache {
    partitions: Mutex<std::collections::HashMap<Namespace, Partition>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            partitions: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Build a deterministic cache key from `source`, `method`, and a set of
    /// keyword parameters whose ordering must not affect the resulting key.
    pub fn make_key(source: &str, method: &str, kwargs: &[(&str, &str)]) -> String {
        let mut sorted: Vec<&(&str, &str)> = kwargs.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        let mut hasher = Sha256::new();
        for (k, v) in sorted {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"&");
        }
        let digest = hasher.finalize();
        format!("{source}:{method}:{:x}", digest)
    }

    pub fn get(&self, key: &str, namespace: Namespace) -> Option<Value> {
        let mut partitions = self.partitions.lock().expect("response cache poisoned");
        let partition = partitions.entry(namespace).or_default();
        match partition.entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                partition.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: Value, namespace: Namespace) {
        let mut partitions = self.partitions.lock().expect("response cache poisoned");
        let partition = partitions.entry(namespace).or_default();

        let now = Instant::now();
        partition.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + namespace.default_ttl(),
                inserted_at: now,
            },
        );

        let max = namespace.max_entries();
        if partition.entries.len() > max {
            let overflow = partition.entries.len() - max;
            let mut oldest: Vec<(String, Instant)> = partition
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.inserted_at))
                .collect();
            oldest.sort_by_key(|(_, t)| *t);
            for (k, _) in oldest.into_iter().take(overflow) {
                partition.entries.remove(&k);
            }
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_order_independent() {
        let a = ResponseCache::make_key("s2", "getPaper", &[("id", "1"), ("fields", "title")]);
        let b = ResponseCache::make_key("s2", "getPaper", &[("fields", "title"), ("id", "1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn set_then_get_roundtrips() {
        let cache = ResponseCache::new();
        let key = ResponseCache::make_key("s2", "getPaper", &[("id", "1")]);
        cache.set(&key, json!({"title": "x"}), Namespace::Paper);
        assert_eq!(cache.get(&key, Namespace::Paper).unwrap()["title"], "x");
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache = ResponseCache::new();
        assert!(cache.get("nope", Namespace::Paper).is_none());
    }

    #[test]
    fn namespaces_do_not_cross_contaminate() {
        let cache = ResponseCache::new();
        let key = ResponseCache::make_key("s2", "getPaper", &[("id", "1")]);
        cache.set(&key, json!(1), Namespace::Paper);
        assert!(cache.get(&key, Namespace::Search).is_none());
    }
}
