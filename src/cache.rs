//! In-memory result cache with in-flight request sharing.
//!
//! Each key (channel name + canonical request fingerprint) maps to either a
//! completed value stamped with its acquisition time, or a pending shared
//! future that every concurrent caller for that key awaits. Entries older
//! than [`CACHE_TTL`] read as absent and are overwritten on the next miss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use serde_json::Value;

use crate::clock::Clock;
use crate::error::TransportError;
use crate::models::Channel;

// ---

/// How long a backend response is reused.
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// A backend request that several callers may await.
pub type SharedFetch = Shared<BoxFuture<'static, Result<Value, TransportError>>>;

enum Slot {
    Ready {
        value: Value,
        acquired_at: DateTime<Utc>,
    },
    Pending {
        generation: u64,
        fetch: SharedFetch,
    },
}

/// Result of [`ResultCache::begin`].
pub enum Entry {
    /// Fresh cached value.
    Hit(Value),
    /// A request for this key is in flight; await it, then call
    /// [`ResultCache::settle`] with the same generation.
    Wait { generation: u64, fetch: SharedFetch },
}

/// Snapshot of cache contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub fresh: usize,
    pub stale: usize,
    pub pending: usize,
}

pub struct ResultCache {
    slots: Mutex<HashMap<String, Slot>>,
    clock: Arc<dyn Clock>,
    next_generation: AtomicU64,
}

impl ResultCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            clock,
            next_generation: AtomicU64::new(1),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // The map is left consistent by every critical section
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_fresh(&self, acquired_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // ---
        let age_ms = (now - acquired_at).num_milliseconds();
        age_ms <= CACHE_TTL.as_millis() as i64
    }

    /// Fresh value for `key`, if any.
    #[cfg(test)]
    fn get(&self, key: &str) -> Option<Value> {
        // ---
        let now = self.clock.now();
        match self.slots().get(key) {
            Some(Slot::Ready { value, acquired_at }) if self.is_fresh(*acquired_at, now) => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Store `value` under `key`, acquired now.
    #[cfg(test)]
    fn put(&self, key: &str, value: Value) {
        // ---
        let acquired_at = self.clock.now();
        self.slots()
            .insert(key.to_string(), Slot::Ready { value, acquired_at });
    }

    /// Look up `key`; on a miss, register the request produced by `start`
    /// as pending so concurrent callers join it instead of sending their own.
    ///
    /// `start` receives the generation it must later settle with. It runs
    /// under the cache lock and must not block.
    pub fn begin<F>(&self, key: &str, start: F) -> Entry
    where
        F: FnOnce(u64) -> SharedFetch,
    {
        // ---
        let now = self.clock.now();
        let mut slots = self.slots();

        match slots.get(key) {
            Some(Slot::Ready { value, acquired_at }) if self.is_fresh(*acquired_at, now) => {
                return Entry::Hit(value.clone());
            }
            Some(Slot::Pending { generation, fetch }) => {
                return Entry::Wait {
                    generation: *generation,
                    fetch: fetch.clone(),
                };
            }
            _ => {}
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let fetch = start(generation);
        slots.insert(
            key.to_string(),
            Slot::Pending {
                generation,
                fetch: fetch.clone(),
            },
        );
        Entry::Wait { generation, fetch }
    }

    /// Resolve the pending slot for `key` if it still belongs to `generation`:
    /// successes become cached values, failures clear the slot. Calling it
    /// again for the same generation is a no-op.
    pub fn settle(&self, key: &str, generation: u64, outcome: &Result<Value, TransportError>) {
        // ---
        let mut slots = self.slots();
        let owned = matches!(
            slots.get(key),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        );
        if !owned {
            return;
        }

        match outcome {
            Ok(value) => {
                let acquired_at = self.clock.now();
                slots.insert(
                    key.to_string(),
                    Slot::Ready {
                        value: value.clone(),
                        acquired_at,
                    },
                );
            }
            Err(_) => {
                slots.remove(key);
            }
        }
    }

    pub fn clear(&self) {
        self.slots().clear();
    }

    /// Physically drop entries past their TTL. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        // ---
        let now = self.clock.now();
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready { acquired_at, .. } => self.is_fresh(*acquired_at, now),
            Slot::Pending { .. } => true,
        });
        before - slots.len()
    }

    pub fn stats(&self) -> CacheStats {
        // ---
        let now = self.clock.now();
        let mut stats = CacheStats::default();
        for slot in self.slots().values() {
            match slot {
                Slot::Ready { acquired_at, .. } if self.is_fresh(*acquired_at, now) => {
                    stats.fresh += 1
                }
                Slot::Ready { .. } => stats.stale += 1,
                Slot::Pending { .. } => stats.pending += 1,
            }
        }
        stats
    }
}

// ---

/// Cache key for `request` on `channel`.
///
/// Object keys are sorted at every level so field order never causes a miss.
pub fn fingerprint<T: Serialize>(channel: Channel, request: &T) -> Result<String, serde_json::Error> {
    // ---
    let value = serde_json::to_value(request)?;
    let mut out = String::with_capacity(128);
    out.push_str(channel.name());
    out.push(':');
    write_canonical(&value, &mut out);
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) {
    // ---
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use futures::FutureExt;
    use serde_json::json;

    fn cache() -> (Arc<ManualClock>, ResultCache) {
        // ---
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 7, 15, 12, 0, 0).unwrap(),
        ));
        let cache = ResultCache::new(clock.clone());
        (clock, cache)
    }

    fn ready(value: Value) -> SharedFetch {
        futures::future::ready(Ok(value)).boxed().shared()
    }

    #[test]
    fn test_put_then_get_until_ttl() {
        // ---
        let (clock, cache) = cache();
        cache.put("soil:{}", json!({"score": 1}));

        clock.advance(ChronoDuration::minutes(5));
        assert_eq!(cache.get("soil:{}"), Some(json!({"score": 1})));

        clock.advance(ChronoDuration::milliseconds(1));
        assert_eq!(cache.get("soil:{}"), None);
        assert_eq!(cache.stats().stale, 1);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_concurrent_begin_shares_one_request() {
        // ---
        let (_clock, cache) = cache();
        let mut started = 0;

        let first = cache.begin("pest:{}", |_| {
            started += 1;
            ready(json!(1))
        });
        let second = cache.begin("pest:{}", |_| {
            started += 1;
            ready(json!(2))
        });

        assert_eq!(started, 1);
        let (g1, g2) = match (first, second) {
            (Entry::Wait { generation: a, .. }, Entry::Wait { generation: b, .. }) => (a, b),
            _ => panic!("expected both callers to wait"),
        };
        assert_eq!(g1, g2);
        assert_eq!(cache.stats().pending, 1);
    }

    #[test]
    fn test_settle_success_caches_value() {
        // ---
        let (_clock, cache) = cache();
        let generation = match cache.begin("rainfall:{}", |_| ready(json!(5))) {
            Entry::Wait { generation, .. } => generation,
            Entry::Hit(_) => panic!("cold cache cannot hit"),
        };

        cache.settle("rainfall:{}", generation, &Ok(json!(5)));
        // second settle for the same generation is harmless
        cache.settle("rainfall:{}", generation, &Ok(json!(6)));

        match cache.begin("rainfall:{}", |_| ready(json!(7))) {
            Entry::Hit(v) => assert_eq!(v, json!(5)),
            Entry::Wait { .. } => panic!("expected a cache hit"),
        }
    }

    #[test]
    fn test_settle_failure_clears_slot() {
        // ---
        let (_clock, cache) = cache();
        let generation = match cache.begin("yield:{}", |_| ready(json!(0))) {
            Entry::Wait { generation, .. } => generation,
            Entry::Hit(_) => unreachable!(),
        };
        cache.settle(
            "yield:{}",
            generation,
            &Err(TransportError::Network("refused".into())),
        );
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_settle_ignores_other_generations() {
        // ---
        let (_clock, cache) = cache();
        let generation = match cache.begin("soil:{}", |_| ready(json!(0))) {
            Entry::Wait { generation, .. } => generation,
            Entry::Hit(_) => unreachable!(),
        };
        cache.clear();
        let _ = cache.begin("soil:{}", |_| ready(json!(1)));

        cache.settle("soil:{}", generation, &Ok(json!(0)));
        assert_eq!(cache.stats().pending, 1);
        assert_eq!(cache.get("soil:{}"), None);
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        // ---
        let a = json!({"ph": 6.5, "nitrogen": 50.0, "nested": {"b": 1, "a": 2}});
        let b = json!({"nested": {"a": 2, "b": 1}, "nitrogen": 50.0, "ph": 6.5});
        let fa = fingerprint(Channel::Soil, &a).unwrap();
        let fb = fingerprint(Channel::Soil, &b).unwrap();

        assert_eq!(fa, fb);
        assert_eq!(fa, r#"soil:{"nested":{"a":2,"b":1},"nitrogen":50.0,"ph":6.5}"#);
    }

    #[test]
    fn test_fingerprint_separates_channels_and_values() {
        // ---
        let req = json!({"temperature": 25.0});
        assert_ne!(
            fingerprint(Channel::Pest, &req).unwrap(),
            fingerprint(Channel::Rainfall, &req).unwrap()
        );
        assert_ne!(
            fingerprint(Channel::Pest, &req).unwrap(),
            fingerprint(Channel::Pest, &json!({"temperature": 25.5})).unwrap()
        );
    }
}
