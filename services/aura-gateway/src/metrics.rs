//! Per-operation call statistics.
//!
//! One lock per store: every record is rewritten under the write lock, so a
//! snapshot never contains a half-updated entry.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub call_count: u64,
    #[serde(with = "duration_secs")]
    pub total_time: Duration,
    #[serde(with = "duration_secs")]
    pub avg_time: Duration,
    /// Failed or timed-out calls. Not part of the averages.
    pub error_count: u64,
}

impl OperationMetrics {
    fn add_call(&mut self, elapsed: Duration) {
        self.call_count += 1;
        self.total_time += elapsed;
        self.avg_time = average(self.total_time, self.call_count);
    }
}

/// `total / count` in whole nanoseconds; zero when nothing was counted.
pub fn average(total: Duration, count: u64) -> Duration {
    if count == 0 { return Duration::ZERO; }
    let nanos = total.as_nanos() / count as u128;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[derive(Debug, Default)]
pub struct MetricsStore {
    operations: RwLock<HashMap<String, OperationMetrics>>,
}

impl MetricsStore {
    pub fn new() -> Self { Self::default() }

    pub fn record(&self, name: &str, elapsed: Duration) {
        let mut ops = self.operations.write();
        match ops.get_mut(name) {
            Some(m) => m.add_call(elapsed),
            None => { let mut m = OperationMetrics::default(); m.add_call(elapsed); ops.insert(name.to_string(), m); }
        }
    }

    pub fn record_failure(&self, name: &str) {
        self.operations.write().entry(name.to_string()).or_default().error_count += 1;
    }

    pub fn get(&self, name: &str) -> Option<OperationMetrics> { self.operations.read().get(name).cloned() }

    pub fn snapshot(&self) -> BTreeMap<String, OperationMetrics> {
        self.operations.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn total_calls(&self) -> u64 { self.operations.read().values().map(|m| m.call_count).sum() }
}

/// Durations as fractional seconds on the wire.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> { s.serialize_f64(d.as_secs_f64()) }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn record_creates_and_averages() {
        let store = MetricsStore::new();
        assert!(store.get("double").is_none());
        store.record("double", Duration::from_millis(10));
        store.record("double", Duration::from_millis(20));
        let m = store.get("double").unwrap();
        assert_eq!(m.call_count, 2);
        assert_eq!(m.total_time, Duration::from_millis(30));
        assert_eq!(m.avg_time, Duration::from_millis(15));
    }

    #[test]
    fn failures_do_not_touch_timings() {
        let store = MetricsStore::new();
        store.record_failure("flaky");
        store.record("flaky", Duration::from_millis(4));
        let m = store.get("flaky").unwrap();
        assert_eq!((m.call_count, m.error_count), (1, 1));
        assert_eq!(m.avg_time, Duration::from_millis(4));
    }

    #[test]
    fn readers_never_see_torn_records() {
        let store = Arc::new(MetricsStore::new());
        let writers: Vec<_> = (0..4).map(|i| {
            let s = store.clone();
            std::thread::spawn(move || for n in 0..2_000u64 { s.record("op", Duration::from_nanos(n * 7 + i)); })
        }).collect();
        let reader = { let s = store.clone(); std::thread::spawn(move || {
            for _ in 0..2_000 {
                for m in s.snapshot().values() { assert_eq!(m.avg_time, average(m.total_time, m.call_count)); }
            }
        }) };
        for w in writers { w.join().unwrap(); }
        reader.join().unwrap();
        assert_eq!(store.get("op").unwrap().call_count, 8_000);
    }

    #[test]
    fn serializes_seconds() {
        let m = OperationMetrics { call_count: 2, total_time: Duration::from_millis(500), avg_time: Duration::from_millis(250), error_count: 0 };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["total_time"], serde_json::json!(0.5));
        assert_eq!(v["avg_time"], serde_json::json!(0.25));
    }
}
