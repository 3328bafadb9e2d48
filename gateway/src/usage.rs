//! Per-key usage counters with a bounded request history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use relay_common::{HistoryEntry, UsageStats};

/// Default number of history entries kept per key.
pub const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("No usage record for API key {0}")]
    UnknownKey(String),
}

pub trait UsageRecorder: Send + Sync {
    /// Create a zeroed record for `key`. A no-op if one exists.
    fn open(&self, key: &str);

    /// Count one request of `tokens` against `key`.
    fn record(
        &self,
        key: &str,
        tokens: u64,
        model: &str,
        now: DateTime<Utc>,
    ) -> Result<(), UsageError>;

    fn snapshot(&self, key: &str) -> Option<UsageStats>;

    /// Move the record of `old_key` to `new_key`, keeping its counters. If
    /// `new_key` already has a record the two are merged.
    fn rekey(&self, old_key: &str, new_key: &str);
}

#[derive(Debug, Default)]
struct UsageRecord {
    total_requests: u64,
    total_tokens: u64,
    history: VecDeque<HistoryEntry>,
}

/// In-memory recorder.
///
/// Each key's record sits behind its shard lock, so concurrent records for
/// one key are applied one after the other.
#[derive(Debug)]
pub struct MemoryUsageRecorder {
    capacity: usize,
    records: DashMap<String, UsageRecord>,
}

impl Default for MemoryUsageRecorder {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl MemoryUsageRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: DashMap::new(),
        }
    }
}

impl UsageRecorder for MemoryUsageRecorder {
    fn open(&self, key: &str) {
        self.records.entry(key.to_string()).or_default();
    }

    fn record(
        &self,
        key: &str,
        tokens: u64,
        model: &str,
        now: DateTime<Utc>,
    ) -> Result<(), UsageError> {
        let mut record = self
            .records
            .get_mut(key)
            .ok_or_else(|| UsageError::UnknownKey(key.to_string()))?;

        record.total_requests += 1;
        record.total_tokens += tokens;
        record.history.push_back(HistoryEntry {
            timestamp: now,
            tokens,
            model: model.to_string(),
        });
        while record.history.len() > self.capacity {
            record.history.pop_front();
        }

        tracing::debug!(
            api_key = %key,
            total_requests = record.total_requests,
            total_tokens = record.total_tokens,
            "Usage recorded"
        );
        Ok(())
    }

    fn snapshot(&self, key: &str) -> Option<UsageStats> {
        self.records.get(key).map(|record| UsageStats {
            total_requests: record.total_requests,
            total_tokens: record.total_tokens,
            request_history: record.history.iter().cloned().collect(),
        })
    }

    fn rekey(&self, old_key: &str, new_key: &str) {
        let Some((_, moved)) = self.records.remove(old_key) else {
            self.open(new_key);
            return;
        };

        let mut record = self.records.entry(new_key.to_string()).or_default();
        record.total_requests += moved.total_requests;
        record.total_tokens += moved.total_tokens;

        let mut history: Vec<HistoryEntry> = moved.history.into_iter().collect();
        history.extend(record.history.drain(..));
        history.sort_by_key(|entry| entry.timestamp);
        let excess = history.len().saturating_sub(self.capacity);
        record.history = history.into_iter().skip(excess).collect();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_record_requires_open() {
        let recorder = MemoryUsageRecorder::default();
        assert_eq!(
            recorder.record("k", 5, "gpt-4", Utc::now()),
            Err(UsageError::UnknownKey("k".to_string()))
        );
        assert!(recorder.snapshot("k").is_none());
    }

    #[test]
    fn test_open_is_zeroed_and_idempotent() {
        let recorder = MemoryUsageRecorder::default();
        recorder.open("k");
        recorder.record("k", 7, "gpt-4", Utc::now()).unwrap();
        recorder.open("k");

        let stats = recorder.snapshot("k").unwrap();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_tokens, 7);
    }

    #[test]
    fn test_totals_and_history_window() {
        let recorder = MemoryUsageRecorder::default();
        recorder.open("k");
        let start = Utc::now();

        for i in 0..150u64 {
            recorder
                .record("k", i, "gpt-4", start + Duration::seconds(i as i64))
                .unwrap();
        }

        let stats = recorder.snapshot("k").unwrap();
        assert_eq!(stats.total_requests, 150);
        assert_eq!(stats.total_tokens, (0..150u64).sum::<u64>());
        assert_eq!(stats.request_history.len(), HISTORY_CAPACITY);
        assert_eq!(stats.request_history.first().unwrap().tokens, 50);
        assert_eq!(stats.request_history.last().unwrap().tokens, 149);
    }

    #[test]
    fn test_rekey_moves_counters() {
        let recorder = MemoryUsageRecorder::default();
        recorder.open("old");
        recorder.record("old", 10, "gpt-4", Utc::now()).unwrap();

        recorder.rekey("old", "new");

        assert!(recorder.snapshot("old").is_none());
        assert_eq!(recorder.snapshot("new").unwrap().total_tokens, 10);
        assert!(recorder.record("old", 1, "gpt-4", Utc::now()).is_err());
    }

    #[test]
    fn test_rekey_merges_into_record_opened_for_new_key() {
        let recorder = MemoryUsageRecorder::new(3);
        let start = Utc::now();
        recorder.open("old");
        recorder.record("old", 10, "gpt-4", start).unwrap();
        recorder
            .record("old", 20, "gpt-4", start + Duration::seconds(2))
            .unwrap();
        recorder.open("new");
        recorder
            .record("new", 1, "gpt-4o-mini", start + Duration::seconds(1))
            .unwrap();
        recorder
            .record("new", 2, "gpt-4o-mini", start + Duration::seconds(3))
            .unwrap();

        recorder.rekey("old", "new");

        let stats = recorder.snapshot("new").unwrap();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.total_tokens, 33);
        let tokens: Vec<u64> = stats.request_history.iter().map(|e| e.tokens).collect();
        assert_eq!(tokens, vec![1, 20, 2]);
        assert!(recorder.snapshot("old").is_none());
    }

    #[test]
    fn test_concurrent_records_same_key() {
        let recorder = std::sync::Arc::new(MemoryUsageRecorder::new(1000));
        recorder.open("k");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let recorder = recorder.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        recorder.record("k", 2, "gpt-4", Utc::now()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stats = recorder.snapshot("k").unwrap();
        assert_eq!(stats.total_requests, 400);
        assert_eq!(stats.total_tokens, 800);
        assert_eq!(stats.request_history.len(), 400);
    }
}
