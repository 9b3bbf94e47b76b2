//! Imported topologies kept for later downloads, keyed by an opaque import id.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use topology::Topology;
use uuid::Uuid;

use super::planpro::PlanProVersion;

#[derive(Debug, Clone)]
pub struct CachedImport {
    pub import_id: Uuid,
    pub topology: Topology,
    pub filename: String,
    pub version: PlanProVersion,
    pub signal_filter: bool,
    /// Temporary directory holding the uploaded file
    pub scope: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TopologyCache {
    entries: Arc<DashMap<Uuid, CachedImport>>,
    ttl: Duration,
    max_entries: usize,
}

impl TopologyCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Store an import; returns the entries pushed out by the size bound,
    /// oldest first
    pub fn insert(&self, entry: CachedImport) -> Vec<CachedImport> {
        self.entries.insert(entry.import_id, entry);

        let mut evicted = Vec::new();
        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.created_at)
                .map(|e| *e.key());
            let Some(oldest) = oldest else {
                break;
            };
            if let Some((_, removed)) = self.entries.remove(&oldest) {
                tracing::debug!("Evicting import {} (cache full)", removed.import_id);
                evicted.push(removed);
            }
        }
        evicted
    }

    /// A copy of a live entry; expired entries are treated as missing
    pub fn get(&self, import_id: Uuid) -> Option<CachedImport> {
        let entry = self.entries.get(&import_id)?;
        if self.is_expired(&entry) {
            return None;
        }
        Some(entry.clone())
    }

    /// Remove every expired entry and hand them back for cleanup
    pub fn sweep_expired(&self) -> Vec<CachedImport> {
        let expired: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|e| self.is_expired(e.value()))
            .map(|e| *e.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|(_, entry)| entry))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CachedImport) -> bool {
        let age = Utc::now().signed_duration_since(entry.created_at);
        age.to_std().is_ok_and(|age| age > self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(filename: &str, age_secs: i64) -> CachedImport {
        CachedImport {
            import_id: Uuid::new_v4(),
            topology: Topology::default(),
            filename: filename.to_string(),
            version: PlanProVersion::V1_10,
            signal_filter: false,
            scope: Uuid::new_v4(),
            created_at: Utc::now() - chrono::Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_entries_are_isolated_by_id() {
        let cache = TopologyCache::new(Duration::from_secs(60), 8);
        let first = entry("first.ppxml", 0);
        let second = entry("second.ppxml", 0);
        let (first_id, second_id) = (first.import_id, second.import_id);
        cache.insert(first);
        cache.insert(second);

        assert_eq!(cache.get(first_id).unwrap().filename, "first.ppxml");
        assert_eq!(cache.get(second_id).unwrap().filename, "second.ppxml");
        assert!(cache.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_size_bound_evicts_oldest() {
        let cache = TopologyCache::new(Duration::from_secs(600), 2);
        let oldest = entry("a", 30);
        let oldest_id = oldest.import_id;
        cache.insert(oldest);
        cache.insert(entry("b", 20));

        let evicted = cache.insert(entry("c", 0));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].import_id, oldest_id);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_expired_entries_are_hidden_and_swept() {
        let cache = TopologyCache::new(Duration::from_secs(10), 8);
        let stale = entry("stale", 60);
        let stale_id = stale.import_id;
        cache.insert(stale);
        cache.insert(entry("fresh", 0));

        assert!(cache.get(stale_id).is_none());
        let swept = cache.sweep_expired();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].import_id, stale_id);
        assert_eq!(cache.len(), 1);
    }
}
