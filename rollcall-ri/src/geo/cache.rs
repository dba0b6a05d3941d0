//! In-memory jurisdiction cache keyed by address fingerprint
//!
//! Never persisted. Expired entries are kept (until evicted) so a geocoder
//! outage can still answer from a previous mapping, flagged as stale.

use super::geocoder::ResolvedJurisdiction;
use super::privacy::AddressFingerprint;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    jurisdiction: ResolvedJurisdiction,
    inserted_at: Instant,
}

/// Cache lookup outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheHit {
    Fresh(ResolvedJurisdiction),
    Expired(ResolvedJurisdiction),
}

pub struct JurisdictionCache {
    entries: RwLock<HashMap<AddressFingerprint, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl JurisdictionCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub async fn get(&self, fingerprint: &AddressFingerprint) -> Option<CacheHit> {
        let entries = self.entries.read().await;
        let entry = entries.get(fingerprint)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(CacheHit::Fresh(entry.jurisdiction.clone()))
        } else {
            Some(CacheHit::Expired(entry.jurisdiction.clone()))
        }
    }

    /// Insert or refresh a mapping, evicting the oldest entry when full
    pub async fn insert(&self, fingerprint: AddressFingerprint, jurisdiction: ResolvedJurisdiction) {
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&fingerprint) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }

        entries.insert(
            fingerprint,
            CacheEntry {
                jurisdiction,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::privacy::{normalize_address, AddressHasher};

    fn fingerprint(address: &str) -> AddressFingerprint {
        AddressHasher::new("salt").fingerprint(&normalize_address(address))
    }

    #[tokio::test]
    async fn test_fresh_hit_then_expired() {
        let cache = JurisdictionCache::new(Duration::from_millis(30), 10);
        let key = fingerprint("1 Main St, Albany, NY");
        cache.insert(key.clone(), ResolvedJurisdiction::state_only("NY")).await;

        assert!(matches!(cache.get(&key).await, Some(CacheHit::Fresh(_))));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(cache.get(&key).await, Some(CacheHit::Expired(ref j)) if j.state == "NY"));
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache = JurisdictionCache::new(Duration::from_secs(60), 2);
        let a = fingerprint("1 A St");
        let b = fingerprint("2 B St");
        let c = fingerprint("3 C St");

        cache.insert(a.clone(), ResolvedJurisdiction::state_only("AK")).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert(b.clone(), ResolvedJurisdiction::state_only("AL")).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert(c.clone(), ResolvedJurisdiction::state_only("AR")).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&a).await.is_none());
        assert!(cache.get(&c).await.is_some());
    }
}
