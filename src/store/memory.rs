use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use super::{
    BanEntry, BanStore, Granularity, HitBucket, HitRecord, MonitoringStore, WhitelistEntry,
    WhitelistStore,
};
use crate::utils::GuardResult;

/// In-process store. Each mutation runs under the write lock of its table,
/// so counter increments are serialized per key.
#[derive(Default)]
pub struct MemoryStore {
    hits: RwLock<HashMap<HitBucket, u64>>,
    bans: RwLock<HashMap<String, BanEntry>>,
    whitelist: RwLock<HashMap<String, WhitelistEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitoringStore for MemoryStore {
    async fn increment(&self, buckets: &[HitBucket]) -> GuardResult<()> {
        let mut hits = self.hits.write().await;
        for bucket in buckets {
            *hits.entry(bucket.clone()).or_insert(0) += 1;
        }
        Ok(())
    }

    async fn ip_exists(&self, ip: &str) -> GuardResult<bool> {
        let hits = self.hits.read().await;
        Ok(hits.keys().any(|bucket| bucket.ip == ip))
    }

    async fn day_counters(&self, day: NaiveDate, granularity: Granularity) -> GuardResult<Vec<HitRecord>> {
        let hits = self.hits.read().await;
        Ok(hits
            .iter()
            .filter(|(bucket, _)| bucket.day == day && bucket.granularity() == granularity)
            .map(|(bucket, count)| HitRecord {
                bucket: bucket.clone(),
                count: *count,
            })
            .collect())
    }

    async fn delete_days_before(&self, day: NaiveDate) -> GuardResult<u64> {
        let mut hits = self.hits.write().await;
        let before = hits.len();
        hits.retain(|bucket, _| bucket.day >= day);
        Ok((before - hits.len()) as u64)
    }

    async fn clear_hits(&self) -> GuardResult<u64> {
        let mut hits = self.hits.write().await;
        let removed = hits.len() as u64;
        hits.clear();
        Ok(removed)
    }

    async fn clear_hits_for_ip(&self, ip: &str) -> GuardResult<u64> {
        let mut hits = self.hits.write().await;
        let before = hits.len();
        hits.retain(|bucket, _| bucket.ip != ip);
        Ok((before - hits.len()) as u64)
    }
}

#[async_trait]
impl BanStore for MemoryStore {
    async fn upsert_ban(&self, entry: &BanEntry) -> GuardResult<bool> {
        let mut bans = self.bans.write().await;
        Ok(bans.insert(entry.ip.clone(), entry.clone()).is_none())
    }

    async fn delete_ban(&self, ip: &str) -> GuardResult<u64> {
        let mut bans = self.bans.write().await;
        Ok(bans.remove(ip).map_or(0, |_| 1))
    }

    async fn find_ban(&self, ip: &str) -> GuardResult<Option<BanEntry>> {
        let bans = self.bans.read().await;
        Ok(bans.get(ip).cloned())
    }

    async fn all_bans(&self) -> GuardResult<Vec<BanEntry>> {
        let bans = self.bans.read().await;
        Ok(bans.values().cloned().collect())
    }

    async fn delete_bans_expired(&self, now: DateTime<Utc>) -> GuardResult<u64> {
        let mut bans = self.bans.write().await;
        let before = bans.len();
        bans.retain(|_, ban| ban.until >= now);
        Ok((before - bans.len()) as u64)
    }

    async fn clear_bans(&self) -> GuardResult<u64> {
        let mut bans = self.bans.write().await;
        let removed = bans.len() as u64;
        bans.clear();
        Ok(removed)
    }
}

#[async_trait]
impl WhitelistStore for MemoryStore {
    async fn insert_whitelist(&self, entry: &WhitelistEntry) -> GuardResult<bool> {
        let mut whitelist = self.whitelist.write().await;
        if whitelist.contains_key(&entry.ip) {
            return Ok(false);
        }
        whitelist.insert(entry.ip.clone(), entry.clone());
        Ok(true)
    }

    async fn delete_whitelist(&self, ip: &str) -> GuardResult<u64> {
        let mut whitelist = self.whitelist.write().await;
        Ok(whitelist.remove(ip).map_or(0, |_| 1))
    }

    async fn find_whitelist(&self, ip: &str) -> GuardResult<Option<WhitelistEntry>> {
        let whitelist = self.whitelist.read().await;
        Ok(whitelist.get(ip).cloned())
    }

    async fn all_whitelist(&self) -> GuardResult<Vec<WhitelistEntry>> {
        let whitelist = self.whitelist.read().await;
        Ok(whitelist.values().cloned().collect())
    }
}
