use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::profile::AutobanProfile;
use crate::store::{Granularity, MonitoringStore};
use crate::utils::GuardResult;

pub use crate::store::{HitBucket, HitRecord};

/// Most ips a ban profile query hands back in one run
pub const BAN_PROFILE_LIMIT: usize = 1000;

/// Day total of one ip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopEntry {
    pub ip: String,
    pub count: u64,
}

/// Per-ip hit ledger at day, hour, ten-minute and minute resolution
pub struct Monitoring {
    store: Arc<dyn MonitoringStore>,
}

impl Monitoring {
    /// Create a new ledger on top of `store`
    pub fn new(store: Arc<dyn MonitoringStore>) -> Self {
        Self { store }
    }

    /// Record one hit from `ip` at `timestamp`
    pub async fn add(&self, ip: &str, timestamp: DateTime<Utc>) -> GuardResult<()> {
        let buckets = HitBucket::for_timestamp(ip, timestamp);
        self.store.increment(&buckets).await?;

        tracing::trace!(ip = %ip, timestamp = %timestamp, event = "hit_recorded");
        Ok(())
    }

    /// Whether anything was ever recorded for `ip` and not yet collected
    pub async fn exists_ip(&self, ip: &str) -> GuardResult<bool> {
        self.store.ip_exists(ip).await
    }

    /// Today's busiest ips, highest day total first
    pub async fn list_of_top(&self, limit: usize) -> GuardResult<Vec<TopEntry>> {
        let today = Utc::now().date_naive();
        let mut top: Vec<TopEntry> = self
            .store
            .day_counters(today, Granularity::Day)
            .await?
            .into_iter()
            .map(|record| TopEntry {
                ip: record.bucket.ip,
                count: record.count,
            })
            .collect();

        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
        top.truncate(limit);
        Ok(top)
    }

    /// Distinct ips with at least one group of today's counters above the
    /// profile threshold, worst offender first, at most [`BAN_PROFILE_LIMIT`]
    pub async fn list_by_ban_profile(&self, profile: &AutobanProfile) -> GuardResult<Vec<String>> {
        let today = Utc::now().date_naive();
        let grouping = profile.grouping;
        let counters = self.store.day_counters(today, grouping.source()).await?;

        let mut groups: HashMap<(String, Option<u32>, Option<u32>, Option<u32>), u64> = HashMap::new();
        for record in counters {
            let bucket = record.bucket;
            let key = (
                bucket.ip,
                bucket.hour.filter(|_| grouping.hour),
                bucket.ten_minute.filter(|_| grouping.ten_minute),
                bucket.minute.filter(|_| grouping.minute),
            );
            *groups.entry(key).or_insert(0) += record.count;
        }

        // Highest offending group per ip
        let mut offenders: HashMap<String, u64> = HashMap::new();
        for ((ip, ..), sum) in groups {
            if sum > profile.threshold {
                let worst = offenders.entry(ip).or_insert(0);
                *worst = (*worst).max(sum);
            }
        }

        let mut offenders: Vec<(String, u64)> = offenders.into_iter().collect();
        offenders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        offenders.truncate(BAN_PROFILE_LIMIT);

        Ok(offenders.into_iter().map(|(ip, _)| ip).collect())
    }

    /// Drop every counter older than today. Today's counters stay because the
    /// intraday profiles read them.
    pub async fn gc(&self) -> GuardResult<u64> {
        let today = Utc::now().date_naive();
        let removed = self.store.delete_days_before(today).await?;
        tracing::debug!(removed = %removed, event = "monitoring_gc");
        Ok(removed)
    }

    pub async fn clear(&self) -> GuardResult<u64> {
        self.store.clear_hits().await
    }

    pub async fn clear_ip(&self, ip: &str) -> GuardResult<u64> {
        self.store.clear_hits_for_ip(ip).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::{default_profiles, Grouping};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn ledger() -> Monitoring {
        Monitoring::new(Arc::new(MemoryStore::new()))
    }

    fn profile(threshold: u64, grouping: Grouping) -> AutobanProfile {
        AutobanProfile {
            name: "test",
            threshold,
            grouping,
            ban_duration: Duration::hours(1),
            reason: "test",
        }
    }

    #[tokio::test]
    async fn top_is_sorted_and_capped() {
        let monitoring = ledger();
        let now = Utc::now();
        for (ip, hits) in [("10.0.0.1", 2), ("10.0.0.2", 5), ("10.0.0.3", 1)] {
            for _ in 0..hits {
                monitoring.add(ip, now).await.unwrap();
            }
        }

        let top = monitoring.list_of_top(2).await.unwrap();
        assert_eq!(
            top,
            vec![
                TopEntry { ip: "10.0.0.2".into(), count: 5 },
                TopEntry { ip: "10.0.0.1".into(), count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn top_ignores_previous_days() {
        let monitoring = ledger();
        monitoring.add("10.0.0.9", Utc::now() - Duration::days(1)).await.unwrap();
        assert!(monitoring.list_of_top(10).await.unwrap().is_empty());
        assert!(monitoring.exists_ip("10.0.0.9").await.unwrap());
    }

    #[tokio::test]
    async fn spread_hits_pass_minute_profile_but_fail_daily() {
        let monitoring = ledger();
        let midnight = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap();
        let today = Utc.from_utc_datetime(&midnight);
        // one hit in each of six different minutes
        for minute in [0, 11, 22, 33, 44, 55] {
            monitoring.add("10.1.1.1", today + Duration::minutes(minute)).await.unwrap();
        }

        let minute = profile(3, Grouping::MINUTE);
        assert!(monitoring.list_by_ban_profile(&minute).await.unwrap().is_empty());

        let daily = profile(3, Grouping::DAY);
        assert_eq!(monitoring.list_by_ban_profile(&daily).await.unwrap(), vec!["10.1.1.1"]);
    }

    #[tokio::test]
    async fn threshold_is_strict() {
        let monitoring = ledger();
        let now = Utc::now();
        for _ in 0..3 {
            monitoring.add("10.2.2.2", now).await.unwrap();
        }
        let at_threshold = profile(3, Grouping::TEN_MINUTE);
        assert!(monitoring.list_by_ban_profile(&at_threshold).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn quiet_ip_is_not_listed_by_default_profiles() {
        let monitoring = ledger();
        monitoring.add("10.3.3.3", Utc::now()).await.unwrap();
        for profile in default_profiles() {
            assert!(monitoring.list_by_ban_profile(&profile).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn clear_ip_leaves_other_ips() {
        let monitoring = ledger();
        let now = Utc::now();
        monitoring.add("10.4.4.4", now).await.unwrap();
        monitoring.add("10.5.5.5", now).await.unwrap();

        assert_eq!(monitoring.clear_ip("10.4.4.4").await.unwrap(), 4);
        assert!(!monitoring.exists_ip("10.4.4.4").await.unwrap());
        assert!(monitoring.exists_ip("10.5.5.5").await.unwrap());

        assert_eq!(monitoring.clear().await.unwrap(), 4);
        assert!(!monitoring.exists_ip("10.5.5.5").await.unwrap());
    }
}
