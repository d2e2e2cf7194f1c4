use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{
    default_profiles, AutoBan, AutoBanReport, AutoWhitelist, AutoWhitelistReport, AutobanProfile,
    BanEntry, BanList, CrawlerClassifier, Monitoring, ProfileOutcome, ReverseResolver, TopEntry,
    Whitelist, WhitelistEntry,
};
use crate::store::{BanStore, MonitoringStore, WhitelistStore};
use crate::utils::{log_rejected_observation, GuardResult};

/// One request seen by the ingestion collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub ip: String,
    /// RFC 3339 instant of the request
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub bans_removed: u64,
    pub counters_removed: u64,
}

/// Entry point for ingestion, the scheduler and the admin surface.
///
/// Holds the ledger, both registries and both engines; every call maps onto
/// one of them without extra logic.
pub struct TrafficService {
    monitoring: Arc<Monitoring>,
    bans: Arc<BanList>,
    whitelist: Arc<Whitelist>,
    autoban: AutoBan,
    autowhitelist: AutoWhitelist,
}

impl TrafficService {
    /// Creates a new traffic service from its parts
    pub fn new(
        monitoring: Arc<Monitoring>,
        bans: Arc<BanList>,
        whitelist: Arc<Whitelist>,
        profiles: Vec<AutobanProfile>,
    ) -> Self {
        let autoban = AutoBan::new(monitoring.clone(), bans.clone(), whitelist.clone(), profiles);
        let autowhitelist = AutoWhitelist::new(monitoring.clone(), bans.clone(), whitelist.clone());

        Self {
            monitoring,
            bans,
            whitelist,
            autoban,
            autowhitelist,
        }
    }

    /// Wires everything onto a single store with the built-in profiles and
    /// crawler matchers
    pub fn from_store<S>(store: Arc<S>, resolver: Arc<dyn ReverseResolver>) -> Self
    where
        S: MonitoringStore + BanStore + WhitelistStore + 'static,
    {
        let monitoring = Arc::new(Monitoring::new(store.clone()));
        let bans = Arc::new(BanList::new(store.clone()));
        let whitelist = Arc::new(Whitelist::new(
            store,
            CrawlerClassifier::with_default_matchers(resolver),
        ));

        Self::new(monitoring, bans, whitelist, default_profiles())
    }

    pub fn monitoring(&self) -> &Monitoring {
        &self.monitoring
    }

    pub fn bans(&self) -> &BanList {
        &self.bans
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Record one observation. Malformed events are logged and dropped
    /// (`Ok(false)`); only store failures are errors.
    pub async fn observe(&self, event: &Observation) -> GuardResult<bool> {
        let ip: IpAddr = match event.ip.trim().parse() {
            Ok(ip) => ip,
            Err(_) => {
                log_rejected_observation(&event.ip, &event.timestamp, "malformed ip");
                metrics::increment_counter!("traffic_guard_observations_total", "result" => "rejected");
                return Ok(false);
            }
        };

        let timestamp = match DateTime::parse_from_rfc3339(event.timestamp.trim()) {
            Ok(timestamp) => timestamp.with_timezone(&Utc),
            Err(_) => {
                log_rejected_observation(&event.ip, &event.timestamp, "malformed timestamp");
                metrics::increment_counter!("traffic_guard_observations_total", "result" => "rejected");
                return Ok(false);
            }
        };

        self.monitoring.add(&ip.to_canonical().to_string(), timestamp).await?;
        metrics::increment_counter!("traffic_guard_observations_total", "result" => "accepted");
        Ok(true)
    }

    /// Record a batch of observations, stopping at the first store error
    pub async fn observe_batch(&self, events: &[Observation]) -> GuardResult<IngestSummary> {
        let mut summary = IngestSummary::default();
        for event in events {
            if self.observe(event).await? {
                summary.accepted += 1;
            } else {
                summary.rejected += 1;
            }
        }
        Ok(summary)
    }

    pub async fn auto_ban(&self) -> GuardResult<AutoBanReport> {
        self.autoban.run().await
    }

    pub async fn auto_ban_by_profile(&self, profile: &AutobanProfile) -> GuardResult<ProfileOutcome> {
        self.autoban.ban_by_profile(profile).await
    }

    pub async fn auto_whitelist(&self) -> GuardResult<AutoWhitelistReport> {
        self.autowhitelist.run().await
    }

    pub async fn auto_whitelist_ip(&self, ip: &str) -> GuardResult<Option<bool>> {
        self.autowhitelist.whitelist_ip(ip).await
    }

    /// Collect expired bans and counters of previous days
    pub async fn gc(&self) -> GuardResult<GcReport> {
        let bans_removed = self.bans.gc().await?;
        let counters_removed = self.monitoring.gc().await?;
        Ok(GcReport {
            bans_removed,
            counters_removed,
        })
    }

    pub async fn get_ban(&self, ip: &str) -> GuardResult<Option<BanEntry>> {
        self.bans.get(ip).await
    }

    pub async fn add_to_blacklist(&self, ip: &str, period: Duration, actor_id: i64, reason: &str) -> GuardResult<()> {
        self.bans.add(ip, period, actor_id, reason).await
    }

    pub async fn remove_from_blacklist(&self, ip: &str) -> GuardResult<()> {
        self.bans.remove(ip).await
    }

    pub async fn top_ips(&self, limit: usize) -> GuardResult<Vec<TopEntry>> {
        self.monitoring.list_of_top(limit).await
    }

    pub async fn list_whitelist(&self) -> GuardResult<Vec<WhitelistEntry>> {
        self.whitelist.list().await
    }

    pub async fn add_whitelist(&self, ip: &str, description: &str) -> GuardResult<bool> {
        self.whitelist.add(ip, description).await
    }

    pub async fn remove_whitelist(&self, ip: &str) -> GuardResult<()> {
        self.whitelist.remove(ip).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StaticResolver;
    use crate::store::MemoryStore;

    fn service() -> TrafficService {
        TrafficService::from_store(Arc::new(MemoryStore::new()), Arc::new(StaticResolver::default()))
    }

    fn event(ip: &str, timestamp: &str) -> Observation {
        Observation {
            ip: ip.to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    #[tokio::test]
    async fn malformed_observations_are_dropped() {
        let service = service();
        let now = Utc::now().to_rfc3339();

        let summary = service
            .observe_batch(&[
                event("192.0.2.10", &now),
                event("not-an-ip", &now),
                event("192.0.2.11", "yesterday-ish"),
            ])
            .await
            .unwrap();

        assert_eq!(summary, IngestSummary { accepted: 1, rejected: 2 });
        assert!(service.monitoring().exists_ip("192.0.2.10").await.unwrap());
        assert!(!service.monitoring().exists_ip("192.0.2.11").await.unwrap());
    }

    #[tokio::test]
    async fn ipv6_is_stored_in_canonical_form() {
        let service = service();
        let now = Utc::now().to_rfc3339();

        assert!(service.observe(&event("2001:DB8:0:0::1", &now)).await.unwrap());
        assert!(service.monitoring().exists_ip("2001:db8::1").await.unwrap());
    }

    #[tokio::test]
    async fn ipv4_mapped_addresses_share_the_ipv4_counters() {
        let service = service();
        let now = Utc::now().to_rfc3339();

        assert!(service.observe(&event("::ffff:66.249.73.139", &now)).await.unwrap());
        assert!(service.observe(&event("66.249.73.139", &now)).await.unwrap());

        let top = service.top_ips(10).await.unwrap();
        assert_eq!(top, vec![TopEntry { ip: "66.249.73.139".into(), count: 2 }]);
    }

    #[tokio::test]
    async fn offset_timestamps_are_bucketed_in_utc() {
        let service = service();
        let local = Utc::now()
            .with_timezone(&chrono::FixedOffset::east_opt(3 * 3600).unwrap())
            .to_rfc3339();

        assert!(service.observe(&event("192.0.2.12", &local)).await.unwrap());
        let top = service.top_ips(10).await.unwrap();
        assert_eq!(top, vec![TopEntry { ip: "192.0.2.12".into(), count: 1 }]);
    }

    #[tokio::test]
    async fn gc_reports_both_tables() {
        let service = service();
        service
            .add_to_blacklist("192.0.2.13", Duration::seconds(-5), 1, "gone")
            .await
            .unwrap();
        service
            .monitoring()
            .add("192.0.2.13", Utc::now() - Duration::days(2))
            .await
            .unwrap();

        let report = service.gc().await.unwrap();
        assert_eq!(report, GcReport { bans_removed: 1, counters_removed: 4 });
    }
}
