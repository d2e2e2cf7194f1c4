use std::sync::Arc;

use crate::core::ban_list::BanList;
use crate::core::monitoring::Monitoring;
use crate::core::whitelist::Whitelist;
use crate::utils::GuardResult;

/// How many of today's busiest ips one run classifies
pub const AUTOWHITELIST_TOP_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoWhitelistReport {
    pub checked: usize,
    pub matched: usize,
    /// Matches that were not whitelisted before this run
    pub inserted: usize,
}

/// Whitelists busy ips that reverse resolve to a known crawler, then drops
/// their ban and their recorded history.
pub struct AutoWhitelist {
    monitoring: Arc<Monitoring>,
    bans: Arc<BanList>,
    whitelist: Arc<Whitelist>,
}

impl AutoWhitelist {
    pub fn new(monitoring: Arc<Monitoring>, bans: Arc<BanList>, whitelist: Arc<Whitelist>) -> Self {
        Self {
            monitoring,
            bans,
            whitelist,
        }
    }

    /// Classify today's top ips. The first store error stops the run.
    pub async fn run(&self) -> GuardResult<AutoWhitelistReport> {
        let top = self.monitoring.list_of_top(AUTOWHITELIST_TOP_LIMIT).await?;

        let mut report = AutoWhitelistReport::default();
        for entry in top {
            report.checked += 1;
            if let Some(inserted) = self.whitelist_ip(&entry.ip).await? {
                report.matched += 1;
                if inserted {
                    report.inserted += 1;
                }
            }
        }

        tracing::info!(
            checked = %report.checked,
            matched = %report.matched,
            inserted = %report.inserted,
            event = "autowhitelist_run",
        );
        Ok(report)
    }

    /// Classify one ip. `None` on no match; otherwise whether a new whitelist
    /// row was written.
    pub async fn whitelist_ip(&self, ip: &str) -> GuardResult<Option<bool>> {
        let Some(found) = self.whitelist.match_auto(ip).await else {
            return Ok(None);
        };

        let inserted = self.whitelist.add(ip, &found.description).await?;
        self.bans.remove(ip).await?;
        self.monitoring.clear_ip(ip).await?;

        metrics::increment_counter!("traffic_guard_autowhitelist_matches_total");
        Ok(Some(inserted))
    }
}
