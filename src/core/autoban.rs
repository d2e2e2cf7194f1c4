use std::sync::Arc;

use crate::core::ban_list::{BanList, SYSTEM_ACTOR_ID};
use crate::core::monitoring::Monitoring;
use crate::core::profile::AutobanProfile;
use crate::core::whitelist::Whitelist;
use crate::utils::GuardResult;

/// What one profile evaluation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileOutcome {
    pub profile: &'static str,
    /// Ips over the threshold
    pub offenders: usize,
    pub banned: usize,
    /// Offenders left alone because they are whitelisted
    pub whitelisted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoBanReport {
    pub profiles: Vec<ProfileOutcome>,
}

impl AutoBanReport {
    pub fn banned(&self) -> usize {
        self.profiles.iter().map(|p| p.banned).sum()
    }
}

/// Bans ips whose counters cross a profile threshold.
///
/// Profiles run in list order and a ban overwrites any earlier one for the
/// same ip, so with coarse-to-fine profiles the finest violated profile's
/// duration and reason stick.
pub struct AutoBan {
    monitoring: Arc<Monitoring>,
    bans: Arc<BanList>,
    whitelist: Arc<Whitelist>,
    profiles: Vec<AutobanProfile>,
}

impl AutoBan {
    pub fn new(
        monitoring: Arc<Monitoring>,
        bans: Arc<BanList>,
        whitelist: Arc<Whitelist>,
        profiles: Vec<AutobanProfile>,
    ) -> Self {
        Self {
            monitoring,
            bans,
            whitelist,
            profiles,
        }
    }

    /// Evaluate every profile. The first store error stops the run; bans
    /// already written stay.
    pub async fn run(&self) -> GuardResult<AutoBanReport> {
        let mut report = AutoBanReport::default();
        for profile in &self.profiles {
            report.profiles.push(self.ban_by_profile(profile).await?);
        }
        Ok(report)
    }

    /// Ban every non-whitelisted offender of one profile
    pub async fn ban_by_profile(&self, profile: &AutobanProfile) -> GuardResult<ProfileOutcome> {
        let offenders = self.monitoring.list_by_ban_profile(profile).await?;
        let mut outcome = ProfileOutcome {
            profile: profile.name,
            offenders: offenders.len(),
            ..ProfileOutcome::default()
        };

        for ip in offenders {
            if self.whitelist.exists(&ip).await? {
                tracing::debug!(ip = %ip, profile = %profile.name, event = "autoban_skip_whitelisted");
                outcome.whitelisted += 1;
                continue;
            }

            self.bans
                .add(&ip, profile.ban_duration, SYSTEM_ACTOR_ID, profile.reason)
                .await?;
            metrics::increment_counter!("traffic_guard_bans_issued_total", "profile" => profile.name);
            outcome.banned += 1;
        }

        if outcome.offenders > 0 {
            tracing::warn!(
                profile = %profile.name,
                threshold = %profile.threshold,
                offenders = %outcome.offenders,
                banned = %outcome.banned,
                event = "autoban_profile",
            );
        }
        Ok(outcome)
    }
}
