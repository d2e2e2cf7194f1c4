use chrono::Duration;

use crate::store::Granularity;

/// Columns a ban profile groups the day's counters by, on top of the ip.
/// All columns off means the whole-day total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Grouping {
    pub hour: bool,
    pub ten_minute: bool,
    pub minute: bool,
}

impl Grouping {
    pub const DAY: Grouping = Grouping { hour: false, ten_minute: false, minute: false };
    pub const HOUR: Grouping = Grouping { hour: true, ten_minute: false, minute: false };
    pub const TEN_MINUTE: Grouping = Grouping { hour: true, ten_minute: true, minute: false };
    pub const MINUTE: Grouping = Grouping { hour: true, ten_minute: true, minute: true };

    /// The finest counter table that carries every grouped column
    pub fn source(&self) -> Granularity {
        if self.minute {
            Granularity::Minute
        } else if self.ten_minute {
            Granularity::TenMinute
        } else if self.hour {
            Granularity::Hour
        } else {
            Granularity::Day
        }
    }
}

/// One escalation step of the autoban engine
#[derive(Debug, Clone)]
pub struct AutobanProfile {
    pub name: &'static str,
    /// A group is reported once its sum is strictly above this
    pub threshold: u64,
    pub grouping: Grouping,
    pub ban_duration: Duration,
    pub reason: &'static str,
}

/// Built-in profiles, coarsest first. The autoban engine evaluates them in
/// this order and later bans overwrite earlier ones.
pub fn default_profiles() -> Vec<AutobanProfile> {
    vec![
        AutobanProfile {
            name: "daily",
            threshold: 10_000,
            grouping: Grouping::DAY,
            ban_duration: Duration::days(10),
            reason: "autoban: daily limit",
        },
        AutobanProfile {
            name: "hourly",
            threshold: 3_600,
            grouping: Grouping::HOUR,
            ban_duration: Duration::days(5),
            reason: "autoban: hourly limit",
        },
        AutobanProfile {
            name: "ten-minute",
            threshold: 1_200,
            grouping: Grouping::TEN_MINUTE,
            ban_duration: Duration::days(1),
            reason: "autoban: ten-minute limit",
        },
        AutobanProfile {
            name: "minute",
            threshold: 700,
            grouping: Grouping::MINUTE,
            ban_duration: Duration::hours(12),
            reason: "autoban: minute limit",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profiles_run_coarse_to_fine() {
        let sources: Vec<_> = default_profiles().iter().map(|p| p.grouping.source()).collect();
        assert_eq!(sources, Granularity::ALL.to_vec());
    }

    #[test]
    fn lone_minute_grouping_reads_minute_counters() {
        let grouping = Grouping { minute: true, ..Grouping::default() };
        assert_eq!(grouping.source(), Granularity::Minute);
    }
}
