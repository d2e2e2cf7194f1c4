//! Storage backends shared by the monitoring ledger and both registries.
//!
//! Every backend has to provide an atomic increment for hit counters;
//! nothing above this layer takes locks.

mod memory;
mod redis_store;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::Serialize;

use crate::utils::GuardResult;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Time resolution of a hit counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Day,
    Hour,
    TenMinute,
    Minute,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Day,
        Granularity::Hour,
        Granularity::TenMinute,
        Granularity::Minute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Hour => "hour",
            Granularity::TenMinute => "ten_minute",
            Granularity::Minute => "minute",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Granularity::ALL.into_iter().find(|g| g.as_str() == value)
    }
}

/// Key of one hit counter. Columns finer than the counter's granularity are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HitBucket {
    pub ip: String,
    pub day: NaiveDate,
    pub hour: Option<u32>,
    pub ten_minute: Option<u32>,
    pub minute: Option<u32>,
}

impl HitBucket {
    /// The day, hour, ten-minute and minute counters a hit at `timestamp` lands in
    pub fn for_timestamp(ip: &str, timestamp: DateTime<Utc>) -> [HitBucket; 4] {
        let day = timestamp.date_naive();
        let hour = timestamp.hour();
        let minute = timestamp.minute();
        let ten_minute = minute / 10;

        let bucket = |hour, ten_minute, minute| HitBucket {
            ip: ip.to_string(),
            day,
            hour,
            ten_minute,
            minute,
        };

        [
            bucket(None, None, None),
            bucket(Some(hour), None, None),
            bucket(Some(hour), Some(ten_minute), None),
            bucket(Some(hour), Some(ten_minute), Some(minute)),
        ]
    }

    pub fn granularity(&self) -> Granularity {
        match (self.hour, self.ten_minute, self.minute) {
            (_, _, Some(_)) => Granularity::Minute,
            (_, Some(_), None) => Granularity::TenMinute,
            (Some(_), None, None) => Granularity::Hour,
            (None, None, None) => Granularity::Day,
        }
    }

    /// Encodes the ip and bucket columns as `ip|hour|ten|minute`, keeping only
    /// the columns the granularity carries. `|` never appears in an address.
    pub(crate) fn field(&self) -> String {
        let mut field = self.ip.clone();
        for column in [self.hour, self.ten_minute, self.minute].into_iter().flatten() {
            field.push('|');
            field.push_str(&column.to_string());
        }
        field
    }

    pub(crate) fn from_field(day: NaiveDate, field: &str) -> Option<HitBucket> {
        let mut parts = field.split('|');
        let ip = parts.next()?.to_string();
        let mut column = || -> Option<Option<u32>> {
            match parts.next() {
                Some(part) => part.parse().ok().map(Some),
                None => Some(None),
            }
        };
        let hour = column()?;
        let ten_minute = column()?;
        let minute = column()?;

        Some(HitBucket {
            ip,
            day,
            hour,
            ten_minute,
            minute,
        })
    }
}

/// A hit counter and its current value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitRecord {
    pub bucket: HitBucket,
    pub count: u64,
}

/// A ban row. Soft-expired once `until` is in the past.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BanEntry {
    pub ip: String,
    pub until: DateTime<Utc>,
    pub by_actor_id: i64,
    pub reason: String,
}

impl BanEntry {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.until >= now
    }
}

/// A permanently exempt ip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhitelistEntry {
    pub ip: String,
    pub description: String,
}

/// Hit counter storage
#[async_trait]
pub trait MonitoringStore: Send + Sync {
    /// Adds one to every bucket, creating the missing ones. Must not lose
    /// updates when the same bucket is incremented concurrently.
    async fn increment(&self, buckets: &[HitBucket]) -> GuardResult<()>;

    /// Whether any counter exists for `ip`, on any day
    async fn ip_exists(&self, ip: &str) -> GuardResult<bool>;

    /// All counters of one granularity for one day
    async fn day_counters(&self, day: NaiveDate, granularity: Granularity) -> GuardResult<Vec<HitRecord>>;

    /// Deletes every counter of days strictly before `day`
    async fn delete_days_before(&self, day: NaiveDate) -> GuardResult<u64>;

    async fn clear_hits(&self) -> GuardResult<u64>;

    async fn clear_hits_for_ip(&self, ip: &str) -> GuardResult<u64>;
}

/// Ban storage, unique by ip
#[async_trait]
pub trait BanStore: Send + Sync {
    /// Inserts or overwrites the row for `entry.ip`. Returns `true` on a fresh insert.
    async fn upsert_ban(&self, entry: &BanEntry) -> GuardResult<bool>;

    async fn delete_ban(&self, ip: &str) -> GuardResult<u64>;

    /// The stored row, expired or not
    async fn find_ban(&self, ip: &str) -> GuardResult<Option<BanEntry>>;

    async fn all_bans(&self) -> GuardResult<Vec<BanEntry>>;

    /// Deletes rows whose `until` is before `now`
    async fn delete_bans_expired(&self, now: DateTime<Utc>) -> GuardResult<u64>;

    async fn clear_bans(&self) -> GuardResult<u64>;
}

/// Whitelist storage, unique by ip
#[async_trait]
pub trait WhitelistStore: Send + Sync {
    /// Inserts the entry unless the ip is already present. Returns `true` when inserted.
    async fn insert_whitelist(&self, entry: &WhitelistEntry) -> GuardResult<bool>;

    async fn delete_whitelist(&self, ip: &str) -> GuardResult<u64>;

    async fn find_whitelist(&self, ip: &str) -> GuardResult<Option<WhitelistEntry>>;

    async fn all_whitelist(&self) -> GuardResult<Vec<WhitelistEntry>>;
}
