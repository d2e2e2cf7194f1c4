use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::{
    BanEntry, BanStore, Granularity, HitBucket, HitRecord, MonitoringStore, WhitelistEntry,
    WhitelistStore,
};
use crate::utils::{GuardError, GuardResult};

const DAYS_KEY: &str = "monitoring:days";
const BANS_KEY: &str = "bans";
const WHITELIST_KEY: &str = "whitelist";

/// Redis backend. Hit counters are `HINCRBY`-ed inside `MULTI/EXEC`, so the
/// increment happens server side.
///
/// Layout:
/// * `monitoring:days` - set of days holding counters
/// * `monitoring:{day}:{granularity}` - hash, bucket field -> count
/// * `monitoring:{day}:ips` - set of ips seen that day
/// * `monitoring:{day}:ip:{ip}` - set of `{granularity}|{field}` the ip touched
/// * `ban:{ip}` - hash with `until` (epoch millis), `by`, `reason`; `bans` - set of ips
/// * `whitelist` - hash, ip -> description
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `redis_url`
    pub async fn connect(redis_url: &str) -> GuardResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn day_str(day: NaiveDate) -> String {
        day.format("%Y-%m-%d").to_string()
    }

    fn counter_key(day: &str, granularity: Granularity) -> String {
        format!("monitoring:{}:{}", day, granularity.as_str())
    }

    fn day_ips_key(day: &str) -> String {
        format!("monitoring:{}:ips", day)
    }

    fn ip_index_key(day: &str, ip: &str) -> String {
        format!("monitoring:{}:ip:{}", day, ip)
    }

    fn ban_key(ip: &str) -> String {
        format!("ban:{}", ip)
    }

    async fn days(&self) -> GuardResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let days: Vec<String> = conn.smembers(DAYS_KEY).await?;
        Ok(days)
    }

    /// Removes every key of one day and returns the number of counters dropped
    async fn drop_day(&self, day: &str) -> GuardResult<u64> {
        let mut conn = self.conn.clone();

        let mut removed = 0;
        for granularity in Granularity::ALL {
            let len: u64 = conn.hlen(Self::counter_key(day, granularity)).await?;
            removed += len;
        }

        let ips: Vec<String> = conn.smembers(Self::day_ips_key(day)).await?;
        let mut keys: Vec<String> = Granularity::ALL
            .iter()
            .map(|granularity| Self::counter_key(day, *granularity))
            .collect();
        keys.push(Self::day_ips_key(day));
        keys.extend(ips.iter().map(|ip| Self::ip_index_key(day, ip)));

        redis::pipe()
            .atomic()
            .del(keys)
            .ignore()
            .srem(DAYS_KEY, day)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(removed)
    }

    fn parse_ban(ip: &str, fields: HashMap<String, String>) -> GuardResult<BanEntry> {
        let field = |name: &str| {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| GuardError::Internal(format!("ban row for {} lacks {}", ip, name)))
        };

        let millis: i64 = field("until")?
            .parse()
            .map_err(|_| GuardError::Internal(format!("ban row for {} has a bad until", ip)))?;
        let until = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| GuardError::Internal(format!("ban row for {} has a bad until", ip)))?;
        let by_actor_id: i64 = field("by")?
            .parse()
            .map_err(|_| GuardError::Internal(format!("ban row for {} has a bad actor", ip)))?;

        Ok(BanEntry {
            ip: ip.to_string(),
            until,
            by_actor_id,
            reason: field("reason")?,
        })
    }
}

#[async_trait]
impl MonitoringStore for RedisStore {
    async fn increment(&self, buckets: &[HitBucket]) -> GuardResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        for bucket in buckets {
            let day = Self::day_str(bucket.day);
            let granularity = bucket.granularity();
            let field = bucket.field();

            pipe.hincr(Self::counter_key(&day, granularity), &field, 1)
                .ignore()
                .sadd(DAYS_KEY, &day)
                .ignore()
                .sadd(Self::day_ips_key(&day), &bucket.ip)
                .ignore()
                .sadd(
                    Self::ip_index_key(&day, &bucket.ip),
                    format!("{}|{}", granularity.as_str(), field),
                )
                .ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn ip_exists(&self, ip: &str) -> GuardResult<bool> {
        let mut conn = self.conn.clone();
        for day in self.days().await? {
            let exists: bool = conn.exists(Self::ip_index_key(&day, ip)).await?;
            if exists {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn day_counters(&self, day: NaiveDate, granularity: Granularity) -> GuardResult<Vec<HitRecord>> {
        let mut conn = self.conn.clone();
        let counters: HashMap<String, u64> = conn
            .hgetall(Self::counter_key(&Self::day_str(day), granularity))
            .await?;

        Ok(counters
            .into_iter()
            .filter_map(|(field, count)| {
                HitBucket::from_field(day, &field).map(|bucket| HitRecord { bucket, count })
            })
            .collect())
    }

    async fn delete_days_before(&self, day: NaiveDate) -> GuardResult<u64> {
        let mut removed = 0;
        for stored in self.days().await? {
            let older = match NaiveDate::parse_from_str(&stored, "%Y-%m-%d") {
                Ok(stored_day) => stored_day < day,
                Err(_) => {
                    tracing::warn!(day = %stored, event = "monitoring_gc_bad_day_key");
                    true
                }
            };
            if older {
                removed += self.drop_day(&stored).await?;
            }
        }
        Ok(removed)
    }

    async fn clear_hits(&self) -> GuardResult<u64> {
        let mut removed = 0;
        for day in self.days().await? {
            removed += self.drop_day(&day).await?;
        }
        Ok(removed)
    }

    async fn clear_hits_for_ip(&self, ip: &str) -> GuardResult<u64> {
        let mut conn = self.conn.clone();
        let mut removed = 0;

        for day in self.days().await? {
            let index_key = Self::ip_index_key(&day, ip);
            let touched: Vec<String> = conn.smembers(&index_key).await?;

            for entry in touched {
                let Some((granularity, field)) = entry.split_once('|') else {
                    continue;
                };
                let Some(granularity) = Granularity::parse(granularity) else {
                    continue;
                };
                let deleted: u64 = conn.hdel(Self::counter_key(&day, granularity), field).await?;
                removed += deleted;
            }

            redis::pipe()
                .atomic()
                .del(&index_key)
                .ignore()
                .srem(Self::day_ips_key(&day), ip)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        Ok(removed)
    }
}

#[async_trait]
impl BanStore for RedisStore {
    async fn upsert_ban(&self, entry: &BanEntry) -> GuardResult<bool> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(Self::ban_key(&entry.ip))
            .arg("until")
            .arg(entry.until.timestamp_millis())
            .arg("by")
            .arg(entry.by_actor_id)
            .arg("reason")
            .arg(&entry.reason)
            .sadd(BANS_KEY, &entry.ip)
            .ignore();

        // HSET reports how many fields were new; all three on a fresh row
        let (added,): (i64,) = pipe.query_async(&mut conn).await?;
        Ok(added > 0)
    }

    async fn delete_ban(&self, ip: &str) -> GuardResult<u64> {
        let mut conn = self.conn.clone();
        let (deleted,): (u64,) = redis::pipe()
            .atomic()
            .del(Self::ban_key(ip))
            .srem(BANS_KEY, ip)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(deleted)
    }

    async fn find_ban(&self, ip: &str) -> GuardResult<Option<BanEntry>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(Self::ban_key(ip)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Self::parse_ban(ip, fields).map(Some)
    }

    async fn all_bans(&self) -> GuardResult<Vec<BanEntry>> {
        let mut conn = self.conn.clone();
        let ips: Vec<String> = conn.smembers(BANS_KEY).await?;

        let mut bans = Vec::with_capacity(ips.len());
        for ip in ips {
            if let Some(ban) = self.find_ban(&ip).await? {
                bans.push(ban);
            }
        }
        Ok(bans)
    }

    async fn delete_bans_expired(&self, now: DateTime<Utc>) -> GuardResult<u64> {
        let mut removed = 0;
        for ban in self.all_bans().await? {
            if ban.until < now {
                removed += self.delete_ban(&ban.ip).await?;
            }
        }
        Ok(removed)
    }

    async fn clear_bans(&self) -> GuardResult<u64> {
        let mut conn = self.conn.clone();
        let ips: Vec<String> = conn.smembers(BANS_KEY).await?;
        if ips.is_empty() {
            return Ok(0);
        }

        let mut keys: Vec<String> = ips.iter().map(|ip| Self::ban_key(ip)).collect();
        keys.push(BANS_KEY.to_string());
        let deleted: u64 = conn.del(keys).await?;
        // The set key itself is not a ban row
        Ok(deleted.saturating_sub(1))
    }
}

#[async_trait]
impl WhitelistStore for RedisStore {
    async fn insert_whitelist(&self, entry: &WhitelistEntry) -> GuardResult<bool> {
        let mut conn = self.conn.clone();
        let inserted: bool = conn.hset_nx(WHITELIST_KEY, &entry.ip, &entry.description).await?;
        Ok(inserted)
    }

    async fn delete_whitelist(&self, ip: &str) -> GuardResult<u64> {
        let mut conn = self.conn.clone();
        let deleted: u64 = conn.hdel(WHITELIST_KEY, ip).await?;
        Ok(deleted)
    }

    async fn find_whitelist(&self, ip: &str) -> GuardResult<Option<WhitelistEntry>> {
        let mut conn = self.conn.clone();
        let description: Option<String> = conn.hget(WHITELIST_KEY, ip).await?;
        Ok(description.map(|description| WhitelistEntry {
            ip: ip.to_string(),
            description,
        }))
    }

    async fn all_whitelist(&self) -> GuardResult<Vec<WhitelistEntry>> {
        let mut conn = self.conn.clone();
        let entries: HashMap<String, String> = conn.hgetall(WHITELIST_KEY).await?;
        Ok(entries
            .into_iter()
            .map(|(ip, description)| WhitelistEntry { ip, description })
            .collect())
    }
}
