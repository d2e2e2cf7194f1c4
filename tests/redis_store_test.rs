//! Runs against a local Redis: `cargo test -- --ignored`.
//! Tests that clear whole tables each own a database index.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use redis::AsyncCommands;
use traffic_guard::core::{AutobanProfile, BanList, Grouping, Monitoring, StaticResolver};
use traffic_guard::store::{BanEntry, BanStore, MonitoringStore, RedisStore};
use traffic_guard::TrafficService;

const REDIS_URL: &str = "redis://localhost:6379";

async fn store(db: u8) -> Arc<RedisStore> {
    let store = RedisStore::connect(&format!("{}/{}", REDIS_URL, db)).await.unwrap();
    store.clear_hits().await.unwrap();
    store.clear_bans().await.unwrap();
    Arc::new(store)
}

async fn service() -> TrafficService {
    let store = RedisStore::connect(REDIS_URL).await.unwrap();
    TrafficService::from_store(Arc::new(store), Arc::new(StaticResolver::default()))
}

#[tokio::test]
#[ignore]
async fn counters_survive_the_round_trip() {
    let service = service().await;
    let ip = common::random_ip();

    for _ in 0..3 {
        service.monitoring().add(&ip, common::today_at(12, 0)).await.unwrap();
    }
    assert!(service.monitoring().exists_ip(&ip).await.unwrap());

    let profile = AutobanProfile {
        name: "redis",
        threshold: 2,
        grouping: Grouping::DAY,
        ban_duration: Duration::minutes(5),
        reason: "redis",
    };
    let offenders = service.monitoring().list_by_ban_profile(&profile).await.unwrap();
    assert!(offenders.contains(&ip));

    service.monitoring().clear_ip(&ip).await.unwrap();
    assert!(!service.monitoring().exists_ip(&ip).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn gc_drops_previous_days_once() {
    let monitoring = Monitoring::new(store(1).await);
    let today = common::today_at(12, 0);

    monitoring.add("192.0.2.50", today - Duration::days(1)).await.unwrap();
    monitoring.add("192.0.2.50", today - Duration::days(3)).await.unwrap();
    monitoring.add("192.0.2.51", today).await.unwrap();

    assert_eq!(monitoring.gc().await.unwrap(), 8);
    assert_eq!(monitoring.gc().await.unwrap(), 0);

    assert!(!monitoring.exists_ip("192.0.2.50").await.unwrap());
    assert!(monitoring.exists_ip("192.0.2.51").await.unwrap());
}

#[tokio::test]
#[ignore]
async fn gc_drops_unreadable_day_keys() {
    let store = store(2).await;
    let mut conn = redis::Client::open(format!("{}/2", REDIS_URL))
        .unwrap()
        .get_async_connection()
        .await
        .unwrap();
    let _: () = conn.sadd("monitoring:days", "not-a-day").await.unwrap();

    let monitoring = Monitoring::new(store);
    monitoring.add("192.0.2.52", common::today_at(12, 0)).await.unwrap();

    assert_eq!(monitoring.gc().await.unwrap(), 0);
    let days: Vec<String> = conn.smembers("monitoring:days").await.unwrap();
    assert_eq!(days, vec![common::today_at(12, 0).format("%Y-%m-%d").to_string()]);
    assert!(monitoring.exists_ip("192.0.2.52").await.unwrap());
}

#[tokio::test]
#[ignore]
async fn clear_counts_every_counter() {
    let monitoring = Monitoring::new(store(3).await);
    let today = common::today_at(12, 0);

    monitoring.add("192.0.2.53", today).await.unwrap();
    monitoring.add("192.0.2.54", today - Duration::days(1)).await.unwrap();

    assert_eq!(monitoring.clear().await.unwrap(), 8);
    assert_eq!(monitoring.clear().await.unwrap(), 0);
    assert!(!monitoring.exists_ip("192.0.2.53").await.unwrap());
    assert!(!monitoring.exists_ip("192.0.2.54").await.unwrap());
}

#[tokio::test]
#[ignore]
async fn clear_ip_spans_every_day() {
    let monitoring = Monitoring::new(store(4).await);
    let today = common::today_at(12, 0);

    monitoring.add("192.0.2.55", today).await.unwrap();
    monitoring.add("192.0.2.55", today - Duration::days(2)).await.unwrap();
    monitoring.add("192.0.2.56", today).await.unwrap();

    assert_eq!(monitoring.clear_ip("192.0.2.55").await.unwrap(), 8);
    assert!(!monitoring.exists_ip("192.0.2.55").await.unwrap());
    assert!(monitoring.exists_ip("192.0.2.56").await.unwrap());

    let top = monitoring.list_of_top(10).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].ip, "192.0.2.56");
}

#[tokio::test]
#[ignore]
async fn upsert_tells_fresh_rows_from_updates() {
    let store = store(5).await;
    let first = BanEntry {
        ip: "192.0.2.57".to_string(),
        until: Utc::now() + Duration::hours(1),
        by_actor_id: 1,
        reason: "first".to_string(),
    };
    let second = BanEntry {
        by_actor_id: 2,
        reason: "second".to_string(),
        ..first.clone()
    };

    assert!(store.upsert_ban(&first).await.unwrap());
    assert!(!store.upsert_ban(&second).await.unwrap());

    let found = store.find_ban("192.0.2.57").await.unwrap().unwrap();
    assert_eq!(found.by_actor_id, 2);
    assert_eq!(found.reason, "second");
    assert_eq!(found.until.timestamp_millis(), second.until.timestamp_millis());
}

#[tokio::test]
#[ignore]
async fn expired_bans_are_collected_and_clear_counts_rows() {
    let bans = BanList::new(store(6).await);

    bans.add("192.0.2.58", Duration::seconds(-1), 1, "old").await.unwrap();
    bans.add("192.0.2.59", Duration::hours(1), 1, "new").await.unwrap();
    assert!(!bans.exists("192.0.2.58").await.unwrap());

    assert_eq!(bans.gc().await.unwrap(), 1);
    assert_eq!(bans.gc().await.unwrap(), 0);
    assert!(bans.exists("192.0.2.59").await.unwrap());

    assert_eq!(bans.clear().await.unwrap(), 1);
    assert_eq!(bans.clear().await.unwrap(), 0);
    assert!(!bans.exists("192.0.2.59").await.unwrap());
}

#[tokio::test]
#[ignore]
async fn bans_and_whitelist_round_trip() {
    let service = service().await;
    let ip = common::random_ip();

    service
        .add_to_blacklist(&ip, Duration::minutes(5), 3, "redis test")
        .await
        .unwrap();
    let ban = service.get_ban(&ip).await.unwrap().unwrap();
    assert_eq!(ban.by_actor_id, 3);
    assert_eq!(ban.reason, "redis test");
    service.remove_from_blacklist(&ip).await.unwrap();
    assert!(service.get_ban(&ip).await.unwrap().is_none());

    assert!(service.add_whitelist(&ip, "first").await.unwrap());
    assert!(!service.add_whitelist(&ip, "second").await.unwrap());
    assert_eq!(service.whitelist().get(&ip).await.unwrap().unwrap().description, "first");
    service.remove_whitelist(&ip).await.unwrap();
    assert!(!service.whitelist().exists(&ip).await.unwrap());
}
