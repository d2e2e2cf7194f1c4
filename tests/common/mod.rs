#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use traffic_guard::core::StaticResolver;
use traffic_guard::store::MemoryStore;
use traffic_guard::TrafficService;

/// Generate a random IP address for testing
pub fn random_ip() -> String {
    format!(
        "{}.{}.{}.{}",
        rand::random::<u8>(),
        rand::random::<u8>(),
        rand::random::<u8>(),
        rand::random::<u8>()
    )
}

/// A service on a fresh in-memory store answering reverse lookups from `resolver`
pub fn service_with(resolver: StaticResolver) -> TrafficService {
    TrafficService::from_store(Arc::new(MemoryStore::new()), Arc::new(resolver))
}

pub fn service() -> TrafficService {
    service_with(StaticResolver::default())
}

/// A fixed instant of the current UTC day, so bucketing never depends on the wall clock minute
pub fn today_at(hour: u32, minute: u32) -> DateTime<Utc> {
    let naive = Utc::now().date_naive().and_hms_opt(hour, minute, 0).unwrap();
    Utc.from_utc_datetime(&naive)
}
