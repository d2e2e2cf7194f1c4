//! Core functionality for the traffic guard.
//! This module contains the hit ledger, the ban and whitelist registries,
//! the crawler heuristic and the two batch engines built on them.

pub mod autoban;
pub mod autowhitelist;
pub mod ban_list;
pub mod crawler;
pub mod monitoring;
pub mod profile;
pub mod whitelist;

pub use autoban::{AutoBan, AutoBanReport, ProfileOutcome};
pub use autowhitelist::{AutoWhitelist, AutoWhitelistReport, AUTOWHITELIST_TOP_LIMIT};
pub use ban_list::{BanEntry, BanList, SYSTEM_ACTOR_ID};
pub use crawler::{
    CrawlerClassifier, CrawlerMatch, CrawlerMatcher, DnsResolver, GoogleBot, MsnBot,
    ReverseResolver, StaticResolver, YandexBot, YandexIpv6Bot,
};
pub use monitoring::{Monitoring, TopEntry, BAN_PROFILE_LIMIT};
pub use profile::{default_profiles, AutobanProfile, Grouping};
pub use whitelist::{Whitelist, WhitelistEntry};
