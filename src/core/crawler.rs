//! Reverse-DNS heuristic for well-known search engine crawlers.
//!
//! An address is reverse resolved and each returned hostname is compared
//! against the name the crawler operator publishes for that very address.
//! A header can claim to be Googlebot; only Google can publish
//! `crawl-66-249-66-1.googlebot.com.` for 66.249.66.1.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;

use crate::utils::{log_autowhitelist_match, GuardError, GuardResult};

/// Source of PTR names for an address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReverseResolver: Send + Sync {
    async fn reverse(&self, ip: IpAddr) -> GuardResult<Vec<String>>;
}

/// Reverse resolver backed by the system's DNS configuration
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl DnsResolver {
    pub fn from_system_conf() -> GuardResult<Self> {
        let resolver = TokioResolver::builder_tokio()?.build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl ReverseResolver for DnsResolver {
    async fn reverse(&self, ip: IpAddr) -> GuardResult<Vec<String>> {
        let lookup = self.resolver.reverse_lookup(ip).await?;
        Ok(lookup.iter().map(|name| name.to_string()).collect())
    }
}

/// Fixed address -> hostnames table. Unknown addresses fail like an NXDOMAIN.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    names: HashMap<IpAddr, Vec<String>>,
}

impl StaticResolver {
    /// Register `hostnames` for `ip`. Unparseable addresses are ignored.
    pub fn with(mut self, ip: &str, hostnames: &[&str]) -> Self {
        if let Ok(ip) = ip.parse() {
            self.names
                .insert(ip, hostnames.iter().map(|name| name.to_string()).collect());
        }
        self
    }
}

#[async_trait]
impl ReverseResolver for StaticResolver {
    async fn reverse(&self, ip: IpAddr) -> GuardResult<Vec<String>> {
        self.names
            .get(&ip)
            .cloned()
            .ok_or_else(|| GuardError::Dns(format!("no PTR record for {}", ip)))
    }
}

/// One crawler vendor's naming rule
pub trait CrawlerMatcher: Send + Sync {
    /// Whitelist description recorded on a match
    fn description(&self) -> &str;

    /// The hostname this vendor publishes for `ip`, if it covers that address family
    fn expected_hostname(&self, ip: &IpAddr) -> Option<String>;

    fn matches(&self, ip: &IpAddr, hostname: &str) -> bool {
        self.expected_hostname(ip)
            .map_or(false, |expected| expected.eq_ignore_ascii_case(hostname))
    }
}

/// The address with every `.` replaced by `-`
fn dashed(ip: &IpAddr) -> String {
    ip.to_string().replace('.', "-")
}

pub struct MsnBot;

impl CrawlerMatcher for MsnBot {
    fn description(&self) -> &str {
        "msnbot autodetect"
    }

    fn expected_hostname(&self, ip: &IpAddr) -> Option<String> {
        Some(format!("msnbot-{}.search.msn.com.", dashed(ip)))
    }
}

pub struct YandexBot;

impl CrawlerMatcher for YandexBot {
    fn description(&self) -> &str {
        "yandex.com autodetect"
    }

    fn expected_hostname(&self, ip: &IpAddr) -> Option<String> {
        Some(format!("{}.spider.yandex.com.", dashed(ip)))
    }
}

pub struct GoogleBot;

impl CrawlerMatcher for GoogleBot {
    fn description(&self) -> &str {
        "googlebot autodetect"
    }

    fn expected_hostname(&self, ip: &IpAddr) -> Option<String> {
        Some(format!("crawl-{}.googlebot.com.", dashed(ip)))
    }
}

/// Yandex names its IPv6 crawlers after the last four address bytes
pub struct YandexIpv6Bot;

impl CrawlerMatcher for YandexIpv6Bot {
    fn description(&self) -> &str {
        "yandex.com ipv6 autodetect"
    }

    fn expected_hostname(&self, ip: &IpAddr) -> Option<String> {
        match ip {
            IpAddr::V4(_) => None,
            IpAddr::V6(v6) => {
                let b = v6.octets();
                Some(format!(
                    "{:02x}{:02x}-{:02x}{:02x}.spider.yandex.com.",
                    b[12], b[13], b[14], b[15]
                ))
            }
        }
    }
}

/// Result of a positive classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerMatch {
    pub hostname: String,
    pub description: String,
}

/// Runs reverse DNS and tries each matcher, in registration order, on each hostname
pub struct CrawlerClassifier {
    resolver: Arc<dyn ReverseResolver>,
    matchers: Vec<Box<dyn CrawlerMatcher>>,
}

impl CrawlerClassifier {
    /// A classifier with no matchers; it never matches until some are added
    pub fn new(resolver: Arc<dyn ReverseResolver>) -> Self {
        Self {
            resolver,
            matchers: Vec::new(),
        }
    }

    /// msnbot, yandex, googlebot and yandex IPv6, in that order
    pub fn with_default_matchers(resolver: Arc<dyn ReverseResolver>) -> Self {
        Self::new(resolver)
            .with_matcher(MsnBot)
            .with_matcher(YandexBot)
            .with_matcher(GoogleBot)
            .with_matcher(YandexIpv6Bot)
    }

    pub fn with_matcher(mut self, matcher: impl CrawlerMatcher + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    /// First matching hostname/matcher pair for `ip`. Bad addresses and
    /// failed lookups are a miss: missing reverse DNS is routine.
    pub async fn classify(&self, ip: &str) -> Option<CrawlerMatch> {
        let addr: IpAddr = match ip.parse::<IpAddr>() {
            Ok(addr) => addr.to_canonical(),
            Err(_) => {
                tracing::debug!(ip = %ip, event = "crawler_check_bad_ip");
                return None;
            }
        };

        let hostnames = match self.resolver.reverse(addr).await {
            Ok(hostnames) => hostnames,
            Err(e) => {
                tracing::debug!(ip = %ip, error = %e, event = "crawler_check_no_ptr");
                return None;
            }
        };

        for hostname in hostnames {
            let hostname = if hostname.ends_with('.') {
                hostname
            } else {
                format!("{}.", hostname)
            };

            for matcher in &self.matchers {
                if matcher.matches(&addr, &hostname) {
                    log_autowhitelist_match(ip, &hostname, matcher.description());
                    return Some(CrawlerMatch {
                        hostname,
                        description: matcher.description().to_string(),
                    });
                }
            }
        }

        None
    }
}
