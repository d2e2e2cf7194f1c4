use std::sync::Arc;

use crate::core::crawler::{CrawlerClassifier, CrawlerMatch};
use crate::store::WhitelistStore;
use crate::utils::GuardResult;

pub use crate::store::WhitelistEntry;

/// Ips exempt from autoban, plus the crawler heuristic that feeds them
pub struct Whitelist {
    store: Arc<dyn WhitelistStore>,
    classifier: CrawlerClassifier,
}

impl Whitelist {
    pub fn new(store: Arc<dyn WhitelistStore>, classifier: CrawlerClassifier) -> Self {
        Self { store, classifier }
    }

    /// Whitelist `ip`. Returns `false`, leaving the stored description alone,
    /// when the ip is already present.
    pub async fn add(&self, ip: &str, description: &str) -> GuardResult<bool> {
        let entry = WhitelistEntry {
            ip: ip.to_string(),
            description: description.to_string(),
        };

        let inserted = self.store.insert_whitelist(&entry).await?;
        if inserted {
            tracing::info!(ip = %ip, description = %description, event = "whitelist_added");
        } else {
            tracing::info!(ip = %ip, event = "whitelist_already_present");
        }
        Ok(inserted)
    }

    pub async fn remove(&self, ip: &str) -> GuardResult<()> {
        self.store.delete_whitelist(ip).await?;
        Ok(())
    }

    pub async fn exists(&self, ip: &str) -> GuardResult<bool> {
        Ok(self.store.find_whitelist(ip).await?.is_some())
    }

    pub async fn get(&self, ip: &str) -> GuardResult<Option<WhitelistEntry>> {
        self.store.find_whitelist(ip).await
    }

    /// All entries, in no particular order
    pub async fn list(&self) -> GuardResult<Vec<WhitelistEntry>> {
        self.store.all_whitelist().await
    }

    /// Run the crawler heuristic on `ip`. Lookup failures are a miss.
    pub async fn match_auto(&self, ip: &str) -> Option<CrawlerMatch> {
        self.classifier.classify(ip).await
    }
}
