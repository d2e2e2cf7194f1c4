use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::store::BanStore;
use crate::utils::{log_ban_issued, GuardError, GuardResult};

pub use crate::store::BanEntry;

/// Actor id recorded on bans issued by the autoban engine
pub const SYSTEM_ACTOR_ID: i64 = 0;

/// Banned ips with expiry, reason and the actor who banned them
pub struct BanList {
    store: Arc<dyn BanStore>,
}

impl BanList {
    /// Create a new ban list on top of `store`
    pub fn new(store: Arc<dyn BanStore>) -> Self {
        Self { store }
    }

    /// Ban `ip` for `duration` from now. An existing ban is overwritten, not extended.
    /// A duration whose expiry cannot be represented is rejected.
    pub async fn add(&self, ip: &str, duration: Duration, actor_id: i64, reason: &str) -> GuardResult<()> {
        let until = Utc::now()
            .checked_add_signed(duration)
            .ok_or_else(|| GuardError::InvalidRequest(format!("ban period out of range for {}", ip)))?;

        let entry = BanEntry {
            ip: ip.to_string(),
            until,
            by_actor_id: actor_id,
            reason: reason.trim().to_string(),
        };

        let fresh = self.store.upsert_ban(&entry).await?;
        log_ban_issued(ip, &entry.until, &entry.reason, fresh);
        Ok(())
    }

    /// Remove the ban on `ip`, if any
    pub async fn remove(&self, ip: &str) -> GuardResult<()> {
        let removed = self.store.delete_ban(ip).await?;
        if removed > 0 {
            tracing::info!(ip = %ip, event = "ban_removed");
        }
        Ok(())
    }

    /// Whether `ip` is banned right now. Expired rows count as absent.
    pub async fn exists(&self, ip: &str) -> GuardResult<bool> {
        Ok(self.get(ip).await?.is_some())
    }

    /// The active ban on `ip`, or `None` when missing or expired
    pub async fn get(&self, ip: &str) -> GuardResult<Option<BanEntry>> {
        let now = Utc::now();
        Ok(self.store.find_ban(ip).await?.filter(|ban| ban.is_active(now)))
    }

    /// Every active ban
    pub async fn list(&self) -> GuardResult<Vec<BanEntry>> {
        let now = Utc::now();
        let mut bans: Vec<BanEntry> = self
            .store
            .all_bans()
            .await?
            .into_iter()
            .filter(|ban| ban.is_active(now))
            .collect();
        bans.sort_by(|a, b| a.ip.cmp(&b.ip));
        Ok(bans)
    }

    /// Physically delete expired bans
    pub async fn gc(&self) -> GuardResult<u64> {
        let removed = self.store.delete_bans_expired(Utc::now()).await?;
        tracing::debug!(removed = %removed, event = "ban_gc");
        Ok(removed)
    }

    pub async fn clear(&self) -> GuardResult<u64> {
        self.store.clear_bans().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ban_list() -> BanList {
        BanList::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn reason_is_trimmed() {
        let bans = ban_list();
        bans.add("198.51.100.1", Duration::hours(1), 7, "  flood \n").await.unwrap();

        let ban = bans.get("198.51.100.1").await.unwrap().unwrap();
        assert_eq!(ban.reason, "flood");
        assert_eq!(ban.by_actor_id, 7);
    }

    #[tokio::test]
    async fn expired_ban_is_absent_before_gc() {
        let bans = ban_list();
        bans.add("198.51.100.2", Duration::seconds(-1), SYSTEM_ACTOR_ID, "old").await.unwrap();

        assert!(!bans.exists("198.51.100.2").await.unwrap());
        assert!(bans.get("198.51.100.2").await.unwrap().is_none());
        assert!(bans.list().await.unwrap().is_empty());

        assert_eq!(bans.gc().await.unwrap(), 1);
        assert_eq!(bans.gc().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unrepresentable_expiry_is_rejected() {
        let bans = ban_list();
        let result = bans.add("198.51.100.4", Duration::days(400_000_000), 1, "forever").await;

        assert!(matches!(result, Err(GuardError::InvalidRequest(_))));
        assert!(!bans.exists("198.51.100.4").await.unwrap());
    }

    #[tokio::test]
    async fn removing_unknown_ip_is_fine() {
        let bans = ban_list();
        bans.remove("198.51.100.3").await.unwrap();
        assert_eq!(bans.clear().await.unwrap(), 0);
    }
}
