use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::SessionInfo;

/// In-memory mirror of the session held in the HTTP-only cookies
///
/// Read-only for everything except the session client, which replaces the
/// whole value on login and refresh and clears it on logout.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    current: Arc<RwLock<Option<SessionInfo>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<SessionInfo> {
        self.current.read().await.clone()
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current.read().await.as_ref().map(|s| s.expires_at)
    }

    pub(crate) async fn replace(&self, info: SessionInfo) {
        *self.current.write().await = Some(info);
    }

    pub(crate) async fn clear(&self) {
        *self.current.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_replace_and_clear() {
        let store = TokenStore::new();
        assert!(store.get().await.is_none());

        let expires_at = Utc::now() + Duration::minutes(15);
        store
            .replace(SessionInfo {
                user_id: 9,
                expires_at,
            })
            .await;
        assert_eq!(store.expires_at().await, Some(expires_at));

        // Clones share the same session
        let mirror = store.clone();
        mirror.clear().await;
        assert!(store.get().await.is_none());
    }
}
