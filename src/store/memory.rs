use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentStore, NewPost, StoredInsight, StoredPost};

/// In-process store used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    configs: RwLock<HashMap<String, Value>>,
    insights: RwLock<Vec<StoredInsight>>,
    posts: RwLock<Vec<StoredPost>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_config(&self, user_id: &str, doc: Value) {
        self.configs.write().await.insert(user_id.to_string(), doc);
    }

    /// Make every subsequent insert fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn insights(&self) -> Vec<StoredInsight> {
        self.insights.read().await.clone()
    }

    pub async fn posts(&self) -> Vec<StoredPost> {
        self.posts.read().await.clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory store is read-only");
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_config_for_user(&self, user_id: &str) -> Result<Option<Value>> {
        Ok(self.configs.read().await.get(user_id).cloned())
    }

    async fn insert_insights(&self, user_id: &str, insights: &str, urls: &[String]) -> Result<Uuid> {
        self.check_writable()?;
        let insight_id = Uuid::new_v4();
        self.insights.write().await.push(StoredInsight {
            insight_id,
            user_id: user_id.to_string(),
            insights: insights.to_string(),
            urls: urls.to_vec(),
            created_at: Utc::now(),
        });
        Ok(insight_id)
    }

    async fn find_insight_by_id(&self, insight_id: Uuid) -> Result<Option<StoredInsight>> {
        Ok(self.insights.read().await.iter().find(|i| i.insight_id == insight_id).cloned())
    }

    async fn insert_post(&self, post: NewPost<'_>) -> Result<Uuid> {
        self.check_writable()?;
        let post_id = Uuid::new_v4();
        self.posts.write().await.push(StoredPost {
            post_id,
            user_id: post.user_id.to_string(),
            insight_ids: post.insight_ids.to_vec(),
            post: post.post.to_string(),
            image: post.image.map(str::to_string),
            urls: post.urls.to_vec(),
            created_at: Utc::now(),
        });
        Ok(post_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inserted_insight_can_be_found_by_id() {
        let store = MemoryStore::new();
        let urls = vec!["https://a.example/1".to_string()];
        let id = store.insert_insights("u1", "text", &urls).await.unwrap();
        let found = store.find_insight_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.urls, urls);
        assert_eq!(found.user_id, "u1");
        assert!(store.find_insight_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_store_rejects_writes() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        assert!(store.insert_insights("u1", "text", &[]).await.is_err());
        assert!(store.insights().await.is_empty());
    }
}
