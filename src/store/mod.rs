use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredInsight {
    pub insight_id: Uuid,
    pub user_id: String,
    pub insights: String,
    pub urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPost {
    pub post_id: Uuid,
    pub user_id: String,
    pub insight_ids: Vec<Uuid>,
    pub post: String,
    pub image: Option<String>,
    pub urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub user_id: &'a str,
    pub insight_ids: &'a [Uuid],
    pub post: &'a str,
    pub image: Option<&'a str>,
    pub urls: &'a [String],
}

/// Per-user documents: run configuration, generated insights and posts.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_config_for_user(&self, user_id: &str) -> Result<Option<Value>>;
    async fn insert_insights(&self, user_id: &str, insights: &str, urls: &[String]) -> Result<Uuid>;
    async fn find_insight_by_id(&self, insight_id: Uuid) -> Result<Option<StoredInsight>>;
    async fn insert_post(&self, post: NewPost<'_>) -> Result<Uuid>;
}
