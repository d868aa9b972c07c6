use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

use super::{DocumentStore, NewPost, StoredInsight};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(dsn)
            .await
            .context("connect to document store")?;
        Ok(Self { pool })
    }

    // Apply any pending migrations (idempotent)
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await.context("apply migrations")?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find_config_for_user(&self, user_id: &str) -> Result<Option<Value>> {
        let row = sqlx::query(
            r#"
            SELECT config
            FROM insights.user_config
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(r) => Some(r.try_get::<Json<Value>, _>("config")?.0),
            None => None,
        })
    }

    async fn insert_insights(&self, user_id: &str, insights: &str, urls: &[String]) -> Result<Uuid> {
        let insight_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO insights.insight (insight_id, user_id, insights, urls, created_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(insight_id)
        .bind(user_id)
        .bind(insights)
        .bind(Json(urls))
        .execute(&self.pool)
        .await?;
        Ok(insight_id)
    }

    async fn find_insight_by_id(&self, insight_id: Uuid) -> Result<Option<StoredInsight>> {
        let row = sqlx::query(
            r#"
            SELECT insight_id, user_id, insights, urls, created_at
            FROM insights.insight
            WHERE insight_id = $1
            "#,
        )
        .bind(insight_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else { return Ok(None) };
        Ok(Some(StoredInsight {
            insight_id: r.try_get("insight_id")?,
            user_id: r.try_get("user_id")?,
            insights: r.try_get("insights")?,
            urls: r.try_get::<Json<Vec<String>>, _>("urls")?.0,
            created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        }))
    }

    async fn insert_post(&self, post: NewPost<'_>) -> Result<Uuid> {
        let post_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO insights.post (post_id, user_id, insight_ids, post, image, urls, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            "#,
        )
        .bind(post_id)
        .bind(post.user_id)
        .bind(Json(post.insight_ids))
        .bind(post.post)
        .bind(post.image)
        .bind(Json(post.urls))
        .execute(&self.pool)
        .await?;
        Ok(post_id)
    }
}
