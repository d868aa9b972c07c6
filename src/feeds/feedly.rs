use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::types::{Article, ContentRef, FetchOutcome, LinkRef};

pub const DEFAULT_API_URL: &str = "https://cloud.feedly.com";
/// Upper bound on ids requested per folder.
pub const PAGE_SIZE: u32 = 20;

#[derive(Clone, Debug)]
pub struct FeedlyClient {
    http: Client,
    api_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct StreamIds {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    #[serde(default)]
    alternate: Vec<LinkRef>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<ContentRef>,
    #[serde(default)]
    full_content: Option<String>,
}

impl Entry {
    fn into_article(self) -> Article {
        Article {
            url: self.alternate.into_iter().next().map(|l| l.href).unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            summary: self.summary.map(|s| s.content).unwrap_or_default(),
            content: self.full_content.unwrap_or_default(),
        }
    }
}

impl FeedlyClient {
    pub fn new(http: Client, api_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self { http, api_url: api_url.into(), access_token: access_token.into() }
    }

    fn auth_header(&self) -> String {
        format!("OAuth {}", self.access_token)
    }

    fn base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// Articles of `folder_id` published within the last `days` days, capped at [`PAGE_SIZE`].
    pub async fn fetch_articles(&self, folder_id: &str, days: u32) -> FetchOutcome {
        let Some(since) = Duration::try_days(days.into()).and_then(|d| Utc::now().checked_sub_signed(d)) else {
            return request_failed(None, format!("lookback of {days} days is out of range"));
        };
        let newer_than = since.timestamp_millis();
        info!("Getting Feedly articles for folder: {folder_id}");

        let ids_url = format!("{}/v3/streams/ids", self.base());
        let resp = self
            .http
            .get(&ids_url)
            .header("authorization", self.auth_header())
            .query(&[
                ("streamId", folder_id.to_string()),
                ("newerThan", newer_than.to_string()),
                ("count", PAGE_SIZE.to_string()),
            ])
            .send()
            .await;
        let resp = match resp {
            Ok(r) => r,
            Err(e) => return request_failed(None, format!("stream ids request failed: {e}")),
        };
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return request_failed(Some(status), body);
        }
        let ids = match resp.json::<StreamIds>().await {
            Ok(s) => s.ids,
            Err(e) => return request_failed(Some(status), format!("decode stream ids: {e}")),
        };
        info!("Retrieved {} article ids.", ids.len());

        if ids.is_empty() {
            info!("There are no Feedly articles to analyse for folder {folder_id}.");
            return FetchOutcome::Empty;
        }

        let entries_url = format!("{}/v3/entries/.mget", self.base());
        let resp = self
            .http
            .post(&entries_url)
            .header("authorization", self.auth_header())
            .json(&ids)
            .send()
            .await;
        let resp = match resp {
            Ok(r) => r,
            Err(e) => return request_failed(None, format!("entries request failed: {e}")),
        };
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return request_failed(Some(status), body);
        }
        let entries = match resp.json::<Vec<Entry>>().await {
            Ok(e) => e,
            Err(e) => return request_failed(Some(status), format!("decode entries: {e}")),
        };

        let articles: Vec<Article> = entries.into_iter().map(Entry::into_article).collect();
        if articles.is_empty() {
            info!("There are no Feedly articles to analyse for folder {folder_id}.");
        }
        FetchOutcome::from_articles(articles)
    }
}

fn request_failed(status: Option<reqwest::StatusCode>, detail: String) -> FetchOutcome {
    match status {
        Some(s) => warn!("Could not get Feedly articles with status code: {s}. Details: {detail}"),
        None => warn!("Could not get Feedly articles: {detail}"),
    }
    FetchOutcome::failed(status, detail)
}
