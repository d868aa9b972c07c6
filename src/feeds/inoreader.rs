use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{info, warn};

use super::types::{Article, ContentRef, FetchOutcome, LinkRef};

pub const DEFAULT_API_URL: &str = "https://www.inoreader.com/reader/api/0";
pub const DEFAULT_LOGIN_URL: &str = "https://www.inoreader.com/accounts/ClientLogin";
pub const DEFAULT_ARTICLE_COUNT: u32 = 3;

#[derive(Clone, Debug)]
pub struct InoreaderCredentials {
    pub app_id: String,
    pub app_key: String,
    pub client_email: String,
    pub client_password: String,
}

#[derive(Clone, Debug)]
pub struct InoreaderClient {
    http: Client,
    api_url: String,
    login_url: String,
    creds: InoreaderCredentials,
}

#[derive(Debug, Deserialize)]
struct StreamContents {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    canonical: Vec<LinkRef>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<ContentRef>,
}

impl Item {
    // content is left empty; the extractor fills it from the page itself
    fn into_article(self) -> Article {
        Article {
            url: self.canonical.into_iter().next().map(|l| l.href).unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            summary: self.summary.map(|s| s.content).unwrap_or_default(),
            content: String::new(),
        }
    }
}

fn auth_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Auth=([^;\n]+)").expect("static regex"))
}

/// Pull the `Auth=` token out of a ClientLogin response body.
pub fn parse_auth_token(body: &str) -> Option<String> {
    auth_pattern()
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

impl InoreaderClient {
    pub fn new(
        http: Client,
        api_url: impl Into<String>,
        login_url: impl Into<String>,
        creds: InoreaderCredentials,
    ) -> Self {
        Self { http, api_url: api_url.into(), login_url: login_url.into(), creds }
    }

    /// Exchange the account credentials for a short-lived auth token.
    pub async fn client_login(&self) -> Result<String> {
        let resp = self
            .http
            .post(&self.login_url)
            .form(&[
                ("Email", self.creds.client_email.as_str()),
                ("Passwd", self.creds.client_password.as_str()),
            ])
            .send()
            .await
            .context("inoreader client login request")?;
        let status = resp.status();
        let body = resp.text().await.context("read client login body")?;
        if !status.is_success() {
            bail!("inoreader client login failed with status {status}");
        }
        parse_auth_token(&body).ok_or_else(|| anyhow!("no Auth token in client login response"))
    }

    /// Latest `count` articles of `folder_id`. Logs in again before every listing.
    pub async fn fetch_articles(&self, folder_id: &str, count: u32) -> FetchOutcome {
        info!("Getting Inoreader articles for folder: {folder_id}");

        let token = match self.client_login().await {
            Ok(t) => t,
            Err(e) => return request_failed(None, format!("{e:#}")),
        };

        let url = format!("{}/stream/contents/{}", self.api_url.trim_end_matches('/'), folder_id);
        let resp = self
            .http
            .get(&url)
            .query(&[("n", count.to_string())])
            .header("Authorization", format!("GoogleLogin auth={token}"))
            .header("AppId", self.creds.app_id.as_str())
            .header("AppKey", self.creds.app_key.as_str())
            .send()
            .await;
        let resp = match resp {
            Ok(r) => r,
            Err(e) => return request_failed(None, format!("stream contents request failed: {e}")),
        };
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return request_failed(Some(status), body);
        }
        let items = match resp.json::<StreamContents>().await {
            Ok(s) => s.items,
            Err(e) => return request_failed(Some(status), format!("decode stream contents: {e}")),
        };
        info!("Retrieved {} articles.", items.len());
        if items.is_empty() {
            info!("There are no articles to analyse for Inoreader folder {folder_id}.");
        }

        FetchOutcome::from_articles(items.into_iter().map(Item::into_article).collect())
    }
}

fn request_failed(status: Option<reqwest::StatusCode>, detail: String) -> FetchOutcome {
    match status {
        Some(s) => warn!("Could not get Inoreader articles with status code: {s}. Details: {detail}"),
        None => warn!("Could not get Inoreader articles: {detail}"),
    }
    FetchOutcome::failed(status, detail)
}
