use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::{ClientBuilder, Locator};
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const CONSENT_ACCEPT_XPATH: &str = "//button[contains(@aria-label, 'Accept all')]";

#[async_trait]
pub trait Browser: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    async fn click(&self, xpath: &str) -> Result<()>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Headless Chrome driven over WebDriver (chromedriver by default).
pub struct WebDriverBrowser {
    webdriver_url: String,
}

impl WebDriverBrowser {
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        Self { webdriver_url: webdriver_url.into() }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("WEBDRIVER_URL").unwrap_or_else(|_| DEFAULT_WEBDRIVER_URL.to_string()))
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        let mut caps = serde_json::Map::new();
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": ["--headless"] }));
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&self.webdriver_url)
            .await
            .with_context(|| format!("start webdriver session at {}", self.webdriver_url))?;
        Ok(Box::new(WebDriverSession { client }))
    }
}

struct WebDriverSession {
    client: fantoccini::Client,
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<()> {
        self.client.goto(url).await.with_context(|| format!("navigate to {url}"))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await.context("read current url")?.to_string())
    }

    async fn click(&self, xpath: &str) -> Result<()> {
        let el = self.client.find(Locator::XPath(xpath)).await.with_context(|| format!("find {xpath}"))?;
        el.click().await.context("click")?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client.close().await.context("close webdriver session")
    }
}

fn consent_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"consent\.google\.com").expect("static regex"))
}

pub fn is_consent_page(url: &str) -> bool {
    consent_pattern().is_match(url)
}

/// Follow `url` through redirects and the consent interstitial, returning the
/// address the page finally settled on. The session is always closed.
pub async fn resolve_final_url(browser: &dyn Browser, url: &str, settle: Duration) -> Result<String> {
    let session = browser.open().await?;
    let resolved = drive(session.as_ref(), url, settle).await;
    if let Err(e) = session.close().await {
        debug!("browser close failed: {e:#}");
    }
    resolved
}

async fn drive(session: &dyn BrowserSession, url: &str, settle: Duration) -> Result<String> {
    session.goto(url).await?;
    if is_consent_page(&session.current_url().await?) {
        info!("Accepting consent for {url}");
        session.click(CONSENT_ACCEPT_XPATH).await?;
    }
    tokio::time::sleep(settle).await;
    session.current_url().await
}
