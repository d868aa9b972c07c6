pub mod browser;
pub mod text;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{info, warn};

use crate::feeds::ArticleBatch;
use browser::{resolve_final_url, Browser};

pub const SETTLE_PAUSE: Duration = Duration::from_secs(2);

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Page text of `url`, or `""` when it cannot be read.
    async fn extract(&self, url: &str) -> String;
}

pub struct BrowserExtractor {
    browser: Box<dyn Browser>,
    http: Client,
    settle: Duration,
}

impl BrowserExtractor {
    pub fn new(browser: Box<dyn Browser>, http: Client) -> Self {
        Self { browser, http, settle: SETTLE_PAUSE }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

#[async_trait]
impl ContentExtractor for BrowserExtractor {
    async fn extract(&self, url: &str) -> String {
        let target = match resolve_final_url(self.browser.as_ref(), url, self.settle).await {
            Ok(u) => u,
            Err(e) => {
                warn!("browser could not resolve {url}, reading it directly: {e:#}");
                url.to_string()
            }
        };
        fetch_page_text(&self.http, &target).await
    }
}

pub async fn fetch_page_text(http: &Client, url: &str) -> String {
    let resp = match http.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("fetch {url} failed: {e}");
            return String::new();
        }
    };
    if resp.status() != StatusCode::OK {
        warn!("fetch {url} returned {}", resp.status());
        return String::new();
    }
    match resp.text().await {
        Ok(html) => text::html_to_text(&html),
        Err(e) => {
            warn!("read body of {url} failed: {e}");
            String::new()
        }
    }
}

/// Overwrite each article's content with the text behind its URL, in order.
pub async fn enrich(batch: &mut ArticleBatch, extractor: &dyn ContentExtractor) {
    let total = batch.len();
    for (i, article) in batch.articles_mut().iter_mut().enumerate() {
        info!("Extracting content {}/{}: {}", i + 1, total, article.url);
        article.content = extractor.extract(&article.url).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::feeds::Article;
    use browser::tests::StubBrowser;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Returns canned text per URL and remembers the order it was asked in.
    #[derive(Default)]
    pub(crate) struct StubExtractor {
        pub(crate) pages: HashMap<String, String>,
        pub(crate) seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContentExtractor for StubExtractor {
        async fn extract(&self, url: &str) -> String {
            self.seen.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().unwrap_or_default()
        }
    }

    async fn page_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><script>x()</script><p>Story body</p></body></html>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<p>Not found</p>"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn text_comes_from_the_final_url() {
        let server = page_server().await;
        let browser = StubBrowser {
            landing: Some("https://consent.google.com/m".into()),
            after_click: Some(format!("{}/story", server.uri())),
            ..Default::default()
        };
        let ex = BrowserExtractor::new(Box::new(browser), Client::new()).with_settle(Duration::ZERO);
        assert_eq!(ex.extract("https://news.google.com/rss/articles/1").await, "Story body");
    }

    #[tokio::test]
    async fn non_200_is_empty() {
        let server = page_server().await;
        let ex = BrowserExtractor::new(Box::new(StubBrowser::default()), Client::new()).with_settle(Duration::ZERO);
        assert_eq!(ex.extract(&format!("{}/gone", server.uri())).await, "");
    }

    #[tokio::test]
    async fn browser_failure_falls_back_to_original_url() {
        let server = page_server().await;
        let browser = StubBrowser { fail_open: true, ..Default::default() };
        let ex = BrowserExtractor::new(Box::new(browser), Client::new()).with_settle(Duration::ZERO);
        assert_eq!(ex.extract(&format!("{}/story", server.uri())).await, "Story body");
    }

    #[tokio::test]
    async fn enrich_fills_content_in_order() {
        let mut batch = ArticleBatch::new(
            ["a", "b"]
                .iter()
                .map(|k| Article {
                    url: format!("https://n/{k}"),
                    title: k.to_string(),
                    summary: String::new(),
                    content: String::new(),
                })
                .collect(),
        );
        let ex = StubExtractor {
            pages: HashMap::from([("https://n/a".to_string(), "x".to_string()), ("https://n/b".to_string(), "y".to_string())]),
            ..Default::default()
        };
        enrich(&mut batch, &ex).await;
        assert_eq!(batch.contents(), vec!["x", "y"]);
        assert_eq!(*ex.seen.lock().unwrap(), vec!["https://n/a", "https://n/b"]);
    }
}
