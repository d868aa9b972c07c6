use reqwest::StatusCode;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: String,
}

/// Articles of one folder, in the order the feed service returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArticleBatch {
    articles: Vec<Article>,
}

impl ArticleBatch {
    pub fn new(articles: Vec<Article>) -> Self {
        Self { articles }
    }

    pub fn len(&self) -> usize { self.articles.len() }
    pub fn articles(&self) -> &[Article] { &self.articles }
    pub fn articles_mut(&mut self) -> &mut [Article] { &mut self.articles }

    pub fn urls(&self) -> Vec<String> { self.articles.iter().map(|a| a.url.clone()).collect() }

    #[cfg(test)]
    pub fn titles(&self) -> Vec<String> { self.articles.iter().map(|a| a.title.clone()).collect() }
    #[cfg(test)]
    pub fn summaries(&self) -> Vec<String> { self.articles.iter().map(|a| a.summary.clone()).collect() }
    #[cfg(test)]
    pub fn contents(&self) -> Vec<String> { self.articles.iter().map(|a| a.content.clone()).collect() }

    /// Keep only the first `n` articles.
    pub fn truncate(&mut self, n: usize) {
        self.articles.truncate(n);
    }
}

/// Result of one listing call. `Empty` and `RequestFailed` are never merged.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Articles(ArticleBatch),
    Empty,
    RequestFailed { status: Option<StatusCode>, detail: String },
}

impl FetchOutcome {
    pub(crate) fn from_articles(articles: Vec<Article>) -> Self {
        if articles.is_empty() { FetchOutcome::Empty } else { FetchOutcome::Articles(ArticleBatch::new(articles)) }
    }

    pub(crate) fn failed(status: Option<StatusCode>, detail: impl Into<String>) -> Self {
        FetchOutcome::RequestFailed { status, detail: detail.into() }
    }
}

// Provider payload fragments shared by both services
#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct LinkRef {
    pub href: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct ContentRef {
    #[serde(default)]
    pub content: String,
}
