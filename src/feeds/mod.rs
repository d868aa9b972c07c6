pub mod feedly;
pub mod inoreader;
pub mod types;

pub use feedly::FeedlyClient;
pub use inoreader::{InoreaderClient, InoreaderCredentials};
pub use types::{Article, ArticleBatch, FetchOutcome};

use serde::Serialize;

/// Feed service a folder belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Feedly,
    Inoreader,
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Source::Feedly => "Feedly",
            Source::Inoreader => "Inoreader",
        }
    }
}

/// How many articles a single folder fetch may return.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FetchBound {
    /// Feedly: articles newer than now minus this many days.
    LookbackDays(u32),
    /// Inoreader: at most this many of the latest articles.
    MaxCount(u32),
}
