pub mod insights;
pub mod post;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

use crate::config::{self, AppConfig};
use crate::extractor::browser::WebDriverBrowser;
use crate::extractor::{self, BrowserExtractor, ContentExtractor};
use crate::feeds::{ArticleBatch, FeedlyClient, FetchBound, FetchOutcome, InoreaderClient, InoreaderCredentials, Source};
use crate::llm::budget::{BudgetExceeded, TokenBudget};
use crate::llm::{ChatCompletionRequest, ImageRequest, LlmClient, OpenAiClient, OpenAiClientConfig};
use crate::prompt::Template;
use crate::store::DocumentStore;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Service clients for one run, built together from a complete config.
pub struct Clients {
    pub http: Client,
    pub feedly: Option<FeedlyClient>,
    pub inoreader: Option<InoreaderClient>,
    pub llm: Arc<dyn LlmClient>,
}

impl Clients {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build().context("build http client")?;
        let feedly = cfg.feedly.as_ref().map(|f| FeedlyClient::new(http.clone(), &f.api_url, &f.access_token));
        let inoreader = cfg.inoreader.as_ref().map(|i| {
            InoreaderClient::new(
                http.clone(),
                &i.api_url,
                &i.login_url,
                InoreaderCredentials {
                    app_id: i.app_id.clone(),
                    app_key: i.app_key.clone(),
                    client_email: i.client_email.clone(),
                    client_password: i.client_password.clone(),
                },
            )
        });
        let llm = OpenAiClient::new(OpenAiClientConfig::from_env(cfg.openai_api_key.clone()))
            .context("build OpenAI client")?;
        Ok(Self { http, feedly, inoreader, llm: Arc::new(llm) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Insight,
    Post,
}

/// Text produced for one folder together with the URLs it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedContent {
    pub kind: ContentKind,
    pub text: String,
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RunOutcome {
    Generated(GeneratedContent),
    NoConfigFound,
    NoArticlesFound,
    FetchFailed { detail: String },
    PromptTooLarge { tokens: usize, limit: usize },
    InsightsFailed,
    PostFailed,
}

impl RunOutcome {
    pub fn sentinel(&self) -> &'static str {
        match self {
            RunOutcome::Generated(_) => "generated",
            RunOutcome::NoConfigFound => "no-config-found",
            RunOutcome::NoArticlesFound => "no-articles-found",
            RunOutcome::FetchFailed { .. } => "fetch-failed",
            RunOutcome::PromptTooLarge { .. } => "prompt-too-large",
            RunOutcome::InsightsFailed => "insights-failed",
            RunOutcome::PostFailed => "post-failed",
        }
    }
}

impl From<BudgetExceeded> for RunOutcome {
    fn from(e: BudgetExceeded) -> Self {
        RunOutcome::PromptTooLarge { tokens: e.tokens, limit: e.limit }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderReport {
    /// `None` when the run stopped before reaching any folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub articles: usize,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

impl FolderReport {
    pub fn no_config() -> Vec<FolderReport> {
        vec![FolderReport { folder: None, articles: 0, outcome: RunOutcome::NoConfigFound }]
    }
}

/// The batch of a successful fetch, or the outcome that ends the folder.
pub(crate) fn batch_or_outcome(outcome: FetchOutcome) -> Result<ArticleBatch, RunOutcome> {
    match outcome {
        FetchOutcome::Articles(b) => Ok(b),
        FetchOutcome::Empty => Err(RunOutcome::NoArticlesFound),
        FetchOutcome::RequestFailed { detail, .. } => Err(RunOutcome::FetchFailed { detail }),
    }
}

pub struct Pipeline {
    config: AppConfig,
    clients: Clients,
    extractor: Arc<dyn ContentExtractor>,
    // Loaded on first prompt; the tokenizer download is skipped by runs that never build one
    budget: OnceLock<TokenBudget>,
}

impl Pipeline {
    pub fn new(config: AppConfig, clients: Clients, extractor: Arc<dyn ContentExtractor>, budget: TokenBudget) -> Self {
        Self { config, clients, extractor, budget: OnceLock::from(budget) }
    }

    /// Production wiring: OpenAI, WebDriver extractor, budget from the environment.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let clients = Clients::from_config(&config)?;
        let extractor = BrowserExtractor::new(Box::new(WebDriverBrowser::from_env()), clients.http.clone());
        Ok(Self { config, clients, extractor: Arc::new(extractor), budget: OnceLock::new() })
    }

    fn budget(&self) -> &TokenBudget {
        self.budget.get_or_init(TokenBudget::from_env)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn folders(&self, source: Source) -> Result<Vec<String>> {
        Ok(match source {
            Source::Feedly => self.config.require_feedly()?.folders.clone(),
            Source::Inoreader => self.config.require_inoreader()?.folders.clone(),
        })
    }

    fn inoreader(&self) -> Result<&InoreaderClient> {
        match &self.clients.inoreader {
            Some(c) => Ok(c),
            None => bail!("Inoreader client is not configured"),
        }
    }

    /// One listing call for `folder`.
    pub async fn fetch_batch(&self, source: Source, folder: &str, bound: FetchBound) -> Result<FetchOutcome> {
        Ok(match (source, bound) {
            (Source::Feedly, FetchBound::LookbackDays(days)) => match &self.clients.feedly {
                Some(c) => c.fetch_articles(folder, days).await,
                None => bail!("Feedly client is not configured"),
            },
            (Source::Inoreader, FetchBound::MaxCount(count)) => self.inoreader()?.fetch_articles(folder, count).await,
            (s, b) => bail!("{} folders cannot be fetched with {b:?}", s.label()),
        })
    }

    /// Inoreader listings carry no body; read it from each article's page.
    pub async fn enrich(&self, source: Source, batch: &mut ArticleBatch) {
        if source == Source::Inoreader {
            extractor::enrich(batch, self.extractor.as_ref()).await;
        }
    }

    /// Render `template` over the batch within the token budget. Articles the
    /// budget drops are removed from the batch too.
    pub fn fit_prompt(&self, role: &str, template: Template<'_>, batch: &mut ArticleBatch) -> Result<String, BudgetExceeded> {
        let fitted = {
            let articles = batch.articles();
            self.budget().fit(role, articles.len(), |k| template.render(&articles[..k]))?
        };
        batch.truncate(fitted.kept);
        Ok(fitted.prompt)
    }

    pub fn check_prompt(&self, role: &str, prompt: &str) -> Result<(), BudgetExceeded> {
        self.budget().fit(role, 0, |_| prompt.to_string()).map(|_| ())
    }

    pub async fn complete(&self, role: &str, prompt: &str) -> Result<String> {
        let resp = self
            .clients
            .llm
            .chat_completion(ChatCompletionRequest::role_and_prompt(role, prompt))
            .await
            .context("chat completion")?;
        if let Some(total) = resp.total_tokens {
            tracing::debug!(total_tokens = total, "completion usage");
        }
        Ok(resp.content)
    }

    pub async fn generate_image(&self, prompt: &str) -> Result<String> {
        tracing::info!("Connecting to OpenAI to generate an image...");
        self.clients
            .llm
            .generate_image(ImageRequest::new(prompt))
            .await
            .context("image generation")
    }

    /// Menu option 5: a bare ClientLogin round trip.
    pub async fn test_login(&self) -> Result<String> {
        self.inoreader()?.client_login().await
    }
}

/// Resolve the run's config and build its pipeline. `Ok(None)` when the user
/// has no config document.
pub async fn resolve<F>(user_id: Option<&str>, store: Option<&dyn DocumentStore>, build: F) -> Result<Option<Pipeline>>
where
    F: FnOnce(AppConfig) -> Result<Pipeline>,
{
    match config::load(user_id, store).await? {
        Some(cfg) => build(cfg).map(Some),
        None => Ok(None),
    }
}
