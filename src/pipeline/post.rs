use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use uuid::Uuid;

use super::{batch_or_outcome, resolve, ContentKind, FolderReport, GeneratedContent, Pipeline, RunOutcome};
use crate::config::AppConfig;
use crate::feeds::inoreader::DEFAULT_ARTICLE_COUNT;
use crate::feeds::{FetchBound, Source};
use crate::notify::Notifier;
use crate::prompt::{self, Template, BOARD_ADVISOR_ROLE, NO_TEXT_IMAGE_PROMPT};
use crate::store::{DocumentStore, NewPost, PgStore};
use crate::telemetry::{self, ctx::LogCtx, ops::post::{Phase, Post}};

pub fn template(source: Source) -> Template<'static> {
    match source {
        Source::Feedly => Template::FeedlyLinkedInPost,
        Source::Inoreader => Template::InoreaderLinkedInPost,
    }
}

/// A stored post built either from saved insights or from the latest
/// articles of the first Inoreader folder.
#[derive(Debug, Clone, Serialize)]
pub struct PostRequest {
    pub count: u32,
    pub insight_ids: Vec<Uuid>,
    pub role: Option<String>,
    pub prompt: Option<String>,
    pub image_prompt: Option<String>,
}

impl Default for PostRequest {
    fn default() -> Self {
        Self { count: DEFAULT_ARTICLE_COUNT, insight_ids: Vec::new(), role: None, prompt: None, image_prompt: None }
    }
}

#[derive(Args)]
pub struct PostCmd {
    #[arg(long)]
    pub user: String,
    /// Articles to read from the first Inoreader folder
    #[arg(long, default_value_t = DEFAULT_ARTICLE_COUNT)]
    pub count: u32,
    /// Build the post from these stored insights instead of fresh articles
    #[arg(long = "insight-id")]
    pub insight_ids: Vec<Uuid>,
    #[arg(long)]
    pub role: Option<String>,
    #[arg(long)]
    pub prompt: Option<String>,
    #[arg(long)]
    pub image_prompt: Option<String>,
}

pub async fn run_cmd(dsn: &str, args: PostCmd) -> Result<()> {
    let req = PostRequest {
        count: args.count,
        insight_ids: args.insight_ids,
        role: args.role,
        prompt: args.prompt,
        image_prompt: args.image_prompt,
    };
    let store = PgStore::connect(dsn).await?;
    let outcome = generate_for_user(&store, &args.user, &req, Pipeline::from_config).await?;
    if !telemetry::config::json_mode() {
        match &outcome {
            RunOutcome::Generated(content) => {
                println!("{}", content.text);
                if let Some(url) = &content.image_url {
                    println!("\nImage URL: {url}");
                }
            }
            other => println!("{}", other.sentinel()),
        }
    }
    Ok(())
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.trim().is_empty())
}

async fn image_for(p: &Pipeline, log: &LogCtx<Post>, prompt: &str) -> Option<String> {
    let _s = log.span(&Phase::GenerateImage).entered();
    match p.generate_image(prompt).await {
        Ok(url) => Some(url),
        Err(e) => {
            log.warn(format!("Image generation failed, continuing without one: {e:#}"));
            None
        }
    }
}

/// Menu options 2 and 4: a LinkedIn post plus image for every folder, one email each.
pub async fn email_post(p: &Pipeline, notifier: &Notifier, source: Source, bound: FetchBound) -> Result<Vec<FolderReport>> {
    let log = telemetry::post();
    let _g = log.root_span_kv([("source", source.label().to_string()), ("bound", format!("{bound:?}"))]).entered();
    let template = template(source);
    let role = template.role();

    let mut reports = Vec::new();
    for folder in p.folders(source)? {
        let _f = log.span_kv(&Phase::Folder, [("folder", folder.clone())]).entered();

        let fetched = {
            let _s = log.span(&Phase::Fetch).entered();
            p.fetch_batch(source, &folder, bound).await?
        };
        let mut batch = match batch_or_outcome(fetched) {
            Ok(b) => b,
            Err(outcome) => {
                log.folder_summary(&folder, 0, outcome.sentinel());
                reports.push(FolderReport { folder: Some(folder), articles: 0, outcome });
                continue;
            }
        };
        {
            let _s = log.span(&Phase::Extract).entered();
            p.enrich(source, &mut batch).await;
        }
        let prompt = {
            let _s = log.span(&Phase::Prompt).entered();
            p.fit_prompt(role, template, &mut batch)
        };
        let prompt = match prompt {
            Ok(prompt) => prompt,
            Err(e) => {
                let outcome = RunOutcome::from(e);
                log.folder_summary(&folder, batch.len(), outcome.sentinel());
                reports.push(FolderReport { folder: Some(folder), articles: batch.len(), outcome });
                continue;
            }
        };

        log.info(format!("Generating LinkedIn post from {} articles in folder: {folder}", source.label()));
        let post = {
            let _s = log.span(&Phase::CallLlm).entered();
            p.complete(role, &prompt).await?
        };
        let image = match template.image_prompt(&post) {
            Some(image_prompt) => image_for(p, &log, &image_prompt).await,
            None => None,
        };
        let urls = batch.urls();
        {
            let _s = log.span(&Phase::Notify).entered();
            let body = match &image {
                Some(url) => format!("{post}\n\nImage URL: {url}"),
                None => post.clone(),
            };
            let subject = format!("LinkedIn post from {} articles for folder {folder}", batch.len());
            notifier.send(&subject, &body, &urls).await;
        }

        let outcome = RunOutcome::Generated(GeneratedContent { kind: ContentKind::Post, text: post, urls, image_url: image, id: None });
        log.folder_summary(&folder, batch.len(), outcome.sentinel());
        reports.push(FolderReport { folder: Some(folder), articles: batch.len(), outcome });
    }

    if telemetry::config::json_mode() {
        log.result(&reports)?;
    }
    Ok(reports)
}

/// Generate, illustrate and store one post.
pub async fn generate_post(p: &Pipeline, store: &dyn DocumentStore, user_id: &str, req: &PostRequest) -> Result<RunOutcome> {
    let log = telemetry::post();
    let _g = log
        .root_span_kv([
            ("user_id", user_id.to_string()),
            ("insight_ids", req.insight_ids.len().to_string()),
            ("count", req.count.to_string()),
        ])
        .entered();

    let (role, prompt, urls) = if !req.insight_ids.is_empty() {
        let mut insights = Vec::new();
        let mut urls = Vec::new();
        {
            let _s = log.span(&Phase::LoadInsights).entered();
            for id in &req.insight_ids {
                match store.find_insight_by_id(*id).await.with_context(|| format!("load insight {id}"))? {
                    Some(found) => {
                        insights.push(found.insights);
                        urls.extend(found.urls);
                    }
                    None => log.warn(format!("Insight {id} not found")),
                }
            }
        }
        if insights.is_empty() {
            return finish(&log, RunOutcome::NoArticlesFound);
        }
        log.info("Generating LinkedIn post from insights");
        let role = non_empty(&req.role).unwrap_or(BOARD_ADVISOR_ROLE).to_string();
        let prompt = prompt::post_from_insights(non_empty(&req.prompt), &insights, &urls);
        if let Err(e) = p.check_prompt(&role, &prompt) {
            return finish(&log, e.into());
        }
        (role, prompt, urls)
    } else {
        let cfg = p.config().require_inoreader()?;
        let Some(folder) = cfg.folders.first() else {
            return finish(&log, RunOutcome::NoArticlesFound);
        };
        let _f = log.span_kv(&Phase::Folder, [("folder", folder.clone())]).entered();
        let fetched = {
            let _s = log.span(&Phase::Fetch).entered();
            p.fetch_batch(Source::Inoreader, folder, FetchBound::MaxCount(req.count)).await?
        };
        let mut batch = match batch_or_outcome(fetched) {
            Ok(b) => b,
            Err(outcome) => return finish(&log, outcome),
        };
        {
            let _s = log.span(&Phase::Extract).entered();
            p.enrich(Source::Inoreader, &mut batch).await;
        }
        let template = match non_empty(&req.prompt) {
            Some(preamble) => Template::CustomPost { preamble },
            None => Template::InoreaderLinkedInPost,
        };
        let role = non_empty(&req.role).unwrap_or(template.role()).to_string();
        log.info(format!("Generating LinkedIn post from Inoreader articles in folder: {folder}"));
        let fitted = {
            let _s = log.span(&Phase::Prompt).entered();
            p.fit_prompt(&role, template, &mut batch)
        };
        let prompt = match fitted {
            Ok(prompt) => prompt,
            Err(e) => return finish(&log, e.into()),
        };
        (role, prompt, batch.urls())
    };

    let post = {
        let _s = log.span(&Phase::CallLlm).entered();
        p.complete(&role, &prompt).await?
    };
    let image_prompt = match non_empty(&req.image_prompt) {
        Some(ip) => format!("{ip} {post}"),
        None => format!("{NO_TEXT_IMAGE_PROMPT}{post}"),
    };
    let image = image_for(p, &log, &image_prompt).await;

    let stored = {
        let _s = log.span(&Phase::Persist).entered();
        store
            .insert_post(NewPost {
                user_id,
                insight_ids: &req.insight_ids,
                post: &post,
                image: image.as_deref(),
                urls: &urls,
            })
            .await
    };
    let outcome = match stored {
        Ok(id) => RunOutcome::Generated(GeneratedContent {
            kind: ContentKind::Post,
            text: post,
            urls,
            image_url: image,
            id: Some(id),
        }),
        Err(e) => {
            log.error(format!("Could not store post: {e:#}"));
            RunOutcome::PostFailed
        }
    };
    finish(&log, outcome)
}

fn finish(log: &LogCtx<Post>, outcome: RunOutcome) -> Result<RunOutcome> {
    log.info_kv("post finished", [("outcome", outcome.sentinel().to_string())]);
    if telemetry::config::json_mode() {
        log.result(&outcome)?;
    }
    Ok(outcome)
}

/// Stored-post entry point: the user's document config drives the run.
pub async fn generate_for_user<F>(store: &dyn DocumentStore, user_id: &str, req: &PostRequest, build: F) -> Result<RunOutcome>
where
    F: FnOnce(AppConfig) -> Result<Pipeline>,
{
    let log = telemetry::post();
    let pipeline = {
        let _s = log.span_kv(&Phase::LoadConfig, [("user_id", user_id.to_string())]).entered();
        resolve(Some(user_id), Some(store), build).await?
    };
    match pipeline {
        Some(p) => generate_post(&p, store, user_id, req).await,
        None => {
            log.warn(format!("No config found for user {user_id}"));
            finish(&log, RunOutcome::NoConfigFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::openai::MockClient;
    use crate::notify::tests::RecordingTransport;
    use crate::pipeline::tests::{document_for, mount_uk_tech, test_pipeline, uk_tech_extractor};
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use wiremock::MockServer;

    const UK_URLS: [&str; 3] = ["https://uk.example/a", "https://uk.example/b", "https://uk.example/c"];

    async fn setup(server: &MockServer) -> (MemoryStore, Arc<MockClient>) {
        let store = MemoryStore::new();
        store.put_config("u1", document_for(server)).await;
        (store, Arc::new(MockClient::new()))
    }

    #[tokio::test]
    async fn post_from_articles_is_stored_with_their_urls() {
        let server = MockServer::start().await;
        mount_uk_tech(&server).await;
        let (store, llm) = setup(&server).await;
        llm.push_text("the post");
        llm.push_image(Ok("https://img.example/1.png".into()));
        let req = PostRequest {
            role: Some("You are an editor.".into()),
            prompt: Some("Write about these:".into()),
            image_prompt: Some("Illustrate:".into()),
            ..Default::default()
        };

        let outcome = generate_for_user(&store, "u1", &req, |cfg| test_pipeline(cfg, llm.clone(), uk_tech_extractor(), 100_000))
            .await
            .unwrap();

        let RunOutcome::Generated(content) = outcome else { panic!("expected a post") };
        assert_eq!(content.urls, UK_URLS);
        assert_eq!(content.image_url.as_deref(), Some("https://img.example/1.png"));

        let call = &llm.calls()[0];
        assert_eq!(call.messages[0].content, "You are an editor.");
        assert!(call.messages[1].content.starts_with("Write about these:\nURL: https://uk.example/a\n"));
        assert_eq!(llm.image_calls()[0].prompt, "Illustrate: the post");

        let posts = store.posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].urls, UK_URLS);
        assert_eq!(posts[0].image.as_deref(), Some("https://img.example/1.png"));
        assert!(posts[0].insight_ids.is_empty());
    }

    #[tokio::test]
    async fn post_from_stored_insights() {
        let server = MockServer::start().await;
        let (store, llm) = setup(&server).await;
        let first = store.insert_insights("u1", "insight one", &["https://a/1".into()]).await.unwrap();
        let second = store.insert_insights("u1", "insight two", &["https://a/2".into()]).await.unwrap();
        llm.push_text("post from insights");
        llm.push_image(Ok("https://img.example/2.png".into()));
        let req = PostRequest { insight_ids: vec![first, second], ..Default::default() };

        let outcome = generate_for_user(&store, "u1", &req, |cfg| test_pipeline(cfg, llm.clone(), uk_tech_extractor(), 100_000))
            .await
            .unwrap();

        let RunOutcome::Generated(content) = outcome else { panic!("expected a post") };
        assert_eq!(content.urls, vec!["https://a/1", "https://a/2"]);
        let call = &llm.calls()[0];
        assert_eq!(call.messages[0].content, BOARD_ADVISOR_ROLE);
        assert!(call.messages[1].content.contains("insight one\n\ninsight two"));
        assert!(llm.image_calls()[0].prompt.ends_with("no text on it: \npost from insights"));
        assert_eq!(store.posts().await[0].insight_ids, vec![first, second]);
    }

    #[tokio::test]
    async fn unknown_insights_are_no_articles_found() {
        let server = MockServer::start().await;
        let (store, llm) = setup(&server).await;
        let req = PostRequest { insight_ids: vec![Uuid::new_v4()], ..Default::default() };
        let outcome = generate_for_user(&store, "u1", &req, |cfg| test_pipeline(cfg, llm.clone(), uk_tech_extractor(), 100_000))
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::NoArticlesFound);
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_post_failed() {
        let server = MockServer::start().await;
        mount_uk_tech(&server).await;
        let (store, llm) = setup(&server).await;
        store.fail_writes(true);
        llm.push_text("the post");
        llm.push_image(Ok("https://img.example/3.png".into()));
        let outcome = generate_for_user(&store, "u1", &PostRequest::default(), |cfg| {
            test_pipeline(cfg, llm.clone(), uk_tech_extractor(), 100_000)
        })
        .await
        .unwrap();
        assert_eq!(outcome.sentinel(), "post-failed");
    }

    #[tokio::test]
    async fn emailed_post_carries_image_url() {
        let server = MockServer::start().await;
        mount_uk_tech(&server).await;
        let cfg = AppConfig::from_document("u1", document_for(&server)).unwrap();
        let llm = Arc::new(MockClient::new());
        llm.push_text("advisor post");
        llm.push_image(Ok("https://img.example/4.png".into()));
        let p = test_pipeline(cfg, llm.clone(), uk_tech_extractor(), 100_000).unwrap();
        let rec = Arc::new(RecordingTransport::default());
        let notifier = Notifier::new(Box::new(rec.clone()), "bot@example.com", "me@example.com");

        let reports = email_post(&p, &notifier, Source::Inoreader, FetchBound::MaxCount(3)).await.unwrap();
        assert_eq!(reports.len(), 1);
        let sent = rec.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "LinkedIn post from 3 articles for folder user/-/label/uk-tech");
        assert!(sent[0].body.ends_with("advisor post\n\nImage URL: https://img.example/4.png"));
        assert!(sent[0].body.starts_with("https://uk.example/a\nhttps://uk.example/b\nhttps://uk.example/c\n\n"));
        assert_eq!(llm.calls()[0].messages[0].content, Template::InoreaderLinkedInPost.role());
    }
}
