use anyhow::Result;
use clap::{Args, Subcommand};

use super::{batch_or_outcome, resolve, ContentKind, FolderReport, GeneratedContent, Pipeline, RunOutcome};
use crate::config::AppConfig;
use crate::feeds::inoreader::DEFAULT_ARTICLE_COUNT;
use crate::feeds::{FetchBound, Source};
use crate::notify::Notifier;
use crate::prompt::Template;
use crate::store::{DocumentStore, PgStore};
use crate::telemetry::{self, ops::insights::Phase};

#[derive(Args)]
pub struct InsightsCmd {
    #[command(subcommand)]
    pub source: InsightsSource,
}

#[derive(Subcommand)]
pub enum InsightsSource {
    /// Articles from every Feedly folder within a lookback window
    Feedly {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 1)]
        days: u32,
    },
    /// The latest articles of every Inoreader folder
    Inoreader {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = DEFAULT_ARTICLE_COUNT)]
        count: u32,
    },
}

pub async fn run_cmd(dsn: &str, args: InsightsCmd) -> Result<()> {
    let (user, source, bound) = match args.source {
        InsightsSource::Feedly { user, days } => (user, Source::Feedly, FetchBound::LookbackDays(days)),
        InsightsSource::Inoreader { user, count } => (user, Source::Inoreader, FetchBound::MaxCount(count)),
    };
    let store = PgStore::connect(dsn).await?;
    let reports = generate_for_user(&store, &user, source, bound, Pipeline::from_config).await?;
    if !telemetry::config::json_mode() {
        for r in &reports {
            if let RunOutcome::Generated(content) = &r.outcome {
                println!("{}\n\n{}\n", content.text, content.urls.join("\n"));
            }
        }
    }
    Ok(())
}

pub fn template(source: Source) -> Template<'static> {
    match source {
        Source::Feedly => Template::FeedlyInsights,
        Source::Inoreader => Template::InoreaderInsights,
    }
}

/// Where the insights of one run end up.
#[derive(Clone, Copy)]
enum Sink<'a> {
    Email(&'a Notifier),
    Store { store: &'a dyn DocumentStore, user_id: &'a str },
}

/// Menu options 1 and 3: insights for every folder, one email each.
pub async fn email_insights(p: &Pipeline, notifier: &Notifier, source: Source, bound: FetchBound) -> Result<Vec<FolderReport>> {
    run(p, Sink::Email(notifier), source, bound).await
}

/// Insights for every folder, each stored as its own document.
pub async fn generate_insights(
    p: &Pipeline,
    store: &dyn DocumentStore,
    user_id: &str,
    source: Source,
    bound: FetchBound,
) -> Result<Vec<FolderReport>> {
    run(p, Sink::Store { store, user_id }, source, bound).await
}

/// Stored-insights entry point: the user's document config drives the run.
pub async fn generate_for_user<F>(
    store: &dyn DocumentStore,
    user_id: &str,
    source: Source,
    bound: FetchBound,
    build: F,
) -> Result<Vec<FolderReport>>
where
    F: FnOnce(AppConfig) -> Result<Pipeline>,
{
    let log = telemetry::insights();
    let pipeline = {
        let _s = log.span_kv(&Phase::LoadConfig, [("user_id", user_id.to_string())]).entered();
        resolve(Some(user_id), Some(store), build).await?
    };
    match pipeline {
        Some(p) => generate_insights(&p, store, user_id, source, bound).await,
        None => {
            log.warn(format!("No config found for user {user_id}"));
            Ok(FolderReport::no_config())
        }
    }
}

async fn run(p: &Pipeline, sink: Sink<'_>, source: Source, bound: FetchBound) -> Result<Vec<FolderReport>> {
    let log = telemetry::insights();
    let mode = match sink {
        Sink::Email(_) => "email",
        Sink::Store { .. } => "store",
    };
    let _g = log
        .root_span_kv([("source", source.label().to_string()), ("sink", mode.to_string()), ("bound", format!("{bound:?}"))])
        .entered();
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
            let _s = log.span_kv(&Phase::Extract, [("articles", batch.len().to_string())]).entered();
            p.enrich(source, &mut batch).await;
        }
        let prompt = {
            let _s = log.span(&Phase::Prompt).entered();
            p.fit_prompt(role, template, &mut batch)
        };
        let prompt = match prompt {
            Ok(prompt) => prompt,
            Err(e) => {
                log.warn_kv("prompt over budget", [("folder", folder.clone()), ("tokens", e.tokens.to_string())]);
                let outcome = RunOutcome::from(e);
                log.folder_summary(&folder, batch.len(), outcome.sentinel());
                reports.push(FolderReport { folder: Some(folder), articles: batch.len(), outcome });
                continue;
            }
        };

        log.info(format!("Generating insights from articles in {} folder: {folder}", source.label()));
        let text = {
            let _s = log.span(&Phase::CallLlm).entered();
            p.complete(role, &prompt).await?
        };
        let urls = batch.urls();

        let outcome = match sink {
            Sink::Email(notifier) => {
                let _s = log.span(&Phase::Notify).entered();
                let subject = format!("{} Insights from {} articles for folder {folder}", source.label(), batch.len());
                notifier.send(&subject, &text, &urls).await;
                RunOutcome::Generated(GeneratedContent { kind: ContentKind::Insight, text, urls, image_url: None, id: None })
            }
            Sink::Store { store, user_id } => {
                let _s = log.span(&Phase::Persist).entered();
                match store.insert_insights(user_id, &text, &urls).await {
                    Ok(id) => RunOutcome::Generated(GeneratedContent {
                        kind: ContentKind::Insight,
                        text,
                        urls,
                        image_url: None,
                        id: Some(id),
                    }),
                    Err(e) => {
                        log.error(format!("Could not store insights for folder {folder}: {e:#}"));
                        RunOutcome::InsightsFailed
                    }
                }
            }
        };
        log.folder_summary(&folder, batch.len(), outcome.sentinel());
        reports.push(FolderReport { folder: Some(folder), articles: batch.len(), outcome });
    }

    if telemetry::config::json_mode() {
        log.result(&reports)?;
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_document;
    use crate::llm::openai::MockClient;
    use crate::notify::tests::RecordingTransport;
    use crate::pipeline::tests::{document_for, mount_uk_tech, test_pipeline, uk_tech_extractor, UK_TECH};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UK_URLS: [&str; 3] = ["https://uk.example/a", "https://uk.example/b", "https://uk.example/c"];

    #[tokio::test]
    async fn uk_tech_insights_are_stored_with_prompt_urls() {
        let server = MockServer::start().await;
        mount_uk_tech(&server).await;
        let store = MemoryStore::new();
        store.put_config("u1", document_for(&server)).await;
        let llm = Arc::new(MockClient::new());
        llm.push_text("three insights");

        let reports = generate_for_user(&store, "u1", Source::Inoreader, FetchBound::MaxCount(3), |cfg| {
            test_pipeline(cfg, llm.clone(), uk_tech_extractor(), 100_000)
        })
        .await
        .unwrap();

        assert_eq!(reports.len(), 1);
        let RunOutcome::Generated(content) = &reports[0].outcome else {
            panic!("expected generated content, got {:?}", reports[0].outcome);
        };
        assert_eq!(content.urls, UK_URLS);
        assert_eq!(content.text, "three insights");

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].messages[0].content, Template::InoreaderInsights.role());
        let prompt = &calls[0].messages[1].content;
        let blocks: Vec<usize> = [("a", "A", "x"), ("b", "B", "y"), ("c", "C", "z")]
            .iter()
            .map(|(u, t, c)| {
                let block = format!("\nURL: https://uk.example/{u}\nTitle: {t}\nSummary: s{u}\nContent: {c}\n");
                prompt.find(&block).unwrap()
            })
            .collect();
        assert!(blocks[0] < blocks[1] && blocks[1] < blocks[2]);

        let stored = store.insights().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].urls, UK_URLS);
        assert_eq!(stored[0].user_id, "u1");
        assert_eq!(Some(stored[0].insight_id), content.id);
    }

    #[tokio::test]
    async fn store_failure_is_insights_failed() {
        let server = MockServer::start().await;
        mount_uk_tech(&server).await;
        let store = MemoryStore::new();
        store.put_config("u1", document_for(&server)).await;
        store.fail_writes(true);
        let llm = Arc::new(MockClient::new());
        llm.push_text("insights");

        let reports = generate_for_user(&store, "u1", Source::Inoreader, FetchBound::MaxCount(3), |cfg| {
            test_pipeline(cfg, llm.clone(), uk_tech_extractor(), 100_000)
        })
        .await
        .unwrap();
        assert_eq!(reports[0].outcome, RunOutcome::InsightsFailed);
        assert_eq!(reports[0].outcome.sentinel(), "insights-failed");
    }

    #[tokio::test]
    async fn unknown_user_is_no_config_found() {
        let store = MemoryStore::new();
        let reports = generate_for_user(&store, "ghost", Source::Feedly, FetchBound::LookbackDays(1), |_| {
            panic!("no pipeline without a config")
        })
        .await
        .unwrap();
        assert_eq!(reports, FolderReport::no_config());
    }

    #[tokio::test]
    async fn feedly_folders_are_all_emailed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/streams/ids"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": ["e1"]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/entries/.mget"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"alternate": [{"href": "https://f.example/1"}], "title": "One"}
            ])))
            .expect(2)
            .mount(&server)
            .await;
        let mut doc = sample_document();
        doc["feedly"]["apiUrl"] = json!(server.uri());
        let cfg = AppConfig::from_document("u1", doc).unwrap();
        let llm = Arc::new(MockClient::new());
        llm.push_text("ai insights");
        llm.push_text("ml insights");
        let p = test_pipeline(cfg, llm, uk_tech_extractor(), 100_000).unwrap();
        let rec = Arc::new(RecordingTransport::default());
        let notifier = Notifier::new(Box::new(rec.clone()), "bot@example.com", "me@example.com");

        let reports = email_insights(&p, &notifier, Source::Feedly, FetchBound::LookbackDays(1)).await.unwrap();
        assert_eq!(reports.len(), 2);
        let sent = rec.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "Feedly Insights from 1 articles for folder user/u1/category/ai");
        assert_eq!(sent[1].body, "https://f.example/1\n\nml insights");
    }

    #[tokio::test]
    async fn empty_folder_sends_nothing() {
        let server = MockServer::start().await;
        crate::feeds::inoreader::tests::mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(format!("/reader/api/0/stream/contents/{UK_TECH}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;
        let cfg = AppConfig::from_document("u1", document_for(&server)).unwrap();
        let llm = Arc::new(MockClient::new());
        let p = test_pipeline(cfg, llm.clone(), uk_tech_extractor(), 100_000).unwrap();
        let rec = Arc::new(RecordingTransport::default());
        let notifier = Notifier::new(Box::new(rec.clone()), "bot@example.com", "me@example.com");

        let reports = email_insights(&p, &notifier, Source::Inoreader, FetchBound::MaxCount(3)).await.unwrap();
        assert_eq!(reports[0].outcome, RunOutcome::NoArticlesFound);
        assert!(rec.sent.lock().unwrap().is_empty());
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_entries_fetch_skips_llm_and_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/streams/ids"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": ["e1"]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/entries/.mget"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
            .expect(2)
            .mount(&server)
            .await;
        let cfg = AppConfig::from_document("u1", document_for(&server)).unwrap();
        let llm = Arc::new(MockClient::new());
        let p = test_pipeline(cfg, llm.clone(), uk_tech_extractor(), 100_000).unwrap();
        let rec = Arc::new(RecordingTransport::default());
        let notifier = Notifier::new(Box::new(rec.clone()), "bot@example.com", "me@example.com");

        let reports = email_insights(&p, &notifier, Source::Feedly, FetchBound::LookbackDays(1)).await.unwrap();
        assert_eq!(reports.len(), 2);
        for r in &reports {
            assert_eq!(r.outcome, RunOutcome::FetchFailed { detail: "backend down".into() });
            assert_eq!(r.outcome.sentinel(), "fetch-failed");
        }
        assert!(rec.sent.lock().unwrap().is_empty());
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_stream_fetch_stores_nothing() {
        let server = MockServer::start().await;
        crate::feeds::inoreader::tests::mount_login(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(format!("/reader/api/0/stream/contents/{UK_TECH}")))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;
        let store = MemoryStore::new();
        store.put_config("u1", document_for(&server)).await;
        let llm = Arc::new(MockClient::new());

        let reports = generate_for_user(&store, "u1", Source::Inoreader, FetchBound::MaxCount(3), |cfg| {
            test_pipeline(cfg, llm.clone(), uk_tech_extractor(), 100_000)
        })
        .await
        .unwrap();
        assert!(matches!(reports[0].outcome, RunOutcome::FetchFailed { .. }));
        assert_eq!(reports[0].articles, 0);
        assert!(store.insights().await.is_empty());
        assert!(llm.calls().is_empty());
    }
}
