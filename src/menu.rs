use anyhow::Result;
use serde::Serialize;
use std::io::{self, BufRead, Write};

use crate::feeds::inoreader::DEFAULT_ARTICLE_COUNT;
use crate::feeds::{FetchBound, Source};
use crate::notify::Notifier;
use crate::pipeline::{self, insights, post, FolderReport, Pipeline};
use crate::store::{DocumentStore, PgStore};
use crate::telemetry::ctx::OpMarker;
use crate::telemetry::ops::{insights::Insights, login::Login, post::Post};
use crate::telemetry::{self, ops::login::Phase as LoginPhase};

pub const OPTIONS: [&str; 5] = [
    "Generate Feedly Insights",
    "Create Feedly LinkedIn post",
    "Generate Inoreader Insights",
    "Create Inoreader LinkedIn post",
    "Test Inoreader Client Login",
];

const FEEDLY_INSIGHTS_DAYS: u32 = 1;
const FEEDLY_POST_DAYS: u32 = 2;

/// Operation name an option reports under.
fn op_for(option: u8) -> &'static str {
    match option {
        1 | 3 => Insights::NAME,
        2 | 4 => Post::NAME,
        _ => Login::NAME,
    }
}

pub fn parse_choice(input: &str) -> Option<u8> {
    input.trim().parse::<u8>().ok().filter(|n| (1..=OPTIONS.len() as u8).contains(n))
}

/// Print the numbered menu and read one selection from stdin.
pub fn prompt_choice() -> Result<Option<u8>> {
    let mut out = io::stdout().lock();
    writeln!(out, "Select an option:")?;
    for (i, option) in OPTIONS.iter().enumerate() {
        writeln!(out, "{}) {}", i + 1, option)?;
    }
    write!(out, "Enter the number of your choice: ")?;
    out.flush()?;
    drop(out);

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(parse_choice(&line))
}

#[derive(Serialize)]
struct LoginResult {
    token_obtained: bool,
}

/// Run one menu option. Config comes from the user document when
/// STORE_USER_ID and a DSN are both available, otherwise from the environment.
pub async fn run(option: u8, dsn: Option<String>) -> Result<()> {
    let Some(name) = OPTIONS.get(usize::from(option).saturating_sub(1)) else {
        anyhow::bail!("unknown menu option {option}");
    };
    tracing::info!("Starting process for option: {name}");

    let user = std::env::var("STORE_USER_ID").ok().filter(|u| !u.trim().is_empty());
    let store = match (&user, dsn) {
        (Some(_), Some(dsn)) => Some(PgStore::connect(&dsn).await?),
        _ => None,
    };
    let user = user.filter(|_| store.is_some());
    let store_ref = store.as_ref().map(|s| s as &dyn DocumentStore);

    let Some(p) = pipeline::resolve(user.as_deref(), store_ref, Pipeline::from_config).await? else {
        tracing::warn!("No config found for user {}", user.as_deref().unwrap_or_default());
        telemetry::emit::print_result(op_for(option), &FolderReport::no_config(), None)?;
        return Ok(());
    };

    let inoreader_count = FetchBound::MaxCount(DEFAULT_ARTICLE_COUNT);
    match option {
        1 => {
            let notifier = Notifier::smtp(p.config().require_email()?);
            insights::email_insights(&p, &notifier, Source::Feedly, FetchBound::LookbackDays(FEEDLY_INSIGHTS_DAYS)).await?;
        }
        2 => {
            let notifier = Notifier::smtp(p.config().require_email()?);
            post::email_post(&p, &notifier, Source::Feedly, FetchBound::LookbackDays(FEEDLY_POST_DAYS)).await?;
        }
        3 => {
            let notifier = Notifier::smtp(p.config().require_email()?);
            insights::email_insights(&p, &notifier, Source::Inoreader, inoreader_count).await?;
        }
        4 => {
            let notifier = Notifier::smtp(p.config().require_email()?);
            post::email_post(&p, &notifier, Source::Inoreader, inoreader_count).await?;
        }
        _ => test_login(&p).await?,
    }
    Ok(())
}

async fn test_login(p: &Pipeline) -> Result<()> {
    let log = telemetry::login();
    let _g = log.root_span().entered();
    let token = {
        let _s = log.span(&LoginPhase::ClientLogin).entered();
        p.test_login().await?
    };
    log.info_kv("Inoreader ClientLogin succeeded", [("token_len", token.len().to_string())]);
    if telemetry::config::json_mode() {
        log.result(&LoginResult { token_obtained: !token.is_empty() })?;
    }
    Ok(())
}
