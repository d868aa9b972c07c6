use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::store::PgStore;
use crate::telemetry::{self, ops::init::Phase};

#[derive(Args)]
pub struct InitCmd {}

#[derive(Serialize)]
struct InitResult {
    migrated: bool,
}

/// Create the `insights` schema and apply pending migrations (idempotent).
pub async fn run(dsn: &str, _args: InitCmd) -> Result<()> {
    let log = telemetry::init();
    let _g = log.root_span().entered();

    let store = {
        let _s = log.span(&Phase::Connect).entered();
        PgStore::connect(dsn).await?
    };
    {
        let _s = log.span(&Phase::Migrate).entered();
        store.migrate().await?;
    }

    if telemetry::config::json_mode() {
        log.result(&InitResult { migrated: true })?;
    } else {
        log.info("Document store initialized");
    }
    Ok(())
}
