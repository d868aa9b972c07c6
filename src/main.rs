use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::env;

mod config;
mod extractor;
mod feeds;
mod init;
mod llm;
mod menu;
mod notify;
mod output;
mod pipeline;
mod prompt;
mod store;
mod telemetry;

#[derive(Parser)]
#[command(
    name = "feed-insights",
    about = "Turn feed folders into LLM insights and LinkedIn posts",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[arg(global = true, short, long)]
    dsn: Option<String>,
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    /// Menu option 1-5; asks interactively when neither an option nor a command is given
    #[arg(value_parser = clap::value_parser!(u8).range(1..=5))]
    option: Option<u8>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and store insights for every folder of a user
    Insights(pipeline::insights::InsightsCmd),
    /// Generate and store one LinkedIn post with an image
    Post(pipeline::post::PostCmd),
    /// Apply document store migrations
    Init(init::InitCmd),
}

fn require_dsn(dsn: Option<String>) -> Result<String> {
    dsn.context("Please provide --dsn or set DATABASE_URL in .env")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // stderr logging; respects RUST_LOG and INSIGHTS_LOG_FORMAT
    telemetry::config::init_tracing();
    let dsn = cli.dsn.or_else(|| env::var("DATABASE_URL").ok());

    match (cli.command, cli.option) {
        (Some(Commands::Insights(args)), _) => pipeline::insights::run_cmd(&require_dsn(dsn)?, args).await?,
        (Some(Commands::Post(args)), _) => pipeline::post::run_cmd(&require_dsn(dsn)?, args).await?,
        (Some(Commands::Init(args)), _) => init::run(&require_dsn(dsn)?, args).await?,
        (None, Some(option)) => menu::run(option, dsn).await?,
        (None, None) => match menu::prompt_choice()? {
            Some(option) => menu::run(option, dsn).await?,
            None => tracing::warn!("Invalid selection"),
        },
    }

    Ok(())
}
