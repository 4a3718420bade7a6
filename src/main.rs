use clap::{Parser, Subcommand};
use anyhow::Result;
use dotenvy::dotenv;

mod analysis;
mod config;
mod export;
mod feeds;
mod llm;
mod metrics;
mod normalize;
mod output;
mod pipeline;
mod record;
mod telemetry;
mod util;
#[cfg(test)]
mod testkit;

#[derive(Parser)]
#[command(name = "feedpulse", about = "Brand intelligence over RSS/Atom feeds")]
struct Cli {
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, analyze and summarize feeds
    Run(pipeline::RunCmd),
    /// Fetch one feed and list its articles
    Fetch(feeds::FetchCmd),
    /// List built-in feed presets
    Presets,
    /// Recompute metrics from a JSON export
    Metrics(metrics::MetricsCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // logs on stderr; RUST_LOG and FEEDPULSE_LOG_FORMAT apply
    telemetry::config::init_tracing();

    match cli.command {
        Commands::Run(args) => pipeline::run(args).await?,
        Commands::Fetch(args) => feeds::run(args).await?,
        Commands::Presets => config::list_presets()?,
        Commands::Metrics(args) => metrics::run(args).await?,
    }

    Ok(())
}
