//! # docrag-indexer
//!
//! Thin entrypoint; all logic lives in the `docrag_indexer` library crate.

use anyhow::Result;
use clap::Parser;
use docrag_indexer::{format_report, run, Cli};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("docrag_indexer=info".parse()?),
        )
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => {
            println!("{}", format_report(&report));
            if report.failed > 0 {
                std::process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("[docrag-indexer error] {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}
