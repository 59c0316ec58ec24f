use anyhow::Context;
use clap::{Parser, Subcommand};

use bookwish_app::modules::books::catalog::{self, CatalogSearch};
use bookwish_app::modules::books::models::SearchResult;
use bookwish_kernel::settings::Settings;

/// Operate the bookwish wishlist tracker.
#[derive(Debug, Parser)]
#[command(name = "bookwish-cli", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve,
    /// Apply pending database migrations
    Migrate,
    /// Search the configured book catalog
    Search {
        /// Free-text query
        query: String,
        /// 1-indexed result page
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Print wishlist statistics as JSON
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().context("failed to load bookwish settings")?;
    bookwish_telemetry::init(&settings.telemetry)?;

    match cli.command {
        Command::Serve => bookwish_app::run(&settings).await,
        Command::Migrate => {
            let applied = bookwish_app::migrate(&settings).await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
        Command::Search { query, page } => search(&settings, &query, page).await,
        Command::Stats => {
            let store = bookwish_app::open_store(&settings).await?;
            let report = store.aggregate_stats().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn search(settings: &Settings, query: &str, page: u32) -> anyhow::Result<()> {
    let client = catalog::from_settings(&settings.catalog).context("failed to build catalog client")?;
    let page = page.max(1);
    let found = client.search(query, page, settings.catalog.page_size).await;

    let first = catalog::offset_for(page, settings.catalog.page_size);
    for (position, hit) in (first + 1..).zip(found.hits) {
        let result = SearchResult::from(hit);
        if result.authors.is_empty() {
            println!("{position}. {}", result.title);
        } else {
            println!("{position}. {} by {}", result.title, result.authors);
        }
    }
    println!("{} result(s) in total", found.total);
    Ok(())
}
