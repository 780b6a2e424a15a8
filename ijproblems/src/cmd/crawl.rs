use crate::modules::{
    crawler::scheduler::CrawlScheduler,
    provider::postgres::{postgres_url, PgDataProvider},
};
use anyhow::{Context, Result};
use clap::Args;
use ijproblems_libs::judge::client::{AojClient, DEFAULT_JUDGE_API_URL};
use sqlx::postgres::PgPoolOptions;
use std::env;
use tokio::time::Duration;

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Crawl interval in seconds. Zero disables crawling entirely and
    /// the process idles. Falls back to CRAWL_INTERVAL_SECOND.
    #[arg(long)]
    interval: Option<u64>,
}

pub async fn run(args: CrawlArgs) -> Result<()> {
    let interval = match args.interval {
        Some(interval) => interval,
        None => env::var("CRAWL_INTERVAL_SECOND")
            .ok()
            .and_then(|interval| interval.parse().ok())
            .unwrap_or(0),
    };

    let url = postgres_url()?;
    let pool = PgPoolOptions::new().connect(&url).await.with_context(|| {
        let message = "couldn't connect to PostgreSQL. check your database status and the POSTGRES_* environment variables.";
        tracing::error!(message);
        String::from(message)
    })?;

    let judge_api_url =
        env::var("JUDGE_API_URL").unwrap_or_else(|_| String::from(DEFAULT_JUDGE_API_URL));
    let client = AojClient::new(&judge_api_url).with_context(|| {
        let message = format!("couldn't create judge api client for {}", judge_api_url);
        tracing::error!(message);
        message
    })?;

    let scheduler = CrawlScheduler::new(
        client,
        PgDataProvider::new(pool),
        Duration::from_secs(interval),
    );
    scheduler.run().await
}
