use std::sync::Arc;

use anyhow::Result;
use collector::{collector_from_config, SearchIndexManager};
use common::{config::AppConfig, logging};
use db::pg::PgDatabase;
use db::Repositories;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing("collector", "info");
    let config = AppConfig::load()?;

    let database = Arc::new(
        PgDatabase::connect(&config.database.url, config.database.max_connections).await?,
    );
    let repositories: Arc<dyn Repositories> = database.clone();
    SearchIndexManager::new()
        .ensure(repositories.as_ref())
        .await?;

    let collector = collector_from_config(&config, repositories)?;
    info!(
        interval = config.collector.interval_secs,
        organizations = ?config.collector.organizations,
        run_once = config.collector.run_once,
        "collector started"
    );
    let result = collector.run().await;
    logging::shutdown_tracer_provider();
    result
}
