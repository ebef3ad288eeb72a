use std::sync::Arc;

use anyhow::Result;
use api::{build_router, ApiState};
use axum::Router;
use collector::{collector_from_config, OrgSync, SearchIndexManager};
use common::{config::AppConfig, logging};
use db::pg::PgDatabase;
use db::Repositories;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing("api", "info");
    let config = AppConfig::load()?;
    let database = Arc::new(
        PgDatabase::connect(&config.database.url, config.database.max_connections).await?,
    );
    let repositories: Arc<dyn Repositories> = database.clone();
    SearchIndexManager::new()
        .ensure(repositories.as_ref())
        .await?;

    let sync: Option<Arc<dyn OrgSync>> =
        match collector_from_config(&config, repositories.clone()) {
            Ok(collector) => Some(Arc::new(collector)),
            Err(err) => {
                warn!(error = %err, "sync routes disabled");
                None
            }
        };

    let metrics_path: &'static str =
        Box::leak(config.observability.metrics_path.clone().into_boxed_str());
    let state = Arc::new(ApiState {
        repositories,
        sync,
        metrics_path,
    });
    let app: Router = build_router(state);

    let addr: std::net::SocketAddr = config.api.bind.parse()?;
    info!("api listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    logging::shutdown_tracer_provider();
    Ok(())
}
