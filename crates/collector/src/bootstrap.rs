use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::config::AppConfig;
use common::errors::AppError;
use db::Repositories;
use gh_broker::{GithubBrokerBuilder, GithubToken};

use crate::client::BrokerGithubClient;
use crate::service::Collector;

/// Wires the broker, the REST client and the store into a collector.
pub fn collector_from_config(
    config: &AppConfig,
    repos: Arc<dyn Repositories>,
) -> Result<Collector<BrokerGithubClient>> {
    let tokens: Vec<GithubToken> = config
        .github
        .resolved_tokens()
        .into_iter()
        .map(GithubToken::from)
        .collect();
    let Some(credential_ref) = tokens.first().map(|token| token.id.clone()) else {
        return Err(AppError::MissingCredentials("no GitHub tokens configured").into());
    };

    let broker = GithubBrokerBuilder::new(tokens)
        .user_agent(config.github.user_agent.clone())
        .max_inflight(config.broker.max_inflight)
        .backoff(
            Duration::from_millis(config.broker.backoff_base_ms),
            Duration::from_millis(config.broker.backoff_max_ms),
            config.broker.jitter_frac,
        )
        .max_attempts(config.broker.max_attempts)
        .build()?;

    let client = Arc::new(BrokerGithubClient::new(
        broker,
        config.github.user_agent.clone(),
        &config.github.api_base,
    )?);

    Ok(Collector::new(config.collector.clone(), client, repos).with_credential_ref(credential_ref))
}
