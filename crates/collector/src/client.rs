use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use gh_broker::{parse_next_link, GithubBroker, HttpStatusError};
use http::{header, Request, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::resource::Resource;

#[derive(Debug, Error)]
pub enum GithubApiError {
    #[error("github api error: {status} for {endpoint}")]
    Http {
        status: StatusCode,
        endpoint: String,
    },
    #[error("github api returned an unexpected payload for {endpoint}")]
    UnexpectedShape { endpoint: String },
}

impl GithubApiError {
    pub fn status(status: StatusCode, endpoint: impl Into<String>) -> Self {
        Self::Http {
            status,
            endpoint: endpoint.into(),
        }
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        match *self {
            GithubApiError::Http { status, .. } => Some(status),
            GithubApiError::UnexpectedShape { .. } => None,
        }
    }
}

/// One page of a listing plus the continuation URL, if any.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Value>,
    pub next: Option<String>,
}

#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn get(&self, resource: &Resource) -> Result<Value>;

    /// Fetches the first page of `resource`, or the page at `next` when the
    /// previous page supplied a continuation URL.
    async fn list_page(&self, resource: &Resource, per_page: u32, next: Option<&str>)
        -> Result<Page>;
}

pub struct BrokerGithubClient {
    broker: Arc<dyn GithubBroker>,
    base: Url,
    user_agent: String,
}

impl BrokerGithubClient {
    pub fn new(broker: Arc<dyn GithubBroker>, user_agent: String, api_base: &str) -> Result<Self> {
        let mut base = Url::parse(api_base).with_context(|| format!("invalid api base {api_base}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            broker,
            base,
            user_agent,
        })
    }

    fn url_for(&self, resource: &Resource) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("api base {} cannot be a base", self.base))?
            .pop_if_empty()
            .extend(resource.segments());
        Ok(url)
    }

    /// Credentials are only ever sent to the configured API origin.
    fn same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.base.scheme()
            && url.host_str() == self.base.host_str()
            && url.port_or_known_default() == self.base.port_or_known_default()
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn execute(&self, url: Url, endpoint: &str) -> Result<Response<Vec<u8>>> {
        let uri: http::Uri = url.as_str().parse()?;
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::USER_AGENT, self.user_agent.clone())
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .body(Vec::new())?;

        let response = match self.broker.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                if let Some(status_err) = err.downcast_ref::<HttpStatusError>() {
                    return Err(GithubApiError::status(status_err.status, endpoint).into());
                }
                return Err(err);
            }
        };

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(GithubApiError::status(response.status(), endpoint).into())
        }
    }
}

#[async_trait]
impl GithubClient for BrokerGithubClient {
    async fn get(&self, resource: &Resource) -> Result<Value> {
        let endpoint = resource.to_string();
        let url = self.url_for(resource)?;
        debug!(endpoint = %endpoint, "Dispatching GitHub request");
        let response = self.execute(url, &endpoint).await?;
        serde_json::from_slice(response.body()).map_err(|err| {
            anyhow::Error::new(err).context(GithubApiError::UnexpectedShape { endpoint })
        })
    }

    async fn list_page(
        &self,
        resource: &Resource,
        per_page: u32,
        next: Option<&str>,
    ) -> Result<Page> {
        let endpoint = resource.to_string();
        let url = match next {
            Some(next) => {
                let url =
                    Url::parse(next).with_context(|| format!("invalid next link {next}"))?;
                if !self.same_origin(&url) {
                    bail!("next link {next} leaves api base {}", self.base);
                }
                url
            }
            None => {
                let mut url = self.url_for(resource)?;
                {
                    let mut query = url.query_pairs_mut();
                    for (key, value) in resource.default_params() {
                        query.append_pair(key, &value);
                    }
                    query.append_pair("per_page", &per_page.to_string());
                }
                url
            }
        };

        debug!(endpoint = %endpoint, url = %url, "Dispatching GitHub page request");
        let response = self.execute(url, &endpoint).await?;
        let next = parse_next_link(response.headers());
        let items = match serde_json::from_slice::<Value>(response.body()) {
            Ok(Value::Array(items)) => items,
            Ok(Value::Null) => Vec::new(),
            Ok(_) => return Err(GithubApiError::UnexpectedShape { endpoint }.into()),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(GithubApiError::UnexpectedShape { endpoint }))
            }
        };
        Ok(Page { items, next })
    }
}
