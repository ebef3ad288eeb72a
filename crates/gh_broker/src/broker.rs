use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::error::HttpStatusError;
use crate::metrics;
use crate::model::{parse_rate_limit, parse_retry_after};
use crate::token::{GithubToken, TokenPool, TokenSelection};

#[async_trait]
pub trait HttpExec: Send + Sync {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExec for ReqwestExecutor {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let (parts, body) = req.into_parts();
        let resp = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await?;
        let mut response = Response::new(bytes.to_vec());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Executes GitHub REST requests with credential rotation, rate-limit waits
/// and bounded retries.
pub trait GithubBroker: Send + Sync {
    fn execute(&self, request: Request<Vec<u8>>)
        -> BoxFuture<'static, Result<Response<Vec<u8>>>>;
}

#[derive(Clone)]
pub struct GithubBrokerBuilder {
    tokens: Vec<GithubToken>,
    http_exec: Option<Arc<dyn HttpExec>>,
    user_agent: String,
    max_inflight: usize,
    backoff: BackoffPolicy,
}

impl GithubBrokerBuilder {
    pub fn new(tokens: Vec<GithubToken>) -> Self {
        Self {
            tokens,
            http_exec: None,
            user_agent: "org-activity-sync".to_string(),
            max_inflight: 32,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn http_exec(mut self, exec: Arc<dyn HttpExec>) -> Self {
        self.http_exec = Some(exec);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn max_inflight(mut self, max: usize) -> Self {
        self.max_inflight = max.max(1);
        self
    }

    pub fn backoff(mut self, base: Duration, max: Duration, jitter: f32) -> Self {
        self.backoff.base = base;
        self.backoff.max = max;
        self.backoff.jitter_frac = jitter;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.backoff.max_attempts = attempts.max(1);
        self
    }

    pub fn build(self) -> Result<Arc<dyn GithubBroker>> {
        let http_exec = match self.http_exec {
            Some(exec) => exec,
            None => Arc::new(ReqwestExecutor::new(&self.user_agent)?),
        };

        Ok(Arc::new(LocalGithubBroker {
            inner: Arc::new(Inner {
                http_exec,
                token_pool: TokenPool::new(self.tokens),
                inflight: Arc::new(Semaphore::new(self.max_inflight)),
                backoff: self.backoff,
            }),
        }))
    }
}

struct Inner {
    http_exec: Arc<dyn HttpExec>,
    token_pool: TokenPool,
    inflight: Arc<Semaphore>,
    backoff: BackoffPolicy,
}

enum Attempt {
    Done(Response<Vec<u8>>),
    Retry {
        error: anyhow::Error,
        wait: Option<Duration>,
        reason: &'static str,
    },
    Fail(anyhow::Error),
}

#[derive(Clone)]
pub struct LocalGithubBroker {
    inner: Arc<Inner>,
}

impl GithubBroker for LocalGithubBroker {
    fn execute(
        &self,
        request: Request<Vec<u8>>,
    ) -> BoxFuture<'static, Result<Response<Vec<u8>>>> {
        let inner = self.inner.clone();
        async move { inner.execute_with_retries(request).await }.boxed()
    }
}

impl Inner {
    async fn execute_with_retries(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let endpoint = request.uri().path().to_string();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.execute_once(clone_request(&request)?, &endpoint).await {
                Attempt::Done(response) => return Ok(response),
                Attempt::Fail(err) => return Err(err),
                Attempt::Retry {
                    error,
                    wait,
                    reason,
                } => {
                    if self.backoff.exhausted(attempt) {
                        return Err(error);
                    }
                    let wait = wait.unwrap_or_else(|| self.backoff.delay(attempt));
                    warn!(
                        attempt,
                        endpoint = %endpoint,
                        reason,
                        wait_ms = wait.as_millis() as u64,
                        error = %error,
                        "GitHub request attempt failed"
                    );
                    metrics::RETRIES_TOTAL.with_label_values(&[reason]).inc();
                    metrics::SLEEP_SECONDS
                        .with_label_values(&[reason])
                        .inc_by(wait.as_secs());
                    sleep(wait).await;
                }
            }
        }
    }

    async fn execute_once(&self, mut request: Request<Vec<u8>>, endpoint: &str) -> Attempt {
        let permit = match self.inflight.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => return Attempt::Fail(err.into()),
        };

        let token = loop {
            match self.token_pool.pick_token().await {
                TokenSelection::Token(token) => break token,
                TokenSelection::Wait(wait) => {
                    if self.token_pool.is_empty().await {
                        return Attempt::Fail(anyhow::anyhow!("no GitHub tokens configured"));
                    }
                    debug!(wait_secs = wait.as_secs(), "all tokens exhausted, waiting for reset");
                    metrics::SLEEP_SECONDS
                        .with_label_values(&["rate_limit"])
                        .inc_by(wait.as_secs());
                    sleep(wait + Duration::from_secs(1)).await;
                }
            }
        };

        match HeaderValue::from_str(&format!("Bearer {}", token.secret)) {
            Ok(value) => {
                request.headers_mut().insert(header::AUTHORIZATION, value);
            }
            Err(err) => return Attempt::Fail(err.into()),
        }

        metrics::INFLIGHT.inc();
        let start = Instant::now();
        let response = self.http_exec.execute(request).await;
        metrics::INFLIGHT.dec();
        drop(permit);

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                return Attempt::Retry {
                    error: err.context(format!("transport error for {endpoint}")),
                    wait: None,
                    reason: "transport",
                }
            }
        };

        metrics::LATENCY.observe(start.elapsed().as_secs_f64());
        let status = response.status();
        metrics::REQUESTS_TOTAL
            .with_label_values(&[&token.id, status_class(status)])
            .inc();

        let headers = response.headers().clone();
        let rate_info = parse_rate_limit(&headers);
        if let Some(update) = rate_info.clone() {
            metrics::RATE_LIMIT
                .with_label_values(&[&token.id])
                .set(update.limit);
            metrics::RATE_REMAINING
                .with_label_values(&[&token.id])
                .set(update.remaining);
            self.token_pool.update(&token.id, update).await;
        } else if status.is_success() {
            self.token_pool.consume(&token.id).await;
        }

        if status.is_success() {
            return Attempt::Done(response);
        }

        let error = HttpStatusError::new(status, endpoint);
        let retry_after = parse_retry_after(&headers);
        let rate_exhausted = rate_info.as_ref().map_or(false, |r| r.remaining == 0);

        warn!(
            status = %status,
            endpoint = %endpoint,
            github_request_id = request_id(&headers),
            rate_limit_remaining = rate_info.as_ref().map(|r| r.remaining),
            rate_limit_reset = rate_info.as_ref().map(|r| r.reset.timestamp()),
            retry_after_seconds = retry_after.as_ref().map(|r| r.wait.as_secs()),
            body_preview = %body_preview(response.body()),
            "GitHub returned error response"
        );

        if !error.is_retryable() {
            return Attempt::Fail(error.into());
        }

        if let Some(advice) = retry_after {
            return Attempt::Retry {
                error: error.into(),
                wait: Some(advice.wait + Duration::from_secs(1)),
                reason: advice.reason,
            };
        }

        match status {
            // The token pool now reports the reset time, so the next attempt waits for it.
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if rate_exhausted => {
                Attempt::Retry {
                    error: error.into(),
                    wait: Some(Duration::ZERO),
                    reason: "primary_limit",
                }
            }
            StatusCode::TOO_MANY_REQUESTS => Attempt::Retry {
                error: error.into(),
                wait: None,
                reason: "secondary_limit",
            },
            // Plain 403 without rate-limit signals is a permission problem.
            StatusCode::FORBIDDEN => Attempt::Fail(error.into()),
            _ => Attempt::Retry {
                error: error.into(),
                wait: None,
                reason: "server_error",
            },
        }
    }
}

fn clone_request(request: &Request<Vec<u8>>) -> Result<Request<Vec<u8>>> {
    let mut builder = Request::builder()
        .method(request.method().clone())
        .uri(request.uri().clone())
        .version(request.version());
    for (name, value) in request.headers() {
        builder = builder.header(name, value);
    }
    builder
        .body(request.body().clone())
        .context("cloning GitHub request")
}

fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get("x-github-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

fn body_preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut preview: String = text.chars().take(256).collect();
    if preview.len() < text.len() {
        preview.push('…');
    }
    preview
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
