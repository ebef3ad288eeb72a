pub mod backoff;
pub mod broker;
pub mod error;
pub mod metrics;
pub mod model;
pub mod token;

pub use broker::{GithubBroker, GithubBrokerBuilder, HttpExec, ReqwestExecutor};
pub use error::HttpStatusError;
pub use model::{parse_next_link, parse_rate_limit, parse_retry_after};
pub use token::{GithubToken, RateLimitState};
