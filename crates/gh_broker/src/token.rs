use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::model::RateLimitUpdate;

#[derive(Debug, Clone)]
pub struct GithubToken {
    pub id: String,
    pub secret: String,
}

impl From<common::config::GithubToken> for GithubToken {
    fn from(token: common::config::GithubToken) -> Self {
        Self {
            id: token.id,
            secret: token.secret,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            limit: 5000,
            remaining: 5000,
            reset_at: Utc::now(),
        }
    }
}

impl RateLimitState {
    pub fn update(&mut self, update: RateLimitUpdate) {
        self.limit = update.limit;
        self.remaining = update.remaining;
        self.reset_at = update.reset;
    }

    pub fn consume(&mut self) {
        self.remaining = (self.remaining - 1).max(0);
    }

    fn available(&self, now: DateTime<Utc>) -> bool {
        self.remaining > 0 || self.reset_at <= now
    }
}

#[derive(Debug)]
struct TokenState {
    token: GithubToken,
    rate: RateLimitState,
}

pub enum TokenSelection {
    Token(GithubToken),
    Wait(Duration),
}

/// Shared rate-limit bookkeeping for the configured credentials.
#[derive(Clone)]
pub struct TokenPool {
    inner: Arc<Mutex<Vec<TokenState>>>,
}

impl TokenPool {
    pub fn new(tokens: Vec<GithubToken>) -> Self {
        let states = tokens
            .into_iter()
            .map(|token| TokenState {
                token,
                rate: RateLimitState::default(),
            })
            .collect();
        Self {
            inner: Arc::new(Mutex::new(states)),
        }
    }

    /// Picks the token with the largest remaining share, or reports how long
    /// to wait for the earliest reset when every token is exhausted.
    pub async fn pick_token(&self) -> TokenSelection {
        let guard = self.inner.lock().await;
        let now = Utc::now();
        let mut best: Option<(f64, &GithubToken)> = None;
        let mut next_reset: Option<Duration> = None;

        for state in guard.iter() {
            if state.rate.available(now) {
                let score = state.rate.remaining as f64 / state.rate.limit.max(1) as f64;
                if best.map_or(true, |(best_score, _)| score > best_score) {
                    best = Some((score, &state.token));
                }
            } else {
                let wait = (state.rate.reset_at - now).to_std().unwrap_or_default();
                next_reset = Some(next_reset.map_or(wait, |current| current.min(wait)));
            }
        }

        match (best, next_reset) {
            (Some((_, token)), _) => TokenSelection::Token(token.clone()),
            (None, Some(wait)) => TokenSelection::Wait(wait),
            (None, None) => TokenSelection::Wait(Duration::from_secs(30)),
        }
    }

    pub async fn update(&self, token_id: &str, update: RateLimitUpdate) {
        let mut guard = self.inner.lock().await;
        if let Some(state) = guard.iter_mut().find(|s| s.token.id == token_id) {
            state.rate.update(update);
        }
    }

    pub async fn consume(&self, token_id: &str) {
        let mut guard = self.inner.lock().await;
        if let Some(state) = guard.iter_mut().find(|s| s.token.id == token_id) {
            state.rate.consume();
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn totals(&self) -> (i64, i64) {
        let guard = self.inner.lock().await;
        guard.iter().fold((0, 0), |(limit, remaining), state| {
            (limit + state.rate.limit, remaining + state.rate.remaining)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(id: &str) -> GithubToken {
        GithubToken {
            id: id.into(),
            secret: format!("{id}-secret"),
        }
    }

    #[tokio::test]
    async fn prefers_token_with_most_remaining() {
        let pool = TokenPool::new(vec![token("a"), token("b")]);
        pool.update(
            "a",
            RateLimitUpdate {
                limit: 5000,
                remaining: 10,
                reset: Utc::now() + chrono::Duration::minutes(30),
            },
        )
        .await;

        match pool.pick_token().await {
            TokenSelection::Token(t) => assert_eq!(t.id, "b"),
            TokenSelection::Wait(_) => panic!("expected a token"),
        }
    }

    #[tokio::test]
    async fn waits_when_all_tokens_exhausted() {
        let pool = TokenPool::new(vec![token("a")]);
        pool.update(
            "a",
            RateLimitUpdate {
                limit: 5000,
                remaining: 0,
                reset: Utc::now() + chrono::Duration::seconds(90),
            },
        )
        .await;

        match pool.pick_token().await {
            TokenSelection::Wait(wait) => assert!(wait <= Duration::from_secs(90)),
            TokenSelection::Token(_) => panic!("expected to wait"),
        }
        assert_eq!(pool.totals().await, (5000, 0));
    }
}
