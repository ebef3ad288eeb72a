use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::client::GithubApiError;

/// Which unit of work a failure was isolated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureScope {
    Organization,
    Repository,
    /// One of the commit, pull request or issue listings of a repository.
    Stream,
    Record,
    /// The event timeline of one issue.
    Issue,
}

impl FailureScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureScope::Organization => "organization",
            FailureScope::Repository => "repository",
            FailureScope::Stream => "stream",
            FailureScope::Record => "record",
            FailureScope::Issue => "issue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Persistence,
    DataShape,
}

impl FailureKind {
    pub fn classify(err: &anyhow::Error) -> Self {
        let mut kind = FailureKind::Transport;
        for cause in err.chain() {
            if cause.is::<db::DbError>() {
                return FailureKind::Persistence;
            }
            if cause.is::<serde_json::Error>() {
                kind = FailureKind::DataShape;
            }
            if let Some(GithubApiError::UnexpectedShape { .. }) =
                cause.downcast_ref::<GithubApiError>()
            {
                kind = FailureKind::DataShape;
            }
        }
        kind
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Persistence => "persistence",
            FailureKind::DataShape => "data_shape",
        }
    }
}

/// A failed unit of work that was reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitFailure {
    pub scope: FailureScope,
    pub kind: FailureKind,
    pub unit: String,
    pub message: String,
}

impl UnitFailure {
    pub fn new(
        scope: FailureScope,
        kind: FailureKind,
        unit: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            kind,
            unit: unit.into(),
            message: message.into(),
        }
    }

    pub fn from_error(scope: FailureScope, unit: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::new(scope, FailureKind::classify(err), unit, format!("{err:#}"))
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("none of the requested organizations could be synced ({} failures)", failures.len())]
    NoResults { failures: Vec<UnitFailure> },
    #[error("sync did not finish within {0:?}")]
    TimedOut(Duration),
}
