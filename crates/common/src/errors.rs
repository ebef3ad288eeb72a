use std::fmt::Debug;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),
    #[error("github error: {0}")]
    Github(#[source] anyhow::Error),
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn db(err: impl Into<anyhow::Error>) -> Self {
        Self::Database(err.into())
    }

    pub fn github(err: impl Into<anyhow::Error>) -> Self {
        Self::Github(err.into())
    }
}
