use anyhow::{Context, Result};
use db::Repositories;
use tokio::sync::OnceCell;
use tracing::info;

/// Makes sure the full-text indexes exist, at most once per process.
#[derive(Debug, Default)]
pub struct SearchIndexManager {
    ensured: OnceCell<Vec<String>>,
}

impl SearchIndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index names. A failed attempt is not cached, so the next
    /// call tries again.
    pub async fn ensure(&self, repos: &dyn Repositories) -> Result<&[String]> {
        let indexes = self
            .ensured
            .get_or_try_init(|| async {
                let names = repos
                    .search_indexes()
                    .ensure_search_indexes()
                    .await
                    .context("ensuring search indexes")?;
                info!(indexes = ?names, "search indexes ready");
                Ok::<_, anyhow::Error>(names)
            })
            .await?;
        Ok(indexes.as_slice())
    }

    pub fn is_ensured(&self) -> bool {
        self.ensured.initialized()
    }
}
