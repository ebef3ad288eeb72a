use std::env;

use anyhow::{Context, Result};
use db::pg::{run_migrations, PgDatabase};
use sqlx::{Executor, PgPool};
use url::Url;
use uuid::Uuid;

/// Creates throwaway databases on the server named by `TEST_ADMIN_URL`
/// (falling back to `DATABASE_URL`).
pub struct DbFixture {
    admin_url: Url,
}

impl DbFixture {
    pub fn from_env() -> Result<Self> {
        let raw = env::var("TEST_ADMIN_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .context("TEST_ADMIN_URL or DATABASE_URL must be set for tests")?;
        let admin_url = Url::parse(&raw).context("invalid admin database url")?;
        Ok(Self { admin_url })
    }

    /// Creates a database with migrations applied.
    pub async fn create(&self, prefix: &str) -> Result<DatabaseHandle> {
        let handle = self.create_unmigrated(prefix).await?;
        run_migrations(&handle.pool).await?;
        Ok(handle)
    }

    pub async fn create_unmigrated(&self, prefix: &str) -> Result<DatabaseHandle> {
        let name = format!("{}_{}", prefix, Uuid::new_v4().simple());
        let admin_pool = PgPool::connect(self.admin_url.as_str()).await?;
        admin_pool
            .execute(format!("CREATE DATABASE \"{name}\"").as_str())
            .await
            .with_context(|| format!("creating test database {name}"))?;
        admin_pool.close().await;

        let mut database_url = self.admin_url.clone();
        database_url.set_path(&name);
        let pool = PgPool::connect(database_url.as_str()).await?;
        Ok(DatabaseHandle {
            pool,
            name,
            database_url: database_url.to_string(),
            admin_url: self.admin_url.to_string(),
        })
    }
}

pub struct DatabaseHandle {
    pool: PgPool,
    name: String,
    database_url: String,
    admin_url: String,
}

impl DatabaseHandle {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn database(&self) -> PgDatabase {
        PgDatabase::from_pool(self.pool.clone())
    }

    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;
        let admin_pool = PgPool::connect(&self.admin_url).await?;
        admin_pool
            .execute(
                format!(
                    "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}'",
                    self.name
                )
                .as_str(),
            )
            .await?;
        admin_pool
            .execute(format!("DROP DATABASE IF EXISTS \"{}\"", self.name).as_str())
            .await?;
        Ok(())
    }
}
