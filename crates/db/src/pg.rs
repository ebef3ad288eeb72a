use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tokio::time::{sleep, Duration};
use tracing::{info, instrument, warn};

use crate::errors::{DbError, Result};
use crate::models::{
    ActivityPage, ActivityQuery, CommitRow, IssueRow, OrganizationRow, OrganizationUpsert,
    PullRequestRow, RepositoryRow, RepositoryUpsert,
};
use crate::repositories::{
    CommitRepository, IssueRepository, OrganizationRepository, PullRequestRepository,
    RepoRepository, Repositories, SearchIndexRepository,
};

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(DbError::Migration)
}

/// A full-text document over a fixed set of text columns of one table.
#[derive(Debug, Clone, Copy)]
pub struct SearchTarget {
    pub table: &'static str,
    pub alias: &'static str,
    pub index: &'static str,
    pub columns: &'static [&'static str],
}

pub const COMMIT_SEARCH: SearchTarget = SearchTarget {
    table: "commits",
    alias: "c",
    index: "commits_search_idx",
    columns: &[
        "message",
        "sha",
        "author_login",
        "commit_author_name",
        "commit_author_email",
    ],
};

pub const PULL_REQUEST_SEARCH: SearchTarget = SearchTarget {
    table: "pull_requests",
    alias: "p",
    index: "pull_requests_search_idx",
    columns: &["merge_commit_sha", "title", "user_login"],
};

pub const ISSUE_SEARCH: SearchTarget = SearchTarget {
    table: "issues",
    alias: "i",
    index: "issues_search_idx",
    columns: &["title", "closed_by_login", "user_login"],
};

pub const SEARCH_TARGETS: [SearchTarget; 3] = [COMMIT_SEARCH, PULL_REQUEST_SEARCH, ISSUE_SEARCH];

impl SearchTarget {
    /// The indexed expression. Qualified and unqualified forms resolve to the
    /// same expression, so queries through the alias still hit the index.
    pub fn document(&self, qualified: bool) -> String {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                if qualified {
                    format!("coalesce({}.{column}, '')", self.alias)
                } else {
                    format!("coalesce({column}, '')")
                }
            })
            .collect();
        format!("to_tsvector('simple', {})", parts.join(" || ' ' || "))
    }

    pub fn create_index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING GIN ({})",
            self.index,
            self.table,
            self.document(false)
        )
    }

    fn from_clause(&self) -> String {
        format!(
            " FROM {table} {a} JOIN repositories r ON r.id = {a}.repo_id \
              JOIN organizations o ON o.id = r.organization_id",
            table = self.table,
            a = self.alias
        )
    }
}

const COMMIT_COLUMNS: &str = "c.sha, c.repo_id, c.url, c.message, c.author_id, c.author_login, \
     c.author_avatar_url, c.commit_author_name, c.commit_author_email, c.commit_author_date";

const PULL_REQUEST_COLUMNS: &str = "p.external_id, p.repo_id, p.number, p.url, p.state, p.title, \
     p.user_id, p.user_login, p.created_on, p.closed_on, p.merged_on, p.merge_commit_sha, \
     p.head_label, p.head_ref, p.head_sha, p.base_label, p.base_ref, p.base_sha";

const ISSUE_COLUMNS: &str = "i.external_id, i.repo_id, i.number, i.url, i.state, i.title, \
     i.user_id, i.user_login, i.created_on, i.closed_on, i.closed_by_id, i.closed_by_login";

fn push_activity_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    target: &SearchTarget,
    query: &ActivityQuery,
) {
    builder.push(" WHERE TRUE");

    let organizations = query.organization_keys();
    if !organizations.is_empty() {
        builder.push(" AND (lower(o.login) = ANY(");
        builder.push_bind(organizations.clone());
        builder.push(") OR o.external_id = ANY(");
        builder.push_bind(organizations);
        builder.push("))");
    }

    if let Some(terms) = query.search_terms() {
        builder.push(" AND ");
        builder.push(target.document(true));
        builder.push(" @@ plainto_tsquery('simple', ");
        builder.push_bind(terms.to_string());
        builder.push(")");
    }
}

async fn list_activity<T>(
    pool: &PgPool,
    target: &SearchTarget,
    columns: &str,
    order_by: &str,
    query: &ActivityQuery,
) -> Result<ActivityPage<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let from = target.from_clause();

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
    count.push(&from);
    push_activity_filters(&mut count, target, query);
    let total_count: i64 = count
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await
        .map_err(DbError::Query)?;

    let mut select = QueryBuilder::<Postgres>::new("SELECT ");
    select.push(columns).push(&from);
    push_activity_filters(&mut select, target, query);
    select.push(" ORDER BY ").push(order_by);
    select.push(" LIMIT ").push_bind(query.page_size());
    select.push(" OFFSET ").push_bind(query.offset());

    let data = select
        .build_query_as::<T>()
        .fetch_all(pool)
        .await
        .map_err(DbError::Query)?;

    Ok(ActivityPage { data, total_count })
}

#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
    organization_repo: Arc<PgOrganizationRepository>,
    repo_repo: Arc<PgRepoRepository>,
    commit_repo: Arc<PgCommitRepository>,
    pull_request_repo: Arc<PgPullRequestRepository>,
    issue_repo: Arc<PgIssueRepository>,
    search_index_repo: Arc<PgSearchIndexRepository>,
}

impl PgDatabase {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        const MAX_ATTEMPTS: u32 = 5;
        const BASE_DELAY_MS: u64 = 500;

        let mut attempts = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    run_migrations(&pool).await?;
                    return Ok(Self::from_pool(pool));
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= MAX_ATTEMPTS {
                        return Err(DbError::Query(err));
                    }

                    let exp = (attempts - 1).min(5);
                    let backoff = Duration::from_millis(BASE_DELAY_MS * (1u64 << exp));
                    warn!(
                        attempts,
                        error = %err,
                        wait_ms = backoff.as_millis() as u64,
                        "database connection failed; retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            organization_repo: Arc::new(PgOrganizationRepository { pool: pool.clone() }),
            repo_repo: Arc::new(PgRepoRepository { pool: pool.clone() }),
            commit_repo: Arc::new(PgCommitRepository { pool: pool.clone() }),
            pull_request_repo: Arc::new(PgPullRequestRepository { pool: pool.clone() }),
            issue_repo: Arc::new(PgIssueRepository { pool: pool.clone() }),
            search_index_repo: Arc::new(PgSearchIndexRepository { pool: pool.clone() }),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Repositories for PgDatabase {
    fn organizations(&self) -> &dyn OrganizationRepository {
        &*self.organization_repo
    }

    fn repos(&self) -> &dyn RepoRepository {
        &*self.repo_repo
    }

    fn commits(&self) -> &dyn CommitRepository {
        &*self.commit_repo
    }

    fn pull_requests(&self) -> &dyn PullRequestRepository {
        &*self.pull_request_repo
    }

    fn issues(&self) -> &dyn IssueRepository {
        &*self.issue_repo
    }

    fn search_indexes(&self) -> &dyn SearchIndexRepository {
        &*self.search_index_repo
    }
}

#[derive(Clone)]
struct PgOrganizationRepository {
    pool: PgPool,
}

#[async_trait]
impl OrganizationRepository for PgOrganizationRepository {
    #[instrument(skip(self, org), fields(login = %org.login))]
    async fn upsert(&self, org: OrganizationUpsert) -> Result<OrganizationRow> {
        sqlx::query_as::<_, OrganizationRow>(
            r#"
            INSERT INTO organizations (external_id, login, url, credential_ref)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (external_id) DO UPDATE
                SET login = EXCLUDED.login,
                    url = EXCLUDED.url,
                    credential_ref = COALESCE(EXCLUDED.credential_ref, organizations.credential_ref)
            RETURNING id, external_id, login, url, credential_ref
            "#,
        )
        .bind(org.external_id)
        .bind(org.login)
        .bind(org.url)
        .bind(org.credential_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    async fn get_by_login(&self, login: &str) -> Result<Option<OrganizationRow>> {
        sqlx::query_as::<_, OrganizationRow>(
            r#"
            SELECT id, external_id, login, url, credential_ref
            FROM organizations
            WHERE lower(login) = lower($1)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    async fn list(&self) -> Result<Vec<OrganizationRow>> {
        sqlx::query_as::<_, OrganizationRow>(
            r#"
            SELECT id, external_id, login, url, credential_ref
            FROM organizations
            ORDER BY login
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }
}

#[derive(Clone)]
struct PgRepoRepository {
    pool: PgPool,
}

#[async_trait]
impl RepoRepository for PgRepoRepository {
    #[instrument(skip(self, repo), fields(name = %repo.name))]
    async fn upsert(&self, repo: RepositoryUpsert) -> Result<RepositoryRow> {
        sqlx::query_as::<_, RepositoryRow>(
            r#"
            INSERT INTO repositories (external_id, organization_id, name, url, repo_type)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_id) DO UPDATE
                SET organization_id = EXCLUDED.organization_id,
                    name = EXCLUDED.name,
                    url = EXCLUDED.url,
                    repo_type = EXCLUDED.repo_type
            RETURNING id, external_id, organization_id, name, url, repo_type
            "#,
        )
        .bind(repo.external_id)
        .bind(repo.organization_id)
        .bind(repo.name)
        .bind(repo.url)
        .bind(repo.repo_type)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    async fn get(&self, id: i64) -> Result<Option<RepositoryRow>> {
        sqlx::query_as::<_, RepositoryRow>(
            r#"
            SELECT id, external_id, organization_id, name, url, repo_type
            FROM repositories
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    async fn list_by_organization(&self, organization_id: i64) -> Result<Vec<RepositoryRow>> {
        sqlx::query_as::<_, RepositoryRow>(
            r#"
            SELECT id, external_id, organization_id, name, url, repo_type
            FROM repositories
            WHERE organization_id = $1
            ORDER BY name
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }
}

#[derive(Clone)]
struct PgCommitRepository {
    pool: PgPool,
}

#[async_trait]
impl CommitRepository for PgCommitRepository {
    async fn upsert(&self, commit: CommitRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO commits (
                sha, repo_id, url, message, author_id, author_login, author_avatar_url,
                commit_author_name, commit_author_email, commit_author_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (sha) DO UPDATE
                SET repo_id = EXCLUDED.repo_id,
                    url = EXCLUDED.url,
                    message = EXCLUDED.message,
                    author_id = EXCLUDED.author_id,
                    author_login = EXCLUDED.author_login,
                    author_avatar_url = EXCLUDED.author_avatar_url,
                    commit_author_name = EXCLUDED.commit_author_name,
                    commit_author_email = EXCLUDED.commit_author_email,
                    commit_author_date = EXCLUDED.commit_author_date
            "#,
        )
        .bind(commit.sha)
        .bind(commit.repo_id)
        .bind(commit.url)
        .bind(commit.message)
        .bind(commit.author_id)
        .bind(commit.author_login)
        .bind(commit.author_avatar_url)
        .bind(commit.commit_author_name)
        .bind(commit.commit_author_email)
        .bind(commit.commit_author_date)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(DbError::Query)
    }

    async fn get(&self, sha: &str) -> Result<Option<CommitRow>> {
        let sql = format!("SELECT {COMMIT_COLUMNS} FROM commits c WHERE c.sha = $1");
        sqlx::query_as::<_, CommitRow>(&sql)
            .bind(sha)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &ActivityQuery) -> Result<ActivityPage<CommitRow>> {
        list_activity(
            &self.pool,
            &COMMIT_SEARCH,
            COMMIT_COLUMNS,
            "c.commit_author_date DESC NULLS LAST, c.sha",
            query,
        )
        .await
    }
}

#[derive(Clone)]
struct PgPullRequestRepository {
    pool: PgPool,
}

#[async_trait]
impl PullRequestRepository for PgPullRequestRepository {
    async fn upsert(&self, pull: PullRequestRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pull_requests (
                external_id, repo_id, number, url, state, title, user_id, user_login,
                created_on, closed_on, merged_on, merge_commit_sha,
                head_label, head_ref, head_sha, base_label, base_ref, base_sha
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (external_id) DO UPDATE
                SET repo_id = EXCLUDED.repo_id,
                    number = EXCLUDED.number,
                    url = EXCLUDED.url,
                    state = EXCLUDED.state,
                    title = EXCLUDED.title,
                    user_id = EXCLUDED.user_id,
                    user_login = EXCLUDED.user_login,
                    created_on = EXCLUDED.created_on,
                    closed_on = EXCLUDED.closed_on,
                    merged_on = EXCLUDED.merged_on,
                    merge_commit_sha = EXCLUDED.merge_commit_sha,
                    head_label = EXCLUDED.head_label,
                    head_ref = EXCLUDED.head_ref,
                    head_sha = EXCLUDED.head_sha,
                    base_label = EXCLUDED.base_label,
                    base_ref = EXCLUDED.base_ref,
                    base_sha = EXCLUDED.base_sha
            "#,
        )
        .bind(pull.external_id)
        .bind(pull.repo_id)
        .bind(pull.number)
        .bind(pull.url)
        .bind(pull.state)
        .bind(pull.title)
        .bind(pull.user_id)
        .bind(pull.user_login)
        .bind(pull.created_on)
        .bind(pull.closed_on)
        .bind(pull.merged_on)
        .bind(pull.merge_commit_sha)
        .bind(pull.head_label)
        .bind(pull.head_ref)
        .bind(pull.head_sha)
        .bind(pull.base_label)
        .bind(pull.base_ref)
        .bind(pull.base_sha)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(DbError::Query)
    }

    async fn get(&self, external_id: &str) -> Result<Option<PullRequestRow>> {
        let sql =
            format!("SELECT {PULL_REQUEST_COLUMNS} FROM pull_requests p WHERE p.external_id = $1");
        sqlx::query_as::<_, PullRequestRow>(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &ActivityQuery) -> Result<ActivityPage<PullRequestRow>> {
        list_activity(
            &self.pool,
            &PULL_REQUEST_SEARCH,
            PULL_REQUEST_COLUMNS,
            "p.created_on DESC NULLS LAST, p.external_id",
            query,
        )
        .await
    }
}

#[derive(Clone)]
struct PgIssueRepository {
    pool: PgPool,
}

#[async_trait]
impl IssueRepository for PgIssueRepository {
    async fn upsert(&self, issue: IssueRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO issues (
                external_id, repo_id, number, url, state, title, user_id, user_login,
                created_on, closed_on, closed_by_id, closed_by_login
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (external_id) DO UPDATE
                SET repo_id = EXCLUDED.repo_id,
                    number = EXCLUDED.number,
                    url = EXCLUDED.url,
                    state = EXCLUDED.state,
                    title = EXCLUDED.title,
                    user_id = EXCLUDED.user_id,
                    user_login = EXCLUDED.user_login,
                    created_on = EXCLUDED.created_on,
                    closed_on = EXCLUDED.closed_on,
                    closed_by_id = EXCLUDED.closed_by_id,
                    closed_by_login = EXCLUDED.closed_by_login
            "#,
        )
        .bind(issue.external_id)
        .bind(issue.repo_id)
        .bind(issue.number)
        .bind(issue.url)
        .bind(issue.state)
        .bind(issue.title)
        .bind(issue.user_id)
        .bind(issue.user_login)
        .bind(issue.created_on)
        .bind(issue.closed_on)
        .bind(issue.closed_by_id)
        .bind(issue.closed_by_login)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(DbError::Query)
    }

    async fn get(&self, external_id: &str) -> Result<Option<IssueRow>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues i WHERE i.external_id = $1");
        sqlx::query_as::<_, IssueRow>(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &ActivityQuery) -> Result<ActivityPage<IssueRow>> {
        list_activity(
            &self.pool,
            &ISSUE_SEARCH,
            ISSUE_COLUMNS,
            "i.created_on DESC NULLS LAST, i.external_id",
            query,
        )
        .await
    }
}

#[derive(Clone)]
struct PgSearchIndexRepository {
    pool: PgPool,
}

#[async_trait]
impl SearchIndexRepository for PgSearchIndexRepository {
    async fn ensure_search_indexes(&self) -> Result<Vec<String>> {
        let mut created = Vec::with_capacity(SEARCH_TARGETS.len());
        for target in SEARCH_TARGETS.iter() {
            sqlx::query(&target.create_index_sql())
                .execute(&self.pool)
                .await
                .map_err(DbError::Query)?;
            info!(index = target.index, table = target.table, "search index ensured");
            created.push(target.index.to_string());
        }
        Ok(created)
    }
}
