use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{
    ActivityPage, ActivityQuery, CommitRow, IssueRow, OrganizationRow, OrganizationUpsert,
    PullRequestRow, RepositoryRow, RepositoryUpsert,
};

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    /// Inserts or updates by external id and returns the stored row.
    async fn upsert(&self, org: OrganizationUpsert) -> Result<OrganizationRow>;
    async fn get_by_login(&self, login: &str) -> Result<Option<OrganizationRow>>;
    async fn list(&self) -> Result<Vec<OrganizationRow>>;
}

#[async_trait]
pub trait RepoRepository: Send + Sync {
    /// Inserts or updates by external id and returns the stored row.
    async fn upsert(&self, repo: RepositoryUpsert) -> Result<RepositoryRow>;
    async fn get(&self, id: i64) -> Result<Option<RepositoryRow>>;
    async fn list_by_organization(&self, organization_id: i64) -> Result<Vec<RepositoryRow>>;
}

#[async_trait]
pub trait CommitRepository: Send + Sync {
    async fn upsert(&self, commit: CommitRow) -> Result<()>;
    async fn get(&self, sha: &str) -> Result<Option<CommitRow>>;
    async fn list(&self, query: &ActivityQuery) -> Result<ActivityPage<CommitRow>>;
}

#[async_trait]
pub trait PullRequestRepository: Send + Sync {
    async fn upsert(&self, pull: PullRequestRow) -> Result<()>;
    async fn get(&self, external_id: &str) -> Result<Option<PullRequestRow>>;
    async fn list(&self, query: &ActivityQuery) -> Result<ActivityPage<PullRequestRow>>;
}

#[async_trait]
pub trait IssueRepository: Send + Sync {
    async fn upsert(&self, issue: IssueRow) -> Result<()>;
    async fn get(&self, external_id: &str) -> Result<Option<IssueRow>>;
    async fn list(&self, query: &ActivityQuery) -> Result<ActivityPage<IssueRow>>;
}

#[async_trait]
pub trait SearchIndexRepository: Send + Sync {
    /// Creates any missing full-text indexes and returns the index names.
    async fn ensure_search_indexes(&self) -> Result<Vec<String>>;
}

pub trait Repositories: Send + Sync {
    fn organizations(&self) -> &dyn OrganizationRepository;
    fn repos(&self) -> &dyn RepoRepository;
    fn commits(&self) -> &dyn CommitRepository;
    fn pull_requests(&self) -> &dyn PullRequestRepository;
    fn issues(&self) -> &dyn IssueRepository;
    fn search_indexes(&self) -> &dyn SearchIndexRepository;
}
