use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use db::models::{CommitRow, IssueRow, PullRequestRow};
use db::Repositories;
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};
use normalizer::{
    normalize_commit, normalize_issue, normalize_pull_request, CommitPayload, IssuePayload,
    NormalizedCommit, NormalizedIssue, NormalizedPullRequest, PullRequestPayload,
};
use tracing::{debug, instrument, warn};

use crate::client::GithubClient;
use crate::failure::{FailureKind, FailureScope, UnitFailure};
use crate::metrics;
use crate::paginate::{collect_all_as, Rejected};
use crate::resource::Resource;

/// A persisted repository whose activity streams are being synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    pub owner: String,
    pub name: String,
    pub repo_id: i64,
}

impl fmt::Display for RepoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Normalized records of one stream plus the records that were skipped.
#[derive(Debug)]
pub struct StreamOutcome<T> {
    pub records: Vec<T>,
    pub failures: Vec<UnitFailure>,
}

pub struct EntityUpserter<C: GithubClient + ?Sized> {
    client: Arc<C>,
    repos: Arc<dyn Repositories>,
    per_page: u32,
    concurrency: usize,
}

impl<C: GithubClient + ?Sized> EntityUpserter<C> {
    pub fn new(
        client: Arc<C>,
        repos: Arc<dyn Repositories>,
        per_page: u32,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            repos,
            per_page,
            concurrency: concurrency.max(1),
        }
    }

    #[instrument(skip(self), fields(repo = %target))]
    pub async fn sync_commits(&self, target: &RepoTarget) -> Result<StreamOutcome<NormalizedCommit>> {
        let resource = Resource::RepoCommits {
            owner: target.owner.clone(),
            repo: target.name.clone(),
        };
        let decoded =
            collect_all_as::<CommitPayload, _>(self.client.as_ref(), &resource, self.per_page)
                .await?;
        let mut failures = rejected_failures(target, "commit", &decoded.rejected);

        let records: Vec<NormalizedCommit> = decoded
            .items
            .iter()
            .map(|payload| normalize_commit(payload, target.repo_id))
            .collect();

        failures.extend(
            self.persist(target, "commit", &records, |c| c.sha.as_str(), |store, commit| {
                let row = commit_row(commit);
                async move { store.commits().upsert(row).await }.boxed()
            })
            .await,
        );
        Ok(StreamOutcome { records, failures })
    }

    #[instrument(skip(self), fields(repo = %target))]
    pub async fn sync_pull_requests(
        &self,
        target: &RepoTarget,
    ) -> Result<StreamOutcome<NormalizedPullRequest>> {
        let resource = Resource::RepoPulls {
            owner: target.owner.clone(),
            repo: target.name.clone(),
        };
        let decoded = collect_all_as::<PullRequestPayload, _>(
            self.client.as_ref(),
            &resource,
            self.per_page,
        )
        .await?;
        let mut failures = rejected_failures(target, "pull_request", &decoded.rejected);

        let records: Vec<NormalizedPullRequest> = decoded
            .items
            .iter()
            .map(|payload| normalize_pull_request(payload, target.repo_id))
            .collect();

        failures.extend(
            self.persist(
                target,
                "pull_request",
                &records,
                |pr| pr.external_id.as_str(),
                |store, pr| {
                    let row = pull_request_row(pr);
                    async move { store.pull_requests().upsert(row).await }.boxed()
                },
            )
            .await,
        );
        Ok(StreamOutcome { records, failures })
    }

    /// Issue listings also return pull requests; those are dropped here so
    /// they are only ever stored and counted as pull requests.
    #[instrument(skip(self), fields(repo = %target))]
    pub async fn sync_issues(&self, target: &RepoTarget) -> Result<StreamOutcome<NormalizedIssue>> {
        let resource = Resource::RepoIssues {
            owner: target.owner.clone(),
            repo: target.name.clone(),
        };
        let decoded =
            collect_all_as::<IssuePayload, _>(self.client.as_ref(), &resource, self.per_page)
                .await?;
        let mut failures = rejected_failures(target, "issue", &decoded.rejected);

        let listed = decoded.items.len();
        let records: Vec<NormalizedIssue> = decoded
            .items
            .iter()
            .filter_map(|payload| normalize_issue(payload, target.repo_id))
            .collect();
        debug!(
            listed,
            issues = records.len(),
            "dropped pull request entries from issue listing"
        );

        failures.extend(
            self.persist(
                target,
                "issue",
                &records,
                |issue| issue.external_id.as_str(),
                |store, issue| {
                    let row = issue_row(issue);
                    async move { store.issues().upsert(row).await }.boxed()
                },
            )
            .await,
        );
        Ok(StreamOutcome { records, failures })
    }

    /// Writes every record with at most `concurrency` writes in flight and
    /// waits for all of them. Failed writes are reported, never fatal.
    async fn persist<T, K, W>(
        &self,
        target: &RepoTarget,
        kind: &'static str,
        records: &[T],
        key: K,
        write: W,
    ) -> Vec<UnitFailure>
    where
        K: Fn(&T) -> &str,
        W: Fn(Arc<dyn Repositories>, &T) -> BoxFuture<'static, db::errors::Result<()>>,
    {
        let writes: Vec<BoxFuture<'static, db::errors::Result<()>>> = records
            .iter()
            .map(|record| write(self.repos.clone(), record))
            .collect();
        let results: Vec<db::errors::Result<()>> = stream::iter(writes)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut failures = Vec::new();
        for (record, result) in records.iter().zip(results) {
            match result {
                Ok(()) => {
                    metrics::RECORDS_UPSERTED_TOTAL
                        .with_label_values(&[kind, "success"])
                        .inc();
                }
                Err(err) => {
                    metrics::RECORDS_UPSERTED_TOTAL
                        .with_label_values(&[kind, "error"])
                        .inc();
                    let unit = format!("{target} {kind} {}", key(record));
                    warn!(unit = %unit, error = %err, "failed to persist record");
                    failures.push(UnitFailure::from_error(
                        FailureScope::Record,
                        unit,
                        &anyhow::Error::new(err),
                    ));
                }
            }
        }
        failures
    }
}

fn rejected_failures(target: &RepoTarget, kind: &str, rejected: &[Rejected]) -> Vec<UnitFailure> {
    rejected
        .iter()
        .map(|r| {
            UnitFailure::new(
                FailureScope::Record,
                FailureKind::DataShape,
                format!("{target} {kind} item {}", r.position),
                r.reason.clone(),
            )
        })
        .collect()
}

pub fn commit_row(commit: &NormalizedCommit) -> CommitRow {
    CommitRow {
        sha: commit.sha.clone(),
        repo_id: commit.repo_id,
        url: commit.url.clone(),
        message: commit.message.clone(),
        author_id: commit.author.id.clone(),
        author_login: commit.author.login.clone(),
        author_avatar_url: commit.author.avatar_url.clone(),
        commit_author_name: commit.commit_author_name.clone(),
        commit_author_email: commit.commit_author_email.clone(),
        commit_author_date: commit.commit_author_date,
    }
}

pub fn pull_request_row(pr: &NormalizedPullRequest) -> PullRequestRow {
    PullRequestRow {
        external_id: pr.external_id.clone(),
        repo_id: pr.repo_id,
        number: pr.number,
        url: pr.url.clone(),
        state: pr.state.clone(),
        title: pr.title.clone(),
        user_id: pr.author.id.clone(),
        user_login: pr.author.login.clone(),
        created_on: pr.created_on,
        closed_on: pr.closed_on,
        merged_on: pr.merged_on,
        merge_commit_sha: pr.merge_commit_sha.clone(),
        head_label: pr.head.label.clone(),
        head_ref: pr.head.git_ref.clone(),
        head_sha: pr.head.sha.clone(),
        base_label: pr.base.label.clone(),
        base_ref: pr.base.git_ref.clone(),
        base_sha: pr.base.sha.clone(),
    }
}

pub fn issue_row(issue: &NormalizedIssue) -> IssueRow {
    IssueRow {
        external_id: issue.external_id.clone(),
        repo_id: issue.repo_id,
        number: issue.number,
        url: issue.url.clone(),
        state: issue.state.clone(),
        title: issue.title.clone(),
        user_id: issue.author.id.clone(),
        user_login: issue.author.login.clone(),
        created_on: issue.created_on,
        closed_on: issue.closed_on,
        closed_by_id: issue.closed_by.as_ref().map(|u| u.id.clone()),
        closed_by_login: issue.closed_by.as_ref().map(|u| u.login.clone()),
    }
}
