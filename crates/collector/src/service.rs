use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use common::config::CollectorConfig;
use db::models::{OrganizationRow, OrganizationUpsert, RepositoryUpsert};
use db::Repositories;
use normalizer::{normalize_org, normalize_repo, NormalizedRecord, OrgPayload, RepoPayload};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::changelog::ChangelogEnricher;
use crate::client::GithubClient;
use crate::failure::{FailureKind, FailureScope, SyncError, UnitFailure};
use crate::metrics::{self, ActiveRepoGuard};
use crate::paginate::collect_all_as;
use crate::resource::Resource;
use crate::stats::{StatsAccumulator, UserStatEntry};
use crate::upsert::{EntityUpserter, RepoTarget};

/// Per-user rollups of one run plus everything that was skipped on the way.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub users: Vec<UserStatEntry>,
    pub failures: Vec<UnitFailure>,
}

/// Every normalized record of one run, without timeline enrichment.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSyncReport {
    pub records: Vec<NormalizedRecord>,
    pub failures: Vec<UnitFailure>,
}

/// Entry points used by the HTTP surface, independent of the client type.
#[async_trait]
pub trait OrgSync: Send + Sync {
    async fn sync_organizations(&self, org_ids: &[String]) -> Result<SyncReport, SyncError>;
    async fn sync_organizations_raw(&self, org_ids: &[String])
        -> Result<RawSyncReport, SyncError>;
    async fn sync_user_organizations(&self) -> Result<Vec<OrganizationRow>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Rollup,
    Raw,
}

struct RunState {
    stats: StatsAccumulator,
    records: Option<Vec<NormalizedRecord>>,
    failures: Vec<UnitFailure>,
    synced_orgs: usize,
}

impl RunState {
    fn new(mode: RunMode) -> Self {
        Self {
            stats: StatsAccumulator::new(),
            records: match mode {
                RunMode::Raw => Some(Vec::new()),
                RunMode::Rollup => None,
            },
            failures: Vec::new(),
            synced_orgs: 0,
        }
    }

    fn push(&mut self, record: NormalizedRecord) {
        self.stats.record(&record);
        if let Some(records) = self.records.as_mut() {
            records.push(record);
        }
    }

    fn fail(&mut self, failure: UnitFailure) {
        metrics::FAILURES_TOTAL
            .with_label_values(&[failure.scope.as_str(), failure.kind.as_str()])
            .inc();
        self.failures.push(failure);
    }
}

pub struct Collector<C: GithubClient + ?Sized + 'static> {
    config: CollectorConfig,
    client: Arc<C>,
    repos: Arc<dyn Repositories>,
    upserter: EntityUpserter<C>,
    enricher: ChangelogEnricher<C>,
    credential_ref: Option<String>,
}

impl<C: GithubClient + ?Sized + 'static> Collector<C> {
    pub fn new(config: CollectorConfig, client: Arc<C>, repos: Arc<dyn Repositories>) -> Self {
        let upserter = EntityUpserter::new(
            client.clone(),
            repos.clone(),
            config.page_size,
            config.upsert_concurrency,
        );
        let enricher =
            ChangelogEnricher::new(client.clone(), config.page_size, config.changelog_concurrency);
        Self {
            config,
            client,
            repos,
            upserter,
            enricher,
            credential_ref: None,
        }
    }

    /// Id of the token the client authenticates with; stored on organizations
    /// found through discovery.
    pub fn with_credential_ref(mut self, credential_ref: impl Into<String>) -> Self {
        self.credential_ref = Some(credential_ref.into());
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<()> {
        loop {
            if let Err(err) = self.run_once().await {
                if self.config.run_once {
                    return Err(err);
                }
                error!(error = ?err, "collector run failed");
            }
            if self.config.run_once {
                break;
            }
            sleep(Duration::from_secs(self.config.interval_secs)).await;
        }
        Ok(())
    }

    /// Syncs the configured organizations, or every organization visible to
    /// the credential when none are configured, and logs the rollups.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<SyncReport> {
        metrics::RUNS_TOTAL.inc();
        metrics::LAST_RUN_TIMESTAMP.set(Utc::now().timestamp());
        let _timer = metrics::RUN_DURATION.start_timer();

        let organizations = if self.config.organizations.is_empty() {
            match self.sync_user_organizations().await {
                Ok(rows) => rows.into_iter().map(|row| row.login).collect(),
                Err(err) => {
                    metrics::RUN_FAILURES_TOTAL.inc();
                    return Err(err.context("discovering organizations"));
                }
            }
        } else {
            self.config.organizations.clone()
        };
        info!(count = organizations.len(), "syncing organizations");

        let report = match self.sync_organizations(&organizations).await {
            Ok(report) => report,
            Err(err) => {
                metrics::RUN_FAILURES_TOTAL.inc();
                return Err(err.into());
            }
        };

        for user in &report.users {
            info!(
                user = %user.user,
                user_id = %user.user_id,
                commits = user.total_commits,
                pull_requests = user.total_prs,
                issues = user.total_issues,
                changelogs = user.changelogs,
                "user activity"
            );
        }
        if report.failures.is_empty() {
            metrics::RUN_SUCCESSES_TOTAL.inc();
            metrics::LAST_SUCCESS_TIMESTAMP.set(Utc::now().timestamp());
        } else {
            metrics::RUN_FAILURES_TOTAL.inc();
            warn!(failures = report.failures.len(), "run finished with failures");
        }
        Ok(report)
    }

    /// Syncs every requested organization and returns per-user rollups,
    /// including issue timeline counts.
    #[instrument(skip(self))]
    pub async fn sync_organizations(&self, org_ids: &[String]) -> Result<SyncReport, SyncError> {
        let state = self.execute(org_ids, RunMode::Rollup).await?;
        Ok(SyncReport {
            users: state.stats.into_entries(),
            failures: state.failures,
        })
    }

    /// Same traversal as [`Collector::sync_organizations`] but returns the
    /// normalized records themselves and skips timeline enrichment.
    #[instrument(skip(self))]
    pub async fn sync_organizations_raw(
        &self,
        org_ids: &[String],
    ) -> Result<RawSyncReport, SyncError> {
        let state = self.execute(org_ids, RunMode::Raw).await?;
        Ok(RawSyncReport {
            records: state.records.unwrap_or_default(),
            failures: state.failures,
        })
    }

    /// Lists the organizations the credential belongs to and records them.
    #[instrument(skip(self))]
    pub async fn sync_user_organizations(&self) -> Result<Vec<OrganizationRow>> {
        let decoded = collect_all_as::<OrgPayload, _>(
            self.client.as_ref(),
            &Resource::UserOrgs,
            self.config.page_size,
        )
        .await?;

        let mut rows = Vec::with_capacity(decoded.items.len());
        for payload in &decoded.items {
            let org = normalize_org(payload);
            let row = self
                .repos
                .organizations()
                .upsert(OrganizationUpsert {
                    external_id: org.external_id,
                    login: org.login,
                    url: org.url,
                    credential_ref: self.credential_ref.clone(),
                })
                .await
                .with_context(|| format!("upserting organization {}", payload.login))?;
            rows.push(row);
        }
        info!(
            count = rows.len(),
            skipped = decoded.rejected.len(),
            "discovered organizations"
        );
        Ok(rows)
    }

    async fn execute(&self, org_ids: &[String], mode: RunMode) -> Result<RunState, SyncError> {
        let traversal = self.traverse(org_ids, mode);
        let state = match self.config.run_timeout_secs {
            Some(secs) => {
                let limit = Duration::from_secs(secs);
                tokio::time::timeout(limit, traversal).await.map_err(|_| {
                    warn!(?limit, "sync run timed out");
                    SyncError::TimedOut(limit)
                })?
            }
            None => traversal.await,
        };

        if !org_ids.is_empty() && state.synced_orgs == 0 {
            return Err(SyncError::NoResults {
                failures: state.failures,
            });
        }
        Ok(state)
    }

    async fn traverse(&self, org_ids: &[String], mode: RunMode) -> RunState {
        let mut state = RunState::new(mode);
        for org in org_ids {
            match self.sync_org(org, mode, &mut state).await {
                Ok(()) => state.synced_orgs += 1,
                Err(err) => {
                    warn!(org = %org, error = ?err, "failed to sync organization");
                    state.fail(UnitFailure::from_error(FailureScope::Organization, org, &err));
                }
            }
        }
        state
    }

    #[instrument(skip(self, mode, state))]
    async fn sync_org(&self, org: &str, mode: RunMode, state: &mut RunState) -> Result<()> {
        let value = self
            .client
            .get(&Resource::Organization { org: org.to_string() })
            .await
            .with_context(|| format!("fetching organization {org}"))?;
        let payload: OrgPayload = serde_json::from_value(value)
            .with_context(|| format!("decoding organization {org}"))?;
        let normalized = normalize_org(&payload);
        let org_row = self
            .repos
            .organizations()
            .upsert(OrganizationUpsert {
                external_id: normalized.external_id,
                login: normalized.login,
                url: normalized.url,
                credential_ref: None,
            })
            .await
            .with_context(|| format!("upserting organization {org}"))?;

        let listing = collect_all_as::<RepoPayload, _>(
            self.client.as_ref(),
            &Resource::OrgRepos {
                org: org_row.login.clone(),
            },
            self.config.page_size,
        )
        .await?;
        for rejected in &listing.rejected {
            state.fail(UnitFailure::new(
                FailureScope::Repository,
                FailureKind::DataShape,
                format!("{} repository item {}", org_row.login, rejected.position),
                rejected.reason.clone(),
            ));
        }
        info!(org = %org_row.login, repositories = listing.items.len(), "syncing organization");

        for payload in &listing.items {
            self.sync_repo(&org_row, payload, mode, state).await;
        }
        Ok(())
    }

    async fn sync_repo(
        &self,
        org: &OrganizationRow,
        payload: &RepoPayload,
        mode: RunMode,
        state: &mut RunState,
    ) {
        let started = Instant::now();
        let _active = ActiveRepoGuard::new();
        let failures_before = state.failures.len();

        let normalized = normalize_repo(payload);
        let repo_row = match self
            .repos
            .repos()
            .upsert(RepositoryUpsert {
                external_id: normalized.external_id,
                organization_id: org.id,
                name: normalized.name,
                url: normalized.url,
                repo_type: normalized.repo_type,
            })
            .await
        {
            Ok(row) => row,
            Err(err) => {
                let unit = format!("{}/{}", org.login, payload.name);
                warn!(repo = %unit, error = %err, "failed to persist repository");
                state.fail(UnitFailure::from_error(
                    FailureScope::Repository,
                    unit,
                    &anyhow::Error::new(err),
                ));
                observe_repo(started, "error");
                return;
            }
        };

        let target = RepoTarget {
            owner: org.login.clone(),
            name: repo_row.name.clone(),
            repo_id: repo_row.id,
        };
        info!(repo = %target, "syncing repository");

        match self.upserter.sync_commits(&target).await {
            Ok(outcome) => {
                outcome.failures.into_iter().for_each(|f| state.fail(f));
                for commit in outcome.records {
                    state.push(NormalizedRecord::Commit(commit));
                }
            }
            Err(err) => stream_failed(state, &target, "commits", &err),
        }

        match self.upserter.sync_pull_requests(&target).await {
            Ok(outcome) => {
                outcome.failures.into_iter().for_each(|f| state.fail(f));
                for pr in outcome.records {
                    state.push(NormalizedRecord::PullRequest(pr));
                }
            }
            Err(err) => stream_failed(state, &target, "pull requests", &err),
        }

        match self.upserter.sync_issues(&target).await {
            Ok(outcome) => {
                outcome.failures.into_iter().for_each(|f| state.fail(f));
                for issue in &outcome.records {
                    state.push(NormalizedRecord::Issue(issue.clone()));
                }
                if mode == RunMode::Rollup {
                    let failures = self
                        .enricher
                        .enrich(&target, &outcome.records, &mut state.stats)
                        .await;
                    failures.into_iter().for_each(|f| state.fail(f));
                }
            }
            Err(err) => stream_failed(state, &target, "issues", &err),
        }

        let outcome = if state.failures.len() == failures_before {
            "success"
        } else {
            "partial"
        };
        observe_repo(started, outcome);
    }
}

fn stream_failed(state: &mut RunState, target: &RepoTarget, stream: &str, err: &anyhow::Error) {
    warn!(repo = %target, stream, error = ?err, "failed to sync stream");
    state.fail(UnitFailure::from_error(
        FailureScope::Stream,
        format!("{target} {stream}"),
        err,
    ));
}

fn observe_repo(started: Instant, outcome: &str) {
    metrics::REPOS_PROCESSED_TOTAL
        .with_label_values(&[outcome])
        .inc();
    metrics::REPO_DURATION
        .with_label_values(&[outcome])
        .observe(started.elapsed().as_secs_f64());
}

#[async_trait]
impl<C: GithubClient + ?Sized + 'static> OrgSync for Collector<C> {
    async fn sync_organizations(&self, org_ids: &[String]) -> Result<SyncReport, SyncError> {
        Collector::sync_organizations(self, org_ids).await
    }

    async fn sync_organizations_raw(
        &self,
        org_ids: &[String],
    ) -> Result<RawSyncReport, SyncError> {
        Collector::sync_organizations_raw(self, org_ids).await
    }

    async fn sync_user_organizations(&self) -> Result<Vec<OrganizationRow>> {
        Collector::sync_user_organizations(self).await
    }
}
