use std::sync::Arc;

use anyhow::{anyhow, Result};
use normalizer::NormalizedIssue;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::client::GithubClient;
use crate::failure::{FailureScope, UnitFailure};
use crate::metrics;
use crate::paginate::collect_all;
use crate::resource::Resource;
use crate::stats::StatsAccumulator;
use crate::upsert::RepoTarget;

/// Counts the event timeline of every issue in a repository and credits the
/// count to the issue author.
pub struct ChangelogEnricher<C: GithubClient + ?Sized + 'static> {
    client: Arc<C>,
    per_page: u32,
    concurrency: usize,
}

impl<C: GithubClient + ?Sized + 'static> ChangelogEnricher<C> {
    pub fn new(client: Arc<C>, per_page: u32, concurrency: usize) -> Self {
        Self {
            client,
            per_page,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetches every timeline with at most `concurrency` in flight, then folds
    /// the counts into `stats` in issue order. A timeline that cannot be
    /// fetched contributes nothing and is reported.
    #[instrument(skip(self, issues, stats), fields(repo = %target, issues = issues.len()))]
    pub async fn enrich(
        &self,
        target: &RepoTarget,
        issues: &[NormalizedIssue],
        stats: &mut StatsAccumulator,
    ) -> Vec<UnitFailure> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<(usize, Result<u64>)> = JoinSet::new();

        for (position, issue) in issues.iter().enumerate() {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let per_page = self.per_page;
            let resource = Resource::IssueEvents {
                owner: target.owner.clone(),
                repo: target.name.clone(),
                number: issue.number,
            };

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (position, Err(anyhow!("Semaphore closed unexpectedly"))),
                };
                let events = collect_all(client.as_ref(), &resource, per_page)
                    .await
                    .map(|events| events.len() as u64);
                (position, events)
            });
        }

        let mut counts: Vec<Option<Result<u64>>> = (0..issues.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, result)) => counts[position] = Some(result),
                Err(err) => warn!(error = %err, "timeline task failed"),
            }
        }

        let mut failures = Vec::new();
        for (issue, count) in issues.iter().zip(counts) {
            let unit = format!("{target} issue #{}", issue.number);
            match count {
                Some(Ok(events)) => {
                    stats.add_changelog(&issue.author, events);
                    metrics::CHANGELOG_EVENTS_TOTAL.inc_by(events);
                    debug!(number = issue.number, events, "timeline counted");
                }
                Some(Err(err)) => {
                    stats.add_changelog(&issue.author, 0);
                    warn!(unit = %unit, error = ?err, "failed to fetch issue timeline");
                    failures.push(UnitFailure::from_error(FailureScope::Issue, unit, &err));
                }
                None => {
                    stats.add_changelog(&issue.author, 0);
                    let err = anyhow!("timeline task did not complete");
                    failures.push(UnitFailure::from_error(FailureScope::Issue, unit, &err));
                }
            }
        }
        failures
    }
}
