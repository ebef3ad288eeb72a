use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

pub static RUNS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "collector_runs_total",
        "Total number of organization sync runs attempted"
    )
    .expect("collector runs total")
});

pub static RUN_SUCCESSES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "collector_run_success_total",
        "Sync runs that completed without any reported failure"
    )
    .expect("collector run successes")
});

pub static RUN_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "collector_run_failure_total",
        "Sync runs that timed out, produced no results or reported at least one failure"
    )
    .expect("collector run failures")
});

pub static LAST_RUN_TIMESTAMP: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "collector_last_run_timestamp_seconds",
        "Unix timestamp when the sync run last started"
    )
    .expect("collector last run timestamp")
});

pub static LAST_SUCCESS_TIMESTAMP: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "collector_last_success_timestamp_seconds",
        "Unix timestamp when a sync run last completed without failures"
    )
    .expect("collector last success timestamp")
});

pub static ACTIVE_REPOS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "collector_active_repositories",
        "Number of repositories currently being synced"
    )
    .expect("collector active repositories gauge")
});

pub static REPOS_PROCESSED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "collector_repositories_processed_total",
        "Repositories synced grouped by outcome",
        &["outcome"]
    )
    .expect("collector repositories processed")
});

pub static RECORDS_UPSERTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "collector_records_upserted_total",
        "Activity records persisted grouped by kind and outcome",
        &["kind", "outcome"]
    )
    .expect("collector records upserted")
});

pub static FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "collector_unit_failures_total",
        "Isolated failures reported by sync runs grouped by scope and kind",
        &["scope", "kind"]
    )
    .expect("collector unit failures")
});

pub static CHANGELOG_EVENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "collector_changelog_events_total",
        "Issue timeline events folded into user rollups"
    )
    .expect("collector changelog events")
});

pub static FETCH_PAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "collector_fetch_pages_total",
        "Listing pages fetched grouped by operation",
        &["op"]
    )
    .expect("collector fetch pages total")
});

pub static FETCH_ITEMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "collector_fetch_items_total",
        "Items returned by completed listings grouped by operation",
        &["op"]
    )
    .expect("collector fetch items total")
});

pub static RUN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "collector_run_duration_seconds",
        "Duration of sync runs in seconds",
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0]
    )
    .expect("collector run duration histogram")
});

pub static REPO_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "collector_repository_duration_seconds",
        "Duration spent syncing a repository grouped by outcome",
        &["outcome"],
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("collector repository duration histogram")
});

pub struct ActiveRepoGuard;

impl Default for ActiveRepoGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveRepoGuard {
    pub fn new() -> Self {
        ACTIVE_REPOS.inc();
        Self
    }
}

impl Drop for ActiveRepoGuard {
    fn drop(&mut self) {
        ACTIVE_REPOS.dec();
    }
}
