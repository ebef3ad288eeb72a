pub mod bootstrap;
pub mod changelog;
pub mod client;
pub mod failure;
pub mod index;
pub mod metrics;
pub mod paginate;
pub mod resource;
pub mod service;
pub mod stats;
pub mod upsert;

pub use bootstrap::collector_from_config;
pub use changelog::ChangelogEnricher;
pub use client::{BrokerGithubClient, GithubApiError, GithubClient, Page};
pub use failure::{FailureKind, FailureScope, SyncError, UnitFailure};
pub use index::SearchIndexManager;
pub use paginate::{collect_all, collect_all_as, Decoded};
pub use resource::Resource;
pub use service::{Collector, OrgSync, RawSyncReport, SyncReport};
pub use stats::{StatsAccumulator, UserStatEntry};
pub use upsert::{EntityUpserter, RepoTarget, StreamOutcome};
