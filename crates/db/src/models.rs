use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationRow {
    pub id: i64,
    pub external_id: String,
    pub login: String,
    pub url: String,
    pub credential_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrganizationUpsert {
    pub external_id: String,
    pub login: String,
    pub url: String,
    /// Kept from the previous row when `None`.
    pub credential_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRow {
    pub id: i64,
    pub external_id: String,
    pub organization_id: i64,
    pub name: String,
    pub url: String,
    pub repo_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RepositoryUpsert {
    pub external_id: String,
    pub organization_id: i64,
    pub name: String,
    pub url: String,
    pub repo_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CommitRow {
    pub sha: String,
    pub repo_id: i64,
    pub url: String,
    pub message: String,
    pub author_id: String,
    pub author_login: String,
    pub author_avatar_url: String,
    pub commit_author_name: Option<String>,
    pub commit_author_email: Option<String>,
    pub commit_author_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRow {
    pub external_id: String,
    pub repo_id: i64,
    pub number: i64,
    pub url: String,
    pub state: String,
    pub title: String,
    pub user_id: String,
    pub user_login: String,
    pub created_on: Option<DateTime<Utc>>,
    pub closed_on: Option<DateTime<Utc>>,
    pub merged_on: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
    pub head_label: Option<String>,
    pub head_ref: Option<String>,
    pub head_sha: Option<String>,
    pub base_label: Option<String>,
    pub base_ref: Option<String>,
    pub base_sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct IssueRow {
    pub external_id: String,
    pub repo_id: i64,
    pub number: i64,
    pub url: String,
    pub state: String,
    pub title: String,
    pub user_id: String,
    pub user_login: String,
    pub created_on: Option<DateTime<Utc>>,
    pub closed_on: Option<DateTime<Utc>>,
    pub closed_by_id: Option<String>,
    pub closed_by_login: Option<String>,
}

/// Read-back filter shared by the commit, pull request and issue listings.
///
/// `organizations` accepts logins (case-insensitive) or external ids; an empty
/// list matches every organization.
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    pub organizations: Vec<String>,
    pub page: i64,
    pub page_size: i64,
    pub search: Option<String>,
}

impl ActivityQuery {
    pub fn page_size(&self) -> i64 {
        if self.page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size.min(MAX_PAGE_SIZE)
        }
    }

    pub fn offset(&self) -> i64 {
        self.checked_offset().unwrap_or(i64::MAX)
    }

    /// Row offset of the requested page, or `None` when it does not fit in an `i64`.
    pub fn checked_offset(&self) -> Option<i64> {
        (self.page.max(1) - 1).checked_mul(self.page_size())
    }

    pub fn search_terms(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn organization_keys(&self) -> Vec<String> {
        self.organizations
            .iter()
            .map(|o| o.trim().to_lowercase())
            .filter(|o| !o.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage<T> {
    pub data: Vec<T>,
    pub total_count: i64,
}
