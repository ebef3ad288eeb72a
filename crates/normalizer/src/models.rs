use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_USER_ID: &str = "-";
pub const PLACEHOLDER_USER_LOGIN: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub login: String,
    pub avatar_url: String,
}

impl UserIdentity {
    /// Identity recorded for records whose author is absent upstream.
    pub fn placeholder() -> Self {
        Self {
            id: PLACEHOLDER_USER_ID.to_string(),
            login: PLACEHOLDER_USER_LOGIN.to_string(),
            avatar_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BranchDescriptor {
    pub label: Option<String>,
    pub git_ref: Option<String>,
    pub sha: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedOrganization {
    pub external_id: String,
    pub login: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRepository {
    pub external_id: String,
    pub name: String,
    pub url: String,
    pub repo_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedCommit {
    pub sha: String,
    pub repo_id: i64,
    pub url: String,
    pub message: String,
    pub author: UserIdentity,
    pub commit_author_name: Option<String>,
    pub commit_author_email: Option<String>,
    pub commit_author_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPullRequest {
    pub external_id: String,
    pub repo_id: i64,
    pub number: i64,
    pub url: String,
    pub state: String,
    pub title: String,
    pub author: UserIdentity,
    pub created_on: Option<DateTime<Utc>>,
    pub closed_on: Option<DateTime<Utc>>,
    pub merged_on: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
    pub head: BranchDescriptor,
    pub base: BranchDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedIssue {
    pub external_id: String,
    pub repo_id: i64,
    pub number: i64,
    pub url: String,
    pub state: String,
    pub title: String,
    pub author: UserIdentity,
    pub created_on: Option<DateTime<Utc>>,
    pub closed_on: Option<DateTime<Utc>>,
    pub closed_by: Option<UserIdentity>,
}

/// One persisted activity record, tagged by kind when serialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedRecord {
    Commit(NormalizedCommit),
    PullRequest(NormalizedPullRequest),
    Issue(NormalizedIssue),
}

impl NormalizedRecord {
    pub fn author(&self) -> &UserIdentity {
        match self {
            NormalizedRecord::Commit(c) => &c.author,
            NormalizedRecord::PullRequest(pr) => &pr.author,
            NormalizedRecord::Issue(issue) => &issue.author,
        }
    }

    pub fn repo_id(&self) -> i64 {
        match self {
            NormalizedRecord::Commit(c) => c.repo_id,
            NormalizedRecord::PullRequest(pr) => pr.repo_id,
            NormalizedRecord::Issue(issue) => issue.repo_id,
        }
    }
}
