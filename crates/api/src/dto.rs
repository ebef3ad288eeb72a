use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use db::models::{
    ActivityPage, ActivityQuery, CommitRow, IssueRow, OrganizationRow, PullRequestRow,
    RepositoryRow, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

use crate::error::{ApiError, ApiResult};

/// Query string shared by the activity listings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityParams {
    /// Comma-separated organization logins or external ids.
    pub org_ids: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
}

impl ActivityParams {
    pub fn into_query(self) -> ApiResult<ActivityQuery> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(ApiError::bad_request("page must be at least 1"));
        }
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size < 1 {
            return Err(ApiError::bad_request("pageSize must be at least 1"));
        }
        let query = ActivityQuery {
            organizations: self.org_ids.as_deref().map(split_org_ids).unwrap_or_default(),
            page,
            page_size: page_size.min(MAX_PAGE_SIZE),
            search: self.search,
        };
        if query.checked_offset().is_none() {
            return Err(ApiError::bad_request("page is out of range"));
        }
        Ok(query)
    }
}

pub fn split_org_ids(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub org_ids: Vec<String>,
}

impl SyncRequest {
    pub fn organizations(self) -> ApiResult<Vec<String>> {
        let orgs: Vec<String> = self
            .org_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if orgs.is_empty() {
            return Err(ApiError::bad_request("orgIds must name at least one organization"));
        }
        Ok(orgs)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDto<T> {
    pub data: Vec<T>,
    pub total_count: i64,
}

impl<R, T: From<R>> From<ActivityPage<R>> for PageDto<T> {
    fn from(page: ActivityPage<R>) -> Self {
        Self {
            data: page.data.into_iter().map(T::from).collect(),
            total_count: page.total_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDto {
    pub id: i64,
    pub external_id: String,
    pub login: String,
    pub url: String,
    pub credential_ref: Option<String>,
}

impl From<OrganizationRow> for OrganizationDto {
    fn from(row: OrganizationRow) -> Self {
        Self {
            id: row.id,
            external_id: row.external_id,
            login: row.login,
            url: row.url,
            credential_ref: row.credential_ref,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDto {
    pub id: i64,
    pub external_id: String,
    pub organization_id: i64,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub repo_type: Option<String>,
}

impl From<RepositoryRow> for RepositoryDto {
    fn from(row: RepositoryRow) -> Self {
        Self {
            id: row.id,
            external_id: row.external_id,
            organization_id: row.organization_id,
            name: row.name,
            url: row.url,
            repo_type: row.repo_type,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRefDto {
    pub id: String,
    pub login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitAuthorDto {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDto {
    pub sha: String,
    pub repo_id: i64,
    pub url: String,
    pub message: String,
    pub author: UserRefDto,
    pub commit_author: CommitAuthorDto,
}

impl From<CommitRow> for CommitDto {
    fn from(row: CommitRow) -> Self {
        Self {
            sha: row.sha,
            repo_id: row.repo_id,
            url: row.url,
            message: row.message,
            author: UserRefDto {
                id: row.author_id,
                login: row.author_login,
                avatar_url: Some(row.author_avatar_url),
            },
            commit_author: CommitAuthorDto {
                name: row.commit_author_name,
                email: row.commit_author_email,
                date: row.commit_author_date,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDto {
    pub label: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub sha: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestDto {
    pub external_id: String,
    pub repo_id: i64,
    pub number: i64,
    pub url: String,
    pub state: String,
    pub title: String,
    pub user: UserRefDto,
    pub created_on: Option<DateTime<Utc>>,
    pub closed_on: Option<DateTime<Utc>>,
    pub merged_on: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
    pub head: BranchDto,
    pub base: BranchDto,
}

impl From<PullRequestRow> for PullRequestDto {
    fn from(row: PullRequestRow) -> Self {
        Self {
            external_id: row.external_id,
            repo_id: row.repo_id,
            number: row.number,
            url: row.url,
            state: row.state,
            title: row.title,
            user: UserRefDto {
                id: row.user_id,
                login: row.user_login,
                avatar_url: None,
            },
            created_on: row.created_on,
            closed_on: row.closed_on,
            merged_on: row.merged_on,
            merge_commit_sha: row.merge_commit_sha,
            head: BranchDto {
                label: row.head_label,
                git_ref: row.head_ref,
                sha: row.head_sha,
            },
            base: BranchDto {
                label: row.base_label,
                git_ref: row.base_ref,
                sha: row.base_sha,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDto {
    pub external_id: String,
    pub repo_id: i64,
    pub number: i64,
    pub url: String,
    pub state: String,
    pub title: String,
    pub user: UserRefDto,
    pub created_on: Option<DateTime<Utc>>,
    pub closed_on: Option<DateTime<Utc>>,
    pub closed_by: Option<UserRefDto>,
}

impl From<IssueRow> for IssueDto {
    fn from(row: IssueRow) -> Self {
        let closed_by = match (row.closed_by_id, row.closed_by_login) {
            (Some(id), Some(login)) => Some(UserRefDto {
                id,
                login,
                avatar_url: None,
            }),
            _ => None,
        };
        Self {
            external_id: row.external_id,
            repo_id: row.repo_id,
            number: row.number,
            url: row.url,
            state: row.state,
            title: row.title,
            user: UserRefDto {
                id: row.user_id,
                login: row.user_login,
                avatar_url: None,
            },
            created_on: row.created_on,
            closed_on: row.closed_on,
            closed_by,
        }
    }
}
