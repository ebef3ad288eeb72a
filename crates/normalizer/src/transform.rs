use crate::models::{
    BranchDescriptor, NormalizedCommit, NormalizedIssue, NormalizedOrganization,
    NormalizedPullRequest, NormalizedRepository, UserIdentity,
};
use crate::payloads::{
    BranchRef, CommitPayload, IssuePayload, OrgPayload, PullRequestPayload, RepoPayload, UserRef,
};

/// Missing user objects, ids or logins fall back to the placeholder values.
pub fn normalize_user(user: Option<&UserRef>) -> UserIdentity {
    let placeholder = UserIdentity::placeholder();
    match user {
        None => placeholder,
        Some(user) => UserIdentity {
            id: user.id.map(|id| id.to_string()).unwrap_or(placeholder.id),
            login: user.login.clone().unwrap_or(placeholder.login),
            avatar_url: user.avatar_url.clone().unwrap_or_default(),
        },
    }
}

fn normalize_branch(branch: Option<&BranchRef>) -> BranchDescriptor {
    branch
        .map(|b| BranchDescriptor {
            label: b.label.clone(),
            git_ref: b.git_ref.clone(),
            sha: b.sha.clone(),
        })
        .unwrap_or_default()
}

pub fn normalize_org(payload: &OrgPayload) -> NormalizedOrganization {
    NormalizedOrganization {
        external_id: payload.id.to_string(),
        login: payload.login.clone(),
        url: payload.url.clone().unwrap_or_default(),
    }
}

pub fn normalize_repo(payload: &RepoPayload) -> NormalizedRepository {
    NormalizedRepository {
        external_id: payload.id.to_string(),
        name: payload.name.clone(),
        url: payload
            .url
            .clone()
            .or_else(|| payload.html_url.clone())
            .unwrap_or_default(),
        repo_type: payload
            .repo_type
            .clone()
            .or_else(|| payload.visibility.clone()),
    }
}

pub fn normalize_commit(payload: &CommitPayload, repo_id: i64) -> NormalizedCommit {
    let detail = payload.commit.clone().unwrap_or_default();
    let signature = detail.author.unwrap_or_default();
    NormalizedCommit {
        sha: payload.sha.clone(),
        repo_id,
        url: payload.url.clone().unwrap_or_default(),
        message: detail.message.unwrap_or_default(),
        author: normalize_user(payload.author.as_ref()),
        commit_author_name: signature.name,
        commit_author_email: signature.email,
        commit_author_date: signature.date,
    }
}

pub fn normalize_pull_request(payload: &PullRequestPayload, repo_id: i64) -> NormalizedPullRequest {
    NormalizedPullRequest {
        external_id: payload.id.to_string(),
        repo_id,
        number: payload.number,
        url: payload.url.clone().unwrap_or_default(),
        state: payload.state.clone().unwrap_or_default(),
        title: payload.title.clone().unwrap_or_default(),
        author: normalize_user(payload.user.as_ref()),
        created_on: payload.created_at,
        closed_on: payload.closed_at,
        merged_on: payload.merged_at,
        merge_commit_sha: payload.merge_commit_sha.clone(),
        head: normalize_branch(payload.head.as_ref()),
        base: normalize_branch(payload.base.as_ref()),
    }
}

/// Returns `None` for the issue-side view of a pull request; those are
/// persisted through the pull request stream only.
pub fn normalize_issue(payload: &IssuePayload, repo_id: i64) -> Option<NormalizedIssue> {
    if payload.is_pull_request() {
        return None;
    }
    Some(NormalizedIssue {
        external_id: payload.id.to_string(),
        repo_id,
        number: payload.number,
        url: payload.url.clone().unwrap_or_default(),
        state: payload.state.clone().unwrap_or_default(),
        title: payload.title.clone().unwrap_or_default(),
        author: normalize_user(payload.user.as_ref()),
        created_on: payload.created_at,
        closed_on: payload.closed_at,
        closed_by: payload.closed_by.as_ref().map(|u| normalize_user(Some(u))),
    })
}
