pub mod models;
pub mod payloads;
pub mod transform;

pub use models::{
    BranchDescriptor, NormalizedCommit, NormalizedIssue, NormalizedOrganization,
    NormalizedPullRequest, NormalizedRecord, NormalizedRepository, UserIdentity, PLACEHOLDER_USER_ID,
    PLACEHOLDER_USER_LOGIN,
};
pub use payloads::{
    CommitPayload, IssuePayload, OrgPayload, PullRequestPayload, RepoPayload, UserRef,
};
pub use transform::{
    normalize_commit, normalize_issue, normalize_org, normalize_pull_request, normalize_repo,
    normalize_user,
};
