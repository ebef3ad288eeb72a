use std::fmt;

/// An upstream GitHub REST resource the pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Organizations visible to the authenticated credential.
    UserOrgs,
    Organization {
        org: String,
    },
    OrgRepos {
        org: String,
    },
    RepoCommits {
        owner: String,
        repo: String,
    },
    RepoPulls {
        owner: String,
        repo: String,
    },
    RepoIssues {
        owner: String,
        repo: String,
    },
    IssueEvents {
        owner: String,
        repo: String,
        number: i64,
    },
}

impl Resource {
    /// Path segments relative to the API base; each is escaped when joined.
    pub fn segments(&self) -> Vec<String> {
        match self {
            Resource::UserOrgs => vec!["user".into(), "orgs".into()],
            Resource::Organization { org } => vec!["orgs".into(), org.clone()],
            Resource::OrgRepos { org } => vec!["orgs".into(), org.clone(), "repos".into()],
            Resource::RepoCommits { owner, repo } => {
                vec!["repos".into(), owner.clone(), repo.clone(), "commits".into()]
            }
            Resource::RepoPulls { owner, repo } => {
                vec!["repos".into(), owner.clone(), repo.clone(), "pulls".into()]
            }
            Resource::RepoIssues { owner, repo } => {
                vec!["repos".into(), owner.clone(), repo.clone(), "issues".into()]
            }
            Resource::IssueEvents {
                owner,
                repo,
                number,
            } => vec![
                "repos".into(),
                owner.clone(),
                repo.clone(),
                "issues".into(),
                number.to_string(),
                "events".into(),
            ],
        }
    }

    /// Query parameters sent with the first page.
    pub fn default_params(&self) -> Vec<(&'static str, String)> {
        match self {
            Resource::RepoPulls { .. } | Resource::RepoIssues { .. } => {
                vec![("state", "all".to_string())]
            }
            _ => Vec::new(),
        }
    }

    /// Short label used for metrics.
    pub fn op(&self) -> &'static str {
        match self {
            Resource::UserOrgs => "user_orgs",
            Resource::Organization { .. } => "organization",
            Resource::OrgRepos { .. } => "org_repos",
            Resource::RepoCommits { .. } => "commits",
            Resource::RepoPulls { .. } => "pulls",
            Resource::RepoIssues { .. } => "issues",
            Resource::IssueEvents { .. } => "issue_events",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments().join("/"))
    }
}
