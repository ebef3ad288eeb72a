#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use collector::{GithubApiError, GithubClient, Page, Resource};
use db::errors::Result as DbResult;
use db::models::{
    ActivityPage, ActivityQuery, CommitRow, IssueRow, OrganizationRow, OrganizationUpsert,
    PullRequestRow, RepositoryRow, RepositoryUpsert,
};
use db::{
    CommitRepository, DbError, IssueRepository, OrganizationRepository, PullRequestRepository,
    RepoRepository, Repositories, SearchIndexRepository,
};
use http::StatusCode;
use serde_json::{json, Value};

const FAKE_BASE: &str = "https://api.github.test";

/// Scripted GitHub: objects for `get`, full listings that are paged by the
/// requested `per_page`, and injectable failures and delays.
#[derive(Default)]
pub struct FakeGithub {
    objects: HashMap<String, Value>,
    listings: HashMap<String, Vec<Value>>,
    failing_pages: HashMap<String, usize>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<String>>,
    active_timelines: AtomicUsize,
    max_active_timelines: AtomicUsize,
}

impl FakeGithub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, path: &str, value: Value) -> Self {
        self.objects.insert(path.to_string(), value);
        self
    }

    pub fn with_listing(mut self, path: &str, items: Vec<Value>) -> Self {
        self.listings.insert(path.to_string(), items);
        self
    }

    /// Fails the listing at `path` when page `page` (0-based) is requested.
    pub fn failing_page(mut self, path: &str, page: usize) -> Self {
        self.failing_pages.insert(path.to_string(), page);
        self
    }

    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_active_timelines(&self) -> usize {
        self.max_active_timelines.load(Ordering::SeqCst)
    }

    fn track_start(&self) {
        let current = self.active_timelines.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_timelines.fetch_max(current, Ordering::SeqCst);
    }

    fn track_end(&self) {
        self.active_timelines.fetch_sub(1, Ordering::SeqCst);
    }

    async fn pause(&self, path: &str) {
        if let Some(delay) = self.delays.get(path) {
            tokio::time::sleep(*delay).await;
        }
    }
}

fn page_index(next: Option<&str>) -> usize {
    next.and_then(|url| url.rsplit("page=").next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl GithubClient for FakeGithub {
    async fn get(&self, resource: &Resource) -> Result<Value> {
        let path = resource.to_string();
        self.requests.lock().unwrap().push(path.clone());
        self.pause(&path).await;
        match self.objects.get(&path) {
            Some(value) => Ok(value.clone()),
            None => Err(GithubApiError::status(StatusCode::NOT_FOUND, path).into()),
        }
    }

    async fn list_page(
        &self,
        resource: &Resource,
        per_page: u32,
        next: Option<&str>,
    ) -> Result<Page> {
        let path = resource.to_string();
        let index = page_index(next);
        self.requests.lock().unwrap().push(format!("{path}#{index}"));

        let timeline = matches!(resource, Resource::IssueEvents { .. });
        if timeline {
            self.track_start();
        }
        self.pause(&path).await;
        if timeline {
            self.track_end();
        }

        if self.failing_pages.get(&path) == Some(&index) {
            return Err(GithubApiError::status(StatusCode::BAD_GATEWAY, path).into());
        }

        let items = self.listings.get(&path).cloned().unwrap_or_default();
        let per_page = per_page.max(1) as usize;
        let start = index * per_page;
        let chunk: Vec<Value> = items.iter().skip(start).take(per_page).cloned().collect();
        let next = (start + per_page < items.len())
            .then(|| format!("{FAKE_BASE}{path}?per_page={per_page}&page={}", index + 1));
        Ok(Page { items: chunk, next })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub organizations: BTreeMap<String, OrganizationRow>,
    pub repositories: BTreeMap<String, RepositoryRow>,
    pub commits: BTreeMap<String, CommitRow>,
    pub pull_requests: BTreeMap<String, PullRequestRow>,
    pub issues: BTreeMap<String, IssueRow>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn org_of_repo(&self, repo_id: i64) -> Option<&OrganizationRow> {
        let repo = self.repositories.values().find(|r| r.id == repo_id)?;
        self.organizations
            .values()
            .find(|o| o.id == repo.organization_id)
    }

    fn matches(&self, repo_id: i64, query: &ActivityQuery) -> bool {
        let keys = query.organization_keys();
        if keys.is_empty() {
            return true;
        }
        self.org_of_repo(repo_id).map_or(false, |org| {
            keys.contains(&org.login.to_lowercase()) || keys.contains(&org.external_id)
        })
    }
}

fn page_of<T: Clone>(rows: Vec<T>, query: &ActivityQuery) -> ActivityPage<T> {
    let total_count = rows.len() as i64;
    let data = rows
        .into_iter()
        .skip(query.offset() as usize)
        .take(query.page_size() as usize)
        .collect();
    ActivityPage { data, total_count }
}

/// In-memory stand-in for the Postgres store with the same upsert keys.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing_commits: Mutex<HashSet<String>>,
    failing_repos: Mutex<HashSet<String>>,
    index_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_commit(&self, sha: &str) {
        self.failing_commits.lock().unwrap().insert(sha.to_string());
    }

    /// Fails every upsert of the repository with this external id.
    pub fn fail_repo(&self, external_id: &str) {
        self.failing_repos
            .lock()
            .unwrap()
            .insert(external_id.to_string());
    }

    pub fn snapshot(&self) -> Tables {
        self.tables.lock().unwrap().clone()
    }

    pub fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrganizationRepository for MemoryStore {
    async fn upsert(&self, org: OrganizationUpsert) -> DbResult<OrganizationRow> {
        let mut tables = self.tables.lock().unwrap();
        let existing = tables.organizations.get(&org.external_id).cloned();
        let row = OrganizationRow {
            id: match &existing {
                Some(row) => row.id,
                None => tables.next_id(),
            },
            external_id: org.external_id.clone(),
            login: org.login,
            url: org.url,
            credential_ref: org
                .credential_ref
                .or_else(|| existing.and_then(|row| row.credential_ref)),
        };
        tables.organizations.insert(org.external_id, row.clone());
        Ok(row)
    }

    async fn get_by_login(&self, login: &str) -> DbResult<Option<OrganizationRow>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .organizations
            .values()
            .find(|o| o.login.eq_ignore_ascii_case(login))
            .cloned())
    }

    async fn list(&self) -> DbResult<Vec<OrganizationRow>> {
        Ok(self.tables.lock().unwrap().organizations.values().cloned().collect())
    }
}

#[async_trait]
impl RepoRepository for MemoryStore {
    async fn upsert(&self, repo: RepositoryUpsert) -> DbResult<RepositoryRow> {
        if self.failing_repos.lock().unwrap().contains(&repo.external_id) {
            return Err(DbError::NotFound);
        }
        let mut tables = self.tables.lock().unwrap();
        let id = match tables.repositories.get(&repo.external_id) {
            Some(row) => row.id,
            None => tables.next_id(),
        };
        let row = RepositoryRow {
            id,
            external_id: repo.external_id.clone(),
            organization_id: repo.organization_id,
            name: repo.name,
            url: repo.url,
            repo_type: repo.repo_type,
        };
        tables.repositories.insert(repo.external_id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: i64) -> DbResult<Option<RepositoryRow>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.repositories.values().find(|r| r.id == id).cloned())
    }

    async fn list_by_organization(&self, organization_id: i64) -> DbResult<Vec<RepositoryRow>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .repositories
            .values()
            .filter(|r| r.organization_id == organization_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CommitRepository for MemoryStore {
    async fn upsert(&self, commit: CommitRow) -> DbResult<()> {
        if self.failing_commits.lock().unwrap().contains(&commit.sha) {
            return Err(DbError::NotFound);
        }
        tokio::task::yield_now().await;
        let mut tables = self.tables.lock().unwrap();
        tables.commits.insert(commit.sha.clone(), commit);
        Ok(())
    }

    async fn get(&self, sha: &str) -> DbResult<Option<CommitRow>> {
        Ok(self.tables.lock().unwrap().commits.get(sha).cloned())
    }

    async fn list(&self, query: &ActivityQuery) -> DbResult<ActivityPage<CommitRow>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .commits
            .values()
            .filter(|c| tables.matches(c.repo_id, query))
            .cloned()
            .collect();
        Ok(page_of(rows, query))
    }
}

#[async_trait]
impl PullRequestRepository for MemoryStore {
    async fn upsert(&self, pull: PullRequestRow) -> DbResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.pull_requests.insert(pull.external_id.clone(), pull);
        Ok(())
    }

    async fn get(&self, external_id: &str) -> DbResult<Option<PullRequestRow>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .pull_requests
            .get(external_id)
            .cloned())
    }

    async fn list(&self, query: &ActivityQuery) -> DbResult<ActivityPage<PullRequestRow>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .pull_requests
            .values()
            .filter(|p| tables.matches(p.repo_id, query))
            .cloned()
            .collect();
        Ok(page_of(rows, query))
    }
}

#[async_trait]
impl IssueRepository for MemoryStore {
    async fn upsert(&self, issue: IssueRow) -> DbResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.issues.insert(issue.external_id.clone(), issue);
        Ok(())
    }

    async fn get(&self, external_id: &str) -> DbResult<Option<IssueRow>> {
        Ok(self.tables.lock().unwrap().issues.get(external_id).cloned())
    }

    async fn list(&self, query: &ActivityQuery) -> DbResult<ActivityPage<IssueRow>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .issues
            .values()
            .filter(|i| tables.matches(i.repo_id, query))
            .cloned()
            .collect();
        Ok(page_of(rows, query))
    }
}

#[async_trait]
impl SearchIndexRepository for MemoryStore {
    async fn ensure_search_indexes(&self) -> DbResult<Vec<String>> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            "commits_search_idx".to_string(),
            "pull_requests_search_idx".to_string(),
            "issues_search_idx".to_string(),
        ])
    }
}

impl Repositories for MemoryStore {
    fn organizations(&self) -> &dyn OrganizationRepository {
        self
    }

    fn repos(&self) -> &dyn RepoRepository {
        self
    }

    fn commits(&self) -> &dyn CommitRepository {
        self
    }

    fn pull_requests(&self) -> &dyn PullRequestRepository {
        self
    }

    fn issues(&self) -> &dyn IssueRepository {
        self
    }

    fn search_indexes(&self) -> &dyn SearchIndexRepository {
        self
    }
}

pub fn user(id: i64, login: &str) -> Value {
    json!({
        "id": id,
        "login": login,
        "avatar_url": format!("https://avatars.test/{login}")
    })
}

pub fn org(id: i64, login: &str) -> Value {
    json!({
        "id": id,
        "login": login,
        "url": format!("{FAKE_BASE}/orgs/{login}")
    })
}

pub fn repo(id: i64, owner: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "url": format!("{FAKE_BASE}/repos/{owner}/{name}"),
        "visibility": "public"
    })
}

pub fn commit(sha: &str, author: Option<Value>) -> Value {
    json!({
        "sha": sha,
        "url": format!("{FAKE_BASE}/commits/{sha}"),
        "commit": {
            "message": format!("change {sha}"),
            "author": {
                "name": "Committer",
                "email": "committer@example.test",
                "date": "2024-03-01T10:00:00Z"
            }
        },
        "author": author.unwrap_or(Value::Null)
    })
}

pub fn pull(id: i64, number: i64, author: Value) -> Value {
    json!({
        "id": id,
        "number": number,
        "url": format!("{FAKE_BASE}/pulls/{number}"),
        "state": "closed",
        "title": format!("pull {number}"),
        "user": author,
        "created_at": "2024-03-02T10:00:00Z",
        "closed_at": "2024-03-03T10:00:00Z",
        "merged_at": "2024-03-03T10:00:00Z",
        "merge_commit_sha": format!("merge{number}"),
        "head": {"label": "acme:feature", "ref": "feature", "sha": "h1"},
        "base": {"label": "acme:main", "ref": "main", "sha": "b1"}
    })
}

pub fn issue(id: i64, number: i64, author: Value) -> Value {
    json!({
        "id": id,
        "number": number,
        "url": format!("{FAKE_BASE}/issues/{number}"),
        "state": "closed",
        "title": format!("issue {number}"),
        "user": author,
        "created_at": "2024-03-04T10:00:00Z",
        "closed_at": "2024-03-05T10:00:00Z",
        "closed_by": user(11, "alice")
    })
}

/// Issue-side view of a pull request, as returned by the issues listing.
pub fn pull_shadow(id: i64, number: i64, author: Value) -> Value {
    let mut value = issue(id, number, author);
    value["pull_request"] = json!({"url": format!("{FAKE_BASE}/pulls/{number}")});
    value
}

pub fn events(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({"id": i, "event": "labeled"}))
        .collect()
}

/// Organization "acme" with repository "widgets": two commits (one without an
/// author), one merged pull request by alice and one closed issue by bob with
/// three timeline events.
pub fn acme_widgets() -> FakeGithub {
    FakeGithub::new()
        .with_object("/orgs/acme", org(1000, "acme"))
        .with_listing("/orgs/acme/repos", vec![repo(2000, "acme", "widgets")])
        .with_listing(
            "/repos/acme/widgets/commits",
            vec![
                commit("c1", Some(user(11, "alice"))),
                commit("c2", None),
            ],
        )
        .with_listing(
            "/repos/acme/widgets/pulls",
            vec![pull(3000, 1, user(11, "alice"))],
        )
        .with_listing(
            "/repos/acme/widgets/issues",
            vec![
                pull_shadow(3001, 1, user(11, "alice")),
                issue(4000, 2, user(22, "bob")),
            ],
        )
        .with_listing("/repos/acme/widgets/issues/2/events", events(3))
}
