mod support;

use anyhow::Result;
use async_trait::async_trait;
use collector::{collect_all, collect_all_as, GithubClient, Page, Resource};
use serde::Deserialize;
use serde_json::{json, Value};
use support::FakeGithub;

fn repo_commits() -> Resource {
    Resource::RepoCommits {
        owner: "acme".into(),
        repo: "widgets".into(),
    }
}

fn numbered(count: usize) -> Vec<Value> {
    (0..count).map(|i| json!({"id": i})).collect()
}

#[tokio::test]
async fn drains_every_page_for_any_page_size() -> Result<()> {
    let github = FakeGithub::new().with_listing("/repos/acme/widgets/commits", numbered(7));

    for per_page in [1u32, 2, 3, 6, 7, 100] {
        let items = collect_all(&github, &repo_commits(), per_page).await?;
        assert_eq!(items, numbered(7), "per_page={per_page}");
    }
    Ok(())
}

#[tokio::test]
async fn empty_listing_is_a_single_empty_page() -> Result<()> {
    let github = FakeGithub::new();
    let items = collect_all(&github, &repo_commits(), 50).await?;
    assert!(items.is_empty());
    assert_eq!(github.requests(), vec!["/repos/acme/widgets/commits#0".to_string()]);
    Ok(())
}

#[tokio::test]
async fn later_page_failure_discards_the_listing() {
    let github = FakeGithub::new()
        .with_listing("/repos/acme/widgets/commits", numbered(10))
        .failing_page("/repos/acme/widgets/commits", 2);

    let err = collect_all(&github, &repo_commits(), 3)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("page 3"), "{err:#}");
}

struct LoopingClient;

#[async_trait]
impl GithubClient for LoopingClient {
    async fn get(&self, _resource: &Resource) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn list_page(
        &self,
        _resource: &Resource,
        _per_page: u32,
        _next: Option<&str>,
    ) -> Result<Page> {
        Ok(Page {
            items: vec![json!({"id": 1})],
            next: Some("https://api.github.test/repos/acme/widgets/commits?page=2".into()),
        })
    }
}

#[tokio::test]
async fn repeated_next_link_is_an_error() {
    let err = collect_all(&LoopingClient, &repo_commits(), 1)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("pagination cycle"), "{err}");
}

#[derive(Debug, Deserialize)]
struct Numbered {
    id: u64,
}

#[tokio::test]
async fn typed_listing_sets_aside_mismatched_items() -> Result<()> {
    let mut items = numbered(4);
    items.insert(2, json!({"id": "two"}));
    let github = FakeGithub::new().with_listing("/repos/acme/widgets/commits", items);

    let decoded = collect_all_as::<Numbered, _>(&github, &repo_commits(), 2).await?;

    let ids: Vec<u64> = decoded.items.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(decoded.rejected.len(), 1);
    assert_eq!(decoded.rejected[0].position, 2);
    Ok(())
}
