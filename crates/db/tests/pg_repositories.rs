use chrono::{TimeZone, Utc};
use db::{
    ActivityQuery, CommitRow, IssueRow, OrganizationUpsert, PullRequestRow, Repositories,
    RepositoryUpsert,
};
use db_test_fixture::DbFixture;

fn commit(sha: &str, repo_id: i64, login: &str, message: &str, day: u32) -> CommitRow {
    CommitRow {
        sha: sha.into(),
        repo_id,
        url: format!("https://api.github.com/commits/{sha}"),
        message: message.into(),
        author_id: "11".into(),
        author_login: login.into(),
        author_avatar_url: String::new(),
        commit_author_name: Some(login.to_uppercase()),
        commit_author_email: Some(format!("{login}@example.com")),
        commit_author_date: Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()),
    }
}

#[tokio::test]
async fn organization_and_repository_upserts_are_idempotent() -> anyhow::Result<()> {
    let fixture = match DbFixture::from_env() {
        Ok(fixture) => fixture,
        Err(err) => {
            eprintln!("skipping organization_and_repository_upserts_are_idempotent: {err}");
            return Ok(());
        }
    };
    let handle = fixture.create("org_upsert").await?;
    let database = handle.database();

    let org = database
        .organizations()
        .upsert(OrganizationUpsert {
            external_id: "100".into(),
            login: "acme".into(),
            url: "https://api.github.com/orgs/acme".into(),
            credential_ref: Some("primary".into()),
        })
        .await?;
    let again = database
        .organizations()
        .upsert(OrganizationUpsert {
            external_id: "100".into(),
            login: "acme".into(),
            url: "https://api.github.com/orgs/acme".into(),
            credential_ref: None,
        })
        .await?;
    assert_eq!(org.id, again.id);
    assert_eq!(again.credential_ref.as_deref(), Some("primary"));

    let repo_upsert = RepositoryUpsert {
        external_id: "555".into(),
        organization_id: org.id,
        name: "widgets".into(),
        url: "https://api.github.com/repos/acme/widgets".into(),
        repo_type: Some("public".into()),
    };
    let repo = database.repos().upsert(repo_upsert.clone()).await?;
    let repo_again = database.repos().upsert(repo_upsert).await?;
    assert_eq!(repo, repo_again);

    let listed = database.repos().list_by_organization(org.id).await?;
    assert_eq!(listed, vec![repo]);
    assert_eq!(
        database.organizations().get_by_login("ACME").await?.map(|o| o.id),
        Some(org.id)
    );

    handle.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn activity_listing_filters_pages_and_searches() -> anyhow::Result<()> {
    let fixture = match DbFixture::from_env() {
        Ok(fixture) => fixture,
        Err(err) => {
            eprintln!("skipping activity_listing_filters_pages_and_searches: {err}");
            return Ok(());
        }
    };
    let handle = fixture.create("activity_list").await?;
    let database = handle.database();
    database.search_indexes().ensure_search_indexes().await?;
    // Second call must be a no-op.
    let indexes = database.search_indexes().ensure_search_indexes().await?;
    assert_eq!(indexes.len(), 3);

    let acme = database
        .organizations()
        .upsert(OrganizationUpsert {
            external_id: "1".into(),
            login: "acme".into(),
            url: String::new(),
            credential_ref: None,
        })
        .await?;
    let other = database
        .organizations()
        .upsert(OrganizationUpsert {
            external_id: "2".into(),
            login: "globex".into(),
            url: String::new(),
            credential_ref: None,
        })
        .await?;
    let widgets = database
        .repos()
        .upsert(RepositoryUpsert {
            external_id: "10".into(),
            organization_id: acme.id,
            name: "widgets".into(),
            url: String::new(),
            repo_type: None,
        })
        .await?;
    let gadgets = database
        .repos()
        .upsert(RepositoryUpsert {
            external_id: "20".into(),
            organization_id: other.id,
            name: "gadgets".into(),
            url: String::new(),
            repo_type: None,
        })
        .await?;

    database.commits().upsert(commit("a1", widgets.id, "alice", "add parser", 1)).await?;
    database.commits().upsert(commit("a2", widgets.id, "alice", "fix lexer", 2)).await?;
    database.commits().upsert(commit("a3", widgets.id, "bob", "parser docs", 3)).await?;
    database.commits().upsert(commit("g1", gadgets.id, "carol", "init", 4)).await?;

    let all = database.commits().list(&ActivityQuery::default()).await?;
    assert_eq!(all.total_count, 4);
    assert_eq!(all.data[0].sha, "g1");

    let acme_only = database
        .commits()
        .list(&ActivityQuery {
            organizations: vec!["Acme".into()],
            page: 2,
            page_size: 2,
            search: None,
        })
        .await?;
    assert_eq!(acme_only.total_count, 3);
    assert_eq!(acme_only.data.len(), 1);
    assert_eq!(acme_only.data[0].sha, "a1");

    let by_external_id = database
        .commits()
        .list(&ActivityQuery {
            organizations: vec!["2".into()],
            ..Default::default()
        })
        .await?;
    assert_eq!(by_external_id.total_count, 1);

    let searched = database
        .commits()
        .list(&ActivityQuery {
            search: Some("parser".into()),
            ..Default::default()
        })
        .await?;
    let shas: Vec<_> = searched.data.iter().map(|c| c.sha.as_str()).collect();
    assert_eq!(shas, vec!["a3", "a1"]);

    database
        .pull_requests()
        .upsert(PullRequestRow {
            external_id: "900".into(),
            repo_id: widgets.id,
            number: 4,
            url: String::new(),
            state: "closed".into(),
            title: "Add widget".into(),
            user_id: "11".into(),
            user_login: "alice".into(),
            created_on: None,
            closed_on: None,
            merged_on: None,
            merge_commit_sha: Some("m1".into()),
            head_label: None,
            head_ref: None,
            head_sha: None,
            base_label: None,
            base_ref: None,
            base_sha: None,
        })
        .await?;
    let prs = database
        .pull_requests()
        .list(&ActivityQuery {
            search: Some("m1".into()),
            ..Default::default()
        })
        .await?;
    assert_eq!(prs.total_count, 1);

    database
        .issues()
        .upsert(IssueRow {
            external_id: "700".into(),
            repo_id: widgets.id,
            number: 5,
            url: String::new(),
            state: "closed".into(),
            title: "Broken widget".into(),
            user_id: "22".into(),
            user_login: "bob".into(),
            created_on: None,
            closed_on: None,
            closed_by_id: Some("11".into()),
            closed_by_login: Some("alice".into()),
        })
        .await?;
    let closed_by_alice = database
        .issues()
        .list(&ActivityQuery {
            search: Some("alice".into()),
            ..Default::default()
        })
        .await?;
    assert_eq!(closed_by_alice.total_count, 1);
    assert_eq!(database.issues().get("700").await?.map(|i| i.number), Some(5));

    handle.cleanup().await?;
    Ok(())
}
