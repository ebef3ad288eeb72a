use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::GithubClient;
use crate::metrics;
use crate::resource::Resource;

/// Drains every page of `resource`, following continuation links until the
/// upstream reports no next page.
///
/// A failure on any page fails the whole listing; the pages already fetched
/// are discarded rather than returned as a truncated result.
pub async fn collect_all<C>(client: &C, resource: &Resource, per_page: u32) -> Result<Vec<Value>>
where
    C: GithubClient + ?Sized,
{
    let mut items = Vec::new();
    let mut visited = HashSet::new();
    let mut next: Option<String> = None;
    let mut pages = 0u32;

    loop {
        let page = client
            .list_page(resource, per_page, next.as_deref())
            .await
            .with_context(|| format!("listing {resource} (page {})", pages + 1))?;
        pages += 1;
        metrics::FETCH_PAGES_TOTAL
            .with_label_values(&[resource.op()])
            .inc();
        items.extend(page.items);

        match page.next {
            Some(url) => {
                if !visited.insert(url.clone()) {
                    bail!("pagination cycle while listing {resource}: {url} was already fetched");
                }
                next = Some(url);
            }
            None => break,
        }
    }

    metrics::FETCH_ITEMS_TOTAL
        .with_label_values(&[resource.op()])
        .inc_by(items.len() as u64);
    debug!(resource = %resource, pages, items = items.len(), "listing drained");
    Ok(items)
}

/// Items of a listing decoded into `T`, with the ones that did not match the
/// payload shape set aside.
#[derive(Debug)]
pub struct Decoded<T> {
    pub items: Vec<T>,
    pub rejected: Vec<Rejected>,
}

#[derive(Debug, Clone)]
pub struct Rejected {
    pub position: usize,
    pub reason: String,
}

pub async fn collect_all_as<T, C>(
    client: &C,
    resource: &Resource,
    per_page: u32,
) -> Result<Decoded<T>>
where
    T: DeserializeOwned,
    C: GithubClient + ?Sized,
{
    let raw = collect_all(client, resource, per_page).await?;
    Ok(decode_items(resource, raw))
}

pub fn decode_items<T: DeserializeOwned>(resource: &Resource, raw: Vec<Value>) -> Decoded<T> {
    let mut items = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();
    for (position, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<T>(value) {
            Ok(item) => items.push(item),
            Err(err) => {
                warn!(resource = %resource, position, error = %err, "skipping undecodable item");
                rejected.push(Rejected {
                    position,
                    reason: err.to_string(),
                });
            }
        }
    }
    Decoded { items, rejected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Item {
        id: i64,
    }

    #[test]
    fn undecodable_items_are_set_aside() {
        let resource = Resource::OrgRepos { org: "acme".into() };
        let decoded: Decoded<Item> =
            decode_items(&resource, vec![json!({"id": 1}), json!({"id": "x"}), json!({"id": 3})]);
        let ids: Vec<i64> = decoded.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(decoded.rejected.len(), 1);
        assert_eq!(decoded.rejected[0].position, 1);
    }
}
