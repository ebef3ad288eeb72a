use std::collections::HashMap;

use normalizer::{NormalizedRecord, UserIdentity, PLACEHOLDER_USER_ID};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatEntry {
    pub user: String,
    pub user_id: String,
    pub total_commits: u64,
    #[serde(rename = "totalPRs")]
    pub total_prs: u64,
    pub total_issues: u64,
    pub changelogs: u64,
}

impl UserStatEntry {
    fn new(identity: &UserIdentity) -> Self {
        Self {
            user: identity.login.clone(),
            user_id: identity.id.clone(),
            total_commits: 0,
            total_prs: 0,
            total_issues: 0,
            changelogs: 0,
        }
    }
}

/// Per-run activity totals keyed by username, in first-seen order.
///
/// Every increment goes through [`StatsAccumulator::entry`], which creates a
/// zeroed entry for an unseen user.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    index: HashMap<String, usize>,
    entries: Vec<UserStatEntry>,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, identity: &UserIdentity) -> &mut UserStatEntry {
        let position = match self.index.get(&identity.login) {
            Some(&position) => position,
            None => {
                self.entries.push(UserStatEntry::new(identity));
                let position = self.entries.len() - 1;
                self.index.insert(identity.login.clone(), position);
                position
            }
        };
        let entry = &mut self.entries[position];
        if entry.user_id == PLACEHOLDER_USER_ID && identity.id != PLACEHOLDER_USER_ID {
            entry.user_id = identity.id.clone();
        }
        entry
    }

    pub fn record(&mut self, record: &NormalizedRecord) {
        let entry = self.entry(record.author());
        match record {
            NormalizedRecord::Commit(_) => entry.total_commits += 1,
            NormalizedRecord::PullRequest(_) => entry.total_prs += 1,
            NormalizedRecord::Issue(_) => entry.total_issues += 1,
        }
    }

    pub fn add_changelog(&mut self, identity: &UserIdentity, events: u64) {
        self.entry(identity).changelogs += events;
    }

    pub fn get(&self, user: &str) -> Option<&UserStatEntry> {
        self.index.get(user).map(|&position| &self.entries[position])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<UserStatEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use normalizer::{NormalizedCommit, NormalizedIssue};

    fn user(id: &str, login: &str) -> UserIdentity {
        UserIdentity {
            id: id.into(),
            login: login.into(),
            avatar_url: String::new(),
        }
    }

    fn commit(author: UserIdentity) -> NormalizedRecord {
        NormalizedRecord::Commit(NormalizedCommit {
            sha: "c1".into(),
            repo_id: 1,
            url: String::new(),
            message: String::new(),
            author,
            commit_author_name: None,
            commit_author_email: None,
            commit_author_date: None,
        })
    }

    #[test]
    fn changelog_for_unseen_user_creates_entry() {
        let mut stats = StatsAccumulator::new();
        stats.add_changelog(&user("22", "bob"), 3);

        let bob = stats.get("bob").unwrap();
        assert_eq!(bob.changelogs, 3);
        assert_eq!(bob.total_commits + bob.total_prs + bob.total_issues, 0);
        assert_eq!(bob.user_id, "22");
    }

    #[test]
    fn entries_keep_first_seen_order() {
        let mut stats = StatsAccumulator::new();
        stats.record(&commit(user("11", "alice")));
        stats.record(&commit(UserIdentity::placeholder()));
        stats.record(&NormalizedRecord::Issue(NormalizedIssue {
            external_id: "1".into(),
            repo_id: 1,
            number: 1,
            url: String::new(),
            state: "open".into(),
            title: String::new(),
            author: user("11", "alice"),
            created_on: None,
            closed_on: None,
            closed_by: None,
        }));

        let entries = stats.into_entries();
        let users: Vec<&str> = entries.iter().map(|e| e.user.as_str()).collect();
        assert_eq!(users, vec!["alice", "unknown"]);
        assert_eq!(entries[0].total_commits, 1);
        assert_eq!(entries[0].total_issues, 1);
        assert_eq!(entries[1].user_id, "-");
    }

    #[test]
    fn placeholder_id_is_replaced_once_known() {
        let mut stats = StatsAccumulator::new();
        stats.add_changelog(&user("-", "carol"), 1);
        stats.add_changelog(&user("33", "carol"), 1);
        let carol = stats.get("carol").unwrap();
        assert_eq!(carol.user_id, "33");
        assert_eq!(carol.changelogs, 2);
    }

    #[test]
    fn serializes_with_rollup_field_names() {
        let mut stats = StatsAccumulator::new();
        stats.record(&commit(user("11", "alice")));
        let value = serde_json::to_value(stats.into_entries()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "user": "alice",
                "userId": "11",
                "totalCommits": 1,
                "totalPRs": 0,
                "totalIssues": 0,
                "changelogs": 0
            }])
        );
    }
}
