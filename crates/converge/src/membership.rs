//! User-to-groups index built from the manifest's groups

use std::collections::HashMap;

use crate::types::DesiredGroup;

/// Maps each user id to the groups that list it, in the order the groups
/// were recorded
///
/// A user listed twice by the same group, or by a group recorded twice,
/// appears once.
#[derive(Debug, Clone, Default)]
pub struct MembershipIndex {
    by_user: HashMap<String, Vec<String>>,
}

impl MembershipIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold all groups, in order
    pub fn from_groups(groups: &[DesiredGroup]) -> Self {
        let mut index = Self::new();
        for group in groups {
            index.record_group(group);
        }
        index
    }

    /// Record every member of `group`
    pub fn record_group(&mut self, group: &DesiredGroup) {
        for user in &group.users {
            self.record(user, &group.id);
        }
    }

    /// Record that `user` belongs to `group`
    pub fn record(&mut self, user: &str, group: &str) {
        let groups = self.by_user.entry(user.to_string()).or_default();
        if !groups.iter().any(|g| g == group) {
            groups.push(group.to_string());
        }
    }

    /// Groups of `user`, empty if no group lists it
    pub fn groups_for(&self, user: &str) -> &[String] {
        self.by_user.get(user).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of users referenced by at least one group
    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    /// Check if no group lists any user
    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, users: &[&str]) -> DesiredGroup {
        DesiredGroup {
            id: id.to_string(),
            users: users.iter().map(|u| (*u).to_string()).collect(),
            admins: Vec::new(),
        }
    }

    #[test]
    fn test_order_follows_groups() {
        let index = MembershipIndex::from_groups(&[
            group("ops", &["alice", "bob"]),
            group("dev", &["bob"]),
            group("qa", &["alice"]),
        ]);

        assert_eq!(index.groups_for("alice"), ["ops", "qa"]);
        assert_eq!(index.groups_for("bob"), ["ops", "dev"]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_duplicates_collapse() {
        let index = MembershipIndex::from_groups(&[
            group("dev", &["alice", "alice"]),
            group("dev", &["alice"]),
            group("ops", &["alice"]),
        ]);

        assert_eq!(index.groups_for("alice"), ["dev", "ops"]);
    }

    #[test]
    fn test_unknown_user() {
        let index = MembershipIndex::from_groups(&[group("empty", &[])]);
        assert!(index.groups_for("nobody").is_empty());
        assert!(index.is_empty());
    }
}
