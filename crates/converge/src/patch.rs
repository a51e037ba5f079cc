//! Set deltas and the list-patch algorithm
//!
//! Both group membership and SSH keys are stored as ordered lists and
//! compared as sets. [`Delta::between`] finds what to add and remove;
//! [`patch`] turns the stored list into the new one without reordering
//! survivors.

use std::collections::HashSet;

/// Difference between a stored list and a desired list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Desired items missing from the stored list, in desired order
    pub to_add: Vec<String>,
    /// Stored items no longer desired, in stored order
    pub to_remove: Vec<String>,
}

impl Delta {
    /// Compute `desired − stored` and `stored − desired`
    pub fn between(stored: &[String], desired: &[String]) -> Self {
        let stored_set: HashSet<&str> = stored.iter().map(String::as_str).collect();
        let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();

        Self {
            to_add: dedup(desired.iter().filter(|d| !stored_set.contains(d.as_str()))),
            to_remove: dedup(stored.iter().filter(|s| !desired_set.contains(s.as_str()))),
        }
    }

    /// Check if there is nothing to change
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Apply this delta to `existing` with [`patch`]
    pub fn apply(&self, existing: &[String]) -> Vec<String> {
        patch(existing, &self.to_add, &self.to_remove)
    }
}

/// Compute `(existing − to_remove) ++ to_add`
///
/// Survivors keep their relative order and additions are appended in the
/// order given. With nothing to add or remove, `existing` comes back as is.
pub fn patch(existing: &[String], to_add: &[String], to_remove: &[String]) -> Vec<String> {
    if to_add.is_empty() && to_remove.is_empty() {
        return existing.to_vec();
    }

    let removed: HashSet<&str> = to_remove.iter().map(String::as_str).collect();
    existing
        .iter()
        .filter(|e| !removed.contains(e.as_str()))
        .chain(to_add.iter())
        .cloned()
        .collect()
}

/// Drop repeated items, keeping the first occurrence
pub fn dedup<'a>(items: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}
