//! Set difference helpers used to reconcile tags and id lists

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Elements added, removed and kept between two sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDiff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
    pub unchanged: Vec<T>,
}

impl<T> SetDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare two collections as sets. Duplicates collapse and output is sorted.
pub fn diff_sets<T, I, J>(old: I, new: J) -> SetDiff<T>
where
    T: Ord + Clone,
    I: IntoIterator<Item = T>,
    J: IntoIterator<Item = T>,
{
    let old: BTreeSet<T> = old.into_iter().collect();
    let new: BTreeSet<T> = new.into_iter().collect();

    SetDiff {
        added: new.difference(&old).cloned().collect(),
        removed: old.difference(&new).cloned().collect(),
        unchanged: old.intersection(&new).cloned().collect(),
    }
}

/// Tag changes to push to the tagging API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Tags to create or overwrite
    pub replace: BTreeMap<String, String>,
    /// Tag keys to remove
    pub delete: Vec<String>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.replace.is_empty() && self.delete.is_empty()
    }
}

/// Compute the tag changes needed to go from `old` to `new`
pub fn diff_tags(old: &HashMap<String, String>, new: &HashMap<String, String>) -> TagDiff {
    let keys = diff_sets(old.keys().cloned(), new.keys().cloned());

    let mut replace = BTreeMap::new();
    for key in keys.added {
        replace.insert(key.clone(), new[&key].clone());
    }
    for key in keys.unchanged {
        if old[&key] != new[&key] {
            replace.insert(key.clone(), new[&key].clone());
        }
    }

    TagDiff {
        replace,
        delete: keys.removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn diff_sets_is_order_independent() {
        let a = diff_sets(vec!["sg-1", "sg-2", "sg-3"], vec!["sg-4", "sg-2"]);
        let b = diff_sets(vec!["sg-3", "sg-1", "sg-2"], vec!["sg-2", "sg-4"]);
        assert_eq!(a, b);
        assert_eq!(a.added, vec!["sg-4"]);
        assert_eq!(a.removed, vec!["sg-1", "sg-3"]);
        assert_eq!(a.unchanged, vec!["sg-2"]);
    }

    #[test]
    fn diff_sets_collapses_duplicates() {
        let d = diff_sets(vec![1, 1, 2], vec![2, 2]);
        assert_eq!(d.removed, vec![1]);
        assert!(d.added.is_empty());
    }

    #[test]
    fn identical_sets_are_empty() {
        assert!(diff_sets(vec!["a"], vec!["a"]).is_empty());
    }

    #[test]
    fn diff_tags_replaces_and_deletes() {
        let old = tags(&[("env", "dev"), ("team", "infra"), ("owner", "ops")]);
        let new = tags(&[("env", "prod"), ("team", "infra"), ("cost", "42")]);

        let d = diff_tags(&old, &new);
        let expected: BTreeMap<String, String> =
            tags(&[("env", "prod"), ("cost", "42")]).into_iter().collect();
        assert_eq!(d.replace, expected);
        assert_eq!(d.delete, vec!["owner".to_string()]);
    }

    #[test]
    fn diff_tags_no_change() {
        let t = tags(&[("env", "dev")]);
        assert!(diff_tags(&t, &t).is_empty());
    }
}
