//! In-memory search index over record metadata.
//!
//! Labels and tags are stored in plaintext inside record frames, so the
//! index is rebuilt from the committed frames on every open and never
//! persisted. Entries are kept in insertion (id) order; tag postings map
//! each tag to the positions of the records that carry it.

use std::collections::{BTreeSet, HashMap};

use super::record::{RecordId, StoredRecord};

#[derive(Debug, Clone)]
struct IndexEntry {
    id: RecordId,
    /// Lowercased label used for substring matching.
    label_key: String,
}

/// Label/tag index. Answers `find` without touching any ciphertext.
#[derive(Debug, Default, Clone)]
pub struct SearchIndex {
    entries: Vec<IndexEntry>,
    by_id: HashMap<RecordId, usize>,
    tags: HashMap<String, BTreeSet<usize>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from records in id order.
    pub fn rebuild<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a StoredRecord>,
    {
        let mut index = Self::new();
        for record in records {
            index.insert(record.id, &record.label, &record.tags);
        }
        index
    }

    /// Add a record. Ids must arrive in increasing order.
    pub fn insert(&mut self, id: RecordId, label: &str, tags: &BTreeSet<String>) {
        if self.by_id.contains_key(&id) {
            return;
        }
        let position = self.entries.len();
        self.entries.push(IndexEntry {
            id,
            label_key: label.to_lowercase(),
        });
        self.by_id.insert(id, position);
        for tag in tags {
            self.tags.entry(tag.clone()).or_default().insert(position);
        }
    }

    /// Ids of records whose label contains `query` (case-insensitive) and
    /// that carry every tag in `tags`, in insertion order.
    ///
    /// An empty query matches every label; an empty tag set imposes no
    /// constraint.
    pub fn find(&self, query: &str, tags: &BTreeSet<String>) -> Vec<RecordId> {
        let needle = query.to_lowercase();

        let candidates: Vec<usize> = if tags.is_empty() {
            (0..self.entries.len()).collect()
        } else {
            let mut postings = Vec::with_capacity(tags.len());
            for tag in tags {
                match self.tags.get(tag) {
                    Some(set) => postings.push(set),
                    None => return Vec::new(),
                }
            }
            // Walk the smallest posting list and probe the rest.
            postings.sort_by_key(|set| set.len());
            let (smallest, rest) = postings.split_at(1);
            smallest[0]
                .iter()
                .copied()
                .filter(|pos| rest.iter().all(|set| set.contains(pos)))
                .collect()
        };

        candidates
            .into_iter()
            .map(|pos| &self.entries[pos])
            .filter(|entry| needle.is_empty() || entry.label_key.contains(&needle))
            .map(|entry| entry.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> SearchIndex {
        let mut index = SearchIndex::new();
        index.insert(RecordId(1), "alpha-one", &tags(&["lab"]));
        index.insert(RecordId(2), "alpha-two", &tags(&["prod"]));
        index.insert(RecordId(3), "beta", &tags(&["lab"]));
        index
    }

    #[test]
    fn query_and_tag_intersect() {
        let index = sample();
        assert_eq!(index.find("alpha", &tags(&["lab"])), vec![RecordId(1)]);
    }

    #[test]
    fn query_alone_returns_insertion_order() {
        let index = sample();
        assert_eq!(index.find("alpha", &tags(&[])), vec![RecordId(1), RecordId(2)]);
    }

    #[test]
    fn tag_alone_matches_all_labels() {
        let index = sample();
        assert_eq!(index.find("", &tags(&["lab"])), vec![RecordId(1), RecordId(3)]);
    }

    #[test]
    fn empty_filters_return_everything() {
        let index = sample();
        assert_eq!(index.find("", &tags(&[])).len(), 3);
    }

    #[test]
    fn label_match_ignores_case() {
        let index = sample();
        assert_eq!(index.find("BETA", &tags(&[])), vec![RecordId(3)]);
    }

    #[test]
    fn query_whitespace_is_part_of_the_needle() {
        let index = sample();
        assert!(index.find("alpha ", &tags(&[])).is_empty());
        assert_eq!(index.find("a-o", &tags(&[])), vec![RecordId(1)]);
    }

    #[test]
    fn unknown_tag_matches_nothing() {
        let index = sample();
        assert!(index.find("", &tags(&["lab", "missing"])).is_empty());
    }

    #[test]
    fn tags_are_case_sensitive() {
        let index = sample();
        assert!(index.find("", &tags(&["LAB"])).is_empty());
    }
}
