use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Source name → target path pairs of a single group, in document order.
///
/// An empty path means "leave this source alone".
pub type SourcePaths = IndexMap<String, String>;

/// Ordered group → (source → path) mapping loaded from the mapping document.
///
/// The document shape is the plain nested object the editor tooling writes:
///
/// ```json
/// {
///   "Scene1": { "imgA": "/p/new1.png", "imgB": "" },
///   "Scene2": { "logo": "/p/logo.png" }
/// }
/// ```
///
/// The store is read-only once loaded; the scheduler shares it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingStore {
    groups: IndexMap<String, SourcePaths>,
}

impl MappingStore {
    pub fn new(groups: IndexMap<String, SourcePaths>) -> Self {
        Self { groups }
    }

    /// Group names in document order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn group(&self, name: &str) -> Option<&SourcePaths> {
        self.groups.get(name)
    }

    pub fn contains_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of source entries across all groups, including empty paths.
    pub fn source_count(&self) -> usize {
        self.groups.values().map(IndexMap::len).sum()
    }
}

impl<G, S, P> FromIterator<(G, Vec<(S, P)>)> for MappingStore
where
    G: Into<String>,
    S: Into<String>,
    P: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (G, Vec<(S, P)>)>>(iter: I) -> Self {
        let groups = iter
            .into_iter()
            .map(|(group, sources)| {
                let sources = sources
                    .into_iter()
                    .map(|(source, path)| (source.into(), path.into()))
                    .collect();
                (group.into(), sources)
            })
            .collect();
        Self { groups }
    }
}

/// Snapshot of the checked group names, in the order they were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    groups: IndexSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group; returns false if it was already selected.
    pub fn insert(&mut self, group: impl Into<String>) -> bool {
        self.groups.insert(group.into())
    }

    /// Removes a group; returns false if it was not selected.
    pub fn remove(&mut self, group: &str) -> bool {
        self.groups.shift_remove(group)
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl<T: Into<String>> FromIterator<T> for Selection {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            groups: iter.into_iter().map(Into::into).collect(),
        }
    }
}
