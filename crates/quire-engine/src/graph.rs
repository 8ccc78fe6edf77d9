//! The collection graph: an immutable index of the resolver's namespace.
//!
//! Nodes are keyed by their normalized path: segments lowercased and
//! joined with `/`, the root being the empty string. The first item
//! discovered under a normalized name wins; later duplicates are ignored.

use std::collections::VecDeque;

use quire_types::Language;
use quire_value::normalize_key;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::resolver::{ItemKind, Resolver};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub key: String,
    pub name: String,
    /// Display path, as the resolver named each segment.
    pub segments: Vec<String>,
    pub created_at: i64,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionNode {
    pub key: String,
    pub name: String,
    pub segments: Vec<String>,
    pub language: Language,
    pub created_at: i64,
    pub parent: String,
}

impl ExpressionNode {
    pub fn display_path(&self) -> String {
        self.segments.join("/")
    }
}

/// Normalized key of a slash-separated path.
pub fn path_key(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(normalize_key)
        .collect::<Vec<_>>()
        .join("/")
}

/// Key of `name` directly inside the folder keyed `parent`.
pub fn child_key(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        normalize_key(name)
    } else {
        format!("{parent}/{}", normalize_key(name))
    }
}

#[derive(Debug, Default)]
pub struct CollectionGraph {
    folders: FxHashMap<String, FolderNode>,
    expressions: FxHashMap<String, ExpressionNode>,
    child_folders: FxHashMap<String, Vec<String>>,
    child_expressions: FxHashMap<String, Vec<String>>,
    /// Expression keys in discovery order.
    order: Vec<String>,
}

impl CollectionGraph {
    /// Crawl `resolver` breadth-first from the root.
    pub fn build(resolver: &dyn Resolver) -> Self {
        let mut graph = Self::default();
        graph.folders.insert(
            String::new(),
            FolderNode {
                key: String::new(),
                name: String::new(),
                segments: Vec::new(),
                created_at: 0,
                parent: None,
            },
        );

        let mut queue = VecDeque::from([String::new()]);
        while let Some(key) = queue.pop_front() {
            let Some(segments) = graph.folders.get(&key).map(|folder| folder.segments.clone()) else {
                continue;
            };
            let mut items = match resolver.list_items(&segments) {
                Ok(items) => items,
                Err(err) => {
                    warn!(folder = %segments.join("/"), error = %err, "listing failed; folder treated as empty");
                    Vec::new()
                }
            };
            items.sort_by_key(|item| item.created_at);

            for item in items {
                if item.name.is_empty() || item.name.contains('/') {
                    continue;
                }
                let child = child_key(&key, &item.name);
                if graph.folders.contains_key(&child) || graph.expressions.contains_key(&child) {
                    debug!(path = %child, "duplicate name ignored");
                    continue;
                }
                let mut child_segments = segments.clone();
                child_segments.push(item.name.clone());

                match item.kind {
                    ItemKind::Folder => {
                        graph.folders.insert(
                            child.clone(),
                            FolderNode {
                                key: child.clone(),
                                name: item.name,
                                segments: child_segments,
                                created_at: item.created_at,
                                parent: Some(key.clone()),
                            },
                        );
                        graph.child_folders.entry(key.clone()).or_default().push(child.clone());
                        queue.push_back(child);
                    }
                    ItemKind::Expression => {
                        graph.expressions.insert(
                            child.clone(),
                            ExpressionNode {
                                key: child.clone(),
                                name: item.name,
                                segments: child_segments,
                                language: item.language.unwrap_or(Language::Formula),
                                created_at: item.created_at,
                                parent: key.clone(),
                            },
                        );
                        graph.child_expressions.entry(key.clone()).or_default().push(child.clone());
                        graph.order.push(child);
                    }
                }
            }
        }

        debug!(
            folders = graph.folders.len(),
            expressions = graph.expressions.len(),
            "collection graph built"
        );
        graph
    }

    pub fn folder(&self, key: &str) -> Option<&FolderNode> {
        self.folders.get(key)
    }

    pub fn expression(&self, key: &str) -> Option<&ExpressionNode> {
        self.expressions.get(key)
    }

    /// Child folders of `key`, in listing order.
    pub fn child_folders(&self, key: &str) -> impl Iterator<Item = &FolderNode> {
        self.child_folders
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|child| self.folders.get(child))
    }

    /// Child expressions of `key`, in listing order.
    pub fn child_expressions(&self, key: &str) -> impl Iterator<Item = &ExpressionNode> {
        self.child_expressions
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|child| self.expressions.get(child))
    }

    /// Every expression, breadth-first.
    pub fn expressions(&self) -> impl Iterator<Item = &ExpressionNode> {
        self.order.iter().filter_map(|key| self.expressions.get(key))
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn expression_count(&self) -> usize {
        self.expressions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{MemoryResolver, ResolverItem, ResolverResult};

    #[test]
    fn test_path_keys() {
        assert_eq!(path_key("/Shapes//Circle/"), "shapes/circle");
        assert_eq!(path_key(""), "");
        assert_eq!(child_key("", "Area"), "area");
        assert_eq!(child_key("shapes", "Area"), "shapes/area");
    }

    #[test]
    fn test_first_discovered_name_wins() {
        let resolver = MemoryResolver::new()
            .formula("Width", "1")
            .formula("width", "2")
            .folder("WIDTH");
        let graph = CollectionGraph::build(&resolver);
        assert_eq!(graph.expression_count(), 1);
        assert_eq!(graph.expression("width").map(|e| e.name.as_str()), Some("Width"));
        assert!(graph.folder("width").is_none());
    }

    #[test]
    fn test_children_follow_creation_order() {
        let resolver = MemoryResolver::new()
            .formula("b", "1")
            .folder("sub")
            .formula("a", "2")
            .script("sub/c", "return 3");
        let graph = CollectionGraph::build(&resolver);
        let names: Vec<_> = graph.child_expressions("").map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        let all: Vec<_> = graph.expressions().map(|e| e.display_path()).collect();
        assert_eq!(all, vec!["b", "a", "sub/c"]);
        assert_eq!(graph.expression("sub/c").map(|e| e.language), Some(Language::Script));
    }

    /// Lists the same folder under every path, forever.
    struct Echo;

    impl Resolver for Echo {
        fn list_items(&self, path: &[String]) -> ResolverResult<Vec<ResolverItem>> {
            if path.len() > 3 {
                return Err(crate::resolver::ResolverError::NotFound(path.join("/")));
            }
            Ok(vec![ResolverItem::folder("again", 0), ResolverItem::folder("AGAIN", 1)])
        }

        fn get_expression(&self, _path: &[String]) -> ResolverResult<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn test_failing_listing_is_empty() {
        let graph = CollectionGraph::build(&Echo);
        // root + again + again/again + again/again/again + one more level
        assert_eq!(graph.folder_count(), 5);
        assert_eq!(graph.child_folders("again/again/again/again").count(), 0);
    }
}
