//! Namespace resolvers: where folders and expression sources come from.
//!
//! The engine only ever calls [`Resolver::list_items`] and
//! [`Resolver::get_expression`]. Failures are logged and treated as
//! "no data"; they never reach an evaluation result.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use quire_types::Language;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ══════════════════════════════════════════════════════════════════════
// Contract
// ══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    Expression,
}

/// One entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverItem {
    pub kind: ItemKind,
    pub name: String,
    /// Creation ordinal; listings are ordered by it.
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

impl ResolverItem {
    pub fn folder(name: impl Into<String>, created_at: i64) -> Self {
        Self {
            kind: ItemKind::Folder,
            name: name.into(),
            created_at,
            language: None,
        }
    }

    pub fn expression(name: impl Into<String>, language: Language, created_at: i64) -> Self {
        Self {
            kind: ItemKind::Expression,
            name: name.into(),
            created_at,
            language: Some(language),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("no such folder: '{0}'")]
    NotFound(String),
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

pub type ResolverResult<T> = Result<T, ResolverError>;

/// Supplier of the raw folder/expression namespace.
///
/// Paths are segment lists as the resolver itself named them; the root is
/// the empty list.
pub trait Resolver {
    fn list_items(&self, path: &[String]) -> ResolverResult<Vec<ResolverItem>>;

    /// Source text of the expression at `path`, `None` when it has none.
    fn get_expression(&self, path: &[String]) -> ResolverResult<Option<String>>;
}

// ══════════════════════════════════════════════════════════════════════
// In-memory resolver
// ══════════════════════════════════════════════════════════════════════

/// A resolver over an in-memory tree, built from slash-separated paths.
///
/// ```ignore
/// let resolver = MemoryResolver::new()
///     .formula("x", "21")
///     .script("shapes/double", "return x * 2");
/// ```
///
/// Intermediate folders are created on demand. Adding the same name twice
/// lists it twice; the collection graph keeps the first.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    listings: FxHashMap<String, Vec<ResolverItem>>,
    sources: FxHashMap<String, String>,
    next_ordinal: i64,
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn folder(mut self, path: &str) -> Self {
        self.add_folder(path);
        self
    }

    pub fn formula(self, path: &str, source: &str) -> Self {
        self.expression(path, Language::Formula, source)
    }

    pub fn script(self, path: &str, source: &str) -> Self {
        self.expression(path, Language::Script, source)
    }

    pub fn expression(mut self, path: &str, language: Language, source: &str) -> Self {
        self.add_expression(path, language, source);
        self
    }

    /// Create a folder and any missing ancestors.
    pub fn add_folder(&mut self, path: &str) {
        let mut parent = String::new();
        for segment in split(path) {
            let exists = self
                .listings
                .get(&parent)
                .is_some_and(|items| items.iter().any(|item| item.kind == ItemKind::Folder && item.name == segment));
            if !exists {
                let ordinal = self.ordinal();
                self.listings
                    .entry(parent.clone())
                    .or_default()
                    .push(ResolverItem::folder(segment, ordinal));
            }
            parent = join(&parent, segment);
            self.listings.entry(parent.clone()).or_default();
        }
    }

    pub fn add_expression(&mut self, path: &str, language: Language, source: &str) {
        let segments = split(path);
        let Some((name, folders)) = segments.split_last() else {
            return;
        };
        let parent = folders.join("/");
        self.add_folder(&parent);
        let ordinal = self.ordinal();
        self.listings
            .entry(parent.clone())
            .or_default()
            .push(ResolverItem::expression(*name, language, ordinal));
        self.sources.insert(join(&parent, name), source.to_string());
    }

    fn ordinal(&mut self) -> i64 {
        self.next_ordinal += 1;
        self.next_ordinal
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

impl Resolver for MemoryResolver {
    fn list_items(&self, path: &[String]) -> ResolverResult<Vec<ResolverItem>> {
        let key = path.join("/");
        match self.listings.get(&key) {
            Some(items) => Ok(items.clone()),
            None if key.is_empty() => Ok(Vec::new()),
            None => Err(ResolverError::NotFound(key)),
        }
    }

    fn get_expression(&self, path: &[String]) -> ResolverResult<Option<String>> {
        Ok(self.sources.get(&path.join("/")).cloned())
    }
}

// ══════════════════════════════════════════════════════════════════════
// Directory resolver
// ══════════════════════════════════════════════════════════════════════

/// A resolver over a directory tree. Subdirectories are folders; `*.fx`
/// files are formulas and `*.js` files are scripts. Entries are ordered by
/// modification time, then name. Hidden entries are skipped.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, path: &[String]) -> PathBuf {
        path.iter().fold(self.root.clone(), |dir, segment| dir.join(segment))
    }

    /// Every `(name, language, ordinal, file)` expression in `dir`.
    fn expressions_in(dir: &Path) -> ResolverResult<Vec<(String, Language, i64, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(dir).map_err(|source| io_error(dir, source))? {
            let entry = entry.map_err(|source| io_error(dir, source))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let (Some(stem), Some(language)) = (visible_stem(&path), language_of(&path)) else {
                continue;
            };
            found.push((stem, language, modified_millis(&path), path));
        }
        Ok(found)
    }
}

fn io_error(path: &Path, source: io::Error) -> ResolverError {
    ResolverError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn visible_stem(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    (!stem.starts_with('.')).then(|| stem.to_string())
}

fn language_of(path: &Path) -> Option<Language> {
    Language::from_tag(path.extension()?.to_str()?)
}

fn modified_millis(path: &Path) -> i64 {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

impl Resolver for DirectoryResolver {
    fn list_items(&self, path: &[String]) -> ResolverResult<Vec<ResolverItem>> {
        let dir = self.dir(path);
        let mut items = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|source| io_error(&dir, source))? {
            let entry = entry.map_err(|source| io_error(&dir, source))?;
            let entry_path = entry.path();
            if entry_path.is_dir() {
                let Some(name) = entry_path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !name.starts_with('.') {
                    items.push(ResolverItem::folder(name, modified_millis(&entry_path)));
                }
            }
        }
        for (name, language, ordinal, _) in Self::expressions_in(&dir)? {
            items.push(ResolverItem::expression(name, language, ordinal));
        }
        items.sort_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name)));
        Ok(items)
    }

    fn get_expression(&self, path: &[String]) -> ResolverResult<Option<String>> {
        let Some((name, folders)) = path.split_last() else {
            return Ok(None);
        };
        let dir = self.dir(folders);
        // Same order as the listing, so the graph's first entry is the file read
        let file = Self::expressions_in(&dir)?
            .into_iter()
            .filter(|(stem, ..)| stem == name)
            .min_by(|a, b| (a.2, &a.3).cmp(&(b.2, &b.3)))
            .map(|(.., file)| file);
        match file {
            Some(file) => fs::read_to_string(&file)
                .map(Some)
                .map_err(|source| io_error(&file, source)),
            None => Ok(None),
        }
    }
}
