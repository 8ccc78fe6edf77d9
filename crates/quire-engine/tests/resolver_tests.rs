//! Integration tests for the directory resolver.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use quire_engine::{evaluate, DirectoryResolver, EvaluateOptions, ItemKind, Resolver};
use quire_types::Language;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "x.fx", "21");
    write(dir.path(), "double.js", "return x * 2");
    write(dir.path(), "shapes/area.fx", "x + 1");
    write(dir.path(), ".hidden.fx", "1");
    write(dir.path(), "notes.txt", "not an expression");
    fs::create_dir_all(dir.path().join(".git")).unwrap();
    dir
}

#[test]
fn listing_classifies_entries() {
    let dir = workspace();
    let resolver = DirectoryResolver::new(dir.path());
    let mut items: Vec<_> = resolver
        .list_items(&[])
        .unwrap()
        .into_iter()
        .map(|item| (item.name, item.kind, item.language))
        .collect();
    items.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        items,
        vec![
            ("double".to_string(), ItemKind::Expression, Some(Language::Script)),
            ("shapes".to_string(), ItemKind::Folder, None),
            ("x".to_string(), ItemKind::Expression, Some(Language::Formula)),
        ]
    );
}

#[test]
fn sources_are_read_by_stem() {
    let dir = workspace();
    let resolver = DirectoryResolver::new(dir.path());
    assert_eq!(resolver.get_expression(&path(&["x"])).unwrap().as_deref(), Some("21"));
    assert_eq!(resolver.get_expression(&path(&["shapes", "area"])).unwrap().as_deref(), Some("x + 1"));
    assert_eq!(resolver.get_expression(&path(&["missing"])).unwrap(), None);
}

#[test]
fn directory_namespace_evaluates() {
    let dir = workspace();
    let session = evaluate(Rc::new(DirectoryResolver::new(dir.path())), Some(0.0), EvaluateOptions::default());
    let double = session.evaluate_expression("double").unwrap();
    assert_eq!(double.typed().and_then(|v| v.as_i64()), Some(42));
    let area = session.evaluate_expression("shapes/area").unwrap();
    assert_eq!(area.typed().and_then(|v| v.as_i64()), Some(22));
    let mut paths = session.list_expressions();
    paths.sort();
    assert_eq!(paths, vec!["double", "shapes/area", "x"]);
}

#[test]
fn missing_root_is_an_empty_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = DirectoryResolver::new(dir.path().join("absent"));
    assert!(resolver.list_items(&[]).is_err());
    let session = evaluate(Rc::new(resolver), Some(0.0), EvaluateOptions::default());
    assert!(session.list_expressions().is_empty());
    assert!(session.evaluate_expression("x").is_none());
}
