//! Module imports.
//!
//! `import("name")` loads the namespace registered under `name` into its
//! own session and yields that namespace's root folder value.
//! `import("./path")` and `import("../path")` resolve against the calling
//! folder inside the calling module instead.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use quire_types::ErrorKind;
use quire_value::{normalize_key, FunctionValue, TypedValue, ValueError, ValueResult};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::resolver::Resolver;
use crate::session::SessionState;

/// Bare module specifiers and the namespaces they load.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    entries: IndexMap<String, Rc<dyn Resolver>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, specifier: impl Into<String>, resolver: impl Resolver + 'static) -> Self {
        self.register(specifier, Rc::new(resolver));
        self
    }

    pub fn register(&mut self, specifier: impl Into<String>, resolver: Rc<dyn Resolver>) {
        self.entries.insert(specifier.into(), resolver);
    }

    pub fn get(&self, specifier: &str) -> Option<Rc<dyn Resolver>> {
        self.entries.get(specifier).cloned()
    }

    pub fn specifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("specifiers", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Loaded module sessions, shared by the root session and every module.
pub(crate) struct ModuleHost {
    registry: ModuleRegistry,
    loaded: RefCell<FxHashMap<String, Rc<SessionState>>>,
    /// Specifiers whose root value is being computed.
    loading: RefCell<FxHashSet<String>>,
}

impl ModuleHost {
    pub(crate) fn new(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            loaded: RefCell::default(),
            loading: RefCell::default(),
        }
    }

    pub(crate) fn clear(&self) {
        self.loaded.borrow_mut().clear();
    }

    /// The session for `specifier`, created with the importer's time and
    /// configuration on first use.
    fn load(self: &Rc<Self>, specifier: &str, importer: &SessionState) -> ValueResult<Rc<SessionState>> {
        let loaded = self.loaded.borrow().get(specifier).cloned();
        if let Some(state) = loaded {
            return Ok(state);
        }
        if self.loading.borrow().contains(specifier) {
            return Err(ValueError::engine(format!("circular import: '{specifier}'")));
        }
        let resolver = self.registry.get(specifier).ok_or_else(|| not_found(specifier))?;

        debug!(module = specifier, "loading module");
        let state = SessionState::new(
            resolver,
            importer.time.get(),
            importer.config.clone(),
            importer.overrides.clone(),
            Rc::downgrade(self),
            Some(specifier.to_string()),
        );

        self.loading.borrow_mut().insert(specifier.to_string());
        let root = state.folder_value("");
        self.loading.borrow_mut().remove(specifier);
        raise(&root)?;

        self.loaded.borrow_mut().insert(specifier.to_string(), state.clone());
        Ok(state)
    }
}

fn not_found(specifier: &str) -> ValueError {
    ValueError::engine(format!("module not found: '{specifier}'"))
}

fn raise(value: &TypedValue) -> ValueResult<()> {
    match value {
        TypedValue::Error(err) if err.kind == ErrorKind::Engine.as_str() => Err(ValueError::engine(err.message.clone())),
        TypedValue::Error(err) => Err(ValueError::runtime(err.message.clone())),
        _ => Ok(()),
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// Resolve a relative specifier against the folder keyed `origin`.
/// `None` when it climbs above the root.
pub(crate) fn resolve_relative(origin: &str, specifier: &str) -> Option<String> {
    let mut segments: Vec<String> = origin
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect();
    let parts: Vec<&str> = specifier.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        match *part {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            name if i + 1 == parts.len() => {
                let stem = [".fx", ".js"]
                    .iter()
                    .find_map(|ext| name.strip_suffix(ext))
                    .unwrap_or(name);
                segments.push(normalize_key(stem));
            }
            name => segments.push(normalize_key(name)),
        }
    }
    Some(segments.join("/"))
}

/// The `import` function bound at the root of `state`, resolving relative
/// specifiers against `origin`.
pub(crate) fn import_function(state: Weak<SessionState>, origin: String) -> TypedValue {
    TypedValue::Function(FunctionValue::from_fn("import", move |args| {
        let specifier = match args.first() {
            Some(TypedValue::String(s)) => s.to_string(),
            _ => return Err(ValueError::runtime("import expects a module specifier string")),
        };
        let state = state
            .upgrade()
            .ok_or_else(|| ValueError::engine("evaluation session is no longer available"))?;
        import(&state, &origin, &specifier)
    }))
}

pub(crate) fn import(state: &Rc<SessionState>, origin: &str, specifier: &str) -> ValueResult<TypedValue> {
    let value = if is_relative(specifier) {
        let key = resolve_relative(origin, specifier).ok_or_else(|| not_found(specifier))?;
        let cached = state.imports.borrow().get(&key).cloned();
        match cached {
            Some(value) => value,
            None => {
                let value = if state.graph.expression(&key).is_some() {
                    state
                        .evaluate_key(&key)
                        .map_or(TypedValue::Null, |result| result.to_value())
                } else if state.graph.folder(&key).is_some() {
                    state.folder_value(&key)
                } else {
                    return Err(not_found(specifier));
                };
                state.imports.borrow_mut().insert(key, value.clone());
                value
            }
        }
    } else {
        let host = state
            .modules
            .upgrade()
            .ok_or_else(|| ValueError::engine("evaluation session is no longer available"))?;
        host.load(specifier, state)?.folder_value("")
    };
    raise(&value)?;
    Ok(value)
}
