//! Evaluation sessions.
//!
//! A session owns every mutable cache of one evaluation: results by
//! path, the in-flight set used for cycle detection, compiled scripts,
//! per-folder providers, computed folder mappings and relative imports.
//! Nothing is computed until it is asked for, and every expression runs
//! at most once until the time changes.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use quire_eval::{evaluate as evaluate_formula, run_script, FormulaContext, ScriptOptions};
use quire_parser::{parse_formula, parse_script};
use quire_types::ast::script::Script;
use quire_types::{ErrorDetail, ErrorKind, Language, SourceFile};
use quire_value::{normalize_key, to_native, to_typed, TypedMap, TypedValue};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::{EvaluateOptions, SessionConfig};
use crate::diagnostics;
use crate::executor_cache::ExecutorCache;
use crate::graph::{child_key, path_key, CollectionGraph, ExpressionNode};
use crate::library::{library, LIBRARY_NAME};
use crate::module::{import_function, ModuleHost};
use crate::provider::{BridgeScope, Provider};
use crate::resolver::Resolver;
use crate::result::EvaluationResult;

/// Folder members that stand for the folder itself, in priority order.
const SENTINELS: [&str; 2] = ["return", "eval"];

/// Largest magnitude at which every integer is exactly representable as a
/// double.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Counters over the lifetime of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Expression sources actually executed.
    pub executions: u64,
    /// Lookups answered from the result cache.
    pub cache_hits: u64,
    /// Lookups that found their expression already in flight.
    pub circular_detections: u64,
}

/// Shared state behind a [`Session`] or a loaded module.
pub(crate) struct SessionState {
    pub(crate) graph: CollectionGraph,
    resolver: Rc<dyn Resolver>,
    pub(crate) config: SessionConfig,
    /// Root bindings ahead of the built-ins.
    pub(crate) overrides: IndexMap<String, TypedValue>,
    library: TypedValue,
    math: TypedValue,
    pub(crate) time: Cell<f64>,
    /// Memoized results by normalized path.
    results: RefCell<FxHashMap<String, Rc<EvaluationResult>>>,
    /// Paths currently being executed.
    in_flight: RefCell<FxHashSet<String>>,
    /// Computed folder mappings. Sentinel-backed folder values live in
    /// `results` instead.
    folder_values: RefCell<FxHashMap<String, TypedValue>>,
    /// Relative imports by resolved path.
    pub(crate) imports: RefCell<FxHashMap<String, TypedValue>>,
    providers: RefCell<FxHashMap<String, Rc<Provider>>>,
    executors: RefCell<ExecutorCache>,
    pub(crate) modules: Weak<ModuleHost>,
    stats: Cell<SessionStats>,
    /// `None` for the root session, the specifier for a module.
    module: Option<String>,
}

fn time_value(seconds: f64) -> TypedValue {
    if seconds.fract() == 0.0 && seconds.abs() <= MAX_SAFE_INTEGER {
        TypedValue::Integer(seconds as i64)
    } else if seconds.is_finite() {
        TypedValue::Float(seconds)
    } else {
        TypedValue::Null
    }
}

fn is_sentinel(name: &str) -> bool {
    SENTINELS.contains(&normalize_key(name).as_str())
}

impl SessionState {
    pub(crate) fn new(
        resolver: Rc<dyn Resolver>,
        time: f64,
        config: SessionConfig,
        overrides: IndexMap<String, TypedValue>,
        modules: Weak<ModuleHost>,
        module: Option<String>,
    ) -> Rc<Self> {
        let graph = CollectionGraph::build(&*resolver);
        let executors = ExecutorCache::new(config.executor_cache_capacity);
        Rc::new(Self {
            graph,
            resolver,
            config,
            overrides,
            library: library(),
            math: quire_eval::math::module(),
            time: Cell::new(time),
            results: RefCell::default(),
            in_flight: RefCell::default(),
            folder_values: RefCell::default(),
            imports: RefCell::default(),
            providers: RefCell::default(),
            executors: RefCell::new(executors),
            modules,
            stats: Cell::default(),
            module,
        })
    }

    fn bump(&self, update: impl FnOnce(&mut SessionStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    /// Drop every time-dependent cache. The graph, providers and compiled
    /// scripts stay.
    pub(crate) fn reset(&self, time: f64) {
        self.time.set(time);
        self.results.borrow_mut().clear();
        self.folder_values.borrow_mut().clear();
        self.imports.borrow_mut().clear();
        debug!(time, module = self.module.as_deref(), "session caches cleared");
    }

    pub(crate) fn provider(self: &Rc<Self>, folder: &str) -> Rc<Provider> {
        if let Some(provider) = self.providers.borrow().get(folder) {
            return provider.clone();
        }
        let provider = Rc::new(Provider::new(Rc::downgrade(self), folder.to_string()));
        self.providers.borrow_mut().insert(folder.to_string(), provider.clone());
        provider
    }

    /// Root bindings: overrides, the time variable, `lib`, `math`, `import`.
    /// `origin` is the folder relative imports resolve against.
    pub(crate) fn root_binding(self: &Rc<Self>, name: &str, origin: &str) -> Option<TypedValue> {
        let key = normalize_key(name);
        if let Some(value) = self.overrides.get(&key) {
            return Some(value.clone());
        }
        if key == normalize_key(&self.config.time_variable_name) {
            return Some(time_value(self.time.get()));
        }
        match key.as_str() {
            LIBRARY_NAME => Some(self.library.clone()),
            "math" => Some(self.math.clone()),
            "import" => Some(import_function(Rc::downgrade(self), origin.to_string())),
            _ => None,
        }
    }

    /// The memoized result for the expression at `key`, computing it on
    /// first access. `None` when no such expression exists.
    pub(crate) fn evaluate_key(self: &Rc<Self>, key: &str) -> Option<Rc<EvaluationResult>> {
        let node = self.graph.expression(key)?;

        let cached = self.results.borrow().get(key).cloned();
        if let Some(result) = cached {
            self.bump(|stats| stats.cache_hits += 1);
            trace!(path = %node.display_path(), "cache hit");
            return Some(result);
        }

        if !self.in_flight.borrow_mut().insert(key.to_string()) {
            self.bump(|stats| stats.circular_detections += 1);
            debug!(path = %node.display_path(), "circular reference");
            return Some(Rc::new(EvaluationResult::engine(format!(
                "circular reference: {}",
                node.display_path()
            ))));
        }

        let result = Rc::new(self.execute(node));
        self.in_flight.borrow_mut().remove(key);
        self.results.borrow_mut().insert(key.to_string(), result.clone());
        Some(result)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %node.display_path(), language = %node.language))]
    fn execute(self: &Rc<Self>, node: &ExpressionNode) -> EvaluationResult {
        self.bump(|stats| stats.executions += 1);
        let source = match self.resolver.get_expression(&node.segments) {
            Ok(source) => source.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "source unavailable; evaluating as empty");
                String::new()
            }
        };
        let provider = self.provider(&node.parent);
        let result = match node.language {
            Language::Formula => self.run_formula(node, source, provider),
            Language::Script => self.run_script(node, &source, provider),
        };
        if let Some(message) = result.error() {
            debug!(error = message, "evaluation failed");
        }
        result
    }

    fn run_formula(&self, node: &ExpressionNode, source: String, provider: Rc<Provider>) -> EvaluationResult {
        let file = SourceFile::new(node.display_path(), source);
        let expr = match parse_formula(&file).into_result() {
            Ok(expr) => expr,
            Err(errors) => {
                let details = diagnostics::syntax_details(&errors, &file);
                if details.is_empty() {
                    return EvaluationResult::failure(vec![ErrorDetail::new(ErrorKind::Parser, "invalid formula")]);
                }
                return EvaluationResult::failure(details);
            }
        };
        let ctx = FormulaContext::with_max_depth(provider, self.config.max_call_depth);
        match evaluate_formula(&expr, &ctx) {
            Ok(typed) => {
                let native = to_native(&typed);
                native.freeze();
                EvaluationResult::success(native, typed)
            }
            Err(err) => EvaluationResult::from_eval_error(&err),
        }
    }

    fn run_script(&self, node: &ExpressionNode, source: &str, provider: Rc<Provider>) -> EvaluationResult {
        let script = match self.compile(node, source) {
            Ok(script) => script,
            Err(detail) => return EvaluationResult::failure(vec![detail]),
        };
        let scope = Rc::new(BridgeScope::new(provider));
        let options = ScriptOptions::new(node.name.clone()).with_max_call_depth(self.config.max_call_depth);
        match run_script(&script, scope, &options) {
            Ok(native) => match to_typed(&native) {
                Ok(typed) => {
                    // Readers share this value by reference
                    native.freeze();
                    EvaluationResult::success(native, typed)
                }
                Err(err) => EvaluationResult::from_value_error(&err),
            },
            Err(err) => EvaluationResult::from_script_error(&err),
        }
    }

    /// Compile `source`, or reuse the script compiled from identical text.
    fn compile(&self, node: &ExpressionNode, source: &str) -> Result<Rc<Script>, ErrorDetail> {
        if let Some(script) = self.executors.borrow().get(source) {
            return Ok(script);
        }
        let file = SourceFile::new(node.display_path(), source);
        let script = match parse_script(&file).into_result() {
            Ok(script) => Rc::new(script),
            Err(errors) => {
                let message = match errors.first() {
                    Some(error) => format!("syntax error at {}: {}", error.span, error.message),
                    None => "syntax error".to_string(),
                };
                return Err(ErrorDetail::new(ErrorKind::Runtime, message));
            }
        };
        self.executors.borrow_mut().insert(source, script.clone());
        Ok(script)
    }

    /// The value a folder presents when read as a single binding.
    pub(crate) fn folder_value(self: &Rc<Self>, key: &str) -> TypedValue {
        if self.graph.folder(key).is_none() {
            return TypedValue::Null;
        }
        for sentinel in SENTINELS {
            if let Some(result) = self.evaluate_key(&child_key(key, sentinel)) {
                return result.to_value();
            }
        }
        if let Some(value) = self.folder_values.borrow().get(key) {
            return value.clone();
        }

        let mut map = TypedMap::new();
        for node in self.graph.child_expressions(key) {
            if is_sentinel(&node.name) {
                continue;
            }
            let state = Rc::downgrade(self);
            let child = node.key.clone();
            map.insert_lazy(node.name.clone(), move || match state.upgrade() {
                Some(state) => state.evaluate_key(&child).map_or(TypedValue::Null, |result| result.to_value()),
                None => TypedValue::Null,
            });
        }
        for folder in self.graph.child_folders(key) {
            let state = Rc::downgrade(self);
            let child = folder.key.clone();
            map.insert_lazy(folder.name.clone(), move || match state.upgrade() {
                Some(state) => state.folder_value(&child),
                None => TypedValue::Null,
            });
        }

        let value = TypedValue::mapping(map);
        self.folder_values.borrow_mut().insert(key.to_string(), value.clone());
        value
    }
}

/// One evaluation of a namespace at a point in time.
///
/// Sessions are single-threaded: results are shared `Rc`s and every cache
/// uses interior mutability.
pub struct Session {
    state: Rc<SessionState>,
    modules: Rc<ModuleHost>,
}

impl Session {
    pub(crate) fn new(resolver: Rc<dyn Resolver>, time: f64, options: EvaluateOptions) -> Self {
        let modules = Rc::new(ModuleHost::new(options.modules));
        let state = SessionState::new(
            resolver,
            time,
            options.config,
            options.overrides,
            Rc::downgrade(&modules),
            None,
        );
        debug!(
            expressions = state.graph.expression_count(),
            folders = state.graph.folder_count(),
            time,
            "session created"
        );
        Self { state, modules }
    }

    /// Evaluate the expression at `path` (case-insensitive, `/`-separated).
    /// `None` when the path names no expression.
    pub fn evaluate_expression(&self, path: &str) -> Option<Rc<EvaluationResult>> {
        self.state.evaluate_key(&path_key(path))
    }

    /// Evaluate every expression, in listing order.
    pub fn evaluate_all(&self) -> Vec<(String, Rc<EvaluationResult>)> {
        let keys: Vec<(String, String)> = self
            .state
            .graph
            .expressions()
            .map(|node| (node.display_path(), node.key.clone()))
            .collect();
        keys.into_iter()
            .filter_map(|(path, key)| self.state.evaluate_key(&key).map(|result| (path, result)))
            .collect()
    }

    /// The computed value of the folder at `path`; `null` when unknown.
    pub fn get_folder_value(&self, path: &str) -> TypedValue {
        self.state.folder_value(&path_key(path))
    }

    /// Display paths of every expression, breadth-first.
    pub fn list_expressions(&self) -> Vec<String> {
        self.state.graph.expressions().map(ExpressionNode::display_path).collect()
    }

    /// Names of the folders directly inside `path`.
    pub fn list_folders(&self, path: &str) -> Vec<String> {
        self.state
            .graph
            .child_folders(&path_key(path))
            .map(|folder| folder.name.clone())
            .collect()
    }

    /// Move to `seconds`. Every result is recomputed on next access;
    /// imported modules are reloaded.
    pub fn set_time(&mut self, seconds: f64) {
        self.state.reset(seconds);
        self.modules.clear();
    }

    pub fn time(&self) -> f64 {
        self.state.time.get()
    }

    pub fn stats(&self) -> SessionStats {
        self.state.stats.get()
    }

    pub fn graph(&self) -> &CollectionGraph {
        &self.state.graph
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("time", &self.time())
            .field("expressions", &self.state.graph.expression_count())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_value_tags() {
        assert!(matches!(time_value(3.0), TypedValue::Integer(3)));
        assert!(matches!(time_value(1.5), TypedValue::Float(x) if x == 1.5));
        assert!(matches!(time_value(1e300), TypedValue::Float(_)));
        assert!(time_value(f64::NAN).is_null());
    }

    #[test]
    fn test_sentinels_match_case_insensitively() {
        assert!(is_sentinel("Return"));
        assert!(is_sentinel("EVAL"));
        assert!(!is_sentinel("returns"));
    }
}
