//! Per-folder name resolution.
//!
//! A name is looked up in the provider's folder, then each enclosing
//! folder up to the root, then among the session's root bindings. Inside
//! a folder an expression shadows a child folder of the same name.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use quire_eval::script::builtins;
use quire_eval::{EvalError, EvalResult, FormulaScope, HostScope};
use quire_types::ErrorKind;
use quire_value::{to_native, NativeValue, TypedValue, ValueError, ValueResult};
use rustc_hash::FxHashMap;

use crate::graph::child_key;
use crate::result::EvaluationResult;
use crate::session::SessionState;

/// What a name resolves to.
pub(crate) enum Binding {
    Expression(String),
    Folder(String),
    Value(TypedValue),
}

pub(crate) struct Provider {
    state: Weak<SessionState>,
    folder: String,
}

fn session_gone() -> EvalError {
    EvalError::Engine("evaluation session is no longer available".to_string())
}

/// The error a reader of a failed binding sees.
fn raise(name: &str, kind: &str, message: &str) -> EvalError {
    if kind == ErrorKind::Engine.as_str() {
        EvalError::Engine(message.to_string())
    } else {
        EvalError::Dependency {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

fn raise_result(name: &str, result: &EvaluationResult) -> EvalError {
    let kind = result.error_kind().unwrap_or(ErrorKind::Runtime);
    raise(name, kind.as_str(), result.error().unwrap_or_default())
}

impl Provider {
    pub(crate) fn new(state: Weak<SessionState>, folder: String) -> Self {
        Self { state, folder }
    }

    pub(crate) fn resolve(&self, state: &Rc<SessionState>, name: &str) -> Option<Binding> {
        let mut folder = Some(self.folder.as_str());
        while let Some(key) = folder {
            let child = child_key(key, name);
            if state.graph.expression(&child).is_some() {
                return Some(Binding::Expression(child));
            }
            if state.graph.folder(&child).is_some() {
                return Some(Binding::Folder(child));
            }
            folder = state.graph.folder(key).and_then(|node| node.parent.as_deref());
        }
        state.root_binding(name, &self.folder).map(Binding::Value)
    }

    fn typed(&self, state: &Rc<SessionState>, name: &str, binding: Binding) -> EvalResult<TypedValue> {
        match binding {
            Binding::Expression(key) => match state.evaluate_key(&key) {
                Some(result) => match &*result {
                    EvaluationResult::Value { typed, .. } => Ok(typed.clone()),
                    EvaluationResult::Error { .. } => Err(raise_result(name, &result)),
                },
                None => Ok(TypedValue::Null),
            },
            Binding::Folder(key) => match state.folder_value(&key) {
                TypedValue::Error(err) => Err(raise(name, &err.kind, &err.message)),
                value => Ok(value),
            },
            Binding::Value(value) => Ok(value),
        }
    }

    /// The native projection of a binding. Expression results already
    /// carry one; scripts hand back the exact value they produced.
    fn native(&self, state: &Rc<SessionState>, name: &str, binding: Binding) -> EvalResult<NativeValue> {
        match binding {
            Binding::Expression(key) => match state.evaluate_key(&key) {
                Some(result) => match &*result {
                    EvaluationResult::Value { value, .. } => Ok(value.clone()),
                    EvaluationResult::Error { .. } => Err(raise_result(name, &result)),
                },
                None => Ok(NativeValue::Null),
            },
            other => self.typed(state, name, other).map(|value| to_native(&value)),
        }
    }
}

impl FormulaScope for Provider {
    fn lookup(&self, name: &str) -> EvalResult<Option<TypedValue>> {
        let state = self.state.upgrade().ok_or_else(session_gone)?;
        match self.resolve(&state, name) {
            Some(binding) => self.typed(&state, name, binding).map(Some),
            None => Ok(None),
        }
    }
}

/// The scope a script runs against: host built-ins first, then the
/// provider chain. Each name is resolved at most once per execution.
pub(crate) struct BridgeScope {
    provider: Rc<Provider>,
    memo: RefCell<FxHashMap<String, NativeValue>>,
}

impl BridgeScope {
    pub(crate) fn new(provider: Rc<Provider>) -> Self {
        Self {
            provider,
            memo: RefCell::new(FxHashMap::default()),
        }
    }
}

impl HostScope for BridgeScope {
    fn has(&self, name: &str) -> bool {
        if builtins::is_global(name) || self.memo.borrow().contains_key(name) {
            return true;
        }
        self.provider
            .state
            .upgrade()
            .is_some_and(|state| self.provider.resolve(&state, name).is_some())
    }

    fn get(&self, name: &str) -> ValueResult<Option<NativeValue>> {
        if let Some(value) = self.memo.borrow().get(name) {
            return Ok(Some(value.clone()));
        }
        let value = match builtins::global(name) {
            Some(value) => value,
            None => {
                let state = self.provider.state.upgrade().ok_or_else(|| ValueError::from(session_gone()))?;
                let Some(binding) = self.provider.resolve(&state, name) else {
                    return Ok(None);
                };
                self.provider.native(&state, name, binding).map_err(ValueError::from)?
            }
        };
        self.memo.borrow_mut().insert(name.to_string(), value.clone());
        Ok(Some(value))
    }
}
