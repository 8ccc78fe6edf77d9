//! Lexical scopes for script execution.

use std::cell::RefCell;
use std::rc::Rc;

use quire_value::NativeValue;
use rustc_hash::FxHashMap;

use crate::error::{EvalError, EvalResult};

#[derive(Debug)]
struct Variable {
    value: NativeValue,
    constant: bool,
}

#[derive(Debug, Default)]
struct Frame {
    vars: RefCell<FxHashMap<String, Variable>>,
    parent: Option<Scope>,
}

/// A shared handle to one block's bindings and its enclosing scopes.
///
/// Closures keep their defining scope alive by holding a clone.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope(Rc<Frame>);

impl Scope {
    pub(crate) fn root() -> Self {
        Self::default()
    }

    pub(crate) fn child(&self) -> Self {
        Self(Rc::new(Frame {
            vars: RefCell::default(),
            parent: Some(self.clone()),
        }))
    }

    /// Declare in this scope. Redeclaring a name in the same block fails.
    pub(crate) fn declare(&self, name: &str, value: NativeValue, constant: bool) -> EvalResult<()> {
        let mut vars = self.0.vars.borrow_mut();
        if vars.contains_key(name) {
            return Err(EvalError::runtime(format!("'{name}' has already been declared")));
        }
        vars.insert(name.to_string(), Variable { value, constant });
        Ok(())
    }

    /// Declare or replace, for hoisted functions and parameters.
    pub(crate) fn define(&self, name: &str, value: NativeValue) {
        self.0.vars.borrow_mut().insert(
            name.to_string(),
            Variable {
                value,
                constant: false,
            },
        );
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<NativeValue> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(var) = scope.0.vars.borrow().get(name) {
                return Some(var.value.clone());
            }
            current = scope.0.parent.as_ref();
        }
        None
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.0.vars.borrow().contains_key(name) {
                return true;
            }
            current = scope.0.parent.as_ref();
        }
        false
    }

    /// Update the nearest binding of `name`. Returns `false` when the
    /// script never declared it.
    pub(crate) fn assign(&self, name: &str, value: NativeValue) -> EvalResult<bool> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(var) = scope.0.vars.borrow_mut().get_mut(name) {
                if var.constant {
                    return Err(EvalError::ConstAssignment(name.to_string()));
                }
                var.value = value;
                return Ok(true);
            }
            current = scope.0.parent.as_ref();
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_updates_enclosing_scope() {
        let root = Scope::root();
        root.declare("x", NativeValue::Number(1.0), false).unwrap();
        let inner = root.child();
        assert!(inner.assign("x", NativeValue::Number(2.0)).unwrap());
        assert_eq!(root.lookup("x").and_then(|v| v.as_number()), Some(2.0));
    }

    #[test]
    fn test_const_and_unknown_assignment() {
        let root = Scope::root();
        root.declare("k", NativeValue::Null, true).unwrap();
        assert_eq!(
            root.assign("k", NativeValue::Null),
            Err(EvalError::ConstAssignment("k".into()))
        );
        assert_eq!(root.assign("missing", NativeValue::Null), Ok(false));
    }

    #[test]
    fn test_redeclaration_in_same_block_fails() {
        let root = Scope::root();
        root.declare("a", NativeValue::Null, false).unwrap();
        assert!(root.declare("a", NativeValue::Null, false).is_err());
        assert!(root.child().declare("a", NativeValue::Null, false).is_ok());
    }
}
