//! Lexical environment for formula `let` bodies and lambdas.

use std::rc::Rc;

use quire_value::TypedValue;

#[derive(Debug)]
struct Binding {
    name: String,
    value: TypedValue,
    parent: Environment,
}

/// Persistent chain of local bindings.
///
/// Binding a name returns a new environment that shares its parent, so a
/// lambda can capture the environment it was created in by cloning it.
/// Lookups search from the innermost binding outward.
#[derive(Debug, Clone, Default)]
pub struct Environment(Option<Rc<Binding>>);

impl Environment {
    /// An environment with no bindings.
    pub fn new() -> Self {
        Self(None)
    }

    /// Extend with one binding, shadowing any outer binding of `name`.
    pub fn bind(&self, name: &str, value: TypedValue) -> Self {
        Self(Some(Rc::new(Binding {
            name: name.to_string(),
            value,
            parent: self.clone(),
        })))
    }

    /// Look up a local binding.
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        let mut current = self.0.as_deref();
        while let Some(binding) = current {
            if binding.name == name {
                return Some(&binding.value);
            }
            current = binding.parent.0.as_deref();
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_binding_shadows_outer() {
        let outer = Environment::new().bind("x", TypedValue::Integer(1));
        let inner = outer.bind("x", TypedValue::Integer(2));
        assert_eq!(inner.get("x").and_then(TypedValue::as_i64), Some(2));
        assert_eq!(outer.get("x").and_then(TypedValue::as_i64), Some(1));
    }

    #[test]
    fn test_missing_binding() {
        let env = Environment::new().bind("a", TypedValue::Null);
        assert!(env.get("b").is_none());
        assert!(Environment::new().is_empty());
    }
}
