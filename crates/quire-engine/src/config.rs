//! Session configuration.

use indexmap::IndexMap;
use quire_eval::DEFAULT_MAX_CALL_DEPTH;
use quire_value::{normalize_key, TypedValue};
use serde::{Deserialize, Serialize};

use crate::executor_cache::DEFAULT_EXECUTOR_CACHE_CAPACITY;
use crate::module::ModuleRegistry;

/// Tunables for one session. Loadable from JSON:
///
/// ```json
/// { "timeVariableName": "frame", "executorCacheCapacity": 64 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Root binding holding the session time, in seconds.
    pub time_variable_name: String,
    pub executor_cache_capacity: usize,
    /// Nested call limit for both languages.
    pub max_call_depth: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            time_variable_name: "t".to_string(),
            executor_cache_capacity: DEFAULT_EXECUTOR_CACHE_CAPACITY,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl SessionConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_time_variable(mut self, name: impl Into<String>) -> Self {
        self.time_variable_name = name.into();
        self
    }

    pub fn with_executor_cache_capacity(mut self, capacity: usize) -> Self {
        self.executor_cache_capacity = capacity;
        self
    }

    pub fn with_max_call_depth(mut self, depth: u32) -> Self {
        self.max_call_depth = depth;
        self
    }
}

/// Everything [`evaluate`](crate::evaluate) accepts besides the resolver
/// and the time.
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    pub config: SessionConfig,
    /// Root bindings consulted before every built-in, keyed by normalized name.
    pub overrides: IndexMap<String, TypedValue>,
    pub modules: ModuleRegistry,
}

impl EvaluateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_time_variable(mut self, name: impl Into<String>) -> Self {
        self.config.time_variable_name = name.into();
        self
    }

    /// Bind `name` at the root ahead of the time variable and `lib`.
    /// The first binding of a name wins.
    pub fn with_override(mut self, name: &str, value: TypedValue) -> Self {
        self.overrides.entry(normalize_key(name)).or_insert(value);
        self
    }

    pub fn with_modules(mut self, modules: ModuleRegistry) -> Self {
        self.modules = modules;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SessionConfig::from_json(r#"{ "timeVariableName": "frame" }"#).unwrap();
        assert_eq!(config.time_variable_name, "frame");
        assert_eq!(config.executor_cache_capacity, 256);
        assert_eq!(config.max_call_depth, 256);
    }

    #[test]
    fn test_override_names_are_normalized() {
        let options = EvaluateOptions::new()
            .with_override("Scale", TypedValue::Integer(2))
            .with_override("scale", TypedValue::Integer(3));
        assert_eq!(options.overrides.len(), 1);
        assert_eq!(options.overrides.get("scale").and_then(|v| v.as_i64()), Some(2));
    }
}
