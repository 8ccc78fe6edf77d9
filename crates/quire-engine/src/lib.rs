//! Quire engine: on-demand, memoized evaluation of a folder/expression
//! namespace.
//!
//! ```text
//! Resolver → CollectionGraph → Session ─┬─ formula evaluator
//!                                       └─ script interpreter
//! ```
//!
//! ```ignore
//! let resolver = MemoryResolver::new()
//!     .formula("x", "21")
//!     .script("double", "return x * 2");
//! let session = evaluate(Rc::new(resolver), Some(0.0), EvaluateOptions::default());
//! let result = session.evaluate_expression("double").unwrap();
//! assert_eq!(result.typed().and_then(|v| v.as_i64()), Some(42));
//! ```

pub mod config;
pub mod diagnostics;
pub mod executor_cache;
pub mod graph;
pub mod library;
pub mod module;
mod provider;
pub mod resolver;
mod result;
mod session;

use std::rc::Rc;

use chrono::Utc;

pub use config::{EvaluateOptions, SessionConfig};
pub use graph::{CollectionGraph, ExpressionNode, FolderNode};
pub use module::ModuleRegistry;
pub use resolver::{
    DirectoryResolver, ItemKind, MemoryResolver, Resolver, ResolverError, ResolverItem, ResolverResult,
};
pub use result::EvaluationResult;
pub use session::{Session, SessionStats};

/// Start a session over `resolver` at `time` seconds (the wall clock when
/// `None`). Nothing is evaluated until a path is requested.
pub fn evaluate(resolver: Rc<dyn Resolver>, time: Option<f64>, options: EvaluateOptions) -> Session {
    let time = time.unwrap_or_else(|| Utc::now().timestamp_millis() as f64 / 1000.0);
    Session::new(resolver, time, options)
}
