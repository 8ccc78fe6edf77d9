//! Quire value model.
//!
//! [`TypedValue`] is what evaluation produces and what formulas compute
//! with; [`NativeValue`] is what scripts compute with. [`to_native`] and
//! [`to_typed`] convert between them.

pub mod convert;
pub mod error;
pub mod json;
pub mod native;
pub mod typed;

pub use convert::{to_native, to_typed};
pub use error::{ValueError, ValueResult};
pub use json::{from_json, native_from_json, native_to_json, to_json};
pub use native::{
    format_number, parse_number, Callable, NativeArray, NativeFunction, NativeObject, NativeValue, Shared,
};
pub use typed::{
    normalize_key, ErrorValue, FunctionValue, TypedCallable, TypedList, TypedMap, TypedValue,
};
