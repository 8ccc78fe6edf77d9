//! Errors raised while converting or calling values.

use thiserror::Error;

/// Failure of a value-level operation: conversion, or a call into a
/// function value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// A native structure refers back to itself.
    #[error("cannot convert cyclic value")]
    CyclicValue,
    /// A failure raised by the engine itself (cycles, unresolved modules).
    #[error("{0}")]
    Engine(String),
    /// A failure raised while running user code or a built-in.
    #[error("{0}")]
    Runtime(String),
}

impl ValueError {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// Returns `true` for failures the engine reports as engine-internal.
    pub fn is_engine(&self) -> bool {
        matches!(self, Self::CyclicValue | Self::Engine(_))
    }
}

pub type ValueResult<T> = Result<T, ValueError>;
