//! Error types for adtrace.

use thiserror::Error;

/// Errors that can occur while tracing or replaying a computation graph.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Session misconfiguration: missing dependent declarations, or a count
    /// mismatch between supplied values/adjoints and declared nodes.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No forward evaluator registered for (operation, value type).
    #[error("no forward evaluator for op `{op}` on `{value_type}` (node {node})")]
    UnsupportedForward {
        op: &'static str,
        value_type: &'static str,
        node: usize,
    },

    /// No pullback evaluator registered for (operation, value type).
    #[error("no pullback evaluator for op `{op}` on `{value_type}` (node {node})")]
    UnsupportedPullback {
        op: &'static str,
        value_type: &'static str,
        node: usize,
    },

    /// An evaluator received a value of the wrong concrete type.
    #[error("type mismatch: expected `{expected}`, got `{actual}`")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Wrong number of arguments for an operation.
    #[error("op `{op}` expects {expected} argument(s), got {actual}")]
    Arity {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Missing or ill-typed auxiliary argument.
    #[error("op `{op}` is missing auxiliary argument {index}")]
    MissingAux { op: &'static str, index: usize },

    /// Argument outside a function's declared domain.
    #[error("domain error: `{func}` is undefined for x = {x} (domain: {domain})")]
    Domain {
        func: &'static str,
        x: f64,
        domain: &'static str,
    },

    /// Negative derivative order.
    #[error("derivative order must be nonnegative, got {order}")]
    InvalidOrder { order: i32 },

    /// Tuple selection index out of range.
    #[error("selection index {index} out of range for tuple of arity {arity}")]
    SelectOutOfRange { index: usize, arity: usize },
}
