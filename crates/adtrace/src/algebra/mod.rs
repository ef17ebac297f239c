//! Built-in algebra adapters.
//!
//! Each adapter supplies forward and pullback evaluators for one traced
//! value type and installs them into a [`Registry`](crate::Registry). The
//! graph engine itself knows none of them; out-of-tree value types plug in
//! the same way.

pub mod scalar;
pub mod taylor;
