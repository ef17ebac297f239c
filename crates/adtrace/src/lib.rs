//! adtrace - reverse-mode automatic differentiation via a replayable
//! computation graph.
//!
//! Traced operations are recorded eagerly into a DAG (the `CGraph`) which
//! can then be replayed in both directions: `push_forward` re-evaluates the
//! whole procedure with new input values, `pullback` propagates seed
//! adjoints from the declared outputs back to every node. The engine is
//! agnostic to the numeric algebra being differentiated; evaluators are
//! resolved through an open registry keyed by (operation, runtime value
//! type).
//!
//! # Architecture
//!
//! ```text
//! Var (traced handle)  ──records into──►  CGraph (Session-owned)
//!        │                                     │
//!        ▼                                     ▼
//!   Box<dyn Value>                        Vec<Node>
//!   (f64, Utp, tuple)                          │
//!                                              ▼
//!                              Registry: (Op, TypeId) → forward/pullback
//!                                              │
//!                                              ▼
//!                                  algebra adapters ── nthderiv oracle
//! ```
//!
//! # Example
//!
//! ```
//! use adtrace::{Session, TraceError, value::boxed};
//!
//! fn main() -> Result<(), TraceError> {
//!     let session = Session::new();
//!     let x1 = session.leaf(2.0);
//!     let x2 = session.leaf(3.0);
//!     let x3 = session.leaf(4.0);
//!
//!     // y = x1 * (x2 + x3), evaluated eagerly while recording
//!     let sum = &x2 + &x3;
//!     let y = &x1 * &sum;
//!     assert_eq!(y.scalar_value()?, 14.0);
//!
//!     session.set_independent(&[&x1, &x2, &x3])?;
//!     session.set_dependent(&[&y])?;
//!
//!     // gradient of y at (2, 3, 4)
//!     session.pullback(vec![boxed(1.0)])?;
//!     assert_eq!(x1.scalar_adjoint()?, 7.0);
//!     assert_eq!(x2.scalar_adjoint()?, 2.0);
//!     assert_eq!(x3.scalar_adjoint()?, 2.0);
//!
//!     // replay the same procedure with new inputs
//!     session.push_forward(vec![boxed(1.0), boxed(10.0), boxed(20.0)])?;
//!     assert_eq!(y.scalar_value()?, 30.0);
//!     Ok(())
//! }
//! ```

pub mod algebra;
pub mod error;
pub mod graph;
pub mod nthderiv;
pub mod registry;
pub mod session;
pub mod value;
pub mod var;

pub use algebra::taylor::Utp;
pub use error::TraceError;
pub use graph::{CGraph, Node, NodeId};
pub use registry::{Op, Registry, ops};
pub use session::Session;
pub use value::{Aux, Value, ValueTuple};
pub use var::Var;
