//! Traced value handles.
//!
//! A [`Var`] wraps a node of a session's computation graph and exposes the
//! arithmetic surface of the underlying algebra. Every operation evaluates
//! eagerly through the session's registry and appends one node to the graph
//! (operator-overloading trace): the returned `Var` already carries the
//! forward value.

use crate::error::TraceError;
use crate::graph::NodeId;
use crate::registry::{Op, ops};
use crate::session::SessionInner;
use crate::value::{Aux, Value, as_f64};
use smallvec::SmallVec;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

/// Handle to a traced value: a node in a session's computation graph.
///
/// Cloning a `Var` clones the handle, not the node.
#[derive(Clone)]
pub struct Var {
    inner: Rc<SessionInner>,
    id: NodeId,
}

impl Var {
    pub(crate) fn from_parts(inner: Rc<SessionInner>, id: NodeId) -> Self {
        Self { inner, id }
    }

    pub(crate) fn same_session(&self, inner: &Rc<SessionInner>) -> bool {
        Rc::ptr_eq(&self.inner, inner)
    }

    /// Node id of this handle within its graph.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Clone out the node's current forward value.
    pub fn value(&self) -> Box<dyn Value> {
        self.inner.graph.borrow().nodes()[self.id.index()]
            .value()
            .clone_boxed()
    }

    /// Clone out the node's current adjoint, if a pullback pass has run.
    pub fn adjoint(&self) -> Option<Box<dyn Value>> {
        self.inner.graph.borrow().nodes()[self.id.index()]
            .adjoint()
            .map(|a| a.clone_boxed())
    }

    /// Read the forward value as a concrete type.
    pub fn value_as<V: Value + Clone + 'static>(&self) -> Result<V, TraceError> {
        let value = self.value();
        value
            .as_any()
            .downcast_ref::<V>()
            .cloned()
            .ok_or(TraceError::TypeMismatch {
                expected: "requested value type",
                actual: value.type_label(),
            })
    }

    /// Read the adjoint as a concrete type. Errors if no pullback pass has
    /// initialized it.
    pub fn adjoint_as<V: Value + Clone + 'static>(&self) -> Result<V, TraceError> {
        let adjoint = self.adjoint().ok_or_else(|| {
            TraceError::Configuration(format!(
                "adjoint of node {} not initialized; run pullback first",
                self.id.index()
            ))
        })?;
        adjoint
            .as_any()
            .downcast_ref::<V>()
            .cloned()
            .ok_or(TraceError::TypeMismatch {
                expected: "requested adjoint type",
                actual: adjoint.type_label(),
            })
    }

    /// Forward value as `f64`.
    pub fn scalar_value(&self) -> Result<f64, TraceError> {
        as_f64(self.value().as_ref())
    }

    /// Adjoint as `f64`.
    pub fn scalar_adjoint(&self) -> Result<f64, TraceError> {
        self.adjoint_as::<f64>()
    }

    /// Record an operation: evaluate `op` forward over `args` (which must
    /// include every traced argument, in call order) and append a node.
    pub fn apply(&self, op: Op, args: &[&Var], aux: Vec<Aux>) -> Result<Var, TraceError> {
        for arg in args {
            if !arg.same_session(&self.inner) {
                return Err(TraceError::Configuration(
                    "variables from different sessions cannot be combined".into(),
                ));
            }
        }
        let value = {
            let graph = self.inner.graph.borrow();
            let nodes = graph.nodes();
            let arg_values: SmallVec<[&dyn Value; 2]> =
                args.iter().map(|a| nodes[a.id.index()].value()).collect();
            let f = self
                .inner
                .registry
                .forward_for(op, &arg_values)
                .ok_or_else(|| TraceError::UnsupportedForward {
                    op: op.name(),
                    value_type: arg_values.first().map_or("unknown", |a| a.type_label()),
                    node: graph.len(),
                })?;
            f(&arg_values, &aux)?
        };
        let arg_ids: SmallVec<[NodeId; 2]> = args.iter().map(|a| a.id).collect();
        let id = self
            .inner
            .graph
            .borrow_mut()
            .create_node(value, op, &arg_ids, aux)?;
        Ok(Var::from_parts(Rc::clone(&self.inner), id))
    }

    fn unary(&self, op: Op) -> Result<Var, TraceError> {
        self.apply(op, &[self], Vec::new())
    }

    pub fn sin(&self) -> Result<Var, TraceError> {
        self.unary(ops::SIN)
    }

    pub fn cos(&self) -> Result<Var, TraceError> {
        self.unary(ops::COS)
    }

    pub fn exp(&self) -> Result<Var, TraceError> {
        self.unary(ops::EXP)
    }

    /// Natural logarithm. Domain errors from the algebra surface here.
    pub fn ln(&self) -> Result<Var, TraceError> {
        self.unary(ops::LOG)
    }

    pub fn sqrt(&self) -> Result<Var, TraceError> {
        self.unary(ops::SQRT)
    }

    /// Integer power; the exponent rides along as an auxiliary argument.
    pub fn powi(&self, exponent: i32) -> Result<Var, TraceError> {
        self.apply(ops::POWI, &[self], vec![Aux::Int(i64::from(exponent))])
    }

    /// Two-output (sin, cos) node; pick slots with [`select`](Self::select).
    pub fn sincos(&self) -> Result<Var, TraceError> {
        self.unary(ops::SINCOS)
    }

    /// Select output `index` of a tuple-valued node.
    pub fn select(&self, index: usize) -> Result<Var, TraceError> {
        self.apply(ops::SELECT, &[self], vec![Aux::Index(index)])
    }

    fn lift_scalar(&self, c: f64) -> Var {
        let id = self.inner.graph.borrow_mut().create_leaf(Box::new(c));
        Var::from_parts(Rc::clone(&self.inner), id)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("id", &self.id.index())
            .field("value", &self.value())
            .finish()
    }
}

// Operator sugar. The std op traits cannot return Result, so these panic on
// a dispatch miss (an operation the session's registry has no evaluator
// for); use `Var::apply` directly when that must be a typed error.
macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<&Var> for &Var {
            type Output = Var;
            fn $method(self, rhs: &Var) -> Var {
                self.apply($op, &[self, rhs], Vec::new())
                    .expect("binary op evaluator registered for traced value type")
            }
        }

        impl $trait<f64> for &Var {
            type Output = Var;
            fn $method(self, rhs: f64) -> Var {
                let c = self.lift_scalar(rhs);
                self.apply($op, &[self, &c], Vec::new())
                    .expect("binary op evaluator registered for traced value type")
            }
        }

        impl $trait<&Var> for f64 {
            type Output = Var;
            fn $method(self, rhs: &Var) -> Var {
                let c = rhs.lift_scalar(self);
                c.apply($op, &[&c, rhs], Vec::new())
                    .expect("binary op evaluator registered for traced value type")
            }
        }
    };
}

impl_binary_op!(Add, add, ops::ADD);
impl_binary_op!(Sub, sub, ops::SUB);
impl_binary_op!(Mul, mul, ops::MUL);
impl_binary_op!(Div, div, ops::DIV);

impl Neg for &Var {
    type Output = Var;
    fn neg(self) -> Var {
        self.unary(ops::NEG)
            .expect("neg evaluator registered for traced value type")
    }
}
