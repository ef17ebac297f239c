//! Operation dispatch: (operation, value type) -> evaluator lookup.
//!
//! Every elementary operation resolves to a forward evaluator (used eagerly
//! at trace time and again on every push-forward) and a pullback evaluator
//! (used during reverse replay). The registry is open: the graph engine
//! knows no specific algebra, and supporting a new traced value type only
//! requires registering evaluators for the operations it supports.
//!
//! Lookup keys on the runtime [`TypeId`] of argument values. Mixed-type
//! nodes (e.g. a traced `f64` constant fed into a Taylor-polynomial
//! expression) resolve to the adapter of the structured argument regardless
//! of argument order: a registration under the base `f64` key is only used
//! when no other argument type carries one. The winning adapter decides
//! whether it can lift the remaining arguments.

use crate::error::TraceError;
use crate::value::{Aux, Value, ValueTuple};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

/// Identity of an elementary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Op(pub &'static str);

impl Op {
    /// Name of the operation, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Operation tags used by the built-in algebras.
pub mod ops {
    use super::Op;

    /// Identity; the operation of leaf nodes. Never dispatched.
    pub const ID: Op = Op("id");

    pub const ADD: Op = Op("add");
    pub const SUB: Op = Op("sub");
    pub const MUL: Op = Op("mul");
    pub const DIV: Op = Op("div");
    pub const NEG: Op = Op("neg");
    pub const SIN: Op = Op("sin");
    pub const COS: Op = Op("cos");
    pub const EXP: Op = Op("exp");
    pub const LOG: Op = Op("log");
    pub const SQRT: Op = Op("sqrt");

    /// Integer power; the exponent is an auxiliary argument.
    pub const POWI: Op = Op("powi");

    /// Two-output operation producing (sin x, cos x) as a tuple.
    pub const SINCOS: Op = Op("sincos");

    /// Structural selection of one output of a tuple-valued node; the slot
    /// index is an auxiliary argument.
    pub const SELECT: Op = Op("select");
}

/// Forward evaluator: `(argument values, auxiliary args) -> value`.
pub type ForwardFn = fn(&[&dyn Value], &[Aux]) -> Result<Box<dyn Value>, TraceError>;

/// Pullback evaluator: `(node adjoint, argument values, node value,
/// auxiliary args) -> adjoint contribution per argument`.
///
/// Evaluators return one owned contribution per argument; the graph
/// accumulates each into the argument node's adjoint. An argument consumed
/// by several downstream nodes thereby receives the sum of all
/// contributions, and a node that takes the same argument twice receives
/// both of its own contributions.
pub type PullbackFn =
    fn(&dyn Value, &[&dyn Value], &dyn Value, &[Aux]) -> Result<Vec<Box<dyn Value>>, TraceError>;

/// Runtime type key of a value.
pub(crate) fn value_type_id(value: &dyn Value) -> TypeId {
    value.as_any().type_id()
}

/// Open registry mapping (operation, value type) to evaluators.
#[derive(Default)]
pub struct Registry {
    forward: HashMap<(Op, TypeId), ForwardFn>,
    pullback: HashMap<(Op, TypeId), PullbackFn>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in scalar and Taylor adapters and
    /// the structural tuple operations.
    pub fn with_builtin_algebras() -> Self {
        let mut registry = Self::new();
        crate::algebra::scalar::register(&mut registry);
        crate::algebra::taylor::register(&mut registry);
        registry.register_forward(ops::SELECT, TypeId::of::<ValueTuple>(), forward_select);
        registry.register_pullback(ops::SELECT, TypeId::of::<ValueTuple>(), pullback_select);
        registry
    }

    /// Register a forward evaluator for (op, value type).
    pub fn register_forward(&mut self, op: Op, type_id: TypeId, f: ForwardFn) {
        self.forward.insert((op, type_id), f);
    }

    /// Register a pullback evaluator for (op, value type).
    pub fn register_pullback(&mut self, op: Op, type_id: TypeId, f: PullbackFn) {
        self.pullback.insert((op, type_id), f);
    }

    /// Resolve the forward evaluator for `op` against the runtime types of
    /// `args`. A registration for a structured argument wins over the base
    /// `f64` key, whichever position it sits in.
    pub fn forward_for(&self, op: Op, args: &[&dyn Value]) -> Option<ForwardFn> {
        resolve(&self.forward, op, args)
    }

    /// Resolve the pullback evaluator for `op` against the runtime types of
    /// `args`. A registration for a structured argument wins over the base
    /// `f64` key, whichever position it sits in.
    pub fn pullback_for(&self, op: Op, args: &[&dyn Value]) -> Option<PullbackFn> {
        resolve(&self.pullback, op, args)
    }
}

/// Shared lookup: scan the arguments for a registered type, holding any
/// `f64` hit back as a fallback. A structured value (Taylor polynomial,
/// tuple) in any position therefore selects its own adapter even when a
/// traced scalar constant precedes it; the base scalar adapter only fires
/// when the node is scalar throughout.
fn resolve<F: Copy>(map: &HashMap<(Op, TypeId), F>, op: Op, args: &[&dyn Value]) -> Option<F> {
    let mut scalar_fallback = None;
    for arg in args {
        let type_id = value_type_id(*arg);
        if let Some(f) = map.get(&(op, type_id)) {
            if type_id == TypeId::of::<f64>() {
                scalar_fallback.get_or_insert(*f);
            } else {
                return Some(*f);
            }
        }
    }
    scalar_fallback
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("forward_ops", &self.forward.len())
            .field("pullback_ops", &self.pullback.len())
            .finish()
    }
}

fn select_arg<'a>(args: &[&'a dyn Value]) -> Result<&'a ValueTuple, TraceError> {
    if args.len() != 1 {
        return Err(TraceError::Arity {
            op: ops::SELECT.name(),
            expected: 1,
            actual: args.len(),
        });
    }
    args[0]
        .as_any()
        .downcast_ref::<ValueTuple>()
        .ok_or(TraceError::TypeMismatch {
            expected: "tuple",
            actual: args[0].type_label(),
        })
}

fn select_index(aux: &[Aux]) -> Result<usize, TraceError> {
    aux.first()
        .and_then(Aux::as_index)
        .ok_or(TraceError::MissingAux {
            op: ops::SELECT.name(),
            index: 0,
        })
}

/// Forward select: clone slot `k` of the tuple argument.
fn forward_select(args: &[&dyn Value], aux: &[Aux]) -> Result<Box<dyn Value>, TraceError> {
    let tuple = select_arg(args)?;
    let index = select_index(aux)?;
    tuple
        .get(index)
        .map(|v| v.clone_boxed())
        .ok_or(TraceError::SelectOutOfRange {
            index,
            arity: tuple.arity(),
        })
}

/// Pullback select: scatter the incoming adjoint into slot `k` of a zero
/// tuple shaped like the argument. Other slots stay zero here so that
/// contributions arriving through sibling selections accumulate untouched.
fn pullback_select(
    adjoint: &dyn Value,
    args: &[&dyn Value],
    _value: &dyn Value,
    aux: &[Aux],
) -> Result<Vec<Box<dyn Value>>, TraceError> {
    let tuple = select_arg(args)?;
    let index = select_index(aux)?;
    if index >= tuple.arity() {
        return Err(TraceError::SelectOutOfRange {
            index,
            arity: tuple.arity(),
        });
    }
    let mut contribution = args[0].zeros_like();
    let slots = contribution
        .as_any_mut()
        .downcast_mut::<ValueTuple>()
        .ok_or(TraceError::TypeMismatch {
            expected: "tuple",
            actual: "non-tuple",
        })?;
    slots.0[index].add_assign_value(adjoint)?;
    Ok(vec![contribution])
}
