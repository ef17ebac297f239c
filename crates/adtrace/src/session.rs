//! Tracing sessions.
//!
//! A [`Session`] is the explicit context a trace records into: it owns the
//! computation graph and the evaluator registry behind an `Rc`, and every
//! [`Var`] created from it holds the same handle. There is no process-wide
//! current graph; dropping the session (and its vars) ends the trace.
//!
//! Sessions are deliberately not `Send`/`Sync` (`Rc` + `RefCell`): tracing
//! is single-threaded, one session per thread.

use crate::error::TraceError;
use crate::graph::CGraph;
use crate::registry::Registry;
use crate::value::Value;
use crate::var::Var;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub(crate) struct SessionInner {
    pub(crate) graph: RefCell<CGraph>,
    pub(crate) registry: Registry,
}

/// A tracing session: one computation graph plus the registry used to
/// evaluate and differentiate its operations.
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    /// Start a session with the built-in scalar and Taylor algebras.
    pub fn new() -> Self {
        Self::with_registry(Registry::with_builtin_algebras())
    }

    /// Start a session with a caller-assembled registry.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            inner: Rc::new(SessionInner {
                graph: RefCell::new(CGraph::new()),
                registry,
            }),
        }
    }

    /// Wrap a raw value as a leaf node and return its traced handle.
    ///
    /// Leaves intended as replay inputs must additionally be declared with
    /// [`set_independent`](Self::set_independent).
    pub fn leaf<V: Value + 'static>(&self, value: V) -> Var {
        let id = self.inner.graph.borrow_mut().create_leaf(Box::new(value));
        Var::from_parts(Rc::clone(&self.inner), id)
    }

    /// Wrap a raw value as a constant leaf.
    ///
    /// Mechanically identical to [`leaf`](Self::leaf); the name signals that
    /// the node will not be declared independent.
    pub fn constant<V: Value + 'static>(&self, value: V) -> Var {
        self.leaf(value)
    }

    /// Declare the graph inputs for replay.
    pub fn set_independent(&self, vars: &[&Var]) -> Result<(), TraceError> {
        let ids = self.owned_ids(vars)?;
        self.inner.graph.borrow_mut().set_independent(&ids)
    }

    /// Declare the graph outputs for replay.
    pub fn set_dependent(&self, vars: &[&Var]) -> Result<(), TraceError> {
        let ids = self.owned_ids(vars)?;
        self.inner.graph.borrow_mut().set_dependent(&ids)
    }

    /// Replay the recorded procedure with new values for the independent
    /// nodes. Outputs are read back from the dependent vars afterwards.
    pub fn push_forward(&self, inputs: Vec<Box<dyn Value>>) -> Result<(), TraceError> {
        self.inner
            .graph
            .borrow_mut()
            .push_forward(&self.inner.registry, inputs)
    }

    /// Pull back seed adjoints from the dependent nodes; every var's
    /// adjoint is available afterwards.
    pub fn pullback(&self, seeds: Vec<Box<dyn Value>>) -> Result<(), TraceError> {
        self.inner
            .graph
            .borrow_mut()
            .pullback(&self.inner.registry, seeds)
    }

    /// Number of recorded nodes.
    pub fn len(&self) -> usize {
        self.inner.graph.borrow().len()
    }

    /// Check if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.inner.graph.borrow().is_empty()
    }

    fn owned_ids(&self, vars: &[&Var]) -> Result<Vec<crate::graph::NodeId>, TraceError> {
        vars.iter()
            .map(|var| {
                if var.same_session(&self.inner) {
                    Ok(var.id())
                } else {
                    Err(TraceError::Configuration(
                        "variable belongs to a different session".into(),
                    ))
                }
            })
            .collect()
    }

    pub(crate) fn inner(&self) -> &Rc<SessionInner> {
        &self.inner
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("graph", &self.inner.graph.borrow())
            .field("registry", &self.inner.registry)
            .finish()
    }
}
