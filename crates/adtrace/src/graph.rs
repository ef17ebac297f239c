//! Computation graph: recorded operations and their replay in both
//! directions.
//!
//! The graph is a DAG stored as an append-only list of nodes in creation
//! order. Because a node can only refer to already-created arguments, the
//! creation order is a topological order: every argument id is smaller than
//! its dependent's id. Forward replay walks ids ascending, reverse replay
//! walks them descending, so no separate topological sort is needed.

use crate::error::TraceError;
use crate::registry::{Op, Registry, ops};
use crate::value::{Aux, Value};
use smallvec::SmallVec;
use std::fmt;

/// Unique identifier for a node in the computation graph.
///
/// Assigned sequentially at creation, unique within a graph. Used for
/// ordering and diagnostics, never for control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Get the internal index.
    pub fn index(&self) -> usize {
        self.0
    }

    /// Create a NodeId for testing purposes.
    #[cfg(test)]
    pub(crate) fn new_for_test(index: usize) -> Self {
        Self(index)
    }
}

/// A single recorded operation instance.
///
/// Structural fields (`op`, `args`, `aux`) are fixed at creation; only
/// `value` and `adjoint` mutate, during replay.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    op: Op,
    args: SmallVec<[NodeId; 2]>,
    aux: Vec<Aux>,
    value: Box<dyn Value>,
    /// Reverse-mode sensitivity; `None` until a pullback pass initializes
    /// it. Distinct from a numeric zero.
    adjoint: Option<Box<dyn Value>>,
}

impl Node {
    /// Get node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Operation that produced this node.
    pub fn op(&self) -> Op {
        self.op
    }

    /// Argument node ids, in call order.
    pub fn args(&self) -> &[NodeId] {
        &self.args
    }

    /// Auxiliary non-traced arguments.
    pub fn aux(&self) -> &[Aux] {
        &self.aux
    }

    /// Current forward value.
    pub fn value(&self) -> &dyn Value {
        self.value.as_ref()
    }

    /// Current adjoint, if a pullback pass has initialized it.
    pub fn adjoint(&self) -> Option<&dyn Value> {
        self.adjoint.as_deref()
    }

    /// Leaf nodes carry the identity operation and no arguments.
    pub fn is_leaf(&self) -> bool {
        self.op == ops::ID
    }
}

/// The computation graph (CGraph): an append-only record of a traced
/// computational procedure.
///
/// Owns every node created during a tracing session plus the designated
/// independent (input) and dependent (output) subsets. Mutated structurally
/// only by node creation; replay passes mutate node values and adjoints,
/// never the structure.
#[derive(Default)]
pub struct CGraph {
    nodes: Vec<Node>,
    independent: Vec<NodeId>,
    dependent: Vec<NodeId>,
}

impl CGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// All nodes, in creation (topological) order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Record a leaf: an identity node wrapping `value`, with no arguments.
    pub fn create_leaf(&mut self, value: Box<dyn Value>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            op: ops::ID,
            args: SmallVec::new(),
            aux: Vec::new(),
            value,
            adjoint: None,
        });
        id
    }

    /// Record an operation node with a precomputed value.
    ///
    /// The caller (the dispatch layer) evaluates `op` first and passes the
    /// result in; creation itself never invokes the operation. Arguments
    /// must already exist in this graph, which keeps creation order a valid
    /// topological order.
    pub fn create_node(
        &mut self,
        value: Box<dyn Value>,
        op: Op,
        args: &[NodeId],
        aux: Vec<Aux>,
    ) -> Result<NodeId, TraceError> {
        if args.is_empty() {
            return Err(TraceError::Configuration(format!(
                "op `{op}` recorded with no arguments; use create_leaf for inputs"
            )));
        }
        for arg in args {
            if arg.index() >= self.nodes.len() {
                return Err(TraceError::Configuration(format!(
                    "argument node {} does not exist in this graph",
                    arg.index()
                )));
            }
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            op,
            args: SmallVec::from_slice(args),
            aux,
            value,
            adjoint: None,
        });
        Ok(id)
    }

    /// Declare the graph inputs for replay.
    pub fn set_independent(&mut self, ids: &[NodeId]) -> Result<(), TraceError> {
        self.check_ids(ids)?;
        self.independent = ids.to_vec();
        Ok(())
    }

    /// Declare the graph outputs for replay.
    pub fn set_dependent(&mut self, ids: &[NodeId]) -> Result<(), TraceError> {
        self.check_ids(ids)?;
        self.dependent = ids.to_vec();
        Ok(())
    }

    /// Declared independent nodes.
    pub fn independent(&self) -> &[NodeId] {
        &self.independent
    }

    /// Declared dependent nodes.
    pub fn dependent(&self) -> &[NodeId] {
        &self.dependent
    }

    fn check_ids(&self, ids: &[NodeId]) -> Result<(), TraceError> {
        for id in ids {
            if id.index() >= self.nodes.len() {
                return Err(TraceError::Configuration(format!(
                    "node {} does not exist in this graph",
                    id.index()
                )));
            }
        }
        Ok(())
    }

    /// Replay the recorded procedure forward with new input values.
    ///
    /// Overwrites the independent leaves' values in place, then recomputes
    /// every non-leaf node's value in ascending id order. A single pass
    /// suffices because the graph is acyclic and stored topologically.
    ///
    /// A dispatch miss aborts the pass with [`TraceError::UnsupportedForward`];
    /// nodes updated earlier in the pass keep their new values (no
    /// atomicity, matching the eager execution model).
    pub fn push_forward(
        &mut self,
        registry: &Registry,
        inputs: Vec<Box<dyn Value>>,
    ) -> Result<(), TraceError> {
        if inputs.len() != self.independent.len() {
            return Err(TraceError::Configuration(format!(
                "push_forward expects {} input value(s) for the declared independent nodes, got {}",
                self.independent.len(),
                inputs.len()
            )));
        }
        let ids = self.independent.clone();
        for (id, value) in ids.into_iter().zip(inputs) {
            self.nodes[id.index()].value = value;
        }

        for i in 0..self.nodes.len() {
            if self.nodes[i].is_leaf() {
                continue;
            }
            let value = {
                let node = &self.nodes[i];
                let args: SmallVec<[&dyn Value; 2]> = node
                    .args
                    .iter()
                    .map(|a| self.nodes[a.index()].value.as_ref())
                    .collect();
                let f = registry.forward_for(node.op, &args).ok_or_else(|| {
                    TraceError::UnsupportedForward {
                        op: node.op.name(),
                        value_type: args.first().map_or("unknown", |a| a.type_label()),
                        node: i,
                    }
                })?;
                f(&args, &node.aux)?
            };
            self.nodes[i].value = value;
        }
        Ok(())
    }

    /// Pull back seed adjoints from the dependent nodes to every node.
    ///
    /// Every node's adjoint is first zero-initialized from its value's
    /// shape, the dependents' adjoints are overwritten with the seeds, and
    /// the node list is walked in descending id order. Each node's pullback
    /// evaluator yields one contribution per argument, which is summed into
    /// the argument's adjoint. The fan-in case where several downstream
    /// nodes consume one argument therefore accumulates correctly, because
    /// all consumers have larger ids and have already contributed.
    pub fn pullback(
        &mut self,
        registry: &Registry,
        seeds: Vec<Box<dyn Value>>,
    ) -> Result<(), TraceError> {
        if self.dependent.is_empty() {
            return Err(TraceError::Configuration(
                "no dependent variables declared; call set_dependent before pullback".into(),
            ));
        }
        if seeds.len() != self.dependent.len() {
            return Err(TraceError::Configuration(format!(
                "pullback expects {} seed adjoint(s) for the declared dependent nodes, got {}",
                self.dependent.len(),
                seeds.len()
            )));
        }

        for node in &mut self.nodes {
            node.adjoint = Some(node.value.zeros_like());
        }
        let ids = self.dependent.clone();
        for (id, seed) in ids.into_iter().zip(seeds) {
            self.nodes[id.index()].adjoint = Some(seed);
        }

        for i in (0..self.nodes.len()).rev() {
            if self.nodes[i].is_leaf() {
                continue;
            }
            let (arg_ids, contributions) = {
                let node = &self.nodes[i];
                let args: SmallVec<[&dyn Value; 2]> = node
                    .args
                    .iter()
                    .map(|a| self.nodes[a.index()].value.as_ref())
                    .collect();
                let f = registry.pullback_for(node.op, &args).ok_or_else(|| {
                    TraceError::UnsupportedPullback {
                        op: node.op.name(),
                        value_type: args.first().map_or("unknown", |a| a.type_label()),
                        node: i,
                    }
                })?;
                let adjoint = node.adjoint.as_deref().ok_or_else(|| {
                    TraceError::Configuration(format!("adjoint not initialized on node {i}"))
                })?;
                let contributions = f(adjoint, &args, node.value.as_ref(), &node.aux)?;
                if contributions.len() != node.args.len() {
                    return Err(TraceError::Configuration(format!(
                        "op `{}` returned {} adjoint contribution(s) for {} argument(s)",
                        node.op,
                        contributions.len(),
                        node.args.len()
                    )));
                }
                (node.args.clone(), contributions)
            };
            for (arg, contribution) in arg_ids.iter().zip(contributions) {
                let slot = self.nodes[arg.index()].adjoint.as_mut().ok_or_else(|| {
                    TraceError::Configuration(format!(
                        "adjoint not initialized on node {}",
                        arg.index()
                    ))
                })?;
                slot.add_assign_value(contribution.as_ref())?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CGraph")
            .field("num_nodes", &self.nodes.len())
            .field("independent", &self.independent)
            .field("dependent", &self.dependent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{as_f64, boxed};

    #[test]
    fn test_create_leaf_ids_sequential() {
        let mut graph = CGraph::new();
        let a = graph.create_leaf(boxed(1.0));
        let b = graph.create_leaf(boxed(2.0));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(graph.len(), 2);
        assert!(graph.node(a).unwrap().is_leaf());
    }

    #[test]
    fn test_topological_invariant() {
        let mut graph = CGraph::new();
        let a = graph.create_leaf(boxed(2.0));
        let b = graph.create_leaf(boxed(3.0));
        let c = graph
            .create_node(boxed(5.0), ops::ADD, &[a, b], Vec::new())
            .unwrap();
        for node in graph.nodes() {
            for arg in node.args() {
                assert!(arg.index() < node.id().index());
            }
        }
        assert_eq!(c.index(), 2);
    }

    #[test]
    fn test_create_node_unknown_argument() {
        let mut graph = CGraph::new();
        let a = graph.create_leaf(boxed(2.0));
        let bogus = NodeId::new_for_test(7);
        let err = graph
            .create_node(boxed(0.0), ops::ADD, &[a, bogus], Vec::new())
            .unwrap_err();
        assert!(matches!(err, TraceError::Configuration(_)));
    }

    #[test]
    fn test_push_forward_count_mismatch() {
        let mut graph = CGraph::new();
        let a = graph.create_leaf(boxed(2.0));
        graph.set_independent(&[a]).unwrap();
        let registry = Registry::with_builtin_algebras();
        let err = graph.push_forward(&registry, vec![]).unwrap_err();
        assert!(matches!(err, TraceError::Configuration(_)));
    }

    #[test]
    fn test_pullback_without_dependents() {
        let mut graph = CGraph::new();
        graph.create_leaf(boxed(2.0));
        let registry = Registry::with_builtin_algebras();
        let err = graph.pullback(&registry, vec![boxed(1.0)]).unwrap_err();
        assert!(matches!(err, TraceError::Configuration(_)));
    }

    #[test]
    fn test_push_forward_unsupported_op() {
        let mut graph = CGraph::new();
        let a = graph.create_leaf(boxed(2.0));
        graph
            .create_node(boxed(0.0), Op("frobnicate"), &[a], Vec::new())
            .unwrap();
        graph.set_independent(&[a]).unwrap();
        let registry = Registry::with_builtin_algebras();
        let err = graph.push_forward(&registry, vec![boxed(2.0)]).unwrap_err();
        assert!(matches!(
            err,
            TraceError::UnsupportedForward { node: 1, .. }
        ));
    }

    #[test]
    fn test_adjoint_none_until_pullback() {
        let mut graph = CGraph::new();
        let a = graph.create_leaf(boxed(2.0));
        assert!(graph.node(a).unwrap().adjoint().is_none());
    }

    #[test]
    fn test_push_forward_replays_values() {
        let mut graph = CGraph::new();
        let a = graph.create_leaf(boxed(2.0));
        let b = graph.create_leaf(boxed(3.0));
        let sum = graph
            .create_node(boxed(5.0), ops::ADD, &[a, b], Vec::new())
            .unwrap();
        graph.set_independent(&[a, b]).unwrap();

        let registry = Registry::with_builtin_algebras();
        graph
            .push_forward(&registry, vec![boxed(10.0), boxed(20.0)])
            .unwrap();
        assert_eq!(as_f64(graph.node(sum).unwrap().value()).unwrap(), 30.0);
    }
}
