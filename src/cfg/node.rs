//! The node/edge/scope data model shared by stages S3 through S6.
//!
//! Follows an arena design: `petgraph::graph::DiGraph` already stores nodes
//! in a `Vec` and edges as an index-addressed adjacency structure, so it is
//! used directly as the arena rather than introducing a second one. Cyclic
//! references (back edges, loop headers pointing at their own body) are
//! just `NodeIndex` values, never shared-mutable node objects, which avoids
//! needing `Rc<RefCell<_>>` anywhere in the pipeline.

use std::collections::{HashMap, HashSet};

use petgraph::graph::DiGraph;
pub use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::syntax::StmtId;

/// A condition tested by a `Branch` or a while-classified `Loop`.
///
/// `source_ref` points back at the COBOL statement whose test this is; the
/// inversion is tracked as a flag rather than rewriting the reference, so
/// `invert()` is a cheap, allocation-free operation and printing can decide
/// how to negate the surface syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub source_ref: StmtId,
    pub inverted: bool,
}

impl Condition {
    pub fn new(source_ref: StmtId) -> Self {
        Self {
            source_ref,
            inverted: false,
        }
    }

    #[must_use]
    pub fn invert(&self) -> Condition {
        Condition {
            source_ref: self.source_ref,
            inverted: !self.inverted,
        }
    }
}

/// One node of the Branch/Join graph (S3) and everything it is rewritten
/// into by S4 and S5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Singleton. Source order -infinity; no in-edges, one out-edge.
    Entry,
    /// Singleton. Source order +infinity; terminal, no out-edges.
    Exit,
    /// Wraps a COBOL `IF`. Exactly two out-edges, `condition = true|false`.
    Branch { stmt: StmtId, condition: Condition },
    /// A statement with in-degree >= 2 in the reachable StmtGraph. One
    /// out-edge. S4 may splice a `Loop` in its place when it is a loop
    /// header.
    Join { stmt: StmtId },
    /// Header of a back-edge-carrying strongly connected component.
    /// `condition` is filled in by S5 if the loop qualifies as a
    /// while-loop; `None` means it structures as an infinite loop.
    Loop {
        stmt: StmtId,
        condition: Option<Condition>,
    },
    /// A back-jump to `loop`'s header. Belongs to `loop`'s own scope.
    ContinueLoop { loop_node: NodeIndex },
    /// Inserted by S5 between a loop's non-loop successor and the loop
    /// edge; the structured `break` target. Belongs to the scope
    /// enclosing `loop`.
    LoopExit { loop_node: NodeIndex },
    /// Placeholder for an unavoidable cross-scope jump whose target lives
    /// in another scope. Lives in the scope of the edge's source.
    GotoNode { target: NodeIndex },
}

impl Node {
    pub fn stmt(&self) -> Option<StmtId> {
        match self {
            Node::Branch { stmt, .. } | Node::Join { stmt } | Node::Loop { stmt, .. } => {
                Some(*stmt)
            }
            Node::Entry | Node::Exit | Node::ContinueLoop { .. } | Node::LoopExit { .. } | Node::GotoNode { .. } => {
                None
            }
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Node::Branch { .. })
    }

    pub fn is_join(&self) -> bool {
        matches!(self, Node::Join { .. })
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, Node::Loop { .. })
    }

    pub fn is_continue_loop(&self) -> bool {
        matches!(self, Node::ContinueLoop { .. })
    }

    pub fn is_loop_exit(&self) -> bool {
        matches!(self, Node::LoopExit { .. })
    }

    pub fn is_goto_node(&self) -> bool {
        matches!(self, Node::GotoNode { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Node::Entry => "Entry",
            Node::Exit => "Exit",
            Node::Branch { .. } => "Branch",
            Node::Join { .. } => "Join",
            Node::Loop { .. } => "Loop",
            Node::ContinueLoop { .. } => "ContinueLoop",
            Node::LoopExit { .. } => "LoopExit",
            Node::GotoNode { .. } => "GotoNode",
        }
    }
}

/// An edge of the Branch/Join graph: the sequential statements traversed
/// between its endpoints (empty if they're adjacent), plus an optional
/// `true`/`false` label when the source is a `Branch` or a while-`Loop`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edge {
    pub condition: Option<bool>,
    pub stmts: Vec<StmtId>,
}

impl Edge {
    pub fn straight(stmts: Vec<StmtId>) -> Self {
        Edge { condition: None, stmts }
    }

    pub fn labelled(condition: bool, stmts: Vec<StmtId>) -> Self {
        Edge {
            condition: Some(condition),
            stmts,
        }
    }
}

/// Every node's scope: either the section-wide root, or a specific `Loop`
/// node (the loop whose body the node structurally belongs to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Root,
    Loop(NodeIndex),
}

/// The graph threaded through S3 -> S4 -> S5 -> S6. Node identity
/// (`NodeIndex`) is stable across these stages: S4 and S5 mutate the graph
/// in place (splicing in `Loop`/`ContinueLoop`/`LoopExit`/`GotoNode`
/// markers) rather than rebuilding it, so that scopes and reductions can
/// hold plain indices instead of aliasing node objects.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    pub graph: DiGraph<Node, Edge>,
    pub entry: NodeIndex,
    pub exit: NodeIndex,
    /// Innermost scope of each node. Populated by S4, refined by S5;
    /// immutable once S5 finishes (the S3-S5 invariant in the crate docs).
    pub scope: HashMap<NodeIndex, Scope>,
    /// All enclosing loops of each node (innermost last), used to answer
    /// "does this node belong to scope X or one of X's children".
    pub scopes: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl FlowGraph {
    pub fn new(graph: DiGraph<Node, Edge>, entry: NodeIndex, exit: NodeIndex) -> Self {
        FlowGraph {
            graph,
            entry,
            exit,
            scope: HashMap::new(),
            scopes: HashMap::new(),
        }
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.graph[idx]
    }

    pub fn scope_of(&self, idx: NodeIndex) -> Scope {
        self.scope.get(&idx).copied().unwrap_or(Scope::Root)
    }

    pub fn enclosing_loops(&self, idx: NodeIndex) -> &[NodeIndex] {
        self.scopes.get(&idx).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Does `idx` belong to `loop_node`'s scope, directly or via nesting?
    pub fn is_in_loop_scope(&self, idx: NodeIndex, loop_node: NodeIndex) -> bool {
        self.enclosing_loops(idx).contains(&loop_node)
    }

    pub fn tag_scope(&mut self, idx: NodeIndex, innermost: Scope, all_loops: Vec<NodeIndex>) {
        self.scope.insert(idx, innermost);
        self.scopes.insert(idx, all_loops);
    }

    pub fn in_degree(&self, idx: NodeIndex) -> usize {
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .count()
    }

    pub fn out_edges(&self, idx: NodeIndex) -> Vec<(NodeIndex, petgraph::graph::EdgeIndex)> {
        use petgraph::visit::EdgeRef;
        self.graph
            .edges_directed(idx, petgraph::Direction::Outgoing)
            .map(|e| (e.target(), e.id()))
            .collect()
    }

    pub fn node_source_key(&self, idx: NodeIndex, tree: &crate::syntax::SyntaxTree) -> usize {
        match self.node(idx) {
            Node::Entry => crate::syntax::Source::NEG_INFINITY.from_char,
            Node::Exit => crate::syntax::Source::POS_INFINITY.from_char,
            Node::Branch { stmt, .. } | Node::Join { stmt } | Node::Loop { stmt, .. } => {
                tree.statement(*stmt).source.from_char
            }
            Node::ContinueLoop { loop_node } | Node::LoopExit { loop_node } => {
                self.node_source_key(*loop_node, tree)
            }
            Node::GotoNode { target } => self.node_source_key(*target, tree),
        }
    }
}

/// Flattened JSON-friendly view of a `FlowGraph`, used only for the
/// optional debug artefacts (crate docs: not part of the formal contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraphExport {
    pub nodes: Vec<NodeExport>,
    pub edges: Vec<EdgeExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExport {
    pub id: usize,
    pub kind: String,
    pub scope: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeExport {
    pub from: usize,
    pub to: usize,
    pub condition: Option<bool>,
    pub stmt_count: usize,
}

pub fn scc_singleton_self_loop(graph: &DiGraph<Node, Edge>, idx: NodeIndex) -> bool {
    graph.find_edge(idx, idx).is_some()
}

pub type NodeSet = HashSet<NodeIndex>;
