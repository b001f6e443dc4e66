//! S3: collapse the StmtGraph into a Branch/Join multi-digraph.
//!
//! Grounded on the original `BranchJoinGraph.from_stmt_graph`/`_add_branch_edge`
//! tracing algorithm (classify branch/join/terminator nodes, then trace each
//! out-edge through straight-line statements until another classified node
//! or `Exit` is reached), reimplemented over `petgraph::graph::DiGraph` with
//! `NodeIndex` identity instead of statement-object identity.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::cfg::node::{Condition, Edge, FlowGraph, Node};
use crate::cfg::stmt_graph::{StmtGraph, StmtNode};
use crate::syntax::{StatementKind, StmtId, SyntaxTree};

/// Build the Branch/Join graph from a reachable `StmtGraph`.
pub fn build(sg: &StmtGraph, tree: &SyntaxTree) -> FlowGraph {
    let mut graph: DiGraph<Node, Edge> = DiGraph::new();
    // Maps a StmtGraph node to its classified Branch/Join/Exit counterpart,
    // if it has one. Straight statements have no entry here.
    let mut classified: HashMap<NodeIndex, NodeIndex> = HashMap::new();

    let entry = graph.add_node(Node::Entry);
    let exit = graph.add_node(Node::Exit);
    classified.insert(sg.exit, exit);

    for idx in sg.graph.node_indices() {
        match sg.graph[idx] {
            StmtNode::Entry | StmtNode::Exit => continue,
            StmtNode::Stmt(stmt_id) => {
                let stmt = tree.statement(stmt_id);
                if stmt.kind.is_terminating() {
                    classified.insert(idx, exit);
                } else if stmt.kind.is_branch() {
                    let condition = Condition::new(stmt_id);
                    let n = graph.add_node(Node::Branch { stmt: stmt_id, condition });
                    classified.insert(idx, n);
                } else if sg.graph.neighbors_directed(idx, petgraph::Direction::Incoming).count() > 1 {
                    let n = graph.add_node(Node::Join { stmt: stmt_id });
                    classified.insert(idx, n);
                }
            }
        }
    }

    // Entry's single successor.
    let entry_succ = single_successor(sg, sg.entry);
    trace_edge(sg, tree, &mut graph, &classified, entry, entry_succ, None);

    // Each Branch's two condition edges, and each Join's single out-edge
    // (traced with the join node temporarily "unclassified" so that a loop
    // edge that returns straight to the join is correctly recognised as a
    // self-loop rather than being misread via the classified map).
    let branch_sources: Vec<(NodeIndex, NodeIndex)> = classified
        .iter()
        .filter(|(stmt_idx, _)| matches!(sg.graph[**stmt_idx], StmtNode::Stmt(id) if tree.statement(id).kind.is_branch()))
        .map(|(&s, &n)| (s, n))
        .collect();

    for (stmt_idx, node_idx) in branch_sources {
        let stmt_id = match sg.graph[stmt_idx] {
            StmtNode::Stmt(id) => id,
            _ => unreachable!(),
        };
        let (true_stmt, false_stmt) = match &tree.statement(stmt_id).kind {
            StatementKind::Branch { true_stmt, false_stmt } => (*true_stmt, *false_stmt),
            _ => unreachable!(),
        };
        let true_idx = sg.node_index(StmtNode::Stmt(true_stmt)).expect("true branch target must exist");
        let false_idx = sg.node_index(StmtNode::Stmt(false_stmt)).expect("false branch target must exist");

        trace_edge(sg, tree, &mut graph, &classified, node_idx, true_idx, Some(true));
        trace_edge(sg, tree, &mut graph, &classified, node_idx, false_idx, Some(false));
    }

    let join_sources: Vec<(NodeIndex, NodeIndex)> = classified
        .iter()
        .filter(|(stmt_idx, node_idx)| {
            matches!(graph[**node_idx], Node::Join { .. }) && sg.graph[**stmt_idx] != StmtNode::Entry
        })
        .map(|(&s, &n)| (s, n))
        .collect();

    for (stmt_idx, node_idx) in join_sources {
        // Start the trace at the join's own statement (not its successor):
        // a Join only marks a merge point, it doesn't consume its own
        // statement's content, so that content becomes the first item on
        // the outgoing edge. Temporarily drop the join's classification so
        // the trace doesn't immediately stop on its own starting node.
        let mut without_self = classified.clone();
        without_self.remove(&stmt_idx);

        trace_edge(sg, tree, &mut graph, &without_self, node_idx, stmt_idx, None);
    }

    FlowGraph::new(graph, entry, exit)
}

fn single_successor(sg: &StmtGraph, idx: NodeIndex) -> NodeIndex {
    let mut it = sg.graph.neighbors_directed(idx, petgraph::Direction::Outgoing);
    let first = it.next().expect("every non-terminal StmtGraph node has exactly one outgoing edge class");
    debug_assert!(it.next().is_none(), "non-branch node must have exactly one successor");
    first
}

/// Trace from `start_stmt_idx` (a StmtGraph node, the first statement past
/// `source_node`) through straight-line statements until a classified node
/// is reached, wiring `source_node -> dest` with the accumulated statement
/// list. Detects the self-loop case (trace returns to its own start).
fn trace_edge(
    sg: &StmtGraph,
    tree: &SyntaxTree,
    graph: &mut DiGraph<Node, Edge>,
    classified: &HashMap<NodeIndex, NodeIndex>,
    source_node: NodeIndex,
    start_stmt_idx: NodeIndex,
    condition: Option<bool>,
) {
    let mut stmts = Vec::new();
    let mut cur = start_stmt_idx;
    let mut dest = None;

    while !classified.contains_key(&cur) {
        if let StmtNode::Stmt(id) = sg.graph[cur] {
            stmts.push(id);
        }
        cur = single_successor(sg, cur);
        if cur == start_stmt_idx {
            dest = Some(source_node);
            break;
        }
    }
    let dest = dest.unwrap_or_else(|| classified[&cur]);

    let _ = tree; // statement sources used only by callers for ordering
    let edge = match condition {
        Some(c) => Edge::labelled(c, stmts),
        None => Edge::straight(stmts),
    };
    graph.add_edge(source_node, dest, edge);
}

/// Not part of the formal contract: statement ids referenced by a
/// Branch/Join node, exposed for debug export.
pub fn node_stmt(flow: &FlowGraph, idx: NodeIndex) -> Option<StmtId> {
    flow.node(idx).stmt()
}
