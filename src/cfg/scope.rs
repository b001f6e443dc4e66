//! S5: scope structuring.
//!
//! Pass A classifies each `Loop` as `while`-headed or infinite and
//! materialises its `LoopExit`. Pass B cleans up what's left: cross-scope
//! `ContinueLoop`s are detached to point straight at their loop header,
//! every remaining non-while loop gets a synthesised `LoopExit` for its
//! most popular outside-scope target, and every surviving cross-scope edge
//! is replaced by a `GotoNode` placeholder living in the source's scope.
//!
//! Reified here as an explicit graph rewrite producing `LoopExit`/
//! `GotoNode` marker nodes, rather than resolved dynamically during block
//! reduction.

use std::collections::{HashMap, HashSet};

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::cfg::node::{Condition, Edge, FlowGraph, Node, Scope};

/// Redirect a batch of edges to new destinations, keeping their source and
/// weight. `remove_edge` swap-removes internally, so a collected
/// `EdgeIndex` can go stale the moment any other edge in the same batch is
/// removed; this extracts every (source, weight) pair first, bulk-deletes
/// by id with `retain_edges`, then re-adds them at their new destination.
fn redirect_edges(flow: &mut FlowGraph, edges: Vec<(petgraph::graph::EdgeIndex, NodeIndex)>) {
    let to_remove: HashSet<petgraph::graph::EdgeIndex> = edges.iter().map(|&(e, _)| e).collect();
    let rewires: Vec<(NodeIndex, NodeIndex, Edge)> = edges
        .into_iter()
        .map(|(e, new_dest)| {
            let (src, _) = flow.graph.edge_endpoints(e).unwrap();
            (src, new_dest, flow.graph[e].clone())
        })
        .collect();

    flow.graph.retain_edges(|_, e| !to_remove.contains(&e));

    for (src, dest, weight) in rewires {
        flow.graph.add_edge(src, dest, weight);
    }
}

/// Run both passes over every loop discovered by S4, innermost loops last
/// is not required - each loop is processed independently by its own
/// `NodeIndex`, found fresh per pass since earlier loops may add nodes.
pub fn structure_scopes(flow: &mut FlowGraph) {
    let loop_nodes: Vec<NodeIndex> = flow.graph.node_indices().filter(|&i| flow.node(i).is_loop()).collect();

    for loop_node in loop_nodes {
        classify_loop(flow, loop_node);
    }

    detach_cross_scope_continues(flow);

    let remaining_loops: Vec<NodeIndex> = flow.graph.node_indices().filter(|&i| flow.node(i).is_loop()).collect();
    for loop_node in remaining_loops {
        if !matches!(flow.node(loop_node), Node::Loop { condition: None, .. }) {
            continue;
        }
        synthesise_loop_exit_for_forever_loop(flow, loop_node);
    }

    replace_remaining_cross_scope_edges(flow);
}

/// Pass A for a single loop: test whether its sole out-edge targets a bare
/// `Branch` with exactly one side inside the loop's scope.
fn classify_loop(flow: &mut FlowGraph, loop_node: NodeIndex) {
    let out = flow.out_edges(loop_node);
    if out.len() != 1 {
        return;
    }
    let (target, loop_edge_id) = out[0];

    if flow.graph[loop_edge_id].stmts.len() != 0 {
        return;
    }
    let (branch_stmt, branch_condition) = match flow.node(target) {
        Node::Branch { stmt, condition } => (*stmt, *condition),
        _ => return,
    };

    let branch_outs = flow.out_edges(target);
    if branch_outs.len() != 2 {
        return;
    }

    let mut then_edge = None;
    let mut else_edge = None;
    for &(dest, edge_id) in &branch_outs {
        match flow.graph[edge_id].condition {
            Some(true) => then_edge = Some((dest, edge_id)),
            Some(false) => else_edge = Some((dest, edge_id)),
            None => {}
        }
    }
    let (mut then_dest, mut then_edge_id) = match then_edge {
        Some(v) => v,
        None => return,
    };
    let (mut else_dest, mut else_edge_id) = match else_edge {
        Some(v) => v,
        None => return,
    };

    let mut invert = false;
    let then_in_scope = flow.is_in_loop_scope(then_dest, loop_node);
    let else_in_scope = flow.is_in_loop_scope(else_dest, loop_node);

    if else_in_scope && !then_in_scope {
        std::mem::swap(&mut then_dest, &mut else_dest);
        std::mem::swap(&mut then_edge_id, &mut else_edge_id);
        invert = true;
    }

    let then_in_scope = flow.is_in_loop_scope(then_dest, loop_node);
    let else_in_scope = flow.is_in_loop_scope(else_dest, loop_node);
    if !(then_in_scope && !else_in_scope) {
        return;
    }
    if !flow.graph[else_edge_id].stmts.is_empty() {
        return;
    }

    // Qualifies. The loop absorbs the branch's condition (inverted if we
    // swapped above so the `true` side always enters the body).
    let condition = if invert { branch_condition.invert() } else { branch_condition };
    *flow.graph.node_weight_mut(loop_node).unwrap() = Node::Loop {
        stmt: match flow.node(loop_node) {
            Node::Loop { stmt, .. } => *stmt,
            _ => unreachable!(),
        },
        condition: Some(condition),
    };

    let loop_exit = flow.graph.add_node(Node::LoopExit { loop_node });
    flow.tag_scope(loop_exit, flow.scope_of(loop_node), flow.enclosing_loops(loop_node).to_vec());

    // Redirect every in-scope edge currently targeting the non-loop
    // successor to the new LoopExit, including the branch's own else edge,
    // then splice LoopExit -> non_loop_successor back in as its sole exit.
    let non_loop_successor = else_dest;
    let redirect: Vec<(petgraph::graph::EdgeIndex, NodeIndex)> = flow
        .graph
        .edges_directed(non_loop_successor, Direction::Incoming)
        .filter(|e| flow.is_in_loop_scope(e.source(), loop_node) || e.source() == target)
        .map(|e| (e.id(), loop_exit))
        .collect();
    redirect_edges(flow, redirect);
    flow.graph.add_edge(loop_exit, non_loop_successor, Edge::straight(vec![]));

    // Splice the loop edge directly onto the body entry (drop the
    // intermediate empty loop->branch edge and branch->then edge, folding
    // the body straight onto the loop's own out-edge).
    let then_weight = flow.graph[then_edge_id].clone();
    let mut to_drop = HashSet::new();
    to_drop.insert(loop_edge_id);
    to_drop.insert(then_edge_id);
    flow.graph.retain_edges(|_, e| !to_drop.contains(&e));
    flow.graph.add_edge(loop_node, then_dest, then_weight);

    // The bare branch node is now unreachable; petgraph leaves it in place
    // (removing it would invalidate indices held elsewhere), dangling with
    // no remaining in-edges - harmless, S6 never visits an unreachable node.
    let _ = branch_stmt;
}

/// Pass B, step 1: a `ContinueLoop` whose loop is not the innermost scope
/// of some of its callers is "cross-scope" - any edge into it from outside
/// its own scope gets redirected straight at the loop header instead.
fn detach_cross_scope_continues(flow: &mut FlowGraph) {
    let continue_nodes: Vec<NodeIndex> = flow.graph.node_indices().filter(|&i| flow.node(i).is_continue_loop()).collect();

    for cont in continue_nodes {
        let loop_node = match flow.node(cont) {
            Node::ContinueLoop { loop_node } => *loop_node,
            _ => continue,
        };
        let own_scope = flow.scope_of(cont);

        let to_redirect: Vec<(petgraph::graph::EdgeIndex, NodeIndex)> = flow
            .graph
            .edges_directed(cont, Direction::Incoming)
            .filter(|e| flow.scope_of(e.source()) != own_scope)
            .map(|e| (e.id(), loop_node))
            .collect();
        redirect_edges(flow, to_redirect);

        if flow.graph.neighbors_directed(cont, Direction::Incoming).count() == 0 {
            // No callers left in its own scope either; leave the orphaned
            // node in place, it simply won't be visited by S6.
        }
    }
}

/// Pass B, step 2: a loop that never qualified as `while` still needs a
/// break target for whichever outside-scope node its body jumps to most.
fn synthesise_loop_exit_for_forever_loop(flow: &mut FlowGraph, loop_node: NodeIndex) {
    let body_nodes: HashSet<NodeIndex> = flow
        .graph
        .node_indices()
        .filter(|&i| flow.is_in_loop_scope(i, loop_node))
        .collect();

    let mut target_counts: HashMap<NodeIndex, usize> = HashMap::new();
    for &node in &body_nodes {
        for e in flow.graph.edges_directed(node, Direction::Outgoing) {
            let dest = e.target();
            if !flow.is_in_loop_scope(dest, loop_node) && dest != loop_node {
                *target_counts.entry(dest).or_insert(0) += 1;
            }
        }
    }

    let chosen = target_counts
        .iter()
        .max_by(|(n1, c1), (n2, c2)| c1.cmp(c2).then_with(|| n2.partial_cmp(n1).unwrap()))
        .map(|(&n, _)| n);

    let Some(target) = chosen else { return };

    let loop_exit = flow.graph.add_node(Node::LoopExit { loop_node });
    flow.tag_scope(loop_exit, flow.scope_of(loop_node), flow.enclosing_loops(loop_node).to_vec());

    let redirect: Vec<(petgraph::graph::EdgeIndex, NodeIndex)> = flow
        .graph
        .edges_directed(target, Direction::Incoming)
        .filter(|e| flow.is_in_loop_scope(e.source(), loop_node))
        .map(|e| (e.id(), loop_exit))
        .collect();
    redirect_edges(flow, redirect);
    flow.graph.add_edge(loop_exit, target, Edge::straight(vec![]));
}

/// Pass B, step 3: anything still crossing a scope boundary becomes a
/// `GotoNode(target)` placeholder in the source's own scope, deduplicated
/// per `(source_scope, target)` pair.
fn replace_remaining_cross_scope_edges(flow: &mut FlowGraph) {
    let mut goto_nodes: HashMap<(Option<NodeIndex>, NodeIndex), NodeIndex> = HashMap::new();

    let candidate_edges: Vec<petgraph::graph::EdgeIndex> = flow
        .graph
        .edge_indices()
        .filter(|&e| {
            let (src, dst) = flow.graph.edge_endpoints(e).unwrap();
            flow.scope_of(src) != flow.scope_of(dst)
                && !matches!(flow.node(dst), Node::LoopExit { .. } | Node::GotoNode { .. } | Node::Exit)
        })
        .collect();

    let mut redirect: Vec<(petgraph::graph::EdgeIndex, NodeIndex)> = Vec::new();
    for edge_id in candidate_edges {
        let (src, dst) = flow.graph.edge_endpoints(edge_id).unwrap();
        let src_scope = flow.scope_of(src);
        let scope_key = match src_scope {
            Scope::Root => None,
            Scope::Loop(l) => Some(l),
        };

        let goto_node = *goto_nodes.entry((scope_key, dst)).or_insert_with(|| {
            let node = flow.graph.add_node(Node::GotoNode { target: dst });
            flow.tag_scope(node, src_scope, flow.enclosing_loops(src).to_vec());
            node
        });

        redirect.push((edge_id, goto_node));
    }
    redirect_edges(flow, redirect);
}
