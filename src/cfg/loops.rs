//! S4: break loops (strongly connected components) into a DAG augmented
//! with `Loop`/`ContinueLoop` marker nodes and per-node scope tags.
//!
//! Repeated SCC discovery, header selection, and edge rewiring, using
//! `petgraph::algo::tarjan_scc` for component discovery. Mutates `FlowGraph`
//! in place (transmuting a `Join` header into its `Loop` node rather than
//! removing and re-adding it) so that `NodeIndex` identity survives every
//! pass - `petgraph::Graph::remove_node` invalidates indices via swap-remove,
//! which would break every index the reducer stages hold onto.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::cfg::node::{scc_singleton_self_loop, Edge, FlowGraph, Node, Scope};
use crate::syntax::SyntaxTree;

/// Repeatedly find strongly connected components of size >= 2, break each
/// one's cycle, and iterate until none remain; then break any remaining
/// single-node self-loops.
pub fn break_loops(flow: &mut FlowGraph, tree: &SyntaxTree) {
    loop {
        let components: Vec<Vec<NodeIndex>> = tarjan_scc(&flow.graph)
            .into_iter()
            .filter(|c| c.len() > 1)
            .collect();

        if components.is_empty() {
            break;
        }

        let mut components = components;
        components.sort_by_key(|c| c.iter().map(|&n| flow.node_source_key(n, tree)).min().unwrap());

        for component in components {
            let set: HashSet<NodeIndex> = component.iter().copied().collect();
            break_component_loop(flow, tree, &set);
        }
    }

    let self_loop_nodes: Vec<NodeIndex> = flow
        .graph
        .node_indices()
        .filter(|&idx| scc_singleton_self_loop(&flow.graph, idx))
        .collect();

    for idx in self_loop_nodes {
        let mut set = HashSet::new();
        set.insert(idx);
        break_component_loop(flow, tree, &set);
    }
}

fn break_component_loop(flow: &mut FlowGraph, tree: &SyntaxTree, component: &HashSet<NodeIndex>) {
    let header = find_loop_header(flow, tree, component);

    let header_stmt = flow.node(header).stmt().expect("loop header must wrap a statement");
    let header_is_join = flow.node(header).is_join();

    let loop_node = if header_is_join {
        *flow.graph.node_weight_mut(header).unwrap() = Node::Loop {
            stmt: header_stmt,
            condition: None,
        };
        header
    } else {
        let new_loop = flow.graph.add_node(Node::Loop {
            stmt: header_stmt,
            condition: None,
        });
        flow.graph.add_edge(new_loop, header, Edge::straight(vec![]));
        new_loop
    };

    let continue_loop = flow.graph.add_node(Node::ContinueLoop { loop_node });

    // Redirect every in-edge of the (original) header: from inside the
    // component to `continue_loop`, from outside to `loop_node`. When the
    // header was a Join we transmuted it in place, so external edges
    // already point at the right node and only internal ones need moving.
    //
    // `remove_edge` swap-removes, so a collected `EdgeIndex` can go stale
    // after any other removal in the same batch; extract (source, weight)
    // pairs first, bulk-remove by id with `retain_edges`, then re-add.
    let mut to_remove = HashSet::new();
    let mut rewires = Vec::new();
    for e in flow.graph.edges_directed(header, Direction::Incoming) {
        let src = e.source();
        let from_inside = component.contains(&src);
        if !from_inside && header_is_join {
            continue;
        }
        to_remove.insert(e.id());
        let dest = if from_inside { continue_loop } else { loop_node };
        rewires.push((src, dest, e.weight().clone()));
    }
    flow.graph.retain_edges(|_, e| !to_remove.contains(&e));
    for (src, dest, weight) in rewires {
        flow.graph.add_edge(src, dest, weight);
    }

    // Establish each component node's (and continue_loop's) enclosing-loop
    // context, extending whatever nesting it already carries from an
    // earlier (outer) pass. The header itself keeps its pre-existing scope
    // - a Loop lives in its enclosing scope, not its own.
    let prior_context = component
        .iter()
        .find(|&&n| n != header)
        .map(|&n| flow.enclosing_loops(n).to_vec())
        .unwrap_or_default();

    for &node in component {
        if node == header {
            continue;
        }
        let mut scopes = flow.enclosing_loops(node).to_vec();
        scopes.push(loop_node);
        flow.tag_scope(node, Scope::Loop(loop_node), scopes);
    }

    let mut continue_scopes = prior_context;
    continue_scopes.push(loop_node);
    flow.tag_scope(continue_loop, Scope::Loop(loop_node), continue_scopes);
}

/// Header = component node maximising the count of distinct predecessors
/// lying outside the component; ties broken by earliest source position.
fn find_loop_header(flow: &FlowGraph, tree: &SyntaxTree, component: &HashSet<NodeIndex>) -> NodeIndex {
    let mut best: Option<(usize, usize, NodeIndex)> = None; // (outside_preds, -source_key as tie-break via min source)

    for &node in component {
        let outside_preds: HashSet<NodeIndex> = flow
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .filter(|p| !component.contains(p))
            .collect();
        let count = outside_preds.len();
        let key = flow.node_source_key(node, tree);

        best = Some(match best {
            None => (count, key, node),
            Some((best_count, best_key, best_node)) => {
                if count > best_count || (count == best_count && key < best_key) {
                    (count, key, node)
                } else {
                    (best_count, best_key, best_node)
                }
            }
        });
    }

    best.expect("component must be non-empty").2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::branch_join;
    use crate::cfg::stmt_graph::StmtGraph;
    use crate::syntax::*;

    fn src(c: usize, l: usize) -> Source {
        Source::new(c, c, l, l)
    }

    /// `loop. if x>y go to done. perform b. go to loop. done. perform c. exit.`
    fn goto_loop_tree() -> SyntaxTree {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let para = ParaId(0);
        let para_done = ParaId(1);
        let sent_done = SentId(1);

        let s_loop_if = StmtId(0); // if x>y go to done
        let s_b = StmtId(1); // perform b
        let s_goto = StmtId(2); // go to loop
        let s_c = StmtId(3); // perform c
        let s_exit = StmtId(4);

        // "if x>y go to done": true branch jumps ahead to done's first statement,
        // false branch falls through to "perform b".
        tree.statements.push(Statement {
            source: src(0, 1),
            sentence: sent,
            kind: StatementKind::Branch {
                true_stmt: s_c,
                false_stmt: s_b,
            },
        });

        tree.statements.push(Statement {
            source: src(1, 2),
            sentence: sent,
            kind: StatementKind::Unparsed,
        });
        tree.statements.push(Statement {
            source: src(2, 3),
            sentence: sent,
            kind: StatementKind::GoTo {
                paragraph_name: "LOOP".into(),
                resolved_target: Some(s_loop_if),
            },
        });
        tree.statements.push(Statement {
            source: src(3, 4),
            sentence: sent_done,
            kind: StatementKind::Unparsed,
        });
        tree.statements.push(Statement {
            source: src(4, 5),
            sentence: sent_done,
            kind: StatementKind::ExitSection,
        });

        tree.sentences.push(Sentence {
            source: src(0, 1),
            stmts: vec![s_loop_if, s_b, s_goto],
            next_sentence: Some(sent_done),
            para,
        });
        tree.sentences.push(Sentence {
            source: src(3, 4),
            stmts: vec![s_c, s_exit],
            next_sentence: None,
            para: para_done,
        });

        tree.paragraphs.push(Paragraph {
            name: Some("LOOP".into()),
            source: src(0, 1),
            sentences: vec![sent],
            next_para: Some(para_done),
        });
        tree.paragraphs.push(Paragraph {
            name: Some("DONE".into()),
            source: src(3, 4),
            sentences: vec![sent_done],
            next_para: None,
        });

        tree.sections.push(Section {
            name: "SECT".into(),
            source: src(0, 1),
            first_para: Some(para),
            paras: vec![para, para_done],
            used_sections: vec![],
        });

        tree
    }

    #[test]
    fn goto_loop_produces_a_loop_and_continue_node() {
        let tree = goto_loop_tree();
        let mut reporter = crate::error::CollectingReporter::default();
        let sg = StmtGraph::build(&tree, SectionId(0), &mut reporter).unwrap();
        let mut flow = branch_join::build(&sg, &tree);

        break_loops(&mut flow, &tree);

        let loop_nodes: Vec<_> = flow.graph.node_indices().filter(|&i| flow.node(i).is_loop()).collect();
        let continue_nodes: Vec<_> = flow.graph.node_indices().filter(|&i| flow.node(i).is_continue_loop()).collect();

        assert_eq!(loop_nodes.len(), 1);
        assert_eq!(continue_nodes.len(), 1);

        let loop_node = loop_nodes[0];
        // The branch node (if x>y go to done) must now be in the loop's scope.
        let branch_node = flow
            .graph
            .node_indices()
            .find(|&i| flow.node(i).is_branch())
            .expect("branch survives");
        assert_eq!(flow.scope_of(branch_node), Scope::Loop(loop_node));
    }
}
