//! Optional debug artefacts for a `FlowGraph`: Graphviz DOT and a flattened
//! JSON view (`FlowGraphExport`), used for inspecting any stage between S3
//! and S5. Not part of the formal contract - nothing downstream reads
//! these back in.

use std::fmt::Write;

use crate::cfg::node::{FlowGraphExport, Node, NodeExport, EdgeExport};
use crate::cfg::node::{FlowGraph, Scope};
use crate::syntax::SyntaxTree;

/// Render a `FlowGraph` to Graphviz DOT. Nodes are coloured by scope
/// (`Root` vs. a specific loop, distinguished by hue); edges are labelled
/// `true`/`false` for a `Branch`/while-`Loop`'s two out-edges and show the
/// count of statements they carry.
pub fn export_dot(flow: &FlowGraph, tree: &SyntaxTree) -> String {
    let mut dot = String::from("digraph FlowGraph {\n");
    dot.push_str("  rankdir=TB;\n");
    dot.push_str("  node [shape=box, style=rounded];\n\n");

    for idx in flow.graph.node_indices() {
        let node = flow.node(idx);
        let label = escape(&node_label(node));
        let style = match node {
            Node::Entry => "fillcolor=lightgreen, style=filled".to_string(),
            Node::Exit => "fillcolor=lightcoral, style=filled".to_string(),
            _ => format!("fillcolor=\"{}\", style=filled", scope_color(flow.scope_of(idx))),
        };
        writeln!(dot, "  \"{}\" [label=\"{}\", {}];", idx.index(), label, style).ok();
    }

    dot.push('\n');
    for edge_idx in flow.graph.edge_indices() {
        let (from, to) = flow.graph.edge_endpoints(edge_idx).unwrap();
        let edge = &flow.graph[edge_idx];
        let mut label = match edge.condition {
            Some(true) => "if true:".to_string(),
            Some(false) => "if false:".to_string(),
            None => String::new(),
        };
        if !edge.stmts.is_empty() {
            if !label.is_empty() {
                label.push(' ');
            }
            let _ = write!(label, "[{}]", edge.stmts.len());
        }
        let _ = tree; // statement text rendering is the (out-of-scope) emitter's job
        writeln!(dot, "  \"{}\" -> \"{}\" [label=\"{}\"];", from.index(), to.index(), escape(&label)).ok();
    }

    dot.push_str("}\n");
    dot
}

fn node_label(node: &Node) -> String {
    match node {
        Node::ContinueLoop { loop_node } => format!("ContinueLoop({})", loop_node.index()),
        Node::LoopExit { loop_node } => format!("LoopExit({})", loop_node.index()),
        Node::GotoNode { target } => format!("GotoNode({})", target.index()),
        _ => node.label().to_string(),
    }
}

fn scope_color(scope: Scope) -> String {
    match scope {
        Scope::Root => "white".to_string(),
        Scope::Loop(n) => {
            // Cheap deterministic hash of the loop header's index into a
            // pastel hue, so nested loops are visually distinguishable
            // without needing a colour palette sized to loop count.
            let hue = (n.index() as f64 * 0.61803398875) % 1.0;
            format!("{:.3} 0.35 0.95", hue)
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

/// Flatten a `FlowGraph` into the JSON-friendly `FlowGraphExport` shape.
pub fn export_json(flow: &FlowGraph) -> FlowGraphExport {
    let nodes = flow
        .graph
        .node_indices()
        .map(|idx| NodeExport {
            id: idx.index(),
            kind: node_label(flow.node(idx)),
            scope: match flow.scope_of(idx) {
                Scope::Root => None,
                Scope::Loop(n) => Some(n.index()),
            },
        })
        .collect();

    let edges = flow
        .graph
        .edge_indices()
        .map(|idx| {
            let (from, to) = flow.graph.edge_endpoints(idx).unwrap();
            let edge = &flow.graph[idx];
            EdgeExport {
                from: from.index(),
                to: to.index(),
                condition: edge.condition,
                stmt_count: edge.stmts.len(),
            }
        })
        .collect();

    FlowGraphExport { nodes, edges }
}
