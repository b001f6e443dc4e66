//! S2: drop statements unreachable from `Entry`.
//!
//! A DFS from the entry node via `petgraph::visit::Dfs` rebuilds a new
//! `StmtGraph` containing only the nodes and edges actually visited.
//! Statements dropped this way are reported through the `Reporter`, not
//! treated as an error - an unreachable paragraph is a lint, not a failure.

use std::collections::{HashMap, HashSet};

use petgraph::graph::NodeIndex;
use petgraph::visit::Dfs;

use crate::cfg::stmt_graph::{StmtDiGraph, StmtGraph, StmtNode};
use crate::error::{Reporter, Warning};
use crate::syntax::SyntaxTree;

/// Run a DFS from `entry` and rebuild the graph with only the visited nodes
/// and the edges between them. Node identity is *not* preserved - the
/// returned `StmtGraph` has its own fresh `NodeIndex` space; callers must
/// re-resolve any indices they held against the input graph.
pub fn filter_unreachable(sg: &StmtGraph, tree: &SyntaxTree, reporter: &mut dyn Reporter) -> StmtGraph {
    let mut dfs = Dfs::new(&sg.graph, sg.entry);
    let mut visited = Vec::new();
    while let Some(idx) = dfs.next(&sg.graph) {
        visited.push(idx);
    }
    let visited_set: HashSet<NodeIndex> = visited.iter().copied().collect();

    report_unreachable(sg, &visited_set, tree, reporter);

    let mut out = StmtDiGraph::new();
    let mut remap: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut node_of = HashMap::new();

    for &old in &visited {
        let weight = sg.graph[old];
        let new = out.add_node(weight);
        remap.insert(old, new);
        node_of.insert(weight, new);
    }

    for edge in sg.graph.edge_indices() {
        let (from, to) = sg.graph.edge_endpoints(edge).unwrap();
        if let (Some(&nf), Some(&nt)) = (remap.get(&from), remap.get(&to)) {
            out.add_edge(nf, nt, sg.graph[edge]);
        }
    }

    StmtGraph {
        graph: out,
        entry: remap[&sg.entry],
        exit: remap[&sg.exit],
        node_of,
    }
}

fn report_unreachable(
    sg: &StmtGraph,
    visited: &HashSet<NodeIndex>,
    tree: &SyntaxTree,
    reporter: &mut dyn Reporter,
) {
    use petgraph::visit::IntoNodeReferences;

    let mut dropped: Vec<_> = sg
        .graph
        .node_references()
        .filter(|(idx, _)| !visited.contains(idx))
        .filter_map(|(_, weight)| match weight {
            StmtNode::Stmt(stmt_id) => Some(*stmt_id),
            _ => None,
        })
        .collect();
    dropped.sort_by_key(|id| tree.statement(*id).source.from_char);

    let mut warned_paragraphs = HashSet::new();
    for stmt_id in dropped {
        let stmt = tree.statement(stmt_id);
        let para = tree.sentence(stmt.sentence).para;
        if !warned_paragraphs.insert(para) {
            continue;
        }
        let name = tree.paragraph(para).name.clone().unwrap_or_else(|| "<unnamed>".to_string());
        reporter.warn(Warning::UnusedParagraph { name });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingReporter;
    use crate::syntax::*;

    fn src(c: usize, l: usize) -> Source {
        Source::new(c, c, l, l)
    }

    #[test]
    fn unreachable_paragraph_is_dropped_and_warned() {
        let mut tree = SyntaxTree::default();

        let sent_a = SentId(0);
        let sent_b = SentId(1);
        let para_a = ParaId(0);
        let para_b = ParaId(1);
        let s0 = StmtId(0); // in reachable paragraph A, exits
        let s1 = StmtId(1); // in unreachable paragraph B

        tree.statements.push(Statement {
            source: src(0, 1),
            sentence: sent_a,
            kind: StatementKind::ExitSection,
        });
        tree.statements.push(Statement {
            source: src(1, 2),
            sentence: sent_b,
            kind: StatementKind::Unparsed,
        });

        tree.sentences.push(Sentence {
            source: src(0, 1),
            stmts: vec![s0],
            next_sentence: None,
            para: para_a,
        });
        tree.sentences.push(Sentence {
            source: src(1, 2),
            stmts: vec![s1],
            next_sentence: None,
            para: para_b,
        });

        tree.paragraphs.push(Paragraph {
            name: Some("A".into()),
            source: src(0, 1),
            sentences: vec![sent_a],
            next_para: Some(para_b),
        });
        tree.paragraphs.push(Paragraph {
            name: Some("B".into()),
            source: src(1, 2),
            sentences: vec![sent_b],
            next_para: None,
        });

        tree.sections.push(Section {
            name: "SECT".into(),
            source: src(0, 1),
            first_para: Some(para_a),
            paras: vec![para_a, para_b],
            used_sections: vec![],
        });

        let mut build_reporter = CollectingReporter::default();
        let sg = StmtGraph::build(&tree, SectionId(0), &mut build_reporter).unwrap();
        // Paragraph A's only statement exits straight to Exit, so B is
        // never reached through normal control flow.
        let mut reporter = CollectingReporter::default();
        let filtered = filter_unreachable(&sg, &tree, &mut reporter);

        assert_eq!(reporter.warnings.len(), 1);
        assert!(matches!(&reporter.warnings[0], Warning::UnusedParagraph { name } if name == "B"));
        assert!(filtered.node_index(StmtNode::Stmt(s1)).is_none());
        assert!(filtered.node_index(StmtNode::Stmt(s0)).is_some());
    }

    #[test]
    fn fully_reachable_graph_is_untouched() {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let para = ParaId(0);
        let s0 = StmtId(0);

        tree.statements.push(Statement {
            source: src(0, 1),
            sentence: sent,
            kind: StatementKind::ExitSection,
        });
        tree.sentences.push(Sentence {
            source: src(0, 1),
            stmts: vec![s0],
            next_sentence: None,
            para,
        });
        tree.paragraphs.push(Paragraph {
            name: Some("A".into()),
            source: src(0, 1),
            sentences: vec![sent],
            next_para: None,
        });
        tree.sections.push(Section {
            name: "SECT".into(),
            source: src(0, 1),
            first_para: Some(para),
            paras: vec![para],
            used_sections: vec![],
        });

        let mut build_reporter = CollectingReporter::default();
        let sg = StmtGraph::build(&tree, SectionId(0), &mut build_reporter).unwrap();
        let mut reporter = CollectingReporter::default();
        let filtered = filter_unreachable(&sg, &tree, &mut reporter);

        assert!(reporter.warnings.is_empty());
        assert_eq!(filtered.graph.node_count(), sg.graph.node_count());
        assert_eq!(filtered.graph.edge_count(), sg.graph.edge_count());
    }
}
