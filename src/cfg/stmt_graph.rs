//! S1: build a per-statement control flow graph from the syntax tree.
//!
//! One node per reachable-or-not COBOL statement plus the `Entry`/`Exit`
//! singletons; exactly one edge group per statement, depending on its
//! `StatementKind` (see the crate docs for the classification rules). A
//! one-node-per-statement model rather than one-block-per-leader, since
//! this stage operates directly on statements, not basic blocks.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{CoreError, Reporter, Result, Warning};
use crate::syntax::{SectionId, StatementKind, StmtId, SyntaxTree};

/// A node of the S1 graph: either a real statement, or one of the two
/// section-wide singletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StmtNode {
    Entry,
    Exit,
    Stmt(StmtId),
}

/// `StmtGraph`: `DiGraph<StmtNode, Option<bool>>`. The edge weight is the
/// `condition` label (`Some(true)`/`Some(false)`) for the two edges out of
/// a `Branch`, `None` otherwise.
pub type StmtDiGraph = DiGraph<StmtNode, Option<bool>>;

pub struct StmtGraph {
    pub graph: StmtDiGraph,
    pub entry: NodeIndex,
    pub exit: NodeIndex,
    node_of: HashMap<StmtNode, NodeIndex>,
}

fn intern(graph: &mut StmtDiGraph, node_of: &mut HashMap<StmtNode, NodeIndex>, n: StmtNode) -> NodeIndex {
    *node_of.entry(n).or_insert_with(|| graph.add_node(n))
}

fn is_last_in_sentence(tree: &SyntaxTree, id: StmtId) -> bool {
    let stmt = tree.statement(id);
    let sentence = tree.sentence(stmt.sentence);
    sentence.stmts.last() == Some(&id)
}

impl StmtGraph {
    pub fn node_index(&self, node: StmtNode) -> Option<NodeIndex> {
        self.node_of.get(&node).copied()
    }

    /// Walk every paragraph -> sentence -> statement of `section` in
    /// source order, wiring exactly one edge group per statement. Non-fatal
    /// conditions noticed along the way (an unparsed verb, a no-op `EXIT`
    /// that isn't the last statement of its sentence, a final `NEXT
    /// SENTENCE` with nowhere to fall through but `Exit`) are reported
    /// through `reporter`.
    pub fn build(tree: &SyntaxTree, section: SectionId, reporter: &mut dyn Reporter) -> Result<StmtGraph> {
        let mut graph = StmtDiGraph::new();
        let mut node_of = HashMap::new();

        let entry = intern(&mut graph, &mut node_of, StmtNode::Entry);
        let exit = intern(&mut graph, &mut node_of, StmtNode::Exit);

        let section_data = tree.section(section);

        // Pre-create a node for every statement in this section so edges
        // can be added in any order below.
        for &para_id in &section_data.paras {
            for &sent_id in &tree.paragraph(para_id).sentences {
                for &stmt_id in &tree.sentence(sent_id).stmts {
                    intern(&mut graph, &mut node_of, StmtNode::Stmt(stmt_id));
                }
            }
        }

        for &para_id in &section_data.paras {
            for &sent_id in &tree.paragraph(para_id).sentences {
                for &stmt_id in &tree.sentence(sent_id).stmts {
                    let stmt = tree.statement(stmt_id);
                    let src = node_of[&StmtNode::Stmt(stmt_id)];

                    match &stmt.kind {
                        StatementKind::Branch { true_stmt, false_stmt } => {
                            let t = intern(&mut graph, &mut node_of, StmtNode::Stmt(*true_stmt));
                            let f = intern(&mut graph, &mut node_of, StmtNode::Stmt(*false_stmt));
                            graph.add_edge(src, t, Some(true));
                            graph.add_edge(src, f, Some(false));
                        }

                        StatementKind::GoTo {
                            paragraph_name,
                            resolved_target,
                        } => {
                            let target = resolved_target.ok_or_else(|| CoreError::UndefinedGotoTarget {
                                paragraph_name: paragraph_name.clone(),
                                source_line: stmt.source.from_line,
                            })?;
                            let dst = intern(&mut graph, &mut node_of, StmtNode::Stmt(target));
                            graph.add_edge(src, dst, None);
                        }

                        StatementKind::NextSentence => {
                            let dst = match tree.next_sentence_successor(stmt_id) {
                                Some(next) => intern(&mut graph, &mut node_of, StmtNode::Stmt(next)),
                                None => {
                                    reporter.warn(Warning::NextSentenceFallsThroughToExit {
                                        source_line: stmt.source.from_line,
                                    });
                                    exit
                                }
                            };
                            graph.add_edge(src, dst, None);
                        }

                        StatementKind::Move | StatementKind::PerformSection { .. } => {
                            let dst = match tree.lexical_successor(stmt_id) {
                                Some(next) => intern(&mut graph, &mut node_of, StmtNode::Stmt(next)),
                                None => exit,
                            };
                            graph.add_edge(src, dst, None);
                        }

                        StatementKind::Unparsed => {
                            reporter.warn(Warning::UnparsedVerb {
                                source_line: stmt.source.from_line,
                            });
                            let dst = match tree.lexical_successor(stmt_id) {
                                Some(next) => intern(&mut graph, &mut node_of, StmtNode::Stmt(next)),
                                None => exit,
                            };
                            graph.add_edge(src, dst, None);
                        }

                        StatementKind::ExitSection
                        | StatementKind::ExitProgram
                        | StatementKind::Goback
                        | StatementKind::StopRun => {
                            if !is_last_in_sentence(tree, stmt_id) {
                                reporter.warn(Warning::NonTerminalExit {
                                    source_line: stmt.source.from_line,
                                });
                            }
                            graph.add_edge(src, exit, None);
                        }
                    }
                }
            }
        }

        match tree.first_stmt_of_section(section) {
            Some(stmt_id) => {
                let dst = intern(&mut graph, &mut node_of, StmtNode::Stmt(stmt_id));
                graph.add_edge(entry, dst, None);
            }
            None => {
                // Empty section: Entry falls straight through to Exit.
                graph.add_edge(entry, exit, None);
            }
        }

        Ok(StmtGraph {
            graph,
            entry,
            exit,
            node_of,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingReporter;
    use crate::syntax::*;

    fn src(from_char: usize, line: usize) -> Source {
        Source::new(from_char, from_char, line, line)
    }

    /// `perform a. exit.` - one sequential statement then a terminator.
    fn two_stmt_tree() -> (SyntaxTree, SectionId) {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let para = ParaId(0);

        let s0 = StmtId(0);
        let s1 = StmtId(1);

        tree.statements.push(Statement {
            source: src(0, 1),
            sentence: sent,
            kind: StatementKind::Unparsed,
        });
        tree.statements.push(Statement {
            source: src(1, 2),
            sentence: sent,
            kind: StatementKind::ExitSection,
        });

        tree.sentences.push(Sentence {
            source: src(0, 1),
            stmts: vec![s0, s1],
            next_sentence: None,
            para,
        });

        tree.paragraphs.push(Paragraph {
            name: Some("MAIN".into()),
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

        (tree, SectionId(0))
    }

    #[test]
    fn empty_section_entry_falls_to_exit() {
        let mut tree = SyntaxTree::default();
        tree.sections.push(Section {
            name: "EMPTY".into(),
            source: src(0, 1),
            first_para: None,
            paras: vec![],
            used_sections: vec![],
        });

        let mut reporter = CollectingReporter::default();
        let sg = StmtGraph::build(&tree, SectionId(0), &mut reporter).unwrap();
        assert_eq!(sg.graph.edge_count(), 1);
        let (from, to) = sg.graph.edge_endpoints(sg.graph.edge_indices().next().unwrap()).unwrap();
        assert_eq!(from, sg.entry);
        assert_eq!(to, sg.exit);
    }

    #[test]
    fn sequential_then_terminator() {
        let (tree, section) = two_stmt_tree();
        let mut reporter = CollectingReporter::default();
        let sg = StmtGraph::build(&tree, section, &mut reporter).unwrap();

        let n0 = sg.node_index(StmtNode::Stmt(StmtId(0))).unwrap();
        let n1 = sg.node_index(StmtNode::Stmt(StmtId(1))).unwrap();

        assert!(sg.graph.find_edge(sg.entry, n0).is_some());
        assert!(sg.graph.find_edge(n0, n1).is_some());
        assert!(sg.graph.find_edge(n1, sg.exit).is_some());

        // s0 is `Unparsed`, so building the graph should have flagged it.
        assert!(matches!(&reporter.warnings[0], Warning::UnparsedVerb { .. }));
    }

    #[test]
    fn exit_not_last_in_sentence_is_flagged() {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let para = ParaId(0);
        let s0 = StmtId(0); // EXIT SECTION, not last
        let s1 = StmtId(1); // dead code after it

        tree.statements.push(Statement {
            source: src(0, 1),
            sentence: sent,
            kind: StatementKind::ExitSection,
        });
        tree.statements.push(Statement {
            source: src(1, 2),
            sentence: sent,
            kind: StatementKind::Move,
        });
        tree.sentences.push(Sentence {
            source: src(0, 1),
            stmts: vec![s0, s1],
            next_sentence: None,
            para,
        });
        tree.paragraphs.push(Paragraph {
            name: Some("MAIN".into()),
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

        let mut reporter = CollectingReporter::default();
        StmtGraph::build(&tree, SectionId(0), &mut reporter).unwrap();

        assert!(matches!(&reporter.warnings[0], Warning::NonTerminalExit { source_line: 1 }));
    }

    #[test]
    fn next_sentence_in_final_sentence_falls_through_to_exit_and_warns() {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let para = ParaId(0);
        let s0 = StmtId(0);

        tree.statements.push(Statement {
            source: src(0, 1),
            sentence: sent,
            kind: StatementKind::NextSentence,
        });
        tree.sentences.push(Sentence {
            source: src(0, 1),
            stmts: vec![s0],
            next_sentence: None,
            para,
        });
        tree.paragraphs.push(Paragraph {
            name: Some("MAIN".into()),
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

        let mut reporter = CollectingReporter::default();
        let sg = StmtGraph::build(&tree, SectionId(0), &mut reporter).unwrap();

        let n0 = sg.node_index(StmtNode::Stmt(s0)).unwrap();
        assert!(sg.graph.find_edge(n0, sg.exit).is_some());
        assert!(matches!(
            &reporter.warnings[0],
            Warning::NextSentenceFallsThroughToExit { source_line: 1 }
        ));
    }

    #[test]
    fn undefined_goto_is_an_error() {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let para = ParaId(0);
        let s0 = StmtId(0);

        tree.statements.push(Statement {
            source: src(0, 1),
            sentence: sent,
            kind: StatementKind::GoTo {
                paragraph_name: "NOWHERE".into(),
                resolved_target: None,
            },
        });
        tree.sentences.push(Sentence {
            source: src(0, 1),
            stmts: vec![s0],
            next_sentence: None,
            para,
        });
        tree.paragraphs.push(Paragraph {
            name: Some("MAIN".into()),
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

        let mut reporter = CollectingReporter::default();
        let err = StmtGraph::build(&tree, SectionId(0), &mut reporter).unwrap_err();
        assert!(matches!(err, CoreError::UndefinedGotoTarget { .. }));
    }
}
