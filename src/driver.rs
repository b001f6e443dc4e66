//! Top-level entry point: runs the six-stage pipeline over one section, or
//! every section of a program in source order.
//!
//! Aggregates one independent result per section rather than failing the
//! whole run the moment a single section hits a fatal error.

use crate::cfg::node::FlowGraph;
use crate::cfg::{branch_join, loops, reachability, scope, stmt_graph::StmtGraph};
use crate::error::{CoreError, DuplicateNameKind, Reporter, Result, Warning};
use crate::structured::Block;
use crate::syntax::{SectionId, SyntaxTree};

/// Run S1-S6 on a single section, returning its structured tree.
///
/// `keep_raw` controls whether `GOTO`/`NEXT SENTENCE`/terminator statements
/// are kept as `Stmt::Cobol` pass-throughs alongside the structure they
/// already implied (useful for debugging the structurer itself; the
/// default rendering path wants them dropped).
pub fn structure_section(
    tree: &SyntaxTree,
    section: SectionId,
    keep_raw: bool,
    reporter: &mut dyn Reporter,
) -> Result<Block> {
    let sg = StmtGraph::build(tree, section, reporter)?;
    let sg = reachability::filter_unreachable(&sg, tree, reporter);

    let mut flow: FlowGraph = branch_join::build(&sg, tree);
    loops::break_loops(&mut flow, tree);
    scope::structure_scopes(&mut flow);

    crate::cfg::reduce::structure(&flow, tree, keep_raw)
}

/// One section's outcome: either its structured tree, or the fatal error
/// that stopped S1-S5 from completing for it. A failure here never stops
/// the other sections in the program from being processed.
pub struct SectionResult {
    pub section: SectionId,
    pub outcome: Result<Block>,
}

/// Run every section of `tree` in source order, validating section and
/// paragraph name uniqueness first. Duplicates are a policy decision, not
/// a hard failure: every duplicate after the first is reported as a
/// warning and left as-is; the caller decides whether a name collision
/// further downstream, e.g. at emission time, needs mangling.
pub fn structure_program(tree: &SyntaxTree, keep_raw: bool, reporter: &mut dyn Reporter) -> Vec<SectionResult> {
    validate_names(tree, reporter);

    tree.sections_in_order()
        .into_iter()
        .map(|section| SectionResult {
            section,
            outcome: structure_section(tree, section, keep_raw, reporter),
        })
        .collect()
}

fn validate_names(tree: &SyntaxTree, reporter: &mut dyn Reporter) {
    use std::collections::HashSet;

    let mut seen_sections = HashSet::new();
    for &id in &tree.sections_in_order() {
        let name = &tree.section(id).name;
        if !seen_sections.insert(name.clone()) {
            reporter.warn(Warning::DuplicateNameMangled {
                kind: DuplicateNameKind::Section,
                original: name.clone(),
                mangled: format!("{name}__dup{}", id.index()),
            });
        }

        let mut seen_paragraphs = HashSet::new();
        for &para_id in &tree.section(id).paras {
            let Some(name) = &tree.paragraph(para_id).name else { continue };
            if !seen_paragraphs.insert(name.clone()) {
                reporter.warn(Warning::DuplicateNameMangled {
                    kind: DuplicateNameKind::Paragraph,
                    original: name.clone(),
                    mangled: format!("{name}__dup{}", para_id.index()),
                });
            }
        }
    }
}

/// Strict variant of [`structure_program`] used by callers that would
/// rather fail the whole run than auto-mangle a duplicate name.
pub fn structure_program_strict(tree: &SyntaxTree, keep_raw: bool, reporter: &mut dyn Reporter) -> Result<Vec<Block>> {
    let mut seen = std::collections::HashSet::new();
    for id in tree.sections_in_order() {
        let name = tree.section(id).name.clone();
        if !seen.insert(name.clone()) {
            return Err(CoreError::DuplicateName {
                kind: DuplicateNameKind::Section,
                name,
            });
        }
    }

    tree.sections_in_order()
        .into_iter()
        .map(|section| structure_section(tree, section, keep_raw, reporter))
        .collect()
}
