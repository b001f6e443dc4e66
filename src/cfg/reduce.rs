//! S6: block reduction. Walks the scoped `FlowGraph` left by S5 and folds
//! it into the `structured::Block` tree: the central algorithm of the
//! pipeline.
//!
//! Scope state lives in a single `Reducer` keyed by a `ScopeKey`, rather
//! than one object per scope; recursive reduction passes `&mut Reducer`
//! plus the current key rather than aliasing a scope object - there is no
//! case in this algorithm where two scopes need to be mutably borrowed at
//! once, so a per-scope object would only add indirection.
//!
//! Because S5 already reified `LoopExit`/`GotoNode`/`ContinueLoop` as
//! explicit graph nodes (deciding up front which outside-scope target
//! "wins" a loop's exit), this stage never needs a deferred break/continue
//! popularity count - a branch whose two arms diverge picks between at
//! most two already-known candidates using the priority order below,
//! instead of batching votes across every branch in a scope.

use std::collections::{HashMap, HashSet};

use petgraph::graph::NodeIndex;

use crate::cfg::node::{Condition, FlowGraph, Node, Scope};
use crate::error::{CoreError, Result};
use crate::structured::{Block, Label, Stmt};
use crate::syntax::{StmtId, SyntaxTree};

/// Defensive step counter default; see `CoreError::ReductionBudgetExceeded`.
pub const DEFAULT_REDUCTION_BUDGET: usize = 1_000_000;

/// Root scope, or a specific loop's body scope. Mirrors `cfg::node::Scope`
/// but as a hashable key the reducer can index its per-scope state by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ScopeKey {
    Root,
    Loop(NodeIndex),
}

impl ScopeKey {
    fn as_scope(self) -> Scope {
        match self {
            ScopeKey::Root => Scope::Root,
            ScopeKey::Loop(n) => Scope::Loop(n),
        }
    }
}

/// Where a `reduce_block` call begins: after tracing an edge's statements
/// (the normal case), or directly at a node with no preceding edge (used to
/// re-enter a node already determined to need a label, from
/// `finish_scope`'s tail sweep).
enum Start {
    Edge { stmts: Vec<StmtId>, node: NodeIndex },
    Node(NodeIndex),
}

/// The result of reducing one straight run of control flow: the statements
/// produced, and where control goes next (`None` once that's been folded
/// into a jump statement inside `block` itself).
struct Reduction {
    block: Block,
    dest: Option<NodeIndex>,
}

/// Shared bookkeeping for one section's worth of reduction, keyed by scope.
struct Reducer<'a> {
    flow: &'a FlowGraph,
    tree: &'a SyntaxTree,
    keep_raw: bool,
    budget: usize,
    steps: usize,
    /// Every node belonging to a scope, fixed once the scope is first
    /// touched. Never includes `Entry`/`Exit`/`ContinueLoop`/`LoopExit`/
    /// `GotoNode` - those are always stop-sentinels, not dispatch targets,
    /// so scope membership is never asked of them.
    members: HashMap<ScopeKey, HashSet<NodeIndex>>,
    /// Subset of `members` not yet folded into the tree.
    unreduced: HashMap<ScopeKey, HashSet<NodeIndex>>,
    /// Nodes in a scope known to need a label, queued for `finish_scope`.
    tail: HashMap<ScopeKey, HashSet<NodeIndex>>,
    /// Extra "this many in-edges are already accounted for by an enclosing
    /// construct" credit per node, checked against the raw graph in-degree
    /// by `is_reduced_join`.
    reduced_in_edges: HashMap<NodeIndex, usize>,
    labels: HashMap<NodeIndex, Label>,
}

impl<'a> Reducer<'a> {
    fn new(flow: &'a FlowGraph, tree: &'a SyntaxTree, keep_raw: bool, budget: usize) -> Self {
        Reducer {
            flow,
            tree,
            keep_raw,
            budget,
            steps: 0,
            members: HashMap::new(),
            unreduced: HashMap::new(),
            tail: HashMap::new(),
            reduced_in_edges: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    fn step(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.budget {
            return Err(CoreError::ReductionBudgetExceeded { limit: self.budget });
        }
        Ok(())
    }

    fn ensure_scope(&mut self, key: ScopeKey) {
        if self.members.contains_key(&key) {
            return;
        }
        let scope = key.as_scope();
        let set: HashSet<NodeIndex> = self
            .flow
            .graph
            .node_indices()
            .filter(|&n| self.flow.scope_of(n) == scope)
            .filter(|&n| {
                !matches!(
                    self.flow.node(n),
                    Node::Entry | Node::Exit | Node::ContinueLoop { .. } | Node::LoopExit { .. } | Node::GotoNode { .. }
                )
            })
            .collect();
        self.unreduced.insert(key, set.clone());
        self.members.insert(key, set);
        self.tail.entry(key).or_default();
    }

    fn is_member(&self, scope: ScopeKey, node: NodeIndex) -> bool {
        self.members.get(&scope).is_some_and(|s| s.contains(&node))
    }

    fn consume(&mut self, scope: ScopeKey, node: NodeIndex) {
        if let Some(s) = self.unreduced.get_mut(&scope) {
            s.remove(&node);
        }
        if let Some(s) = self.tail.get_mut(&scope) {
            s.remove(&node);
        }
    }

    fn add_tail(&mut self, scope: ScopeKey, node: NodeIndex) {
        self.tail.entry(scope).or_default().insert(node);
    }

    fn pop_tail(&mut self, scope: ScopeKey) -> Option<NodeIndex> {
        let node = self.tail.get(&scope).and_then(|s| s.iter().next().copied())?;
        self.tail.get_mut(&scope).unwrap().remove(&node);
        Some(node)
    }

    fn is_reduced_join(&self, node: NodeIndex) -> bool {
        let credited = self.reduced_in_edges.get(&node).copied().unwrap_or(0);
        self.flow.in_degree(node).saturating_sub(credited) <= 1
    }

    fn mark_join_reduced(&mut self, node: NodeIndex) {
        *self.reduced_in_edges.entry(node).or_insert(0) += 1;
    }

    /// Get-or-create the label a `Goto`/`GotoLabel` pair uses for `node`:
    /// the paragraph name when `node` is that paragraph's first statement
    /// and the paragraph is named, else a synthesised `__line<N>`.
    fn label_for(&mut self, node: NodeIndex) -> Label {
        if let Some(label) = self.labels.get(&node) {
            return label.clone();
        }
        let stmt_id = self
            .flow
            .node(node)
            .stmt()
            .expect("a label is only ever requested for a statement-bearing node");
        let stmt = self.tree.statement(stmt_id);
        let para_id = self.tree.sentence(stmt.sentence).para;
        let is_para_head = self.tree.first_stmt_of_para(para_id) == Some(stmt_id);
        let para_name = self.tree.paragraph(para_id).name.clone();

        let label = match (is_para_head, para_name) {
            (true, Some(name)) => Label { name, paragraph: Some(para_id) },
            _ => Label {
                name: format!("__line{}", stmt.source.from_line),
                paragraph: None,
            },
        };
        self.labels.insert(node, label.clone());
        label
    }
}

/// Statements dropped unless `keep_raw` is set: their control-flow meaning
/// has already been folded into the structured tree's shape itself.
fn add_statements(r: &Reducer, block: &mut Block, stmts: &[StmtId]) {
    for &id in stmts {
        let kind = &r.tree.statement(id).kind;
        let suppressed = kind.is_goto() || kind.is_next_sentence() || kind.is_terminating();
        if suppressed && !r.keep_raw {
            continue;
        }
        block.push(Stmt::Cobol { stmt: id });
    }
}

/// Structure a whole section's `FlowGraph` into its `Block`.
pub fn structure(flow: &FlowGraph, tree: &SyntaxTree, keep_raw: bool) -> Result<Block> {
    structure_with_budget(flow, tree, keep_raw, DEFAULT_REDUCTION_BUDGET)
}

pub fn structure_with_budget(flow: &FlowGraph, tree: &SyntaxTree, keep_raw: bool, budget: usize) -> Result<Block> {
    let mut r = Reducer::new(flow, tree, keep_raw, budget);
    r.ensure_scope(ScopeKey::Root);

    let mut root = reduce_block(&mut r, ScopeKey::Root, Start::Node(flow.entry))?;
    finish_scope(&mut r, ScopeKey::Root, &mut root, None)?;

    if let Some(&leftover) = r.unreduced.get(&ScopeKey::Root).and_then(|s| s.iter().next()) {
        let stmt_id = r
            .flow
            .node(leftover)
            .stmt()
            .expect("unreduced node must wrap a statement");
        return Err(CoreError::UnresolvedTailNode(stmt_id));
    }

    Ok(root.block)
}

/// Trace straight-line control flow from `start`, dispatching `Branch`/
/// `Loop` nodes as it meets them, until it falls off the scope (leaves via
/// `Exit`/`ContinueLoop`, crosses into another scope, or meets a node that
/// isn't fully joined yet).
fn reduce_block(r: &mut Reducer, scope: ScopeKey, start: Start) -> Result<Reduction> {
    let mut block = Block::new();
    let (mut cur, mut skip_check) = match start {
        Start::Edge { stmts, node } => {
            add_statements(r, &mut block, &stmts);
            (Some(node), false)
        }
        Start::Node(n) => (Some(n), true),
    };

    loop {
        r.step()?;
        let node = match cur {
            Some(n) => n,
            None => break,
        };

        if node == r.flow.exit || matches!(r.flow.node(node), Node::ContinueLoop { .. }) {
            break;
        }
        if !skip_check {
            if !r.is_member(scope, node) || !r.is_reduced_join(node) {
                break;
            }
        }
        skip_check = false;

        r.consume(scope, node);
        if let Some(label) = r.labels.get(&node).cloned() {
            block.push(Stmt::GotoLabel { label });
        }

        cur = match r.flow.node(node).clone() {
            Node::Branch { .. } => {
                let (stmts, dest) = reduce_if(r, scope, node)?;
                block.stmts.extend(stmts);
                dest
            }
            Node::Loop { .. } => {
                let (stmt, dest) = reduce_loop(r, scope, node)?;
                block.push(stmt);
                dest
            }
            Node::Entry | Node::Join { .. } => {
                let (target, edge_id) = r.flow.out_edges(node)[0];
                let stmts = r.flow.graph[edge_id].stmts.clone();
                add_statements(r, &mut block, &stmts);
                Some(target)
            }
            Node::Exit | Node::ContinueLoop { .. } | Node::LoopExit { .. } | Node::GotoNode { .. } => {
                unreachable!("handled as a stop condition or excluded from every scope's membership")
            }
        };
    }

    Ok(Reduction { block, dest: cur })
}

/// Turn a still-pending destination into the matching jump statement and
/// clear it. A no-op if `res.dest` is already `None`.
fn resolve_dest_node(r: &mut Reducer, scope: ScopeKey, res: &mut Reduction) -> Result<()> {
    let Some(dest) = res.dest else { return Ok(()) };
    r.step()?;

    match r.flow.node(dest).clone() {
        Node::Exit => res.block.push(Stmt::Return),
        Node::ContinueLoop { .. } => res.block.push(Stmt::Continue),
        Node::LoopExit { .. } => res.block.push(Stmt::Break),
        Node::GotoNode { target } => {
            let label = r.label_for(target);
            if r.is_member(scope, target) {
                r.add_tail(scope, target);
            }
            res.block.push(Stmt::Goto { label });
        }
        _ => {
            let label = r.label_for(dest);
            if r.is_member(scope, dest) {
                r.add_tail(scope, dest);
            }
            res.block.push(Stmt::Goto { label });
        }
    }
    res.dest = None;
    Ok(())
}

/// Priority order used to pick which of two genuinely diverging
/// destinations stays pending (propagated to the caller, deferring its
/// resolution) versus which gets jumped to immediately: a real node that
/// some enclosing reduction may still merge with is worth deferring over a
/// sentinel, and among sentinels the more expensive jump is worth
/// deferring over the cheaper one.
fn target_rank(flow: &FlowGraph, dest: NodeIndex) -> u8 {
    match flow.node(dest) {
        Node::ContinueLoop { .. } => 1,
        Node::GotoNode { .. } => 2,
        Node::LoopExit { .. } => 3,
        Node::Exit | Node::Entry => 4,
        Node::Branch { .. } | Node::Join { .. } | Node::Loop { .. } => 0,
    }
}

fn jump_cost(flow: &FlowGraph, dest: NodeIndex) -> usize {
    match flow.node(dest) {
        Node::Exit => 10,
        Node::LoopExit { .. } => 10,
        Node::ContinueLoop { .. } => 20,
        _ => 50,
    }
}

fn block_size(b: &Block) -> usize {
    b.stmts.iter().map(stmt_size).sum()
}

fn stmt_size(s: &Stmt) -> usize {
    1 + match s {
        Stmt::If { then, els, .. } => block_size(then) + block_size(els),
        Stmt::While { body, .. } | Stmt::Forever { body } => block_size(body),
        _ => 0,
    }
}

#[derive(Clone, Copy)]
enum StrategyKind {
    Null,
    RemoveElse,
    FlipToRemoveElse,
    JumpFromThen,
    JumpFromFlippedElse,
}

struct Candidate {
    kind: StrategyKind,
    cost: usize,
}

/// The five branch-shaping strategies, with the cost of each that's
/// currently possible. `then_res`/`else_res` are expected to already be in
/// the "at most one pending" state (see `reduce_if`).
fn candidate_strategies(flow: &FlowGraph, then_res: &Reduction, else_res: &Reduction) -> Vec<Candidate> {
    let then = &then_res.block;
    let els = &else_res.block;
    let mut out = Vec::new();

    if !then.is_empty() {
        let extra = if els.is_single_nested_if() { 0 } else { block_size(els) };
        let jump_penalty = if then.ends_in_jump() { 5 } else { 0 };
        out.push(Candidate {
            kind: StrategyKind::Null,
            cost: block_size(then) + extra + jump_penalty,
        });
    }

    if then_res.dest.is_none() {
        let chain_loss = if els.is_single_nested_if() { 20 } else { 0 };
        out.push(Candidate {
            kind: StrategyKind::RemoveElse,
            cost: block_size(then) + chain_loss,
        });
    }

    if else_res.dest.is_none() || then.is_empty() {
        let chain_loss = if then.is_single_nested_if() { 20 } else { 0 };
        out.push(Candidate {
            kind: StrategyKind::FlipToRemoveElse,
            cost: block_size(els) + 5 + chain_loss,
        });
    }

    if let Some(dest) = then_res.dest {
        let chain_loss = if els.is_single_nested_if() { 20 } else { 0 };
        out.push(Candidate {
            kind: StrategyKind::JumpFromThen,
            cost: block_size(then) + jump_cost(flow, dest) + chain_loss,
        });
    }

    if let Some(dest) = else_res.dest {
        let chain_loss = if then.is_single_nested_if() { 20 } else { 0 };
        out.push(Candidate {
            kind: StrategyKind::JumpFromFlippedElse,
            cost: block_size(els) + 5 + jump_cost(flow, dest) + chain_loss,
        });
    }

    out
}

#[allow(clippy::type_complexity)]
fn apply_strategy(
    r: &mut Reducer,
    scope: ScopeKey,
    kind: StrategyKind,
    mut then_res: Reduction,
    mut else_res: Reduction,
) -> Result<(Block, Block, bool, Vec<Stmt>, Option<NodeIndex>)> {
    match kind {
        StrategyKind::Null => {
            let dest = then_res.dest.or(else_res.dest);
            Ok((then_res.block, else_res.block, false, Vec::new(), dest))
        }
        StrategyKind::RemoveElse => {
            let dest = else_res.dest;
            Ok((then_res.block, Block::new(), false, else_res.block.stmts, dest))
        }
        StrategyKind::FlipToRemoveElse => {
            let dest = then_res.dest;
            Ok((else_res.block, Block::new(), true, then_res.block.stmts, dest))
        }
        StrategyKind::JumpFromThen => {
            resolve_dest_node(r, scope, &mut then_res)?;
            Ok((then_res.block, else_res.block, false, Vec::new(), None))
        }
        StrategyKind::JumpFromFlippedElse => {
            resolve_dest_node(r, scope, &mut else_res)?;
            Ok((else_res.block, then_res.block, true, Vec::new(), None))
        }
    }
}

/// Reduce a `Branch` node: its two arms, then pick a shape for the `If`.
fn reduce_if(r: &mut Reducer, scope: ScopeKey, branch: NodeIndex) -> Result<(Vec<Stmt>, Option<NodeIndex>)> {
    r.step()?;
    let condition = match r.flow.node(branch) {
        Node::Branch { condition, .. } => *condition,
        _ => unreachable!("reduce_if is only called on a Branch"),
    };

    let mut then_edge = None;
    let mut else_edge = None;
    for (dest, edge_id) in r.flow.out_edges(branch) {
        match r.flow.graph[edge_id].condition {
            Some(true) => then_edge = Some((dest, r.flow.graph[edge_id].stmts.clone())),
            Some(false) => else_edge = Some((dest, r.flow.graph[edge_id].stmts.clone())),
            None => {}
        }
    }
    let (then_target, then_stmts) = then_edge.expect("a Branch always has a true edge");
    let (else_target, else_stmts) = else_edge.expect("a Branch always has a false edge");

    let then_res = reduce_block(r, scope, Start::Edge { stmts: then_stmts, node: then_target })?;
    let else_res = reduce_block(r, scope, Start::Edge { stmts: else_stmts, node: else_target })?;

    if then_res.dest == else_res.dest {
        return reduce_merged_if(r, condition, then_res, else_res);
    }

    let (mut then_res, mut else_res) = (then_res, else_res);
    if let (Some(a), Some(b)) = (then_res.dest, else_res.dest) {
        let ra = target_rank(r.flow, a);
        let rb = target_rank(r.flow, b);
        let then_keeps_pending =
            ra < rb || (ra == rb && r.flow.node_source_key(a, r.tree) <= r.flow.node_source_key(b, r.tree));
        if then_keeps_pending {
            resolve_dest_node(r, scope, &mut else_res)?;
        } else {
            resolve_dest_node(r, scope, &mut then_res)?;
        }
    }

    // Exactly one of then_res.dest / else_res.dest remains Some here.
    let candidates = candidate_strategies(r.flow, &then_res, &else_res);
    let chosen = candidates
        .into_iter()
        .min_by_key(|c| c.cost)
        .expect("Null is possible whenever the then-branch is non-empty, and at least one side always is");

    let (then_block, else_block, invert, tail, dest) = apply_strategy(r, scope, chosen.kind, then_res, else_res)?;
    let cond = if invert { condition.invert() } else { condition };

    let mut stmts = vec![Stmt::If { cond, then: then_block, els: else_block }];
    stmts.extend(tail);
    Ok((stmts, dest))
}

fn reduce_merged_if(
    r: &mut Reducer,
    condition: Condition,
    then_res: Reduction,
    else_res: Reduction,
) -> Result<(Vec<Stmt>, Option<NodeIndex>)> {
    let dest = then_res.dest;
    if let Some(node) = dest {
        // Both arms converge on the same node: collectively they account
        // for one of its in-edges, not two.
        r.mark_join_reduced(node);
    }

    let (mut then_block, mut else_block) = (then_res.block, else_res.block);
    let mut invert = false;
    if then_block.is_empty() && !else_block.is_empty() {
        std::mem::swap(&mut then_block, &mut else_block);
        invert = true;
    }

    let cond = if invert { condition.invert() } else { condition };
    Ok((vec![Stmt::If { cond, then: then_block, els: else_block }], dest))
}

/// Reduce a `Loop` node: structure its body in a fresh scope, then resolve
/// what follows the loop as a whole.
fn reduce_loop(r: &mut Reducer, scope: ScopeKey, loop_node: NodeIndex) -> Result<(Stmt, Option<NodeIndex>)> {
    r.step()?;
    let _ = scope; // the loop's own scope membership was already consumed by its caller

    let new_scope = ScopeKey::Loop(loop_node);
    r.ensure_scope(new_scope);

    let continue_node = r
        .flow
        .graph
        .node_indices()
        .find(|&n| matches!(r.flow.node(n), Node::ContinueLoop { loop_node: l } if *l == loop_node));

    let (target, edge_id) = r.flow.out_edges(loop_node)[0];
    let stmts = r.flow.graph[edge_id].stmts.clone();
    let mut body = reduce_block(r, new_scope, Start::Edge { stmts, node: target })?;

    finish_scope(r, new_scope, &mut body, continue_node)?;

    let condition = match r.flow.node(loop_node) {
        Node::Loop { condition, .. } => *condition,
        _ => unreachable!("reduce_loop is only called on a Loop"),
    };
    let stmt = match condition {
        Some(cond) => Stmt::While { cond, body: body.block },
        None => Stmt::Forever { body: body.block },
    };

    Ok((stmt, loop_exit_successor(r.flow, loop_node)))
}

fn loop_exit_successor(flow: &FlowGraph, loop_node: NodeIndex) -> Option<NodeIndex> {
    flow.graph
        .node_indices()
        .find(|&n| matches!(flow.node(n), Node::LoopExit { loop_node: l } if *l == loop_node))
        .map(|exit| flow.out_edges(exit)[0].0)
}

/// Close out a scope: resolve its own pending destination (unless it's
/// exactly `implicit_target`, meaning falling off the end already means
/// the right thing - the loop's own header, for a loop body), then sweep
/// any still-unreduced member into the tail queue and drain it, appending
/// each tail node's own reduction - sorted by source position, so output
/// order doesn't depend on traversal order.
fn finish_scope(r: &mut Reducer, scope: ScopeKey, res: &mut Reduction, implicit_target: Option<NodeIndex>) -> Result<()> {
    if res.dest.is_some() && res.dest != implicit_target {
        resolve_dest_node(r, scope, res)?;
    } else {
        res.dest = None;
    }

    let remaining: Vec<NodeIndex> = r.unreduced.get(&scope).cloned().unwrap_or_default().into_iter().collect();
    for node in remaining {
        r.add_tail(scope, node);
    }

    let mut done: HashSet<NodeIndex> = HashSet::new();
    let mut tail_stmts: Vec<(usize, Vec<Stmt>)> = Vec::new();

    while let Some(node) = r.pop_tail(scope) {
        if !done.insert(node) {
            continue;
        }
        let mut redux = reduce_block(r, scope, Start::Node(node))?;
        resolve_dest_node(r, scope, &mut redux)?;
        r.label_for(node);
        tail_stmts.push((r.flow.node_source_key(node, r.tree), redux.block.stmts));
    }

    tail_stmts.sort_by_key(|(key, _)| *key);
    for (_, stmts) in tail_stmts {
        res.block.stmts.extend(stmts);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::branch_join;
    use crate::cfg::loops::break_loops;
    use crate::cfg::scope::structure_scopes;
    use crate::cfg::stmt_graph::StmtGraph;
    use crate::syntax::*;
    use pretty_assertions::assert_eq;

    fn src(c: usize, l: usize) -> Source {
        Source::new(c, c, l, l)
    }

    fn one_para(tree: &mut SyntaxTree, stmts: Vec<StmtId>, sent: SentId, para: ParaId) {
        tree.sentences.push(Sentence {
            source: src(0, 1),
            stmts,
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
    }

    fn structured_for(tree: &SyntaxTree) -> Block {
        let mut reporter = crate::error::CollectingReporter::default();
        let sg = StmtGraph::build(tree, SectionId(0), &mut reporter).unwrap();
        let mut flow = branch_join::build(&sg, tree);
        break_loops(&mut flow, tree);
        structure_scopes(&mut flow);
        structure(&flow, tree, false).unwrap()
    }

    #[test]
    fn empty_section_structures_to_return() {
        let mut tree = SyntaxTree::default();
        tree.sections.push(Section {
            name: "EMPTY".into(),
            source: src(0, 1),
            first_para: None,
            paras: vec![],
            used_sections: vec![],
        });

        let block = structured_for(&tree);
        assert_eq!(block.stmts, vec![Stmt::Return]);
    }

    /// `perform a. exit.`
    #[test]
    fn sequential_statement_then_terminator() {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let para = ParaId(0);
        let s0 = StmtId(0);
        let s1 = StmtId(1);

        tree.statements.push(Statement { source: src(0, 1), sentence: sent, kind: StatementKind::Unparsed });
        tree.statements.push(Statement { source: src(1, 2), sentence: sent, kind: StatementKind::ExitSection });
        one_para(&mut tree, vec![s0, s1], sent, para);

        let block = structured_for(&tree);
        assert_eq!(block.stmts, vec![Stmt::Cobol { stmt: s0 }, Stmt::Return]);
    }

    /// `if a>0 perform t else perform f. exit.`
    #[test]
    fn if_else_merging_on_exit_keeps_both_branches() {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let para = ParaId(0);
        let s_if = StmtId(0);
        let s_then = StmtId(1);
        let s_else = StmtId(2);
        let s_exit = StmtId(3);

        tree.statements.push(Statement {
            source: src(0, 1),
            sentence: sent,
            kind: StatementKind::Branch { true_stmt: s_then, false_stmt: s_else },
        });
        tree.statements.push(Statement { source: src(1, 2), sentence: sent, kind: StatementKind::Unparsed });
        tree.statements.push(Statement { source: src(2, 3), sentence: sent, kind: StatementKind::Unparsed });
        tree.statements.push(Statement { source: src(3, 4), sentence: sent, kind: StatementKind::ExitSection });
        one_para(&mut tree, vec![s_if, s_then, s_else, s_exit], sent, para);

        let block = structured_for(&tree);
        match block.stmts.as_slice() {
            [Stmt::If { cond, then, els }, Stmt::Return] => {
                assert!(!cond.inverted);
                assert_eq!(then.stmts, vec![Stmt::Cobol { stmt: s_then }]);
                assert_eq!(els.stmts, vec![Stmt::Cobol { stmt: s_else }]);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    /// `if a>0 next sentence else perform f. exit.` - empty `then` flips.
    #[test]
    fn empty_then_branch_flips_and_inverts() {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let para = ParaId(0);
        let s_if = StmtId(0);
        let s_next = StmtId(1);
        let s_else = StmtId(2);
        let s_exit = StmtId(3);

        tree.statements.push(Statement {
            source: src(0, 1),
            sentence: sent,
            kind: StatementKind::Branch { true_stmt: s_next, false_stmt: s_else },
        });
        tree.statements.push(Statement { source: src(1, 2), sentence: sent, kind: StatementKind::NextSentence });
        tree.statements.push(Statement { source: src(2, 3), sentence: sent, kind: StatementKind::Unparsed });
        tree.statements.push(Statement { source: src(3, 4), sentence: sent, kind: StatementKind::ExitSection });
        one_para(&mut tree, vec![s_if, s_next, s_else, s_exit], sent, para);

        let block = structured_for(&tree);
        match block.stmts.as_slice() {
            [Stmt::If { cond, then, els }, Stmt::Return] => {
                assert!(cond.inverted);
                assert_eq!(then.stmts, vec![Stmt::Cobol { stmt: s_else }]);
                assert!(els.is_empty());
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    /// `loop. if x>y go to done. perform b. go to loop. done. perform c. exit.`
    /// structures to a `while` loop with an empty body-exit (no explicit
    /// break - the loop's own condition already covers it).
    #[test]
    fn goto_break_pattern_structures_to_while() {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let sent_done = SentId(1);
        let para = ParaId(0);
        let para_done = ParaId(1);

        let s_if = StmtId(0);
        let s_b = StmtId(1);
        let s_goto = StmtId(2);
        let s_c = StmtId(3);
        let s_exit = StmtId(4);

        tree.statements.push(Statement {
            source: src(0, 1),
            sentence: sent,
            kind: StatementKind::Branch { true_stmt: s_c, false_stmt: s_b },
        });
        tree.statements.push(Statement { source: src(1, 2), sentence: sent, kind: StatementKind::Unparsed });
        tree.statements.push(Statement {
            source: src(2, 3),
            sentence: sent,
            kind: StatementKind::GoTo { paragraph_name: "LOOP".into(), resolved_target: Some(s_if) },
        });
        tree.statements.push(Statement { source: src(3, 4), sentence: sent_done, kind: StatementKind::Unparsed });
        tree.statements.push(Statement { source: src(4, 5), sentence: sent_done, kind: StatementKind::ExitSection });

        tree.sentences.push(Sentence {
            source: src(0, 1),
            stmts: vec![s_if, s_b, s_goto],
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

        let block = structured_for(&tree);
        match block.stmts.as_slice() {
            [Stmt::While { body, .. }, Stmt::Cobol { stmt }, Stmt::Return] => {
                assert_eq!(body.stmts, vec![Stmt::Cobol { stmt: s_b }]);
                assert_eq!(*stmt, s_c);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    /// `loop. perform a. if x>y if x>z go to loop. perform b. go to loop.`
    /// The inner `go to loop` diverges from the join at `perform b`, so it
    /// resolves to an explicit `Continue` rather than falling off the end.
    #[test]
    fn nested_if_continue_stays_explicit() {
        let mut tree = SyntaxTree::default();
        let sent = SentId(0);
        let para = ParaId(0);

        let s_a = StmtId(0);
        let s_outer_if = StmtId(1);
        let s_inner_if = StmtId(2);
        let s_goto_inner = StmtId(3);
        let s_b = StmtId(4);
        let s_goto_outer = StmtId(5);

        tree.statements.push(Statement { source: src(0, 1), sentence: sent, kind: StatementKind::Unparsed });
        tree.statements.push(Statement {
            source: src(1, 2),
            sentence: sent,
            kind: StatementKind::Branch { true_stmt: s_inner_if, false_stmt: s_b },
        });
        tree.statements.push(Statement {
            source: src(2, 3),
            sentence: sent,
            kind: StatementKind::Branch { true_stmt: s_goto_inner, false_stmt: s_b },
        });
        tree.statements.push(Statement {
            source: src(3, 4),
            sentence: sent,
            kind: StatementKind::GoTo { paragraph_name: "LOOP".into(), resolved_target: Some(s_a) },
        });
        tree.statements.push(Statement { source: src(4, 5), sentence: sent, kind: StatementKind::Unparsed });
        tree.statements.push(Statement {
            source: src(5, 6),
            sentence: sent,
            kind: StatementKind::GoTo { paragraph_name: "LOOP".into(), resolved_target: Some(s_a) },
        });

        one_para(&mut tree, vec![s_a, s_outer_if, s_inner_if, s_goto_inner, s_b, s_goto_outer], sent, para);

        let block = structured_for(&tree);
        match block.stmts.as_slice() {
            [Stmt::Forever { body }] => match body.stmts.as_slice() {
                [Stmt::Cobol { stmt }, Stmt::If { then: outer_then, els: outer_els, .. }, Stmt::Cobol { stmt: b }] => {
                    assert_eq!(*stmt, s_a);
                    assert_eq!(*b, s_b);
                    assert!(outer_els.is_empty());
                    match outer_then.stmts.as_slice() {
                        [Stmt::If { then: inner_then, els: inner_els, .. }] => {
                            assert_eq!(inner_then.stmts, vec![Stmt::Continue]);
                            assert!(inner_els.is_empty());
                        }
                        other => panic!("unexpected outer-then shape: {other:?}"),
                    }
                }
                other => panic!("unexpected body shape: {other:?}"),
            },
            other => panic!("unexpected top shape: {other:?}"),
        }
    }
}
