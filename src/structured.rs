//! The output of S6: a tree of structured statements.
//!
//! A closed set of statement shapes (`If`, `While`, `Forever`, `Break`,
//! `Goto`, ...) with no open extension point, so a single tagged enum fits
//! better than a class hierarchy would.

use serde::{Deserialize, Serialize};

use crate::cfg::node::Condition;
use crate::syntax::{ParaId, StmtId};

/// A label a `Goto`/`GotoLabel` pair refers to. Prefers the COBOL paragraph
/// name when the jump target is that paragraph's first statement; otherwise
/// a synthesised `__line<N>` name (see `Labels::for_target` in `reduce.rs`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub paragraph: Option<ParaId>,
}

/// One statement of the structured tree. `Goto`/`GotoLabel` may appear
/// anywhere a statement may; every other variant keeps the tree strictly
/// nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    If {
        cond: Condition,
        then: Block,
        els: Block,
    },
    While {
        cond: Condition,
        body: Block,
    },
    Forever {
        body: Block,
    },
    Goto {
        label: Label,
    },
    GotoLabel {
        label: Label,
    },
    Break,
    Continue,
    Return,
    /// Pass-through for a COBOL statement with no control-flow meaning of
    /// its own (`MOVE`, `PERFORM <section>`, unparsed verbs, ...).
    Cobol {
        stmt: StmtId,
    },
}

/// An ordered sequence of statements; the only aggregate in the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new() -> Self {
        Block::default()
    }

    pub fn push(&mut self, stmt: Stmt) {
        self.stmts.push(stmt);
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    /// True when this block is exactly one nested `If` - the shape that lets
    /// a `RemoveElse`'d if-chain read as `else if` at print time.
    pub fn is_single_nested_if(&self) -> bool {
        matches!(self.stmts.as_slice(), [Stmt::If { .. }])
    }

    pub fn ends_in_jump(&self) -> bool {
        matches!(
            self.stmts.last(),
            Some(Stmt::Goto { .. } | Stmt::Break | Stmt::Continue | Stmt::Return)
        )
    }
}
