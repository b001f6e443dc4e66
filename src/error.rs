//! Error and warning types for the structuring pipeline.
//!
//! Stages S1-S5 fail fast per-section on the first error (see `CoreError`);
//! S6 is total over well-formed S5 output and never returns one. Non-fatal
//! conditions are reported through the `Reporter` trait instead, so that a
//! driver processing many sections can keep going after one section's
//! warnings.

use std::fmt;

use thiserror::Error;

use crate::syntax::StmtId;

/// Fatal errors surfaced to the caller while structuring a single section.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A `GO TO` names a paragraph that isn't defined in the section.
    #[error("GO TO references undefined paragraph '{paragraph_name}' at line {source_line}")]
    UndefinedGotoTarget {
        paragraph_name: String,
        source_line: usize,
    },

    /// A section or paragraph name collides with one already seen. The
    /// driver may choose to mangle and continue instead of propagating this.
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: DuplicateNameKind, name: String },

    /// S6 left a node in a scope's unreduced set without ever allocating it
    /// a goto label. This is always a structurer bug, never a malformed
    /// input, so it deliberately does not try to recover.
    #[error("internal error: node at statement {0:?} was never reduced and has no goto label")]
    UnresolvedTailNode(StmtId),

    /// Defensive counter-protection against pathological inputs; see
    /// `ReductionBudget`.
    #[error("reduction budget of {limit} steps exceeded while structuring this section")]
    ReductionBudgetExceeded { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateNameKind {
    Section,
    Paragraph,
}

impl fmt::Display for DuplicateNameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateNameKind::Section => write!(f, "section"),
            DuplicateNameKind::Paragraph => write!(f, "paragraph"),
        }
    }
}

/// Non-fatal conditions. These never block reduction; a driver collects them
/// through a `Reporter` and surfaces them however it likes (logs, lint
/// output, etc).
#[derive(Debug, Clone, Error)]
pub enum Warning {
    #[error("EXIT statement at line {source_line} is not in terminal position")]
    NonTerminalExit { source_line: usize },

    #[error("duplicate {kind} name '{original}' auto-mangled to '{mangled}'")]
    DuplicateNameMangled {
        kind: DuplicateNameKind,
        original: String,
        mangled: String,
    },

    #[error("paragraph '{name}' is never reached")]
    UnusedParagraph { name: String },

    #[error("unparsed verb treated as opaque sequential statement at line {source_line}")]
    UnparsedVerb { source_line: usize },

    #[error("NEXT SENTENCE in final sentence of section falls through to Exit (line {source_line})")]
    NextSentenceFallsThroughToExit { source_line: usize },
}

/// Collects warnings emitted while structuring a section.
///
/// A `Reporter` is intentionally dumb: it doesn't decide policy, it just
/// accumulates. Callers that want filtering or deduplication wrap this.
pub trait Reporter {
    fn warn(&mut self, warning: Warning);
}

/// The reporter used when the caller doesn't care to supply their own: logs
/// each warning at `tracing::warn!` and keeps nothing in memory.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn warn(&mut self, warning: Warning) {
        tracing::warn!(%warning, "cobol-structurer warning");
    }
}

/// A reporter that just accumulates warnings in order, for tests and for
/// callers that want to inspect them after the fact.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub warnings: Vec<Warning>,
}

impl Reporter for CollectingReporter {
    fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
