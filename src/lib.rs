//! cobol-structurer: turns an arbitrary COBOL section's control flow
//! (unrestricted `GOTO` / fall-through / nested `PERFORM` / conditional
//! paragraphs) into a nested tree of structured statements - `if`/`else`,
//! `while`, infinite loop with `break`/`continue`, and labelled `goto` only
//! where truly unavoidable.
//!
//! The pipeline is six pure stages, each a function of the previous
//! stage's output plus read-only references into the syntax tree:
//!
//! 1. [`cfg::stmt_graph`] - one CFG node per COBOL statement.
//! 2. [`cfg::reachability`] - drop statements `Entry` can't reach.
//! 3. [`cfg::branch_join`] - collapse straight-line runs onto edges.
//! 4. [`cfg::loops`] - break cycles into `Loop`/`ContinueLoop` and scope tags.
//! 5. [`cfg::scope`] - classify loops, rewrite cross-scope edges.
//! 6. [`cfg::reduce`] - fold the scoped graph into a [`structured::Block`].
//!
//! [`driver::structure_section`] and [`driver::structure_program`] run the
//! whole pipeline; callers who want to inspect or restart from an
//! intermediate stage can call the `cfg` submodules directly.
//!
//! Out of scope, by design: the COBOL lexer/parser that produces a
//! [`syntax::SyntaxTree`] in the first place, and any rendering of the
//! structured tree back into source text.

pub mod cfg;
pub mod driver;
pub mod error;
pub mod structured;
pub mod syntax;

pub use driver::{structure_program, structure_program_strict, structure_section, SectionResult};
pub use error::{CoreError, Reporter, Result, TracingReporter, Warning};
pub use structured::{Block, Label, Stmt};
pub use syntax::SyntaxTree;
