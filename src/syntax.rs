//! The immutable syntax tree consumed by the structuring pipeline (S1).
//!
//! This is deliberately a thin, arena-indexed model: the lexer/parser that
//! produces it is out of scope here (see the crate-level docs). Everything
//! downstream only ever reads from a `SyntaxTree` by id, never by reference,
//! which sidesteps the cyclic-links-between-paragraphs problem (`next_para`,
//! `next_sentence`, resolved goto/perform targets) that a reference-based
//! tree would otherwise need `Rc`/`RefCell` for.

use serde::{Deserialize, Serialize};

/// A source span, carried by every tree node for deterministic ordering and
/// diagnostics. `from_char`/`to_char` are the authoritative ordering key used
/// throughout the pipeline; line/column are for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Source {
    pub from_char: usize,
    pub to_char: usize,
    pub from_line: usize,
    pub to_line: usize,
}

impl Source {
    pub const fn new(from_char: usize, to_char: usize, from_line: usize, to_line: usize) -> Self {
        Self {
            from_char,
            to_char,
            from_line,
            to_line,
        }
    }

    /// Source used for the synthetic `Entry` node: sorts before everything.
    pub const NEG_INFINITY: Source = Source::new(0, 0, 0, 0);

    /// Source used for the synthetic `Exit` node: sorts after everything.
    pub const POS_INFINITY: Source = Source::new(usize::MAX, usize::MAX, usize::MAX, usize::MAX);
}

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(SectionId);
arena_id!(ParaId);
arena_id!(SentId);
arena_id!(StmtId);

/// A parsed COBOL program: one procedure division made of sections in
/// source order. All cross-references (next paragraph, next sentence,
/// resolved goto/perform targets) are ids into the arenas below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyntaxTree {
    pub sections: Vec<Section>,
    pub paragraphs: Vec<Paragraph>,
    pub sentences: Vec<Sentence>,
    pub statements: Vec<Statement>,
}

impl SyntaxTree {
    pub fn section(&self, id: SectionId) -> &Section {
        &self.sections[id.index()]
    }

    pub fn paragraph(&self, id: ParaId) -> &Paragraph {
        &self.paragraphs[id.index()]
    }

    pub fn sentence(&self, id: SentId) -> &Sentence {
        &self.sentences[id.index()]
    }

    pub fn statement(&self, id: StmtId) -> &Statement {
        &self.statements[id.index()]
    }

    /// Sections in source order, as required by every stage that needs a
    /// deterministic processing order.
    pub fn sections_in_order(&self) -> Vec<SectionId> {
        let mut ids: Vec<SectionId> = (0..self.sections.len() as u32).map(SectionId).collect();
        ids.sort_by_key(|id| self.section(*id).source.from_char);
        ids
    }

    /// First statement of a paragraph, recursing into the next paragraph if
    /// this one is empty (mirrors a COBOL paragraph falling straight
    /// through into the next with no statements of its own).
    pub fn first_stmt_of_para(&self, id: ParaId) -> Option<StmtId> {
        let para = self.paragraph(id);
        if let Some(&sent) = para.sentences.first() {
            return self.sentence(sent).stmts.first().copied();
        }
        para.next_para.and_then(|next| self.first_stmt_of_para(next))
    }

    pub fn first_stmt_of_section(&self, id: SectionId) -> Option<StmtId> {
        let section = self.section(id);
        section
            .first_para
            .and_then(|p| self.first_stmt_of_para(p))
    }

    /// The lexical successor of a plain sequential statement: the next
    /// statement in its sentence, or the first statement of the next
    /// sentence/paragraph, or `None` (meaning `Exit`) if there is none.
    pub fn lexical_successor(&self, id: StmtId) -> Option<StmtId> {
        let stmt = self.statement(id);
        let sentence = self.sentence(stmt.sentence);
        let pos = sentence
            .stmts
            .iter()
            .position(|&s| s == id)
            .expect("statement missing from its own sentence");

        if let Some(&next) = sentence.stmts.get(pos + 1) {
            return Some(next);
        }

        self.first_stmt_after_sentence(sentence.next_sentence, sentence.para)
    }

    /// Where `NEXT SENTENCE` goes: straight to the next sentence, skipping
    /// any remaining statements of the current one (there shouldn't be
    /// any, since `NEXT SENTENCE` ends a sentence, but we don't rely on
    /// that). Falls through to `Exit` when this is the last sentence in
    /// the section - see the `NextSentenceFallsThroughToExit` warning.
    pub fn next_sentence_successor(&self, id: StmtId) -> Option<StmtId> {
        let stmt = self.statement(id);
        let sentence = self.sentence(stmt.sentence);
        self.first_stmt_after_sentence(sentence.next_sentence, sentence.para)
    }

    fn first_stmt_after_sentence(&self, next_sentence: Option<SentId>, para: ParaId) -> Option<StmtId> {
        if let Some(sent_id) = next_sentence {
            let sentence = self.sentence(sent_id);
            if let Some(&first) = sentence.stmts.first() {
                return Some(first);
            }
            return self.first_stmt_after_sentence(sentence.next_sentence, sentence.para);
        }

        let para = self.paragraph(para);
        para.next_para.and_then(|next| self.first_stmt_of_para(next))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub source: Source,
    pub first_para: Option<ParaId>,
    pub paras: Vec<ParaId>,
    /// Sections reachable through a resolved `PerformSectionStatement`
    /// inside this one; populated by the out-of-scope cross-reference
    /// bookkeeping, consumed read-only here.
    pub used_sections: Vec<SectionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub name: Option<String>,
    pub source: Source,
    pub sentences: Vec<SentId>,
    pub next_para: Option<ParaId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub source: Source,
    pub stmts: Vec<StmtId>,
    pub next_sentence: Option<SentId>,
    pub para: ParaId,
}

/// A single COBOL statement. Only the flow-affecting verbs listed in the
/// crate docs get their own `StatementKind` variant; everything else is
/// `Unparsed` and behaves as a plain sequential statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub source: Source,
    pub sentence: SentId,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatementKind {
    /// `IF` - branches to one of two statements depending on `condition`.
    Branch {
        true_stmt: StmtId,
        false_stmt: StmtId,
    },
    /// `GO TO <paragraph>`, resolved against the section's paragraph table.
    /// `resolved_target` is `None` only transiently while the external
    /// cross-reference pass is building the tree; by the time S1 sees it,
    /// an unresolved target is an `UndefinedGotoTarget` error.
    GoTo {
        paragraph_name: String,
        resolved_target: Option<StmtId>,
    },
    /// `NEXT SENTENCE`. Sequential: falls through to the first statement of
    /// the next sentence, or to `Exit` if this is the last sentence in the
    /// section (see the open question in the crate docs).
    NextSentence,
    /// `MOVE` and similar data-manipulation verbs with no control-flow
    /// effect of their own.
    Move,
    /// `PERFORM <section>` - an opaque call that doesn't alter the local
    /// CFG; sequential with respect to this section.
    PerformSection {
        section_name: String,
        resolved_section: Option<SectionId>,
    },
    /// Any verb the parser doesn't special-case. Sequential semantics.
    Unparsed,
    /// `EXIT SECTION` - terminates the section.
    ExitSection,
    /// `EXIT PROGRAM` - terminates the program.
    ExitProgram,
    /// `GOBACK`.
    Goback,
    /// `STOP RUN`.
    StopRun,
}

impl StatementKind {
    pub fn is_branch(&self) -> bool {
        matches!(self, StatementKind::Branch { .. })
    }

    pub fn is_terminating(&self) -> bool {
        matches!(
            self,
            StatementKind::ExitSection
                | StatementKind::ExitProgram
                | StatementKind::Goback
                | StatementKind::StopRun
        )
    }

    pub fn is_goto(&self) -> bool {
        matches!(self, StatementKind::GoTo { .. })
    }

    pub fn is_next_sentence(&self) -> bool {
        matches!(self, StatementKind::NextSentence { .. })
    }
}
