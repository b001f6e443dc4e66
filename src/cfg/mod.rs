//! The six-stage control-flow structuring pipeline: S1 `stmt_graph` through
//! S6 `reduce`, plus the shared `node` data model and the optional `export`
//! debug artefacts.

pub mod branch_join;
pub mod export;
pub mod loops;
pub mod node;
pub mod reachability;
pub mod reduce;
pub mod scope;
pub mod stmt_graph;

pub use node::{Condition, Edge, FlowGraph, Node, Scope};
pub use reduce::{structure, structure_with_budget, DEFAULT_REDUCTION_BUDGET};
