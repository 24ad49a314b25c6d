//! Graph machinery behind the commit gate.

pub mod dependency;
pub mod digraph;

pub use dependency::{DependencyGraph, EdgeKind};
pub use digraph::DiGraph;
