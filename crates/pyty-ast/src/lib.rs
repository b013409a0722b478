//! Parse-tree model for the pyty type evaluator.
//!
//! Nodes live in an arena and refer to each other by `NodeIndex`; every
//! node carries a parent index, which is what makes the `enclosing_*`
//! family of predicates in [`tree_utils`] single bounded walks.
//!
//! The evaluator does not parse source text. The embedder (or a test)
//! builds trees through the arena's constructor methods.

pub mod arena;
pub mod tree_utils;

pub use arena::{
    ArgCategory, BinaryOperator, ConstantKind, Node, NodeArena, NodeIndex, NodeKind, ScopeKinds,
    UnaryOperator,
};
