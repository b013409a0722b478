//! Flow-sensitive guard extraction.
//!
//! The one place syntax and types meet: given a reference expression and
//! a test expression known to have evaluated truthy (or falsy) on a
//! control-flow edge, produce the AST-free narrowing callback the solver
//! layer applies to the reference's pre-edge type.

pub mod flow;

pub use flow::{ExprTypes, FlowAnalyzer, NodeTypeMap};
