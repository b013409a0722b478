//! Shared leaf utilities for the pyty type evaluator.
//!
//! This crate has no knowledge of the parse tree or the type model. It
//! provides:
//! - `Interner`/`Atom` - deduplicated string storage shared across layers
//! - `Span` - byte-range source locations
//! - `Diagnostic`/`DiagnosticAddendum` - structured mismatch reporting
//! - `CancellationToken` - cooperative cancellation for long solves

pub mod cancel;
pub mod diagnostics;
pub mod interner;
pub mod span;

pub use cancel::{CancellationToken, Cancelled};
pub use diagnostics::{Diagnostic, DiagnosticAddendum, DiagnosticCategory};
pub use interner::{Atom, Interner};
pub use span::Span;
