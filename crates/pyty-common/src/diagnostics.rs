//! Structured diagnostics.
//!
//! The evaluator never raises for a predictable mismatch. Failures are
//! boolean returns paired with a `DiagnosticAddendum`: a tree of short
//! structured messages (source type, destination type, type-variable name,
//! constraint name) that the surrounding checker renders into user-visible
//! text. Wording and severity policy live outside this crate.

use crate::span::Span;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticCategory {
    Error,
    Warning,
    Information,
}

/// A top-level diagnostic anchored to a source span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub span: Span,
    pub message: String,
    pub addenda: Vec<DiagnosticAddendum>,
}

impl Diagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            category: DiagnosticCategory::Error,
            span,
            message: message.into(),
            addenda: Vec::new(),
        }
    }

    pub fn with_addendum(mut self, addendum: DiagnosticAddendum) -> Self {
        self.addenda.push(addendum);
        self
    }
}

/// Nesting depth beyond which addenda are elided from display output.
pub const MAX_ADDENDUM_DISPLAY_DEPTH: usize = 8;

/// A nested explanation attached to a failed judgment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiagnosticAddendum {
    messages: Vec<String>,
    children: Vec<DiagnosticAddendum>,
}

impl DiagnosticAddendum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn add_addendum(&mut self, child: DiagnosticAddendum) {
        self.children.push(child);
    }

    /// Create, populate, and attach a child in one step.
    pub fn nest(&mut self) -> &mut DiagnosticAddendum {
        self.children.push(DiagnosticAddendum::new());
        self.children.last_mut().unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.children.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn children(&self) -> &[DiagnosticAddendum] {
        &self.children
    }

    /// Flatten into indented lines, eliding nesting beyond
    /// `MAX_ADDENDUM_DISPLAY_DEPTH`.
    pub fn display_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.collect_lines(0, &mut lines);
        lines
    }

    fn collect_lines(&self, depth: usize, out: &mut Vec<String>) {
        if depth >= MAX_ADDENDUM_DISPLAY_DEPTH {
            return;
        }
        for message in &self.messages {
            out.push(format!("{}{}", "  ".repeat(depth), message));
        }
        for child in &self.children {
            child.collect_lines(depth + 1, out);
        }
    }
}
