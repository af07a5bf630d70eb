//! Diagnostics are plain values accumulated by each stage of the
//! pipeline. No stage throws for control flow; a non-empty diagnostic
//! list from one stage stops the pipeline before the next stage runs.

use thiserror::Error;

use crate::frontend::position::Position;

/// The pipeline stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lex,
    Parse,
    Semantic,
    Ir,
    Verify,
    Optimize,
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Lex => f.write_str("lex"),
            Phase::Parse => f.write_str("parse"),
            Phase::Semantic => f.write_str("semantic"),
            Phase::Ir => f.write_str("ir"),
            Phase::Verify => f.write_str("verify"),
            Phase::Optimize => f.write_str("optimize"),
        }
    }
}

/// A single reported problem, usually tied to a source position.
///
/// Renders as `<file>:<line>:<column>: <phase> error: <message>`, the
/// format the driver writes to stderr and tests match against.
/// Structural diagnostics without a source anchor (the verifier's)
/// drop the position prefix.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", render(.phase, .position, .message))]
pub struct Diagnostic {
    pub phase: Phase,
    pub position: Position,
    pub message: String,
}

impl Diagnostic {
    pub fn new(phase: Phase, position: Position, message: impl Into<String>) -> Self {
        Self {
            phase,
            position,
            message: message.into(),
        }
    }
}

fn render(phase: &Phase, position: &Position, message: &str) -> String {
    if position.is_valid() {
        format!("{position}: {phase} error: {message}")
    } else {
        format!("{phase} error: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_in_driver_format() {
        let diagnostic = Diagnostic::new(
            Phase::Semantic,
            Position::new("main.mica", 4, 12, 38),
            "undefined: z",
        );

        assert_eq!(
            diagnostic.to_string(),
            "main.mica:4:12: semantic error: undefined: z"
        );
    }

    #[test]
    fn anchorless_diagnostics_drop_the_position() {
        let diagnostic = Diagnostic::new(
            Phase::Verify,
            Position::none(),
            "block b1 in function f has no terminator",
        );

        assert_eq!(
            diagnostic.to_string(),
            "verify error: block b1 in function f has no terminator"
        );
    }

    #[test]
    fn diagnostics_are_error_values() {
        let diagnostic = Diagnostic::new(
            Phase::Lex,
            Position::new("main.mica", 1, 1, 0),
            "unexpected character: '@'",
        );

        let as_error: &dyn std::error::Error = &diagnostic;
        assert!(as_error.source().is_none());
    }
}
