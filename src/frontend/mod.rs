use std::path::PathBuf;
use std::rc::Rc;

use crate::frontend::position::Span;

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod position;
pub mod token;

/// A single compilation unit's source text plus where it came from.
#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn new(contents: impl Into<String>, origin: SourceFileOrigin) -> Self {
        Self {
            contents: contents.into(),
            origin,
        }
    }

    pub fn from_memory(contents: impl Into<String>) -> Self {
        Self::new(contents, SourceFileOrigin::Memory)
    }

    /// The name used in positions and diagnostics.
    pub fn name(&self) -> Rc<str> {
        Rc::from(self.origin.to_string())
    }

    pub fn value_of_span(&self, span: &Span) -> &str {
        &self.contents[span.start.offset..span.end.offset]
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => write!(f, "{}", path.display()),
        }
    }
}
