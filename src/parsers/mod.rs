//! Tree-sitter parsing for TypeScript sources
//!
//! The parser is stateless: every query parses the files it needs on demand.
//! Grammar selection happens here; the syntax helpers used by the graph
//! builder, resolver and usage finder live in [`typescript`].

pub mod typescript;

use anyhow::{Context, Result};
use std::path::Path;
use tree_sitter::{Parser, Tree};

/// File extensions handled by the parser
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];

/// Whether `path` names a TypeScript source file
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Parser factory that selects the grammar based on the file extension
pub struct ParserFactory;

impl ParserFactory {
    /// Parse `source` into a syntax tree
    ///
    /// Malformed input still yields a tree (with error nodes); an error is only
    /// returned when the grammar cannot be loaded or parsing is aborted.
    pub fn parse(path: &Path, source: &str) -> Result<Tree> {
        let language_fn = match path.extension().and_then(|e| e.to_str()) {
            Some("tsx") => tree_sitter_typescript::LANGUAGE_TSX,
            _ => tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
        };
        let language: tree_sitter::Language = language_fn.into();

        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .context("Failed to set TypeScript language")?;

        parser
            .parse(source, None)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }
}
