//! Parse entry points: source text -> tree + diagnostics.
//!
//! A thin orchestrator over the scanner and the block parser. Malformed
//! input never fails here; only [`ParseFault`]s do.

use crate::ast::SourceFile;
use crate::error::{Diagnostic, ParseFault};
use crate::lexer;
use crate::options::ParseOptions;
use crate::parser;
use serde::Serialize;
use tracing::debug;

/// Spans are 32-bit byte offsets.
pub const MAX_SOURCE_LEN: usize = u32::MAX as usize;

/// Result of parsing one source unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedSource {
    pub tree: SourceFile,
    /// In the order they were found.
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedSource {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Tree and diagnostics as one JSON document.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "tree": &self.tree,
            "diagnostics": self
                .diagnostics
                .iter()
                .map(Diagnostic::to_json_value)
                .collect::<Vec<_>>(),
        })
    }
}

/// Parse `source` with default [`ParseOptions`].
pub fn parse(source: &str, source_id: &str) -> Result<ParsedSource, ParseFault> {
    parse_with(source, source_id, &ParseOptions::default())
}

#[tracing::instrument(level = "debug", skip(source, options), fields(bytes = source.len()))]
pub fn parse_with(
    source: &str,
    source_id: &str,
    options: &ParseOptions,
) -> Result<ParsedSource, ParseFault> {
    if source.len() > MAX_SOURCE_LEN {
        return Err(ParseFault::SourceTooLarge {
            len: source.len(),
            max: MAX_SOURCE_LEN,
        });
    }

    // Scan
    let tokens = lexer::lex(source);

    // Parse
    let (tree, diagnostics) = parser::parse_tokens(source, &tokens, source_id, options)?;

    debug!(
        tokens = tokens.len(),
        definitions = tree.definitions.len(),
        diagnostics = diagnostics.len(),
        "parsed"
    );
    Ok(ParsedSource { tree, diagnostics })
}
