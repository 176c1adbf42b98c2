//! ptuscript-core: PTUScript scanner and parser core library.
//!
//! Turns PTUScript test-plan source into a syntax tree plus an ordered list
//! of diagnostics. Parsing is recovering: malformed input still yields a
//! tree, with the broken parts reported and replaced by error placeholders.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`parse()`] / [`parse_with()`] -- source text to [`ParsedSource`]
//! - [`ParseOptions`] -- diagnostic and nesting limits
//! - [`Diagnostic`], [`ErrorKind`], [`ParseFault`] -- problem reporting
//! - Tree types: [`SourceFile`], [`Definition`], [`Expression`],
//!   [`VarInstruction`], [`InitSpec`], [`ExpectedSpec`],
//!   [`StubCallSignature`], [`Span`]
//! - [`render()`] -- canonical PTUScript output
//!
//! The scanner ([`lexer::lex`]) and the token-level parser
//! ([`parser::parse_tokens`]) are public for tools that need them separately.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod pipeline;
pub mod render;
pub mod source;

// ── Convenience re-exports: key types ────────────────────────────────

pub use ast::{
    Definition, ExpectedSpec, Expression, InitSpec, SourceFile, Span, StubCallSignature,
    VarInstruction,
};
pub use error::{Diagnostic, ErrorKind, ExprError, ParseFault, Severity};
pub use options::ParseOptions;
pub use source::{LineCol, LineIndex};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use pipeline::{parse, parse_with, ParsedSource};
pub use render::render;
