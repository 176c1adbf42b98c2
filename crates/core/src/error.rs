use crate::ast::Span;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// Stable diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Malformed literal
    LexError,
    /// No token class matches
    UnknownToken,
    /// A definition was expected and none matched, or one is misplaced
    StructuralError,
    /// Closing `END X` does not match the opening keyword
    BlockMismatch,
    /// End of input inside an open block
    MissingTerminator,
    /// Dangling operator, unmatched bracket, empty operand
    ExpressionError,
    /// Too many diagnostics; the rest were dropped
    DiagnosticLimit,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::LexError => "LexError",
            ErrorKind::UnknownToken => "UnknownToken",
            ErrorKind::StructuralError => "StructuralError",
            ErrorKind::BlockMismatch => "BlockMismatch",
            ErrorKind::MissingTerminator => "MissingTerminator",
            ErrorKind::ExpressionError => "ExpressionError",
            ErrorKind::DiagnosticLimit => "DiagnosticLimit",
        }
    }
}

/// A recoverable problem found while parsing. The tree is still produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorKind,
    pub message: String,
    /// Source id of the unit being parsed.
    pub file: String,
    pub line: u32,
    pub span: Span,
    /// Second location, e.g. the opening keyword of a mismatched block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<Span>,
}

impl Diagnostic {
    /// An error diagnostic. `file` is filled in when the diagnostic is
    /// recorded by the parser.
    pub fn error(code: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code,
            message: message.into(),
            file: String::new(),
            line: span.line,
            span,
            related: None,
        }
    }

    pub fn warning(code: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(code, span, message)
        }
    }

    pub fn structural(span: Span, message: impl Into<String>) -> Self {
        Diagnostic::error(ErrorKind::StructuralError, span, message)
    }

    pub fn with_related(mut self, related: Span) -> Self {
        self.related = Some(related);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Serialize with every field present (null when absent).
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "code":     self.code.as_str(),
            "file":     self.file,
            "line":     self.line,
            "message":  self.message,
            "related":  self.related.map(|s| serde_json::json!({"start": s.start, "end": s.end, "line": s.line})),
            "severity": self.severity,
            "span":     {"start": self.span.start, "end": self.span.end},
        })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}:{}: {}[{}]: {}",
            self.file,
            self.line,
            severity,
            self.code.as_str(),
            self.message
        )
    }
}

/// A failure inside a value expression, reported at the offending token.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason}")]
pub struct ExprError {
    pub span: Span,
    pub reason: String,
}

impl ExprError {
    pub fn new(span: Span, reason: impl Into<String>) -> Self {
        ExprError {
            span,
            reason: reason.into(),
        }
    }
}

impl From<ExprError> for Diagnostic {
    fn from(e: ExprError) -> Self {
        Diagnostic::error(ErrorKind::ExpressionError, e.span, e.reason)
    }
}

/// Faults that stop parsing instead of producing diagnostics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseFault {
    /// Spans are 32-bit byte offsets.
    #[error("source is {len} bytes, above the {max} byte limit")]
    SourceTooLarge { len: usize, max: usize },

    #[error("{file}:{line}: nesting deeper than {limit} levels")]
    NestingTooDeep {
        file: String,
        line: u32,
        limit: usize,
    },

    /// Token streams must end with an `Eof` token.
    #[error("token stream does not end with an end-of-input token")]
    InvalidTokenStream,
}
