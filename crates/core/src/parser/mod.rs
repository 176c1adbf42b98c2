/// Block parser: tokens to a [`SourceFile`] plus diagnostics.
///
/// One parsing function per definition kind, dispatched on the keyword
/// identity of the token at a definition position. Value positions are
/// handed to the expression parser in `expressions.rs`. Nothing here
/// aborts on malformed input: problems become diagnostics, the cursor
/// resynchronizes at the next recognizable boundary and parsing resumes.
use crate::ast::{BlockKind, ChildKind, Definition, SourceFile, Span};
use crate::error::{Diagnostic, ErrorKind, ExprError, ParseFault};
use crate::lexer::{Keyword, Punct, Token, TokenKind};
use crate::options::ParseOptions;
use tracing::{debug, trace};

mod blocks;
mod constructs;
mod expressions;
mod specs;
mod stub;

// ──────────────────────────────────────────────
// Diagnostics sink
// ──────────────────────────────────────────────

struct Diagnostics {
    items: Vec<Diagnostic>,
    limit: usize,
    dropped: usize,
    file: String,
}

#[derive(Clone, Copy)]
struct Checkpoint {
    pos: usize,
    last_end: u32,
    last_line: u32,
    diagnostics: usize,
    dropped: usize,
}

impl Diagnostics {
    fn new(file: &str, limit: usize) -> Self {
        Diagnostics {
            items: Vec::new(),
            limit,
            dropped: 0,
            file: file.to_owned(),
        }
    }

    fn push(&mut self, mut d: Diagnostic) {
        if self.items.len() < self.limit {
            d.file.clone_from(&self.file);
            self.items.push(d);
        } else {
            self.dropped += 1;
        }
    }

    fn finish(mut self, at: Span) -> Vec<Diagnostic> {
        if self.dropped > 0 {
            let mut d = Diagnostic::warning(
                ErrorKind::DiagnosticLimit,
                at,
                format!(
                    "{} further diagnostic(s) dropped after the first {}",
                    self.dropped, self.limit
                ),
            );
            d.file.clone_from(&self.file);
            self.items.push(d);
        }
        self.items
    }
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

struct Parser<'a> {
    src: &'a str,
    tokens: &'a [Token],
    pos: usize,
    /// End offset and line of the last consumed token.
    last_end: u32,
    last_line: u32,
    source_id: &'a str,
    diags: Diagnostics,
    /// Opening keyword and span of every block being parsed, innermost last.
    open_blocks: Vec<(Keyword, Span)>,
    depth: usize,
    max_depth: usize,
    fault: Option<ParseFault>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, tokens: &'a [Token], source_id: &'a str, options: &ParseOptions) -> Self {
        Parser {
            src,
            tokens,
            pos: 0,
            last_end: 0,
            last_line: 1,
            source_id,
            diags: Diagnostics::new(source_id, options.max_diagnostics),
            open_blocks: Vec::new(),
            depth: 0,
            max_depth: options.max_depth,
            fault: None,
        }
    }

    /// Run `f` on a parser over `tokens` (which must end with `Eof`), then
    /// fold its diagnostics and fault back into `self`.
    fn sub_parse<T>(&mut self, tokens: &[Token], f: impl FnOnce(&mut Parser<'_>) -> T) -> T {
        let first = tokens.first().map_or(Span::default(), |t| t.span);
        let mut sub = Parser {
            src: self.src,
            tokens,
            pos: 0,
            last_end: first.start,
            last_line: first.line,
            source_id: self.source_id,
            diags: Diagnostics::new(self.source_id, usize::MAX),
            open_blocks: Vec::new(),
            depth: self.depth,
            max_depth: self.max_depth,
            fault: None,
        };
        let out = f(&mut sub);
        for d in sub.diags.items {
            self.report(d);
        }
        if let Some(fault) = sub.fault {
            self.set_fault(fault);
        }
        out
    }

    // -- Cursor ---------------------------------------------

    fn cur(&self) -> &'a Token {
        let tokens: &'a [Token] = self.tokens;
        &tokens[self.pos.min(tokens.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &'a Token {
        let tokens: &'a [Token] = self.tokens;
        &tokens[(self.pos + n).min(tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        self.cur().kind == TokenKind::Eof
    }

    /// Consume the current token without reporting its lexical problems.
    fn bump(&mut self) -> &'a Token {
        let t = self.cur();
        if t.kind != TokenKind::Eof {
            self.pos += 1;
            self.last_end = t.span.end;
            self.last_line = t.span.line;
        }
        t
    }

    /// Consume the current token as a token: malformed literals and unknown
    /// characters are reported here.
    fn advance(&mut self) -> &'a Token {
        let t = self.bump();
        if let Some(err) = t.lex_error {
            self.report(Diagnostic::error(ErrorKind::LexError, t.span, err.message()));
        } else if t.kind == TokenKind::Unknown {
            self.report(Diagnostic::error(
                ErrorKind::UnknownToken,
                t.span,
                format!("unrecognized character `{}`", t.text),
            ));
        }
        t
    }

    fn is_keyword(&self, k: Keyword) -> bool {
        self.cur().is_keyword(k)
    }

    fn is_punct(&self, p: Punct) -> bool {
        self.cur().is_punct(p)
    }

    /// Whether the current token continues the line of the last one.
    fn on_same_line(&self) -> bool {
        let t = self.cur();
        !t.line_start && t.kind != TokenKind::Eof
    }

    fn eat_punct(&mut self, p: Punct) -> Option<Span> {
        if self.is_punct(p) {
            Some(self.bump().span)
        } else {
            None
        }
    }

    fn eat_keyword(&mut self, k: Keyword) -> Option<Span> {
        if self.is_keyword(k) {
            Some(self.bump().span)
        } else {
            None
        }
    }

    fn expect_punct(&mut self, p: Punct) -> Result<Span, ExprError> {
        match self.eat_punct(p) {
            Some(span) => Ok(span),
            None => Err(ExprError::new(
                self.error_span(),
                format!("expected `{}`, found {}", p.as_str(), self.cur().describe()),
            )),
        }
    }

    fn expect_keyword(&mut self, k: Keyword) -> Result<Span, Diagnostic> {
        match self.eat_keyword(k) {
            Some(span) => Ok(span),
            None => Err(Diagnostic::structural(
                self.error_span(),
                format!("expected {}, found {}", k.spelling(), self.cur().describe()),
            )),
        }
    }

    /// A name on the current line.
    fn take_name(&mut self, what: &str) -> Result<(String, Span), Diagnostic> {
        let tok = self.cur();
        if tok.kind == TokenKind::Word && !tok.line_start {
            self.bump();
            Ok((tok.text.clone(), tok.span))
        } else {
            Err(Diagnostic::structural(
                self.error_span(),
                format!("expected {}, found {}", what, tok.describe()),
            ))
        }
    }

    /// Where to point an error about the current position: the current
    /// token if it is on the line being parsed, else just past the last one.
    fn error_span(&self) -> Span {
        if self.on_same_line() || self.pos == 0 {
            self.cur().span
        } else {
            Span::new(self.last_end, self.last_end, self.last_line)
        }
    }

    /// Span from `start` through the last consumed token.
    fn span_from(&self, start: Span) -> Span {
        Span::new(start.start, self.last_end.max(start.end), start.line)
    }

    fn line_end(&self, from: usize) -> usize {
        self.src[from..].find('\n').map_or(self.src.len(), |i| from + i)
    }

    /// Raw text after the last consumed token up to the end of its line,
    /// trimmed. Tokens inside are skipped without being reported.
    fn take_rest_of_line(&mut self) -> (String, Span) {
        let from = (self.last_end as usize).min(self.src.len());
        let to = self.line_end(from);
        let raw = &self.src[from..to];
        let lead = raw.len() - raw.trim_start().len();
        let text = raw.trim();
        let start = (from + lead) as u32;
        let span = Span::new(start, start + text.len() as u32, self.last_line);
        while !self.at_eof() && (self.cur().span.start as usize) < to {
            self.pos += 1;
        }
        if !text.is_empty() {
            self.last_end = span.end;
        }
        (text.to_owned(), span)
    }

    fn skip_line(&mut self) {
        while self.on_same_line() {
            self.bump();
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            last_end: self.last_end,
            last_line: self.last_line,
            diagnostics: self.diags.items.len(),
            dropped: self.diags.dropped,
        }
    }

    fn rewind(&mut self, cp: Checkpoint) {
        self.pos = cp.pos;
        self.last_end = cp.last_end;
        self.last_line = cp.last_line;
        self.diags.items.truncate(cp.diagnostics);
        self.diags.dropped = cp.dropped;
    }

    // -- Diagnostics and faults -----------------------------

    fn report(&mut self, d: Diagnostic) {
        if self.fault.is_none() {
            self.diags.push(d);
        }
    }

    fn set_fault(&mut self, fault: ParseFault) {
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
        // Jump to the end so every open loop unwinds.
        self.pos = self.tokens.len() - 1;
    }

    /// Enter one nesting level (block or expression operand).
    fn descend(&mut self, at: Span) -> Result<(), ExprError> {
        if self.depth >= self.max_depth {
            self.set_fault(ParseFault::NestingTooDeep {
                file: self.source_id.to_owned(),
                line: at.line,
                limit: self.max_depth,
            });
            return Err(ExprError::new(at, "nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // -- Definitions ----------------------------------------

    fn parse_source_file(&mut self) -> Vec<Definition> {
        let mut definitions = Vec::new();
        loop {
            definitions.extend(self.parse_definitions(BlockKind::SourceFile, &[]));
            if self.at_eof() || self.fault.is_some() {
                break;
            }
            // Only END stops the top-level list.
            let end = self.bump();
            let mut span = end.span;
            if self.on_same_line() && self.cur().kind == TokenKind::Word {
                span = span.to(self.bump().span);
            }
            self.report(Diagnostic::structural(span, "END without an open block"));
        }
        definitions
    }

    /// Definitions up to end of input, an END, or one of `stops`.
    fn parse_definitions(&mut self, ctx: BlockKind, stops: &[Keyword]) -> Vec<Definition> {
        let mut defs = Vec::new();
        while self.fault.is_none() {
            let tok = self.cur();
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Word => match tok.keyword {
                    Some(Keyword::End) => break,
                    Some(k) if stops.contains(&k) => break,
                    Some(k @ (Keyword::Else | Keyword::ElseSimul)) => {
                        let owner = divider_owner(k);
                        // Left for the enclosing IF/SIMUL; the current block closes early.
                        if self.encloses(owner) {
                            break;
                        }
                        self.bump();
                        let message =
                            format!("{} outside of an {} block", k.spelling(), owner.spelling());
                        self.report(Diagnostic::structural(tok.span, message));
                        continue;
                    }
                    _ => {}
                },
                _ => {}
            }
            defs.push(self.parse_definition(ctx));
        }
        defs
    }

    fn classify(&self, ctx: BlockKind) -> Option<ChildKind> {
        let tok = self.cur();
        match tok.kind {
            TokenKind::NativeCode if ctx == BlockKind::DefineStub => Some(ChildKind::StubCode),
            TokenKind::NativeCode => Some(ChildKind::Native),
            TokenKind::FreeComment => Some(ChildKind::Comment),
            TokenKind::Word => {
                let kind = match tok.keyword {
                    Some(Keyword::Begin) => Some(ChildKind::Begin),
                    Some(Keyword::Comment) => Some(ChildKind::Comment),
                    Some(Keyword::Define) => Some(ChildKind::DefineStub),
                    Some(Keyword::Element) => Some(ChildKind::Element),
                    Some(Keyword::Environment) => Some(ChildKind::Environment),
                    Some(Keyword::Family) => Some(ChildKind::Family),
                    Some(Keyword::Format) => Some(ChildKind::Format),
                    Some(Keyword::Header) => Some(ChildKind::Header),
                    Some(Keyword::If) => Some(ChildKind::IfElse),
                    Some(Keyword::Simul) => Some(ChildKind::Simul),
                    Some(Keyword::Include) => Some(ChildKind::Include),
                    Some(Keyword::Initialization) => Some(ChildKind::Initialization),
                    Some(Keyword::NextTest) => Some(ChildKind::NextTest),
                    Some(Keyword::Service) => Some(ChildKind::Service),
                    Some(Keyword::ServiceType) => Some(ChildKind::ServiceType),
                    Some(Keyword::Stub) => Some(ChildKind::Stub),
                    Some(Keyword::Termination) => Some(ChildKind::Termination),
                    Some(Keyword::Test) => Some(ChildKind::Test),
                    Some(Keyword::Use) => Some(ChildKind::Use),
                    Some(Keyword::Var | Keyword::Array | Keyword::Str) => Some(ChildKind::Var),
                    _ => None,
                };
                kind.or_else(|| ctx.admits(ChildKind::Identifier).then_some(ChildKind::Identifier))
            }
            _ => None,
        }
    }

    fn parse_definition(&mut self, ctx: BlockKind) -> Definition {
        let tok = self.cur();
        let start = self.pos;
        let Some(kind) = self.classify(ctx) else {
            let d = match (tok.lex_error, tok.kind) {
                (Some(err), _) => Diagnostic::error(ErrorKind::LexError, tok.span, err.message()),
                (None, TokenKind::Unknown) => Diagnostic::error(
                    ErrorKind::UnknownToken,
                    tok.span,
                    format!("unrecognized character `{}`", tok.text),
                ),
                _ => Diagnostic::structural(
                    tok.span,
                    format!("expected a definition, found {}", tok.describe()),
                ),
            };
            self.report(d);
            self.recover(start, ctx);
            return Definition::Error {
                span: self.span_from(tok.span),
            };
        };

        if !ctx.admits(kind) {
            self.report(Diagnostic::structural(
                tok.span,
                format!("{} is not allowed in {}", describe_child(kind, tok), ctx.name()),
            ));
        }
        trace!(?kind, line = tok.span.line, "definition");

        match self.parse_child(kind, ctx) {
            Ok(def) => def,
            Err(d) => {
                self.report(d);
                self.recover(start, ctx);
                Definition::Error {
                    span: self.span_from(tok.span),
                }
            }
        }
    }

    fn parse_child(&mut self, kind: ChildKind, ctx: BlockKind) -> Result<Definition, Diagnostic> {
        match kind {
            ChildKind::Native => Ok(self.parse_native_code()),
            ChildKind::StubCode => self.parse_stub_code(),
            ChildKind::Comment if self.cur().kind == TokenKind::FreeComment => {
                Ok(self.parse_other_comment())
            }
            ChildKind::Comment => Ok(self.parse_comment()),
            ChildKind::Begin => Ok(self.parse_begin()),
            ChildKind::DefineStub => self.parse_define_stub(),
            ChildKind::Element => Ok(self.parse_element()),
            ChildKind::Environment => Ok(self.parse_environment()),
            ChildKind::Family => self.parse_family(),
            ChildKind::Format => self.parse_format(),
            ChildKind::Header => Ok(self.parse_header()),
            ChildKind::IfElse => Ok(self.parse_if(ctx)),
            ChildKind::Simul => Ok(self.parse_simul(ctx)),
            ChildKind::Include => self.parse_include(),
            ChildKind::Initialization => Ok(self.parse_native_block(Keyword::Initialization)),
            ChildKind::Termination => Ok(self.parse_native_block(Keyword::Termination)),
            ChildKind::NextTest => Ok(self.parse_next_test()),
            ChildKind::Service => Ok(self.parse_service()),
            ChildKind::ServiceType => self.parse_service_type(),
            ChildKind::Stub => self.parse_stub_declaration(),
            ChildKind::Test => Ok(self.parse_test()),
            ChildKind::Use => self.parse_use(),
            ChildKind::Var => self.parse_var(),
            ChildKind::Identifier => Ok(self.parse_identifier()),
        }
    }

    /// Whether some block other than the innermost one was opened by `opener`.
    pub(super) fn encloses(&self, opener: Keyword) -> bool {
        let enclosing = &self.open_blocks[..self.open_blocks.len().saturating_sub(1)];
        enclosing.iter().any(|(o, _)| *o == opener)
    }

    /// Whether the cursor sits on a point parsing can resume from: a
    /// structural keyword or any line start that begins a definition `ctx`
    /// admits, such as a bare identifier line inside ELEMENT.
    fn at_boundary(&self, ctx: BlockKind) -> bool {
        let t = self.cur();
        match t.kind {
            TokenKind::Eof | TokenKind::NativeCode | TokenKind::FreeComment => true,
            TokenKind::Word if t.line_start => {
                t.keyword.is_some_and(Keyword::is_structural)
                    || self.classify(ctx).is_some_and(|kind| ctx.admits(kind))
            }
            _ => false,
        }
    }

    /// Skip to the next boundary, consuming at least one token if nothing
    /// was consumed since `start`.
    fn recover(&mut self, start: usize, ctx: BlockKind) {
        if self.pos == start {
            self.bump();
        }
        let from = self.pos;
        while !self.at_boundary(ctx) {
            self.bump();
        }
        if self.pos > from {
            debug!(
                skipped = self.pos - from,
                line = self.last_line,
                "resynchronized"
            );
        }
    }
}

fn divider_owner(divider: Keyword) -> Keyword {
    if divider == Keyword::ElseSimul {
        Keyword::Simul
    } else {
        Keyword::If
    }
}

fn describe_child(kind: ChildKind, tok: &Token) -> String {
    match kind {
        ChildKind::Native => "native code".to_owned(),
        ChildKind::StubCode => "a stub signature".to_owned(),
        ChildKind::Comment if tok.kind == TokenKind::FreeComment => "a comment line".to_owned(),
        ChildKind::Identifier => format!("identifier `{}`", tok.text),
        _ => tok.keyword.map_or_else(|| tok.text.clone(), |k| k.spelling().to_owned()),
    }
}

// ──────────────────────────────────────────────
// Entry point
// ──────────────────────────────────────────────

/// Parse a token stream produced by [`crate::lexer::lex`] over `src`.
///
/// Malformed input yields a tree plus diagnostics. Only a broken token
/// stream or nesting beyond `options.max_depth` is a [`ParseFault`].
pub fn parse_tokens(
    src: &str,
    tokens: &[Token],
    source_id: &str,
    options: &ParseOptions,
) -> Result<(SourceFile, Vec<Diagnostic>), ParseFault> {
    if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
        return Err(ParseFault::InvalidTokenStream);
    }
    let mut p = Parser::new(src, tokens, source_id, options);
    let definitions = p.parse_source_file();
    if let Some(fault) = p.fault.take() {
        return Err(fault);
    }
    let eof = p.cur().span;
    let tree = SourceFile {
        source_id: source_id.to_owned(),
        definitions,
    };
    Ok((tree, p.diags.finish(eof)))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
