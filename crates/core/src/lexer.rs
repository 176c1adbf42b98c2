//! Scanner: source text to tokens.
//!
//! Every run of word characters becomes a [`TokenKind::Word`] that also
//! records the [`Keyword`] it spells, if any. The scanner never decides
//! whether a word is used as a keyword; the parser does, by position.
//!
//! Lines whose first non-blank characters are `#`/`@` (native code) or
//! `--`/`++` (free-text comment) are captured whole as one token.
//!
//! Malformed literals and unknown characters still produce a token; the
//! problem is recorded in [`Token::lex_error`] and reported by the parser
//! only if it consumes that token, so text the parser captures as an
//! opaque rest-of-line is never diagnosed.

use crate::ast::Span;
use serde::Serialize;

// ──────────────────────────────────────────────
// Keywords
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Keyword {
    Begin,
    Comment,
    Define,
    Stub,
    Element,
    End,
    Environment,
    Family,
    Format,
    Header,
    If,
    Else,
    Include,
    Code,
    Ptu,
    Initialization,
    NextTest,
    Loop,
    Service,
    ServiceType,
    Simul,
    ElseSimul,
    Termination,
    Test,
    Use,
    Var,
    Array,
    Str,
    Init,
    In,
    With,
    From,
    To,
    Step,
    NbTimes,
    NbRandom,
    Bounds,
    Ev,
    Delta,
    Min,
    Max,
}

impl Keyword {
    pub const ALL: [Keyword; 41] = [
        Keyword::Begin,
        Keyword::Comment,
        Keyword::Define,
        Keyword::Stub,
        Keyword::Element,
        Keyword::End,
        Keyword::Environment,
        Keyword::Family,
        Keyword::Format,
        Keyword::Header,
        Keyword::If,
        Keyword::Else,
        Keyword::Include,
        Keyword::Code,
        Keyword::Ptu,
        Keyword::Initialization,
        Keyword::NextTest,
        Keyword::Loop,
        Keyword::Service,
        Keyword::ServiceType,
        Keyword::Simul,
        Keyword::ElseSimul,
        Keyword::Termination,
        Keyword::Test,
        Keyword::Use,
        Keyword::Var,
        Keyword::Array,
        Keyword::Str,
        Keyword::Init,
        Keyword::In,
        Keyword::With,
        Keyword::From,
        Keyword::To,
        Keyword::Step,
        Keyword::NbTimes,
        Keyword::NbRandom,
        Keyword::Bounds,
        Keyword::Ev,
        Keyword::Delta,
        Keyword::Min,
        Keyword::Max,
    ];

    /// Canonical upper-case spelling.
    pub fn spelling(self) -> &'static str {
        match self {
            Keyword::Begin => "BEGIN",
            Keyword::Comment => "COMMENT",
            Keyword::Define => "DEFINE",
            Keyword::Stub => "STUB",
            Keyword::Element => "ELEMENT",
            Keyword::End => "END",
            Keyword::Environment => "ENVIRONMENT",
            Keyword::Family => "FAMILY",
            Keyword::Format => "FORMAT",
            Keyword::Header => "HEADER",
            Keyword::If => "IF",
            Keyword::Else => "ELSE",
            Keyword::Include => "INCLUDE",
            Keyword::Code => "CODE",
            Keyword::Ptu => "PTU",
            Keyword::Initialization => "INITIALIZATION",
            Keyword::NextTest => "NEXT_TEST",
            Keyword::Loop => "LOOP",
            Keyword::Service => "SERVICE",
            Keyword::ServiceType => "SERVICE_TYPE",
            Keyword::Simul => "SIMUL",
            Keyword::ElseSimul => "ELSE_SIMUL",
            Keyword::Termination => "TERMINATION",
            Keyword::Test => "TEST",
            Keyword::Use => "USE",
            Keyword::Var => "VAR",
            Keyword::Array => "ARRAY",
            Keyword::Str => "STR",
            Keyword::Init => "INIT",
            Keyword::In => "IN",
            Keyword::With => "WITH",
            Keyword::From => "FROM",
            Keyword::To => "TO",
            Keyword::Step => "STEP",
            Keyword::NbTimes => "NB_TIMES",
            Keyword::NbRandom => "NB_RANDOM",
            Keyword::Bounds => "BOUNDS",
            Keyword::Ev => "EV",
            Keyword::Delta => "DELTA",
            Keyword::Min => "MIN",
            Keyword::Max => "MAX",
        }
    }

    /// Case-insensitive match of a whole word against the fixed spellings.
    pub fn lookup(word: &str) -> Option<Keyword> {
        Keyword::ALL
            .into_iter()
            .find(|k| k.spelling().eq_ignore_ascii_case(word))
    }

    /// Keywords that begin a definition or close/split a block. A line
    /// starting with one of these always ends a value expression.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Keyword::Begin
                | Keyword::Comment
                | Keyword::Define
                | Keyword::Stub
                | Keyword::Element
                | Keyword::End
                | Keyword::Environment
                | Keyword::Family
                | Keyword::Format
                | Keyword::Header
                | Keyword::If
                | Keyword::Else
                | Keyword::Include
                | Keyword::Initialization
                | Keyword::NextTest
                | Keyword::Service
                | Keyword::ServiceType
                | Keyword::Simul
                | Keyword::ElseSimul
                | Keyword::Termination
                | Keyword::Test
                | Keyword::Use
                | Keyword::Var
                | Keyword::Array
                | Keyword::Str
        )
    }
}

// ──────────────────────────────────────────────
// Tokens
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Dot,
    DotDot,
    Arrow,
    Assign,
    PlusAssign,
    MinusAssign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Caret,
    Bang,
    Tilde,
}

// Two-character punctuation first so the longest spelling wins.
const PUNCTS: &[(&str, Punct)] = &[
    ("..", Punct::DotDot),
    ("->", Punct::Arrow),
    ("==", Punct::EqEq),
    ("!=", Punct::NotEq),
    ("<=", Punct::Le),
    (">=", Punct::Ge),
    ("&&", Punct::AndAnd),
    ("||", Punct::OrOr),
    ("+=", Punct::PlusAssign),
    ("-=", Punct::MinusAssign),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    (",", Punct::Comma),
    (";", Punct::Semi),
    (".", Punct::Dot),
    ("=", Punct::Assign),
    ("<", Punct::Lt),
    (">", Punct::Gt),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("&", Punct::Amp),
    ("|", Punct::Pipe),
    ("^", Punct::Caret),
    ("!", Punct::Bang),
    ("~", Punct::Tilde),
];

impl Punct {
    pub fn as_str(self) -> &'static str {
        PUNCTS
            .iter()
            .find(|(_, p)| *p == self)
            .map_or("?", |(s, _)| *s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    /// Identifier or keyword spelling
    Word,
    Number,
    /// Double-quoted string, quotes included in the text
    Str,
    /// Single-quoted character, quotes included in the text
    Char,
    Punct(Punct),
    /// `#`/`@` line, marker included in the text
    NativeCode,
    /// `--`/`++` line, marker included in the text
    FreeComment,
    /// A character no token class accepts
    Unknown,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LexErrorKind {
    UnterminatedString,
    UnterminatedChar,
    MalformedNumber,
}

impl LexErrorKind {
    pub fn message(self) -> &'static str {
        match self {
            LexErrorKind::UnterminatedString => "unterminated string literal",
            LexErrorKind::UnterminatedChar => "unterminated character literal",
            LexErrorKind::MalformedNumber => "malformed number literal",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub keyword: Option<Keyword>,
    /// Source text exactly as written.
    pub text: String,
    pub span: Span,
    /// First token on its physical line.
    pub line_start: bool,
    pub lex_error: Option<LexErrorKind>,
}

impl Token {
    pub fn is_punct(&self, p: Punct) -> bool {
        self.kind == TokenKind::Punct(p)
    }

    pub fn is_keyword(&self, k: Keyword) -> bool {
        self.kind == TokenKind::Word && self.keyword == Some(k)
    }

    /// Human-readable description for diagnostics.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_owned(),
            TokenKind::NativeCode => "a native code line".to_owned(),
            TokenKind::FreeComment => "a comment line".to_owned(),
            _ => format!("`{}`", self.text),
        }
    }
}

// ──────────────────────────────────────────────
// Scanner
// ──────────────────────────────────────────────

/// Tokenize a whole source unit. The result always ends with an `Eof` token.
pub fn lex(src: &str) -> Vec<Token> {
    Scanner::new(src, 0, 1, true).run()
}

/// Tokenize a single-line fragment that starts at byte `base` of the
/// enclosing source, on `line`. Line markers are not recognized.
pub(crate) fn lex_fragment(fragment: &str, base: u32, line: u32) -> Vec<Token> {
    Scanner::new(fragment, base, line, false).run()
}

struct Scanner<'s> {
    src: &'s str,
    bytes: &'s [u8],
    pos: usize,
    base: u32,
    line: u32,
    at_line_start: bool,
    line_markers: bool,
    tokens: Vec<Token>,
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl<'s> Scanner<'s> {
    fn new(src: &'s str, base: u32, line: u32, line_markers: bool) -> Self {
        Scanner {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            base,
            line,
            at_line_start: line_markers,
            line_markers,
            tokens: Vec::new(),
        }
    }

    fn at(&self, i: usize) -> Option<u8> {
        self.bytes.get(i).copied()
    }

    /// End of the current physical line, excluding `\r\n`.
    fn line_end(&self, from: usize) -> usize {
        let end = self.src[from..]
            .find('\n')
            .map_or(self.src.len(), |i| from + i);
        if end > from && self.bytes[end - 1] == b'\r' {
            end - 1
        } else {
            end
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, line_start: bool, err: Option<LexErrorKind>) {
        let text = &self.src[start..self.pos];
        let keyword = if kind == TokenKind::Word {
            Keyword::lookup(text)
        } else {
            None
        };
        self.tokens.push(Token {
            kind,
            keyword,
            text: text.to_owned(),
            span: Span::new(
                self.base + start as u32,
                self.base + self.pos as u32,
                self.line,
            ),
            line_start,
            lex_error: err,
        });
    }

    fn run(mut self) -> Vec<Token> {
        loop {
            // Whitespace
            while let Some(b) = self.at(self.pos) {
                match b {
                    b'\n' => {
                        self.line += 1;
                        self.at_line_start = self.line_markers;
                        self.pos += 1;
                    }
                    b' ' | b'\t' | b'\r' | 0x0c => self.pos += 1,
                    _ => break,
                }
            }

            let start = self.pos;
            let Some(c) = self.at(start) else {
                self.push(TokenKind::Eof, start, self.at_line_start, None);
                break;
            };
            let line_start = std::mem::replace(&mut self.at_line_start, false);

            if line_start && self.line_markers {
                if c == b'#' || c == b'@' {
                    self.pos = self.line_end(start);
                    self.push(TokenKind::NativeCode, start, true, None);
                    continue;
                }
                let rest = &self.bytes[start..];
                if rest.starts_with(b"--") || rest.starts_with(b"++") {
                    self.pos = self.line_end(start);
                    self.push(TokenKind::FreeComment, start, true, None);
                    continue;
                }
            }

            if is_word_start(c) {
                while self.at(self.pos).is_some_and(is_word_byte) {
                    self.pos += 1;
                }
                self.push(TokenKind::Word, start, line_start, None);
                continue;
            }

            if c.is_ascii_digit() {
                let err = self.scan_number();
                self.push(TokenKind::Number, start, line_start, err);
                continue;
            }

            if c == b'"' {
                let err = self.scan_string();
                self.push(TokenKind::Str, start, line_start, err);
                continue;
            }

            if c == b'\'' {
                let err = self.scan_char();
                self.push(TokenKind::Char, start, line_start, err);
                continue;
            }

            if let Some((spelling, punct)) = PUNCTS
                .iter()
                .find(|(s, _)| self.bytes[start..].starts_with(s.as_bytes()))
            {
                self.pos += spelling.len();
                self.push(TokenKind::Punct(*punct), start, line_start, None);
                continue;
            }

            let width = self.src[start..].chars().next().map_or(1, char::len_utf8);
            self.pos += width;
            self.push(TokenKind::Unknown, start, line_start, None);
        }
        self.tokens
    }

    /// `0x[hex]+` or `digits[.digits][e[+-]digits][%]`. A `.` that starts
    /// `..` is left for the range operator.
    fn scan_number(&mut self) -> Option<LexErrorKind> {
        let start = self.pos;
        if self.at(start) == Some(b'0') && matches!(self.at(start + 1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits = self.pos;
            while self.at(self.pos).is_some_and(|b| b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            return (self.pos == digits).then_some(LexErrorKind::MalformedNumber);
        }
        while self.at(self.pos).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.at(self.pos) == Some(b'.') && self.at(self.pos + 1) != Some(b'.') {
            self.pos += 1;
            while self.at(self.pos).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.at(self.pos), Some(b'e' | b'E')) {
            let mut look = self.pos + 1;
            if matches!(self.at(look), Some(b'+' | b'-')) {
                look += 1;
            }
            if self.at(look).is_some_and(|b| b.is_ascii_digit()) {
                self.pos = look;
                while self.at(self.pos).is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        if self.at(self.pos) == Some(b'%') {
            self.pos += 1;
        }
        None
    }

    fn scan_string(&mut self) -> Option<LexErrorKind> {
        self.pos += 1;
        loop {
            match self.at(self.pos) {
                Some(b'"') => {
                    self.pos += 1;
                    return None;
                }
                Some(b'\\') if !matches!(self.at(self.pos + 1), None | Some(b'\n' | b'\r')) => {
                    self.pos += 1;
                    self.pos += self.src[self.pos..].chars().next().map_or(1, char::len_utf8);
                }
                None | Some(b'\n' | b'\r') => {
                    self.pos = self.line_end(self.pos);
                    return Some(LexErrorKind::UnterminatedString);
                }
                Some(_) => {
                    self.pos += self.src[self.pos..].chars().next().map_or(1, char::len_utf8);
                }
            }
        }
    }

    fn scan_char(&mut self) -> Option<LexErrorKind> {
        let open = self.pos;
        self.pos += 1;
        match self.at(self.pos) {
            Some(b'\\') if !matches!(self.at(self.pos + 1), None | Some(b'\n' | b'\r')) => {
                self.pos += 1;
                self.pos += self.src[self.pos..].chars().next().map_or(1, char::len_utf8);
            }
            Some(b'\'' | b'\n' | b'\r') | None => {}
            Some(_) => {
                self.pos += self.src[self.pos..].chars().next().map_or(1, char::len_utf8);
            }
        }
        if self.at(self.pos) == Some(b'\'') && self.pos > open + 1 {
            self.pos += 1;
            return None;
        }
        // Recover by taking the rest of the physical line as the literal body.
        self.pos = self.line_end(open);
        Some(LexErrorKind::UnterminatedChar)
    }
}

/// Resolve the escapes of a double-quoted literal (quotes included or not).
pub fn unescape(raw: &str) -> String {
    let body = raw.strip_prefix('"').unwrap_or(raw);
    let body = body.strip_suffix('"').unwrap_or(body);
    let mut s = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            s.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => s.push('"'),
            Some('\\') => s.push('\\'),
            Some('n') => s.push('\n'),
            Some('t') => s.push('\t'),
            Some(other) => {
                s.push('\\');
                s.push(other);
            }
            None => s.push('\\'),
        }
    }
    s
}

/// Inverse of [`unescape`] for the escapes it resolves; adds the quotes.
pub fn escape(value: &str) -> String {
    let mut s = String::with_capacity(value.len() + 2);
    s.push('"');
    for c in value.chars() {
        match c {
            '"' => s.push_str("\\\""),
            '\\' => s.push_str("\\\\"),
            '\n' => s.push_str("\\n"),
            '\t' => s.push_str("\\t"),
            other => s.push(other),
        }
    }
    s.push('"');
    s
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
