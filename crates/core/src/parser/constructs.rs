use super::Parser;
use crate::ast::{
    CommentMarker, Definition, Header, Include, IncludeKind, IncludePath, NativeCode, NativeMarker,
    Span, StubDeclaration, Use,
};
use crate::error::Diagnostic;
use crate::lexer::{unescape, Keyword, Punct, TokenKind};

pub(super) fn native_marker(text: &str) -> NativeMarker {
    if text.starts_with('@') {
        NativeMarker::At
    } else {
        NativeMarker::Hash
    }
}

impl<'a> Parser<'a> {
    // -- Line-level instructions --------------------------------

    pub(super) fn parse_begin(&mut self) -> Definition {
        Definition::Begin {
            span: self.bump().span,
        }
    }

    pub(super) fn parse_comment(&mut self) -> Definition {
        let kw = self.bump().span;
        let (text, _) = self.take_rest_of_line();
        Definition::Comment {
            text,
            span: self.span_from(kw),
        }
    }

    pub(super) fn parse_other_comment(&mut self) -> Definition {
        let tok = self.bump();
        let marker = if tok.text.starts_with("++") {
            CommentMarker::Plus
        } else {
            CommentMarker::Dash
        };
        Definition::OtherComment {
            marker,
            text: tok.text[2..].to_owned(),
            span: tok.span,
        }
    }

    pub(super) fn parse_native_code(&mut self) -> Definition {
        let tok = self.bump();
        Definition::NativeCode(NativeCode {
            marker: native_marker(&tok.text),
            content: tok.text[1..].to_owned(),
            span: tok.span,
        })
    }

    pub(super) fn parse_identifier(&mut self) -> Definition {
        let tok = self.advance();
        Definition::Identifier {
            name: tok.text.clone(),
            span: tok.span,
        }
    }

    /// `HEADER module, version, plan`, each field raw text.
    pub(super) fn parse_header(&mut self) -> Definition {
        let kw = self.bump().span;
        let (text, text_span) = self.take_rest_of_line();
        let mut header = Header {
            module: None,
            version: None,
            plan: None,
            span: kw,
        };
        if !text.is_empty() {
            let fields: Vec<&str> = text.split(',').map(str::trim).collect();
            if fields.len() != 3 {
                self.report(Diagnostic::structural(
                    text_span,
                    format!(
                        "HEADER takes `module, version, plan`, found {} field(s)",
                        fields.len()
                    ),
                ));
            }
            let field = |i: usize| {
                fields
                    .get(i)
                    .filter(|f| !f.is_empty())
                    .map(|f| (*f).to_owned())
            };
            header.module = field(0);
            header.version = field(1);
            header.plan = field(2);
        }
        header.span = self.span_from(kw);
        Definition::Header(header)
    }

    pub(super) fn parse_family(&mut self) -> Result<Definition, Diagnostic> {
        let kw = self.bump().span;
        let names = self.name_list("a family name")?;
        Ok(Definition::Family {
            names,
            span: self.span_from(kw),
        })
    }

    pub(super) fn parse_service_type(&mut self) -> Result<Definition, Diagnostic> {
        let kw = self.bump().span;
        let names = if self.on_same_line() {
            self.name_list("a service type")?
        } else {
            Vec::new()
        };
        Ok(Definition::ServiceType {
            names,
            span: self.span_from(kw),
        })
    }

    fn name_list(&mut self, what: &str) -> Result<Vec<String>, Diagnostic> {
        let mut names = vec![self.take_name(what)?.0];
        while self.on_same_line() && self.eat_punct(Punct::Comma).is_some() {
            names.push(self.take_name(what)?.0);
        }
        Ok(names)
    }

    /// `FORMAT field = spec`, spec kept raw.
    pub(super) fn parse_format(&mut self) -> Result<Definition, Diagnostic> {
        let kw = self.bump().span;
        let (field, _) = self.take_name("a field name after FORMAT")?;
        if !(self.on_same_line() && self.eat_punct(Punct::Assign).is_some()) {
            return Err(Diagnostic::structural(
                self.error_span(),
                format!("expected `=` after FORMAT {}", field),
            ));
        }
        let (format, _) = self.take_rest_of_line();
        Ok(Definition::Format {
            field,
            format,
            span: self.span_from(kw),
        })
    }

    /// `INCLUDE [CODE|PTU] path`, the path quoted or bare.
    pub(super) fn parse_include(&mut self) -> Result<Definition, Diagnostic> {
        let kw = self.bump().span;
        let mut kind = None;
        let tok = self.cur();
        // `INCLUDE code.c` names a file, not the CODE kind.
        let next = self.peek_at(1);
        let kind_word = self.on_same_line() && (next.line_start || next.span.start > tok.span.end);
        if kind_word {
            kind = match tok.keyword {
                Some(Keyword::Code) => Some(IncludeKind::Code),
                Some(Keyword::Ptu) => Some(IncludeKind::Ptu),
                _ => None,
            };
            if kind.is_some() {
                self.bump();
            }
        }

        let tok = self.cur();
        let path = if tok.kind == TokenKind::Str && !tok.line_start {
            self.advance();
            IncludePath {
                text: unescape(&tok.text),
                quoted: true,
            }
        } else {
            let (raw, raw_span) = self.take_rest_of_line();
            let len = raw
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || b"_./\\".contains(b))
                .count();
            if len == 0 {
                return Err(Diagnostic::structural(
                    if raw.is_empty() { kw } else { raw_span },
                    "INCLUDE requires a file path",
                ));
            }
            if len < raw.len() {
                let at = raw_span.start + len as u32;
                self.report(Diagnostic::structural(
                    Span::new(at, raw_span.end, raw_span.line),
                    "unexpected text after INCLUDE path",
                ));
            }
            IncludePath {
                text: raw[..len].to_owned(),
                quoted: false,
            }
        };
        Ok(Definition::Include(Include {
            kind,
            path,
            span: self.span_from(kw),
        }))
    }

    pub(super) fn parse_next_test(&mut self) -> Definition {
        let kw = self.bump().span;
        let loop_count = self.parse_loop_clause();
        Definition::NextTest {
            loop_count,
            span: self.span_from(kw),
        }
    }

    /// Optional `LOOP count` on the current line.
    pub(super) fn parse_loop_clause(&mut self) -> Option<String> {
        if !(self.on_same_line() && self.is_keyword(Keyword::Loop)) {
            return None;
        }
        let kw = self.bump().span;
        let (count, _) = self.take_rest_of_line();
        if count.is_empty() {
            self.report(Diagnostic::structural(kw, "LOOP requires an iteration count"));
        }
        Some(count)
    }

    /// `STUB [stub.]function calls`
    pub(super) fn parse_stub_declaration(&mut self) -> Result<Definition, Diagnostic> {
        let kw = self.bump().span;
        let (stub, function) = self.parse_stub_target()?;
        let (calls, _) = self.take_rest_of_line();
        Ok(Definition::StubDeclaration(StubDeclaration {
            stub,
            function,
            calls,
            span: self.span_from(kw),
        }))
    }

    /// `function` or `stub.function`
    pub(super) fn parse_stub_target(&mut self) -> Result<(Option<String>, String), Diagnostic> {
        let (first, _) = self.take_name("a stub name")?;
        if self.on_same_line() && self.is_punct(Punct::Dot) {
            self.bump();
            let (function, _) = self.take_name("a function name after `.`")?;
            return Ok((Some(first), function));
        }
        Ok((None, first))
    }

    /// `USE name[(arg, ...)]`
    pub(super) fn parse_use(&mut self) -> Result<Definition, Diagnostic> {
        let kw = self.bump().span;
        let (name, _) = self.take_name("a name after USE")?;
        let mut arguments = Vec::new();
        if self.on_same_line() && self.is_punct(Punct::LParen) {
            self.bump();
            loop {
                arguments.push(self.take_name("an argument name")?.0);
                if self.eat_punct(Punct::Comma).is_some() {
                    continue;
                }
                self.expect_punct(Punct::RParen)?;
                break;
            }
        }
        Ok(Definition::Use(Use {
            name,
            arguments,
            span: self.span_from(kw),
        }))
    }
}
