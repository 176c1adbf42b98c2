use super::constructs::native_marker;
use super::Parser;
use crate::ast::{Definition, Expression, ParamMode, Span, StubCallSignature, StubCode, StubParameter};
use crate::error::{Diagnostic, ExprError};
use crate::lexer::{lex_fragment, Punct, Token, TokenKind};

/// `tokens` followed by an end-of-input token at `at`.
fn with_eof(tokens: &[Token], at: Span) -> Vec<Token> {
    let mut out = tokens.to_vec();
    out.push(Token {
        kind: TokenKind::Eof,
        keyword: None,
        text: String::new(),
        span: Span::new(at.start, at.start, at.line),
        line_start: false,
        lex_error: None,
    });
    out
}

impl<'a> Parser<'a> {
    /// A `#`/`@` line inside DEFINE STUB, read as a call signature.
    pub(super) fn parse_stub_code(&mut self) -> Result<Definition, Diagnostic> {
        let tok = self.bump();
        let marker = native_marker(&tok.text);
        let body_span = Span::new(tok.span.start + 1, tok.span.end, tok.span.line);
        let tokens = lex_fragment(&tok.text[1..], body_span.start, body_span.line);
        let signature = self.sub_parse(&tokens, |p| p.parse_stub_signature(body_span))?;
        Ok(Definition::StubCode(StubCode {
            marker,
            signature,
            span: tok.span,
        }))
    }

    /// `[type] function ( [mode] value, ... ) [;]` over a fragment parser.
    fn parse_stub_signature(&mut self, whole: Span) -> Result<StubCallSignature, Diagnostic> {
        let tokens = self.tokens;

        // The parameter list is the last top-level parenthesized group.
        let mut depth = 0usize;
        let mut open = None;
        let mut close = None;
        for (i, t) in tokens.iter().enumerate() {
            match t.kind {
                TokenKind::Punct(Punct::LParen) => {
                    if depth == 0 {
                        open = Some(i);
                        close = None;
                    }
                    depth += 1;
                }
                TokenKind::Punct(Punct::RParen) if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                    }
                }
                _ => {}
            }
        }
        let Some(open) = open else {
            return Err(Diagnostic::structural(
                whole,
                "stub signature needs a parameter list",
            ));
        };
        let Some(close) = close else {
            return Err(ExprError::new(
                tokens[open].span,
                "unmatched bracket: expected `)`, found end of line",
            )
            .into());
        };

        let mut trailing = tokens[close + 1..].iter().filter(|t| t.kind != TokenKind::Eof);
        if let Some(first) = trailing.next() {
            let extra = !first.is_punct(Punct::Semi) || trailing.next().is_some();
            if extra {
                let t = tokens[close + 1..]
                    .iter()
                    .find(|t| !t.is_punct(Punct::Semi))
                    .unwrap_or(first);
                return Err(Diagnostic::structural(
                    t.span,
                    format!("unexpected {} after stub parameter list", t.describe()),
                ));
            }
        }

        let head = with_eof(&tokens[..open], tokens[open].span);
        let (return_type, function) = self.sub_parse(&head, |p| p.parse_signature_head(whole))?;

        let mut parameters = Vec::new();
        for segment in split_parameters(&tokens[open + 1..close], tokens[close].span) {
            parameters.push(self.sub_parse(&segment, |p| p.parse_stub_parameter())?);
        }

        Ok(StubCallSignature {
            return_type,
            function,
            parameters,
            span: whole,
        })
    }

    fn parse_signature_head(
        &mut self,
        whole: Span,
    ) -> Result<(Option<Expression>, Expression), Diagnostic> {
        if self.at_eof() {
            return Err(Diagnostic::structural(
                whole,
                "stub signature is missing a function name",
            ));
        }
        let first = self.parse_expression()?;
        if self.at_eof() {
            return Ok((None, first));
        }
        let function = self.parse_expression()?;
        if !self.at_eof() {
            return Err(ExprError::new(
                self.cur().span,
                format!("unexpected {} in stub signature", self.cur().describe()),
            )
            .into());
        }
        Ok((Some(first), function))
    }

    fn parse_stub_parameter(&mut self) -> Result<StubParameter, Diagnostic> {
        let tok = self.cur();
        let mut mode = ParamMode::default();
        if tok.kind == TokenKind::Word && self.peek_at(1).kind != TokenKind::Eof {
            if let Some(m) = ParamMode::from_marker(&tok.text) {
                self.bump();
                mode = m;
            }
        }
        let value = self.parse_expression()?;
        if !self.at_eof() {
            return Err(ExprError::new(
                self.cur().span,
                format!("unexpected {} in stub parameter", self.cur().describe()),
            )
            .into());
        }
        Ok(StubParameter { mode, value })
    }
}

/// Split a parameter list on top-level commas. Each piece gets its own
/// end-of-input token.
fn split_parameters(inner: &[Token], close: Span) -> Vec<Vec<Token>> {
    if inner.is_empty() {
        return Vec::new();
    }
    let mut segments = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, t) in inner.iter().enumerate() {
        match t.kind {
            TokenKind::Punct(Punct::LParen | Punct::LBracket | Punct::LBrace) => depth += 1,
            TokenKind::Punct(Punct::RParen | Punct::RBracket | Punct::RBrace) => depth -= 1,
            TokenKind::Punct(Punct::Comma) if depth == 0 => {
                segments.push(with_eof(&inner[start..i], t.span));
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(with_eof(&inner[start..], close));
    segments
}

#[cfg(test)]
mod tests {
    use crate::ast::{Definition, Expression, NativeMarker, ParamMode, StubCode};
    use crate::error::{Diagnostic, ErrorKind};
    use crate::lexer;
    use crate::options::ParseOptions;
    use crate::parser::parse_tokens;
    use pretty_assertions::assert_eq;

    fn stub_lines(body: &str) -> (Vec<Definition>, Vec<Diagnostic>) {
        let src = format!("DEFINE STUB s.f\n{}\nEND DEFINE", body);
        let tokens = lexer::lex(&src);
        let (tree, diags) = parse_tokens(&src, &tokens, "s.ptu", &ParseOptions::default()).unwrap();
        let Some(Definition::DefineStub(stub)) = tree.definitions.into_iter().next() else {
            panic!("expected DEFINE STUB");
        };
        (stub.body, diags)
    }

    fn signature(line: &str) -> StubCode {
        let (body, diags) = stub_lines(line);
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        match body.into_iter().next() {
            Some(Definition::StubCode(code)) => code,
            other => panic!("expected a stub signature, got {:?}", other),
        }
    }

    fn name(e: &Expression) -> &str {
        match e {
            Expression::Identifier { name, .. } => name,
            other => panic!("expected identifier, got {:?}", other),
        }
    }

    #[test]
    fn typed_signature_with_default_mode() {
        let code = signature("#int f(x)");
        assert_eq!(code.marker, NativeMarker::Hash);
        let sig = code.signature;
        assert_eq!(sig.return_type.as_ref().map(name), Some("int"));
        assert_eq!(name(&sig.function), "f");
        assert_eq!(sig.parameters.len(), 1);
        assert_eq!(sig.parameters[0].mode, ParamMode::In);
        assert_eq!(name(&sig.parameters[0].value), "x");
    }

    #[test]
    fn untyped_signature_with_modes_and_semicolon() {
        let sig = signature("@f(_out a, _inout b[2], _no c, _in 3);").signature;
        assert!(sig.return_type.is_none());
        let modes: Vec<ParamMode> = sig.parameters.iter().map(|p| p.mode).collect();
        assert_eq!(
            modes,
            vec![ParamMode::Out, ParamMode::InOut, ParamMode::No, ParamMode::In]
        );
        assert!(matches!(sig.parameters[1].value, Expression::Subscript { .. }));
    }

    #[test]
    fn marker_alone_is_a_value() {
        let sig = signature("#f(_out)").signature;
        assert_eq!(sig.parameters[0].mode, ParamMode::In);
        assert_eq!(name(&sig.parameters[0].value), "_out");
    }

    #[test]
    fn upper_case_marker_is_not_a_mode() {
        let (body, diags) = stub_lines("#f(_IN x)");
        assert!(matches!(body[0], Definition::Error { .. }));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("in stub parameter"), "{}", diags[0].message);
    }

    #[test]
    fn nested_calls_in_parameters() {
        let sig = signature("#int f(g(a, b), c)").signature;
        assert_eq!(sig.parameters.len(), 2);
        assert!(matches!(sig.parameters[0].value, Expression::Call { .. }));
    }

    #[test]
    fn no_parameters() {
        let sig = signature("#void f()").signature;
        assert!(sig.parameters.is_empty());
    }

    #[test]
    fn spans_are_absolute() {
        let code = signature("#int f(x)");
        // "DEFINE STUB s.f\n" is 16 bytes
        assert_eq!(code.span.start, 16);
        assert_eq!(code.signature.span.start, 17);
        assert_eq!(code.signature.function.span().start, 21);
        assert_eq!(code.signature.function.span().line, 2);
    }

    #[test]
    fn missing_parameter_list() {
        let (body, diags) = stub_lines("#int f");
        assert!(matches!(body[0], Definition::Error { .. }));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "stub signature needs a parameter list");
    }

    #[test]
    fn unclosed_parameter_list() {
        let (_, diags) = stub_lines("#int f(x");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, ErrorKind::ExpressionError);
        assert_eq!(diags[0].span.start, 22);
    }

    #[test]
    fn text_after_parameter_list() {
        let (_, diags) = stub_lines("#int f(x) extra");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("`extra`"));
    }

    #[test]
    fn empty_parameter_is_an_expression_error() {
        let (_, diags) = stub_lines("#f(a,)");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, ErrorKind::ExpressionError);
    }

    #[test]
    fn comments_and_conditions_in_body() {
        let (body, diags) = stub_lines("COMMENT c\nIF x\n#f(a)\nELSE\n#f(b)\nEND IF");
        assert!(diags.is_empty(), "{:?}", diags);
        assert!(matches!(body[0], Definition::Comment { .. }));
        let Definition::IfElse(branch) = &body[1] else {
            panic!("expected IF");
        };
        assert!(matches!(branch.consequence[0], Definition::StubCode(_)));
    }
}
