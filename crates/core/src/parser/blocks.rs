use super::Parser;
use crate::ast::{
    BlockKind, DefineStub, Definition, Element, Environment, IfElse, NativeBlock, Service, Simul,
    Span, Test,
};
use crate::error::{Diagnostic, ErrorKind};
use crate::lexer::{Keyword, Punct, TokenKind};
use tracing::debug;

impl<'a> Parser<'a> {
    // -- Block bookkeeping --------------------------------------

    /// Push a block opened by `opener`. False when the nesting limit is hit.
    fn open_block(&mut self, opener: Keyword, open: Span) -> bool {
        if self.descend(open).is_err() {
            return false;
        }
        self.open_blocks.push((opener, open));
        true
    }

    /// Consume the block's `END <opener>` and pop it. Returns the block's
    /// end offset.
    ///
    /// `END X` naming an enclosing block closes this one with a mismatch
    /// and is left for that block. Any other wrong or missing closer is
    /// consumed with a mismatch.
    fn close_block(&mut self, opener: Keyword, open: Span) -> u32 {
        let end = self.finish_block(opener, open);
        self.open_blocks.pop();
        self.ascend();
        end
    }

    fn finish_block(&mut self, opener: Keyword, open: Span) -> u32 {
        let tok = self.cur();
        if let Some(divider @ (Keyword::Else | Keyword::ElseSimul)) = tok.keyword {
            // Only reached when an enclosing IF/SIMUL owns the divider.
            self.report(
                Diagnostic::error(
                    ErrorKind::BlockMismatch,
                    tok.span,
                    format!(
                        "expected END {}, found {}",
                        opener.spelling(),
                        divider.spelling()
                    ),
                )
                .with_related(open),
            );
            return self.last_end.max(open.end);
        }
        if !tok.is_keyword(Keyword::End) {
            if self.fault.is_none() {
                self.report(
                    Diagnostic::error(
                        ErrorKind::MissingTerminator,
                        open,
                        format!(
                            "missing END {} for the block opened on line {}",
                            opener.spelling(),
                            open.line
                        ),
                    )
                    .with_related(open),
                );
            }
            return self.last_end.max(open.end);
        }

        let closer = self.peek_at(1);
        let closer = (closer.kind == TokenKind::Word && !closer.line_start).then_some(closer);
        let closer_kw = closer.and_then(|t| t.keyword);
        if closer_kw == Some(opener) {
            self.bump();
            return self.bump().span.end;
        }

        let found = match closer {
            Some(t) => format!("END {}", t.text),
            None => "END".to_owned(),
        };
        let mismatch_span = closer.map_or(tok.span, |t| tok.span.to(t.span));
        let mismatch = Diagnostic::error(
            ErrorKind::BlockMismatch,
            mismatch_span,
            format!("expected END {}, found {}", opener.spelling(), found),
        )
        .with_related(open);

        if closer_kw.is_some_and(|k| self.encloses(k)) {
            debug!(
                opener = opener.spelling(),
                line = tok.span.line,
                "closing block early for an enclosing END"
            );
            self.report(mismatch);
            return self.last_end.max(open.end);
        }

        self.bump();
        if closer.is_some() {
            self.bump();
        }
        self.report(mismatch);
        self.last_end
    }

    /// Children up to the block's END, then the END itself.
    fn parse_block_body(
        &mut self,
        opener: Keyword,
        open: Span,
        ctx: BlockKind,
    ) -> (Vec<Definition>, Span) {
        if !self.open_block(opener, open) {
            return (Vec::new(), open);
        }
        let children = self.parse_definitions(ctx, &[]);
        let end = self.close_block(opener, open);
        (children, Span::new(open.start, end, open.line))
    }

    /// A block header name; a missing one is reported and the rest of the
    /// header line dropped.
    fn header_name(&mut self, what: &str) -> String {
        match self.take_name(what) {
            Ok((name, _)) => name,
            Err(d) => {
                self.report(d);
                self.skip_line();
                String::new()
            }
        }
    }

    // -- Blocks -------------------------------------------------

    pub(super) fn parse_test(&mut self) -> Definition {
        let open = self.bump().span;
        let name = self.header_name("a test name");
        let loop_count = self.parse_loop_clause();
        let (children, span) = self.parse_block_body(Keyword::Test, open, BlockKind::Test);
        Definition::Test(Test {
            name,
            loop_count,
            children,
            span,
        })
    }

    pub(super) fn parse_element(&mut self) -> Definition {
        let open = self.bump().span;
        let (children, span) = self.parse_block_body(Keyword::Element, open, BlockKind::Element);
        Definition::Element(Element { children, span })
    }

    pub(super) fn parse_environment(&mut self) -> Definition {
        let open = self.bump().span;
        let name = self.header_name("an environment name");
        let mut parameters = Vec::new();
        if self.on_same_line() && self.is_punct(Punct::LParen) {
            if let Err(d) = self.parse_environment_parameters(&mut parameters) {
                self.report(d);
                self.skip_line();
            }
        }
        let (children, span) =
            self.parse_block_body(Keyword::Environment, open, BlockKind::Environment);
        Definition::Environment(Environment {
            name,
            parameters,
            children,
            span,
        })
    }

    fn parse_environment_parameters(&mut self, out: &mut Vec<String>) -> Result<(), Diagnostic> {
        self.bump();
        loop {
            out.push(self.take_name("a parameter name")?.0);
            if self.eat_punct(Punct::Comma).is_none() {
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;
        Ok(())
    }

    pub(super) fn parse_service(&mut self) -> Definition {
        let open = self.bump().span;
        let name = self.header_name("a service name");
        let (children, span) = self.parse_block_body(Keyword::Service, open, BlockKind::Service);
        Definition::Service(Service {
            name,
            children,
            span,
        })
    }

    pub(super) fn parse_native_block(&mut self, opener: Keyword) -> Definition {
        let open = self.bump().span;
        let ctx = if opener == Keyword::Initialization {
            BlockKind::Initialization
        } else {
            BlockKind::Termination
        };
        let (children, span) = self.parse_block_body(opener, open, ctx);
        let block = NativeBlock { children, span };
        if opener == Keyword::Initialization {
            Definition::Initialization(block)
        } else {
            Definition::Termination(block)
        }
    }

    /// `DEFINE STUB [stub.]function [dimension]` ... `END DEFINE`
    pub(super) fn parse_define_stub(&mut self) -> Result<Definition, Diagnostic> {
        let open = self.bump().span;
        if !(self.on_same_line() && self.is_keyword(Keyword::Stub)) {
            return Err(Diagnostic::structural(
                self.error_span(),
                format!("expected STUB after DEFINE, found {}", self.cur().describe()),
            ));
        }
        self.bump();
        let (stub, function) = match self.parse_stub_target() {
            Ok(target) => target,
            Err(d) => {
                self.report(d);
                self.skip_line();
                (None, String::new())
            }
        };
        let mut dimension = None;
        if self.on_same_line() && self.cur().kind == TokenKind::Number {
            let tok = self.advance();
            match tok.text.parse::<u32>() {
                Ok(n) => dimension = Some(n),
                Err(_) => self.report(Diagnostic::structural(
                    tok.span,
                    format!("stub dimension `{}` is not a whole number", tok.text),
                )),
            }
        }
        let (body, span) = self.parse_block_body(Keyword::Define, open, BlockKind::DefineStub);
        Ok(Definition::DefineStub(DefineStub {
            stub,
            function,
            dimension,
            body,
            span,
        }))
    }

    // -- Conditional blocks -------------------------------------

    /// `IF condition` ... [`ELSE` ...] `END IF`. Both branches take the
    /// children allowed by the enclosing block.
    pub(super) fn parse_if(&mut self, ctx: BlockKind) -> Definition {
        let open = self.bump().span;
        let (condition, _) = self.take_rest_of_line();
        if condition.is_empty() {
            self.report(Diagnostic::structural(open, "IF requires a condition"));
        }
        let (consequence, alternative, span) =
            self.parse_branches(Keyword::If, Keyword::Else, open, ctx);
        Definition::IfElse(IfElse {
            condition,
            consequence,
            alternative,
            span,
        })
    }

    /// `SIMUL` ... [`ELSE_SIMUL` ...] `END SIMUL`
    pub(super) fn parse_simul(&mut self, ctx: BlockKind) -> Definition {
        let open = self.bump().span;
        let (consequence, alternative, span) =
            self.parse_branches(Keyword::Simul, Keyword::ElseSimul, open, ctx);
        Definition::Simul(Simul {
            consequence,
            alternative,
            span,
        })
    }

    fn parse_branches(
        &mut self,
        opener: Keyword,
        divider: Keyword,
        open: Span,
        ctx: BlockKind,
    ) -> (Vec<Definition>, Option<Vec<Definition>>, Span) {
        if !self.open_block(opener, open) {
            return (Vec::new(), None, open);
        }
        let consequence = self.parse_definitions(ctx, &[divider]);
        let alternative = if self.eat_keyword(divider).is_some() {
            Some(self.parse_definitions(ctx, &[]))
        } else {
            None
        };
        let end = self.close_block(opener, open);
        (consequence, alternative, Span::new(open.start, end, open.line))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Definition, Span};
    use crate::error::{Diagnostic, ErrorKind};
    use crate::lexer;
    use crate::options::ParseOptions;
    use crate::parser::parse_tokens;
    use pretty_assertions::assert_eq;

    fn parse_src(src: &str) -> (Vec<Definition>, Vec<Diagnostic>) {
        let tokens = lexer::lex(src);
        let (tree, diags) = parse_tokens(src, &tokens, "b.ptu", &ParseOptions::default()).unwrap();
        (tree.definitions, diags)
    }

    fn codes(diags: &[Diagnostic]) -> Vec<ErrorKind> {
        diags.iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_block_with_loop_and_children() {
        let src = "TEST t1 LOOP 3\nFAMILY nominal\nEND TEST";
        let (defs, diags) = parse_src(src);
        assert!(diags.is_empty(), "{:?}", diags);
        let Definition::Test(test) = &defs[0] else {
            panic!("expected TEST");
        };
        assert_eq!(test.name, "t1");
        assert_eq!(test.loop_count.as_deref(), Some("3"));
        assert_eq!(test.children.len(), 1);
        assert_eq!(test.span, Span::new(0, src.len() as u32, 1));
    }

    #[test]
    fn else_of_an_enclosing_if_closes_the_inner_block() {
        let (defs, diags) = parse_src("TEST t\nIF a\nELEMENT\nELSE\nFAMILY f\nEND IF\nEND TEST");
        assert_eq!(codes(&diags), vec![ErrorKind::BlockMismatch]);
        assert_eq!(diags[0].message, "expected END ELEMENT, found ELSE");
        assert_eq!(diags[0].line, 4);
        let Definition::Test(test) = &defs[0] else {
            panic!("expected TEST");
        };
        let [Definition::IfElse(branch)] = &test.children[..] else {
            panic!("expected one IF, got {:?}", test.children);
        };
        let [Definition::Element(el)] = &branch.consequence[..] else {
            panic!("expected ELEMENT in the IF branch, got {:?}", branch.consequence);
        };
        assert!(el.children.is_empty());
        let alternative = branch.alternative.as_deref().expect("ELSE branch");
        assert!(matches!(alternative, [Definition::Family { .. }]));
    }

    #[test]
    fn else_simul_of_an_enclosing_simul_closes_the_inner_if() {
        let (defs, diags) = parse_src("SIMUL\nIF a\nELSE_SIMUL\n#x;\nEND SIMUL");
        assert_eq!(codes(&diags), vec![ErrorKind::BlockMismatch]);
        let Definition::Simul(simul) = &defs[0] else {
            panic!("expected SIMUL");
        };
        assert!(matches!(&simul.consequence[..], [Definition::IfElse(_)]));
        let alternative = simul.alternative.as_deref().expect("ELSE_SIMUL branch");
        assert!(matches!(alternative, [Definition::NativeCode(_)]));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let (defs, diags) = parse_src("test t1\nelement\nend element\nEnd Test");
        assert!(diags.is_empty(), "{:?}", diags);
        let Definition::Test(test) = &defs[0] else {
            panic!("expected TEST");
        };
        assert!(matches!(test.children[0], Definition::Element(_)));
    }

    #[test]
    fn end_naming_an_outer_block_closes_inner_early() {
        let (defs, diags) = parse_src("TEST t1\nELEMENT\nEND TEST");
        assert_eq!(codes(&diags), vec![ErrorKind::BlockMismatch]);
        assert_eq!(diags[0].line, 3);
        assert_eq!(diags[0].related, Some(Span::new(8, 15, 2)));
        let Definition::Test(test) = &defs[0] else {
            panic!("expected TEST");
        };
        assert!(matches!(test.children[0], Definition::Element(_)));
        assert_eq!(defs.len(), 1);
    }

    #[test]
    fn wrong_end_is_consumed() {
        let (defs, diags) = parse_src("ELEMENT\nEND SERVICE\nBEGIN");
        assert_eq!(codes(&diags), vec![ErrorKind::BlockMismatch]);
        assert!(diags[0].message.contains("expected END ELEMENT, found END SERVICE"));
        assert_eq!(defs.len(), 2);
        assert!(matches!(defs[1], Definition::Begin { .. }));
    }

    #[test]
    fn missing_end_at_eof() {
        let (defs, diags) = parse_src("TEST t1\nBEGIN");
        assert_eq!(codes(&diags), vec![ErrorKind::StructuralError, ErrorKind::MissingTerminator]);
        assert!(diags[0].message.contains("BEGIN is not allowed in TEST"));
        assert_eq!(diags[1].span, Span::new(0, 4, 1));
        assert!(matches!(defs[0], Definition::Test(_)));
    }

    #[test]
    fn if_else_branches_inherit_context() {
        let src = "ELEMENT\nIF x > 0\nVAR a, INIT = 1, EV = 1\nELSE\nname\nEND IF\nEND ELEMENT";
        let (defs, diags) = parse_src(src);
        assert!(diags.is_empty(), "{:?}", diags);
        let Definition::Element(el) = &defs[0] else {
            panic!("expected ELEMENT");
        };
        let Definition::IfElse(branch) = &el.children[0] else {
            panic!("expected IF");
        };
        assert_eq!(branch.condition, "x > 0");
        assert!(matches!(branch.consequence[0], Definition::Var(_)));
        let alternative = branch.alternative.as_ref().expect("ELSE branch");
        assert!(matches!(&alternative[0], Definition::Identifier { name, .. } if name == "name"));
    }

    #[test]
    fn simul_with_else_simul() {
        let (defs, diags) = parse_src("SIMUL\n#a();\nELSE_SIMUL\n#b();\nEND SIMUL");
        assert!(diags.is_empty(), "{:?}", diags);
        let Definition::Simul(simul) = &defs[0] else {
            panic!("expected SIMUL");
        };
        assert_eq!(simul.consequence.len(), 1);
        assert_eq!(simul.alternative.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn if_without_condition() {
        let (_, diags) = parse_src("IF\nEND IF");
        assert_eq!(codes(&diags), vec![ErrorKind::StructuralError]);
        assert_eq!(diags[0].message, "IF requires a condition");
    }

    #[test]
    fn environment_with_parameters() {
        let (defs, diags) = parse_src("ENVIRONMENT env(a, b)\nx\nEND ENVIRONMENT");
        assert!(diags.is_empty(), "{:?}", diags);
        let Definition::Environment(env) = &defs[0] else {
            panic!("expected ENVIRONMENT");
        };
        assert_eq!(env.name, "env");
        assert_eq!(env.parameters, ["a", "b"]);
        assert!(matches!(&env.children[0], Definition::Identifier { .. }));
    }

    #[test]
    fn native_blocks_reject_comments() {
        let (defs, diags) = parse_src("INITIALIZATION\n#init();\nCOMMENT no\nEND INITIALIZATION");
        assert_eq!(codes(&diags), vec![ErrorKind::StructuralError]);
        let Definition::Initialization(block) = &defs[0] else {
            panic!("expected INITIALIZATION");
        };
        assert_eq!(block.children.len(), 2);
    }

    #[test]
    fn define_stub_header() {
        let (defs, diags) = parse_src("DEFINE STUB lib.open 3\n#int open(_in fd, _out buf);\nEND DEFINE");
        assert!(diags.is_empty(), "{:?}", diags);
        let Definition::DefineStub(stub) = &defs[0] else {
            panic!("expected DEFINE STUB");
        };
        assert_eq!(stub.stub.as_deref(), Some("lib"));
        assert_eq!(stub.function, "open");
        assert_eq!(stub.dimension, Some(3));
        assert!(matches!(stub.body[0], Definition::StubCode(_)));
    }

    #[test]
    fn define_without_stub_is_an_error() {
        let (defs, diags) = parse_src("DEFINE lib\nBEGIN");
        assert_eq!(codes(&diags), vec![ErrorKind::StructuralError]);
        assert!(matches!(defs[0], Definition::Error { .. }));
        assert!(matches!(defs[1], Definition::Begin { .. }));
    }

    #[test]
    fn test_without_name_keeps_its_body() {
        let (defs, diags) = parse_src("TEST\nFAMILY f\nEND TEST");
        assert_eq!(codes(&diags), vec![ErrorKind::StructuralError]);
        let Definition::Test(test) = &defs[0] else {
            panic!("expected TEST");
        };
        assert_eq!(test.name, "");
        assert_eq!(test.children.len(), 1);
    }
}
