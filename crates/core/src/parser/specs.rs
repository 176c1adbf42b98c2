use super::Parser;
use crate::ast::{Definition, ExpectedSpec, Expression, InitSpec, Sweep, VarForm, VarInstruction, VarKind};
use crate::error::{Diagnostic, ExprError};
use crate::lexer::{Keyword, Punct};

impl<'a> Parser<'a> {
    // -- VAR / ARRAY / STR --------------------------------------

    /// `VAR variable, INIT ..., EV ...`, falling back to the two-field forms
    /// when the three-field one does not fit.
    pub(super) fn parse_var(&mut self) -> Result<Definition, Diagnostic> {
        let kw = self.bump();
        let kind = match kw.keyword {
            Some(Keyword::Array) => VarKind::Array,
            Some(Keyword::Str) => VarKind::Str,
            _ => VarKind::Var,
        };
        if !self.on_same_line() {
            return Err(Diagnostic::structural(
                kw.span,
                format!("{} requires a variable", kind.keyword()),
            ));
        }

        let start = self.checkpoint();
        let form = match self.parse_var_triplet() {
            Ok(form) => form,
            Err(triplet_err) => {
                let triplet_reach = self.pos;
                self.rewind(start);
                match self.parse_var_doublet() {
                    Ok(form) => form,
                    // Report whichever attempt got further.
                    Err(doublet_err) if self.pos >= triplet_reach => return Err(doublet_err),
                    Err(_) => {
                        // Replay the three-field attempt so its diagnostics
                        // and cursor position are the ones kept.
                        self.rewind(start);
                        return Err(match self.parse_var_triplet() {
                            Err(e) => e,
                            Ok(_) => triplet_err,
                        });
                    }
                }
            }
        };
        Ok(Definition::Var(VarInstruction {
            kind,
            form,
            span: self.span_from(kw.span),
        }))
    }

    fn parse_var_triplet(&mut self) -> Result<VarForm, Diagnostic> {
        let variable = self.parse_expression()?;
        self.expect_punct(Punct::Comma)?;
        if !self.is_keyword(Keyword::Init) {
            return Err(Diagnostic::structural(
                self.error_span(),
                format!("expected INIT, found {}", self.cur().describe()),
            ));
        }
        let init = self.parse_init_spec()?;
        self.expect_punct(Punct::Comma)?;
        let expected = self.parse_expected_spec()?;
        Ok(VarForm::Triplet {
            variable,
            init,
            expected,
        })
    }

    fn parse_var_doublet(&mut self) -> Result<VarForm, Diagnostic> {
        let variable = self.parse_expression()?;
        self.expect_punct(Punct::Comma)?;
        if self.is_keyword(Keyword::Ev) || self.is_keyword(Keyword::Min) {
            let expected = self.parse_expected_spec()?;
            return Ok(VarForm::Checked { variable, expected });
        }
        if self.is_keyword(Keyword::Init) {
            return Err(Diagnostic::structural(
                self.cur().span,
                "INIT needs an expected value after it",
            ));
        }
        let expected = self.parse_expression()?;
        Ok(VarForm::Doublet {
            expression: variable,
            expected,
        })
    }

    fn parse_braced_list(&mut self) -> Result<Vec<Expression>, ExprError> {
        let open = self.expect_punct(Punct::LBrace)?;
        self.parse_expression_list(Punct::RBrace, open, false)
    }

    // -- INIT ---------------------------------------------------

    fn parse_init_spec(&mut self) -> Result<InitSpec, Diagnostic> {
        let init = self.bump().span;
        let tok = self.cur();

        if tok.is_punct(Punct::Assign) {
            self.bump();
            let value = self.parse_expression()?;
            return Ok(InitSpec::Expression {
                value,
                span: self.span_from(init),
            });
        }
        if tok.is_punct(Punct::EqEq) {
            self.bump();
            return Ok(InitSpec::ReferenceCopy {
                span: self.span_from(init),
            });
        }
        if tok.is_keyword(Keyword::In) {
            self.bump();
            let values = self.parse_braced_list()?;
            return Ok(InitSpec::InSet {
                values,
                span: self.span_from(init),
            });
        }
        if tok.is_punct(Punct::LParen) {
            let open = self.bump().span;
            let variables = self.parse_expression_list(Punct::RParen, open, false)?;
            self.expect_keyword(Keyword::With)?;
            let values = self.parse_braced_list()?;
            return Ok(InitSpec::PairedWith {
                variables,
                values,
                span: self.span_from(init),
            });
        }
        if tok.is_keyword(Keyword::From) {
            self.bump();
            let from = self.parse_expression()?;
            self.expect_keyword(Keyword::To)?;
            let to = self.parse_expression()?;
            let sweep = if self.eat_keyword(Keyword::Step).is_some() {
                Some(Sweep::Step {
                    step: self.parse_expression()?,
                })
            } else if self.eat_keyword(Keyword::NbTimes).is_some() {
                Some(Sweep::Count {
                    count: self.parse_expression()?,
                })
            } else if self.eat_keyword(Keyword::NbRandom).is_some() {
                let count = self.parse_expression()?;
                let bounds = self.eat_keyword(Keyword::Bounds).is_some();
                Some(Sweep::Random { count, bounds })
            } else {
                None
            };
            return Ok(InitSpec::RangeSweep {
                from,
                to,
                sweep,
                span: self.span_from(init),
            });
        }
        Err(Diagnostic::structural(
            self.error_span(),
            format!(
                "expected `=`, `==`, IN, FROM or `(` after INIT, found {}",
                tok.describe()
            ),
        ))
    }

    // -- EV / MIN -----------------------------------------------

    fn parse_expected_spec(&mut self) -> Result<ExpectedSpec, Diagnostic> {
        if let Some(min_kw) = self.eat_keyword(Keyword::Min) {
            self.expect_punct(Punct::Assign)?;
            let min = self.parse_expression()?;
            self.expect_punct(Punct::Comma)?;
            self.expect_keyword(Keyword::Max)?;
            self.expect_punct(Punct::Assign)?;
            let max = self.parse_expression()?;
            return Ok(ExpectedSpec::MinMax {
                min,
                max,
                span: self.span_from(min_kw),
            });
        }
        let Some(ev) = self.eat_keyword(Keyword::Ev) else {
            return Err(Diagnostic::structural(
                self.error_span(),
                format!("expected EV or MIN, found {}", self.cur().describe()),
            ));
        };
        let tok = self.cur();

        if tok.is_punct(Punct::Assign) {
            self.bump();
            let value = self.parse_expression()?;
            if !(self.is_punct(Punct::Comma) && self.peek_at(1).is_keyword(Keyword::Delta)) {
                return Ok(ExpectedSpec::ExactValue {
                    value,
                    span: self.span_from(ev),
                });
            }
            self.bump();
            self.bump();
            self.expect_punct(Punct::Assign)?;
            let mut delta = self.parse_expression()?;
            let mut percent = self.eat_punct(Punct::Percent).is_some();
            if let Expression::Number { text, .. } = &mut delta {
                if text.ends_with('%') {
                    text.pop();
                    percent = true;
                }
            }
            return Ok(ExpectedSpec::ValueWithDelta {
                value,
                delta,
                percent,
                span: self.span_from(ev),
            });
        }
        if tok.is_punct(Punct::EqEq) {
            self.bump();
            return Ok(ExpectedSpec::ReferenceCheck {
                span: self.span_from(ev),
            });
        }
        if tok.is_keyword(Keyword::In) {
            self.bump();
            let values = self.parse_braced_list()?;
            return Ok(ExpectedSpec::InSet {
                values,
                span: self.span_from(ev),
            });
        }
        if tok.is_punct(Punct::LParen) {
            let open = self.bump().span;
            let variable = self.parse_expression()?;
            if self.eat_punct(Punct::RParen).is_none() {
                return Err(ExprError::new(
                    open,
                    format!(
                        "unmatched bracket: expected `)`, found {}",
                        self.cur().describe()
                    ),
                )
                .into());
            }
            self.expect_keyword(Keyword::In)?;
            let values = self.parse_braced_list()?;
            return Ok(ExpectedSpec::IndirectInSet {
                variable,
                values,
                span: self.span_from(ev),
            });
        }
        Err(Diagnostic::structural(
            self.error_span(),
            format!(
                "expected `=`, `==`, IN or `(` after EV, found {}",
                tok.describe()
            ),
        ))
    }
}
