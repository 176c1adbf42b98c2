//! Canonical PTUScript output.
//!
//! [`render`] writes a tree back as source: upper-case keywords, one
//! definition per line, two spaces of indentation per block level, and
//! value expressions on a single line. Error placeholders are skipped.
//! Parsing the output gives a tree that renders to the same text.

use crate::ast::{
    Definition, ExpectedSpec, Expression, IncludeKind, InitSpec, ParamMode, SourceFile,
    StubCallSignature, Sweep, VarForm, VarInstruction,
};
use crate::lexer::escape;
use std::fmt;

// ──────────────────────────────────────────────
// Expressions and specs
// ──────────────────────────────────────────────

struct Comma<'e>(&'e [Expression]);

impl fmt::Display for Comma<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier { name, .. } => f.write_str(name),
            Expression::Number { text, .. } => f.write_str(text),
            Expression::String { raw, .. } | Expression::CharLiteral { raw, .. } => f.write_str(raw),
            Expression::Parenthesized { inner, .. } => write!(f, "({})", inner),
            Expression::Call {
                function,
                arguments,
                ..
            } => write!(f, "{}({})", function, Comma(arguments)),
            Expression::Subscript {
                argument, index, ..
            } => write!(f, "{}[{}]", argument, index),
            Expression::FieldAccess {
                argument,
                field,
                arrow,
                ..
            } => {
                let access = match (&**argument, *arrow) {
                    (_, true) => "->",
                    // `1 .y`, not `1.y`
                    (Expression::Number { .. }, false) => " .",
                    _ => ".",
                };
                write!(f, "{}{}{}", argument, access, field)
            }
            Expression::Unary { op, operand, .. } => {
                // `- -x`, not `--x`
                let gap = if matches!(**operand, Expression::Unary { .. }) { " " } else { "" };
                write!(f, "{}{}{}", op.symbol(), gap, operand)
            }
            Expression::Binary {
                op, left, right, ..
            } => write!(f, "{} {} {}", left, op.symbol(), right),
            Expression::Assignment {
                op, target, value, ..
            } => write!(f, "{} {} {}", target, op.symbol(), value),
            Expression::Range { start, end, .. } => write!(f, "{} .. {}", start, end),
        }
    }
}

impl fmt::Display for InitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitSpec::Expression { value, .. } => write!(f, "INIT = {}", value),
            InitSpec::InSet { values, .. } => write!(f, "INIT IN {{{}}}", Comma(values)),
            InitSpec::PairedWith {
                variables, values, ..
            } => write!(
                f,
                "INIT ({}) WITH {{{}}}",
                Comma(variables),
                Comma(values)
            ),
            InitSpec::RangeSweep {
                from, to, sweep, ..
            } => {
                write!(f, "INIT FROM {} TO {}", from, to)?;
                match sweep {
                    Some(Sweep::Step { step }) => write!(f, " STEP {}", step),
                    Some(Sweep::Count { count }) => write!(f, " NB_TIMES {}", count),
                    Some(Sweep::Random { count, bounds }) => {
                        write!(f, " NB_RANDOM {}", count)?;
                        if *bounds {
                            f.write_str(" BOUNDS")?;
                        }
                        Ok(())
                    }
                    None => Ok(()),
                }
            }
            InitSpec::ReferenceCopy { .. } => f.write_str("INIT =="),
        }
    }
}

impl fmt::Display for ExpectedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedSpec::ExactValue { value, .. } => write!(f, "EV = {}", value),
            ExpectedSpec::ValueWithDelta {
                value,
                delta,
                percent,
                ..
            } => {
                write!(f, "EV = {}, DELTA = {}", value, delta)?;
                if *percent {
                    f.write_str(" %")?;
                }
                Ok(())
            }
            ExpectedSpec::MinMax { min, max, .. } => write!(f, "MIN = {}, MAX = {}", min, max),
            ExpectedSpec::InSet { values, .. } => write!(f, "EV IN {{{}}}", Comma(values)),
            ExpectedSpec::IndirectInSet {
                variable, values, ..
            } => write!(f, "EV ({}) IN {{{}}}", variable, Comma(values)),
            ExpectedSpec::ReferenceCheck { .. } => f.write_str("EV =="),
        }
    }
}

impl fmt::Display for VarInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kw = self.kind.keyword();
        match &self.form {
            VarForm::Triplet {
                variable,
                init,
                expected,
            } => write!(f, "{} {}, {}, {}", kw, variable, init, expected),
            VarForm::Checked { variable, expected } => {
                write!(f, "{} {}, {}", kw, variable, expected)
            }
            VarForm::Doublet {
                expression,
                expected,
            } => write!(f, "{} {}, {}", kw, expression, expected),
        }
    }
}

impl fmt::Display for StubCallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ty) = &self.return_type {
            write!(f, "{} ", ty)?;
        }
        write!(f, "{}(", self.function)?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if p.mode != ParamMode::In {
                write!(f, "{} ", p.mode.marker())?;
            }
            write!(f, "{}", p.value)?;
        }
        f.write_str(")")
    }
}

// ──────────────────────────────────────────────
// Definitions
// ──────────────────────────────────────────────

/// Render a parsed source unit as canonical PTUScript.
pub fn render(file: &SourceFile) -> String {
    let mut r = Renderer { out: String::new() };
    r.definitions(&file.definitions, 0);
    r.out
}

struct Renderer {
    out: String,
}

fn stub_target(stub: &Option<String>, function: &str) -> String {
    match stub {
        Some(stub) => format!("{}.{}", stub, function),
        None => function.to_owned(),
    }
}

fn with_loop(head: String, loop_count: &Option<String>) -> String {
    match loop_count {
        Some(count) => format!("{} LOOP {}", head, count),
        None => head,
    }
}

impl Renderer {
    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text.trim_end());
        self.out.push('\n');
    }

    fn definitions(&mut self, defs: &[Definition], depth: usize) {
        for d in defs {
            self.definition(d, depth);
        }
    }

    fn block(&mut self, depth: usize, head: &str, children: &[Definition], close: &str) {
        self.line(depth, head);
        self.definitions(children, depth + 1);
        self.line(depth, &format!("END {}", close));
    }

    fn definition(&mut self, d: &Definition, depth: usize) {
        match d {
            Definition::Begin { .. } => self.line(depth, "BEGIN"),
            Definition::Comment { text, .. } => self.line(depth, &format!("COMMENT {}", text)),
            Definition::OtherComment { marker, text, .. } => {
                self.line(depth, &format!("{}{}", marker.as_str(), text))
            }
            Definition::Header(h) => {
                let fields = [&h.module, &h.version, &h.plan];
                let text = if fields.iter().all(|f| f.is_none()) {
                    "HEADER".to_owned()
                } else {
                    let parts: Vec<&str> = fields.iter().map(|f| f.as_deref().unwrap_or("")).collect();
                    format!("HEADER {}", parts.join(", "))
                };
                self.line(depth, &text)
            }
            Definition::DefineStub(s) => {
                let mut head = format!("DEFINE STUB {}", stub_target(&s.stub, &s.function));
                if let Some(dim) = s.dimension {
                    head.push_str(&format!(" {}", dim));
                }
                self.block(depth, &head, &s.body, "DEFINE")
            }
            Definition::Element(e) => self.block(depth, "ELEMENT", &e.children, "ELEMENT"),
            Definition::Environment(e) => {
                let mut head = format!("ENVIRONMENT {}", e.name);
                if !e.parameters.is_empty() {
                    head.push_str(&format!("({})", e.parameters.join(", ")));
                }
                self.block(depth, &head, &e.children, "ENVIRONMENT")
            }
            Definition::Family { names, .. } => {
                self.line(depth, &format!("FAMILY {}", names.join(", ")))
            }
            Definition::Format { field, format, .. } => {
                self.line(depth, &format!("FORMAT {} = {}", field, format))
            }
            Definition::IfElse(b) => {
                self.line(depth, &format!("IF {}", b.condition));
                self.definitions(&b.consequence, depth + 1);
                if let Some(alt) = &b.alternative {
                    self.line(depth, "ELSE");
                    self.definitions(alt, depth + 1);
                }
                self.line(depth, "END IF")
            }
            Definition::Include(i) => {
                let kind = match i.kind {
                    Some(IncludeKind::Code) => "CODE ",
                    Some(IncludeKind::Ptu) => "PTU ",
                    None => "",
                };
                let path = if i.path.quoted {
                    escape(&i.path.text)
                } else {
                    i.path.text.clone()
                };
                self.line(depth, &format!("INCLUDE {}{}", kind, path))
            }
            Definition::Initialization(b) => {
                self.block(depth, "INITIALIZATION", &b.children, "INITIALIZATION")
            }
            Definition::Termination(b) => {
                self.block(depth, "TERMINATION", &b.children, "TERMINATION")
            }
            Definition::NextTest { loop_count, .. } => {
                self.line(depth, &with_loop("NEXT_TEST".to_owned(), loop_count))
            }
            Definition::Service(s) => {
                self.block(depth, &format!("SERVICE {}", s.name), &s.children, "SERVICE")
            }
            Definition::ServiceType { names, .. } => {
                self.line(depth, &format!("SERVICE_TYPE {}", names.join(", ")))
            }
            Definition::Simul(s) => {
                self.line(depth, "SIMUL");
                self.definitions(&s.consequence, depth + 1);
                if let Some(alt) = &s.alternative {
                    self.line(depth, "ELSE_SIMUL");
                    self.definitions(alt, depth + 1);
                }
                self.line(depth, "END SIMUL")
            }
            Definition::StubDeclaration(s) => self.line(
                depth,
                &format!("STUB {} {}", stub_target(&s.stub, &s.function), s.calls),
            ),
            Definition::StubCode(s) => {
                self.line(depth, &format!("{}{}", s.marker.as_str(), s.signature))
            }
            Definition::Test(t) => {
                let head = with_loop(format!("TEST {}", t.name), &t.loop_count);
                self.block(depth, &head, &t.children, "TEST")
            }
            Definition::Use(u) => {
                let mut text = format!("USE {}", u.name);
                if !u.arguments.is_empty() {
                    text.push_str(&format!("({})", u.arguments.join(", ")));
                }
                self.line(depth, &text)
            }
            Definition::Var(v) => self.line(depth, &v.to_string()),
            Definition::NativeCode(n) => {
                self.line(depth, &format!("{}{}", n.marker.as_str(), n.content))
            }
            Definition::Identifier { name, .. } => self.line(depth, name),
            Definition::Error { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use pretty_assertions::assert_eq;

    fn round(src: &str) -> String {
        let parsed = parse(src, "r.ptu").unwrap();
        assert!(
            parsed.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            parsed.diagnostics
        );
        render(&parsed.tree)
    }

    #[test]
    fn keywords_are_upper_cased_and_blocks_indented() {
        let src = "test t1 loop 2\nelement\nvar x, init = 1, ev = 2\nend element\nend test\n";
        assert_eq!(
            round(src),
            "TEST t1 LOOP 2\n  ELEMENT\n    VAR x, INIT = 1, EV = 2\n  END ELEMENT\nEND TEST\n"
        );
    }

    #[test]
    fn field_of_a_number_keeps_its_gap() {
        let first = round("VAR v, INIT = 1 .y, EV = s.f");
        assert_eq!(first, "VAR v, INIT = 1 .y, EV = s.f\n");
        assert_eq!(round(&first), first);
    }

    #[test]
    fn percent_tolerance_does_not_absorb_the_next_line() {
        let src = "ELEMENT\nVAR x, INIT = 1, EV = 10, DELTA = 5%\nabc\nEND ELEMENT\n";
        let first = round(src);
        assert_eq!(
            first,
            "ELEMENT\n  VAR x, INIT = 1, EV = 10, DELTA = 5 %\n  abc\nEND ELEMENT\n"
        );
        assert_eq!(round(&first), first);
    }

    #[test]
    fn multi_line_var_is_joined() {
        assert_eq!(
            round("ARRAY t,\n  INIT IN {1,2},\n  MIN = 0, MAX = 9"),
            "ARRAY t, INIT IN {1, 2}, MIN = 0, MAX = 9\n"
        );
    }

    #[test]
    fn nested_unary_keeps_a_gap() {
        assert_eq!(round("VAR a, - -b"), "VAR a, - -b\n");
    }

    #[test]
    fn delta_percent() {
        assert_eq!(
            round("VAR x, INIT = 1, EV = 10, DELTA = 5%"),
            "VAR x, INIT = 1, EV = 10, DELTA = 5 %\n"
        );
    }

    #[test]
    fn stub_signature_modes() {
        assert_eq!(
            round("DEFINE STUB s.f 2\n#int f(_in a, _out b);\nEND DEFINE"),
            "DEFINE STUB s.f 2\n  #int f(a, _out b)\nEND DEFINE\n"
        );
    }

    #[test]
    fn header_and_include() {
        assert_eq!(
            round("HEADER m,,p\nINCLUDE code \"a \\\"b\\\".c\""),
            "HEADER m, , p\nINCLUDE CODE \"a \\\"b\\\".c\"\n"
        );
    }

    #[test]
    fn rendering_is_stable() {
        let src = "SERVICE svc\nSERVICE_TYPE ext\nENVIRONMENT env(a)\nFORMAT x = %d\nEND ENVIRONMENT\nEND SERVICE\nIF a > 1\n-- note\nELSE\n#x = 0;\nEND IF\nSIMUL\nUSE h(a)\nELSE_SIMUL\nEND SIMUL";
        let once = round(src);
        assert_eq!(round(&once), once);
    }

    #[test]
    fn error_nodes_are_skipped() {
        let parsed = parse("x + 1\nBEGIN", "r.ptu").unwrap();
        assert_eq!(render(&parsed.tree), "BEGIN\n");
    }
}
