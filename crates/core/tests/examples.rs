//! End-to-end parses of small test plans through the public API.

use pretty_assertions::assert_eq;
use ptuscript_core::ast::{DefineStub, Header, IfElse, InitSpec, ParamMode, StubCode, Test, VarForm};
use ptuscript_core::lexer::{self, Keyword, TokenKind};
use ptuscript_core::{
    parse, render, Definition, ErrorKind, ExpectedSpec, Expression, ParsedSource,
};

fn parse_clean(src: &str) -> ParsedSource {
    let parsed = parse(src, "plan.ptu").expect("no fault");
    assert!(
        parsed.diagnostics.is_empty(),
        "unexpected diagnostics:\n{}",
        parsed
            .diagnostics
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    );
    parsed
}

fn ident(e: &Expression) -> &str {
    match e {
        Expression::Identifier { name, .. } => name,
        other => panic!("expected identifier, got {:?}", other),
    }
}

fn number(e: &Expression) -> &str {
    match e {
        Expression::Number { text, .. } => text,
        other => panic!("expected number, got {:?}", other),
    }
}

#[test]
fn header_then_empty_test() {
    let parsed = parse_clean("HEADER mod,1,2\nTEST t1\nEND TEST");
    let defs = &parsed.tree.definitions;
    assert_eq!(defs.len(), 2);
    let Definition::Header(Header {
        module,
        version,
        plan,
        ..
    }) = &defs[0]
    else {
        panic!("expected HEADER, got {:?}", defs[0]);
    };
    assert_eq!(module.as_deref(), Some("mod"));
    assert_eq!(version.as_deref(), Some("1"));
    assert_eq!(plan.as_deref(), Some("2"));
    let Definition::Test(Test { name, children, .. }) = &defs[1] else {
        panic!("expected TEST, got {:?}", defs[1]);
    };
    assert_eq!(name, "t1");
    assert!(children.is_empty());
}

#[test]
fn single_var_instruction() {
    let parsed = parse_clean("VAR x, INIT = 1, EV = 2");
    let Definition::Var(var) = &parsed.tree.definitions[0] else {
        panic!("expected VAR");
    };
    let VarForm::Triplet {
        variable,
        init,
        expected,
    } = &var.form
    else {
        panic!("expected triplet, got {:?}", var.form);
    };
    assert_eq!(ident(variable), "x");
    let InitSpec::Expression { value, .. } = init else {
        panic!("expected INIT =");
    };
    assert_eq!(number(value), "1");
    let ExpectedSpec::ExactValue { value, .. } = expected else {
        panic!("expected EV =");
    };
    assert_eq!(number(value), "2");
}

#[test]
fn if_else_with_comments() {
    let parsed = parse_clean("IF a>b\nCOMMENT yes\nELSE\nCOMMENT no\nEND IF");
    let Definition::IfElse(IfElse {
        condition,
        consequence,
        alternative,
        ..
    }) = &parsed.tree.definitions[0]
    else {
        panic!("expected IF");
    };
    assert_eq!(condition, "a>b");
    assert!(matches!(&consequence[..], [Definition::Comment { text, .. }] if text == "yes"));
    let alternative = alternative.as_deref().expect("ELSE branch");
    assert!(matches!(alternative, [Definition::Comment { text, .. }] if text == "no"));
}

#[test]
fn define_stub_with_signature() {
    let parsed = parse_clean("DEFINE STUB s.f\n#int f(x)\nEND DEFINE");
    let Definition::DefineStub(DefineStub {
        stub,
        function,
        body,
        ..
    }) = &parsed.tree.definitions[0]
    else {
        panic!("expected DEFINE STUB");
    };
    assert_eq!(stub.as_deref(), Some("s"));
    assert_eq!(function, "f");
    let [Definition::StubCode(StubCode { signature, .. })] = &body[..] else {
        panic!("expected one signature, got {:?}", body);
    };
    assert_eq!(signature.return_type.as_ref().map(ident), Some("int"));
    assert_eq!(ident(&signature.function), "f");
    assert_eq!(signature.parameters.len(), 1);
    assert_eq!(signature.parameters[0].mode, ParamMode::In);
    assert_eq!(ident(&signature.parameters[0].value), "x");
}

#[test]
fn mismatched_terminator_keeps_children() {
    let parsed = parse("TEST t1\nFAMILY f\nVAR x, INIT = 1, EV = 1\nEND IF", "plan.ptu").unwrap();
    let codes: Vec<ErrorKind> = parsed.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorKind::BlockMismatch]);
    assert_eq!(parsed.diagnostics[0].file, "plan.ptu");
    assert_eq!(parsed.diagnostics[0].line, 4);
    let Definition::Test(test) = &parsed.tree.definitions[0] else {
        panic!("expected TEST");
    };
    assert_eq!(test.children.len(), 2);
}

#[test]
fn variance_is_never_the_var_keyword() {
    let tokens = lexer::lex("VARIANCE VAR");
    assert_eq!(tokens[0].kind, TokenKind::Word);
    assert_eq!(tokens[0].keyword, None);
    assert_eq!(tokens[1].keyword, Some(Keyword::Var));

    let parsed = parse_clean("VAR VARIANCE, INIT = 1, EV = VARIANCE");
    let Definition::Var(var) = &parsed.tree.definitions[0] else {
        panic!("expected VAR");
    };
    assert_eq!(ident(var.variable()), "VARIANCE");
}

#[test]
fn var_alone_at_definition_position_is_the_keyword() {
    let parsed = parse("VAR", "plan.ptu").unwrap();
    assert_eq!(parsed.diagnostics.len(), 1);
    assert!(parsed.diagnostics[0].message.contains("VAR requires a variable"));
}

#[test]
fn walk_visits_nested_definitions_with_depth() {
    let parsed =
        parse_clean("SERVICE s\nTEST t\nELEMENT\n#x();\nEND ELEMENT\nEND TEST\nEND SERVICE");
    let mut seen = Vec::new();
    parsed.tree.walk(|d, depth| seen.push((d.kind_name(), depth)));
    assert_eq!(
        seen,
        vec![
            ("SERVICE", 0),
            ("TEST", 1),
            ("ELEMENT", 2),
            ("NATIVE_CODE", 3),
        ]
    );
}

#[test]
fn full_plan_renders_canonically() {
    let src = "\
header m, 2, p
test t1 loop 4
  family nominal
  element
    var a, init = 0, ev = 0
    if cond
      #x = 1;
    end if
  end element
end test
";
    let parsed = parse_clean(src);
    assert_eq!(
        render(&parsed.tree),
        "\
HEADER m, 2, p
TEST t1 LOOP 4
  FAMILY nominal
  ELEMENT
    VAR a, INIT = 0, EV = 0
    IF cond
      #x = 1;
    END IF
  END ELEMENT
END TEST
"
    );
}

#[test]
fn parsing_is_reentrant_across_threads() {
    let sources = ["TEST a\nEND TEST", "ELEMENT\nEND ELEMENT", "VAR x, EV = 1"];
    let handles: Vec<_> = sources
        .into_iter()
        .map(|src| std::thread::spawn(move || parse(src, "t.ptu").unwrap()))
        .collect();
    for handle in handles {
        let parsed = handle.join().unwrap();
        assert!(parsed.diagnostics.is_empty());
    }
}
