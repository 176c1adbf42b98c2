//! Property tests: the parser survives arbitrary input, and generated
//! well-formed plans parse without diagnostics and render stably.

use proptest::prelude::*;
use ptuscript_core::lexer::Keyword;
use ptuscript_core::{parse, parse_with, render, ParseFault, ParseOptions};

const MAX_INPUT_BYTES: usize = 256;

fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}"
        .prop_filter("keywords are not names", |s| Keyword::lookup(s).is_none())
}

fn number() -> impl Strategy<Value = String> {
    "[0-9]{1,4}"
}

fn expression() -> impl Strategy<Value = String> {
    let atom = prop_oneof![
        name(),
        number(),
        (name(), name()).prop_map(|(a, f)| format!("{}.{}", a, f)),
        (name(), name()).prop_map(|(a, f)| format!("{}->{}", a, f)),
        (number(), name()).prop_map(|(n, f)| format!("{} .{}", n, f)),
    ];
    atom.prop_recursive(4, 24, 3, |inner| {
        let op = prop_oneof![
            Just("+"),
            Just("*"),
            Just("/"),
            Just("=="),
            Just("<"),
            Just("&&"),
            Just(".."),
        ];
        let unary = prop_oneof![Just("!"), Just("~"), Just("&"), Just("-")];
        prop_oneof![
            (inner.clone(), op, inner.clone())
                .prop_map(|(l, op, r)| format!("{} {} {}", l, op, r)),
            inner.clone().prop_map(|e| format!("({})", e)),
            (unary, name()).prop_map(|(op, n)| format!("{}{}", op, n)),
            (name(), proptest::collection::vec(inner.clone(), 0..3))
                .prop_map(|(f, args)| format!("{}({})", f, args.join(", "))),
            (name(), inner).prop_map(|(t, i)| format!("{}[{}]", t, i)),
        ]
    })
}

fn expressions() -> impl Strategy<Value = String> {
    proptest::collection::vec(expression(), 1..4).prop_map(|v| v.join(", "))
}

fn names() -> impl Strategy<Value = String> {
    proptest::collection::vec(name(), 1..3).prop_map(|v| v.join(", "))
}

fn init_spec() -> impl Strategy<Value = String> {
    let sweep = prop_oneof![
        Just(String::new()),
        expression().prop_map(|s| format!(" STEP {}", s)),
        number().prop_map(|n| format!(" NB_TIMES {}", n)),
        (number(), any::<bool>()).prop_map(|(n, bounds)| {
            format!(" NB_RANDOM {}{}", n, if bounds { " BOUNDS" } else { "" })
        }),
    ];
    prop_oneof![
        expression().prop_map(|e| format!("INIT = {}", e)),
        expressions().prop_map(|v| format!("INIT IN {{{}}}", v)),
        (names(), expressions()).prop_map(|(n, v)| format!("INIT ({}) WITH {{{}}}", n, v)),
        (expression(), expression(), sweep)
            .prop_map(|(a, b, s)| format!("INIT FROM {} TO {}{}", a, b, s)),
        Just("INIT ==".to_owned()),
    ]
}

fn expected_spec() -> impl Strategy<Value = String> {
    let tolerance = prop_oneof![
        name(),
        number(),
        number().prop_map(|n| format!("{}%", n)),
        name().prop_map(|n| format!("{} %", n)),
    ];
    prop_oneof![
        expression().prop_map(|e| format!("EV = {}", e)),
        (expression(), tolerance).prop_map(|(e, t)| format!("EV = {}, DELTA = {}", e, t)),
        (expression(), expression()).prop_map(|(a, b)| format!("MIN = {}, MAX = {}", a, b)),
        expressions().prop_map(|v| format!("EV IN {{{}}}", v)),
        (name(), expressions()).prop_map(|(n, v)| format!("EV ({}) IN {{{}}}", n, v)),
        Just("EV ==".to_owned()),
    ]
}

fn var_keyword() -> impl Strategy<Value = &'static str> {
    proptest::sample::select(vec!["VAR", "ARRAY", "STR"])
}

fn var_line() -> impl Strategy<Value = String> {
    prop_oneof![
        (var_keyword(), name(), init_spec(), expected_spec())
            .prop_map(|(k, v, init, ev)| format!("{} {}, {}, {}", k, v, init, ev)),
        (var_keyword(), name(), expected_spec())
            .prop_map(|(k, v, ev)| format!("{} {}, {}", k, v, ev)),
    ]
}

fn block(head: String, lines: Vec<String>, close: &str) -> String {
    let mut out = head;
    out.push('\n');
    for l in lines {
        out.push_str(&l);
        out.push('\n');
    }
    out.push_str(close);
    out
}

fn element() -> impl Strategy<Value = String> {
    let line = prop_oneof![
        var_line(),
        (name(), number()).prop_map(|(n, v)| format!("#{} = {};", n, v)),
        name(),
    ];
    proptest::collection::vec(line, 0..4)
        .prop_map(|lines| block("ELEMENT".to_owned(), lines, "END ELEMENT"))
}

fn test_leaf() -> impl Strategy<Value = String> {
    prop_oneof![
        name().prop_map(|n| format!("FAMILY {}", n)),
        "[a-z]{1,8}( [a-z]{1,8}){0,2}".prop_map(|c| format!("COMMENT {}", c)),
        var_line(),
        element(),
    ]
}

fn conditional() -> impl Strategy<Value = String> {
    let branch = || proptest::collection::vec(test_leaf(), 0..3);
    let condition = (name(), name()).prop_map(|(a, b)| format!("{} > {}", a, b));
    prop_oneof![
        (condition, branch(), proptest::option::of(branch())).prop_map(|(c, then, alt)| {
            let mut lines = then;
            if let Some(alt) = alt {
                lines.push("ELSE".to_owned());
                lines.extend(alt);
            }
            block(format!("IF {}", c), lines, "END IF")
        }),
        (branch(), proptest::option::of(branch())).prop_map(|(then, alt)| {
            let mut lines = then;
            if let Some(alt) = alt {
                lines.push("ELSE_SIMUL".to_owned());
                lines.extend(alt);
            }
            block("SIMUL".to_owned(), lines, "END SIMUL")
        }),
    ]
}

fn test_block() -> impl Strategy<Value = String> {
    let item = prop_oneof![3 => test_leaf(), 1 => conditional()];
    (name(), proptest::collection::vec(item, 0..4))
        .prop_map(|(n, items)| block(format!("TEST {}", n), items, "END TEST"))
}

fn define_stub() -> impl Strategy<Value = String> {
    let mode = prop_oneof![Just(""), Just("_in "), Just("_out "), Just("_inout "), Just("_no ")];
    let parameter = (mode, expression()).prop_map(|(m, e)| format!("{}{}", m, e));
    let signature = (
        proptest::option::of(name()),
        name(),
        proptest::collection::vec(parameter, 0..3),
    )
        .prop_map(|(ty, f, params)| {
            let ty = ty.map(|t| format!("{} ", t)).unwrap_or_default();
            format!("#{}{}({});", ty, f, params.join(", "))
        });
    (name(), name(), proptest::collection::vec(signature, 0..3)).prop_map(|(s, f, lines)| {
        block(format!("DEFINE STUB {}.{}", s, f), lines, "END DEFINE")
    })
}

fn plan() -> impl Strategy<Value = String> {
    let unit = prop_oneof![3 => test_block(), 1 => define_stub()];
    (name(), number(), name(), proptest::collection::vec(unit, 1..3)).prop_map(
        |(m, v, p, units)| format!("HEADER {}, {}, {}\n{}\n", m, v, p, units.join("\n")),
    )
}

proptest! {
    #[test]
    fn arbitrary_input_never_panics(
        bytes in proptest::collection::vec(any::<u8>(), 0..=MAX_INPUT_BYTES)
    ) {
        let input = String::from_utf8_lossy(&bytes).into_owned();
        let options = ParseOptions::default();
        match parse_with(&input, "fuzz.ptu", &options) {
            Ok(parsed) => {
                prop_assert!(parsed.diagnostics.len() <= options.max_diagnostics + 1);
                for d in &parsed.diagnostics {
                    prop_assert!(d.span.start <= d.span.end);
                    prop_assert!(d.span.end as usize <= input.len());
                }
            }
            Err(fault) => {
                let deep = matches!(fault, ParseFault::NestingTooDeep { .. });
                prop_assert!(deep, "unexpected fault: {}", fault);
            }
        }
    }

    #[test]
    fn keyword_soup_never_panics(
        words in proptest::collection::vec(
            prop_oneof![
                proptest::sample::select(Keyword::ALL.to_vec())
                    .prop_map(|k| k.spelling().to_owned()),
                name(),
                number(),
                Just("\n".to_owned()),
                Just("=".to_owned()),
                Just(",".to_owned()),
                Just("{".to_owned()),
                Just("(".to_owned()),
                Just(")".to_owned()),
                Just("#x;".to_owned()),
            ],
            0..64,
        )
    ) {
        let input = words.join(" ");
        if let Err(fault) = parse(&input, "soup.ptu") {
            let deep = matches!(fault, ParseFault::NestingTooDeep { .. });
            prop_assert!(deep, "unexpected fault: {}", fault);
        }
    }

    #[test]
    fn generated_plans_parse_cleanly(src in plan()) {
        let parsed = parse(&src, "gen.ptu").unwrap();
        let listed: Vec<String> = parsed.diagnostics.iter().map(|d| d.to_string()).collect();
        prop_assert!(listed.is_empty(), "{}\n{}", src, listed.join("\n"));
    }

    #[test]
    fn rendering_is_stable(src in plan()) {
        let first = render(&parse(&src, "gen.ptu").unwrap().tree);
        let reparsed = parse(&first, "gen.ptu").unwrap();
        prop_assert!(reparsed.diagnostics.is_empty());
        prop_assert_eq!(render(&reparsed.tree), first);
    }
}
