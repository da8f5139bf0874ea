//! End-to-end resolution of documents assembled without a front-end.

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use strata_graph::ops::BinaryOp;
use strata_graph::syntax::{Action, Document, Expr, Statement, Syntax, TemplatePart};
use strata_graph::{Engine, EngineOptions, GraphError, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine_with(documents: Vec<Vec<Statement>>) -> Engine {
    init_tracing();
    let mut engine = Engine::default();
    for block in documents {
        engine.load_document(&Document::new(block)).unwrap();
    }
    engine
}

fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<IndexMap<_, _>>(),
    )
}

fn ints(items: &[i64]) -> Value {
    Value::List(items.iter().copied().map(Value::Integer).collect())
}

fn template(expr: Expr) -> Syntax {
    Syntax::template(vec![TemplatePart::Expr(expr)])
}

#[test]
fn test_documents_overlay_key_by_key() {
    let mut engine = engine_with(vec![
        vec![Statement::entry(
            "foo",
            Syntax::mapping(vec![Statement::entry("a", Syntax::scalar("b"))]),
        )],
        vec![Statement::entry(
            "foo",
            Syntax::mapping(vec![Statement::entry("c", Syntax::scalar("d"))]),
        )],
    ]);
    assert_eq!(
        engine.resolve_path(&["foo"]).unwrap(),
        map(vec![("a", Value::from("b")), ("c", Value::from("d"))])
    );
}

#[test]
fn test_overlay_is_associative() {
    let d1 = vec![
        Statement::entry("a", Syntax::scalar("1")),
        Statement::entry(
            "nested",
            Syntax::mapping(vec![Statement::entry("x", Syntax::scalar("1"))]),
        ),
    ];
    let d2 = vec![
        Statement::entry("b", Syntax::scalar("2")),
        Statement::entry(
            "nested",
            Syntax::mapping(vec![Statement::entry("y", Syntax::scalar("2"))]),
        ),
    ];
    let d3 = vec![
        Statement::entry("a", Syntax::scalar("3")),
        Statement::entry(
            "nested",
            Syntax::mapping(vec![Statement::entry("x", Syntax::scalar("3"))]),
        ),
    ];

    let mut sequential = engine_with(vec![d1.clone(), d2.clone(), d3.clone()]);
    let folded = d2.into_iter().chain(d3).collect();
    let mut grouped = engine_with(vec![d1, folded]);

    let expected = map(vec![
        ("a", Value::Integer(3)),
        (
            "nested",
            map(vec![("x", Value::Integer(3)), ("y", Value::Integer(2))]),
        ),
        ("b", Value::Integer(2)),
    ]);
    assert_eq!(sequential.resolve().unwrap(), expected);
    assert_eq!(grouped.resolve().unwrap(), expected);
}

#[test]
fn test_scalars_and_sequences_replace() {
    let mut engine = engine_with(vec![
        vec![
            Statement::entry("name", Syntax::scalar("old")),
            Statement::entry("list", Syntax::sequence(vec![Syntax::scalar("1")])),
        ],
        vec![
            Statement::entry("name", Syntax::scalar("new")),
            Statement::entry("list", Syntax::sequence(vec![Syntax::scalar("2")])),
        ],
    ]);
    assert_eq!(engine.resolve_path(&["name"]).unwrap(), Value::from("new"));
    assert_eq!(engine.resolve_path(&["list"]).unwrap(), ints(&[2]));
}

#[test]
fn test_append_and_remove() {
    let numbers = |items: &[&str]| Syntax::sequence(items.iter().map(|i| Syntax::scalar(*i)).collect());
    let mut engine = engine_with(vec![
        vec![
            Statement::entry("grow", numbers(&["1", "2", "3"])),
            Statement::entry("shrink", numbers(&["1", "2", "3"])),
        ],
        vec![
            Statement::with_action("grow", Action::Append, numbers(&["4", "5"])),
            Statement::with_action("shrink", Action::Remove, numbers(&["2"])),
            Statement::with_action("fresh", Action::Append, numbers(&["7"])),
            Statement::with_action("gone", Action::Remove, numbers(&["7"])),
        ],
    ]);
    assert_eq!(engine.resolve_path(&["grow"]).unwrap(), ints(&[1, 2, 3, 4, 5]));
    assert_eq!(engine.resolve_path(&["shrink"]).unwrap(), ints(&[1, 3]));
    assert_eq!(engine.resolve_path(&["fresh"]).unwrap(), ints(&[7]));
    assert_eq!(engine.resolve_path(&["gone"]).unwrap(), ints(&[]));
}

#[test]
fn test_extend_appends() {
    let mut engine = engine_with(vec![
        vec![Statement::entry("hosts", Syntax::sequence(vec![Syntax::scalar("a")]))],
        vec![Statement::extend(
            "hosts",
            Syntax::sequence(vec![Syntax::scalar("b"), Syntax::scalar("c")]),
        )],
    ]);
    assert_eq!(
        engine.resolve_path(&["hosts"]).unwrap(),
        Value::List(vec!["a".into(), "b".into(), "c".into()])
    );
}

#[test]
fn test_appending_to_a_mapping_is_a_type_error() {
    let mut engine = engine_with(vec![
        vec![Statement::entry(
            "a",
            Syntax::mapping(vec![Statement::entry("x", Syntax::scalar("1"))]),
        )],
        vec![Statement::with_action(
            "a",
            Action::Append,
            Syntax::sequence(vec![Syntax::scalar("1")]),
        )],
    ]);
    let error = engine.resolve_path(&["a"]).unwrap_err();
    assert!(matches!(error, GraphError::Type { .. }), "{error:?}");
}

#[test]
fn test_forward_references() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("b", template(Expr::name("a"))),
        Statement::entry("a", Syntax::scalar("c")),
    ]]);
    assert_eq!(engine.resolve_path(&["b"]).unwrap(), Value::from("c"));
}

#[test]
fn test_boxing_happens_at_resolve_time() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("flag", Syntax::scalar("Yes")),
        Statement::entry("off", Syntax::scalar("off")),
        Statement::entry("port", Syntax::scalar("8080")),
        Statement::entry("quoted", Syntax::text("8080")),
        Statement::entry("word", Syntax::scalar("hello")),
    ]]);
    assert_eq!(
        engine.resolve().unwrap(),
        map(vec![
            ("flag", Value::Bool(true)),
            ("off", Value::Bool(false)),
            ("port", Value::Integer(8080)),
            ("quoted", Value::from("8080")),
            ("word", Value::from("hello")),
        ])
    );
}

#[test]
fn test_self_reference_is_a_cycle() {
    let mut engine = engine_with(vec![vec![Statement::entry("foo", template(Expr::name("foo")))]]);
    let error = engine.resolve().unwrap_err();
    assert!(matches!(error, GraphError::Cycle { .. }), "{error:?}");
    insta::assert_snapshot!(error.to_string(), @"cycle detected while evaluating `foo`");
    insta::assert_snapshot!(error.to_diagnostic().to_text(None), @r"
    Error [S-3-1]: Cycle detected
    `foo` depends on its own value
    ");

    // Failures are permanent for the loaded graph
    assert_eq!(engine.resolve().unwrap_err(), error);
}

#[test]
fn test_mutual_reference_is_a_cycle() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("flip", template(Expr::name("flop"))),
        Statement::entry("flop", template(Expr::name("flip"))),
    ]]);
    let error = engine.resolve_path(&["flip"]).unwrap_err();
    assert!(matches!(error, GraphError::Cycle { .. }), "{error:?}");
}

#[test]
fn test_reference_into_own_sequence_is_not_a_cycle() {
    let mut engine = engine_with(vec![vec![Statement::entry(
        "foo",
        Syntax::sequence(vec![
            Syntax::scalar("foo"),
            template(Expr::name("foo").index(Expr::int(0))),
        ]),
    )]]);
    assert_eq!(
        engine.resolve_path(&["foo"]).unwrap(),
        Value::List(vec!["foo".into(), "foo".into()])
    );
}

#[test]
fn test_select_that_overrides_its_own_key_is_a_paradox() {
    let mut engine = engine_with(vec![
        vec![Statement::entry(
            "out",
            Syntax::mapping(vec![Statement::entry("foo", Syntax::scalar("bar"))]),
        )],
        vec![Statement::entry(
            "out",
            Syntax::mapping(vec![Statement::select(
                Expr::path("out.foo"),
                vec![("bar", vec![Statement::entry("foo", Syntax::scalar("qux"))])],
            )]),
        )],
    ]);
    let error = engine.resolve_path(&["out"]).unwrap_err();
    match error {
        GraphError::Paradox {
            observed, current, ..
        } => {
            assert_eq!(observed, "bar");
            assert_eq!(current, "qux");
        }
        other => panic!("expected a paradox, got {other:?}"),
    }
}

#[test]
fn test_if_that_overrides_its_own_condition_is_a_paradox() {
    let mut engine = engine_with(vec![
        vec![Statement::entry("a", Syntax::scalar("1"))],
        vec![Statement::if_else(
            vec![(
                Expr::binary(BinaryOp::Eq, Expr::name("a"), Expr::int(1)),
                vec![Statement::entry("a", Syntax::scalar("2"))],
            )],
            None,
        )],
    ]);
    match engine.resolve().unwrap_err() {
        GraphError::Paradox {
            observed, current, ..
        } => {
            assert_eq!(observed, "true");
            assert_eq!(current, "false");
        }
        other => panic!("expected a paradox, got {other:?}"),
    }
}

#[test]
fn test_consistent_decision_on_own_predecessor() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("mode", Syntax::scalar("fast")),
        Statement::select(
            Expr::name("mode"),
            vec![
                ("fast", vec![Statement::entry("speed", Syntax::scalar("10"))]),
                ("slow", vec![Statement::entry("speed", Syntax::scalar("1"))]),
            ],
        ),
    ]]);
    assert_eq!(
        engine.resolve().unwrap(),
        map(vec![("mode", Value::from("fast")), ("speed", Value::Integer(10))])
    );
}

#[test]
fn test_select_without_matching_case() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("mode", Syntax::scalar("medium")),
        Statement::select(
            Expr::name("mode"),
            vec![("fast", vec![Statement::entry("speed", Syntax::scalar("10"))])],
        ),
    ]]);
    let error = engine.resolve().unwrap_err();
    assert!(
        matches!(&error, GraphError::NoMatching { what, .. } if what == "case `medium`"),
        "{error:?}"
    );
}

#[test]
fn test_or_falls_back_on_missing_names() {
    let mut engine = engine_with(vec![vec![
        Statement::entry(
            "items",
            template(Expr::binary(BinaryOp::Or, Expr::name("a"), Expr::list(vec![]))),
        ),
        Statement::entry(
            "port",
            template(Expr::binary(BinaryOp::Or, Expr::path("server.port"), Expr::int(80))),
        ),
    ]]);
    assert_eq!(engine.resolve_path(&["items"]).unwrap(), Value::List(vec![]));
    assert_eq!(engine.resolve_path(&["port"]).unwrap(), Value::Integer(80));
}

#[test]
fn test_missing_name_without_fallback() {
    let mut engine = engine_with(vec![vec![Statement::entry("a", template(Expr::name("nowhere")))]]);
    let error = engine.resolve().unwrap_err();
    assert!(error.is_no_matching(), "{error:?}");
}

#[test]
fn test_nested_for_flattens() {
    let pair = || Expr::list(vec![Expr::int(1), Expr::int(2)]);
    let body = template(Expr::binary(BinaryOp::Add, Expr::name("x"), Expr::name("y")));
    let mut engine = engine_with(vec![vec![Statement::entry(
        "sums",
        Syntax::for_loop("x", pair(), None, Syntax::for_loop("y", pair(), None, body)),
    )]]);
    assert_eq!(engine.resolve_path(&["sums"]).unwrap(), ints(&[2, 3, 3, 4]));
}

#[test]
fn test_nested_for_without_flattening() {
    init_tracing();
    let pair = || Expr::list(vec![Expr::int(1), Expr::int(2)]);
    let body = template(Expr::binary(BinaryOp::Mul, Expr::name("x"), Expr::name("y")));
    let mut engine = Engine::new(EngineOptions {
        flatten_nested_loops: false,
        ..EngineOptions::default()
    });
    engine
        .load_document(&Document::new(vec![Statement::entry(
            "table",
            Syntax::for_loop("x", pair(), None, Syntax::for_loop("y", pair(), None, body)),
        )]))
        .unwrap();
    assert_eq!(
        engine.resolve_path(&["table"]).unwrap(),
        Value::List(vec![ints(&[1, 2]), ints(&[2, 4])])
    );
}

#[test]
fn test_for_filter_and_mapping_iteration() {
    let mut engine = engine_with(vec![vec![
        Statement::entry(
            "services",
            Syntax::mapping(vec![
                Statement::entry("web", Syntax::scalar("80")),
                Statement::entry("db", Syntax::scalar("5432")),
            ]),
        ),
        Statement::entry(
            "names",
            Syntax::for_loop("name", Expr::name("services"), None, template(Expr::name("name"))),
        ),
        Statement::entry(
            "big",
            Syntax::for_loop(
                "n",
                Expr::list(vec![Expr::int(1), Expr::int(5), Expr::int(10)]),
                Some(Expr::binary(BinaryOp::Gt, Expr::name("n"), Expr::int(2))),
                template(Expr::name("n")),
            ),
        ),
        Statement::entry(
            "urls",
            Syntax::for_loop(
                "name",
                Expr::name("services"),
                None,
                Syntax::template(vec![
                    TemplatePart::Text("http://".into()),
                    TemplatePart::Expr(Expr::name("name")),
                    TemplatePart::Text(":".into()),
                    TemplatePart::Expr(Expr::name("services").index(Expr::name("name"))),
                ]),
            ),
        ),
    ]]);
    assert_eq!(
        engine.resolve_path(&["names"]).unwrap(),
        Value::List(vec!["web".into(), "db".into()])
    );
    assert_eq!(engine.resolve_path(&["big"]).unwrap(), ints(&[5, 10]));
    assert_eq!(
        engine.resolve_path(&["urls"]).unwrap(),
        Value::List(vec!["http://web:80".into(), "http://db:5432".into()])
    );
}

#[test]
fn test_for_loop_sees_sibling_keys() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("base", Syntax::scalar("10")),
        Statement::entry(
            "offsets",
            Syntax::for_loop(
                "i",
                Expr::list(vec![Expr::int(1), Expr::int(2)]),
                None,
                template(Expr::binary(BinaryOp::Add, Expr::name("base"), Expr::name("i"))),
            ),
        ),
    ]]);
    assert_eq!(engine.resolve_path(&["offsets"]).unwrap(), ints(&[11, 12]));
}

#[test]
fn test_iterating_a_scalar_is_a_type_error() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("n", Syntax::scalar("3")),
        Statement::entry(
            "xs",
            Syntax::for_loop("x", Expr::name("n"), None, template(Expr::name("x"))),
        ),
    ]]);
    let error = engine.resolve_path(&["xs"]).unwrap_err();
    assert!(matches!(error, GraphError::Type { .. }), "{error:?}");
}

#[test]
fn test_if_else() {
    let mut engine = engine_with(vec![vec![Statement::if_else(
        vec![(Expr::int(0), vec![Statement::entry("a", Syntax::scalar("1"))])],
        Some(vec![Statement::entry("a", Syntax::scalar("2"))]),
    )]]);
    assert_eq!(engine.resolve_path(&["a"]).unwrap(), Value::Integer(2));
}

#[test]
fn test_elif_on_sibling_value() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("env", Syntax::scalar("staging")),
        Statement::if_else(
            vec![
                (
                    Expr::binary(BinaryOp::Eq, Expr::name("env"), Expr::string("prod")),
                    vec![Statement::entry("replicas", Syntax::scalar("5"))],
                ),
                (
                    Expr::binary(BinaryOp::Eq, Expr::name("env"), Expr::string("staging")),
                    vec![Statement::entry("replicas", Syntax::scalar("2"))],
                ),
            ],
            None,
        ),
        Statement::entry("ready", Syntax::scalar("yes")),
    ]]);
    assert_eq!(
        engine.resolve().unwrap(),
        map(vec![
            ("env", Value::from("staging")),
            ("replicas", Value::Integer(2)),
            ("ready", Value::Bool(true)),
        ])
    );
}

#[test]
fn test_untaken_branch_is_never_evaluated() {
    let mut engine = engine_with(vec![vec![Statement::if_else(
        vec![(
            Expr::bool(false),
            vec![Statement::entry("boom", template(Expr::name("boom")))],
        )],
        Some(vec![Statement::entry("ok", Syntax::scalar("1"))]),
    )]]);
    assert_eq!(engine.resolve().unwrap(), map(vec![("ok", Value::Integer(1))]));
}

#[test]
fn test_if_without_match_keeps_predecessor() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("a", Syntax::scalar("1")),
        Statement::if_else(
            vec![(Expr::bool(false), vec![Statement::entry("a", Syntax::scalar("2"))])],
            None,
        ),
    ]]);
    assert_eq!(engine.resolve().unwrap(), map(vec![("a", Value::Integer(1))]));
}

#[test]
fn test_division() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("five", Syntax::scalar("5")),
        Statement::entry(
            "half",
            template(Expr::binary(BinaryOp::Div, Expr::int(5), Expr::int(2))),
        ),
        Statement::entry(
            "floor",
            template(Expr::binary(BinaryOp::FloorDiv, Expr::int(5), Expr::int(2))),
        ),
        Statement::entry(
            "dynamic",
            template(Expr::binary(BinaryOp::Div, Expr::name("five"), Expr::int(2))),
        ),
    ]]);
    assert_eq!(engine.resolve_path(&["half"]).unwrap(), Value::Float(2.5));
    assert_eq!(engine.resolve_path(&["floor"]).unwrap(), Value::Integer(2));
    assert_eq!(engine.resolve_path(&["dynamic"]).unwrap(), Value::Float(2.5));
}

#[test]
fn test_division_by_zero_is_a_type_error() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("zero", Syntax::scalar("0")),
        Statement::entry(
            "bad",
            template(Expr::binary(BinaryOp::Div, Expr::int(1), Expr::name("zero"))),
        ),
    ]]);
    let error = engine.resolve_path(&["bad"]).unwrap_err();
    assert!(matches!(error, GraphError::Type { .. }), "{error:?}");
}

#[test]
fn test_oversized_repetition_is_a_type_error() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("n", Syntax::scalar("9223372036854775807")),
        Statement::entry(
            "folded",
            template(Expr::binary(BinaryOp::Mul, Expr::string("ab"), Expr::int(i64::MAX))),
        ),
        Statement::entry(
            "text",
            template(Expr::binary(BinaryOp::Mul, Expr::string("ab"), Expr::name("n"))),
        ),
        Statement::entry(
            "items",
            template(Expr::binary(
                BinaryOp::Mul,
                Expr::list(vec![Expr::int(1), Expr::int(2)]),
                Expr::name("n"),
            )),
        ),
    ]]);
    for key in ["folded", "text", "items"] {
        let error = engine.resolve_path(&[key]).unwrap_err();
        assert!(matches!(error, GraphError::Type { .. }), "{key}: {error:?}");
    }
}

#[test]
fn test_short_circuit_never_touches_the_other_side() {
    let mut engine = engine_with(vec![vec![
        Statement::entry(
            "both",
            template(Expr::binary(BinaryOp::And, Expr::int(0), Expr::name("missing"))),
        ),
        Statement::entry(
            "either",
            template(Expr::binary(BinaryOp::Or, Expr::string("set"), Expr::name("missing"))),
        ),
    ]]);
    assert_eq!(engine.resolve_path(&["both"]).unwrap(), Value::Bool(false));
    assert_eq!(engine.resolve_path(&["either"]).unwrap(), Value::from("set"));
}

#[test]
fn test_resolving_scalars_is_idempotent() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("name", Syntax::text("svc")),
        Statement::entry("ports", Syntax::sequence(vec![Syntax::scalar("80"), Syntax::scalar("443")])),
        Statement::entry(
            "limits",
            Syntax::mapping(vec![Statement::entry("cpu", Syntax::scalar("2"))]),
        ),
    ]]);
    let first = engine.resolve().unwrap();
    let second = engine.resolve().unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first,
        map(vec![
            ("name", Value::from("svc")),
            ("ports", ints(&[80, 443])),
            ("limits", map(vec![("cpu", Value::Integer(2))])),
        ])
    );
}

#[test]
fn test_loading_a_document_resets_memoized_results() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("a", Syntax::scalar("1")),
        Statement::entry("b", template(Expr::name("a"))),
    ]]);
    assert_eq!(engine.resolve_path(&["b"]).unwrap(), Value::Integer(1));
    engine
        .load_document(&Document::new(vec![Statement::entry("a", Syntax::scalar("2"))]))
        .unwrap();
    assert_eq!(engine.resolve_path(&["b"]).unwrap(), Value::Integer(2));
}

#[test]
fn test_macro_calls() {
    let mut engine = engine_with(vec![vec![
        Statement::macro_def(
            "server",
            Syntax::mapping(vec![
                Statement::entry("host", template(Expr::name("name"))),
                Statement::entry("port", Syntax::scalar("80")),
            ]),
        ),
        Statement::entry(
            "web",
            Syntax::mapping(vec![Statement::call("server", vec![("name", Syntax::text("web.local"))])]),
        ),
        Statement::entry(
            "api",
            Syntax::mapping(vec![
                Statement::call("server", vec![("name", Syntax::text("api.local"))]),
                Statement::entry("port", Syntax::scalar("8080")),
            ]),
        ),
    ]]);
    assert_eq!(
        engine.resolve().unwrap(),
        map(vec![
            (
                "web",
                map(vec![("host", Value::from("web.local")), ("port", Value::Integer(80))])
            ),
            (
                "api",
                map(vec![("host", Value::from("api.local")), ("port", Value::Integer(8080))])
            ),
        ])
    );
}

#[test]
fn test_macro_overlays_call_site_predecessor() {
    let mut engine = engine_with(vec![vec![
        Statement::macro_def(
            "tagged",
            Syntax::mapping(vec![Statement::entry("tag", template(Expr::name("label")))]),
        ),
        Statement::entry("keep", Syntax::scalar("1")),
        Statement::call("tagged", vec![("label", Syntax::text("v1"))]),
    ]]);
    assert_eq!(
        engine.resolve().unwrap(),
        map(vec![("keep", Value::Integer(1)), ("tag", Value::from("v1"))])
    );
}

#[test]
fn test_unknown_macro() {
    let mut engine = engine_with(vec![vec![Statement::call("nothing", vec![])]]);
    let error = engine.resolve().unwrap_err();
    assert!(
        matches!(&error, GraphError::NoMatching { what, .. } if what == "macro `nothing`"),
        "{error:?}"
    );
}

#[test]
fn test_runaway_macro_recursion_hits_the_depth_limit() {
    init_tracing();
    let mut engine = Engine::new(EngineOptions {
        max_depth: 64,
        ..EngineOptions::default()
    });
    engine
        .load_document(&Document::new(vec![
            Statement::macro_def("forever", Syntax::mapping(vec![Statement::call("forever", vec![])])),
            Statement::call("forever", vec![]),
        ]))
        .unwrap();
    let error = engine.resolve().unwrap_err();
    assert!(
        matches!(error, GraphError::NestingTooDeep { max_depth: 64, .. }),
        "{error:?}"
    );
}

#[test]
fn test_copy_snapshots_a_value() {
    let mut engine = engine_with(vec![vec![
        Statement::entry(
            "defaults",
            Syntax::mapping(vec![Statement::entry("retries", Syntax::scalar("3"))]),
        ),
        Statement::with_action("job", Action::Copy, Syntax::scalar("defaults")),
        Statement::entry(
            "job",
            Syntax::mapping(vec![Statement::entry("name", Syntax::text("nightly"))]),
        ),
    ]]);
    assert_eq!(
        engine.resolve().unwrap(),
        map(vec![
            ("defaults", map(vec![("retries", Value::Integer(3))])),
            (
                "job",
                map(vec![("retries", Value::Integer(3)), ("name", Value::from("nightly"))])
            ),
        ])
    );
}

#[test]
fn test_here_and_self_refer_to_the_enclosing_block() {
    let mut engine = engine_with(vec![vec![
        Statement::entry("port", Syntax::scalar("1")),
        Statement::entry(
            "server",
            Syntax::mapping(vec![
                Statement::entry("port", Syntax::scalar("80")),
                Statement::entry(
                    "url",
                    Syntax::template(vec![
                        TemplatePart::Text("http://host:".into()),
                        TemplatePart::Expr(Expr::name("here").attr("port")),
                    ]),
                ),
                Statement::entry("same", template(Expr::name("self").attr("port"))),
                Statement::entry("outer", template(Expr::name("port"))),
            ]),
        ),
    ]]);
    assert_eq!(
        engine.resolve_path(&["server"]).unwrap(),
        map(vec![
            ("port", Value::Integer(80)),
            ("url", Value::from("http://host:80")),
            ("same", Value::Integer(80)),
            ("outer", Value::Integer(1)),
        ])
    );
}

#[test]
fn test_set_binds_without_adding_keys() {
    let mut engine = engine_with(vec![vec![
        Statement::set("root", Syntax::text("/srv")),
        Statement::entry(
            "data",
            Syntax::template(vec![
                TemplatePart::Expr(Expr::name("root")),
                TemplatePart::Text("/data".into()),
            ]),
        ),
    ]]);
    assert_eq!(engine.keys_path(&[]).unwrap(), vec!["data".to_string()]);
    assert_eq!(engine.resolve_path(&["data"]).unwrap(), Value::from("/srv/data"));
}

#[test]
fn test_runtime_overlay_mismatch() {
    let mut engine = engine_with(vec![
        vec![
            Statement::entry("a", template(Expr::name("b"))),
            Statement::entry("b", Syntax::scalar("1")),
        ],
        vec![Statement::entry(
            "a",
            Syntax::mapping(vec![Statement::entry("x", Syntax::scalar("1"))]),
        )],
    ]);
    let error = engine.resolve_path(&["a"]).unwrap_err();
    assert!(matches!(error, GraphError::OverlayMismatch { .. }), "{error:?}");
}

#[test]
fn test_mapping_may_overlay_null() {
    let mut engine = engine_with(vec![
        vec![Statement::entry("a", Syntax::expr(Expr::null()))],
        vec![Statement::entry(
            "a",
            Syntax::mapping(vec![Statement::entry("x", Syntax::scalar("1"))]),
        )],
    ]);
    assert_eq!(
        engine.resolve_path(&["a"]).unwrap(),
        map(vec![("x", Value::Integer(1))])
    );
}

#[test]
fn test_sequence_indexing() {
    let mut engine = engine_with(vec![vec![
        Statement::entry(
            "xs",
            Syntax::sequence(vec![Syntax::scalar("a"), Syntax::scalar("b"), Syntax::scalar("c")]),
        ),
        Statement::entry("last", template(Expr::name("xs").index(Expr::int(-1)))),
        Statement::entry("past", template(Expr::name("xs").index(Expr::int(5)))),
    ]]);
    assert_eq!(engine.resolve_path(&["last"]).unwrap(), Value::from("c"));
    assert_eq!(engine.resolve_path(&["xs", "1"]).unwrap(), Value::from("b"));
    let error = engine.resolve_path(&["past"]).unwrap_err();
    assert!(matches!(error, GraphError::Index { .. }), "{error:?}");
}

#[test]
fn test_lookup_paths() {
    let mut engine = engine_with(vec![vec![Statement::entry(
        "outer",
        Syntax::mapping(vec![
            Statement::entry("b", Syntax::scalar("1")),
            Statement::entry("a", Syntax::scalar("2")),
        ]),
    )]]);
    assert_eq!(engine.keys_path(&["outer"]).unwrap(), vec!["b".to_string(), "a".to_string()]);
    assert!(engine.expand_path(&["outer"]).is_ok());
    let error = engine.resolve_path(&["outer", "missing"]).unwrap_err();
    assert!(error.is_no_matching(), "{error:?}");
}

#[test]
fn test_resolving_before_loading_is_a_programming_error() {
    let mut engine = Engine::default();
    assert!(matches!(engine.resolve(), Err(GraphError::Programming(_))));
}
