// End-to-end scenarios, built as hand-assembled ASTs (the lexer/parser
// is out of scope for this crate) and run through the public
// `eval::ex` entry point exactly as an embedder with its own parser
// would.

use std::rc::Rc;

use mkvsynth_eval::ast::{AssignOpCode, BinOpCode, Node, NodeKind, OpKind};
use mkvsynth_eval::builtins;
use mkvsynth_eval::config::EvalConfig;
use mkvsynth_eval::env::Environment;
use mkvsynth_eval::error::EvalError;
use mkvsynth_eval::eval;

fn chain(nodes: Vec<Node>) -> Option<Node> {
    let mut head: Option<Node> = None;
    for mut node in nodes.into_iter().rev() {
        node.next = head.take().map(Box::new);
        head = Some(node);
    }
    head
}

fn call(name: &str, args: Vec<Node>) -> Node {
    let mut ops = vec![Node::id(name)];
    if let Some(args) = chain(args) {
        ops.push(args);
    }
    Node::op(OpKind::Fnct, ops)
}

fn bin(code: BinOpCode, lhs: Node, rhs: Node) -> Node {
    Node::op(OpKind::BinOp(code), vec![lhs, rhs])
}

fn assign(name: &str, rhs: Node) -> Node {
    Node::op(OpKind::Assign(AssignOpCode::Assign), vec![Node::id(name), rhs])
}

fn ret(value: Node) -> Node {
    Node::op(OpKind::Return, vec![value])
}

fn seq(stmts: Vec<Node>) -> Node {
    let mut iter = stmts.into_iter().rev();
    let mut acc = iter.next().expect("at least one statement");
    for stmt in iter {
        acc = Node::op(OpKind::Seq, vec![stmt, acc]);
    }
    acc
}

fn if_stmt(cond: Node, then: Node, else_: Option<Node>) -> Node {
    let mut ops = vec![cond, then];
    if let Some(else_) = else_ {
        ops.push(else_);
    }
    Node::op(OpKind::If, ops)
}

fn default_stmt(name: &str, value: Node) -> Node {
    Node::op(OpKind::Default, vec![Node::id(name), value])
}

fn fn_def(name: &str, params: Vec<Node>, body: Node) -> Node {
    let mut ops = vec![Node::id(name)];
    if let Some(params) = chain(params) {
        ops.push(params);
    }
    ops.push(body);
    Node::op(OpKind::FnDef, ops)
}

fn chain_call(lhs: Node, fn_name: &str, args: Vec<Node>) -> Node {
    let mut ops = vec![lhs, Node::id(fn_name)];
    if let Some(args) = chain(args) {
        ops.push(args);
    }
    Node::op(OpKind::Chain, ops)
}

fn fresh_env() -> Rc<Environment> {
    let env = Rc::new(Environment::root(EvalConfig::default()));
    builtins::install(&env);
    env
}

fn run(env: &Rc<Environment>, program: &Node) -> Result<Node, EvalError> {
    eval::ex(env, program).map(|flow| flow.into_inner())
}

// Scenario 1: `x = 3; y = 4; print(x + y);` prints "7".
#[test]
fn scenario_print_sum() {
    let env = fresh_env();
    let program = seq(vec![
        assign("x", Node::num(3.0)),
        assign("y", Node::num(4.0)),
        call("print", vec![bin(BinOpCode::Add, Node::id("x"), Node::id("y"))]),
    ]);
    run(&env, &program).unwrap();
}

// Scenario 2: `f(a, b) { return a * b; } print(f(6, 7));` -> 42.
#[test]
fn scenario_user_function_call() {
    let env = fresh_env();
    let body = ret(bin(BinOpCode::Mul, Node::id("a"), Node::id("b")));
    let program = seq(vec![
        fn_def("f", vec![Node::id("a"), Node::id("b")], body),
        assign("result", call("f", vec![Node::num(6.0), Node::num(7.0)])),
    ]);
    run(&env, &program).unwrap();
    let var = env.get_var("result").expect("result was assigned");
    match &var.borrow().value {
        Some(node) => assert_eq!(node.as_num(), Some(42.0)),
        None => panic!("result is unset"),
    }
}

// Scenario 3: optional parameters with a default.
// `g(x, y=2) { return x ^ y; } g(3) == 9; g(3, y=4) == 81`.
//
// An optional parameter's Var starts at `None` regardless of the
// literal written in the parameter list (`y=2` only fixes `y`'s
// declared type); a parser lowers that literal to a leading
// `default(y, 2);` statement in the body, which is what actually
// seeds the value when the caller omits `y`.
#[test]
fn scenario_optional_parameter_default() {
    let env = fresh_env();
    let body = seq(vec![
        default_stmt("y", Node::num(2.0)),
        ret(bin(BinOpCode::Pow, Node::id("x"), Node::id("y"))),
    ]);
    let params = vec![Node::id("x"), Node::opt_arg("y", Node::num(2.0))];
    let program = fn_def("g", params, body);
    run(&env, &program).unwrap();

    let without_override = call("g", vec![Node::num(3.0)]);
    let result = run(&env, &without_override).unwrap();
    assert_eq!(result.as_num(), Some(9.0));

    let with_override = call("g", vec![Node::num(3.0), Node::opt_arg("y", Node::num(4.0))]);
    let result = run(&env, &with_override).unwrap();
    assert_eq!(result.as_num(), Some(81.0));
}

// Scenario 4: `if (1 == 1) { print("yes"); } else { print("no"); }`.
#[test]
fn scenario_if_else() {
    let env = fresh_env();
    let program = if_stmt(
        bin(BinOpCode::Eq, Node::num(1.0), Node::num(1.0)),
        call("print", vec![Node::string("yes").unwrap()]),
        Some(call("print", vec![Node::string("no").unwrap()])),
    );
    run(&env, &program).unwrap();
}

// Scenario 5: recursive factorial.
// `fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); }`
#[test]
fn scenario_recursive_factorial() {
    let env = fresh_env();
    let body = seq(vec![
        if_stmt(bin(BinOpCode::Le, Node::id("n"), Node::num(1.0)), ret(Node::num(1.0)), None),
        ret(bin(
            BinOpCode::Mul,
            Node::id("n"),
            call("fact", vec![bin(BinOpCode::Sub, Node::id("n"), Node::num(1.0))]),
        )),
    ]);
    run(&env, &fn_def("fact", vec![Node::id("n")], body)).unwrap();

    let result = run(&env, &call("fact", vec![Node::num(5.0)])).unwrap();
    assert_eq!(result.as_num(), Some(120.0));
}

// Scenario 6: clip pipeline via method-chain sugar, terminated by `go()`.
#[test]
fn scenario_filter_chain_and_go() {
    let env = fresh_env();
    let source = call("MKVsource", vec![Node::string("in.mkv").unwrap()]);
    let cropped = chain_call(source, "crop", vec![Node::opt_arg("left", Node::num(8.0))]);
    let resized = chain_call(
        cropped,
        "bilinearResize",
        vec![Node::opt_arg("width", Node::num(640.0)), Node::opt_arg("height", Node::num(360.0))],
    );
    let program = seq(vec![
        assign("c", resized),
        chain_call(Node::id("c"), "x264Encode", vec![Node::string("out.264").unwrap()]),
        call("go", vec![]),
    ]);
    run(&env, &program).unwrap();

    let clip = env.get_var("c").expect("c was assigned");
    match &clip.borrow().value {
        Some(node) => assert!(matches!(node.kind, NodeKind::Clip(_))),
        None => panic!("c is unset"),
    }
}

// Law: `default(p, v)` is a no-op when `p` was supplied by the caller.
#[test]
fn default_is_noop_when_caller_supplied_value() {
    let env = fresh_env();
    let body = seq(vec![
        default_stmt("y", Node::num(2.0)),
        ret(Node::id("y")),
    ]);
    let params = vec![Node::opt_arg("y", Node::num(2.0))];
    run(&env, &fn_def("identity_opt", params, body)).unwrap();

    let result = run(&env, &call("identity_opt", vec![Node::opt_arg("y", Node::num(99.0))])).unwrap();
    assert_eq!(result.as_num(), Some(99.0));
}

// Boundary: an empty function body returns the Fn sentinel, not an error.
#[test]
fn empty_function_body_returns_sentinel() {
    let env = fresh_env();
    run(&env, &fn_def("noop", vec![], call("print", vec![]))).unwrap();
    let result = run(&env, &call("noop", vec![])).unwrap();
    assert!(matches!(result.kind, NodeKind::Fn(_)));
}

// Boundary: comparing mismatched tags is an evaluation error, never `false`.
#[test]
fn comparing_mismatched_tags_is_an_error() {
    let env = fresh_env();
    let program = bin(BinOpCode::Eq, Node::num(1.0), Node::boolean(true));
    let err = run(&env, &program).unwrap_err();
    assert!(err.message().contains("cannot compare"));
}

// Boundary: an undeclared optional argument name is an error, not a silent drop.
#[test]
fn unknown_optional_argument_name_is_an_error() {
    let env = fresh_env();
    let body = ret(Node::id("x"));
    run(&env, &fn_def("h", vec![Node::id("x")], body)).unwrap();
    let call_with_bad_opt = call("h", vec![Node::num(1.0), Node::opt_arg("bogus", Node::num(2.0))]);
    let err = run(&env, &call_with_bad_opt).unwrap_err();
    assert!(err.message().contains("is not an optional parameter"));
}

// Boundary: `%` truncates toward zero on non-integer operands.
#[test]
fn modulo_truncates_toward_zero() {
    let env = fresh_env();
    let program = bin(BinOpCode::Mod, Node::num(7.5), Node::num(2.0));
    let result = run(&env, &program).unwrap();
    assert_eq!(result.as_num(), Some(1.0));
}

// Law: `a.f(b)` produces the same result as `f(a, b)`.
#[test]
fn method_chain_matches_direct_call() {
    let env = fresh_env();
    let direct = run(&env, &call("sqrt", vec![Node::num(16.0)])).unwrap();
    let chained = run(&env, &chain_call(Node::num(16.0), "sqrt", vec![])).unwrap();
    assert_eq!(direct.as_num(), chained.as_num());
}
