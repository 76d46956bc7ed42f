// Demo driver for the mkvsynth evaluator.
//
// The lexer/parser is an external collaborator: this binary builds the
// AST the parser would have produced for a couple of sample scripts
// directly, then runs it through `eval::ex`, the same way the
// library's own tests do. A real embedder wires a parser in front of
// `eval::ex`; this is here so the crate has something to run.

use std::env::args;
use std::process::exit;
use std::rc::Rc;

use mkvsynth_eval::ast::{AssignOpCode, BinOpCode, Node, OpKind};
use mkvsynth_eval::builtins;
use mkvsynth_eval::config::EvalConfig;
use mkvsynth_eval::env::Environment;
use mkvsynth_eval::eval;

// Links a Vec of nodes into the `next`-threaded list the evaluator
// expects for argument/parameter/statement sequences.
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

fn fn_def(name: &str, params: Vec<Node>, body: Node) -> Node {
    let mut ops = vec![Node::id(name)];
    if let Some(params) = chain(params) {
        ops.push(params);
    }
    ops.push(body);
    Node::op(OpKind::FnDef, ops)
}

// `fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); }
//  print(fact(5));` -- recursive factorial.
fn factorial_program() -> Node {
    let body = seq(vec![
        if_stmt(bin(BinOpCode::Le, Node::id("n"), Node::num(1.0)), ret(Node::num(1.0)), None),
        ret(bin(
            BinOpCode::Mul,
            Node::id("n"),
            call("fact", vec![bin(BinOpCode::Sub, Node::id("n"), Node::num(1.0))]),
        )),
    ]);
    seq(vec![
        fn_def("fact", vec![Node::id("n")], body),
        call("print", vec![call("fact", vec![Node::num(5.0)])]),
    ])
}

// `c = MKVsource("in.mkv").crop(left=8).bilinearResize(width=640);
//  c.x264Encode("out.264"); go();` -- a clip filter chain terminated
// by `go()`, with the method-chain sugar lowered to `Chain` nodes by
// hand since there's no parser in this crate to do the lowering for us.
fn filter_chain_program() -> Node {
    let source = call("MKVsource", vec![Node::string("in.mkv").expect("no escapes")]);
    let cropped = Node::op(
        OpKind::Chain,
        vec![source, Node::id("crop"), Node::opt_arg("left", Node::num(8.0))],
    );
    let resized = Node::op(
        OpKind::Chain,
        vec![
            cropped,
            Node::id("bilinearResize"),
            Node::opt_arg("width", Node::num(640.0)),
        ],
    );
    seq(vec![
        Node::op(OpKind::Assign(AssignOpCode::Assign), vec![Node::id("c"), resized]),
        Node::op(
            OpKind::Chain,
            vec![Node::id("c"), Node::id("x264Encode"), Node::string("out.264").expect("no escapes")],
        ),
        call("go", vec![]),
    ])
}

fn run(env: &Rc<Environment>, program: &Node) -> Result<(), String> {
    eval::ex(env, program).map(|_| ()).map_err(|e| e.message().to_string())
}

fn main() {
    let config = match args().nth(1) {
        Some(path) => EvalConfig::from_ron_file(&path).unwrap_or_else(|e| {
            eprintln!("couldn't load config from {}: {}", path, e);
            exit(1);
        }),
        None => EvalConfig::default(),
    };

    let env = Rc::new(Environment::root(config));
    builtins::install(&env);

    // A fatal evaluation error aborts the whole script: one reporting
    // channel, no recovery, nonzero exit.
    if let Err(message) = run(&env, &factorial_program()) {
        eprintln!("mkvsynth: {}", message);
        exit(1);
    }

    let pipeline_env = Rc::new(Environment::root(EvalConfig::default()));
    builtins::install(&pipeline_env);
    if let Err(message) = run(&pipeline_env, &filter_chain_program()) {
        eprintln!("mkvsynth: {}", message);
        exit(1);
    }
}
