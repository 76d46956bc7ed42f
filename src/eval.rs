// The tree-walking evaluator: identifier resolution, dereference,
// assignment, operators, call machinery, and the statement executor
// `ex`.
//
// Grounded on `typechecker.rs`, which already recurses an `Expr` tree
// against an `Env` with one match arm per variant (`eval_expr`
// dispatching to `eval_id`/`eval_dot`/`eval_binop`/...); this module
// is the same shape, evaluating to runtime values instead of types
// since here there is no separate static pass.
//
// Non-local `return` is modeled as the idiomatic substitute for the
// source's setjmp/longjmp: `ex` returns a `Flow`, checked at each
// statement boundary via the `propagate!` macro, instead of
// unwinding. This mirrors the `return_value: Option<Value>` /
// "is_some() then break" idiom common to tree-walkers in the wild
// (see e.g. rustle's `Interpreter::exec_block`).

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{
    copy, split_mandatory_optional, AssignOpCode, BinOpCode, FnData, Node, NodeKind, OpKind,
    Param, TypeTag, UserFn, VarData,
};
use crate::builtins;
use crate::env::Environment;
use crate::error::{EvalError, EvalResult};

// The result of running one AST node: either a plain value or a
// `return` in progress, unwound to the nearest call frame.
#[derive(Clone, Debug)]
pub enum Flow {
    Normal(Node),
    Returning(Node),
}

impl Flow {
    pub fn into_inner(self) -> Node {
        match self {
            Flow::Normal(v) | Flow::Returning(v) => v,
        }
    }
}

// Unwraps a `Flow`, propagating an in-flight `Returning` straight out
// of the enclosing `ex` call rather than treating it as a plain value.
// This is the "checked at every statement boundary" substitute for
// longjmp.
macro_rules! propagate {
    ($flow:expr) => {{
        match $flow? {
            Flow::Normal(v) => v,
            Flow::Returning(v) => return Ok(Flow::Returning(v)),
        }
    }};
}

// Evaluates `node` purely for its value: any in-flight `return` is
// resolved to its operand rather than propagated further. Used where
// the grammar only ever admits expressions (call arguments, operator
// operands) so a `Returning` could not meaningfully escape past this
// point anyway.
pub fn eval_value(env: &Rc<Environment>, node: &Node) -> EvalResult<Node> {
    Ok(ex(env, node)?.into_inner())
}

/// The root dispatcher: resolves identifiers, dereferences variables,
/// auto-invokes zero-argument functions, then recurses into the
/// Op-specific cases.
pub fn ex(env: &Rc<Environment>, node: &Node) -> EvalResult<Flow> {
    let mut p = match &node.kind {
        NodeKind::Id(_) => identify(env, node),
        _ => node.clone(),
    };

    if let NodeKind::Var(_) = &p.kind {
        p = deref(&p)?;
    }

    if let NodeKind::Fn(_) = &p.kind {
        p = fnct_call(env, &p, None)?;
    }

    let (op, ops, next) = match p.kind {
        NodeKind::Op(op, ops) => (op, ops, p.next),
        _ => return Ok(Flow::Normal(p)),
    };

    ex_op(env, op, &ops, next.as_deref())
}

fn ex_op(env: &Rc<Environment>, op: OpKind, ops: &[Node], next: Option<&Node>) -> EvalResult<Flow> {
    match op {
        OpKind::FnDef => {
            // `ops` is `[name, body]` when the parameter list is empty
            // and `[name, params, body]` otherwise -- params can't sit
            // in a fixed middle slot the way `If`'s optional else
            // branch sits in a fixed last one, so arity picks the
            // reading instead of a sentinel "empty list" node.
            let (params, body) = match ops {
                [_, body] => (None, body),
                [_, params, body] => (Some(params), body),
                _ => unreachable!("parser only produces 2- or 3-ary FnDef nodes"),
            };
            fn_define(env, &ops[0], params, body)?;
            Ok(Flow::Normal(Node::fn_sentinel()))
        }
        OpKind::If => {
            let cond = propagate!(ex(env, &ops[0]));
            let is_true = expect_bool(&cond, "if")?;
            if is_true {
                ex(env, &ops[1])
            } else if let Some(else_branch) = ops.get(2) {
                ex(env, else_branch)
            } else {
                Ok(Flow::Normal(Node::fn_sentinel()))
            }
        }
        OpKind::Fnct => {
            let callee = identify(env, &ops[0]);
            let args = reduce_args(env, ops.get(1))?;
            Ok(Flow::Normal(fnct_call(env, &callee, args.as_ref())?))
        }
        OpKind::Chain => {
            // `a.f(b, c)` lowers to `f(a, b, c)`: the left-hand value
            // is prepended to the reduced argument list before the
            // call is issued.
            let lhs = propagate!(ex(env, &ops[0]));
            let rest = reduce_args(env, ops.get(2))?;
            let args = Node { next: rest.map(Box::new), ..lhs };
            let callee = identify(env, &ops[1]);
            Ok(Flow::Normal(fnct_call(env, &callee, Some(&args))?))
        }
        OpKind::Default => {
            let value = propagate!(ex(env, &ops[1]));
            set_default(env, &ops[0], value)?;
            Ok(Flow::Normal(Node::fn_sentinel()))
        }
        OpKind::Return => {
            let value = propagate!(ex(env, &ops[0]));
            Ok(Flow::Returning(value))
        }
        OpKind::Assign(op_code) => {
            let target = identify(env, &ops[0]);
            let rhs = propagate!(ex(env, &ops[1]));
            Ok(Flow::Normal(assign(&target, op_code, &rhs)?))
        }
        OpKind::Neg => {
            let operand = propagate!(ex(env, &ops[0]));
            Ok(Flow::Normal(neg(&operand)?))
        }
        OpKind::Not => {
            let operand = propagate!(ex(env, &ops[0]));
            Ok(Flow::Normal(not(&operand)?))
        }
        OpKind::BinOp(code) => {
            let lhs = propagate!(ex(env, &ops[0]));
            let rhs = propagate!(ex(env, &ops[1]));
            Ok(Flow::Normal(bin_op(code, &lhs, &rhs)?))
        }
        OpKind::Tern => {
            let cond = propagate!(ex(env, &ops[0]));
            let is_true = expect_bool(&cond, "arg 1 of ?|")?;
            if is_true {
                ex(env, &ops[1])
            } else {
                ex(env, &ops[2])
            }
        }
        OpKind::Seq => {
            let left = ex(env, &ops[0])?;
            if let Flow::Returning(v) = left {
                return Ok(Flow::Returning(v));
            }
            ex(env, &ops[1])
        }
    }
    .map(|flow| attach_next(flow, next))
}

fn attach_next(flow: Flow, next: Option<&Node>) -> Flow {
    let next = next.map(|n| Box::new(copy(n)));
    match flow {
        Flow::Normal(v) => Flow::Normal(Node { next, ..v }),
        Flow::Returning(v) => Flow::Returning(v),
    }
}

fn expect_bool(node: &Node, context: &str) -> EvalResult<bool> {
    match &node.kind {
        NodeKind::Bool(b) => Ok(*b),
        _ => Err(EvalError::type_mismatch(format!(
            "{} expected boolean, got {}",
            context,
            node.type_name()
        ))),
    }
}

// ---- identifier resolution --------------------------------------------------

pub fn identify(env: &Rc<Environment>, node: &Node) -> Node {
    let name = match &node.kind {
        NodeKind::Id(name) => name.clone(),
        _ => return copy(node),
    };

    let resolved_kind = if let Some(fun) = env.get_fn(&name) {
        NodeKind::Fn(fun)
    } else if let Some(var) = env.get_var(&name) {
        NodeKind::Var(var)
    } else {
        let var = Rc::new(RefCell::new(VarData {
            name: name.clone(),
            type_tag: TypeTag::Num,
            value: None,
            is_optional: false,
        }));
        env.put_var(var.clone());
        NodeKind::Var(var)
    };

    Node { kind: resolved_kind, next: node.next.as_deref().map(|n| Box::new(copy(n))) }
}

// ---- dereference --------------------------------------------------------------

pub fn deref(node: &Node) -> EvalResult<Node> {
    let var = match &node.kind {
        NodeKind::Var(var) => var,
        _ => return Ok(copy(node)),
    };
    let data = var.borrow();
    match &data.value {
        None => Err(EvalError::uninitialized_variable(&data.name)),
        Some(v) => {
            let mut d = copy(v);
            d.next = node.next.as_deref().map(|n| Box::new(copy(n)));
            Ok(d)
        }
    }
}

// ---- assignment -----------------------------------------------------------------

pub fn assign(target: &Node, op: AssignOpCode, rhs: &Node) -> EvalResult<Node> {
    let var = match &target.kind {
        NodeKind::Var(var) => var,
        // `=` to a non-Var target is "can't assign to a constant";
        // a compound operator (`+=` and friends) to the same target
        // is "can't modify" it instead -- two distinct error categories
        // for what is otherwise the same malformed-target check.
        _ if op == AssignOpCode::Assign => return Err(EvalError::assign_to_constant(target.type_name())),
        _ => return Err(EvalError::modify_constant(target.type_name())),
    };

    if op == AssignOpCode::Assign {
        if rhs.type_tag().is_none() {
            return Err(EvalError::type_mismatch(format!(
                "can't assign type {} to variable",
                rhs.type_name()
            )));
        }
        var.borrow_mut().value = Some(copy(rhs));
        return Ok(Node::var_node(var.clone()));
    }

    let name = var.borrow().name.clone();
    let cur_num = {
        let data = var.borrow();
        match &data.value {
            None => return Err(EvalError::uninitialized_variable(&name)),
            Some(v) => match &v.kind {
                NodeKind::Num(n) => *n,
                _ => return Err(EvalError::modify_non_numeric(&name)),
            },
        }
    };
    let rhs_num = match &rhs.kind {
        NodeKind::Num(n) => *n,
        _ => {
            return Err(EvalError::type_mismatch(format!(
                "can't modify variable {} with non-numeric type (expected number, got {})",
                name,
                rhs.type_name()
            )))
        }
    };
    let new_val = match op {
        AssignOpCode::AddEq => cur_num + rhs_num,
        AssignOpCode::SubEq => cur_num - rhs_num,
        AssignOpCode::MulEq => cur_num * rhs_num,
        AssignOpCode::DivEq => cur_num / rhs_num,
        AssignOpCode::PowEq => cur_num.powf(rhs_num),
        AssignOpCode::ModEq => ((cur_num as i64) % (rhs_num as i64)) as f64,
        AssignOpCode::Assign => unreachable!(),
    };
    var.borrow_mut().value = Some(Node::num(new_val));
    deref(&Node::var_node(var.clone()))
}

// ---- operator evaluator -----------------------------------------------------

// Factors out the "both operands must be this one tag, else type
// mismatch naming the side" boilerplate, the same way the `operator!`
// macro in vm.rs factors out its own arithmetic/logic match tables.
macro_rules! arith {
    ($lhs:expr, $rhs:expr, $sym:expr, $op:tt) => {{
        let a = expect_num($lhs, "LHS of", $sym)?;
        let b = expect_num($rhs, "RHS of", $sym)?;
        Ok(Node::num(a $op b))
    }};
}

fn expect_num(node: &Node, side: &str, sym: &str) -> EvalResult<f64> {
    match &node.kind {
        NodeKind::Num(n) => Ok(*n),
        _ => Err(EvalError::type_mismatch(format!(
            "{} {} expected number, got {}",
            side,
            sym,
            node.type_name()
        ))),
    }
}

pub fn bin_op(code: BinOpCode, lhs: &Node, rhs: &Node) -> EvalResult<Node> {
    if code.is_arithmetic() {
        return match code {
            BinOpCode::Add => arith!(lhs, rhs, code.symbol(), +),
            BinOpCode::Sub => arith!(lhs, rhs, code.symbol(), -),
            BinOpCode::Mul => arith!(lhs, rhs, code.symbol(), *),
            BinOpCode::Div => arith!(lhs, rhs, code.symbol(), /),
            BinOpCode::Pow => {
                let a = expect_num(lhs, "LHS of", code.symbol())?;
                let b = expect_num(rhs, "RHS of", code.symbol())?;
                Ok(Node::num(a.powf(b)))
            }
            BinOpCode::Mod => {
                let a = expect_num(lhs, "LHS of", code.symbol())?;
                let b = expect_num(rhs, "RHS of", code.symbol())?;
                Ok(Node::num(((a as i64) % (b as i64)) as f64))
            }
            _ => unreachable!(),
        };
    }

    // Comparison/logical band: operand types must match exactly, no
    // implicit coercion. Comparing differing tags is always an error,
    // never false -- unlike vm.rs's own `eq`, which evaluates to
    // `false` on a type mismatch; this evaluator is stricter here (see
    // DESIGN.md).
    let lhs_tag = lhs.type_tag();
    let rhs_tag = rhs.type_tag();
    if lhs_tag != rhs_tag {
        return Err(EvalError::type_mismatch(format!(
            "cannot compare {} to {}",
            lhs.type_name(),
            rhs.type_name()
        )));
    }

    match (&lhs.kind, &rhs.kind) {
        (NodeKind::Num(a), NodeKind::Num(b)) => {
            let result = match code {
                BinOpCode::Eq => a == b,
                BinOpCode::Ne => a != b,
                BinOpCode::Gt => a > b,
                BinOpCode::Lt => a < b,
                BinOpCode::Ge => a >= b,
                BinOpCode::Le => a <= b,
                _ => {
                    return Err(EvalError::type_mismatch(format!(
                        "operator {} is not defined for numbers",
                        code.symbol()
                    )))
                }
            };
            Ok(Node::boolean(result))
        }
        (NodeKind::Bool(a), NodeKind::Bool(b)) => {
            let result = match code {
                BinOpCode::Eq => a == b,
                BinOpCode::Ne => a != b,
                BinOpCode::Or => *a || *b,
                BinOpCode::And => *a && *b,
                _ => {
                    return Err(EvalError::type_mismatch(format!(
                        "operator {} is not defined for booleans",
                        code.symbol()
                    )))
                }
            };
            Ok(Node::boolean(result))
        }
        (NodeKind::Str(a), NodeKind::Str(b)) => {
            let result = match code {
                BinOpCode::Eq => a == b,
                BinOpCode::Ne => a != b,
                _ => {
                    return Err(EvalError::type_mismatch(format!(
                        "operator {} is not defined for strings",
                        code.symbol()
                    )))
                }
            };
            Ok(Node::boolean(result))
        }
        _ => Err(EvalError::type_mismatch(format!(
            "comparison operators are not supported for type {} (yet)",
            lhs.type_name()
        ))),
    }
}

pub fn neg(node: &Node) -> EvalResult<Node> {
    match &node.kind {
        NodeKind::Num(n) => Ok(Node::num(-n)),
        _ => Err(EvalError::type_mismatch(format!(
            "arg 1 of - expected number, got {}",
            node.type_name()
        ))),
    }
}

pub fn not(node: &Node) -> EvalResult<Node> {
    match &node.kind {
        NodeKind::Bool(b) => Ok(Node::boolean(!b)),
        _ => Err(EvalError::type_mismatch(format!(
            "arg 1 of ! expected boolean, got {}",
            node.type_name()
        ))),
    }
}

// ---- call machinery -----------------------------------------------------------

// Right-to-left argument reduction: each node is evaluated;
// if the result is an OptArg, its carried value is evaluated too; the
// `next` topology is restored afterwards.
fn reduce_args(env: &Rc<Environment>, args: Option<&Node>) -> EvalResult<Option<Node>> {
    let node = match args {
        None => return Ok(None),
        Some(node) => node,
    };
    let tail = reduce_args(env, node.next.as_deref())?;
    let mut value = eval_value(env, node)?;
    if let NodeKind::OptArg { name, value: inner } = value.kind {
        let evaluated = eval_value(env, &inner)?;
        value = Node::bare(NodeKind::OptArg { name, value: Box::new(evaluated) });
    }
    value.next = tail.map(Box::new);
    Ok(Some(value))
}

fn fn_define(env: &Rc<Environment>, name: &Node, params: Option<&Node>, body: &Node) -> EvalResult<()> {
    let fn_name: Rc<str> = match &name.kind {
        NodeKind::Id(n) => n.clone(),
        _ => {
            return Err(EvalError::assign_to_constant(name.type_name()));
        }
    };

    let (mand, opt) = split_mandatory_optional(
        params,
        |n| matches!(&n.kind, NodeKind::OptArg { .. }),
        &format!("function {}", fn_name),
    )?;

    let to_param = |n: &Node, optional: bool| -> EvalResult<Param> {
        match &n.kind {
            NodeKind::OptArg { name, value } => Ok(Param {
                name: name.clone(),
                type_tag: value.type_tag().ok_or_else(|| {
                    EvalError::type_mismatch(format!(
                        "optional parameter {} has no declared type",
                        name
                    ))
                })?,
                is_optional: optional,
            }),
            NodeKind::Id(id) => Ok(Param { name: id.clone(), type_tag: TypeTag::Num, is_optional: optional }),
            _ => Err(EvalError::type_mismatch("malformed parameter")),
        }
    };

    let params_vec = mand.iter().map(|n| to_param(n, false)).collect::<EvalResult<Vec<_>>>()?;
    let opts_vec = opt.iter().map(|n| to_param(n, true)).collect::<EvalResult<Vec<_>>>()?;

    env.put_fn(Rc::new(FnData::User(UserFn {
        name: fn_name,
        params: params_vec,
        opts: opts_vec,
        body: copy(body),
    })));
    Ok(())
}

fn fnct_call(env: &Rc<Environment>, fn_node: &Node, args: Option<&Node>) -> EvalResult<Node> {
    let fun = match &fn_node.kind {
        NodeKind::Fn(f) => f.clone(),
        // A variable may itself hold a Fn value (spec.md §3.1: `Var.value`
        // may be tagged Fn). Dereference one level before giving up on
        // the callee instead of rejecting it outright.
        NodeKind::Var(v) => {
            let data = v.borrow();
            match &data.value {
                None => return Err(EvalError::undefined_function(&data.name)),
                Some(Node { kind: NodeKind::Fn(f), .. }) => f.clone(),
                Some(_) => {
                    return Err(EvalError::type_mismatch(format!(
                        "expected function name before '(' (got {})",
                        data.value.as_ref().expect("checked above").type_name()
                    )))
                }
            }
        }
        _ => {
            return Err(EvalError::type_mismatch(format!(
                "expected function name before '(' (got {})",
                fn_node.type_name()
            )))
        }
    };

    match &*fun {
        FnData::Core(core) => (core.ptr)(args),
        FnData::User(user) => user_def_fn_call(env, user, args),
    }
}

fn user_def_fn_call(
    env: &Rc<Environment>,
    user: &UserFn,
    args: Option<&Node>,
) -> EvalResult<Node> {
    if env.depth + 1 > env.config.max_call_depth {
        return Err(EvalError::out_of_memory(&format!(
            "call depth exceeded in {}",
            user.name
        )));
    }

    let frame = Rc::new(Environment::chain(env));

    let (mand_args, opt_args) = split_mandatory_optional(
        args,
        |n| matches!(&n.kind, NodeKind::OptArg { .. }),
        &format!("function {}", user.name),
    )?;

    if mand_args.len() != user.params.len() {
        return Err(EvalError::arity_mismatch(
            &user.name,
            user.params.len(),
            mand_args.len(),
            true,
        ));
    }

    for (i, (param, arg)) in user.params.iter().zip(mand_args.iter()).enumerate() {
        match arg.type_tag() {
            Some(tag) if tag == param.type_tag => {}
            other => {
                return Err(EvalError::type_mismatch(format!(
                    "arg {} of {} expected {}, got {}",
                    i + 1,
                    user.name,
                    param.type_tag.name(),
                    other.map_or(arg.type_name(), TypeTag::name)
                )))
            }
        }
        let var = Rc::new(RefCell::new(VarData {
            name: param.name.clone(),
            type_tag: param.type_tag,
            value: Some(copy(arg)),
            is_optional: false,
        }));
        frame.put_var(var);
    }

    for param in &user.opts {
        let var = Rc::new(RefCell::new(VarData {
            name: param.name.clone(),
            type_tag: param.type_tag,
            value: None,
            is_optional: true,
        }));
        frame.put_var(var);
    }

    for arg in &opt_args {
        let (name, value) = match &arg.kind {
            NodeKind::OptArg { name, value } => (name.clone(), value.as_ref()),
            _ => unreachable!("split_mandatory_optional only classifies OptArg as optional"),
        };
        let param = user
            .opts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| EvalError::not_optional_parameter(&name, &user.name))?;
        match value.type_tag() {
            Some(tag) if tag == param.type_tag => {}
            other => {
                return Err(EvalError::type_mismatch(format!(
                    "opt arg {} of {} expected {}, got {}",
                    name,
                    user.name,
                    param.type_tag.name(),
                    other.map_or(value.type_name(), TypeTag::name)
                )))
            }
        }
        let target = frame
            .get_var_local(&name)
            .expect("optional parameter was registered above");
        target.borrow_mut().value = Some(copy(value));
    }

    let flow = ex(&frame, &copy(&user.body))?;
    Ok(match flow {
        Flow::Returning(v) => v,
        Flow::Normal(_) => Node::fn_sentinel(),
    })
}

// ---- default statement ----------------------------------------------------------

fn set_default(env: &Rc<Environment>, param: &Node, value: Node) -> EvalResult<()> {
    let name = match &param.kind {
        NodeKind::Id(name) => name.clone(),
        _ => return Err(EvalError::type_mismatch("default expects a parameter name")),
    };
    let var = env
        .get_var_local(&name)
        .ok_or_else(|| EvalError::uninitialized_variable(&name))?;
    let mut data = var.borrow_mut();
    if data.is_optional && data.value.is_none() {
        data.value = Some(value);
    }
    Ok(())
}

pub use builtins::{check_args, get_opt_arg};
