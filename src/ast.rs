// Node model for the mkvsynth evaluator.
//
// A Node is a tagged variant; Var and Fn wrap an Rc<RefCell<_>> so that
// identify() can hand the caller a fresh Node that still aliases the
// same backing storage as the environment's symbol table slot. In the
// source this is a shallow copy: the ASTnode struct is memcpy'd, but
// the embedded pointer to the Var's storage is copied too, so writes
// through either handle are visible through the other. Op children are
// a Vec rather than a second `next`-threaded list: `next` is reserved
// for argument/parameter list topology.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use enumflags2::BitFlags;
use lazy_static::lazy_static;

use crate::error::{EvalError, EvalResult};
use crate::escape::decode_escapes;

// Power-of-two discriminants so `checkArgs`/`getOptArg` (builtins.rs)
// can test a node's tag against a `BitFlags<TypeTag>` set, the same
// way vm.rs's own `TypeTag`/`TypeSet` do for its operator whitelists.
#[derive(BitFlags, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    Num = 0b00001,
    Bool = 0b00010,
    Str = 0b00100,
    Clip = 0b01000,
    Fn = 0b10000,
}

pub type TypeSet = BitFlags<TypeTag>;

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Num => "number",
            TypeTag::Bool => "boolean",
            TypeTag::Str => "string",
            TypeTag::Clip => "clip",
            TypeTag::Fn => "function",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOpCode {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Or,
    And,
}

impl BinOpCode {
    // Arithmetic codes are < 100, comparison/logical codes are >= 100
    // in the source; kept here as a predicate rather than reviving the
    // magic numbers.
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOpCode::Add
                | BinOpCode::Sub
                | BinOpCode::Mul
                | BinOpCode::Div
                | BinOpCode::Pow
                | BinOpCode::Mod
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOpCode::Add => "+",
            BinOpCode::Sub => "-",
            BinOpCode::Mul => "*",
            BinOpCode::Div => "/",
            BinOpCode::Pow => "^",
            BinOpCode::Mod => "%",
            BinOpCode::Eq => "==",
            BinOpCode::Ne => "!=",
            BinOpCode::Gt => ">",
            BinOpCode::Lt => "<",
            BinOpCode::Ge => ">=",
            BinOpCode::Le => "<=",
            BinOpCode::Or => "||",
            BinOpCode::And => "&&",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOpCode {
    Assign,
    AddEq,
    SubEq,
    MulEq,
    DivEq,
    PowEq,
    ModEq,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    FnDef,
    If,
    Fnct,
    Chain,
    Default,
    Return,
    Assign(AssignOpCode),
    Neg,
    Not,
    BinOp(BinOpCode),
    Tern,
    Seq,
}

// A clip handle, opaque to the evaluator. `input` is the wiring field
// used by the method-chain sugar to record what this filter reads
// from (`p->clipIn` in the original MKVsource/plugin code).
#[derive(Clone, Debug)]
pub struct ClipHandle {
    pub id: u64,
    pub input: Option<Box<Node>>,
}

// Handle identity, not structural equality of the wired-up input chain
// (`Node` carries no `PartialEq` of its own -- `Fn` payloads wrap
// function pointers and `Var` payloads wrap shared mutable cells,
// neither a natural fit for structural comparison).
impl PartialEq for ClipHandle {
    fn eq(&self, other: &ClipHandle) -> bool {
        self.id == other.id
    }
}

#[derive(Debug)]
pub struct VarData {
    pub name: Rc<str>,
    pub type_tag: TypeTag,
    pub value: Option<Node>,
    pub is_optional: bool,
}

pub type VarCell = Rc<RefCell<VarData>>;

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Rc<str>,
    pub type_tag: TypeTag,
    pub is_optional: bool,
}

pub struct UserFn {
    pub name: Rc<str>,
    pub params: Vec<Param>,
    pub opts: Vec<Param>,
    pub body: Node,
}

pub type CoreFnPtr = fn(Option<&Node>) -> EvalResult<Node>;

pub struct CoreFn {
    pub name: &'static str,
    pub ptr: CoreFnPtr,
}

pub enum FnData {
    User(UserFn),
    Core(CoreFn),
}

impl FnData {
    pub fn name(&self) -> &str {
        match self {
            FnData::User(u) => &u.name,
            FnData::Core(c) => c.name,
        }
    }
}

pub type FnCell = Rc<FnData>;

#[derive(Clone)]
pub enum NodeKind {
    Num(f64),
    Bool(bool),
    Str(Rc<str>),
    Clip(ClipHandle),
    Id(Rc<str>),
    Var(VarCell),
    OptArg { name: Rc<str>, value: Box<Node> },
    Fn(FnCell),
    Op(OpKind, Vec<Node>),
}

#[derive(Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub next: Option<Box<Node>>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            NodeKind::Num(n) => write!(f, "Num({})", n),
            NodeKind::Bool(b) => write!(f, "Bool({})", b),
            NodeKind::Str(s) => write!(f, "Str({:?})", s),
            NodeKind::Clip(c) => write!(f, "Clip(#{})", c.id),
            NodeKind::Id(id) => write!(f, "Id({})", id),
            NodeKind::Var(v) => write!(f, "Var({})", v.borrow().name),
            NodeKind::OptArg { name, .. } => write!(f, "OptArg({}=..)", name),
            NodeKind::Fn(fun) => write!(f, "Fn({})", fun.name()),
            NodeKind::Op(op, ops) => write!(f, "Op({:?}, {} ops)", op, ops.len()),
        }
    }
}

impl Node {
    pub fn bare(kind: NodeKind) -> Node {
        Node { kind, next: None }
    }

    pub fn with_next(kind: NodeKind, next: Node) -> Node {
        Node { kind, next: Some(Box::new(next)) }
    }

    pub fn num(n: f64) -> Node {
        Node::bare(NodeKind::Num(n))
    }

    pub fn boolean(b: bool) -> Node {
        Node::bare(NodeKind::Bool(b))
    }

    // Decodes backslash escapes once, at construction time, so that
    // Str payloads are immutable decoded text from here on, in place
    // of re-decoding on every print.
    pub fn string(raw: &str) -> EvalResult<Node> {
        Ok(Node::bare(NodeKind::Str(Rc::from(decode_escapes(raw)?))))
    }

    pub fn id(name: &str) -> Node {
        Node::bare(NodeKind::Id(Rc::from(name)))
    }

    pub fn op(kind: OpKind, ops: Vec<Node>) -> Node {
        Node::bare(NodeKind::Op(kind, ops))
    }

    pub fn opt_arg(name: &str, value: Node) -> Node {
        Node::bare(NodeKind::OptArg { name: Rc::from(name), value: Box::new(value) })
    }

    pub fn fn_node(fun: FnCell) -> Node {
        Node::bare(NodeKind::Fn(fun))
    }

    pub fn var_node(var: VarCell) -> Node {
        Node::bare(NodeKind::Var(var))
    }

    // The "no value returned" placeholder statements resolve to, and
    // most builtins with no meaningful return value of their own use.
    pub fn fn_sentinel() -> Node {
        lazy_static! {
            static ref SENTINEL: FnCell = Rc::new(FnData::Core(CoreFn {
                name: "<sentinel>",
                ptr: |_| Err(EvalError::out_of_memory("sentinel function invoked")),
            }));
        }
        Node::fn_node(SENTINEL.clone())
    }

    pub fn as_num(&self) -> Option<f64> {
        match &self.kind {
            NodeKind::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_tag(&self) -> Option<TypeTag> {
        match &self.kind {
            NodeKind::Num(_) => Some(TypeTag::Num),
            NodeKind::Bool(_) => Some(TypeTag::Bool),
            NodeKind::Str(_) => Some(TypeTag::Str),
            NodeKind::Clip(_) => Some(TypeTag::Clip),
            NodeKind::Fn(_) => Some(TypeTag::Fn),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Num(_) => "number",
            NodeKind::Bool(_) => "boolean",
            NodeKind::Str(_) => "string",
            NodeKind::Clip(_) => "clip",
            NodeKind::Id(_) => "identifier",
            NodeKind::Var(_) => "variable",
            NodeKind::OptArg { .. } => "optional argument",
            NodeKind::Fn(_) => "function",
            NodeKind::Op(..) => "operation",
        }
    }

    // Iterate a `next`-linked list without consuming it.
    pub fn iter(&self) -> NodeIter {
        NodeIter { cur: Some(self) }
    }

    pub fn len_list(&self) -> usize {
        self.iter().count()
    }
}

pub struct NodeIter<'a> {
    cur: Option<&'a Node>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        let node = self.cur.take()?;
        self.cur = node.next.as_deref();
        Some(node)
    }
}

// Deep-copies AST structure: Op children and the `next` chain are
// recursed into; Var/Fn/Clip payloads are Rc-cloned, which is
// precisely what lets identify() hand back a Node that shares storage
// with the environment's table entry.
pub fn copy(n: &Node) -> Node {
    let kind = match &n.kind {
        NodeKind::Num(v) => NodeKind::Num(*v),
        NodeKind::Bool(v) => NodeKind::Bool(*v),
        NodeKind::Str(s) => NodeKind::Str(s.clone()),
        NodeKind::Clip(c) => NodeKind::Clip(c.clone()),
        NodeKind::Id(s) => NodeKind::Id(s.clone()),
        NodeKind::Var(v) => NodeKind::Var(v.clone()),
        NodeKind::OptArg { name, value } => {
            NodeKind::OptArg { name: name.clone(), value: Box::new(copy(value)) }
        }
        NodeKind::Fn(f) => NodeKind::Fn(f.clone()),
        NodeKind::Op(op, ops) => NodeKind::Op(*op, ops.iter().map(copy).collect()),
    };
    Node { kind, next: n.next.as_deref().map(|next| Box::new(copy(next))) }
}

// A parameter/argument list is well-formed iff every optional entry
// follows every mandatory one.
pub fn split_mandatory_optional<'a>(
    list: Option<&'a Node>,
    is_optional: impl Fn(&'a Node) -> bool,
    context: &str,
) -> EvalResult<(Vec<&'a Node>, Vec<&'a Node>)> {
    let mut mandatory = Vec::new();
    let mut optional = Vec::new();
    let mut seen_optional = false;
    let list = match list {
        Some(list) => list,
        None => return Ok((mandatory, optional)),
    };
    for item in list.iter() {
        if is_optional(item) {
            seen_optional = true;
            optional.push(item);
        } else if seen_optional {
            return Err(EvalError::optional_must_follow_mandatory(context));
        } else {
            mandatory.push(item);
        }
    }
    Ok((mandatory, optional))
}
