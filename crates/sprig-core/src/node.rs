use std::fmt;
use std::rc::Rc;

use lasso::Spur;

use crate::env::Target;
use crate::ops::NativeOp;
use crate::token::TokenTree;
use crate::value::{with_resolved, Value};

/// Parameters and body of a `lambda` form. Shared between the node that
/// defines it, every closure created from it, and compiled code caches.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaDef {
    pub params: Vec<Spur>,
    pub body: Node,
}

/// A classified form. Every kind is both evaluable by the tree walker and
/// compilable to opcodes; both must agree on the result.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Children evaluated in order; the last value is the result.
    Suite(Vec<Node>),
    Atom(Value),
    Nil,
    True,
    False,
    Var(Spur),
    Set {
        target: Target,
        name: Spur,
        value: Box<Node>,
    },
    Ret(Box<Node>),
    Lambda(Rc<LambdaDef>),
    If {
        cond: Box<Node>,
        then: Box<Node>,
        else_: Option<Box<Node>>,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
    },
    Call {
        name: Spur,
        args: Vec<Node>,
        tail: bool,
    },
    /// Operators, comparisons, pair and list forms, assertions, printing and
    /// `parse`: operands are evaluated, then handed to a native op.
    Apply {
        op: NativeOp,
        args: Vec<Node>,
    },
    Quoted(Rc<Node>),
    Read,
    Eval(Box<Node>),
    /// A form no rule matched. Fails when evaluated or compiled.
    Unclassified {
        tree: TokenTree,
        reason: String,
    },
}

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Suite(_) => "Suite",
            Node::Atom(_) => "Atom",
            Node::Nil => "Nil",
            Node::True => "True",
            Node::False => "False",
            Node::Var(_) => "Var",
            Node::Set {
                target: Target::Local,
                ..
            } => "Set",
            Node::Set {
                target: Target::Global,
                ..
            } => "SetGlobal",
            Node::Set {
                target: Target::Closure,
                ..
            } => "SetClosure",
            Node::Ret(_) => "Ret",
            Node::Lambda(_) => "Lambda",
            Node::If { .. } => "If",
            Node::While { .. } => "While",
            Node::Call { tail: false, .. } => "Call",
            Node::Call { tail: true, .. } => "TailCall",
            Node::Apply { op, .. } => op.kind(),
            Node::Quoted(_) => "Quoted",
            Node::Read => "Read",
            Node::Eval(_) => "Eval",
            Node::Unclassified { .. } => "Unclassified",
        }
    }

    pub fn atom(v: Value) -> Node {
        Node::Atom(v)
    }

    pub fn suite(children: Vec<Node>) -> Node {
        Node::Suite(children)
    }

    pub fn apply(op: NativeOp, args: Vec<Node>) -> Node {
        Node::Apply { op, args }
    }

    pub fn unclassified(tree: TokenTree, reason: impl Into<String>) -> Node {
        Node::Unclassified {
            tree,
            reason: reason.into(),
        }
    }

    pub fn is_unclassified(&self) -> bool {
        matches!(self, Node::Unclassified { .. })
    }
}

fn write_name(f: &mut fmt::Formatter<'_>, name: Spur) -> fmt::Result {
    with_resolved(name, |s| f.write_str(s))
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Node]) -> fmt::Result {
    for arg in args {
        write!(f, " {arg}")?;
    }
    Ok(())
}

/// Renders the form back as source text.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Suite(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Node::Atom(v) => write!(f, "{v}"),
            Node::Nil => write!(f, "nil"),
            Node::True => write!(f, "true"),
            Node::False => write!(f, "false"),
            Node::Var(name) => write_name(f, *name),
            Node::Set {
                target,
                name,
                value,
            } => {
                write!(f, "({} ", target.keyword())?;
                write_name(f, *name)?;
                write!(f, " {value})")
            }
            Node::Ret(value) => write!(f, "(ret {value})"),
            Node::Lambda(def) => {
                write!(f, "(lambda (")?;
                for (i, param) in def.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write_name(f, *param)?;
                }
                write!(f, ") {})", def.body)
            }
            Node::If { cond, then, else_ } => {
                write!(f, "(if {cond} {then}")?;
                if let Some(e) = else_ {
                    write!(f, " {e}")?;
                }
                write!(f, ")")
            }
            Node::While { cond, body } => write!(f, "(while {cond} {body})"),
            Node::Call { name, args, tail } => {
                write!(f, "({}", if *tail { "^" } else { "" })?;
                write_name(f, *name)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Node::Apply { op, args } => {
                write!(f, "({}", op.token())?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Node::Quoted(inner) => write!(f, "(quoted {inner})"),
            Node::Read => write!(f, "(read)"),
            Node::Eval(inner) => write!(f, "(eval {inner})"),
            Node::Unclassified { tree, .. } => write!(f, "{tree}"),
        }
    }
}
