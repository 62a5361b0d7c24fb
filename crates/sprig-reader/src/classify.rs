//! Token tree → node. Rules are tried in a fixed order and the first match
//! wins; a recognised head with the wrong shape becomes `Node::Unclassified`
//! carrying the reason, so malformed programs fail when run or compiled
//! rather than while reading.

use std::rc::Rc;

use sprig_core::ops::{comparison, is_operator, operator};
use sprig_core::{intern, LambdaDef, NativeOp, Node, Number, Target, TokenTree, Value};

use crate::lexer::unescape;

const BINDING_FORMS: &[&str] = &["set", "setg", "setc", "ret", "lambda"];
const IO_FORMS: &[&str] = &["print", "printf", "printfs", "format"];
const SPECIAL_FORMS: &[&str] = &[
    "assert", "list", "cons", "car", "cdr", "if", "while", "parse", "quoted", "eval", "read",
];

fn is_string_literal(token: &str) -> bool {
    token.len() >= 2 && token.starts_with('"') && token.ends_with('"')
}

/// A leaf that can name a variable or callee.
fn is_name(token: &str) -> bool {
    !token.is_empty()
        && !Number::is_literal(token)
        && !token.starts_with('"')
        && !token.starts_with('^')
        && !matches!(token, "nil" | "true" | "false")
}

fn name_of(tree: &TokenTree) -> Option<&str> {
    tree.as_leaf().filter(|t| is_name(t))
}

fn tail_name(token: &str) -> Option<&str> {
    token.strip_prefix('^').filter(|rest| is_name(rest))
}

pub fn classify(tree: &TokenTree) -> Node {
    match tree {
        TokenTree::Leaf(token) => classify_leaf(tree, token),
        TokenTree::List(items) => classify_list(tree, items),
    }
}

fn classify_leaf(tree: &TokenTree, token: &str) -> Node {
    if let Some(n) = Number::parse_literal(token) {
        return Node::atom(Value::num(n));
    }
    if token.starts_with('"') {
        if !is_string_literal(token) {
            return Node::unclassified(tree.clone(), "malformed string literal");
        }
        return match unescape(token) {
            Ok(s) => Node::atom(Value::string(&s)),
            Err(reason) => Node::unclassified(tree.clone(), reason),
        };
    }
    match token {
        "nil" => Node::Nil,
        "true" => Node::True,
        "false" => Node::False,
        _ => Node::Var(intern(token)),
    }
}

fn classify_all(items: &[TokenTree]) -> Vec<Node> {
    items.iter().map(classify).collect()
}

fn classify_list(tree: &TokenTree, items: &[TokenTree]) -> Node {
    if items.iter().all(TokenTree::is_list) {
        return Node::suite(classify_all(items));
    }
    let Some(head) = items[0].as_leaf() else {
        return Node::unclassified(tree.clone(), "head of a call must be a name");
    };
    let operands = &items[1..];

    if BINDING_FORMS.contains(&head) {
        return binding_form(tree, head, operands);
    }
    if let Some(op) = comparison(head) {
        if operands.len() != 2 {
            return Node::unclassified(tree.clone(), format!("{head} takes 2 operands"));
        }
        return Node::apply(op, classify_all(operands));
    }
    if is_operator(head) {
        return match operator(head, operands.len()) {
            Some(op) => Node::apply(op, classify_all(operands)),
            None => Node::unclassified(
                tree.clone(),
                format!("{head} does not take {} operand(s)", operands.len()),
            ),
        };
    }
    if IO_FORMS.contains(&head) {
        return io_form(tree, head, operands);
    }
    if SPECIAL_FORMS.contains(&head) {
        return special_form(tree, head, operands);
    }

    if items.len() == 1 {
        if let Some(name) = tail_name(head) {
            return call(name, operands, true);
        }
        return match name_of(&items[0]) {
            Some(name) => call(name, operands, false),
            None => Node::unclassified(tree.clone(), format!("{head} is not callable")),
        };
    }
    if let Some(name) = tail_name(head) {
        return call(name, operands, true);
    }
    if let Some(name) = name_of(&items[0]) {
        return call(name, operands, false);
    }
    Node::unclassified(tree.clone(), format!("{head} is not callable"))
}

fn call(name: &str, operands: &[TokenTree], tail: bool) -> Node {
    Node::Call {
        name: intern(name),
        args: classify_all(operands),
        tail,
    }
}

fn binding_form(tree: &TokenTree, head: &str, operands: &[TokenTree]) -> Node {
    let bad = |reason: &str| Node::unclassified(tree.clone(), format!("{head}: {reason}"));
    match head {
        "ret" => match operands {
            [value] => Node::Ret(Box::new(classify(value))),
            _ => bad("expects one operand"),
        },
        "lambda" => {
            let [params, body] = operands else {
                return bad("expects a parameter list and a body");
            };
            let Some(params) = params.as_list() else {
                return bad("parameter list must be a list");
            };
            let mut names = Vec::with_capacity(params.len());
            for param in params {
                match name_of(param) {
                    Some(name) => names.push(intern(name)),
                    None => return bad(&format!("invalid parameter {param}")),
                }
            }
            Node::Lambda(Rc::new(LambdaDef {
                params: names,
                body: classify(body),
            }))
        }
        _ => {
            let Some(target) = Target::from_keyword(head) else {
                return bad("unknown binding form");
            };
            let [name, value] = operands else {
                return bad("expects a name and a value");
            };
            let Some(name) = name_of(name) else {
                return bad(&format!("cannot bind {name}"));
            };
            Node::Set {
                target,
                name: intern(name),
                value: Box::new(classify(value)),
            }
        }
    }
}

fn io_form(tree: &TokenTree, head: &str, operands: &[TokenTree]) -> Node {
    let (op, min, max) = match head {
        "print" => (NativeOp::Print, 0, usize::MAX),
        "printf" => (NativeOp::Printf, 1, usize::MAX),
        "printfs" => (NativeOp::Printfs, 2, usize::MAX),
        _ => (NativeOp::Format, 1, 2),
    };
    if operands.len() < min || operands.len() > max {
        return Node::unclassified(
            tree.clone(),
            format!("{head} does not take {} operand(s)", operands.len()),
        );
    }
    Node::apply(op, classify_all(operands))
}

fn special_form(tree: &TokenTree, head: &str, operands: &[TokenTree]) -> Node {
    let bad = |reason: &str| Node::unclassified(tree.clone(), format!("{head}: {reason}"));
    let fixed = |op: NativeOp, n: usize| {
        if operands.len() == n {
            Node::apply(op, classify_all(operands))
        } else {
            bad(&format!("expects {n} operand(s), got {}", operands.len()))
        }
    };
    match head {
        "assert" => fixed(NativeOp::Assert, 2),
        "cons" => fixed(NativeOp::Cons, 2),
        "car" => fixed(NativeOp::Car, 1),
        "cdr" => fixed(NativeOp::Cdr, 1),
        "parse" => fixed(NativeOp::Parse, 1),
        "list" if operands.is_empty() => bad("expects at least one element"),
        "list" => Node::apply(NativeOp::List, classify_all(operands)),
        "if" => match operands {
            [cond, then] => Node::If {
                cond: Box::new(classify(cond)),
                then: Box::new(classify(then)),
                else_: None,
            },
            [cond, then, else_] => Node::If {
                cond: Box::new(classify(cond)),
                then: Box::new(classify(then)),
                else_: Some(Box::new(classify(else_))),
            },
            _ => bad("expects a condition, a branch and an optional else branch"),
        },
        "while" => match operands {
            [] | [_] => bad("expects a condition and a body"),
            [cond, body] => Node::While {
                cond: Box::new(classify(cond)),
                body: Box::new(classify(body)),
            },
            [cond, body @ ..] => Node::While {
                cond: Box::new(classify(cond)),
                body: Box::new(Node::suite(classify_all(body))),
            },
        },
        "quoted" => match operands {
            [form] => Node::Quoted(Rc::new(classify(form))),
            _ => bad("expects one form"),
        },
        "eval" => match operands {
            [value] => Node::Eval(Box::new(classify(value))),
            _ => bad("expects one operand"),
        },
        "read" => match operands {
            [] => Node::Read,
            _ => bad("takes no operands"),
        },
        _ => bad("unknown special form"),
    }
}
