use std::cmp::Ordering;
use std::fmt;

use crate::check_arity;
use crate::context::EvalContext;
use crate::error::ProgramError;
use crate::format;
use crate::number::Number;
use crate::value::Value;

/// The built-in operations an `Apply` node or a `CallNative` opcode can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeOp {
    Pos,
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    And,
    Or,
    Xor,
    Not,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Cons,
    Car,
    Cdr,
    List,
    Assert,
    Print,
    Printf,
    Printfs,
    Format,
    Parse,
}

/// Arithmetic and logical operators as `(token, operand count, op)`. `+` and
/// `-` appear twice: one operand is identity/negation, two is the binary form.
pub const OPERATORS: &[(&str, usize, NativeOp)] = &[
    ("+", 1, NativeOp::Pos),
    ("-", 1, NativeOp::Neg),
    ("+", 2, NativeOp::Add),
    ("-", 2, NativeOp::Sub),
    ("*", 2, NativeOp::Mul),
    ("/", 2, NativeOp::Div),
    ("%", 2, NativeOp::Mod),
    ("**", 2, NativeOp::Pow),
    ("and", 2, NativeOp::And),
    ("or", 2, NativeOp::Or),
    ("xor", 2, NativeOp::Xor),
    ("not", 1, NativeOp::Not),
];

pub const COMPARISONS: &[(&str, NativeOp)] = &[
    ("==", NativeOp::Eq),
    ("<>", NativeOp::Ne),
    ("<", NativeOp::Lt),
    (">", NativeOp::Gt),
    ("<=", NativeOp::Le),
    (">=", NativeOp::Ge),
];

pub fn is_operator(token: &str) -> bool {
    OPERATORS.iter().any(|(t, _, _)| *t == token)
}

pub fn operator(token: &str, arity: usize) -> Option<NativeOp> {
    OPERATORS
        .iter()
        .find(|(t, n, _)| *t == token && *n == arity)
        .map(|(_, _, op)| *op)
}

pub fn comparison(token: &str) -> Option<NativeOp> {
    COMPARISONS
        .iter()
        .find(|(t, _)| *t == token)
        .map(|(_, op)| *op)
}

fn number<'a>(op: NativeOp, v: &'a Value) -> Result<&'a Number, ProgramError> {
    v.as_number()
        .ok_or_else(|| ProgramError::type_error(format!("number for {}", op.token()), v.type_name()))
}

fn string<'a>(op: NativeOp, v: &'a Value) -> Result<&'a str, ProgramError> {
    v.as_str()
        .ok_or_else(|| ProgramError::type_error(format!("string for {}", op.token()), v.type_name()))
}

fn pair_field(op: NativeOp, v: &Value, head: bool) -> Result<Value, ProgramError> {
    let pair = v
        .as_pair()
        .ok_or_else(|| ProgramError::type_error(format!("pair for {}", op.token()), v.type_name()))?;
    Ok(if head { pair.car.clone() } else { pair.cdr.clone() })
}

fn order(op: NativeOp, a: &Value, b: &Value) -> Result<Ordering, ProgramError> {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => Ok(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => Err(ProgramError::type_error(
            format!("two numbers or two strings for {}", op.token()),
            format!("{} and {}", a.type_name(), b.type_name()),
        )),
    }
}

impl NativeOp {
    /// The source token that names this op.
    pub fn token(self) -> &'static str {
        match self {
            NativeOp::Pos | NativeOp::Add => "+",
            NativeOp::Neg | NativeOp::Sub => "-",
            NativeOp::Mul => "*",
            NativeOp::Div => "/",
            NativeOp::Mod => "%",
            NativeOp::Pow => "**",
            NativeOp::And => "and",
            NativeOp::Or => "or",
            NativeOp::Xor => "xor",
            NativeOp::Not => "not",
            NativeOp::Eq => "==",
            NativeOp::Ne => "<>",
            NativeOp::Lt => "<",
            NativeOp::Gt => ">",
            NativeOp::Le => "<=",
            NativeOp::Ge => ">=",
            NativeOp::Cons => "cons",
            NativeOp::Car => "car",
            NativeOp::Cdr => "cdr",
            NativeOp::List => "list",
            NativeOp::Assert => "assert",
            NativeOp::Print => "print",
            NativeOp::Printf => "printf",
            NativeOp::Printfs => "printfs",
            NativeOp::Format => "format",
            NativeOp::Parse => "parse",
        }
    }

    /// Name used in statistics and debug output.
    pub fn kind(self) -> &'static str {
        match self {
            NativeOp::Pos => "Pos",
            NativeOp::Neg => "Neg",
            NativeOp::Add => "Add",
            NativeOp::Sub => "Sub",
            NativeOp::Mul => "Mul",
            NativeOp::Div => "Div",
            NativeOp::Mod => "Mod",
            NativeOp::Pow => "Pow",
            NativeOp::And => "And",
            NativeOp::Or => "Or",
            NativeOp::Xor => "Xor",
            NativeOp::Not => "Not",
            NativeOp::Eq => "Eq",
            NativeOp::Ne => "Ne",
            NativeOp::Lt => "Lt",
            NativeOp::Gt => "Gt",
            NativeOp::Le => "Le",
            NativeOp::Ge => "Ge",
            NativeOp::Cons => "Cons",
            NativeOp::Car => "Car",
            NativeOp::Cdr => "Cdr",
            NativeOp::List => "List",
            NativeOp::Assert => "Assert",
            NativeOp::Print => "Print",
            NativeOp::Printf => "Printf",
            NativeOp::Printfs => "Printfs",
            NativeOp::Format => "Format",
            NativeOp::Parse => "Parse",
        }
    }

    /// Apply the op to already-evaluated operands, leftmost first.
    pub fn apply(self, ctx: &EvalContext, args: &[Value]) -> Result<Value, ProgramError> {
        let name = self.token();
        match self {
            NativeOp::Pos => {
                check_arity!(args, name, 1);
                Ok(Value::num(number(self, &args[0])?.clone()))
            }
            NativeOp::Neg => {
                check_arity!(args, name, 1);
                Ok(Value::num(number(self, &args[0])?.neg()))
            }
            NativeOp::Add => {
                check_arity!(args, name, 2);
                if let (Value::Str(a), Value::Str(b)) = (&args[0], &args[1]) {
                    return Ok(Value::string(&format!("{a}{b}")));
                }
                Ok(Value::num(number(self, &args[0])?.add(number(self, &args[1])?)))
            }
            NativeOp::Sub => {
                check_arity!(args, name, 2);
                Ok(Value::num(number(self, &args[0])?.sub(number(self, &args[1])?)))
            }
            NativeOp::Mul => {
                check_arity!(args, name, 2);
                Ok(Value::num(number(self, &args[0])?.mul(number(self, &args[1])?)))
            }
            NativeOp::Div => {
                check_arity!(args, name, 2);
                Ok(Value::num(number(self, &args[0])?.div(number(self, &args[1])?)?))
            }
            NativeOp::Mod => {
                check_arity!(args, name, 2);
                Ok(Value::num(number(self, &args[0])?.rem(number(self, &args[1])?)?))
            }
            NativeOp::Pow => {
                check_arity!(args, name, 2);
                Ok(Value::num(number(self, &args[0])?.pow(number(self, &args[1])?)?))
            }
            NativeOp::And => {
                check_arity!(args, name, 2);
                Ok(Value::Bool(args[0].is_truthy() && args[1].is_truthy()))
            }
            NativeOp::Or => {
                check_arity!(args, name, 2);
                Ok(Value::Bool(args[0].is_truthy() || args[1].is_truthy()))
            }
            NativeOp::Xor => {
                check_arity!(args, name, 2);
                Ok(Value::Bool(args[0].is_truthy() != args[1].is_truthy()))
            }
            NativeOp::Not => {
                check_arity!(args, name, 1);
                Ok(Value::Bool(!args[0].is_truthy()))
            }
            NativeOp::Eq => {
                check_arity!(args, name, 2);
                Ok(Value::Bool(args[0] == args[1]))
            }
            NativeOp::Ne => {
                check_arity!(args, name, 2);
                Ok(Value::Bool(args[0] != args[1]))
            }
            NativeOp::Lt | NativeOp::Gt | NativeOp::Le | NativeOp::Ge => {
                check_arity!(args, name, 2);
                let ord = order(self, &args[0], &args[1])?;
                Ok(Value::Bool(match self {
                    NativeOp::Lt => ord == Ordering::Less,
                    NativeOp::Gt => ord == Ordering::Greater,
                    NativeOp::Le => ord != Ordering::Greater,
                    _ => ord != Ordering::Less,
                }))
            }
            NativeOp::Cons => {
                check_arity!(args, name, 2);
                Ok(Value::cons(args[0].clone(), args[1].clone()))
            }
            NativeOp::Car => {
                check_arity!(args, name, 1);
                pair_field(self, &args[0], true)
            }
            NativeOp::Cdr => {
                check_arity!(args, name, 1);
                pair_field(self, &args[0], false)
            }
            NativeOp::List => {
                check_arity!(args, name, 1..);
                Ok(Value::list(args.to_vec()))
            }
            NativeOp::Assert => {
                check_arity!(args, name, 2);
                if args[0].is_truthy() {
                    Ok(Value::Nil)
                } else {
                    Err(ProgramError::Assertion(args[1].clone()))
                }
            }
            NativeOp::Print => {
                let line = args
                    .iter()
                    .map(Value::to_plain_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                ctx.write_output(&format!("{line}\n"))?;
                Ok(Value::Nil)
            }
            NativeOp::Printf => {
                check_arity!(args, name, 1..);
                let text = format::interpolate(string(self, &args[0])?, &args[1..])?;
                ctx.write_output(&text)?;
                Ok(Value::Nil)
            }
            NativeOp::Printfs => {
                // The separator is accepted and ignored.
                check_arity!(args, name, 2..);
                let text = format::interpolate(string(self, &args[0])?, &args[2..])?;
                ctx.write_output(&text)?;
                Ok(Value::Nil)
            }
            NativeOp::Format => {
                check_arity!(args, name, 1..=2);
                let spec = match args.get(1) {
                    Some(spec) => string(self, spec)?,
                    None => "",
                };
                Ok(Value::string(&format::format_value(&args[0], spec)?))
            }
            NativeOp::Parse => {
                check_arity!(args, name, 1);
                let node = ctx.parse_source(string(self, &args[0])?)?;
                Ok(Value::node(node))
            }
        }
    }
}

impl fmt::Display for NativeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}
