use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use lasso::{Rodeo, Spur};

use crate::context::Scoping;
use crate::env::{Env, Frame};
use crate::error::ProgramError;
use crate::node::{LambdaDef, Node};
use crate::number::Number;

thread_local! {
    static INTERNER: RefCell<Rodeo> = RefCell::new(Rodeo::default());
}

/// Intern a string, returning a Spur key.
pub fn intern(s: &str) -> Spur {
    INTERNER.with(|r| r.borrow_mut().get_or_intern(s))
}

/// Resolve a Spur key back to a String.
pub fn resolve(spur: Spur) -> String {
    INTERNER.with(|r| r.borrow().resolve(&spur).to_string())
}

/// Resolve a Spur and call f with the &str, avoiding allocation.
pub fn with_resolved<F, R>(spur: Spur, f: F) -> R
where
    F: FnOnce(&str) -> R,
{
    INTERNER.with(|r| {
        let interner = r.borrow();
        f(interner.resolve(&spur))
    })
}

/// A host function callable from Sprig.
pub type NativeFnInner = dyn Fn(&[Value]) -> Result<Value, ProgramError>;

pub struct NativeFn {
    pub name: String,
    pub arity: usize,
    pub func: Box<NativeFnInner>,
}

impl NativeFn {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        f: impl Fn(&[Value]) -> Result<Value, ProgramError> + 'static,
    ) -> Self {
        NativeFn {
            name: name.into(),
            arity,
            func: Box::new(f),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, ProgramError> {
        if args.len() != self.arity {
            return Err(ProgramError::arity(
                &self.name,
                self.arity.to_string(),
                args.len(),
            ));
        }
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native-fn {}>", self.name)
    }
}

/// A pair cell. Chains of pairs ending in `nil` are lists.
#[derive(Debug, Clone)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

impl PartialEq for Pair {
    fn eq(&self, other: &Self) -> bool {
        let (mut a, mut b) = (self, other);
        loop {
            if std::ptr::eq(a, b) {
                return true;
            }
            if a.car != b.car {
                return false;
            }
            match (&a.cdr, &b.cdr) {
                (Value::Pair(x), Value::Pair(y)) => {
                    a = x;
                    b = y;
                }
                (x, y) => return x == y,
            }
        }
    }
}

// Long chains would otherwise be freed one native frame per cell.
impl Drop for Pair {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        for slot in [&mut self.car, &mut self.cdr] {
            if matches!(slot, Value::Pair(_)) {
                pending.push(std::mem::replace(slot, Value::Nil));
            }
        }
        while let Some(value) = pending.pop() {
            let Value::Pair(cell) = value else {
                continue;
            };
            if let Ok(mut pair) = Rc::try_unwrap(cell) {
                for slot in [&mut pair.car, &mut pair.cdr] {
                    if matches!(slot, Value::Pair(_)) {
                        pending.push(std::mem::replace(slot, Value::Nil));
                    }
                }
            }
        }
    }
}

/// A user-defined function: parameters and body, the frames that enclosed its
/// creation, and the scoping mode that was active at that moment.
#[derive(Debug)]
pub struct Ufunc {
    pub def: Rc<LambdaDef>,
    pub captured: Vec<Frame>,
    pub scoping: Scoping,
}

impl Ufunc {
    /// Capture every non-global frame of `env`.
    pub fn capture(def: Rc<LambdaDef>, env: &Env, scoping: Scoping) -> Self {
        Ufunc {
            def,
            captured: env.captured(),
            scoping,
        }
    }

    /// Build the environment for one invocation.
    ///
    /// The fresh frame holds the arguments; below it come the captured frames,
    /// then the call site's global frame (lexical) or the call site's whole
    /// chain (dynamic).
    pub fn enter(&self, name: &str, args: Vec<Value>, caller: &Env) -> Result<Env, ProgramError> {
        if args.len() != self.def.params.len() {
            return Err(ProgramError::arity(
                name,
                self.def.params.len().to_string(),
                args.len(),
            ));
        }
        let local = Frame::new();
        for (param, arg) in self.def.params.iter().zip(args) {
            local.set(*param, arg);
        }
        let mut frames = Vec::with_capacity(self.captured.len() + 2);
        frames.push(local);
        frames.extend(self.captured.iter().cloned());
        match self.scoping {
            Scoping::Lexical => frames.push(caller.global().clone()),
            Scoping::Dynamic => frames.extend(caller.frames().iter().cloned()),
        }
        Ok(Env::from_frames(frames))
    }
}

/// The core Value type for all Sprig data.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Num(Rc<Number>),
    Str(Rc<str>),
    Pair(Rc<Pair>),
    Ufunc(Rc<Ufunc>),
    Native(Rc<NativeFn>),
    Node(Rc<Node>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Pair(_) => "pair",
            Value::Ufunc(_) => "lambda",
            Value::Native(_) => "native-fn",
            Value::Node(_) => "node",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil | Value::Bool(false) => false,
            Value::Num(n) => !n.is_zero(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn int(n: i64) -> Value {
        Value::Num(Rc::new(Number::from_i64(n)))
    }

    pub fn num(n: Number) -> Value {
        Value::Num(Rc::new(n))
    }

    pub fn string(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn bool(b: bool) -> Value {
        Value::Bool(b)
    }

    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair { car, cdr }))
    }

    /// Build a nil-terminated chain, consing from the last element backwards.
    pub fn list(items: Vec<Value>) -> Value {
        items
            .into_iter()
            .rev()
            .fold(Value::Nil, |tail, head| Value::cons(head, tail))
    }

    pub fn node(node: Node) -> Value {
        Value::Node(Rc::new(node))
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Value::Num(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<&Pair> {
        match self {
            Value::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Rc<Node>> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Collect a proper list into a Vec. `None` if the chain is not nil-terminated.
    pub fn list_items(&self) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        let mut cursor = self;
        loop {
            match cursor {
                Value::Nil => return Some(items),
                Value::Pair(p) => {
                    items.push(p.car.clone());
                    cursor = &p.cdr;
                }
                _ => return None,
            }
        }
    }

    /// The form `print` and `format` produce: strings are written raw.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Pair(a), Value::Pair(b)) => a == b,
            (Value::Ufunc(a), Value::Ufunc(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::num(n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(true) => write!(f, "true"),
            Value::Bool(false) => write!(f, "false"),
            Value::Num(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Pair(p) => {
                write!(f, "({}", p.car)?;
                let mut cursor = &p.cdr;
                loop {
                    match cursor {
                        Value::Nil => break,
                        Value::Pair(next) => {
                            write!(f, " {}", next.car)?;
                            cursor = &next.cdr;
                        }
                        tail => {
                            write!(f, " . {tail}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::Ufunc(u) => {
                write!(f, "<lambda (")?;
                for (i, param) in u.def.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    with_resolved(*param, |name| write!(f, "{name}"))?;
                }
                write!(f, ")>")
            }
            Value::Native(n) => write!(f, "<native-fn {}>", n.name),
            Value::Node(n) => write!(f, "<node {}>", n.kind()),
        }
    }
}
