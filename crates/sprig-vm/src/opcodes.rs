use std::fmt;
use std::rc::Rc;

use lasso::Spur;
use sprig_core::{with_resolved, LambdaDef, NativeOp, Value};

/// A jump target. The id comes from the compiler's own counter, so two
/// compilations of the same node produce equal labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    pub role: &'static str,
    pub id: u32,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.role, self.id)
    }
}

/// Stack machine instructions. Every expression's code leaves exactly one
/// value on the stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    Label(Label),
    PushImm(Value),
    /// Read through the whole chain, innermost first.
    PushVar(Spur),
    /// Write the local frame.
    PopVar(Spur),
    PushGlobalVar(Spur),
    PopGlobalVar(Spur),
    PushClosureVar(Spur),
    PopClosureVar(Spur),
    JumpIfFalse(Label),
    JumpAlways(Label),
    /// Call the callable bound to `name` with `argc` arguments from the stack.
    PushFunc { name: Spur, argc: usize },
    /// Like `PushFunc`, reusing the current frame when nothing follows it.
    PushTailFunc { name: Spur, argc: usize },
    PopFunc,
    CreateFunc(Rc<LambdaDef>),
    /// Pop `argc` operands (the first pop is the leftmost operand) and apply.
    CallNative { op: NativeOp, argc: usize },
    ReadInput,
    Evaluate,
    Pop,
    Noop,
    /// Stands in for a form that could not be classified.
    Missing { form: String, reason: String },
}

impl Opcode {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Label(_) => "LABEL",
            Opcode::PushImm(_) => "PUSH_IMM",
            Opcode::PushVar(_) => "PUSH_VAR",
            Opcode::PopVar(_) => "POP_VAR",
            Opcode::PushGlobalVar(_) => "PUSH_GLOBAL_VAR",
            Opcode::PopGlobalVar(_) => "POP_GLOBAL_VAR",
            Opcode::PushClosureVar(_) => "PUSH_CLOSURE_VAR",
            Opcode::PopClosureVar(_) => "POP_CLOSURE_VAR",
            Opcode::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Opcode::JumpAlways(_) => "JUMP_ALWAYS",
            Opcode::PushFunc { .. } => "PUSH_FUNC",
            Opcode::PushTailFunc { .. } => "PUSH_TAIL_FUNC",
            Opcode::PopFunc => "POP_FUNC",
            Opcode::CreateFunc(_) => "CREATE_FUNC",
            Opcode::CallNative { .. } => "CALL_NATIVE",
            Opcode::ReadInput => "READ_INPUT",
            Opcode::Evaluate => "EVALUATE",
            Opcode::Pop => "POP",
            Opcode::Noop => "NOOP",
            Opcode::Missing { .. } => "MISSING",
        }
    }
}

fn write_name(f: &mut fmt::Formatter<'_>, name: Spur) -> fmt::Result {
    with_resolved(name, |s| f.write_str(s))
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            Opcode::Label(label) => write!(f, "{label}:"),
            Opcode::PushImm(v) => write!(f, "{mnemonic:<16} {v}"),
            Opcode::PushVar(name)
            | Opcode::PopVar(name)
            | Opcode::PushGlobalVar(name)
            | Opcode::PopGlobalVar(name)
            | Opcode::PushClosureVar(name)
            | Opcode::PopClosureVar(name) => {
                write!(f, "{mnemonic:<16} ")?;
                write_name(f, *name)
            }
            Opcode::JumpIfFalse(label) | Opcode::JumpAlways(label) => {
                write!(f, "{mnemonic:<16} {label}")
            }
            Opcode::PushFunc { name, argc } | Opcode::PushTailFunc { name, argc } => {
                write!(f, "{mnemonic:<16} ")?;
                write_name(f, *name)?;
                write!(f, " argc={argc}")
            }
            Opcode::CreateFunc(def) => {
                write!(f, "{mnemonic:<16} (")?;
                for (i, param) in def.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write_name(f, *param)?;
                }
                write!(f, ")")
            }
            Opcode::CallNative { op, argc } => {
                write!(f, "{mnemonic:<16} {} argc={argc}", op.token())
            }
            Opcode::Missing { form, .. } => write!(f, "{mnemonic:<16} {form}"),
            Opcode::PopFunc
            | Opcode::ReadInput
            | Opcode::Evaluate
            | Opcode::Pop
            | Opcode::Noop => f.write_str(mnemonic),
        }
    }
}
