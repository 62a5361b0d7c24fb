use std::rc::Rc;

use hashbrown::HashMap;
use lasso::Spur;
use sprig_core::{
    intern, resolve, Env, EvalContext, LambdaDef, Node, ProgramError, Target, Ufunc, Value,
    STDIN_OVERRIDE,
};
use tracing::{debug, trace};

use crate::compiler::compile;
use crate::opcodes::Opcode;
use crate::program::{def_key, Program};

/// A call frame: the program being executed, where in it, the environment
/// its variable opcodes address, and the stack height at entry.
struct CallFrame {
    program: Rc<Program>,
    pc: usize,
    env: Env,
    base: usize,
}

/// The stack machine. Calls push frames instead of recursing on the native
/// stack, and a tail call whose frame has nothing left to do replaces that
/// frame.
pub struct Vm<'c> {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    /// Assembled lambda bodies, keyed by definition identity.
    cache: HashMap<usize, (Rc<LambdaDef>, Rc<Program>)>,
    ctx: &'c EvalContext,
}

/// Compile, assemble and run a node in one step.
pub fn run_node(node: &Node, env: &Env, ctx: &EvalContext) -> Result<Value, ProgramError> {
    let program = Rc::new(Program::assemble(compile(node))?);
    Vm::new(ctx).run(program, env)
}

impl<'c> Vm<'c> {
    pub fn new(ctx: &'c EvalContext) -> Self {
        Vm {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            cache: HashMap::new(),
            ctx,
        }
    }

    /// Run a program to completion and return the value it leaves on the
    /// stack. On error the machine is unwound to where it was before the call.
    pub fn run(&mut self, program: Rc<Program>, env: &Env) -> Result<Value, ProgramError> {
        let floor = self.frames.len();
        let base = self.stack.len();
        self.frames.push(CallFrame {
            program,
            pc: 0,
            env: env.clone(),
            base,
        });
        let result = self.execute(floor);
        if result.is_err() {
            self.frames.truncate(floor);
            self.stack.truncate(base);
        }
        result
    }

    fn execute(&mut self, floor: usize) -> Result<Value, ProgramError> {
        loop {
            let (program, pc) = {
                let frame = self.frame()?;
                (frame.program.clone(), frame.pc)
            };
            let Some(op) = program.code.get(pc) else {
                if let Some(value) = self.leave(floor)? {
                    return Ok(value);
                }
                continue;
            };
            self.ctx.record_form(op.mnemonic());
            trace!(pc, op = %op, "exec");
            self.frame_mut()?.pc = pc + 1;

            match op {
                Opcode::Label(_) | Opcode::Noop => {}
                Opcode::PushImm(v) => self.stack.push(v.clone()),
                Opcode::PushVar(name) => {
                    let value = self.load(*name)?;
                    self.stack.push(value);
                }
                Opcode::PushGlobalVar(name) => self.push_from(Target::Global, *name)?,
                Opcode::PushClosureVar(name) => self.push_from(Target::Closure, *name)?,
                Opcode::PopVar(name) => self.store(Target::Local, *name)?,
                Opcode::PopGlobalVar(name) => self.store(Target::Global, *name)?,
                Opcode::PopClosureVar(name) => self.store(Target::Closure, *name)?,
                Opcode::JumpIfFalse(label) => {
                    if !self.pop()?.is_truthy() {
                        self.frame_mut()?.pc = program.target(label)?;
                    }
                }
                Opcode::JumpAlways(label) => {
                    self.frame_mut()?.pc = program.target(label)?;
                }
                Opcode::PushFunc { name, argc } => self.call(*name, *argc, false, floor)?,
                Opcode::PushTailFunc { name, argc } => {
                    let tail = program.exits_from(pc + 1);
                    self.call(*name, *argc, tail, floor)?;
                }
                Opcode::PopFunc => {
                    if let Some(value) = self.leave(floor)? {
                        return Ok(value);
                    }
                }
                Opcode::CreateFunc(def) => {
                    if let Some(body) = program.lambda(def) {
                        self.cache
                            .entry(def_key(def))
                            .or_insert_with(|| (def.clone(), body.clone()));
                    }
                    let func = Ufunc::capture(def.clone(), &self.frame()?.env, self.ctx.scoping());
                    self.stack.push(Value::Ufunc(Rc::new(func)));
                }
                Opcode::CallNative { op, argc } => {
                    let args = self.pop_args(*argc)?;
                    let value = op.apply(self.ctx, &args)?;
                    self.stack.push(value);
                }
                Opcode::ReadInput => {
                    let source = self.frame()?.env.get(intern(STDIN_OVERRIDE));
                    match source {
                        Some(callee) => {
                            self.invoke(&callee, STDIN_OVERRIDE, Vec::new(), false, floor)?
                        }
                        None => {
                            let value = match self.ctx.read_line()? {
                                Some(line) => Value::string(&line),
                                None => Value::Nil,
                            };
                            self.stack.push(value);
                        }
                    }
                }
                Opcode::Evaluate => {
                    let value = self.pop()?;
                    let Some(node) = value.as_node() else {
                        return Err(ProgramError::type_error("node for eval", value.type_name()));
                    };
                    let program = Rc::new(Program::assemble(compile(node))?);
                    self.check_depth(floor)?;
                    let env = self.frame()?.env.clone();
                    self.frames.push(CallFrame {
                        program,
                        pc: 0,
                        env,
                        base: self.stack.len(),
                    });
                }
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::Missing { form, reason } => {
                    return Err(ProgramError::unclassified(form.clone(), reason.clone()));
                }
            }
        }
    }

    fn frame(&self) -> Result<&CallFrame, ProgramError> {
        self.frames
            .last()
            .ok_or_else(|| ProgramError::eval("no active frame"))
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame, ProgramError> {
        self.frames
            .last_mut()
            .ok_or_else(|| ProgramError::eval("no active frame"))
    }

    fn pop(&mut self) -> Result<Value, ProgramError> {
        self.stack
            .pop()
            .ok_or_else(|| ProgramError::eval("stack underflow"))
    }

    /// Operands were pushed last-first, so the first pop is the first operand.
    fn pop_args(&mut self, argc: usize) -> Result<Vec<Value>, ProgramError> {
        (0..argc).map(|_| self.pop()).collect()
    }

    /// A zero-arity native bound to the name is invoked on reference.
    fn load(&self, name: Spur) -> Result<Value, ProgramError> {
        let value = self
            .frame()?
            .env
            .get(name)
            .ok_or_else(|| ProgramError::unbound(resolve(name)))?;
        match &value {
            Value::Native(native) if native.arity == 0 => {
                self.ctx.record_call(&native.name);
                native.call(&[])
            }
            _ => Ok(value),
        }
    }

    fn push_from(&mut self, target: Target, name: Spur) -> Result<(), ProgramError> {
        let value = self
            .frame()?
            .env
            .read(target, name)
            .ok_or_else(|| ProgramError::unbound(resolve(name)))?;
        self.stack.push(value);
        Ok(())
    }

    fn store(&mut self, target: Target, name: Spur) -> Result<(), ProgramError> {
        let value = self.pop()?;
        self.frame()?.env.assign(target, name, value);
        Ok(())
    }

    fn check_depth(&self, floor: usize) -> Result<(), ProgramError> {
        let max = self.ctx.config.max_depth;
        if self.frames.len() - floor > max {
            return Err(ProgramError::DepthExceeded(max));
        }
        Ok(())
    }

    fn call(&mut self, name: Spur, argc: usize, tail: bool, floor: usize) -> Result<(), ProgramError> {
        let args = self.pop_args(argc)?;
        let callee = self
            .frame()?
            .env
            .get(name)
            .ok_or_else(|| ProgramError::unbound(resolve(name)))?;
        self.invoke(&callee, &resolve(name), args, tail, floor)
    }

    fn invoke(
        &mut self,
        callee: &Value,
        name: &str,
        args: Vec<Value>,
        tail: bool,
        floor: usize,
    ) -> Result<(), ProgramError> {
        match callee {
            Value::Ufunc(func) => {
                self.ctx.record_call(name);
                if !tail {
                    self.check_depth(floor)?;
                }
                let env = func.enter(name, args, &self.frame()?.env)?;
                let program = self.code_for(&func.def)?;
                if tail {
                    debug!(name, depth = self.frames.len() - floor, "tail call");
                    let base = self.frame()?.base;
                    self.stack.truncate(base);
                    let frame = self.frame_mut()?;
                    frame.program = program;
                    frame.pc = 0;
                    frame.env = env;
                } else {
                    debug!(name, depth = self.frames.len() - floor, "call");
                    let base = self.stack.len();
                    self.frames.push(CallFrame {
                        program,
                        pc: 0,
                        env,
                        base,
                    });
                }
                Ok(())
            }
            Value::Native(native) => {
                let value = native.call(&args)?;
                self.stack.push(value);
                Ok(())
            }
            other => Err(ProgramError::NotCallable(format!(
                "{name} is a {}",
                other.type_name()
            ))),
        }
    }

    /// The assembled body of a lambda. Lambdas created outside this machine
    /// (by the tree walker, or an earlier run) are assembled on first call.
    fn code_for(&mut self, def: &Rc<LambdaDef>) -> Result<Rc<Program>, ProgramError> {
        let key = def_key(def);
        if let Some((_, program)) = self.cache.get(&key) {
            return Ok(program.clone());
        }
        let program = Rc::new(Program::assemble(compile(&def.body))?);
        self.cache.insert(key, (def.clone(), program.clone()));
        Ok(program)
    }

    /// Pop the current frame. Its result is the value on top of its part of
    /// the stack, or nil if it left nothing. Returns the result once the
    /// frame `run` started is gone; otherwise hands it to the caller.
    fn leave(&mut self, floor: usize) -> Result<Option<Value>, ProgramError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| ProgramError::eval("no active frame"))?;
        let value = if self.stack.len() > frame.base {
            self.stack.pop().unwrap_or(Value::Nil)
        } else {
            Value::Nil
        };
        self.stack.truncate(frame.base);
        trace!(depth = self.frames.len().saturating_sub(floor), "return");
        if self.frames.len() <= floor {
            return Ok(Some(value));
        }
        self.stack.push(value);
        Ok(None)
    }
}
