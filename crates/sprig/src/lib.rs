//! Sprig: a small Lisp with a tree-walking evaluator and a stack machine.
//!
//! This crate is the embedding API. Both backends share one global
//! environment and one [`EvalContext`], so bindings made through either are
//! visible to the other.
//!
//! # Quick Start
//!
//! ```no_run
//! use sprig::{Interpreter, Value};
//!
//! let interp = Interpreter::new();
//! let result = interp.eval_str("(+ 1 2)").unwrap();
//! assert_eq!(result, Value::int(3));
//! ```

use std::io::{BufRead, Write};
use std::rc::Rc;

use tracing::debug;

pub use sprig_core::{
    intern, resolve, with_resolved, Config, Env, EvalContext, NativeFn, Node, Number,
    ProgramError, Scoping, SharedBuffer, Stats, Value,
};
pub use sprig_vm::Program;

/// Result of evaluating a Sprig program.
pub type EvalResult = Result<Value>;

pub type Result<T> = std::result::Result<T, ProgramError>;

/// Builder for configuring and constructing an [`Interpreter`].
///
/// Defaults: lexical scoping, a depth limit of 256, standard input and
/// output, and no statistics.
#[derive(Default)]
pub struct InterpreterBuilder {
    config: Config,
    output: Option<Box<dyn Write>>,
    input: Option<Box<dyn BufRead>>,
    collect_stats: bool,
}

impl InterpreterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scoping mode for closures created by this interpreter.
    pub fn with_scoping(mut self, scoping: Scoping) -> Self {
        self.config.scoping = scoping;
        self
    }

    /// Maximum nesting of closure calls and `eval` before failing.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Where `print`, `printf` and `printfs` write.
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    /// Where `read` takes lines from.
    pub fn with_input(mut self, input: impl BufRead + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    /// Count evaluated forms and closure calls.
    pub fn with_stats(mut self, enable: bool) -> Self {
        self.collect_stats = enable;
        self
    }

    pub fn build(self) -> Interpreter {
        let mut ctx = EvalContext::with_config(self.config).with_reader(sprig_reader::parse);
        if let Some(output) = self.output {
            ctx = ctx.with_output(output);
        }
        if let Some(input) = self.input {
            ctx = ctx.with_input(input);
        }
        ctx.collect_stats.set(self.collect_stats);
        Interpreter {
            global_env: Env::new(),
            ctx,
        }
    }
}

/// A Sprig interpreter instance.
pub struct Interpreter {
    global_env: Env,
    ctx: EvalContext,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        InterpreterBuilder::new().build()
    }

    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::new()
    }

    /// Evaluate an already classified node with the tree walker.
    pub fn eval(&self, node: &Node) -> EvalResult {
        sprig_eval::eval(node, &self.global_env, &self.ctx)
    }

    /// Parse and evaluate with the tree walker. Bindings persist across calls.
    pub fn eval_str(&self, input: &str) -> EvalResult {
        let node = sprig_reader::parse(input)?;
        debug!(kind = node.kind(), "evaluating parsed program");
        self.eval(&node)
    }

    /// Parse, compile and run on the stack machine. Bindings persist across
    /// calls.
    pub fn eval_str_compiled(&self, input: &str) -> EvalResult {
        let program = self.compile_str(input)?;
        debug!(ops = program.code.len(), "running compiled program");
        sprig_vm::Vm::new(&self.ctx).run(Rc::new(program), &self.global_env)
    }

    /// Parse, compile and assemble without running.
    pub fn compile_str(&self, input: &str) -> Result<Program> {
        let node = sprig_reader::parse(input)?;
        Program::assemble(sprig_vm::compile(&node))
    }

    /// Opcode listing of a program and the lambdas it creates.
    pub fn disassemble(&self, input: &str) -> Result<String> {
        let program = self.compile_str(input)?;
        Ok(sprig_vm::disassemble(&program, None))
    }

    /// Register a native function that can be called from Sprig code.
    ///
    /// A function registered with arity 0 is invoked whenever its name is
    /// referenced, so it can stand in for a lazily computed variable.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sprig::{Interpreter, ProgramError, Value};
    ///
    /// let interp = Interpreter::new();
    /// interp.register_fn("square", 1, |args: &[Value]| match args[0].as_number() {
    ///     Some(n) => Ok(Value::num(n.mul(n))),
    ///     None => Err(ProgramError::type_error("number", args[0].type_name())),
    /// });
    /// ```
    pub fn register_fn<F>(&self, name: &str, arity: usize, f: F)
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        let native = NativeFn::new(name, arity, f);
        self.global_env
            .global()
            .set(intern(name), Value::Native(Rc::new(native)));
    }

    pub fn global_env(&self) -> &Env {
        &self.global_env
    }

    pub fn context(&self) -> &EvalContext {
        &self.ctx
    }

    pub fn scoping(&self) -> Scoping {
        self.ctx.scoping()
    }

    /// Counters gathered since the last call, leaving them empty.
    pub fn take_stats(&self) -> Stats {
        self.ctx.take_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_shared_between_backends() {
        let interp = Interpreter::new();
        interp.eval_str("(set f (lambda (x) (* x x)))").unwrap();
        assert_eq!(interp.eval_str_compiled("(f 7)").unwrap(), Value::int(49));
        interp.eval_str_compiled("(setg g 2)").unwrap();
        assert_eq!(interp.eval_str("(+ g 1)").unwrap(), Value::int(3));
    }

    #[test]
    fn test_builder_options() {
        let out = SharedBuffer::new();
        let interp = Interpreter::builder()
            .with_scoping(Scoping::Dynamic)
            .with_max_depth(10)
            .with_output(out.clone())
            .with_input(std::io::Cursor::new("line\n"))
            .with_stats(true)
            .build();
        assert_eq!(interp.scoping(), Scoping::Dynamic);
        assert_eq!(interp.context().config.max_depth, 10);
        interp.eval_str("(print (read))").unwrap();
        assert_eq!(out.contents(), "line\n");
        assert_eq!(interp.take_stats().forms.get("Read"), Some(&1));
    }

    #[test]
    fn test_register_fn() {
        let interp = Interpreter::new();
        interp.register_fn("square", 1, |args: &[Value]| match args[0].as_number() {
            Some(n) => Ok(Value::num(n.mul(n))),
            None => Err(ProgramError::type_error("number", args[0].type_name())),
        });
        assert_eq!(interp.eval_str("(square 12)").unwrap(), Value::int(144));
        assert_eq!(interp.eval_str_compiled("(square 3)").unwrap(), Value::int(9));
        assert!(matches!(
            interp.eval_str("(square 1 2)"),
            Err(ProgramError::Arity { .. })
        ));
    }

    #[test]
    fn test_disassemble() {
        let interp = Interpreter::new();
        let text = interp.disassemble("(print 1)").unwrap();
        assert_eq!(
            text,
            "== <script> ==\n0000  PUSH_IMM         1\n0001  CALL_NATIVE      print argc=1\n"
        );
        assert!(interp.disassemble("(1 2)").is_err());
    }
}
