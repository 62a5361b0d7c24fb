use lasso::Spur;
use sprig_core::{
    intern, resolve, Env, EvalContext, Node, ProgramError, Ufunc, Value, STDIN_OVERRIDE,
};
use tracing::{debug, trace};

pub type EvalResult = Result<Value, ProgramError>;

/// Evaluate a node in an environment.
pub fn eval(node: &Node, env: &Env, ctx: &EvalContext) -> EvalResult {
    let kind = node.kind();
    ctx.record_form(kind);
    trace!(depth = ctx.depth.get(), kind, "enter");
    let result = eval_node(node, env, ctx);
    trace!(depth = ctx.depth.get(), kind, ok = result.is_ok(), "leave");
    result
}

fn eval_node(node: &Node, env: &Env, ctx: &EvalContext) -> EvalResult {
    match node {
        Node::Suite(children) => {
            let mut result = Value::Nil;
            for child in children {
                result = eval(child, env, ctx)?;
            }
            Ok(result)
        }
        Node::Atom(v) => Ok(v.clone()),
        Node::Nil => Ok(Value::Nil),
        Node::True => Ok(Value::Bool(true)),
        Node::False => Ok(Value::Bool(false)),
        Node::Var(name) => lookup(*name, env, ctx),
        Node::Set {
            target,
            name,
            value,
        } => {
            let v = eval(value, env, ctx)?;
            env.assign(*target, *name, v.clone());
            Ok(v)
        }
        Node::Ret(value) => eval(value, env, ctx),
        Node::Lambda(def) => Ok(Value::Ufunc(std::rc::Rc::new(Ufunc::capture(
            def.clone(),
            env,
            ctx.scoping(),
        )))),
        Node::If { cond, then, else_ } => {
            if eval(cond, env, ctx)?.is_truthy() {
                eval(then, env, ctx)
            } else if let Some(else_) = else_ {
                eval(else_, env, ctx)
            } else {
                Ok(Value::Nil)
            }
        }
        Node::While { cond, body } => {
            let mut result = Value::Nil;
            while eval(cond, env, ctx)?.is_truthy() {
                result = eval(body, env, ctx)?;
            }
            Ok(result)
        }
        // Tail calls only differ once compiled.
        Node::Call { name, args, .. } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, env, ctx)?);
            }
            let callee = env
                .get(*name)
                .ok_or_else(|| ProgramError::unbound(resolve(*name)))?;
            apply(&callee, &resolve(*name), values, env, ctx)
        }
        Node::Apply { op, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, env, ctx)?);
            }
            op.apply(ctx, &values)
        }
        Node::Quoted(inner) => Ok(Value::Node(inner.clone())),
        Node::Read => read_input(env, ctx, |callee, env| {
            apply(callee, STDIN_OVERRIDE, Vec::new(), env, ctx)
        }),
        Node::Eval(inner) => {
            let value = eval(inner, env, ctx)?;
            let Some(node) = value.as_node() else {
                return Err(ProgramError::type_error("node for eval", value.type_name()));
            };
            let _guard = ctx.enter()?;
            eval(node, env, ctx)
        }
        Node::Unclassified { tree, reason } => {
            Err(ProgramError::unclassified(tree.to_string(), reason.clone()))
        }
    }
}

/// Resolve a variable. A zero-arity native bound to the name is invoked, so
/// hosts can materialize values lazily.
fn lookup(name: Spur, env: &Env, ctx: &EvalContext) -> EvalResult {
    let value = env
        .get(name)
        .ok_or_else(|| ProgramError::unbound(resolve(name)))?;
    match &value {
        Value::Native(native) if native.arity == 0 => {
            ctx.record_call(&native.name);
            native.call(&[])
        }
        _ => Ok(value),
    }
}

/// Invoke a callable value with evaluated arguments.
pub fn apply(
    callee: &Value,
    name: &str,
    args: Vec<Value>,
    env: &Env,
    ctx: &EvalContext,
) -> EvalResult {
    match callee {
        Value::Ufunc(func) => {
            let _guard = ctx.enter()?;
            ctx.record_call(name);
            debug!(name, depth = ctx.depth.get(), argc = args.len(), "apply closure");
            let call_env = func.enter(name, args, env)?;
            eval(&func.def.body, &call_env, ctx)
        }
        Value::Native(native) => native.call(&args),
        other => Err(ProgramError::NotCallable(format!(
            "{name} is a {}",
            other.type_name()
        ))),
    }
}

/// One line of input, or the result of calling the `--stdin` binding when the
/// environment defines one. `call` invokes that binding.
pub fn read_input(
    env: &Env,
    ctx: &EvalContext,
    call: impl FnOnce(&Value, &Env) -> EvalResult,
) -> EvalResult {
    if let Some(source) = env.get(intern(STDIN_OVERRIDE)) {
        return call(&source, env);
    }
    Ok(match ctx.read_line()? {
        Some(line) => Value::string(&line),
        None => Value::Nil,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_core::{Config, NativeFn, Scoping, SharedBuffer};
    use std::io::Cursor;
    use std::rc::Rc;

    fn ctx_with(scoping: Scoping, max_depth: usize) -> EvalContext {
        EvalContext::with_config(Config {
            scoping,
            max_depth,
        })
        .with_reader(sprig_reader::parse)
    }

    fn run_in(src: &str, env: &Env, ctx: &EvalContext) -> EvalResult {
        let node = sprig_reader::parse(src)?;
        eval(&node, env, ctx)
    }

    fn run(src: &str) -> EvalResult {
        run_in(src, &Env::new(), &ctx_with(Scoping::Lexical, 256))
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("(+ 1 2)").unwrap(), Value::int(3));
        assert_eq!(run("(- 5)").unwrap(), Value::int(-5));
        assert_eq!(run("(* (/ 1 3) 3)").unwrap(), Value::int(1));
        assert_eq!(run("(== (+ 0.1 0.2) 0.3)").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(run(r#"(if (< 1 2) "yes" "no")"#).unwrap(), Value::string("yes"));
        assert_eq!(run("(if false 1)").unwrap(), Value::Nil);
        let sum = "(set i 1) (set s 0) (while (<= i 5) (set s (+ s i)) (set i (+ i 1))) s";
        assert_eq!(run(sum).unwrap(), Value::int(15));
        assert_eq!(run("(while false 1)").unwrap(), Value::Nil);
        assert_eq!(run("()").unwrap(), Value::Nil);
    }

    #[test]
    fn test_set_stays_in_local_frame() {
        let env = Env::new();
        let ctx = ctx_with(Scoping::Lexical, 256);
        let v = run_in("(set x 1) (set f (lambda () (set x 2))) (f) x", &env, &ctx).unwrap();
        assert_eq!(v, Value::int(1));
    }

    #[test]
    fn test_setg_reaches_global_frame() {
        let env = Env::new();
        let ctx = ctx_with(Scoping::Lexical, 256);
        run_in("(set f (lambda () (setg g 5))) (f)", &env, &ctx).unwrap();
        assert_eq!(env.global().get(intern("g")), Some(Value::int(5)));
    }

    #[test]
    fn test_setc_at_top_level_uses_only_frame() {
        assert_eq!(run("(setc y 3) y").unwrap(), Value::int(3));
    }

    #[test]
    fn test_counter_closure_shares_frame() {
        let src = "
            (set counter (lambda () ((set n 0) (lambda () ((setc n (+ n 1)) (ret n))))))
            (set c (counter))
            (c) (c) (c)";
        assert_eq!(run(src).unwrap(), Value::int(3));
    }

    #[test]
    fn test_lexical_and_dynamic_scoping() {
        let src = r#"
            (set show (lambda () x))
            (set caller (lambda (x) (show)))
            (setg x "global")
            (caller "local")"#;
        let lexical = run_in(src, &Env::new(), &ctx_with(Scoping::Lexical, 256)).unwrap();
        assert_eq!(lexical, Value::string("global"));
        let dynamic = run_in(src, &Env::new(), &ctx_with(Scoping::Dynamic, 256)).unwrap();
        assert_eq!(dynamic, Value::string("local"));
    }

    #[test]
    fn test_depth_limit_fails_closed() {
        let ctx = ctx_with(Scoping::Lexical, 50);
        let env = Env::new();
        let src = "(set loop (lambda (n) (if (== n 0) 0 (^loop (- n 1))))) (loop 1000)";
        let err = run_in(src, &env, &ctx).unwrap_err();
        assert!(matches!(err, ProgramError::DepthExceeded(50)));
        assert_eq!(ctx.depth.get(), 0);
        assert_eq!(run_in("(loop 10)", &env, &ctx).unwrap(), Value::int(0));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(run("nope"), Err(ProgramError::Unbound(name)) if name == "nope"));
        let err = run(r#"(assert false "boom")"#).unwrap_err();
        assert_eq!(err.assertion_message(), Some(&Value::string("boom")));
        assert!(matches!(run("(car 1)"), Err(ProgramError::Type { .. })));
        assert!(matches!(run("(1 2)"), Err(ProgramError::Unclassified { .. })));
        assert!(matches!(run("(set f 1) (f)"), Err(ProgramError::NotCallable(_))));
        assert!(matches!(
            run("(set f (lambda (a) a)) (f 1 2)"),
            Err(ProgramError::Arity { .. })
        ));
    }

    #[test]
    fn test_lists() {
        assert_eq!(run("(car (cdr (list 1 2 3)))").unwrap(), Value::int(2));
        assert_eq!(run("(cdr (cons 1 2))").unwrap(), Value::int(2));
        assert_eq!(run("(cdr (cdr (cdr (list 1 2 3))))").unwrap(), Value::Nil);
    }

    #[test]
    fn test_quoted_parse_and_eval() {
        assert_eq!(run("(set x 4) (eval (quoted (* x x)))").unwrap(), Value::int(16));
        assert_eq!(run(r#"(eval (parse "(+ 1 2)"))"#).unwrap(), Value::int(3));
        assert!(matches!(run("(eval 1)"), Err(ProgramError::Type { .. })));
    }

    #[test]
    fn test_read_from_context_input() {
        let ctx = ctx_with(Scoping::Lexical, 256).with_input(Box::new(Cursor::new("hello\n")));
        let env = Env::new();
        assert_eq!(run_in("(read)", &env, &ctx).unwrap(), Value::string("hello"));
        assert_eq!(run_in("(read)", &env, &ctx).unwrap(), Value::Nil);
    }

    #[test]
    fn test_read_uses_stdin_override() {
        let env = Env::new();
        env.set_str(
            STDIN_OVERRIDE,
            Value::Native(Rc::new(NativeFn::new("--stdin", 0, |_| {
                Ok(Value::string("scripted"))
            }))),
        );
        let ctx = ctx_with(Scoping::Lexical, 256);
        assert_eq!(run_in("(read)", &env, &ctx).unwrap(), Value::string("scripted"));
    }

    #[test]
    fn test_zero_arity_native_invoked_on_reference() {
        let env = Env::new();
        let answer = NativeFn::new("answer", 0, |_| Ok(Value::int(42)));
        env.set_str("answer", Value::Native(Rc::new(answer)));
        let ctx = ctx_with(Scoping::Lexical, 256);
        assert_eq!(run_in("(+ answer 0)", &env, &ctx).unwrap(), Value::int(42));
    }

    #[test]
    fn test_print_writes_to_context_output() {
        let buf = SharedBuffer::new();
        let ctx = ctx_with(Scoping::Lexical, 256).with_output(Box::new(buf.clone()));
        run_in(r#"(print "n =" 1) (printf "{}-{}" 2 3)"#, &Env::new(), &ctx).unwrap();
        assert_eq!(buf.contents(), "n = 1\n2-3");
    }

    #[test]
    fn test_stats_counts_forms_and_closure_calls() {
        let ctx = ctx_with(Scoping::Lexical, 256);
        ctx.collect_stats.set(true);
        run_in("(set f (lambda (x) x)) (f 1) (f 2)", &Env::new(), &ctx).unwrap();
        let stats = ctx.take_stats();
        assert_eq!(stats.calls.get("f"), Some(&2));
        assert_eq!(stats.forms.get("Call"), Some(&2));
        assert_eq!(stats.forms.get("Lambda"), Some(&1));
    }
}
