#![allow(dead_code)]

use sprig::{Interpreter, ProgramError, Scoping, SharedBuffer, Value};

/// Evaluate via tree-walker
pub fn eval_tw(input: &str) -> Value {
    let interp = Interpreter::new();
    interp
        .eval_str(input)
        .unwrap_or_else(|e| panic!("tree-walker failed for `{input}`: {e}"))
}

/// Evaluate via stack machine
pub fn eval_vm(input: &str) -> Value {
    let interp = Interpreter::new();
    interp
        .eval_str_compiled(input)
        .unwrap_or_else(|e| panic!("VM failed for `{input}`: {e}"))
}

/// Assert both evaluators produce the same result and return it
pub fn eval_both(input: &str) -> Value {
    let tw = eval_tw(input);
    let vm = eval_vm(input);
    assert_eq!(tw, vm, "tree-walker vs VM mismatch for: {input}");
    tw
}

/// Evaluate via tree-walker, expecting error
pub fn eval_tw_err(input: &str) -> ProgramError {
    Interpreter::new()
        .eval_str(input)
        .expect_err(&format!("expected error for: {input}"))
}

/// Evaluate via stack machine, expecting error
pub fn eval_vm_err(input: &str) -> ProgramError {
    Interpreter::new()
        .eval_str_compiled(input)
        .expect_err(&format!("expected error for: {input}"))
}

/// Run on both backends with the given scoping and return (tree-walker, VM).
pub fn eval_scoped(input: &str, scoping: Scoping) -> (Value, Value) {
    let run = |compiled: bool| {
        let interp = Interpreter::builder().with_scoping(scoping).build();
        let result = if compiled {
            interp.eval_str_compiled(input)
        } else {
            interp.eval_str(input)
        };
        result.unwrap_or_else(|e| panic!("{scoping} failed for `{input}`: {e}"))
    };
    (run(false), run(true))
}

/// Run on both backends with captured output and the given input lines.
/// Returns what each backend printed.
pub fn output_both(input: &str, stdin: &str) -> String {
    let run = |compiled: bool| {
        let out = SharedBuffer::new();
        let interp = Interpreter::builder()
            .with_output(out.clone())
            .with_input(std::io::Cursor::new(stdin.to_string()))
            .build();
        let result = if compiled {
            interp.eval_str_compiled(input)
        } else {
            interp.eval_str(input)
        };
        if let Err(e) = result {
            panic!("failed for `{input}` (compiled: {compiled}): {e}");
        }
        out.contents()
    };
    let tw = run(false);
    let vm = run(true);
    assert_eq!(tw, vm, "tree-walker vs VM output mismatch for: {input}");
    tw
}

/// Generate tests for both tree-walker and VM backends.
///
/// Usage:
/// ```ignore
/// dual_eval_tests! {
///     test_name: "sprig expression" => expected_value,
/// }
/// ```
///
/// This generates `test_name_tw` and `test_name_vm` test functions.
#[macro_export]
macro_rules! dual_eval_tests {
    ($($name:ident : $input:expr => $expected:expr),* $(,)?) => {
        $(
            paste::paste! {
                #[test]
                fn [<$name _tw>]() {
                    let result = common::eval_tw($input);
                    assert_eq!(result, $expected, "tree-walker: {}", $input);
                }

                #[test]
                fn [<$name _vm>]() {
                    let result = common::eval_vm($input);
                    assert_eq!(result, $expected, "VM: {}", $input);
                }
            }
        )*
    };
}

/// Generate error tests for both tree-walker and VM backends.
#[macro_export]
macro_rules! dual_eval_error_tests {
    ($($name:ident : $input:expr),* $(,)?) => {
        $(
            paste::paste! {
                #[test]
                fn [<$name _tw>]() {
                    let interp = sprig::Interpreter::new();
                    assert!(interp.eval_str($input).is_err(),
                        "tree-walker should error for: {}", $input);
                }

                #[test]
                fn [<$name _vm>]() {
                    let interp = sprig::Interpreter::new();
                    assert!(interp.eval_str_compiled($input).is_err(),
                        "VM should error for: {}", $input);
                }
            }
        )*
    };
}
