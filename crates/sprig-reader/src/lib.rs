pub mod classify;
pub mod lexer;
mod reader;

use sprig_core::{Node, ProgramError};

pub use classify::classify;
pub use reader::read_many;

/// Read and classify a whole program. A single top-level form is returned as
/// itself; several forms become a suite.
pub fn parse(input: &str) -> Result<Node, ProgramError> {
    let mut trees = read_many(input)?;
    if trees.len() == 1 {
        if let Some(tree) = trees.pop() {
            return Ok(classify(&tree));
        }
    }
    Ok(Node::Suite(trees.iter().map(classify).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_core::{intern, NativeOp, Value};

    #[test]
    fn test_single_form_is_not_wrapped() {
        assert_eq!(
            parse("(+ 1 2)").unwrap(),
            Node::apply(
                NativeOp::Add,
                vec![Node::atom(Value::int(1)), Node::atom(Value::int(2))]
            )
        );
    }

    #[test]
    fn test_several_forms_become_suite() {
        let node = parse("(set x 1) x").unwrap();
        let Node::Suite(children) = node else {
            panic!("expected suite");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[1], Node::Var(intern("x")));
    }

    #[test]
    fn test_empty_program() {
        assert_eq!(parse("").unwrap(), Node::Suite(vec![]));
    }

    #[test]
    fn test_reader_errors_propagate() {
        assert!(matches!(parse("(a"), Err(ProgramError::Reader { .. })));
    }
}
