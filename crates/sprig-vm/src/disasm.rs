use std::fmt;

use sprig_core::{with_resolved, LambdaDef};

use crate::program::Program;

/// Render a program and every lambda body it creates, one section each.
pub fn disassemble(program: &Program, name: Option<&str>) -> String {
    Listing {
        program,
        label: name.unwrap_or("<script>").to_string(),
    }
    .to_string()
}

struct Listing<'a> {
    program: &'a Program,
    label: String,
}

fn lambda_label(def: &LambdaDef) -> String {
    let params: Vec<String> = def
        .params
        .iter()
        .map(|p| with_resolved(*p, str::to_string))
        .collect();
    format!("<lambda ({})>", params.join(" "))
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.label)?;
        for (pc, op) in self.program.code.iter().enumerate() {
            writeln!(f, "{pc:04}  {op}")?;
        }
        for (def, body) in self.program.lambdas() {
            writeln!(f)?;
            let nested = Listing {
                program: body,
                label: lambda_label(def),
            };
            write!(f, "{nested}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    fn listing(src: &str) -> String {
        let node = sprig_reader::parse(src).unwrap();
        let program = Program::assemble(compile(&node)).unwrap();
        disassemble(&program, None)
    }

    #[test]
    fn test_script_listing() {
        assert_eq!(
            listing("(- 10 3)"),
            "== <script> ==\n\
             0000  PUSH_IMM         3\n\
             0001  PUSH_IMM         10\n\
             0002  CALL_NATIVE      - argc=2\n"
        );
    }

    #[test]
    fn test_lambda_sections() {
        let text = listing("(set f (lambda (n) (g (lambda () n))))");
        assert!(text.starts_with("== <script> ==\n0000  CREATE_FUNC      (n)\n"));
        assert!(text.contains("\n== <lambda (n)> ==\n"));
        assert!(text.contains("PUSH_FUNC        g argc=1"));
        assert!(text.contains("\n== <lambda ()> ==\n0000  PUSH_VAR         n\n"));
    }

    #[test]
    fn test_labels_are_listed() {
        let text = listing("(if c 1 2)");
        assert!(text.contains("0001  JUMP_IF_FALSE    else_0\n"));
        assert!(text.contains("0004  else_0:\n"));
    }
}
