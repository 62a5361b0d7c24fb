use std::rc::Rc;

use hashbrown::HashMap;
use sprig_core::{LambdaDef, ProgramError};

use crate::compiler::compile;
use crate::opcodes::{Label, Opcode};

/// Identity of a lambda definition for code caches.
pub(crate) fn def_key(def: &Rc<LambdaDef>) -> usize {
    Rc::as_ptr(def) as usize
}

/// An assembled opcode sequence with its labels resolved. Lambda bodies
/// reachable from `CreateFunc` are assembled too, so every unclassified form
/// in the program is rejected here rather than at run time.
#[derive(Debug)]
pub struct Program {
    pub code: Vec<Opcode>,
    labels: HashMap<Label, usize>,
    lambdas: HashMap<usize, (Rc<LambdaDef>, Rc<Program>)>,
}

impl Program {
    pub fn assemble(ops: impl IntoIterator<Item = Opcode>) -> Result<Program, ProgramError> {
        let code: Vec<Opcode> = ops.into_iter().collect();
        let mut labels: HashMap<Label, usize> = HashMap::new();
        let mut lambdas: HashMap<usize, (Rc<LambdaDef>, Rc<Program>)> = HashMap::new();
        for (pc, op) in code.iter().enumerate() {
            match op {
                Opcode::Label(label) => {
                    labels.insert(*label, pc);
                }
                Opcode::Missing { form, reason } => {
                    return Err(ProgramError::unclassified(form.clone(), reason.clone()));
                }
                Opcode::CreateFunc(def) => {
                    let key = def_key(def);
                    if !lambdas.contains_key(&key) {
                        let body = Program::assemble(compile(&def.body))?;
                        lambdas.insert(key, (def.clone(), Rc::new(body)));
                    }
                }
                _ => {}
            }
        }
        for op in &code {
            if let Opcode::JumpIfFalse(label) | Opcode::JumpAlways(label) = op {
                if !labels.contains_key(label) {
                    return Err(ProgramError::eval(format!("jump to undefined label {label}")));
                }
            }
        }
        Ok(Program {
            code,
            labels,
            lambdas,
        })
    }

    pub fn target(&self, label: &Label) -> Result<usize, ProgramError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| ProgramError::eval(format!("jump to undefined label {label}")))
    }

    /// The assembled body of a lambda created directly by this program.
    pub fn lambda(&self, def: &Rc<LambdaDef>) -> Option<&Rc<Program>> {
        self.lambdas.get(&def_key(def)).map(|(_, program)| program)
    }

    /// Lambda bodies in order of first appearance.
    pub fn lambdas(&self) -> Vec<(&Rc<LambdaDef>, &Rc<Program>)> {
        let mut seen: Vec<(&Rc<LambdaDef>, &Rc<Program>)> = Vec::new();
        for op in &self.code {
            if let Opcode::CreateFunc(def) = op {
                if let Some((def, program)) = self.lambdas.get(&def_key(def)) {
                    if !seen.iter().any(|(d, _)| Rc::ptr_eq(d, def)) {
                        seen.push((def, program));
                    }
                }
            }
        }
        seen
    }

    /// Whether control at `pc` leaves the frame without executing anything
    /// else: the end of code or `PopFunc`, reached through labels, no-ops and
    /// unconditional jumps.
    pub fn exits_from(&self, mut pc: usize) -> bool {
        let mut hops = 0;
        loop {
            match self.code.get(pc) {
                None | Some(Opcode::PopFunc) => return true,
                Some(Opcode::Label(_) | Opcode::Noop) => pc += 1,
                Some(Opcode::JumpAlways(label)) => {
                    hops += 1;
                    match self.labels.get(label) {
                        Some(&target) if hops <= self.code.len() => pc = target,
                        _ => return false,
                    }
                }
                Some(_) => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_core::Node;

    fn assemble(src: &str) -> Result<Program, ProgramError> {
        let node: Node = sprig_reader::parse(src)?;
        Program::assemble(compile(&node))
    }

    #[test]
    fn test_labels_resolve() {
        let program = assemble("(if c 1 2)").unwrap();
        let else_ = Label { role: "else", id: 0 };
        let pc = program.target(&else_).unwrap();
        assert_eq!(program.code[pc], Opcode::Label(else_));
    }

    #[test]
    fn test_missing_is_rejected() {
        let err = assemble("(set x 1) (1 2)").unwrap_err();
        assert!(matches!(err, ProgramError::Unclassified { form, .. } if form == "(1 2)"));
    }

    #[test]
    fn test_missing_inside_lambda_is_rejected() {
        let err = assemble("(set f (lambda () (set)))").unwrap_err();
        assert!(matches!(err, ProgramError::Unclassified { .. }));
    }

    #[test]
    fn test_lambda_bodies_are_assembled() {
        let program = assemble("(set f (lambda (x) (+ x 1)))").unwrap();
        let lambdas = program.lambdas();
        assert_eq!(lambdas.len(), 1);
        let (def, body) = lambdas[0];
        assert_eq!(def.params.len(), 1);
        assert!(program.lambda(def).is_some());
        assert_eq!(body.code.len(), 3);
    }

    #[test]
    fn test_tail_exit_detection() {
        // (if c (^f) 0): the call is followed by a jump to the end label.
        let program = assemble("(if c (^f) 0)").unwrap();
        let call = program
            .code
            .iter()
            .position(|op| matches!(op, Opcode::PushTailFunc { .. }))
            .unwrap();
        assert!(program.exits_from(call + 1));
        assert!(!program.exits_from(0));

        // Inside a loop body the jump leads back to the condition.
        let program = assemble("(while c (^f))").unwrap();
        let call = program
            .code
            .iter()
            .position(|op| matches!(op, Opcode::PushTailFunc { .. }))
            .unwrap();
        assert!(!program.exits_from(call + 1));
    }
}
