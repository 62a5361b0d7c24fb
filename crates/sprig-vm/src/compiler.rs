use sprig_core::{Node, Target, Value};

use crate::opcodes::{Label, Opcode};

#[derive(Debug, Clone)]
enum Work<'a> {
    Node(&'a Node),
    Op(Opcode),
}

/// Lazy opcode stream for one node. Nodes are expanded on demand from an
/// explicit work stack, so deeply nested programs do not recurse on the
/// native stack. Each call to [`compile`] starts a fresh stream with its own
/// label counter.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    work: Vec<Work<'a>>,
    next_label: u32,
}

/// Compile a node into its opcode stream.
pub fn compile(node: &Node) -> Instructions<'_> {
    Instructions {
        work: vec![Work::Node(node)],
        next_label: 0,
    }
}

impl<'a> Instructions<'a> {
    fn label(&mut self, role: &'static str) -> Label {
        let label = Label {
            role,
            id: self.next_label,
        };
        self.next_label += 1;
        label
    }

    /// Queue items so they come out in the given order.
    fn schedule(&mut self, items: Vec<Work<'a>>) {
        self.work.extend(items.into_iter().rev());
    }

    /// Operands are emitted in reverse so the first ends on top of the stack.
    fn operands(args: &'a [Node]) -> impl Iterator<Item = Work<'a>> {
        args.iter().rev().map(Work::Node)
    }

    fn expand(&mut self, node: &'a Node) {
        use Work::{Node as N, Op};
        match node {
            Node::Suite(children) if children.is_empty() => {
                self.schedule(vec![Op(Opcode::Noop), Op(Opcode::PushImm(Value::Nil))]);
            }
            Node::Suite(children) => {
                let mut items = Vec::with_capacity(children.len() * 2);
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        items.push(Op(Opcode::Pop));
                    }
                    items.push(N(child));
                }
                self.schedule(items);
            }
            Node::Atom(v) => self.work.push(Op(Opcode::PushImm(v.clone()))),
            Node::Nil => self.work.push(Op(Opcode::PushImm(Value::Nil))),
            Node::True => self.work.push(Op(Opcode::PushImm(Value::Bool(true)))),
            Node::False => self.work.push(Op(Opcode::PushImm(Value::Bool(false)))),
            Node::Var(name) => self.work.push(Op(Opcode::PushVar(*name))),
            Node::Set {
                target,
                name,
                value,
            } => {
                let (pop, push) = match target {
                    Target::Local => (Opcode::PopVar(*name), Opcode::PushVar(*name)),
                    Target::Global => (Opcode::PopGlobalVar(*name), Opcode::PushGlobalVar(*name)),
                    Target::Closure => {
                        (Opcode::PopClosureVar(*name), Opcode::PushClosureVar(*name))
                    }
                };
                self.schedule(vec![N(value), Op(pop), Op(push)]);
            }
            Node::Ret(value) => self.schedule(vec![N(value), Op(Opcode::PopFunc)]),
            Node::Lambda(def) => self.work.push(Op(Opcode::CreateFunc(def.clone()))),
            Node::If { cond, then, else_ } => {
                let else_label = self.label("else");
                let end_label = self.label("endif");
                let otherwise = match else_ {
                    Some(e) => N(e),
                    None => Op(Opcode::PushImm(Value::Nil)),
                };
                self.schedule(vec![
                    N(cond),
                    Op(Opcode::JumpIfFalse(else_label)),
                    N(then),
                    Op(Opcode::JumpAlways(end_label)),
                    Op(Opcode::Label(else_label)),
                    otherwise,
                    Op(Opcode::Label(end_label)),
                ]);
            }
            Node::While { cond, body } => {
                let start = self.label("while");
                let end = self.label("endwhile");
                self.schedule(vec![
                    Op(Opcode::PushImm(Value::Nil)),
                    Op(Opcode::Label(start)),
                    N(cond),
                    Op(Opcode::JumpIfFalse(end)),
                    Op(Opcode::Pop),
                    N(body),
                    Op(Opcode::JumpAlways(start)),
                    Op(Opcode::Label(end)),
                ]);
            }
            Node::Call { name, args, tail } => {
                let call = if *tail {
                    Opcode::PushTailFunc {
                        name: *name,
                        argc: args.len(),
                    }
                } else {
                    Opcode::PushFunc {
                        name: *name,
                        argc: args.len(),
                    }
                };
                let mut items: Vec<Work<'a>> = Self::operands(args).collect();
                items.push(Op(call));
                self.schedule(items);
            }
            Node::Apply { op, args } => {
                let mut items: Vec<Work<'a>> = Self::operands(args).collect();
                items.push(Op(Opcode::CallNative {
                    op: *op,
                    argc: args.len(),
                }));
                self.schedule(items);
            }
            Node::Quoted(inner) => self
                .work
                .push(Op(Opcode::PushImm(Value::Node(inner.clone())))),
            Node::Read => self.work.push(Op(Opcode::ReadInput)),
            Node::Eval(inner) => self.schedule(vec![N(inner), Op(Opcode::Evaluate)]),
            Node::Unclassified { tree, reason } => self.work.push(Op(Opcode::Missing {
                form: tree.to_string(),
                reason: reason.clone(),
            })),
        }
    }
}

impl Iterator for Instructions<'_> {
    type Item = Opcode;

    fn next(&mut self) -> Option<Opcode> {
        loop {
            match self.work.pop()? {
                Work::Op(op) => return Some(op),
                Work::Node(node) => self.expand(node),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_core::{intern, NativeOp};

    fn ops(src: &str) -> Vec<Opcode> {
        compile(&sprig_reader::parse(src).unwrap()).collect()
    }

    fn imm(n: i64) -> Opcode {
        Opcode::PushImm(Value::int(n))
    }

    #[test]
    fn test_binary_operands_right_then_left() {
        assert_eq!(
            ops("(- 10 3)"),
            vec![
                imm(3),
                imm(10),
                Opcode::CallNative { op: NativeOp::Sub, argc: 2 },
            ]
        );
    }

    #[test]
    fn test_call_arguments_reversed() {
        assert_eq!(
            ops("(f 1 2 3)"),
            vec![
                imm(3),
                imm(2),
                imm(1),
                Opcode::PushFunc { name: intern("f"), argc: 3 },
            ]
        );
        assert_eq!(
            ops("(^f)"),
            vec![Opcode::PushTailFunc { name: intern("f"), argc: 0 }]
        );
    }

    #[test]
    fn test_suite_separates_with_pop() {
        assert_eq!(
            ops("(set a 1) a"),
            vec![
                imm(1),
                Opcode::PopVar(intern("a")),
                Opcode::PushVar(intern("a")),
                Opcode::Pop,
                Opcode::PushVar(intern("a")),
            ]
        );
        assert_eq!(ops("()"), vec![Opcode::Noop, Opcode::PushImm(Value::Nil)]);
    }

    #[test]
    fn test_binding_targets() {
        assert_eq!(
            ops("(setg g 1)"),
            vec![
                imm(1),
                Opcode::PopGlobalVar(intern("g")),
                Opcode::PushGlobalVar(intern("g")),
            ]
        );
        assert_eq!(
            ops("(setc c 1)"),
            vec![
                imm(1),
                Opcode::PopClosureVar(intern("c")),
                Opcode::PushClosureVar(intern("c")),
            ]
        );
    }

    #[test]
    fn test_if_shape() {
        let else_ = Label { role: "else", id: 0 };
        let end = Label { role: "endif", id: 1 };
        assert_eq!(
            ops("(if c 1)"),
            vec![
                Opcode::PushVar(intern("c")),
                Opcode::JumpIfFalse(else_),
                imm(1),
                Opcode::JumpAlways(end),
                Opcode::Label(else_),
                Opcode::PushImm(Value::Nil),
                Opcode::Label(end),
            ]
        );
    }

    #[test]
    fn test_while_shape() {
        let start = Label { role: "while", id: 0 };
        let end = Label { role: "endwhile", id: 1 };
        assert_eq!(
            ops("(while c (f))"),
            vec![
                Opcode::PushImm(Value::Nil),
                Opcode::Label(start),
                Opcode::PushVar(intern("c")),
                Opcode::JumpIfFalse(end),
                Opcode::Pop,
                Opcode::PushFunc { name: intern("f"), argc: 0 },
                Opcode::JumpAlways(start),
                Opcode::Label(end),
            ]
        );
    }

    #[test]
    fn test_nested_labels_are_distinct() {
        let code = ops("(if a (if b 1 2) 3)");
        let labels: Vec<Label> = code
            .iter()
            .filter_map(|op| match op {
                Opcode::Label(l) => Some(*l),
                _ => None,
            })
            .collect();
        assert_eq!(labels.len(), 4);
        for (i, a) in labels.iter().enumerate() {
            assert!(labels[i + 1..].iter().all(|b| a != b));
        }
    }

    #[test]
    fn test_compiling_twice_is_identical() {
        let node = sprig_reader::parse(
            "(set f (lambda (n) (if (< n 1) 0 (^f (- n 1))))) (while (f 3) (print 1)) (f 5)",
        )
        .unwrap();
        let first: Vec<Opcode> = compile(&node).collect();
        let second: Vec<Opcode> = compile(&node).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_misc_forms() {
        assert_eq!(ops("(ret 1)"), vec![imm(1), Opcode::PopFunc]);
        assert_eq!(ops("(read)"), vec![Opcode::ReadInput]);
        assert_eq!(
            ops("(eval x)"),
            vec![Opcode::PushVar(intern("x")), Opcode::Evaluate]
        );
        assert!(matches!(&ops("(lambda (x) x)")[..], [Opcode::CreateFunc(_)]));
        assert!(matches!(&ops("(quoted x)")[..], [Opcode::PushImm(Value::Node(_))]));
        assert!(matches!(&ops("(1 2)")[..], [Opcode::Missing { form, .. }] if form == "(1 2)"));
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        let mut node = Node::atom(Value::int(0));
        for _ in 0..2_000 {
            node = Node::apply(NativeOp::Add, vec![Node::atom(Value::int(1)), node]);
        }
        assert_eq!(compile(&node).count(), 4_001);
    }
}
