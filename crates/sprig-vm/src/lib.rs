pub mod compiler;
pub mod disasm;
pub mod opcodes;
pub mod program;
pub mod vm;

pub use compiler::{compile, Instructions};
pub use disasm::disassemble;
pub use opcodes::{Label, Opcode};
pub use program::Program;
pub use vm::{run_node, Vm};
