mod eval;

pub use eval::{apply, eval, read_input, EvalResult};
