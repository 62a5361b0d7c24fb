pub mod context;
pub mod env;
pub mod error;
pub mod format;
pub mod node;
pub mod number;
pub mod ops;
pub mod token;
pub mod value;

pub use context::{
    Config, DepthGuard, EvalContext, ReaderFn, Scoping, SharedBuffer, Stats, STDIN_OVERRIDE,
};
pub use env::{Env, Frame, Target};
pub use error::{ProgramError, Span};
pub use node::{LambdaDef, Node};
pub use number::Number;
pub use ops::NativeOp;
pub use token::TokenTree;
pub use value::{intern, resolve, with_resolved, NativeFn, Pair, Ufunc, Value};
