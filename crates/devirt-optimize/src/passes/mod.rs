// Passes - focused analyses used by the AST -> LIR lowering

pub mod dispatch;
pub mod generic;
pub mod self_type;
pub mod validate;

pub use dispatch::*;
pub use generic::*;
pub use self_type::*;
pub use validate::*;
