pub mod ast_to_lir;

pub use ast_to_lir::*;
