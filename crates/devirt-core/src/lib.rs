//! devirt-core: data model shared by the dispatch-resolution passes.
//!
//! The input fragment (`ast`) comes from an external parser and type checker,
//! the lowered fragment (`lir`) goes to an external emitter. Everything in
//! between (hierarchy, tags, concrete type sets, runtime narrowing) lives
//! here so the optimizer crate can stay focused on the passes themselves.

#[macro_use]
pub mod macros;

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod hierarchy;
pub mod lir;
pub mod runtime;
pub mod span;
pub mod tags;
pub mod types;

// Re-export commonly used items for convenience
pub use tracing;

pub use hierarchy::{ClassDef, ClassId, HierarchyModel, MethodDef, MethodId};
pub use tags::{TypeTag, TypeTagRegistry};
pub use types::ConcreteTypeSet;

pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;
