// devirt-optimize: dispatch-resolution passes
//
// Architecture:
// - passes: focused analyses and synthesizers (self-type resolution, tag
//   dispatch, generic lowering, validation of the lowered fragment)
// - transformations: the AST -> LIR lowering that drives the passes
// - orchestrators: execution of lowered fragments
// - pipeline: hierarchy construction, lowering and validation in one call

pub mod error;
pub mod orchestrators;
pub mod passes;
pub mod pipeline;
pub mod transformations;

// Re-export key types for convenience
pub use orchestrators::*;
pub use passes::*;
pub use pipeline::*;
pub use transformations::*;
