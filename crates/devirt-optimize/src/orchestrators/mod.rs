pub mod interpretation;

pub use interpretation::*;
