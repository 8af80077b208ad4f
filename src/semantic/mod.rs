//! Semantic analysis: constant folding, type inference, expression
//! translation, scope management and function monomorphization.

pub mod eval;
pub mod functions;
pub mod infer;
pub mod scope;
pub mod translate;
pub mod types;

pub use scope::{Binding, Ctx, Scope};
pub use types::TypeLabel;

#[cfg(test)]
mod tests;
