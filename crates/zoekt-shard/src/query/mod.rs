//! Query tree: construction and normalization.
//!
//! Lowering to retrieval atoms lives in `search::eval`; this module only
//! owns the tree shape and the simplification pass.

mod ast;
mod simplify;

pub use ast::{Query, TypeKind};
pub use simplify::simplify;
