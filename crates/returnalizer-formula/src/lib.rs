mod hasher;
pub mod ast;
pub mod pretty;

pub use ast::{ASTNode, ASTNodeType, ReferenceType, TableReference, TableSpecifier};
pub use pretty::{canonical_formula, pretty_print};

// Re-export common types
pub use returnalizer_common::{CalcError, CalcErrorKind, Value};
