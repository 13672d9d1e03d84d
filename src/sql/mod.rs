//! Parsed SQL structures.
//!
//! Parsing itself happens outside of this crate, we only define the shape of
//! the statements the planner understands.

pub mod statement;

pub use statement::{BinaryOperator, ColumnRef, Expression, SelectStatement, TableRef};
