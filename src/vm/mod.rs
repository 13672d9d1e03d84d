//! Physical operators.
//!
//! [`plan::Plan`] is the executable tree built by
//! [`crate::query::optimizer`]. Joins and sorts live in their own modules
//! because they're the bulk of the code.

pub mod expression;
pub mod join;
pub mod plan;
pub mod sort;

pub use expression::Predicate;
pub use plan::Plan;
pub use sort::{JoinComparator, TuplesComparator};
