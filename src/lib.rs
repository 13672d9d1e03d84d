//! TupleDB query engine.
//!
//! Relations are files of fixed width `i32` tuples stored in pages. Queries
//! come in already parsed as [`sql::statement::SelectStatement`] values and
//! go through these steps:
//!
//! ```text
//! SelectStatement -> query::planner -> LogicalPlan -> query::optimizer -> vm::Plan -> tuples
//! ```
//!
//! [`Database`] wraps all of it. Indexes are B+Trees built offline with
//! [`Database::build_indexes`] before running queries.

pub mod config;
pub mod db;
pub mod paging;
pub mod query;
pub mod sql;
pub mod storage;
pub mod vm;

pub use config::{JoinMethod, PlanConfig, SortMethod};
pub use db::{Catalog, Database, DbError, QuerySet, Schema};
pub use storage::tuple::{RecordId, Tuple};

pub type Result<T> = std::result::Result<T, DbError>;
