//! Code that turns parsed statements into executable plans.
//!
//! Planning happens in two steps. [`planner`] builds a [`plan::LogicalPlan`]
//! that decides where each condition is evaluated, then [`optimizer`] picks
//! the algorithms and produces a [`crate::vm::Plan`]. [`conditions`] has the
//! WHERE clause analysis that both of them need.

pub mod conditions;
pub mod optimizer;
pub mod plan;
pub mod planner;

pub use optimizer::PhysicalPlanBuilder;
pub use plan::LogicalPlan;
pub use planner::build_logical;
