//! Generates logical plans.
//!
//! The shape of the plan is always the same, only the presence of each node
//! depends on the statement:
//!
//! ```text
//! Distinct
//!   Sort (ORDER BY columns, plus the rest of the output if DISTINCT)
//!     Project (unless SELECT *)
//!       Join on T3 conditions
//!         Join on T2 conditions
//!           Select T1 filters
//!             Scan T1
//!           Select T2 filters
//!             Scan T2
//!         Select T3 filters
//!           Scan T3
//! ```
//!
//! Joins are left deep and follow FROM order. There's no reordering.

use super::{
    conditions::{classify, ClassifiedConditions},
    plan::{Distinct, Empty, Join, LogicalPlan, Project, Scan, Select, Sort},
};
use crate::{
    db::{Catalog, DbError, SqlError},
    sql::statement::{ColumnRef, Expression, SelectStatement, TableRef},
};

/// Builds the logical plan of `statement`. Tables are resolved against
/// `catalog` and every column is checked against the schema of the node that
/// uses it.
pub fn build_logical(
    statement: &SelectStatement,
    catalog: &Catalog,
) -> Result<LogicalPlan, DbError> {
    let tables: Vec<TableRef> = statement.tables().cloned().collect();

    let conditions = match &statement.r#where {
        Some(condition) => classify(condition, &tables)?,
        None => ClassifiedConditions::unconditional(tables.len()),
    };

    let source = |i: usize| -> Result<LogicalPlan, DbError> {
        let table = &tables[i];
        let relation = catalog.relation(&table.name)?;

        let scan = LogicalPlan::Scan(Scan {
            table: table.clone(),
            schema: relation.schema(table.qualifier()),
        });

        Ok(match conditions.filter(i) {
            Some(predicate) => LogicalPlan::Select(Select {
                source: Box::new(scan),
                predicate,
            }),
            None => scan,
        })
    };

    let mut plan = source(0)?;

    for i in 1..tables.len() {
        let right = source(i)?;
        let schema = plan.schema().join(right.schema())?;

        plan = LogicalPlan::Join(Join {
            left: Box::new(plan),
            right: Box::new(right),
            condition: conditions.join_condition(i),
            schema,
        });
    }

    if conditions.always_false {
        plan = LogicalPlan::Empty(Empty {
            source: Box::new(plan),
        });
    }

    if !statement.selects_all() {
        let columns = statement
            .columns
            .iter()
            .map(|expr| match expr {
                Expression::Identifier(col) => Ok(col.clone()),
                other => Err(SqlError::InvalidColumn(other.to_string())),
            })
            .collect::<Result<Vec<ColumnRef>, SqlError>>()?;

        let schema = plan.schema().project(&columns)?;

        plan = LogicalPlan::Project(Project {
            source: Box::new(plan),
            columns,
            schema,
        });
    }

    if !statement.order_by.is_empty() {
        plan.schema().indexes_of(&statement.order_by)?;

        plan = LogicalPlan::Sort(Sort {
            source: Box::new(plan),
            by: statement.order_by.clone(),
        });
    }

    if statement.distinct {
        plan = sort_all_columns(plan);

        plan = LogicalPlan::Distinct(Distinct {
            source: Box::new(plan),
        });
    }

    Ok(plan)
}

/// Distinct only removes adjacent duplicates, so its input must be sorted by
/// every output column. If there's an ORDER BY already, the columns it
/// doesn't mention are appended to its keys, which keeps the requested order
/// intact.
fn sort_all_columns(plan: LogicalPlan) -> LogicalPlan {
    match plan {
        LogicalPlan::Sort(mut sort) => {
            let missing: Vec<ColumnRef> = sort
                .source
                .schema()
                .columns
                .iter()
                .filter(|col| !sort.by.contains(col))
                .cloned()
                .collect();

            sort.by.extend(missing);
            LogicalPlan::Sort(sort)
        }

        other => {
            let by = other.schema().columns.clone();

            LogicalPlan::Sort(Sort {
                source: Box::new(other),
                by,
            })
        }
    }
}
