//! Logical plans.
//!
//! A [`LogicalPlan`] describes *what* a query computes without deciding *how*:
//! there's one join node regardless of the join algorithm and one sort node
//! regardless of whether the sort spills to disk. The planner builds these
//! from a [`crate::sql::SelectStatement`] and the optimizer turns them into
//! executable [`crate::vm::Plan`] trees.

use std::fmt::{self, Display};

use crate::{
    db::Schema,
    sql::statement::{ColumnRef, Expression, TableRef},
};

#[derive(Debug, PartialEq, Clone)]
pub enum LogicalPlan {
    Scan(Scan),
    Select(Select),
    Join(Join),
    Project(Project),
    Sort(Sort),
    Distinct(Distinct),
    Empty(Empty),
}

/// Full scan of a relation.
#[derive(Debug, PartialEq, Clone)]
pub struct Scan {
    pub table: TableRef,
    /// Relation attributes qualified with the table alias or name.
    pub schema: Schema,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Select {
    pub source: Box<LogicalPlan>,
    pub predicate: Expression,
}

/// Left deep join. The right side is always a scan, possibly filtered.
#[derive(Debug, PartialEq, Clone)]
pub struct Join {
    pub left: Box<LogicalPlan>,
    pub right: Box<LogicalPlan>,
    /// [`None`] means cartesian product.
    pub condition: Option<Expression>,
    pub schema: Schema,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Project {
    pub source: Box<LogicalPlan>,
    pub columns: Vec<ColumnRef>,
    pub schema: Schema,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Sort {
    pub source: Box<LogicalPlan>,
    pub by: Vec<ColumnRef>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Distinct {
    pub source: Box<LogicalPlan>,
}

/// Result known to be empty at planning time. Keeps the plan it replaces so
/// that the output schema doesn't change.
#[derive(Debug, PartialEq, Clone)]
pub struct Empty {
    pub source: Box<LogicalPlan>,
}

impl LogicalPlan {
    pub fn schema(&self) -> &Schema {
        match self {
            Self::Scan(scan) => &scan.schema,
            Self::Join(join) => &join.schema,
            Self::Project(project) => &project.schema,
            Self::Select(Select { source, .. })
            | Self::Sort(Sort { source, .. })
            | Self::Distinct(Distinct { source })
            | Self::Empty(Empty { source }) => source.schema(),
        }
    }

    fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            Self::Scan(_) => vec![],
            Self::Join(join) => vec![&*join.left, &*join.right],
            Self::Select(Select { source, .. })
            | Self::Project(Project { source, .. })
            | Self::Sort(Sort { source, .. })
            | Self::Distinct(Distinct { source })
            | Self::Empty(Empty { source }) => vec![&**source],
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}", "", indent = depth * 2)?;

        match self {
            Self::Scan(scan) => write!(f, "Scan {}", scan.table)?,
            Self::Select(select) => write!(f, "Select {}", select.predicate)?,
            Self::Join(join) => match &join.condition {
                Some(condition) => write!(f, "Join on {condition}")?,
                None => f.write_str("Join")?,
            },
            Self::Project(project) => write!(f, "Project {}", project.schema)?,
            Self::Sort(sort) => write!(f, "Sort by {}", Schema::new(sort.by.clone()))?,
            Self::Distinct(_) => f.write_str("Distinct")?,
            Self::Empty(_) => f.write_str("Empty")?,
        }

        writeln!(f)?;

        // Empty plans never run their source, no point in printing it.
        if let Self::Empty(_) = self {
            return Ok(());
        }

        for child in self.children() {
            child.fmt_tree(f, depth + 1)?;
        }

        Ok(())
    }
}

impl Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}
