//! Generates physical plans.
//!
//! Logical plans say what to compute, this module decides how based on the
//! [`PlanConfig`]:
//!
//! - Selections directly above a scan can become index scans if indexes are
//!   enabled and the predicate bounds some indexed attribute.
//! - Joins become tuple nested loop, block nested loop or sort merge joins.
//!   Sort merge joins only work with equality conditions, everything else
//!   falls back to tuple nested loop.
//! - Sorts are done in memory or externally.
//!
//! See the module level documentation of [`crate::vm::plan`] for how the
//! resulting trees are executed.

use tracing::debug;

use super::{
    conditions::{extract_index_bounds, extract_join_keys},
    plan::{self as logical, LogicalPlan},
};
use crate::{
    config::{JoinMethod, PlanConfig, SortMethod},
    db::{Catalog, DbError},
    paging::{cache::CacheRegistry, io::FileOps, page::tuples_per_pages},
    sql::statement::{ColumnRef, Expression},
    vm::{
        expression::Predicate,
        join::{BlockNestedLoopJoin, SortMergeJoin, TupleNestedLoopJoin},
        plan::{Distinct, Empty, Filter, IndexScan, Plan, Project, SeqScan},
        sort::{ExternalSort, InMemorySort, JoinComparator, TuplesComparator},
    },
};

/// Turns [`LogicalPlan`] trees into executable [`Plan`] trees.
pub struct PhysicalPlanBuilder<'c> {
    catalog: &'c Catalog,
    config: PlanConfig,
    /// External sorts allocate their temporary directories from here.
    registry: CacheRegistry,
}

impl<'c> PhysicalPlanBuilder<'c> {
    /// Fails if the config asks for less buffer pages than the algorithms
    /// need.
    pub fn new(
        catalog: &'c Catalog,
        config: PlanConfig,
        registry: CacheRegistry,
    ) -> Result<Self, DbError> {
        config.validate()?;

        Ok(Self {
            catalog,
            config,
            registry,
        })
    }

    pub fn build<F: FileOps>(&self, plan: &LogicalPlan) -> Result<Plan<F>, DbError> {
        Ok(match plan {
            LogicalPlan::Scan(scan) => Plan::SeqScan(self.seq_scan(scan)?),

            LogicalPlan::Select(select) => self.build_select(select)?,

            LogicalPlan::Join(join) => self.build_join(join)?,

            LogicalPlan::Project(project) => Plan::Project(Project::new(
                Box::new(self.build(&project.source)?),
                &project.columns,
            )?),

            LogicalPlan::Sort(sort) => self.sort(self.build(&sort.source)?, &sort.by)?,

            LogicalPlan::Distinct(distinct) => {
                Plan::Distinct(Distinct::new(Box::new(self.build(&distinct.source)?)))
            }

            // Nothing below an empty plan is ever opened.
            LogicalPlan::Empty(empty) => Plan::Empty(Empty {
                schema: empty.source.schema().clone(),
            }),
        })
    }

    fn seq_scan<F: FileOps>(&self, scan: &logical::Scan) -> Result<SeqScan<F>, DbError> {
        let relation = self.catalog.relation(&scan.table.name)?;
        SeqScan::open(relation, scan.table.qualifier(), self.config.page_size)
    }

    fn build_select<F: FileOps>(&self, select: &logical::Select) -> Result<Plan<F>, DbError> {
        if self.config.use_index {
            if let LogicalPlan::Scan(scan) = &*select.source {
                if let Some(plan) = self.index_scan(scan, &select.predicate)? {
                    return Ok(plan);
                }
            }
        }

        let source = self.build(&select.source)?;

        Ok(Plan::Filter(Filter::new(
            Box::new(source),
            &select.predicate,
        )?))
    }

    /// Uses the first index of the relation (in definition order) that gets
    /// at least one bound out of the predicate. Conjuncts that are not bounds
    /// are evaluated by a filter on top of the index scan.
    fn index_scan<F: FileOps>(
        &self,
        scan: &logical::Scan,
        predicate: &Expression,
    ) -> Result<Option<Plan<F>>, DbError> {
        let relation = self.catalog.relation(&scan.table.name)?;
        let qualifier = scan.table.qualifier();

        for index in self.catalog.indexes_of(&relation.name) {
            let column = ColumnRef::new(qualifier, &index.column);
            let (bounds, remainder) = extract_index_bounds(predicate, &column);

            if bounds.is_unbounded() {
                continue;
            }

            debug!(
                relation = %relation.name,
                column = %index.column,
                clustered = index.clustered,
                low = ?bounds.low,
                high = ?bounds.high,
                "using index scan"
            );

            let mut plan = Plan::IndexScan(IndexScan::open(
                relation,
                qualifier,
                index,
                bounds.low,
                bounds.high,
                self.config.page_size,
            )?);

            if let Some(remainder) = remainder {
                plan = Plan::Filter(Filter::new(Box::new(plan), &remainder)?);
            }

            return Ok(Some(plan));
        }

        debug!(relation = %relation.name, %predicate, "no index bounds, using full scan");

        Ok(None)
    }

    fn build_join<F: FileOps>(&self, join: &logical::Join) -> Result<Plan<F>, DbError> {
        let left = self.build(&join.left)?;
        let right = self.build(&join.right)?;

        let condition = join
            .condition
            .as_ref()
            .map(|condition| Predicate::new(condition, &join.schema))
            .transpose()?;

        let schema = join.schema.clone();

        match self.config.join {
            JoinMethod::TupleNestedLoop => Ok(Plan::TupleNestedLoopJoin(TupleNestedLoopJoin::new(
                Box::new(left),
                Box::new(right),
                condition,
                schema,
            ))),

            JoinMethod::BlockNestedLoop { buffer_pages } => {
                let block_size =
                    tuples_per_pages(buffer_pages, self.config.page_size, left.schema().len());

                debug!(buffer_pages, block_size, "using block nested loop join");

                Ok(Plan::BlockNestedLoopJoin(BlockNestedLoopJoin::new(
                    Box::new(left),
                    Box::new(right),
                    condition,
                    schema,
                    block_size,
                )))
            }

            JoinMethod::SortMerge => {
                let keys = join.condition.as_ref().and_then(|condition| {
                    extract_join_keys(condition, left.schema(), right.schema())
                });

                let Some((left_keys, right_keys)) = keys else {
                    debug!(
                        condition = ?join.condition.as_ref().map(ToString::to_string),
                        "not an equi-join, sort merge join falls back to tuple nested loop join"
                    );

                    return Ok(Plan::TupleNestedLoopJoin(TupleNestedLoopJoin::new(
                        Box::new(left),
                        Box::new(right),
                        condition,
                        schema,
                    )));
                };

                let comparator = JoinComparator::new(
                    left.schema().indexes_of(&left_keys)?,
                    right.schema().indexes_of(&right_keys)?,
                );

                let left = self.sort(left, &left_keys)?;
                let right = self.sort(right, &right_keys)?;

                Ok(Plan::SortMergeJoin(SortMergeJoin::new(
                    Box::new(left),
                    Box::new(right),
                    comparator,
                    schema,
                )))
            }
        }
    }

    fn sort<F: FileOps>(&self, source: Plan<F>, by: &[ColumnRef]) -> Result<Plan<F>, DbError> {
        let comparator = TuplesComparator::for_columns(source.schema(), by)?;

        Ok(match self.config.sort {
            SortMethod::InMemory => {
                Plan::InMemorySort(InMemorySort::new(Box::new(source), comparator))
            }

            SortMethod::External { buffer_pages } => Plan::ExternalSort(ExternalSort::new(
                Box::new(source),
                comparator,
                buffer_pages,
                self.config.page_size,
                self.registry.clone(),
            )),
        })
    }
}
