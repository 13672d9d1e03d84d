//! Code that executes [`Plan`] trees.
//!
//! Plans follow the iterator (Volcano) model: each node pulls tuples from its
//! children one at a time by calling [`Plan::try_next`] and produces its own
//! tuples lazily. Consider this query:
//!
//! ```sql
//! SELECT S.name FROM Sailors S, Reserves R WHERE S.id = R.sid AND S.age > 30;
//! ```
//!
//! The plan builders in [`crate::query`] would produce something like this:
//!
//! ```text
//!            +----------------+
//!            |    Project     |
//!            +----------------+
//!                    ^
//!                    |
//!            +----------------+
//!            | TNLJ S.id=R.sid|
//!            +----------------+
//!              ^            ^
//!              |            |
//!     +--------------+  +--------+
//!     | Filter age>30|  | Scan R |
//!     +--------------+  +--------+
//!              ^
//!              |
//!         +--------+
//!         | Scan S |
//!         +--------+
//! ```
//!
//! Calling [`Plan::try_next`] on the root only reads as much input as needed
//! to produce one tuple, except for sorts which consume their entire input
//! first. [`Plan::reset`] rewinds a plan so that it produces its whole output
//! again, which is what nested loop joins do with their right child.
//!
//! Every node owns its children through a [`Box`], so there's no shared
//! mutable state between nodes.

use std::fmt::{self, Display};

use super::{
    expression::Predicate,
    join::{BlockNestedLoopJoin, SortMergeJoin, TupleNestedLoopJoin},
    sort::{ExternalSort, InMemorySort},
};
use crate::{
    db::{DbError, IndexMetadata, RelationMetadata, Schema, SqlError},
    paging::{io::FileOps, reader::TupleReader},
    sql::statement::{ColumnRef, Expression},
    storage::{
        btree::{IndexReader, LeafNode, NodeAddress},
        tuple::{self, RecordId, Tuple},
    },
};

pub enum Plan<F> {
    SeqScan(SeqScan<F>),
    IndexScan(IndexScan<F>),
    Filter(Filter<F>),
    Project(Project<F>),
    Distinct(Distinct<F>),
    Empty(Empty),
    TupleNestedLoopJoin(TupleNestedLoopJoin<F>),
    BlockNestedLoopJoin(BlockNestedLoopJoin<F>),
    SortMergeJoin(SortMergeJoin<F>),
    InMemorySort(InMemorySort<F>),
    ExternalSort(ExternalSort<F>),
}

// Plain match dispatch. A Box<dyn Trait> would save some typing here but then
// we can't tell what kind of node we're looking at when building or printing
// plans, and the compiler wouldn't complain when a new variant is added.
impl<F: FileOps> Plan<F> {
    /// Returns the next tuple or [`None`] once the plan is exhausted. Calling
    /// this again after [`None`] keeps returning [`None`] until
    /// [`Self::reset`] is called.
    pub fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        match self {
            Self::SeqScan(seq_scan) => seq_scan.try_next(),
            Self::IndexScan(index_scan) => index_scan.try_next(),
            Self::Filter(filter) => filter.try_next(),
            Self::Project(project) => project.try_next(),
            Self::Distinct(distinct) => distinct.try_next(),
            Self::Empty(_) => Ok(None),
            Self::TupleNestedLoopJoin(join) => join.try_next(),
            Self::BlockNestedLoopJoin(join) => join.try_next(),
            Self::SortMergeJoin(join) => join.try_next(),
            Self::InMemorySort(sort) => sort.try_next(),
            Self::ExternalSort(sort) => sort.try_next(),
        }
    }

    /// Rewinds the plan so that it produces its full output again.
    pub fn reset(&mut self) -> Result<(), DbError> {
        match self {
            Self::SeqScan(seq_scan) => {
                seq_scan.reader.reset();
                Ok(())
            }
            Self::IndexScan(index_scan) => index_scan.reset(),
            Self::Filter(filter) => filter.source.reset(),
            Self::Project(project) => project.source.reset(),
            Self::Distinct(distinct) => distinct.reset(),
            Self::Empty(_) => Ok(()),
            Self::TupleNestedLoopJoin(join) => join.reset(),
            Self::BlockNestedLoopJoin(join) => join.reset(),
            Self::SortMergeJoin(join) => join.reset(),
            Self::InMemorySort(sort) => sort.reset(),
            Self::ExternalSort(sort) => sort.reset(),
        }
    }
}

impl<F: FileOps> Iterator for Plan<F> {
    type Item = Result<Tuple, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

impl<F> Plan<F> {
    /// Output schema. Fixed when the node is built.
    pub fn schema(&self) -> &Schema {
        match self {
            Self::SeqScan(seq_scan) => &seq_scan.schema,
            Self::IndexScan(index_scan) => &index_scan.schema,
            Self::Filter(filter) => &filter.schema,
            Self::Project(project) => &project.schema,
            Self::Distinct(distinct) => &distinct.schema,
            Self::Empty(empty) => &empty.schema,
            Self::TupleNestedLoopJoin(join) => &join.schema,
            Self::BlockNestedLoopJoin(join) => &join.schema,
            Self::SortMergeJoin(join) => &join.schema,
            Self::InMemorySort(sort) => &sort.schema,
            Self::ExternalSort(sort) => &sort.schema,
        }
    }

    fn children(&self) -> Vec<&Plan<F>> {
        match self {
            Self::SeqScan(_) | Self::IndexScan(_) | Self::Empty(_) => vec![],
            Self::Filter(filter) => vec![&*filter.source],
            Self::Project(project) => vec![&*project.source],
            Self::Distinct(distinct) => vec![&*distinct.source],
            Self::TupleNestedLoopJoin(join) => vec![&*join.left, &*join.right],
            Self::BlockNestedLoopJoin(join) => vec![&*join.left, &*join.right],
            Self::SortMergeJoin(join) => vec![&*join.left, &*join.right],
            Self::InMemorySort(sort) => vec![&*sort.source],
            Self::ExternalSort(sort) => vec![&*sort.source],
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeqScan(seq_scan) => write!(f, "SeqScan on {}", seq_scan.relation),

            Self::IndexScan(index_scan) => {
                write!(
                    f,
                    "IndexScan on {} using {}.{} ({})",
                    index_scan.relation,
                    index_scan.index.table,
                    index_scan.index.column,
                    if index_scan.index.clustered {
                        "clustered"
                    } else {
                        "unclustered"
                    }
                )?;

                let bound = |bound: Option<i32>| bound.map_or("..".into(), |key| key.to_string());

                write!(f, " [{}, {}]", bound(index_scan.low), bound(index_scan.high))
            }

            Self::Filter(filter) => write!(f, "Filter {}", filter.predicate),
            Self::Project(project) => write!(f, "Project {}", project.schema),
            Self::Distinct(_) => f.write_str("Distinct"),
            Self::Empty(empty) => write!(f, "Empty {}", empty.schema),

            Self::TupleNestedLoopJoin(join) => {
                f.write_str("TupleNestedLoopJoin")?;
                fmt_condition(f, &join.condition)
            }

            Self::BlockNestedLoopJoin(join) => {
                write!(f, "BlockNestedLoopJoin block={}", join.block_size)?;
                fmt_condition(f, &join.condition)
            }

            Self::SortMergeJoin(join) => write!(
                f,
                "SortMergeJoin left={:?} right={:?}",
                join.comparator.left, join.comparator.right
            ),

            Self::InMemorySort(sort) => write!(f, "InMemorySort by {}", sort.comparator),

            Self::ExternalSort(sort) => write!(
                f,
                "ExternalSort by {} pages={}",
                sort.comparator, sort.buffer_pages
            ),
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}", "", indent = depth * 2)?;
        self.fmt_node(f)?;
        writeln!(f)?;

        for child in self.children() {
            child.fmt_tree(f, depth + 1)?;
        }

        Ok(())
    }
}

fn fmt_condition(f: &mut fmt::Formatter<'_>, condition: &Option<Predicate>) -> fmt::Result {
    match condition {
        Some(predicate) => write!(f, " on {predicate}"),
        None => Ok(()),
    }
}

impl<F> Display for Plan<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

/// Reads every tuple of a relation file in storage order.
pub struct SeqScan<F> {
    pub relation: String,
    pub schema: Schema,
    pub reader: TupleReader<F>,
}

impl<F: FileOps> SeqScan<F> {
    /// Opens the relation file. Columns are qualified with `qualifier`,
    /// which is the alias if the query gave one.
    pub fn open(
        relation: &RelationMetadata,
        qualifier: &str,
        page_size: usize,
    ) -> Result<Self, DbError> {
        Ok(Self {
            relation: relation.name.clone(),
            schema: relation.schema(qualifier),
            reader: TupleReader::open(&relation.path, page_size)?,
        })
    }

    fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        let Some(tuple) = self.reader.try_next()? else {
            return Ok(None);
        };

        check_width(&self.relation, &self.schema, tuple).map(Some)
    }
}

/// Fails if `tuple` doesn't have one attribute per column of `schema`.
fn check_width(relation: &str, schema: &Schema, tuple: Tuple) -> Result<Tuple, DbError> {
    if tuple.len() != schema.len() {
        return Err(DbError::Corrupted(format!(
            "relation {relation} has {} attributes but found tuple of width {}",
            schema.len(),
            tuple.len()
        )));
    }

    Ok(tuple)
}

/// Position of an unclustered index scan inside the leaves.
pub struct IndexCursor {
    pub address: NodeAddress,
    pub leaf: LeafNode,
    /// Current entry in [`Self::leaf`].
    pub entry: usize,
    /// Next record id of the current entry.
    pub record: usize,
}

/// Uses a B+Tree to read only the tuples whose indexed attribute falls in
/// `[low, high]`. Both bounds are inclusive and optional.
///
/// Clustered indexes only use the tree to find the first tuple. Since the
/// relation file is sorted by the indexed attribute, the scan then reads the
/// file forward until it finds a key greater than `high`.
///
/// Unclustered indexes have to follow every record id in every leaf entry,
/// seeking the relation file for each one of them.
pub struct IndexScan<F> {
    pub relation: String,
    pub schema: Schema,
    pub index: IndexMetadata,
    pub low: Option<i32>,
    pub high: Option<i32>,
    pub tree: IndexReader<F>,
    pub reader: TupleReader<F>,
    /// Unclustered scans only.
    pub cursor: Option<IndexCursor>,
    /// First tuple in range. Clustered scans only.
    pub start: Option<RecordId>,
    pub started: bool,
    pub done: bool,
}

impl<F: FileOps> IndexScan<F> {
    pub fn open(
        relation: &RelationMetadata,
        qualifier: &str,
        index: &IndexMetadata,
        low: Option<i32>,
        high: Option<i32>,
        page_size: usize,
    ) -> Result<Self, DbError> {
        Ok(Self {
            relation: relation.name.clone(),
            schema: relation.schema(qualifier),
            index: index.clone(),
            low,
            high,
            tree: IndexReader::open(&index.path, page_size)?,
            reader: TupleReader::open(&relation.path, page_size)?,
            cursor: None,
            start: None,
            started: false,
            done: false,
        })
    }

    fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.started {
            self.start()?;
            self.started = true;
        }

        if self.done {
            return Ok(None);
        }

        let tuple = if self.index.clustered {
            self.next_clustered()?
        } else {
            self.next_unclustered()?
        };

        if tuple.is_none() {
            self.done = true;
        }

        Ok(tuple)
    }

    /// Descends the tree to the first entry with key `>= low`.
    fn start(&mut self) -> Result<(), DbError> {
        let Some((address, leaf, entry)) = self.tree.lower_bound(self.low)? else {
            self.done = true;
            return Ok(());
        };

        if self.index.clustered {
            match leaf.entries[entry].record_ids.first() {
                Some(record_id) => {
                    self.reader.seek(*record_id);
                    self.start = Some(*record_id);
                }
                None => self.done = true,
            }
        } else {
            self.cursor = Some(IndexCursor {
                address,
                leaf,
                entry,
                record: 0,
            });
        }

        Ok(())
    }

    fn next_clustered(&mut self) -> Result<Option<Tuple>, DbError> {
        let Some(tuple) = self.reader.try_next()? else {
            return Ok(None);
        };

        let tuple = check_width(&self.relation, &self.schema, tuple)?;

        if let Some(high) = self.high {
            if self.key_of(&tuple)? > high {
                return Ok(None);
            }
        }

        Ok(Some(tuple))
    }

    fn next_unclustered(&mut self) -> Result<Option<Tuple>, DbError> {
        loop {
            let Some(cursor) = self.cursor.as_mut() else {
                return Ok(None);
            };

            let Some(entry) = cursor.leaf.entries.get(cursor.entry) else {
                match self.tree.next_leaf(cursor.address)? {
                    Some((address, leaf)) => {
                        *cursor = IndexCursor {
                            address,
                            leaf,
                            entry: 0,
                            record: 0,
                        };
                        continue;
                    }
                    None => return Ok(None),
                }
            };

            if self.high.is_some_and(|high| entry.key > high) {
                return Ok(None);
            }

            if let Some(record_id) = entry.record_ids.get(cursor.record).copied() {
                cursor.record += 1;
                self.reader.seek(record_id);

                return match self.reader.try_next()? {
                    Some(tuple) => check_width(&self.relation, &self.schema, tuple).map(Some),
                    None => Err(DbError::Corrupted(format!(
                        "index {}.{} points to missing tuple {record_id}",
                        self.index.table, self.index.column
                    ))),
                };
            }

            cursor.entry += 1;
            cursor.record = 0;
        }
    }

    fn key_of(&self, tuple: &[i32]) -> Result<i32, DbError> {
        tuple.get(self.index.attribute).copied().ok_or_else(|| {
            DbError::Corrupted(format!(
                "tuple of width {} has no attribute {} for index {}.{}",
                tuple.len(),
                self.index.attribute,
                self.index.table,
                self.index.column
            ))
        })
    }

    /// Clustered scans seek back to the first tuple in range, unclustered
    /// scans walk the tree again.
    fn reset(&mut self) -> Result<(), DbError> {
        match (self.index.clustered, self.start) {
            (true, Some(record_id)) => self.reader.seek(record_id),
            _ => {
                self.started = false;
                self.cursor = None;
            }
        }

        self.done = false;

        Ok(())
    }
}

/// Returns only the tuples that satisfy the predicate.
pub struct Filter<F> {
    pub source: Box<Plan<F>>,
    pub schema: Schema,
    pub predicate: Predicate,
}

impl<F: FileOps> Filter<F> {
    pub fn new(source: Box<Plan<F>>, filter: &Expression) -> Result<Self, SqlError> {
        let schema = source.schema().clone();
        let predicate = Predicate::new(filter, &schema)?;

        Ok(Self {
            source,
            schema,
            predicate,
        })
    }

    fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        while let Some(tuple) = self.source.try_next()? {
            if self.predicate.eval(&tuple) {
                return Ok(Some(tuple));
            }
        }

        Ok(None)
    }
}

/// Picks columns from the source tuples.
pub struct Project<F> {
    pub source: Box<Plan<F>>,
    pub schema: Schema,
    /// Position of each output column in the source schema.
    pub indexes: Vec<usize>,
}

impl<F: FileOps> Project<F> {
    /// Fails if any column doesn't exist in the source schema.
    pub fn new(source: Box<Plan<F>>, columns: &[ColumnRef]) -> Result<Self, SqlError> {
        let indexes = source.schema().indexes_of(columns)?;
        let schema = source.schema().project(columns)?;

        Ok(Self {
            source,
            schema,
            indexes,
        })
    }

    fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        Ok(self
            .source
            .try_next()?
            .map(|tuple| tuple::project(&tuple, &self.indexes)))
    }
}

/// Drops adjacent duplicates. The source must be sorted on every column for
/// this to remove all duplicates.
pub struct Distinct<F> {
    pub source: Box<Plan<F>>,
    pub schema: Schema,
    /// Last tuple returned.
    pub previous: Option<Tuple>,
}

impl<F: FileOps> Distinct<F> {
    pub fn new(source: Box<Plan<F>>) -> Self {
        Self {
            schema: source.schema().clone(),
            source,
            previous: None,
        }
    }

    fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        while let Some(tuple) = self.source.try_next()? {
            if self.previous.as_ref() != Some(&tuple) {
                self.previous = Some(tuple.clone());
                return Ok(Some(tuple));
            }
        }

        Ok(None)
    }

    fn reset(&mut self) -> Result<(), DbError> {
        self.source.reset()?;
        self.previous = None;
        Ok(())
    }
}

/// Plan that never returns anything, built when a WHERE clause is known to
/// be false before running the query.
pub struct Empty {
    pub schema: Schema,
}

/// Collects every tuple produced by `plan`.
pub fn collect<F: FileOps>(plan: &mut Plan<F>) -> Result<Vec<Tuple>, DbError> {
    let mut tuples = Vec::new();

    while let Some(tuple) = plan.try_next()? {
        tuples.push(tuple);
    }

    Ok(tuples)
}
