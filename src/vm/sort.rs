//! Sorting operators.
//!
//! [`InMemorySort`] buffers the whole input and sorts it with a stable sort.
//! [`ExternalSort`] does the classic two phase algorithm with bounded memory.
//! Given `B` buffer pages:
//!
//! 1. Pass 0 reads `B - 1` pages worth of tuples at a time, sorts them in
//!    memory and writes each chunk to its own run file.
//!
//! 2. Each merge pass takes groups of `B - 1` runs and merges each group into
//!    one new run using one input page per run and one output page. Consumed
//!    runs are deleted as soon as their group is done.
//!
//! ```text
//! PASS 0               PASS 1              PASS 2
//!
//! +-----+
//! | 4 1 | -----+
//! +-----+      |      +---------+
//! +-----+      +----> | 1 2 3 4 | ---+
//! | 2 3 | -----+      +---------+    |      +-----------------+
//! +-----+                            +----> | 1 2 3 4 5 6 7 8 |
//! +-----+                            |      +-----------------+
//! | 8 6 | -----+      +---------+    |
//! +-----+      +----> | 5 6 7 8 | ---+
//! +-----+      |      +---------+
//! | 5 7 | -----+
//! +-----+
//! ```
//!
//! Passes go on until only one run is left, which is then read back with a
//! normal [`TupleReader`]. Runs live in a [`CacheDir`], so they're deleted
//! when the operator is dropped or when the whole query is cleaned up through
//! the [`CacheRegistry`], whichever happens first.
//!
//! Ties are broken by run number while merging, and run numbers follow input
//! order. So the external sort is stable and outputs exactly the same sequence
//! as [`InMemorySort`].

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    fmt::Display,
    path::{Path, PathBuf},
};

use tracing::debug;

use super::plan::Plan;
use crate::{
    db::{DbError, Schema, SqlError},
    paging::{
        cache::{CacheDir, CacheRegistry},
        io::FileOps,
        page::tuples_per_pages,
        reader::TupleReader,
        writer::TupleWriter,
    },
    sql::statement::ColumnRef,
    storage::tuple::Tuple,
};

/// Compares tuples of the same schema by a list of attribute positions.
///
/// The first position where tuples differ decides the order.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TuplesComparator {
    pub keys: Vec<usize>,
}

impl TuplesComparator {
    pub fn new(keys: Vec<usize>) -> Self {
        Self { keys }
    }

    /// Resolves `by` against `schema`.
    pub fn for_columns(schema: &Schema, by: &[ColumnRef]) -> Result<Self, SqlError> {
        Ok(Self::new(schema.indexes_of(by)?))
    }

    pub fn cmp(&self, a: &[i32], b: &[i32]) -> Ordering {
        self.keys
            .iter()
            .map(|i| a[*i].cmp(&b[*i]))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Sort key of `tuple`. Comparing keys gives the same result as
    /// [`Self::cmp`].
    pub fn key(&self, tuple: &[i32]) -> Vec<i32> {
        self.keys.iter().map(|i| tuple[*i]).collect()
    }
}

/// Compares tuples of two different schemas, each one by its own list of
/// attribute positions. Used by sort merge join.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct JoinComparator {
    pub left: Vec<usize>,
    pub right: Vec<usize>,
}

impl JoinComparator {
    pub fn new(left: Vec<usize>, right: Vec<usize>) -> Self {
        Self { left, right }
    }

    pub fn cmp(&self, left: &[i32], right: &[i32]) -> Ordering {
        self.left
            .iter()
            .zip(&self.right)
            .map(|(l, r)| left[*l].cmp(&right[*r]))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Loads every input tuple in memory and sorts them.
pub struct InMemorySort<F> {
    pub source: Box<Plan<F>>,
    pub comparator: TuplesComparator,
    pub schema: Schema,
    pub tuples: Vec<Tuple>,
    pub next: usize,
    pub sorted: bool,
}

impl<F: FileOps> InMemorySort<F> {
    pub fn new(source: Box<Plan<F>>, comparator: TuplesComparator) -> Self {
        Self {
            schema: source.schema().clone(),
            source,
            comparator,
            tuples: Vec::new(),
            next: 0,
            sorted: false,
        }
    }

    pub(super) fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.sorted {
            while let Some(tuple) = self.source.try_next()? {
                self.tuples.push(tuple);
            }

            self.tuples.sort_by(|a, b| self.comparator.cmp(a, b));
            self.sorted = true;
        }

        let tuple = self.tuples.get(self.next).cloned();

        if tuple.is_some() {
            self.next += 1;
        }

        Ok(tuple)
    }

    /// Replays the sorted buffer. The source is not consumed again.
    pub(super) fn reset(&mut self) -> Result<(), DbError> {
        self.next = 0;
        Ok(())
    }
}

/// Bounded memory sort. See the module level documentation.
pub struct ExternalSort<F> {
    pub source: Box<Plan<F>>,
    pub comparator: TuplesComparator,
    pub schema: Schema,
    pub buffer_pages: usize,
    pub page_size: usize,
    pub registry: CacheRegistry,
    /// Allocated on the first call to [`Self::try_next`].
    pub dir: Option<CacheDir>,
    /// Reader of the final run. [`None`] until sorted or if the input was
    /// empty.
    pub output: Option<TupleReader<F>>,
    pub sorted: bool,
}

impl<F: FileOps> ExternalSort<F> {
    pub fn new(
        source: Box<Plan<F>>,
        comparator: TuplesComparator,
        buffer_pages: usize,
        page_size: usize,
        registry: CacheRegistry,
    ) -> Self {
        Self {
            schema: source.schema().clone(),
            source,
            comparator,
            buffer_pages,
            page_size,
            registry,
            dir: None,
            output: None,
            sorted: false,
        }
    }

    pub(super) fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.sorted {
            self.sort()?;
            self.sorted = true;
        }

        match self.output.as_mut() {
            Some(reader) => reader.try_next(),
            None => Ok(None),
        }
    }

    /// Rewinds the final run. Sorting doesn't happen again.
    pub(super) fn reset(&mut self) -> Result<(), DbError> {
        if let Some(reader) = self.output.as_mut() {
            reader.reset();
        }

        Ok(())
    }

    /// Number of runs merged at once.
    fn fan_in(&self) -> usize {
        self.buffer_pages.saturating_sub(1).max(2)
    }

    fn sort(&mut self) -> Result<(), DbError> {
        let mut dir = self.registry.allocate("sort-")?;

        let mut runs = self.generate_runs(&mut dir)?;
        let mut pass = 0;

        debug!(runs = runs.len(), dir = %dir.path().display(), "external sort pass 0 done");

        while runs.len() > 1 {
            pass += 1;
            let mut merged = Vec::with_capacity(runs.len().div_ceil(self.fan_in()));

            for group in runs.chunks(self.fan_in()) {
                let output = dir.new_file_path("run");
                self.merge(group, &output)?;

                for run in group {
                    F::remove(run)?;
                }

                merged.push(output);
            }

            debug!(pass, runs = merged.len(), "external sort merge pass done");
            runs = merged;
        }

        if let Some(run) = runs.pop() {
            self.output = Some(TupleReader::open(run, self.page_size)?);
        }

        self.dir = Some(dir);

        Ok(())
    }

    /// Pass 0. Returns the run files in input order.
    fn generate_runs(&mut self, dir: &mut CacheDir) -> Result<Vec<PathBuf>, DbError> {
        let chunk_size = tuples_per_pages(
            self.buffer_pages.saturating_sub(1).max(1),
            self.page_size,
            self.schema.len(),
        );

        let mut runs = Vec::new();
        let mut chunk = Vec::with_capacity(chunk_size);
        let mut exhausted = false;

        while !exhausted {
            chunk.clear();

            while chunk.len() < chunk_size {
                match self.source.try_next()? {
                    Some(tuple) => chunk.push(tuple),
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }

            if chunk.is_empty() {
                break;
            }

            chunk.sort_by(|a, b| self.comparator.cmp(a, b));

            let path = dir.new_file_path("run");
            let mut writer = TupleWriter::<F>::create(&path, self.page_size)?;

            for tuple in &chunk {
                writer.write_tuple(tuple)?;
            }

            writer.close()?;
            runs.push(path);
        }

        Ok(runs)
    }

    /// Merges `runs` into a new run at `output`.
    fn merge(&self, runs: &[PathBuf], output: &Path) -> Result<(), DbError> {
        let mut readers = runs
            .iter()
            .map(|run| TupleReader::<F>::open(run, self.page_size))
            .collect::<Result<Vec<_>, _>>()?;

        let mut heads: Vec<Option<Tuple>> = Vec::with_capacity(readers.len());
        let mut heap = BinaryHeap::with_capacity(readers.len());

        for (i, reader) in readers.iter_mut().enumerate() {
            let head = reader.try_next()?;

            if let Some(tuple) = &head {
                heap.push(Reverse((self.comparator.key(tuple), i)));
            }

            heads.push(head);
        }

        let mut writer = TupleWriter::<F>::create(output, self.page_size)?;

        while let Some(Reverse((_, i))) = heap.pop() {
            let Some(tuple) = heads[i].take() else {
                continue;
            };

            writer.write_tuple(&tuple)?;

            heads[i] = readers[i].try_next()?;

            if let Some(next) = &heads[i] {
                heap.push(Reverse((self.comparator.key(next), i)));
            }
        }

        writer.close()
    }
}

impl Display for TuplesComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.keys)
    }
}

#[cfg(test)]
mod tests {
    use std::{cmp::Ordering, fs::File};

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::{ExternalSort, InMemorySort, JoinComparator, TuplesComparator};
    use crate::{
        db::DbError,
        paging::cache::CacheRegistry,
        storage::tuple::Tuple,
        vm::plan::{tests::values, Plan},
    };

    fn in_memory(tuples: Vec<Tuple>, keys: Vec<usize>) -> Result<Plan<File>, DbError> {
        Ok(Plan::InMemorySort(InMemorySort::new(
            Box::new(values(tuples)?),
            TuplesComparator::new(keys),
        )))
    }

    fn external(
        tuples: Vec<Tuple>,
        keys: Vec<usize>,
        buffer_pages: usize,
        page_size: usize,
        registry: &CacheRegistry,
    ) -> Result<Plan<File>, DbError> {
        Ok(Plan::ExternalSort(ExternalSort::new(
            Box::new(values(tuples)?),
            TuplesComparator::new(keys),
            buffer_pages,
            page_size,
            registry.clone(),
        )))
    }

    fn random_tuples(n: usize, seed: u64) -> Vec<Tuple> {
        let mut rng = StdRng::seed_from_u64(seed);

        (0..n)
            .map(|_| (0..3).map(|_| rng.gen_range(0..1000)).collect())
            .collect()
    }

    fn collect(plan: Result<Plan<File>, DbError>) -> Result<Vec<Tuple>, DbError> {
        plan?.collect()
    }

    #[test]
    fn comparators() {
        let cmp = TuplesComparator::new(vec![1, 0]);
        assert_eq!(cmp.cmp(&[1, 5], &[0, 5]), Ordering::Greater);
        assert_eq!(cmp.cmp(&[1, 4], &[0, 5]), Ordering::Less);
        assert_eq!(cmp.cmp(&[1, 5, 9], &[1, 5, 0]), Ordering::Equal);

        let cmp = JoinComparator::new(vec![2], vec![0]);
        assert_eq!(cmp.cmp(&[0, 0, 7], &[7, 1]), Ordering::Equal);
        assert_eq!(cmp.cmp(&[0, 0, 6], &[7, 1]), Ordering::Less);
    }

    #[test]
    fn in_memory_sort_is_stable() -> Result<(), DbError> {
        let sorted = collect(in_memory(
            vec![vec![2, 1], vec![1, 2], vec![2, 3], vec![1, 4]],
            vec![0],
        ))?;

        assert_eq!(sorted, vec![vec![1, 2], vec![1, 4], vec![2, 1], vec![2, 3]]);

        Ok(())
    }

    #[test]
    fn external_sort_matches_in_memory_sort() -> Result<(), DbError> {
        let root = tempfile::tempdir()?;
        let registry = CacheRegistry::new(root.path());
        let tuples = random_tuples(10_000, 4321);

        let expected = collect(in_memory(tuples.clone(), vec![0, 1, 2]))?;
        let actual = collect(external(tuples, vec![0, 1, 2], 3, 4096, &registry))?;

        assert_eq!(actual.len(), 10_000);
        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn external_sort_many_passes_partial_keys() -> Result<(), DbError> {
        let root = tempfile::tempdir()?;
        let registry = CacheRegistry::new(root.path());
        let tuples = random_tuples(2_000, 99);

        // Tiny pages force hundreds of runs and several merge passes.
        let expected = collect(in_memory(tuples.clone(), vec![2]))?;

        for buffer_pages in [3, 4, 7] {
            let actual = collect(external(tuples.clone(), vec![2], buffer_pages, 64, &registry))?;
            assert_eq!(actual, expected, "buffer pages {buffer_pages}");
        }

        Ok(())
    }

    #[test]
    fn external_sort_reset_and_cleanup() -> Result<(), DbError> {
        let root = tempfile::tempdir()?;
        let registry = CacheRegistry::new(root.path());

        let mut plan = external(random_tuples(100, 1), vec![0], 3, 64, &registry)?;

        let first: Vec<Tuple> = plan.by_ref().take(10).collect::<Result<_, _>>()?;
        plan.reset()?;
        let all: Vec<Tuple> = plan.by_ref().collect::<Result<_, _>>()?;

        assert_eq!(all.len(), 100);
        assert_eq!(first, all[..10]);

        // Only the final run is left on disk.
        let Plan::ExternalSort(sort) = &plan else {
            unreachable!();
        };
        assert_eq!(sort.dir.as_ref().map(|dir| dir.file_count()).transpose()?, Some(1));

        registry.cleanup()?;
        assert_eq!(registry.outstanding(), 0);

        Ok(())
    }

    #[test]
    fn external_sort_empty_input() -> Result<(), DbError> {
        let root = tempfile::tempdir()?;
        let registry = CacheRegistry::new(root.path());

        assert!(collect(external(vec![], vec![0], 3, 4096, &registry))?.is_empty());

        Ok(())
    }
}
