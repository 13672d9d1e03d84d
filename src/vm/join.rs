//! Join operators.
//!
//! Every join outputs the left tuple followed by the right tuple, so the
//! output schema is always the left schema joined with the right schema.
//! Conditions are evaluated with [`Predicate::eval_joined`] to avoid building
//! combined tuples that end up being discarded.

use std::cmp::Ordering;

use super::{expression::Predicate, plan::Plan, sort::JoinComparator};
use crate::{
    db::{DbError, Schema},
    paging::io::FileOps,
    storage::tuple::{self, Tuple},
};

/// For each left tuple, scans the entire right side.
///
/// Without a condition this is the cartesian product.
pub struct TupleNestedLoopJoin<F> {
    pub left: Box<Plan<F>>,
    pub right: Box<Plan<F>>,
    pub condition: Option<Predicate>,
    pub schema: Schema,
    /// Left tuple being matched against the right side.
    pub current: Option<Tuple>,
}

impl<F: FileOps> TupleNestedLoopJoin<F> {
    pub fn new(
        left: Box<Plan<F>>,
        right: Box<Plan<F>>,
        condition: Option<Predicate>,
        schema: Schema,
    ) -> Self {
        Self {
            left,
            right,
            condition,
            schema,
            current: None,
        }
    }

    pub(super) fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        loop {
            if self.current.is_none() {
                match self.left.try_next()? {
                    Some(tuple) => self.current = Some(tuple),
                    None => return Ok(None),
                }
            }

            let Some(left) = &self.current else {
                continue;
            };

            match self.right.try_next()? {
                Some(right) => {
                    if matches(&self.condition, left, &right) {
                        return Ok(Some(tuple::concat(left, &right)));
                    }
                }

                None => {
                    self.right.reset()?;
                    self.current = None;
                }
            }
        }
    }

    pub(super) fn reset(&mut self) -> Result<(), DbError> {
        self.left.reset()?;
        self.right.reset()?;
        self.current = None;

        Ok(())
    }
}

/// Loads blocks of left tuples in memory and scans the right side once per
/// block instead of once per tuple.
///
/// For each block, every right tuple is matched against every tuple in the
/// block before moving on to the next right tuple. So output order is block
/// major, then right tuple, then left tuple within the block.
pub struct BlockNestedLoopJoin<F> {
    pub left: Box<Plan<F>>,
    pub right: Box<Plan<F>>,
    pub condition: Option<Predicate>,
    pub schema: Schema,
    /// Maximum number of left tuples per block. The planner sizes it from
    /// the buffer pages and the width of the left child, since the block
    /// only ever holds left tuples.
    pub block_size: usize,
    pub block: Vec<Tuple>,
    /// Right tuple being matched against the block.
    pub current: Option<Tuple>,
    /// Next block tuple to match against [`Self::current`].
    pub position: usize,
}

impl<F: FileOps> BlockNestedLoopJoin<F> {
    pub fn new(
        left: Box<Plan<F>>,
        right: Box<Plan<F>>,
        condition: Option<Predicate>,
        schema: Schema,
        block_size: usize,
    ) -> Self {
        Self {
            left,
            right,
            condition,
            schema,
            block_size: block_size.max(1),
            block: Vec::new(),
            current: None,
            position: 0,
        }
    }

    pub(super) fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        loop {
            if self.block.is_empty() && !self.load_block()? {
                return Ok(None);
            }

            if self.current.is_none() {
                match self.right.try_next()? {
                    Some(tuple) => {
                        self.current = Some(tuple);
                        self.position = 0;
                    }

                    // Block done, rewind the right side for the next one.
                    None => {
                        self.right.reset()?;
                        self.block.clear();
                        continue;
                    }
                }
            }

            let Some(right) = &self.current else {
                continue;
            };

            while let Some(left) = self.block.get(self.position) {
                self.position += 1;

                if matches(&self.condition, left, right) {
                    return Ok(Some(tuple::concat(left, right)));
                }
            }

            self.current = None;
        }
    }

    /// Fills the block with up to [`Self::block_size`] left tuples. Returns
    /// `false` if the left side is exhausted.
    fn load_block(&mut self) -> Result<bool, DbError> {
        while self.block.len() < self.block_size {
            match self.left.try_next()? {
                Some(tuple) => self.block.push(tuple),
                None => break,
            }
        }

        Ok(!self.block.is_empty())
    }

    pub(super) fn reset(&mut self) -> Result<(), DbError> {
        self.left.reset()?;
        self.right.reset()?;
        self.block.clear();
        self.current = None;
        self.position = 0;

        Ok(())
    }
}

/// Joins two inputs sorted by their join keys.
///
/// Keeps one cursor on each side and advances whichever has the smaller key.
/// When keys are equal the position of the right cursor is marked and every
/// right tuple with that key is emitted for the current left tuple. If the
/// next left tuple has the same key, the right side is replayed from the
/// mark. Replaying means resetting the right child and skipping tuples until
/// the mark, which is linear but only requires [`Plan::reset`] from the
/// child.
pub struct SortMergeJoin<F> {
    pub left: Box<Plan<F>>,
    pub right: Box<Plan<F>>,
    pub comparator: JoinComparator,
    pub schema: Schema,
    pub left_tuple: Option<Tuple>,
    pub right_tuple: Option<Tuple>,
    /// Position of [`Self::right_tuple`] in the right input.
    pub right_position: usize,
    /// First right tuple of the current group of equal keys and its
    /// position.
    pub mark: Option<(usize, Tuple)>,
    pub started: bool,
}

impl<F: FileOps> SortMergeJoin<F> {
    pub fn new(
        left: Box<Plan<F>>,
        right: Box<Plan<F>>,
        comparator: JoinComparator,
        schema: Schema,
    ) -> Self {
        Self {
            left,
            right,
            comparator,
            schema,
            left_tuple: None,
            right_tuple: None,
            right_position: 0,
            mark: None,
            started: false,
        }
    }

    pub(super) fn try_next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.started {
            self.left_tuple = self.left.try_next()?;
            self.right_tuple = self.right.try_next()?;
            self.right_position = 0;
            self.started = true;
        }

        loop {
            let Some(left) = &self.left_tuple else {
                return Ok(None);
            };

            if let Some((mark, first)) = &self.mark {
                // Inside a group of equal keys.
                if let Some(right) = &self.right_tuple {
                    if self.comparator.cmp(left, right) == Ordering::Equal {
                        let output = tuple::concat(left, right);
                        self.advance_right()?;
                        return Ok(Some(output));
                    }
                }

                // Right side of the group exhausted for this left tuple.
                let mark = *mark;
                let same_key = {
                    self.left_tuple = self.left.try_next()?;
                    match &self.left_tuple {
                        Some(next) => self.comparator.cmp(next, first) == Ordering::Equal,
                        None => false,
                    }
                };

                if same_key {
                    self.rewind_right(mark)?;
                } else {
                    self.mark = None;
                }

                continue;
            }

            let Some(right) = &self.right_tuple else {
                return Ok(None);
            };

            match self.comparator.cmp(left, right) {
                Ordering::Less => self.left_tuple = self.left.try_next()?,
                Ordering::Greater => self.advance_right()?,
                Ordering::Equal => self.mark = Some((self.right_position, right.clone())),
            }
        }
    }

    fn advance_right(&mut self) -> Result<(), DbError> {
        self.right_tuple = self.right.try_next()?;
        self.right_position += 1;
        Ok(())
    }

    /// Positions the right cursor at `mark` again.
    fn rewind_right(&mut self, mark: usize) -> Result<(), DbError> {
        self.right.reset()?;

        for _ in 0..mark {
            if self.right.try_next()?.is_none() {
                break;
            }
        }

        self.right_tuple = self.right.try_next()?;
        self.right_position = mark;

        Ok(())
    }

    pub(super) fn reset(&mut self) -> Result<(), DbError> {
        self.left.reset()?;
        self.right.reset()?;
        self.left_tuple = None;
        self.right_tuple = None;
        self.right_position = 0;
        self.mark = None;
        self.started = false;

        Ok(())
    }
}

fn matches(condition: &Option<Predicate>, left: &[i32], right: &[i32]) -> bool {
    condition
        .as_ref()
        .map_or(true, |predicate| predicate.eval_joined(left, right))
}
