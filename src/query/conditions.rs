//! WHERE clause analysis shared by the planner and the optimizer.
//!
//! Everything here works on the top level conjuncts of a condition. Given
//! this WHERE clause:
//!
//! ```sql
//! WHERE S.id = R.sid AND S.age > 30 AND 1 < 2 AND R.bid >= S.rating
//! ```
//!
//! The conjuncts are `S.id = R.sid`, `S.age > 30`, `1 < 2` and
//! `R.bid >= S.rating`. Each one is looked at in isolation.

use crate::{
    db::{Schema, SqlError},
    sql::statement::{BinaryOperator, ColumnRef, Expression, TableRef},
    vm::expression::{columns_of, conjuncts, eval_where, Predicate},
};

/// Where each conjunct of a WHERE clause should be evaluated.
#[derive(Debug, PartialEq, Default)]
pub struct ClassifiedConditions {
    /// Conditions that only involve table `i` (in FROM order), evaluated
    /// right above its scan.
    pub filters: Vec<Vec<Expression>>,
    /// Conditions between table `i` and any table before it, evaluated by
    /// the join that brings table `i` in.
    pub joins: Vec<Vec<Expression>>,
    /// Some conjunct without columns evaluated to false.
    pub always_false: bool,
}

impl ClassifiedConditions {
    /// No conditions at all for `tables` tables.
    pub fn unconditional(tables: usize) -> Self {
        Self {
            filters: vec![Vec::new(); tables],
            joins: vec![Vec::new(); tables],
            always_false: false,
        }
    }

    /// Conjunction of the filters of table `i`.
    pub fn filter(&self, i: usize) -> Option<Expression> {
        Expression::conjunction(self.filters[i].iter().cloned())
    }

    /// Conjunction of the join conditions of table `i`.
    pub fn join_condition(&self, i: usize) -> Option<Expression> {
        Expression::conjunction(self.joins[i].iter().cloned())
    }
}

/// Splits `condition` into per table filters and join conditions.
///
/// - Conjuncts without columns are evaluated right here.
/// - Conjuncts that reference one table become filters of that table.
/// - Conjuncts that reference two tables become join conditions of the one
///   that comes later in the FROM clause, since that's the first join where
///   both tables are available.
/// - Conjuncts that reference a table which is not in the FROM clause are
///   attached to the last table. The missing column never has a value there,
///   so the conjunct is simply false.
///
/// Every conjunct is validated first, so invalid operands or operators are
/// reported even if the conjunct would be discarded.
pub fn classify(
    condition: &Expression,
    tables: &[TableRef],
) -> Result<ClassifiedConditions, SqlError> {
    let mut classified = ClassifiedConditions::unconditional(tables.len());

    let last = tables.len().saturating_sub(1);

    for conjunct in conjuncts(condition) {
        validate(conjunct)?;

        let columns = columns_of(conjunct);

        if columns.is_empty() {
            if !eval_where(&Schema::empty(), &[], conjunct)? {
                classified.always_false = true;
            }
            continue;
        }

        let positions: Option<Vec<usize>> = columns
            .iter()
            .map(|col| tables.iter().position(|table| table.qualifier() == col.table))
            .collect();

        let Some(positions) = positions else {
            classified.filters[last].push(conjunct.clone());
            continue;
        };

        let first = positions.iter().min().copied().unwrap_or(last);
        let later = positions.iter().max().copied().unwrap_or(last);

        if first == later {
            classified.filters[later].push(conjunct.clone());
        } else {
            classified.joins[later].push(conjunct.clone());
        }
    }

    Ok(classified)
}

/// Checks that `expr` is a conjunction of supported comparisons.
pub fn validate(expr: &Expression) -> Result<(), SqlError> {
    Predicate::new(expr, &Schema::empty()).map(|_| ())
}

/// Inclusive key range usable by an index scan.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct IndexBounds {
    pub low: Option<i32>,
    pub high: Option<i32>,
}

impl IndexBounds {
    pub fn is_unbounded(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }

    fn restrict_low(&mut self, key: i32) {
        self.low = Some(self.low.map_or(key, |low| low.max(key)));
    }

    fn restrict_high(&mut self, key: i32) {
        self.high = Some(self.high.map_or(key, |high| high.min(key)));
    }
}

/// Pulls out of `condition` the conjuncts that an index on `column` can
/// answer and returns them as bounds, plus whatever is left.
///
/// Only `>`, `>=`, `<` and `<=` between `column` and a literal count. Strict
/// comparisons are turned into inclusive ones (`a > 5` is `a >= 6`) unless
/// that would overflow, in which case the conjunct stays in the remainder.
/// Equality is not used as a bound.
pub fn extract_index_bounds(
    condition: &Expression,
    column: &ColumnRef,
) -> (IndexBounds, Option<Expression>) {
    let mut bounds = IndexBounds::default();
    let mut remainder = Vec::new();

    for conjunct in conjuncts(condition) {
        let bound = match conjunct {
            Expression::BinaryOperation {
                left,
                operator,
                right,
            } => match (&**left, &**right) {
                (Expression::Identifier(col), Expression::Value(value)) if col == column => {
                    Some((*operator, *value))
                }
                (Expression::Value(value), Expression::Identifier(col)) if col == column => {
                    Some((operator.flip(), *value))
                }
                _ => None,
            },
            _ => None,
        };

        let applied = match bound {
            Some((BinaryOperator::GtEq, key)) => {
                bounds.restrict_low(key);
                true
            }
            Some((BinaryOperator::Gt, key)) => key
                .checked_add(1)
                .map(|key| bounds.restrict_low(key))
                .is_some(),
            Some((BinaryOperator::LtEq, key)) => {
                bounds.restrict_high(key);
                true
            }
            Some((BinaryOperator::Lt, key)) => key
                .checked_sub(1)
                .map(|key| bounds.restrict_high(key))
                .is_some(),
            _ => false,
        };

        if !applied {
            remainder.push(conjunct.clone());
        }
    }

    (bounds, Expression::conjunction(remainder))
}

/// Column pairs of an equi-join, left side columns first.
pub type JoinKeys = (Vec<ColumnRef>, Vec<ColumnRef>);

/// Extracts sort merge join keys from `condition`. Every conjunct must be an
/// equality between a column of `left` and a column of `right`, in any
/// order. Returns [`None`] otherwise.
pub fn extract_join_keys(condition: &Expression, left: &Schema, right: &Schema) -> Option<JoinKeys> {
    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();

    for conjunct in conjuncts(condition) {
        let Expression::BinaryOperation {
            left: a,
            operator: BinaryOperator::Eq,
            right: b,
        } = conjunct
        else {
            return None;
        };

        let (Expression::Identifier(a), Expression::Identifier(b)) = (&**a, &**b) else {
            return None;
        };

        if left.contains(a) && right.contains(b) {
            left_keys.push(a.clone());
            right_keys.push(b.clone());
        } else if left.contains(b) && right.contains(a) {
            left_keys.push(b.clone());
            right_keys.push(a.clone());
        } else {
            return None;
        }
    }

    (!left_keys.is_empty()).then_some((left_keys, right_keys))
}
