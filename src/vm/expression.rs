//! Code that evaluates WHERE and join conditions.
//!
//! Conditions are conjunctions of comparisons where each side is either a
//! column or an integer literal. Instead of mapping every tuple into some
//! `name -> value` context, the columns of a [`Predicate`] are resolved once
//! against the schema of the operator that owns it and each pulled tuple is
//! then evaluated by position, borrowing the tuple as a slice. Nothing is
//! allocated per tuple and nothing is retained between calls.

use std::fmt::Display;

use crate::{
    db::{Schema, SqlError},
    sql::statement::{BinaryOperator, ColumnRef, Expression},
};

/// One side of a [`Comparison`].
#[derive(Debug, PartialEq, Clone, Copy)]
enum Operand {
    /// Position in the tuple. [`None`] if the column doesn't exist in the
    /// schema, which makes the comparison false.
    Column(Option<usize>),
    Literal(i32),
}

#[derive(Debug, PartialEq, Clone, Copy)]
struct Comparison {
    left: Operand,
    operator: BinaryOperator,
    right: Operand,
}

/// Compiled condition bound to a specific [`Schema`].
#[derive(Debug, PartialEq, Clone)]
pub struct Predicate {
    expr: Expression,
    comparisons: Vec<Comparison>,
}

impl Predicate {
    /// Validates `expr` and resolves its columns against `schema`.
    ///
    /// Columns that are not in the schema are not an error, they just never
    /// satisfy the comparison they're in. Operands that are not columns or
    /// literals and operators other than `AND` and comparisons are errors.
    pub fn new(expr: &Expression, schema: &Schema) -> Result<Self, SqlError> {
        let mut comparisons = Vec::new();

        for conjunct in conjuncts(expr) {
            let Expression::BinaryOperation {
                left,
                operator,
                right,
            } = conjunct
            else {
                return Err(SqlError::InvalidOperand(conjunct.to_string()));
            };

            if !operator.is_comparison() {
                return Err(SqlError::UnsupportedOperator(operator.to_string()));
            }

            comparisons.push(Comparison {
                left: resolve_operand(left, schema)?,
                operator: *operator,
                right: resolve_operand(right, schema)?,
            });
        }

        Ok(Self {
            expr: expr.clone(),
            comparisons,
        })
    }

    /// Evaluates the predicate against one tuple of the bound schema.
    pub fn eval(&self, tuple: &[i32]) -> bool {
        self.eval_by(|i| tuple.get(i).copied())
    }

    /// Evaluates the predicate against the concatenation of `left` and
    /// `right` without building the concatenated tuple. The predicate must
    /// be bound to the joined schema.
    pub fn eval_joined(&self, left: &[i32], right: &[i32]) -> bool {
        self.eval_by(|i| match i.checked_sub(left.len()) {
            None => left.get(i).copied(),
            Some(j) => right.get(j).copied(),
        })
    }

    fn eval_by(&self, value_at: impl Fn(usize) -> Option<i32>) -> bool {
        let value = |operand: Operand| match operand {
            Operand::Column(Some(i)) => value_at(i),
            Operand::Column(None) => None,
            Operand::Literal(value) => Some(value),
        };

        self.comparisons.iter().all(|comparison| {
            match (value(comparison.left), value(comparison.right)) {
                (Some(left), Some(right)) => compare(left, comparison.operator, right),
                _ => false,
            }
        })
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)
    }
}

fn resolve_operand(expr: &Expression, schema: &Schema) -> Result<Operand, SqlError> {
    match expr {
        Expression::Identifier(col) => Ok(Operand::Column(schema.index_of(col))),
        Expression::Value(value) => Ok(Operand::Literal(*value)),
        other => Err(SqlError::InvalidOperand(other.to_string())),
    }
}

fn compare(left: i32, operator: BinaryOperator, right: i32) -> bool {
    match operator {
        BinaryOperator::Eq => left == right,
        BinaryOperator::Neq => left != right,
        BinaryOperator::Lt => left < right,
        BinaryOperator::LtEq => left <= right,
        BinaryOperator::Gt => left > right,
        BinaryOperator::GtEq => left >= right,
        _ => false,
    }
}

/// Splits a tree of `AND` operations into its top level conjuncts, left to
/// right.
pub(crate) fn conjuncts(expr: &Expression) -> Vec<&Expression> {
    let mut conjuncts = Vec::new();
    let mut stack = vec![expr];

    while let Some(expr) = stack.pop() {
        match expr {
            Expression::BinaryOperation {
                left,
                operator: BinaryOperator::And,
                right,
            } => {
                stack.push(right);
                stack.push(left);
            }
            other => conjuncts.push(other),
        }
    }

    conjuncts
}

/// Every column referenced in `expr`, in order of appearance.
pub(crate) fn columns_of(expr: &Expression) -> Vec<&ColumnRef> {
    match expr {
        Expression::Identifier(col) => vec![col],
        Expression::BinaryOperation { left, right, .. } => {
            let mut columns = columns_of(left);
            columns.extend(columns_of(right));
            columns
        }
        Expression::Value(_) | Expression::Wildcard => vec![],
    }
}

/// One shot evaluation of `expr` against `tuple`. Operators compile their
/// predicates once with [`Predicate::new`] instead.
pub(crate) fn eval_where(schema: &Schema, tuple: &[i32], expr: &Expression) -> Result<bool, SqlError> {
    Ok(Predicate::new(expr, schema)?.eval(tuple))
}

#[cfg(test)]
mod tests {
    use super::{columns_of, conjuncts, eval_where, Predicate};
    use crate::{
        db::{Schema, SqlError},
        sql::statement::{BinaryOperator, ColumnRef, Expression},
    };

    fn schema() -> Schema {
        Schema::for_table("R", &["a", "b"])
    }

    fn col(name: &str) -> Expression {
        Expression::column("R", name)
    }

    fn cmp(left: Expression, operator: BinaryOperator, right: Expression) -> Expression {
        Expression::binary(left, operator, right)
    }

    #[test]
    fn comparisons() -> Result<(), SqlError> {
        let cases = [
            (BinaryOperator::Eq, [false, true, false]),
            (BinaryOperator::Neq, [true, false, true]),
            (BinaryOperator::Lt, [true, false, false]),
            (BinaryOperator::LtEq, [true, true, false]),
            (BinaryOperator::Gt, [false, false, true]),
            (BinaryOperator::GtEq, [false, true, true]),
        ];

        for (operator, expected) in cases {
            let expr = cmp(col("a"), operator, Expression::Value(20));

            for (a, expected) in [10, 20, 30].into_iter().zip(expected) {
                assert_eq!(eval_where(&schema(), &[a, 0], &expr)?, expected, "{a} {operator} 20");
            }
        }

        Ok(())
    }

    #[test]
    fn column_to_column_and_conjunction() -> Result<(), SqlError> {
        let expr = cmp(
            cmp(col("a"), BinaryOperator::Lt, col("b")),
            BinaryOperator::And,
            cmp(Expression::Value(5), BinaryOperator::LtEq, col("a")),
        );

        let predicate = Predicate::new(&expr, &schema())?;

        assert!(predicate.eval(&[5, 6]));
        assert!(!predicate.eval(&[4, 6]));
        assert!(!predicate.eval(&[7, 6]));

        Ok(())
    }

    #[test]
    fn missing_column_is_false() -> Result<(), SqlError> {
        let expr = cmp(Expression::column("S", "x"), BinaryOperator::Eq, col("a"));
        assert!(!eval_where(&schema(), &[1, 1], &expr)?);

        let expr = cmp(Expression::column("S", "x"), BinaryOperator::Neq, col("a"));
        assert!(!eval_where(&schema(), &[1, 1], &expr)?);

        Ok(())
    }

    #[test]
    fn eval_joined_splits_positions() -> Result<(), SqlError> {
        let joined = schema().join(&Schema::for_table("S", &["c"]))?;
        let expr = cmp(col("b"), BinaryOperator::Eq, Expression::column("S", "c"));
        let predicate = Predicate::new(&expr, &joined)?;

        assert!(predicate.eval_joined(&[1, 7], &[7]));
        assert!(!predicate.eval_joined(&[1, 7], &[8]));
        assert_eq!(predicate.eval(&[1, 7, 7]), predicate.eval_joined(&[1, 7], &[7]));

        Ok(())
    }

    #[test]
    fn invalid_operands_and_operators() {
        let arithmetic = cmp(
            cmp(col("a"), BinaryOperator::Plus, Expression::Value(1)),
            BinaryOperator::Gt,
            Expression::Value(3),
        );

        assert!(matches!(
            Predicate::new(&arithmetic, &schema()),
            Err(SqlError::InvalidOperand(_))
        ));

        let or = cmp(
            cmp(col("a"), BinaryOperator::Eq, Expression::Value(1)),
            BinaryOperator::Or,
            cmp(col("b"), BinaryOperator::Eq, Expression::Value(1)),
        );

        assert_eq!(
            Predicate::new(&or, &schema()),
            Err(SqlError::UnsupportedOperator("OR".into()))
        );

        assert!(matches!(
            Predicate::new(&col("a"), &schema()),
            Err(SqlError::InvalidOperand(_))
        ));
    }

    #[test]
    fn flatten_conjuncts_in_order() {
        let a = cmp(col("a"), BinaryOperator::Eq, Expression::Value(1));
        let b = cmp(col("b"), BinaryOperator::Eq, Expression::Value(2));
        let c = cmp(col("a"), BinaryOperator::Lt, col("b"));

        let expr = cmp(
            a.clone(),
            BinaryOperator::And,
            cmp(b.clone(), BinaryOperator::And, c.clone()),
        );

        assert_eq!(conjuncts(&expr), vec![&a, &b, &c]);
        assert_eq!(
            columns_of(&expr),
            vec![
                &ColumnRef::new("R", "a"),
                &ColumnRef::new("R", "b"),
                &ColumnRef::new("R", "a"),
                &ColumnRef::new("R", "b"),
            ]
        );
    }
}
