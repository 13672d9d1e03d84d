//! Parsed query representation.
//!
//! Turning SQL text into these structures is somebody else's job. The engine
//! only consumes what's defined here: a [`SelectStatement`] with its FROM list,
//! WHERE [`Expression`] tree, select items, ORDER BY columns and DISTINCT flag.

use std::fmt::{self, Display};

/// Table in the FROM clause, optionally aliased.
///
/// ```sql
/// SELECT * FROM Sailors S, Reserves;
/// ```
///
/// produces `TableRef { name: "Sailors", alias: Some("S") }` and
/// `TableRef { name: "Reserves", alias: None }`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: &str, alias: &str) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// Name that columns of this table are qualified with. The alias wins if
    /// there is one.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Column reference such as `S.A`.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ColumnRef {
    /// Table name or alias.
    pub table: String,
    /// Attribute name.
    pub name: String,
}

impl ColumnRef {
    pub fn new(table: &str, name: &str) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Fully qualified name, used as the column identity everywhere.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }
}

/// Parsed `SELECT` statement.
#[derive(Debug, PartialEq, Clone)]
pub struct SelectStatement {
    /// Select items. Either a single [`Expression::Wildcard`] or a list of
    /// [`Expression::Identifier`].
    pub columns: Vec<Expression>,
    /// First table in the FROM clause.
    pub from: TableRef,
    /// Every other table in FROM/JOIN clauses, in order.
    pub joins: Vec<TableRef>,
    pub r#where: Option<Expression>,
    pub order_by: Vec<ColumnRef>,
    pub distinct: bool,
}

impl SelectStatement {
    /// `SELECT * FROM table`. Use the struct fields to customize the rest.
    pub fn all_from(table: TableRef) -> Self {
        Self {
            columns: vec![Expression::Wildcard],
            from: table,
            joins: Vec::new(),
            r#where: None,
            order_by: Vec::new(),
            distinct: false,
        }
    }

    /// All tables in FROM order.
    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        std::iter::once(&self.from).chain(self.joins.iter())
    }

    /// `true` if the select list is `*`.
    pub fn selects_all(&self) -> bool {
        self.columns.is_empty() || self.columns.iter().any(|c| *c == Expression::Wildcard)
    }
}

/// Expressions that can appear in WHERE clauses and select lists.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Expression {
    Identifier(ColumnRef),

    Value(i32),

    Wildcard,

    BinaryOperation {
        left: Box<Self>,
        operator: BinaryOperator,
        right: Box<Self>,
    },
}

impl Expression {
    /// Shortcut for building comparison trees, mostly useful in tests.
    pub fn binary(left: Self, operator: BinaryOperator, right: Self) -> Self {
        Self::BinaryOperation {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub fn column(table: &str, name: &str) -> Self {
        Self::Identifier(ColumnRef::new(table, name))
    }

    /// Joins all the given expressions with `AND`. Returns [`None`] if there's
    /// nothing to join.
    pub fn conjunction(exprs: impl IntoIterator<Item = Self>) -> Option<Self> {
        exprs
            .into_iter()
            .reduce(|left, right| Self::binary(left, BinaryOperator::And, right))
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOperator {
    Eq,
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Mul,
    Div,
    And,
    Or,
}

impl BinaryOperator {
    /// `true` for `=`, `!=`, `<`, `<=`, `>` and `>=`.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Neq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }

    /// Operator obtained by swapping the operands. `5 < x` is `x > 5`.
    pub fn flip(&self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
            other => *other,
        }
    }
}

fn join<T: ToString>(values: &[T], separator: &str) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

impl Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} {alias}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

impl Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        })
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(column) => write!(f, "{column}"),
            Expression::Value(value) => write!(f, "{value}"),
            Expression::Wildcard => f.write_str("*"),
            Expression::BinaryOperation {
                left,
                operator,
                right,
            } => write!(f, "{left} {operator} {right}"),
        }
    }
}

impl Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }

        write!(f, "{} FROM {}", join(&self.columns, ", "), self.from)?;

        for table in &self.joins {
            write!(f, ", {table}")?;
        }

        if let Some(expr) = &self.r#where {
            write!(f, " WHERE {expr}")?;
        }

        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", join(&self.order_by, ", "))?;
        }

        f.write_str(";")
    }
}
