//! This is where everything comes together.
//!
//! Errors, schemas and the [`Catalog`] live here because every other module
//! needs them. The [`Database`] struct owns the catalog, the plan config and
//! the cache registry and delegates the actual work to [`crate::query`] and
//! [`crate::vm`].

use std::{
    collections::HashMap,
    fmt::Display,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{
    config::{ConfigError, IndexDefinition, PlanConfig, PLAN_CONFIG_FILE},
    paging::{cache::CacheRegistry, io::FileOps, TupleSink},
    query::{build_logical, LogicalPlan, PhysicalPlanBuilder},
    sql::statement::{ColumnRef, SelectStatement},
    storage::{index::build_index, tuple::Tuple},
    vm::plan::{collect, Plan},
};

/// Name of the catalog file inside a database directory.
pub(crate) const SCHEMA_FILE: &str = "schema.txt";

/// Name of the index config file inside a database directory.
pub(crate) const INDEX_INFO_FILE: &str = "index_info.txt";

/// Directory that stores relation files.
pub(crate) const DATA_DIR: &str = "data";

/// Directory that stores index files.
pub(crate) const INDEXES_DIR: &str = "indexes";

/// Errors somehow related to the query itself.
#[derive(Debug, PartialEq)]
pub enum SqlError {
    /// Relation not found in the catalog.
    InvalidTable(String),
    /// Column not found or not usable in the context of the error.
    InvalidColumn(String),
    /// Two columns with the same qualified name in one schema.
    DuplicateColumn(String),
    /// Comparison operand that is neither a column nor a literal.
    InvalidOperand(String),
    /// Operator that the engine doesn't evaluate, like `OR`.
    UnsupportedOperator(String),
}

impl Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTable(name) => write!(f, "invalid table '{name}'"),
            Self::InvalidColumn(name) => write!(f, "invalid column '{name}'"),
            Self::DuplicateColumn(name) => write!(f, "duplicate column '{name}'"),
            Self::InvalidOperand(expr) => {
                write!(f, "comparison operand must be a column or a literal: {expr}")
            }
            Self::UnsupportedOperator(operator) => write!(f, "unsupported operator '{operator}'"),
        }
    }
}

/// Generic top level error.
#[derive(Debug)]
pub enum DbError {
    /// Files.
    Io(io::Error),
    /// Query could not be planned.
    Sql(SqlError),
    /// Config files or parameters are wrong.
    Config(ConfigError),
    /// Something in a relation or index file is corrupted/unexpected.
    Corrupted(String),
    /// Uncategorized custom error.
    Other(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Sql(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::Corrupted(message) => write!(f, "corrupted data: {message}"),
            Self::Other(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<SqlError> for DbError {
    fn from(e: SqlError) -> Self {
        Self::Sql(e)
    }
}

impl From<ConfigError> for DbError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Output description of a relation or operator.
///
/// Columns are identified by their qualified name (`Table.attribute` where
/// `Table` is the alias if there is one), so two columns with the same name
/// can coexist as long as they come from different tables.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Schema {
    /// Column definitions.
    pub columns: Vec<ColumnRef>,
    /// Quick index to find columns based on their qualified name.
    index: HashMap<String, usize>,
}

impl Schema {
    /// Creates a new schema with the given columns.
    ///
    /// Duplicated names are not rejected here, the first one wins when
    /// looking up. Use [`Self::try_new`] when column resolution must be
    /// unambiguous.
    pub fn new(columns: Vec<ColumnRef>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());

        for (i, col) in columns.iter().enumerate() {
            index.entry(col.qualified_name()).or_insert(i);
        }

        Self { columns, index }
    }

    /// Same as [`Self::new`] but fails if two columns share a qualified name.
    pub fn try_new(columns: Vec<ColumnRef>) -> Result<Self, SqlError> {
        let schema = Self::new(columns);

        if schema.index.len() != schema.columns.len() {
            let duplicate = schema
                .columns
                .iter()
                .enumerate()
                .find(|(i, col)| schema.index[&col.qualified_name()] != *i)
                .map(|(_, col)| col.qualified_name())
                .unwrap_or_default();

            return Err(SqlError::DuplicateColumn(duplicate));
        }

        Ok(schema)
    }

    /// Creates an empty schema with no columns.
    pub fn empty() -> Self {
        Self::new(vec![])
    }

    /// Schema of relation attributes qualified with `table`.
    pub fn for_table<S: AsRef<str>>(table: &str, attributes: &[S]) -> Self {
        Self::new(
            attributes
                .iter()
                .map(|attr| ColumnRef::new(table, attr.as_ref()))
                .collect(),
        )
    }

    /// Returns the position of `col` in [`Self::columns`].
    pub fn index_of(&self, col: &ColumnRef) -> Option<usize> {
        self.index_of_name(&col.qualified_name())
    }

    /// Same as [`Self::index_of`] with an already qualified name.
    pub fn index_of_name(&self, qualified_name: &str) -> Option<usize> {
        self.index.get(qualified_name).copied()
    }

    /// Resolves every column or fails on the first one that doesn't exist.
    pub fn indexes_of<'c>(
        &self,
        cols: impl IntoIterator<Item = &'c ColumnRef>,
    ) -> Result<Vec<usize>, SqlError> {
        cols.into_iter()
            .map(|col| {
                self.index_of(col)
                    .ok_or_else(|| SqlError::InvalidColumn(col.qualified_name()))
            })
            .collect()
    }

    pub fn contains(&self, col: &ColumnRef) -> bool {
        self.index_of(col).is_some()
    }

    /// Number of columns in this schema.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Schema of `self` followed by `other`, which is what joins output.
    pub fn join(&self, other: &Schema) -> Result<Schema, SqlError> {
        Schema::try_new(self.columns.iter().chain(&other.columns).cloned().collect())
    }

    /// Picks the given columns in order.
    pub fn project(&self, cols: &[ColumnRef]) -> Result<Schema, SqlError> {
        self.indexes_of(cols)?;
        Schema::try_new(cols.to_vec())
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self
            .columns
            .iter()
            .map(ColumnRef::qualified_name)
            .collect::<Vec<_>>()
            .join(", ");

        write!(f, "[{names}]")
    }
}

/// Everything the engine knows about a relation.
#[derive(Debug, PartialEq, Clone)]
pub struct RelationMetadata {
    pub name: String,
    /// Attribute names in storage order.
    pub attributes: Vec<String>,
    /// Binary page file that stores the tuples.
    pub path: PathBuf,
}

impl RelationMetadata {
    /// Schema of the relation when referenced as `qualifier` (alias or name).
    pub fn schema(&self, qualifier: &str) -> Schema {
        Schema::for_table(qualifier, &self.attributes)
    }

    pub fn attribute_index(&self, attribute: &str) -> Option<usize> {
        self.attributes.iter().position(|attr| attr == attribute)
    }
}

/// Index definition resolved against the catalog.
#[derive(Debug, PartialEq, Clone)]
pub struct IndexMetadata {
    pub table: String,
    /// Indexed attribute name.
    pub column: String,
    /// Position of [`Self::column`] in the relation tuples.
    pub attribute: usize,
    pub clustered: bool,
    /// B+Tree order `d`.
    pub order: usize,
    /// Serialized B+Tree file.
    pub path: PathBuf,
}

/// Relations and indexes available to queries.
///
/// Built once before running queries and passed by reference to whatever
/// needs it. There's no global state.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    relations: HashMap<String, RelationMetadata>,
    /// Indexes grouped by relation name, in definition order.
    indexes: HashMap<String, Vec<IndexMetadata>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a database directory:
    ///
    /// ```text
    /// db/
    /// ├── schema.txt        Relation attr1 attr2 ...
    /// ├── index_info.txt    Relation attr clustered order (optional)
    /// ├── data/
    /// │   └── Relation      binary page file
    /// └── indexes/
    ///     └── Relation.attr serialized B+Tree
    /// ```
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, DbError> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();

        let schema = fs::read_to_string(dir.join(SCHEMA_FILE))?;

        for (number, line) in schema.lines().enumerate() {
            let mut words = line.split_whitespace();

            let Some(name) = words.next() else {
                continue;
            };

            let attributes: Vec<&str> = words.collect();

            if attributes.is_empty() {
                return Err(ConfigError::InvalidLine {
                    file: SCHEMA_FILE.into(),
                    line: number + 1,
                    reason: format!("relation '{name}' has no attributes"),
                }
                .into());
            }

            if let Some(duplicate) = attributes
                .iter()
                .enumerate()
                .find(|(i, attr)| attributes[..*i].contains(*attr))
                .map(|(_, attr)| attr)
            {
                return Err(ConfigError::InvalidLine {
                    file: SCHEMA_FILE.into(),
                    line: number + 1,
                    reason: format!("relation '{name}' repeats attribute '{duplicate}'"),
                }
                .into());
            }

            catalog.add_relation(name, &attributes, dir.join(DATA_DIR).join(name));
        }

        let index_info = dir.join(INDEX_INFO_FILE);

        if index_info.exists() {
            let definitions = crate::config::parse_index_config(&fs::read_to_string(index_info)?)?;
            let indexes_dir = dir.join(INDEXES_DIR);

            for definition in definitions {
                catalog.add_index(&definition, &indexes_dir)?;
            }
        }

        Ok(catalog)
    }

    /// Registers a relation. Replaces any previous relation with that name.
    pub fn add_relation<S: AsRef<str>>(&mut self, name: &str, attributes: &[S], path: PathBuf) {
        self.relations.insert(
            name.into(),
            RelationMetadata {
                name: name.into(),
                attributes: attributes.iter().map(|a| a.as_ref().to_owned()).collect(),
                path,
            },
        );
    }

    /// Registers an index whose file lives (or will live) in `indexes_dir`
    /// under the name `Relation.attribute`.
    pub fn add_index(
        &mut self,
        definition: &IndexDefinition,
        indexes_dir: &Path,
    ) -> Result<(), DbError> {
        let relation = self.relation(&definition.table)?;

        let attribute = relation.attribute_index(&definition.column).ok_or_else(|| {
            SqlError::InvalidColumn(format!("{}.{}", definition.table, definition.column))
        })?;

        let metadata = IndexMetadata {
            table: definition.table.clone(),
            column: definition.column.clone(),
            attribute,
            clustered: definition.clustered,
            order: definition.order,
            path: indexes_dir.join(format!("{}.{}", definition.table, definition.column)),
        };

        let indexes = self.indexes.entry(definition.table.clone()).or_default();
        indexes.retain(|index| index.column != metadata.column);
        indexes.push(metadata);

        Ok(())
    }

    /// Returns the relation called `name`.
    pub fn relation(&self, name: &str) -> Result<&RelationMetadata, DbError> {
        self.relations
            .get(name)
            .ok_or_else(|| DbError::Sql(SqlError::InvalidTable(name.into())))
    }

    /// All indexes defined on `table`.
    pub fn indexes_of(&self, table: &str) -> &[IndexMetadata] {
        self.indexes.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every index in the catalog.
    pub fn all_indexes(&self) -> impl Iterator<Item = &IndexMetadata> {
        self.indexes.values().flatten()
    }
}

/// Main entry point to everything.
///
/// Owns the [`Catalog`], the [`PlanConfig`] and the [`CacheRegistry`] that
/// external sorts spill to. Each query gets its own plan tree, and whatever
/// temporary files the tree created are gone once the query returns, whether
/// it succeeded or not.
pub struct Database {
    pub catalog: Catalog,
    pub config: PlanConfig,
    registry: CacheRegistry,
}

impl Database {
    pub fn new(catalog: Catalog, config: PlanConfig, registry: CacheRegistry) -> Self {
        Self {
            catalog,
            config,
            registry,
        }
    }

    /// Opens a database directory (see [`Catalog::load`]). If the directory
    /// contains a `plan_builder_config.txt` file it's used as the plan
    /// config, otherwise defaults apply. Temporary files go to the OS temp
    /// directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, DbError> {
        let dir = dir.as_ref();
        let catalog = Catalog::load(dir)?;

        let config_file = dir.join(PLAN_CONFIG_FILE);

        let config = if config_file.exists() {
            PlanConfig::parse(&fs::read_to_string(config_file)?)?
        } else {
            PlanConfig::default()
        };

        debug!(dir = %dir.display(), ?config, "opened database");

        Ok(Self::new(catalog, config, CacheRegistry::in_temp_dir()))
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    /// Builds every index in the catalog. Clustered indexes go first because
    /// they rewrite the relation file, which would invalidate the record ids
    /// stored in unclustered indexes built before them.
    pub fn build_indexes(&self) -> Result<(), DbError> {
        let mut indexes: Vec<&IndexMetadata> = self.catalog.all_indexes().collect();
        indexes.sort_by(|a, b| {
            (!a.clustered, &a.table, &a.column).cmp(&(!b.clustered, &b.table, &b.column))
        });

        for index in indexes {
            let relation = self.catalog.relation(&index.table)?;
            build_index::<File>(relation, index, self.config.page_size)?;
        }

        info!(indexes = self.catalog.all_indexes().count(), "built all indexes");

        Ok(())
    }

    pub fn logical_plan(&self, statement: &SelectStatement) -> Result<LogicalPlan, DbError> {
        build_logical(statement, &self.catalog)
    }

    /// Builds the executable plan of `statement`. Temporary files created
    /// while pulling tuples from it are only guaranteed to be removed by
    /// [`Self::query`] and [`Self::exec_into`] or by
    /// [`CacheRegistry::cleanup`].
    pub fn plan<F: FileOps>(&self, statement: &SelectStatement) -> Result<Plan<F>, DbError> {
        let logical = self.logical_plan(statement)?;
        let builder = PhysicalPlanBuilder::new(&self.catalog, self.config, self.registry.clone())?;

        let plan = builder.build(&logical)?;
        debug!("physical plan for {statement}\n{plan}");

        Ok(plan)
    }

    /// Runs `statement` and collects all the results in memory.
    pub fn query(&self, statement: &SelectStatement) -> Result<QuerySet, DbError> {
        let result = self.plan::<File>(statement).and_then(|mut plan| {
            let schema = plan.schema().clone();
            Ok(QuerySet::new(schema, collect(&mut plan)?))
        });

        self.finish(result)
    }

    /// Runs `statement` and writes every result to `sink`, closing it at the
    /// end. Returns the number of tuples written.
    pub fn exec_into(
        &self,
        statement: &SelectStatement,
        sink: &mut dyn TupleSink,
    ) -> Result<usize, DbError> {
        let result = self.plan::<File>(statement).and_then(|mut plan| {
            let mut written = 0;

            while let Some(tuple) = plan.try_next()? {
                sink.write_tuple(&tuple)?;
                written += 1;
            }

            sink.close()?;

            Ok(written)
        });

        self.finish(result)
    }

    /// Wipes temporary files of the query that produced `result`. The query
    /// error, if any, takes precedence over cleanup errors.
    fn finish<T>(&self, result: Result<T, DbError>) -> Result<T, DbError> {
        let cleanup = self.registry.cleanup();
        let value = result?;
        cleanup?;

        Ok(value)
    }
}

/// Query results collected in memory.
#[derive(Debug, PartialEq)]
pub struct QuerySet {
    /// Schema of the results.
    pub schema: Schema,
    /// Rows.
    pub tuples: Vec<Tuple>,
}

impl QuerySet {
    pub fn new(schema: Schema, tuples: Vec<Tuple>) -> Self {
        Self { schema, tuples }
    }

    /// Returns a concrete value given its column and row number.
    pub fn get(&self, row: usize, column: &ColumnRef) -> Option<i32> {
        self.tuples.get(row)?.get(self.schema.index_of(column)?).copied()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// `true` if there are no results.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, fs, fs::File, path::Path};

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::{Catalog, Database, DbError, QuerySet, Schema, SqlError, DATA_DIR, INDEXES_DIR};
    use crate::{
        config::{ConfigError, JoinMethod, PlanConfig, SortMethod},
        paging::{
            cache::CacheRegistry, reader::TupleReader, text::TextTupleWriter, writer::TupleWriter,
        },
        sql::statement::{BinaryOperator, ColumnRef, Expression, SelectStatement, TableRef},
        storage::tuple::Tuple,
    };

    const PAGE_SIZE: usize = 1024;

    fn write_relation(path: &Path, tuples: &[Tuple]) -> Result<(), DbError> {
        let mut writer = TupleWriter::<File>::create(path, PAGE_SIZE)?;

        for tuple in tuples {
            writer.write_tuple(tuple)?;
        }

        writer.close()
    }

    /// Database directory with `R(a, b)` holding `(1, 10), (2, 20), (3, 30)`
    /// and random `Sailors(A, B, C)` and `Boats(D, E)`.
    fn database_dir(dir: &Path) -> Result<(), DbError> {
        let data = dir.join(DATA_DIR);
        fs::create_dir_all(&data)?;

        fs::write(dir.join("schema.txt"), "R a b\nSailors A B C\nBoats D E\n")?;
        fs::write(dir.join("index_info.txt"), "Sailors A 0 3\nBoats E 1 2\n")?;

        write_relation(&data.join("R"), &[vec![1, 10], vec![2, 20], vec![3, 30]])?;

        let mut rng = StdRng::seed_from_u64(42);

        let sailors: Vec<Tuple> = (0..300)
            .map(|_| (0..3).map(|_| rng.gen_range(0..50)).collect())
            .collect();

        let boats: Vec<Tuple> = (0..100)
            .map(|_| (0..2).map(|_| rng.gen_range(0..50)).collect())
            .collect();

        write_relation(&data.join("Sailors"), &sailors)?;
        write_relation(&data.join("Boats"), &boats)
    }

    fn open(dir: &Path, config: PlanConfig) -> Result<Database, DbError> {
        let catalog = Catalog::load(dir)?;
        let registry = CacheRegistry::new(dir.join("tmp"));

        Ok(Database::new(catalog, config.with_page_size(PAGE_SIZE), registry))
    }

    fn configs() -> Vec<PlanConfig> {
        let mut configs = Vec::new();

        for join in [
            JoinMethod::TupleNestedLoop,
            JoinMethod::BlockNestedLoop { buffer_pages: 1 },
            JoinMethod::BlockNestedLoop { buffer_pages: 4 },
            JoinMethod::SortMerge,
        ] {
            for sort in [SortMethod::InMemory, SortMethod::External { buffer_pages: 3 }] {
                for use_index in [false, true] {
                    configs.push(
                        PlanConfig::default()
                            .with_join(join)
                            .with_sort(sort)
                            .with_index(use_index),
                    );
                }
            }
        }

        configs
    }

    fn cmp(left: Expression, operator: BinaryOperator, right: Expression) -> Expression {
        Expression::binary(left, operator, right)
    }

    fn and(left: Expression, right: Expression) -> Expression {
        Expression::binary(left, BinaryOperator::And, right)
    }

    fn assert_no_temporary_files(db: &Database) -> Result<(), DbError> {
        assert_eq!(db.registry().outstanding(), 0);

        let root = db.registry().root();
        if root.exists() {
            assert_eq!(fs::read_dir(root)?.count(), 0);
        }

        Ok(())
    }

    #[test]
    fn select_order_by_under_every_config() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        database_dir(dir.path())?;

        // SELECT R.a FROM R WHERE R.b > 15 ORDER BY R.a;
        let mut statement = SelectStatement::all_from(TableRef::new("R"));
        statement.columns = vec![Expression::column("R", "a")];
        statement.r#where = Some(cmp(
            Expression::column("R", "b"),
            BinaryOperator::Gt,
            Expression::Value(15),
        ));
        statement.order_by = vec![ColumnRef::new("R", "a")];

        for config in configs() {
            let db = open(dir.path(), config)?;

            assert_eq!(
                db.query(&statement)?,
                QuerySet::new(Schema::for_table("R", &["a"]), vec![vec![2], vec![3]]),
                "{config:?}"
            );
        }

        Ok(())
    }

    #[test]
    fn joins_agree_under_every_config() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        database_dir(dir.path())?;
        open(dir.path(), PlanConfig::default())?.build_indexes()?;

        // SELECT * FROM Sailors S, Boats
        // WHERE S.A = Boats.D AND S.B < 25 AND Boats.E >= 10
        // ORDER BY S.A, S.B, S.C, Boats.D, Boats.E;
        let mut statement = SelectStatement::all_from(TableRef::aliased("Sailors", "S"));
        statement.joins = vec![TableRef::new("Boats")];
        statement.r#where = Some(and(
            and(
                cmp(
                    Expression::column("S", "A"),
                    BinaryOperator::Eq,
                    Expression::column("Boats", "D"),
                ),
                cmp(
                    Expression::column("S", "B"),
                    BinaryOperator::Lt,
                    Expression::Value(25),
                ),
            ),
            cmp(
                Expression::column("Boats", "E"),
                BinaryOperator::GtEq,
                Expression::Value(10),
            ),
        ));
        statement.order_by = vec![
            ColumnRef::new("S", "A"),
            ColumnRef::new("S", "B"),
            ColumnRef::new("S", "C"),
            ColumnRef::new("Boats", "D"),
            ColumnRef::new("Boats", "E"),
        ];

        let sailors = TupleReader::<File>::open(
            dir.path().join(DATA_DIR).join("Sailors"),
            PAGE_SIZE,
        )?
        .read_all()?;

        let boats = TupleReader::<File>::open(
            dir.path().join(DATA_DIR).join("Boats"),
            PAGE_SIZE,
        )?
        .read_all()?;

        let mut expected: Vec<Tuple> = sailors
            .iter()
            .filter(|s| s[1] < 25)
            .flat_map(|s| {
                boats
                    .iter()
                    .filter(move |b| b[0] == s[0] && b[1] >= 10)
                    .map(move |b| [s.as_slice(), b.as_slice()].concat())
            })
            .collect();
        expected.sort();

        assert!(!expected.is_empty());

        for config in configs() {
            let db = open(dir.path(), config)?;
            let result = db.query(&statement)?;

            assert_eq!(result.tuples, expected, "{config:?}");
            assert_no_temporary_files(&db)?;
        }

        Ok(())
    }

    #[test]
    fn index_scans_match_full_scans() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        database_dir(dir.path())?;

        let db = open(dir.path(), PlanConfig::default())?;
        db.build_indexes()?;

        assert!(dir.path().join(INDEXES_DIR).join("Sailors.A").exists());
        assert!(dir.path().join(INDEXES_DIR).join("Boats.E").exists());

        let ranges = [
            (BinaryOperator::Gt, 10, BinaryOperator::LtEq, 20),
            (BinaryOperator::GtEq, 0, BinaryOperator::Lt, 1),
            (BinaryOperator::Gt, 45, BinaryOperator::Lt, 1000),
            (BinaryOperator::GtEq, 30, BinaryOperator::LtEq, 29),
        ];

        for (table, column) in [("Sailors", "A"), ("Boats", "E")] {
            for (low_op, low, high_op, high) in ranges {
                let mut statement = SelectStatement::all_from(TableRef::new(table));
                statement.r#where = Some(and(
                    cmp(Expression::column(table, column), low_op, Expression::Value(low)),
                    cmp(Expression::column(table, column), high_op, Expression::Value(high)),
                ));

                let scan = open(dir.path(), PlanConfig::default())?;
                let index = open(dir.path(), PlanConfig::default().with_index(true))?;

                assert!(index.plan::<File>(&statement)?.to_string().contains("IndexScan"));

                let mut expected = scan.query(&statement)?.tuples;
                let mut actual = index.query(&statement)?.tuples;

                expected.sort();
                actual.sort();

                assert_eq!(actual, expected, "{statement}");
            }
        }

        Ok(())
    }

    #[test]
    fn distinct() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        database_dir(dir.path())?;

        // SELECT DISTINCT S.B FROM Sailors S ORDER BY S.B;
        let mut statement = SelectStatement::all_from(TableRef::aliased("Sailors", "S"));
        statement.columns = vec![Expression::column("S", "B")];
        statement.order_by = vec![ColumnRef::new("S", "B")];
        statement.distinct = true;

        for sort in [SortMethod::InMemory, SortMethod::External { buffer_pages: 3 }] {
            let db = open(dir.path(), PlanConfig::default().with_sort(sort))?;
            let result = db.query(&statement)?;

            let values: Vec<i32> = result.tuples.iter().map(|tuple| tuple[0]).collect();
            let unique: HashSet<i32> = values.iter().copied().collect();

            assert_eq!(values.len(), unique.len());
            assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
            assert_eq!(result.get(0, &ColumnRef::new("S", "B")), values.first().copied());
        }

        Ok(())
    }

    #[test]
    fn self_join_with_aliases() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        database_dir(dir.path())?;

        // SELECT X.a, Y.a FROM R X, R Y WHERE X.a < Y.a ORDER BY X.a, Y.a;
        let mut statement = SelectStatement::all_from(TableRef::aliased("R", "X"));
        statement.joins = vec![TableRef::aliased("R", "Y")];
        statement.columns = vec![Expression::column("X", "a"), Expression::column("Y", "a")];
        statement.r#where = Some(cmp(
            Expression::column("X", "a"),
            BinaryOperator::Lt,
            Expression::column("Y", "a"),
        ));
        statement.order_by = vec![ColumnRef::new("X", "a"), ColumnRef::new("Y", "a")];

        let db = open(dir.path(), PlanConfig::default())?;

        assert_eq!(
            db.query(&statement)?.tuples,
            vec![vec![1, 2], vec![1, 3], vec![2, 3]]
        );

        Ok(())
    }

    #[test]
    fn false_where_returns_nothing() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        database_dir(dir.path())?;

        let mut statement = SelectStatement::all_from(TableRef::new("R"));
        statement.r#where = Some(cmp(
            Expression::Value(1),
            BinaryOperator::GtEq,
            Expression::Value(2),
        ));

        let result = open(dir.path(), PlanConfig::default())?.query(&statement)?;

        assert!(result.is_empty());
        assert_eq!(result.schema, Schema::for_table("R", &["a", "b"]));

        Ok(())
    }

    #[test]
    fn exec_into_text() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        database_dir(dir.path())?;

        let db = open(
            dir.path(),
            PlanConfig::default().with_sort(SortMethod::External { buffer_pages: 3 }),
        )?;

        let mut statement = SelectStatement::all_from(TableRef::new("R"));
        statement.order_by = vec![ColumnRef::new("R", "b")];

        let mut sink = TextTupleWriter::new(Vec::new());
        assert_eq!(db.exec_into(&statement, &mut sink)?, 3);
        assert_eq!(sink.into_inner(), b"1,10\n2,20\n3,30\n");

        assert_no_temporary_files(&db)?;

        Ok(())
    }

    #[test]
    fn failed_query_cleans_up() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        database_dir(dir.path())?;

        let db = open(
            dir.path(),
            PlanConfig::default().with_sort(SortMethod::External { buffer_pages: 3 }),
        )?;

        let mut statement = SelectStatement::all_from(TableRef::new("Nope"));
        statement.order_by = vec![ColumnRef::new("Nope", "x")];

        assert!(matches!(
            db.query(&statement),
            Err(DbError::Sql(SqlError::InvalidTable(_)))
        ));
        assert_no_temporary_files(&db)?;

        Ok(())
    }

    #[test]
    fn open_reads_plan_config() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        database_dir(dir.path())?;
        fs::write(dir.path().join("plan_builder_config.txt"), "1 5\n1 4\n1\n")?;

        let db = Database::open(dir.path())?;

        assert_eq!(
            db.config,
            PlanConfig::default()
                .with_join(JoinMethod::BlockNestedLoop { buffer_pages: 5 })
                .with_sort(SortMethod::External { buffer_pages: 4 })
                .with_index(true)
        );
        assert_eq!(db.catalog.indexes_of("Sailors").len(), 1);

        Ok(())
    }

    #[test]
    fn catalog_rejects_relations_without_attributes() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("schema.txt"), "R a\nEmpty\n")?;

        assert!(matches!(Catalog::load(dir.path()), Err(DbError::Config(_))));

        Ok(())
    }

    #[test]
    fn catalog_rejects_repeated_attributes() -> Result<(), DbError> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("schema.txt"), "S x y\nR a b a\n")?;

        assert!(matches!(
            Catalog::load(dir.path()),
            Err(DbError::Config(ConfigError::InvalidLine { line: 2, .. }))
        ));

        Ok(())
    }
}
