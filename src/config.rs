//! Configuration objects.
//!
//! Nothing in here is global. A [`PlanConfig`] is created once and passed by
//! reference to the planner, same with the list of [`IndexDefinition`].

use std::fmt::Display;

/// Default size of relation, run and index pages.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// External sort needs at least two input buffers and one output buffer.
pub(crate) const MIN_EXTERNAL_SORT_BUFFER_PAGES: usize = 3;

/// Errors found while reading config files or parameters.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// Line that can't be parsed.
    InvalidLine {
        file: String,
        line: usize,
        reason: String,
    },
    /// Buffered algorithm configured without its buffer pages.
    MissingBufferPages(&'static str),
    /// Not enough buffer pages for the algorithm to work.
    NotEnoughBufferPages {
        algorithm: &'static str,
        given: usize,
        min: usize,
    },
    /// B+Tree order must be at least 1.
    InvalidOrder(usize),
    /// A B+Tree node serializes to more bytes than a page can hold.
    NodeTooLarge { size: usize, page_size: usize },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLine { file, line, reason } => {
                write!(f, "{file}:{line}: {reason}")
            }
            Self::MissingBufferPages(algorithm) => {
                write!(f, "{algorithm} requires the number of buffer pages")
            }
            Self::NotEnoughBufferPages {
                algorithm,
                given,
                min,
            } => write!(
                f,
                "{algorithm} requires at least {min} buffer pages but {given} were given"
            ),
            Self::InvalidOrder(order) => write!(f, "invalid B+Tree order {order}"),
            Self::NodeTooLarge { size, page_size } => write!(
                f,
                "B+Tree node needs {size} bytes but pages are {page_size} bytes long"
            ),
        }
    }
}

/// Join algorithm used for every join in the plan.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum JoinMethod {
    #[default]
    TupleNestedLoop,
    BlockNestedLoop {
        buffer_pages: usize,
    },
    SortMerge,
}

/// Sort algorithm used for ORDER BY, DISTINCT and sort merge join inputs.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum SortMethod {
    #[default]
    InMemory,
    External {
        buffer_pages: usize,
    },
}

/// Physical planning decisions.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PlanConfig {
    pub join: JoinMethod,
    pub sort: SortMethod,
    /// Use indexes for selections when possible.
    pub use_index: bool,
    /// Page size of relation and temporary files.
    pub page_size: usize,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            join: JoinMethod::default(),
            sort: SortMethod::default(),
            use_index: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

pub(crate) const PLAN_CONFIG_FILE: &str = "plan_builder_config.txt";

impl PlanConfig {
    /// Parses the plan config format:
    ///
    /// ```text
    /// 1 5     join: 0 = TNLJ, 1 <pages> = BNLJ, 2 = SMJ
    /// 1 3     sort: 0 = in memory, 1 <pages> = external
    /// 1       index: 0 = full scans, 1 = use indexes
    /// ```
    ///
    /// Missing lines keep their default value.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut lines = input
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.split_whitespace().collect::<Vec<_>>()))
            .filter(|(_, words)| !words.is_empty());

        if let Some((line, words)) = lines.next() {
            config.join = match words[0] {
                "0" => JoinMethod::TupleNestedLoop,
                "1" => JoinMethod::BlockNestedLoop {
                    buffer_pages: buffer_pages(&words, line, "block nested loop join", 1)?,
                },
                "2" => JoinMethod::SortMerge,
                other => return Err(invalid_plan_line(line, format!("unknown join method {other}"))),
            };
        }

        if let Some((line, words)) = lines.next() {
            config.sort = match words[0] {
                "0" => SortMethod::InMemory,
                "1" => SortMethod::External {
                    buffer_pages: buffer_pages(
                        &words,
                        line,
                        "external sort",
                        MIN_EXTERNAL_SORT_BUFFER_PAGES,
                    )?,
                },
                other => return Err(invalid_plan_line(line, format!("unknown sort method {other}"))),
            };
        }

        if let Some((line, words)) = lines.next() {
            config.use_index = match words[0] {
                "0" => false,
                "1" => true,
                other => return Err(invalid_plan_line(line, format!("invalid index flag {other}"))),
            };
        }

        Ok(config)
    }

    pub fn with_join(mut self, join: JoinMethod) -> Self {
        self.join = join;
        self
    }

    pub fn with_sort(mut self, sort: SortMethod) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_index(mut self, use_index: bool) -> Self {
        self.use_index = use_index;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Checks the numeric parameters. [`Self::parse`] already does this, but
    /// configs built in code skip the parser.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let JoinMethod::BlockNestedLoop { buffer_pages } = self.join {
            check_min("block nested loop join", buffer_pages, 1)?;
        }

        if let SortMethod::External { buffer_pages } = self.sort {
            check_min(
                "external sort",
                buffer_pages,
                MIN_EXTERNAL_SORT_BUFFER_PAGES,
            )?;
        }

        Ok(())
    }
}

fn invalid_plan_line(line: usize, reason: String) -> ConfigError {
    ConfigError::InvalidLine {
        file: PLAN_CONFIG_FILE.into(),
        line,
        reason,
    }
}

fn check_min(algorithm: &'static str, given: usize, min: usize) -> Result<(), ConfigError> {
    if given < min {
        return Err(ConfigError::NotEnoughBufferPages {
            algorithm,
            given,
            min,
        });
    }

    Ok(())
}

fn buffer_pages(
    words: &[&str],
    line: usize,
    algorithm: &'static str,
    min: usize,
) -> Result<usize, ConfigError> {
    let Some(pages) = words.get(1) else {
        return Err(ConfigError::MissingBufferPages(algorithm));
    };

    let pages = pages
        .parse()
        .map_err(|_| invalid_plan_line(line, format!("invalid buffer pages '{pages}'")))?;

    check_min(algorithm, pages, min)?;

    Ok(pages)
}

const INDEX_CONFIG_FILE: &str = "index_info.txt";

/// One line of the index config: `relation attribute clustered order`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct IndexDefinition {
    pub table: String,
    pub column: String,
    pub clustered: bool,
    /// B+Tree order `d`.
    pub order: usize,
}

impl IndexDefinition {
    /// Parses `Sailors A 1 15`. `line` is only used for error messages.
    pub fn parse_line(input: &str, line: usize) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidLine {
            file: INDEX_CONFIG_FILE.into(),
            line,
            reason,
        };

        let words: Vec<&str> = input.split_whitespace().collect();

        let [table, column, clustered, order] = words[..] else {
            return Err(invalid(format!(
                "expected 'relation attribute clustered order' but found '{input}'"
            )));
        };

        let clustered = match clustered {
            "0" => false,
            "1" => true,
            other => return Err(invalid(format!("clustered flag must be 0 or 1, not '{other}'"))),
        };

        let order: usize = order
            .parse()
            .map_err(|_| invalid(format!("invalid order '{order}'")))?;

        if order == 0 {
            return Err(ConfigError::InvalidOrder(order));
        }

        Ok(Self {
            table: table.into(),
            column: column.into(),
            clustered,
            order,
        })
    }
}

/// Parses every non-blank line of an index config file.
pub fn parse_index_config(input: &str) -> Result<Vec<IndexDefinition>, ConfigError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| IndexDefinition::parse_line(line, i + 1))
        .collect()
}
