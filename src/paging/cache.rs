//! Scoped temporary file areas.
//!
//! Operators that spill to disk (external sort) get their own [`CacheDir`]
//! from a [`CacheRegistry`]. Each directory has a unique name and is removed
//! when the [`CacheDir`] is dropped. On top of that the registry remembers
//! every directory it handed out, so [`CacheRegistry::cleanup`] can wipe all
//! of them at the end of a query even if some operator never got to finish
//! (or drop) its iterator.

use std::{
    cell::RefCell,
    fs, io,
    path::{Path, PathBuf},
    rc::Rc,
};

use tempfile::TempDir;
use tracing::debug;

use crate::db::DbError;

/// Hands out unique temporary directories below a root directory.
///
/// Cloning is cheap and all clones share the same list of directories. Not
/// thread safe: one registry per query tree / thread.
#[derive(Debug, Clone)]
pub struct CacheRegistry {
    state: Rc<RefCell<RegistryState>>,
}

#[derive(Debug)]
struct RegistryState {
    root: PathBuf,
    /// Directories created so far that haven't been cleaned up.
    dirs: Vec<PathBuf>,
}

impl CacheRegistry {
    /// Temporary directories will be created inside `root`. The root itself
    /// is created on demand.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            state: Rc::new(RefCell::new(RegistryState {
                root: root.into(),
                dirs: Vec::new(),
            })),
        }
    }

    /// Registry rooted at the OS temp directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn root(&self) -> PathBuf {
        self.state.borrow().root.clone()
    }

    /// Creates a new uniquely named directory whose name starts with
    /// `prefix`.
    pub fn allocate(&self, prefix: &str) -> Result<CacheDir, DbError> {
        let mut state = self.state.borrow_mut();

        fs::create_dir_all(&state.root)?;

        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&state.root)?;

        debug!(path = %dir.path().display(), "allocated cache directory");

        state.dirs.push(dir.path().to_path_buf());

        Ok(CacheDir { dir, next_file: 0 })
    }

    /// Deletes every directory allocated so far. Directories that were
    /// already removed are skipped, so calling this more than once is fine.
    pub fn cleanup(&self) -> Result<(), DbError> {
        let dirs: Vec<PathBuf> = self.state.borrow_mut().dirs.drain(..).collect();

        for dir in dirs {
            match fs::remove_dir_all(&dir) {
                Ok(()) => debug!(path = %dir.display(), "removed cache directory"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Number of allocated directories that still exist on disk.
    pub fn outstanding(&self) -> usize {
        self.state
            .borrow()
            .dirs
            .iter()
            .filter(|dir| dir.exists())
            .count()
    }
}

/// Temporary directory owned by one operator.
///
/// The directory and everything in it is deleted on drop.
#[derive(Debug)]
pub struct CacheDir {
    dir: TempDir,
    next_file: usize,
}

impl CacheDir {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns a path for a new file that nobody else in this directory is
    /// using. The file is not created.
    pub fn new_file_path(&mut self, hint: &str) -> PathBuf {
        let path = self.dir.path().join(format!("{hint}-{}", self.next_file));
        self.next_file += 1;
        path
    }

    /// Number of files currently in the directory.
    pub fn file_count(&self) -> Result<usize, DbError> {
        match fs::read_dir(self.dir.path()) {
            Ok(entries) => Ok(entries.count()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
