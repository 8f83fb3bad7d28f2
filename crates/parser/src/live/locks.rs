use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// One mutex per append target, shared by every writer in the process.
///
/// Appends to the same path are serialized; different paths never contend.
#[derive(Debug, Clone, Default)]
pub struct AppendLocks {
    paths: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl AppendLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `path`, created on first use.
    pub fn for_path(&self, path: &Path) -> Arc<Mutex<()>> {
        if let Some(lock) = self.paths.get(path) {
            return Arc::clone(lock.value());
        }
        Arc::clone(
            self.paths
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Run `f` while holding the lock for `path`.
    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = self.for_path(path);
        let _guard = lock.lock();
        f()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
