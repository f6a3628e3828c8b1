//! Shared cache of compiled include sources

use super::include::normalize;
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Sub-compiles actually performed through the cache
    pub compiles: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Maps resolved include paths to compiled runtime source.
///
/// Each path is compiled at most once: concurrent lookups of the same path
/// wait for the first compile. A failed compile leaves the entry empty so a
/// later request tries again. Entries are never invalidated here; call
/// [`IncludeCache::clear`] when the sources change.
///
/// Keys are resolved paths only. Per-include overrides (`syntax`, `use_with`,
/// `encoding`) are not part of the key: the first compile of a path is what
/// every later include of that path gets, whatever its overrides. Pass
/// `cache = false` to an include that needs its own variant.
#[derive(Debug, Default)]
pub struct IncludeCache {
    entries: DashMap<PathBuf, Arc<OnceCell<Arc<str>>>>,
    /// Includer → include edges of compiles still in progress
    pending: Mutex<HashMap<PathBuf, Vec<PathBuf>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    compiles: AtomicU64,
}

impl IncludeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<str>> {
        let key = normalize(path.as_ref());
        self.entries
            .get(&key)
            .and_then(|cell| cell.value().get().cloned())
    }

    /// Seed an entry. Returns false if the path already holds compiled code.
    pub fn insert(&self, path: impl AsRef<Path>, code: impl Into<Arc<str>>) -> bool {
        let cell = self.cell(&normalize(path.as_ref()));
        cell.set(code.into()).is_ok()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.get(path).is_some()
    }

    /// Number of compiled entries
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compiles: self.compiles.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn cell(&self, key: &Path) -> Arc<OnceCell<Arc<str>>> {
        self.entries.entry(key.to_path_buf()).or_default().clone()
    }

    /// Return the cached code for `path`, running `compile` if there is none yet.
    ///
    /// `chain` lists the files including `path`, outermost first. Waiting on
    /// an entry whose compile, directly or through other pending compiles,
    /// needs one of those files would never finish, so that fails as a
    /// circular include instead.
    pub(crate) async fn get_or_compile<F, Fut>(
        &self,
        path: &Path,
        chain: &[PathBuf],
        compile: F,
    ) -> Result<Arc<str>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<str>>>,
    {
        let cell = self.cell(path);

        if let Some(code) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("Include cache hit: {}", path.display());
            return Ok(Arc::clone(code));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::trace!("Include cache miss: {}", path.display());

        let _pending = match chain.last() {
            Some(includer) => Some(self.track(includer, path, chain)?),
            None => None,
        };

        let code = cell
            .get_or_try_init(|| async {
                self.compiles.fetch_add(1, Ordering::Relaxed);
                compile().await
            })
            .await?;

        Ok(Arc::clone(code))
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Vec<PathBuf>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `includer` waits on `path`, unless `path` already waits on the chain
    fn track(&self, includer: &Path, path: &Path, chain: &[PathBuf]) -> Result<Pending<'_>> {
        let mut pending = self.lock_pending();
        if reaches(&pending, path, chain) {
            log::warn!("Circular include through {}", path.display());
            return Err(Error::resolution(
                path.display().to_string(),
                "circular include",
            ));
        }
        pending
            .entry(includer.to_path_buf())
            .or_default()
            .push(path.to_path_buf());
        Ok(Pending {
            cache: self,
            includer: includer.to_path_buf(),
            path: path.to_path_buf(),
        })
    }
}

/// Whether any file of `chain` is reachable from `from` over pending edges
fn reaches(pending: &HashMap<PathBuf, Vec<PathBuf>>, from: &Path, chain: &[PathBuf]) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from.to_path_buf()];
    while let Some(node) = stack.pop() {
        if chain.contains(&node) {
            return true;
        }
        if let Some(next) = pending.get(&node) {
            for target in next {
                if seen.insert(target.clone()) {
                    stack.push(target.clone());
                }
            }
        }
    }
    false
}

/// A pending include edge, removed when the lookup finishes or is dropped
struct Pending<'a> {
    cache: &'a IncludeCache,
    includer: PathBuf,
    path: PathBuf,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        let mut pending = self.cache.lock_pending();
        if let Some(targets) = pending.get_mut(&self.includer) {
            if let Some(index) = targets.iter().position(|t| *t == self.path) {
                targets.swap_remove(index);
            }
            if targets.is_empty() {
                pending.remove(&self.includer);
            }
        }
    }
}
