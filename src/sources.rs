//! Where template sources come from

use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use encoding_rs::Encoding;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reads raw template bytes for a resolved path
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads templates from the file system
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

#[async_trait]
impl SourceLoader for FsLoader {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

/// In-memory template sources, keyed by path
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: DashMap<PathBuf, Vec<u8>>,
    reads: AtomicUsize,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    /// Number of reads served so far, including misses
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SourceLoader for MemoryLoader {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.files
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no template registered at {}", path.display()),
                )
            })
    }
}

/// Read and decode a template source
pub(crate) async fn read_source(
    loader: &dyn SourceLoader,
    path: &Path,
    encoding: &'static Encoding,
) -> Result<String> {
    let bytes = loader.read(path).await.map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let (text, used, had_errors) = encoding.decode(&bytes);
    if had_errors {
        log::warn!(
            "Template {} contains malformed {} sequences",
            path.display(),
            used.name()
        );
    }
    Ok(text.into_owned())
}
