//! Include resolution

use super::options::{CompileOptions, IncludeOverrides};
use crate::error::{Error, Result};
use crate::sources::read_source;
use futures::future::{self, BoxFuture, FutureExt};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// An include reserved by directive code, waiting to be compiled
#[derive(Debug, Clone)]
pub(crate) struct IncludeRequest {
    pub request: String,
    pub path: PathBuf,
    pub overrides: IncludeOverrides,
}

/// Resolve an include request against the including file.
///
/// Absolute requests are used as they are. Anything else is relative to the
/// directory of `filename`; without a filename there is nothing to resolve
/// against and the request fails.
pub fn resolve_request(request: &str, filename: Option<&Path>) -> Result<PathBuf> {
    let requested = Path::new(request);
    if requested.is_absolute() {
        return Ok(normalize(requested));
    }

    match filename {
        Some(filename) => Ok(normalize(&super::options::dirname_of(filename).join(requested))),
        None => Err(Error::resolution(
            request,
            "relative include in a template compiled without a filename",
        )),
    }
}

/// Lexically remove `.` and `..` components
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Compile every reserved include of one compile concurrently
pub(crate) async fn resolve_all(
    requests: &[IncludeRequest],
    parent: &CompileOptions,
) -> Result<Vec<Arc<str>>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    log::debug!(
        "Resolving {} include(s) of {}",
        requests.len(),
        parent.display_name()
    );

    let compiles = requests.iter().map(|request| {
        log::trace!("Include '{}' -> {}", request.request, request.path.display());
        let mut options = request.overrides.apply(parent);
        if let Some(filename) = &parent.filename {
            options.chain.push(normalize(filename));
        }
        compile_file_code(request.path.clone(), options)
    });
    future::try_join_all(compiles).await
}

/// Read and compile a template file to runtime source, through the cache when one is set
pub fn compile_file_code(
    path: impl Into<PathBuf>,
    options: CompileOptions,
) -> BoxFuture<'static, Result<Arc<str>>> {
    let path = normalize(&path.into());
    async move {
        if options.chain.contains(&path) {
            return Err(Error::resolution(
                path.display().to_string(),
                "circular include",
            ));
        }

        match options.cache.clone() {
            Some(cache) => {
                let chain = options.chain.clone();
                cache
                    .get_or_compile(&path, &chain, || read_and_compile(path.clone(), options))
                    .await
            }
            None => read_and_compile(path, options).await,
        }
    }
    .boxed()
}

async fn read_and_compile(path: PathBuf, mut options: CompileOptions) -> Result<Arc<str>> {
    let src = read_source(options.loader.as_ref(), &path, options.encoding).await?;
    options.filename = Some(path);
    super::compile_code(&src, &options).await
}
