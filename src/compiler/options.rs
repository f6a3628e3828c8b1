use super::cache::IncludeCache;
use super::directive::DirectiveEnv;
use crate::error::{Error, Result};
use crate::escape::{self, Escaper};
use crate::scanner::Syntax;
use crate::sources::{FsLoader, SourceLoader};
use encoding_rs::Encoding;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Hook run against the directive environment before the directive program
pub type Extension = Arc<dyn Fn(&DirectiveEnv<'_>) -> mlua::Result<()> + Send + Sync>;

/// Options for a single compile call
#[derive(Clone)]
pub struct CompileOptions {
    pub syntax: Syntax,
    /// Identity of the source; required for relative includes
    pub filename: Option<PathBuf>,
    /// Encoding used when reading include files
    pub encoding: &'static Encoding,
    pub cache: Option<Arc<IncludeCache>>,
    /// Mark produced templates as asynchronous
    pub async_mode: bool,
    /// Expose locals fields as plain variables in render code
    pub use_with: bool,
    pub extend: Option<Extension>,
    pub escaper: Escaper,
    pub loader: Arc<dyn SourceLoader>,
    /// Files whose compile is in progress above this one
    pub(crate) chain: Vec<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            syntax: Syntax::default(),
            filename: None,
            encoding: encoding_rs::UTF_8,
            cache: None,
            async_mode: false,
            use_with: true,
            extend: None,
            escaper: escape::html_escaper(),
            loader: Arc::new(FsLoader),
            chain: Vec::new(),
        }
    }
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("syntax", &self.syntax)
            .field("filename", &self.filename)
            .field("encoding", &self.encoding.name())
            .field("cache", &self.cache.is_some())
            .field("async_mode", &self.async_mode)
            .field("use_with", &self.use_with)
            .field("extend", &self.extend.is_some())
            .finish()
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the include encoding from a WHATWG label such as `"latin1"`
    pub fn with_encoding(mut self, label: &str) -> Result<Self> {
        self.encoding = encoding_for(label)?;
        Ok(self)
    }

    pub fn with_cache(mut self, cache: Arc<IncludeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn asynchronous(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    pub fn with_use_with(mut self, use_with: bool) -> Self {
        self.use_with = use_with;
        self
    }

    pub fn extend<F>(mut self, f: F) -> Self
    where
        F: Fn(&DirectiveEnv<'_>) -> mlua::Result<()> + Send + Sync + 'static,
    {
        self.extend = Some(Arc::new(f));
        self
    }

    pub fn with_escaper(mut self, escaper: Escaper) -> Self {
        self.escaper = escaper;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn SourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Directory of `filename`. A bare file name lives in `.`.
    pub fn dirname(&self) -> Option<PathBuf> {
        self.filename.as_deref().map(dirname_of)
    }

    /// Name used in log messages and Lua chunk names
    pub(crate) fn display_name(&self) -> String {
        match &self.filename {
            Some(path) => path.display().to_string(),
            None => "<template>".to_string(),
        }
    }
}

pub(crate) fn dirname_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub(crate) fn encoding_for(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::config(format!("Unknown encoding '{}'", label)))
}

/// Per-include changes to the inherited options
#[derive(Debug, Clone, Default)]
pub(crate) struct IncludeOverrides {
    pub syntax: Option<Syntax>,
    pub use_with: Option<bool>,
    pub encoding: Option<&'static Encoding>,
    pub cache: Option<bool>,
}

impl IncludeOverrides {
    /// Options for compiling an include requested under `self`
    pub(crate) fn apply(&self, parent: &CompileOptions) -> CompileOptions {
        let mut options = parent.clone();
        if let Some(syntax) = &self.syntax {
            options.syntax = syntax.clone();
        }
        if let Some(use_with) = self.use_with {
            options.use_with = use_with;
        }
        if let Some(encoding) = self.encoding {
            options.encoding = encoding;
        }
        if self.cache == Some(false) {
            options.cache = None;
        }
        options
    }
}
