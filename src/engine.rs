use crate::compiler::{self, CompileOptions, DirectiveEnv, IncludeCache};
use crate::config::Config;
use crate::error::Result;
use crate::escape::Escaper;
use crate::scanner::Syntax;
use crate::sources::SourceLoader;
use crate::template::Template;
use dashmap::DashMap;
use encoding_rs::Encoding;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Compiler with default options and a base directory for named templates
pub struct Compiler {
    options: CompileOptions,
    base_dir: Option<PathBuf>,
    /// Loaded templates by path, kept while an include cache is configured
    templates: DashMap<PathBuf, Template>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::with_options(CompileOptions::default())
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompileOptions) -> Self {
        Self {
            options,
            base_dir: None,
            templates: DashMap::new(),
        }
    }

    pub fn builder() -> CompilerBuilder {
        CompilerBuilder::default()
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut compiler = Self::with_options(config.to_options()?);
        compiler.base_dir = config.base_dir.clone();
        log::debug!(
            "Template compiler configured (base_dir: {:?}, cache: {})",
            compiler.base_dir,
            config.cache_enabled
        );
        Ok(compiler)
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn cache(&self) -> Option<&Arc<IncludeCache>> {
        self.options.cache.as_ref()
    }

    /// Get the path of a named template.
    ///
    /// Names are relative to the base directory; a name without an extension
    /// gets `.html`.
    pub fn template_path(&self, name: impl AsRef<Path>) -> PathBuf {
        let name = name.as_ref();
        let name = name.strip_prefix("/").unwrap_or(name);
        let mut path = match &self.base_dir {
            Some(base) => base.join(name),
            None => name.to_path_buf(),
        };
        if path.extension().is_none() {
            path.set_extension("html");
        }
        compiler::normalize(&path)
    }

    pub async fn compile(&self, src: &str) -> Result<Template> {
        compiler::compile(src, &self.options).await
    }

    /// Compile a source string as if it lived at `filename`
    pub async fn compile_as(&self, src: &str, filename: impl Into<PathBuf>) -> Result<Template> {
        let options = self.options.clone().with_filename(filename);
        compiler::compile(src, &options).await
    }

    pub async fn compile_file(&self, name: impl AsRef<Path>) -> Result<Template> {
        let path = self.template_path(name);

        if self.options.cache.is_some() {
            if let Some(template) = self.templates.get(&path) {
                return Ok(template.clone());
            }
        }

        let template = compiler::compile_file(&path, &self.options).await?;
        if self.options.cache.is_some() {
            self.templates.insert(path, template.clone());
        }
        Ok(template)
    }

    pub async fn to_module(&self, src: &str) -> Result<String> {
        compiler::to_module(src, &self.options).await
    }

    pub async fn file_to_module(&self, name: impl AsRef<Path>) -> Result<String> {
        compiler::file_to_module(self.template_path(name), &self.options).await
    }

    pub async fn render(&self, src: &str, locals: &Value) -> Result<String> {
        compiler::render(src, locals, &self.options).await
    }

    pub async fn render_file(&self, name: impl AsRef<Path>, locals: &Value) -> Result<String> {
        self.compile_file(name)
            .await?
            .execute(locals.clone())
            .output()
            .await
    }

    /// Clear compiled templates and includes
    pub fn clear_cache(&self) {
        self.templates.clear();
        if let Some(cache) = &self.options.cache {
            cache.clear();
        }
    }
}

#[derive(Default)]
pub struct CompilerBuilder {
    options: CompileOptions,
    base_dir: Option<PathBuf>,
}

impl CompilerBuilder {
    pub fn syntax(mut self, syntax: Syntax) -> Self {
        self.options.syntax = syntax;
        self
    }

    pub fn delimiters(self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.syntax(Syntax::delimiters(open, close))
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Enable or disable a private include cache
    pub fn cache(mut self, enabled: bool) -> Self {
        self.options.cache = enabled.then(|| Arc::new(IncludeCache::new()));
        self
    }

    /// Share an include cache with other compilers
    pub fn shared_cache(mut self, cache: Arc<IncludeCache>) -> Self {
        self.options.cache = Some(cache);
        self
    }

    pub fn use_with(mut self, use_with: bool) -> Self {
        self.options.use_with = use_with;
        self
    }

    pub fn asynchronous(mut self, async_mode: bool) -> Self {
        self.options.async_mode = async_mode;
        self
    }

    pub fn encoding(mut self, encoding: &'static Encoding) -> Self {
        self.options.encoding = encoding;
        self
    }

    pub fn escaper(mut self, escaper: Escaper) -> Self {
        self.options.escaper = escaper;
        self
    }

    pub fn loader(mut self, loader: Arc<dyn SourceLoader>) -> Self {
        self.options.loader = loader;
        self
    }

    pub fn extend<F>(mut self, f: F) -> Self
    where
        F: Fn(&DirectiveEnv<'_>) -> mlua::Result<()> + Send + Sync + 'static,
    {
        self.options = self.options.extend(f);
        self
    }

    pub fn build(self) -> Compiler {
        let mut compiler = Compiler::with_options(self.options);
        compiler.base_dir = self.base_dir;
        compiler
    }
}
