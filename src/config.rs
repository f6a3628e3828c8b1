use crate::compiler::{CompileOptions, IncludeCache};
use crate::error::{Error, Result};
use crate::scanner::Syntax;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Compiler configuration, usually read from a `[templates]`-style TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub syntax: Syntax,
    /// Expose locals fields as plain variables in render code
    pub use_with: bool,
    #[serde(rename = "async")]
    pub async_mode: bool,
    /// WHATWG label for include files
    pub encoding: String,
    /// Share one include cache across compiles
    pub cache_enabled: bool,
    /// Directory that relative template names are resolved against
    pub base_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            syntax: Syntax::default(),
            use_with: true,
            async_mode: false,
            encoding: "utf-8".to_string(),
            cache_enabled: true,
            base_dir: None,
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    #[cfg(feature = "config")]
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from a TOML file.
    ///
    /// A relative `base_dir` is resolved against the file's directory.
    #[cfg(feature = "config")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let content = std::fs::read_to_string(path_ref).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}. Make sure the file exists and is readable.",
                path_ref.display(),
                e
            ))
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}. Check TOML syntax.",
                path_ref.display(),
                e
            ))
        })?;

        if let Some(base_dir) = &config.base_dir {
            if base_dir.is_relative() {
                let parent = path_ref.parent().unwrap_or_else(|| Path::new("."));
                config.base_dir = Some(parent.join(base_dir));
            }
        }

        log::debug!(
            "Successfully loaded configuration from: {}",
            path_ref.display()
        );
        Ok(config)
    }

    /// Apply `SUBCODE_*` environment variables on top of this configuration
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(open) = lookup("SUBCODE_OPEN") {
            self.syntax.open = open;
        }
        if let Some(close) = lookup("SUBCODE_CLOSE") {
            self.syntax.close = close;
        }
        if let Some(use_with) = lookup("SUBCODE_USE_WITH") {
            self.use_with = parse_flag("SUBCODE_USE_WITH", &use_with)?;
        }
        if let Some(async_mode) = lookup("SUBCODE_ASYNC") {
            self.async_mode = parse_flag("SUBCODE_ASYNC", &async_mode)?;
        }
        if let Some(encoding) = lookup("SUBCODE_ENCODING") {
            self.encoding = encoding;
        }
        if let Some(cache) = lookup("SUBCODE_CACHE") {
            self.cache_enabled = parse_flag("SUBCODE_CACHE", &cache)?;
        }
        if let Some(base_dir) = lookup("SUBCODE_BASE_DIR") {
            self.base_dir = Some(PathBuf::from(base_dir));
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.syntax.validate()?;
        crate::compiler::options::encoding_for(&self.encoding)?;

        if let Some(base_dir) = &self.base_dir {
            if !base_dir.exists() {
                log::warn!("Template base directory does not exist: {}", base_dir.display());
            }
        }

        Ok(())
    }

    /// Compile options described by this configuration
    pub fn to_options(&self) -> Result<CompileOptions> {
        self.validate()?;

        let mut options = CompileOptions::new()
            .with_syntax(self.syntax.clone())
            .with_use_with(self.use_with)
            .asynchronous(self.async_mode)
            .with_encoding(&self.encoding)?;
        if self.cache_enabled {
            options = options.with_cache(Arc::new(IncludeCache::new()));
        }
        Ok(options)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("Invalid {} value", name))),
    }
}
