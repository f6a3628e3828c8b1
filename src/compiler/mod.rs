//! The compile pipeline
//!
//! scanner → batcher → directive execution → include resolution → assembly

pub mod assembly;
pub mod batch;
pub mod cache;
pub mod codegen;
pub mod directive;
pub mod include;
pub(crate) mod options;

pub use assembly::Writer;
pub use cache::{CacheStats, IncludeCache};
pub use directive::DirectiveEnv;
pub use include::{compile_file_code, normalize, resolve_request};
pub use options::{CompileOptions, Extension};

use crate::error::Result;
use crate::template::{build_module, Template};
use directive::{DirectiveProgram, Execution};
use std::path::Path;
use std::sync::Arc;

/// Compile template source to the text of its render function
pub async fn compile_code(src: &str, options: &CompileOptions) -> Result<Arc<str>> {
    options.syntax.validate()?;
    log::debug!("Compiling template {}", options.display_name());

    let Execution { root, includes } = {
        let program = DirectiveProgram::build(src, &options.syntax)?;
        directive::execute(&program, options)?
    };

    let compiled = include::resolve_all(&includes, options).await?;
    let code = assembly::assemble(&root, &compiled);

    log::trace!(
        "Compiled {} ({} bytes of render code)",
        options.display_name(),
        code.len()
    );
    Ok(Arc::from(code))
}

/// Compile template source into a loaded template
pub async fn compile(src: &str, options: &CompileOptions) -> Result<Template> {
    let code = compile_code(src, options).await?;
    Template::load(code, options.escaper.clone(), options.async_mode)
}

/// Read, compile and load a template file
pub async fn compile_file(path: impl AsRef<Path>, options: &CompileOptions) -> Result<Template> {
    let code = compile_file_code(path.as_ref(), options.clone()).await?;
    Template::load(code, options.escaper.clone(), options.async_mode)
}

/// Compile template source into standalone module text
pub async fn to_module(src: &str, options: &CompileOptions) -> Result<String> {
    Ok(build_module(&compile_code(src, options).await?))
}

pub async fn file_to_module(path: impl AsRef<Path>, options: &CompileOptions) -> Result<String> {
    let code = compile_file_code(path.as_ref(), options.clone()).await?;
    Ok(build_module(&code))
}

/// Compile and render in one step
pub async fn render(
    src: &str,
    locals: &serde_json::Value,
    options: &CompileOptions,
) -> Result<String> {
    compile(src, options)
        .await?
        .execute(locals.clone())
        .output()
        .await
}

pub async fn render_file(
    path: impl AsRef<Path>,
    locals: &serde_json::Value,
    options: &CompileOptions,
) -> Result<String> {
    compile_file(path, options)
        .await?
        .execute(locals.clone())
        .output()
        .await
}
