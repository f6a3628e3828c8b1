//! subcode - a template compiler with compile-time directives
//!
//! Templates mix literal text with tagged code:
//! - `{{= expr }}` writes an escaped value, `{{- expr }}` writes it verbatim
//! - `{{ code }}` is control code placed in the render function as is
//! - `{{: code }}` runs while compiling and decides what render code to emit
//!   (includes, nested templates, embedded data)
//! - `{{# ... }}` is a comment
//!
//! Code in tags is Lua. Compiling produces the source of a render function,
//! which is loaded into a sandboxed Lua state and called with locals.
//!
//! ```no_run
//! # async fn demo() -> subcode::Result<()> {
//! use serde_json::json;
//!
//! let options = subcode::CompileOptions::default();
//! let template = subcode::compile("Hello {{= name }}!", &options).await?;
//! assert_eq!(template.render(&json!({ "name": "World" }))?, "Hello World!");
//! # Ok(())
//! # }
//! ```

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod escape;
mod sandbox;
pub mod scanner;
pub mod sources;
pub mod template;

// Re-export main types for public API
pub use compiler::{
    compile, compile_code, compile_file, compile_file_code, file_to_module, render,
    render_file, to_module, CacheStats, CompileOptions, DirectiveEnv, Extension, IncludeCache,
    Writer,
};
pub use config::Config;
pub use engine::{Compiler, CompilerBuilder};
pub use error::{Error, ErrorKind, Result};
pub use escape::Escaper;
pub use sandbox::ESCAPE_MODULE;
pub use scanner::{scan, Fragment, FragmentKind, Position, Scanner, Source, Syntax};
pub use sources::{FsLoader, MemoryLoader, SourceLoader};
pub use template::{build_module, Rendering, Template};

pub mod prelude {
    pub use crate::*;
    pub use serde_json::json;
}
