//! Loading and running compiled templates

use crate::error::{Error, Result};
use crate::escape::Escaper;
use crate::sandbox::{self, ESCAPE_MODULE};
use mlua::{Function, IntoLuaMulti, Lua, LuaSerdeExt, SerializeOptions};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Build standalone module text for compiled render code
pub fn build_module(code: &str) -> String {
    format!("{}return {}\n", module_preamble(), code)
}

fn module_preamble() -> String {
    format!("local __e = require(\"{}\")\n", ESCAPE_MODULE)
}

/// A compiled, loaded template.
///
/// Cheap to clone. Renders may run from several threads at once; calls into
/// the underlying Lua state are serialized.
#[derive(Clone)]
pub struct Template {
    inner: Arc<Inner>,
}

struct Inner {
    code: Arc<str>,
    lua: Lua,
    function: Function,
    async_mode: bool,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("code_len", &self.inner.code.len())
            .field("async_mode", &self.inner.async_mode)
            .finish()
    }
}

impl Template {
    /// Load render code produced by the compiler
    pub fn load(code: Arc<str>, escaper: Escaper, async_mode: bool) -> Result<Self> {
        let lua = sandbox::runtime(escaper).map_err(Error::Load)?;
        let function = lua
            .load(format!("return {}", code))
            .set_name("=template")
            .eval::<Function>()
            .map_err(Error::Load)?;

        Ok(Self {
            inner: Arc::new(Inner {
                code,
                lua,
                function,
                async_mode,
            }),
        })
    }

    /// Load module text produced by [`build_module`] or [`Template::to_module`].
    ///
    /// Module text does not record whether it came from an asynchronous
    /// compile; pass the flag the module was compiled with.
    pub fn from_module(module: &str, escaper: Escaper, async_mode: bool) -> Result<Self> {
        let preamble = module_preamble();
        let code = module
            .strip_prefix(preamble.as_str())
            .and_then(|rest| rest.strip_prefix("return "))
            .map(str::trim_end)
            .ok_or_else(|| {
                Error::Load(mlua::Error::runtime(
                    "module text does not start with the escape dependency",
                ))
            })?;

        let lua = sandbox::runtime(escaper).map_err(Error::Load)?;
        let function = lua
            .load(module)
            .set_name("=module")
            .eval::<Function>()
            .map_err(Error::Load)?;

        Ok(Self {
            inner: Arc::new(Inner {
                code: Arc::from(code),
                lua,
                function,
                async_mode,
            }),
        })
    }

    /// The render function source
    pub fn code(&self) -> &str {
        &self.inner.code
    }

    pub fn is_async(&self) -> bool {
        self.inner.async_mode
    }

    pub fn to_module(&self) -> String {
        build_module(&self.inner.code)
    }

    /// The Lua state that runs this template
    pub fn lua(&self) -> &Lua {
        &self.inner.lua
    }

    /// Render with JSON locals. `null` renders with no locals.
    pub fn render(&self, locals: &serde_json::Value) -> Result<String> {
        let lua = &self.inner.lua;
        let arg = match locals {
            serde_json::Value::Null => mlua::Value::Nil,
            other => lua
                .to_value_with(other, serialize_options())
                .map_err(Error::Runtime)?,
        };
        self.render_lua(arg)
    }

    /// Render with locals already living in this template's Lua state
    pub fn render_lua(&self, args: impl IntoLuaMulti) -> Result<String> {
        self.inner
            .function
            .call::<String>(args)
            .map_err(Error::Runtime)
    }

    /// Render on the blocking pool
    pub async fn render_async(&self, locals: serde_json::Value) -> Result<String> {
        let template = self.clone();
        tokio::task::spawn_blocking(move || template.render(&locals))
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }

    /// Render the way this template was compiled to: immediately, or as a
    /// pending task for asynchronous templates.
    ///
    /// Pending renders need a Tokio runtime.
    pub fn execute(&self, locals: serde_json::Value) -> Rendering {
        if self.inner.async_mode {
            let template = self.clone();
            Rendering::Pending(tokio::task::spawn_blocking(move || {
                template.render(&locals)
            }))
        } else {
            Rendering::Ready(self.render(&locals))
        }
    }
}

fn serialize_options() -> SerializeOptions {
    SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false)
}

/// Result of [`Template::execute`]
#[derive(Debug)]
pub enum Rendering {
    Ready(Result<String>),
    Pending(JoinHandle<Result<String>>),
}

impl Rendering {
    pub fn is_pending(&self) -> bool {
        matches!(self, Rendering::Pending(_))
    }

    pub async fn output(self) -> Result<String> {
        match self {
            Rendering::Ready(result) => result,
            Rendering::Pending(handle) => handle.await.map_err(|e| Error::Task(e.to_string()))?,
        }
    }
}
