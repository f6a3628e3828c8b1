//! Compile-time execution of directive code

use super::assembly::{check_name, Frame, Writer};
use super::batch::{Batcher, Emission};
use super::codegen::{self, EXTERNALS};
use super::include::{resolve_request, IncludeRequest};
use super::options::{dirname_of, encoding_for, CompileOptions, IncludeOverrides};
use crate::error::{Error, Result};
use crate::sandbox::sandbox;
use crate::scanner::{scan, Syntax};
use mlua::{FromLuaMulti, Function, IntoLua, IntoLuaMulti, Lua, Table, Value};
use std::path::{Path, PathBuf};

/// Lua program built from a template: directive code inlined, everything else
/// written through the externals registry
#[derive(Debug, Clone, Default)]
pub(crate) struct DirectiveProgram {
    pub source: String,
    /// Runtime source snippets, referenced 1-based as `__x[i]`
    pub externals: Vec<String>,
}

impl DirectiveProgram {
    pub(crate) fn build(src: &str, syntax: &Syntax) -> Result<Self> {
        let mut program = Self::default();
        // Program line being written, and the source line of `scanned`
        let mut line = 1;
        let mut source_line = 1;
        let mut scanned = 0;

        for emission in Batcher::new(scan(src, syntax)) {
            let emission = emission?;
            match &emission {
                Emission::Directive(fragment) => {
                    // Keep directive code on its source line so Lua reports useful positions
                    source_line += src[scanned..fragment.offset].matches('\n').count();
                    scanned = fragment.offset;
                    while line < source_line {
                        program.source.push('\n');
                        line += 1;
                    }
                    program.source.push_str(fragment.text);
                    line += fragment.text.matches('\n').count();
                    // A line comment would swallow whatever follows on the same line
                    if fragment.text.contains("--") {
                        program.source.push('\n');
                        line += 1;
                    } else {
                        program.source.push(' ');
                    }
                }
                _ => {
                    if let Some(code) = emission.runtime_source() {
                        program.externals.push(code);
                        program.source.push_str(&format!(
                            "write({}[{}]) ",
                            EXTERNALS,
                            program.externals.len()
                        ));
                    }
                }
            }
        }

        Ok(program)
    }
}

/// The directive environment handed to extensions
pub struct DirectiveEnv<'a> {
    lua: &'a Lua,
    writer: Writer,
    filename: Option<&'a Path>,
}

impl<'a> DirectiveEnv<'a> {
    /// Globals installed for every directive program
    pub const CAPABILITIES: &'static [&'static str] = &[
        "write",
        "include",
        "include_all",
        "template",
        "output",
        "embed",
        "string_escape",
        "filename",
        "dirname",
        "print",
        EXTERNALS,
    ];

    pub fn lua(&self) -> &'a Lua {
        self.lua
    }

    /// Register a Rust function as a directive global
    pub fn register<A, R, F>(&self, name: &str, func: F) -> mlua::Result<()>
    where
        A: FromLuaMulti,
        R: IntoLuaMulti,
        F: Fn(&Lua, A) -> mlua::Result<R> + Send + 'static,
    {
        let func = self.lua.create_function(func)?;
        self.lua.globals().set(name, func)
    }

    pub fn set<V: IntoLua>(&self, name: &str, value: V) -> mlua::Result<()> {
        self.lua.globals().set(name, value)
    }

    pub fn writer(&self) -> Writer {
        self.writer.clone()
    }

    pub fn write(&self, code: impl Into<String>) {
        self.writer.write(code);
    }

    pub fn embed(&self, name: &str, value: &serde_json::Value) -> mlua::Result<()> {
        self.writer.embed(name, value)
    }

    pub fn filename(&self) -> Option<&'a Path> {
        self.filename
    }

    pub fn dirname(&self) -> Option<PathBuf> {
        self.filename.map(dirname_of)
    }
}

/// What running the directive program produced
#[derive(Debug)]
pub(crate) struct Execution {
    pub root: Frame,
    pub includes: Vec<IncludeRequest>,
}

/// Run the directive program of one compile
pub(crate) fn execute(program: &DirectiveProgram, options: &CompileOptions) -> Result<Execution> {
    let writer = Writer::new(options.use_with);

    {
        let lua = sandbox().map_err(Error::Directive)?;
        install(&lua, &writer, program, options).map_err(Error::Directive)?;

        if let Some(extend) = &options.extend {
            let env = DirectiveEnv {
                lua: &lua,
                writer: writer.clone(),
                filename: options.filename.as_deref(),
            };
            extend(&env).map_err(Error::from_lua)?;
        }

        let chunk_name = match &options.filename {
            Some(path) => format!("@{}", path.display()),
            None => "=<template>".to_string(),
        };
        lua.load(program.source.as_str())
            .set_name(chunk_name)
            .exec()
            .map_err(Error::from_lua)?;
    }

    let (root, includes) = writer.take().finish();
    Ok(Execution { root, includes })
}

fn install(
    lua: &Lua,
    writer: &Writer,
    program: &DirectiveProgram,
    options: &CompileOptions,
) -> mlua::Result<()> {
    let globals = lua.globals();

    globals.set(
        EXTERNALS,
        lua.create_sequence_from(program.externals.iter().map(String::as_str))?,
    )?;

    let filename = options.filename.clone();
    globals.set(
        "filename",
        filename.as_ref().map(|p| p.to_string_lossy().into_owned()),
    )?;
    globals.set(
        "dirname",
        filename
            .as_deref()
            .map(|p| dirname_of(p).to_string_lossy().into_owned()),
    )?;

    let w = writer.clone();
    globals.set(
        "write",
        lua.create_function(move |_, code: String| {
            w.write(code);
            Ok(())
        })?,
    )?;

    let w = writer.clone();
    globals.set(
        "output",
        lua.create_function(move |_, text: String| {
            w.output(&text);
            Ok(())
        })?,
    )?;

    let w = writer.clone();
    globals.set(
        "embed",
        lua.create_function(move |_, (name, value): (String, Value)| {
            check_name(&name)?;
            let literal = codegen::lua_literal(&value)?;
            w.write(format!("local {} = {}\n", name, literal));
            Ok(())
        })?,
    )?;

    globals.set(
        "string_escape",
        lua.create_function(|_, s: String| Ok(codegen::escape_string(&s)))?,
    )?;

    let include = Includer {
        writer: writer.clone(),
        filename,
        syntax: options.syntax.clone(),
    };

    let includer = include.clone();
    globals.set(
        "include",
        lua.create_function(
            move |_, (name, request, overrides): (String, String, Option<Table>)| {
                let overrides = includer.overrides(overrides)?;
                includer.reserve(name, &request, overrides)
            },
        )?,
    )?;

    let includer = include;
    globals.set(
        "include_all",
        lua.create_function(move |_, (map, overrides): (Table, Option<Table>)| {
            let overrides = includer.overrides(overrides)?;
            let mut pairs = map
                .pairs::<String, String>()
                .collect::<mlua::Result<Vec<_>>>()?;
            pairs.sort();
            for (name, request) in pairs {
                includer.reserve(name, &request, overrides.clone())?;
            }
            Ok(())
        })?,
    )?;

    let w = writer.clone();
    globals.set(
        "template",
        lua.create_function(
            move |_, (name, second, third): (String, Value, Option<Function>)| {
                let (settings, body) = match (second, third) {
                    (Value::Function(body), None) => (None, body),
                    (Value::Table(settings), Some(body)) => (Some(settings), body),
                    (Value::Nil, Some(body)) => (None, body),
                    _ => {
                        return Err(mlua::Error::runtime(
                            "template expects a name, optional settings and a body function",
                        ))
                    }
                };
                check_name(&name)?;

                let use_with = match settings {
                    Some(settings) => settings.get::<Option<bool>>("use_with")?,
                    None => None,
                }
                .unwrap_or_else(|| w.lock().use_with());

                w.lock().open(Frame::new(name, use_with));
                let result = body.call::<()>(());
                let mut assembly = w.lock();
                if result.is_ok() {
                    assembly.close();
                } else {
                    assembly.discard();
                }
                result
            },
        )?,
    )?;

    Ok(())
}

/// Shared state of the `include` and `include_all` capabilities
#[derive(Clone)]
struct Includer {
    writer: Writer,
    filename: Option<PathBuf>,
    syntax: Syntax,
}

impl Includer {
    fn reserve(&self, name: String, request: &str, overrides: IncludeOverrides) -> mlua::Result<()> {
        check_name(&name)?;
        let path = resolve_request(request, self.filename.as_deref()).map_err(mlua::Error::external)?;
        self.writer.lock().reserve(
            name,
            IncludeRequest {
                request: request.to_string(),
                path,
                overrides,
            },
        );
        Ok(())
    }

    fn overrides(&self, table: Option<Table>) -> mlua::Result<IncludeOverrides> {
        let table = match table {
            Some(table) => table,
            None => return Ok(IncludeOverrides::default()),
        };

        let syntax = match table.get::<Option<Table>>("syntax")? {
            Some(patch) => Some(patch_syntax(&self.syntax, &patch)?),
            None => None,
        };

        let encoding = match table.get::<Option<String>>("encoding")? {
            Some(label) => Some(encoding_for(&label).map_err(mlua::Error::external)?),
            None => None,
        };

        Ok(IncludeOverrides {
            syntax,
            use_with: table.get("use_with")?,
            encoding,
            cache: table.get("cache")?,
        })
    }
}

fn patch_syntax(base: &Syntax, patch: &Table) -> mlua::Result<Syntax> {
    let mut syntax = base.clone();

    if let Some(open) = patch.get::<Option<String>>("open")? {
        syntax.open = open;
    }
    if let Some(close) = patch.get::<Option<String>>("close")? {
        syntax.close = close;
    }

    let sigil = |key: &str| -> mlua::Result<Option<char>> {
        match patch.get::<Option<String>>(key)? {
            None => Ok(None),
            Some(text) => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Some(c)),
                    _ => Err(mlua::Error::runtime(format!(
                        "syntax field '{}' must be a single character",
                        key
                    ))),
                }
            }
        }
    };

    if let Some(c) = sigil("compiler_control")? {
        syntax.compiler_control = c;
    }
    if let Some(c) = sigil("write_escaped")? {
        syntax.write_escaped = c;
    }
    if let Some(c) = sigil("write_unescaped")? {
        syntax.write_unescaped = c;
    }
    if let Some(c) = sigil("comment")? {
        syntax.comment = c;
    }
    if let Some(c) = sigil("escape")? {
        syntax.escape = Some(c);
    }

    syntax.validate().map_err(mlua::Error::external)?;
    Ok(syntax)
}
