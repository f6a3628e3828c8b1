//! Restricted Lua states for directive and render code

use crate::compiler::codegen::ESCAPE;
use crate::escape::Escaper;
use mlua::{Function, Lua, LuaOptions, StdLib, Value, Variadic};

/// Module name resolving to the escaping function in module texts
pub const ESCAPE_MODULE: &str = "subcode.escape";

/// A Lua state without file, OS or chunk-loading access
pub(crate) fn sandbox() -> mlua::Result<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE,
        LuaOptions::default(),
    )?;

    {
        let globals = lua.globals();
        for name in ["load", "loadfile", "dofile", "collectgarbage", "require"] {
            globals.set(name, Value::Nil)?;
        }
    }

    route_print(&lua)?;
    Ok(lua)
}

/// Send `print` output to the log instead of stdout
fn route_print(lua: &Lua) -> mlua::Result<()> {
    let print = lua.create_function(|lua, args: Variadic<Value>| {
        let tostring: Function = lua.globals().get("tostring")?;
        let mut parts = Vec::with_capacity(args.len());
        for arg in args.iter() {
            parts.push(tostring.call::<String>(arg.clone())?);
        }
        log::debug!(target: "subcode::lua", "{}", parts.join("\t"));
        Ok(())
    })?;
    lua.globals().set("print", print)
}

/// A sandbox prepared for running compiled templates.
///
/// `__e` is bound to the escaper, and `require` resolves only the escape module.
pub(crate) fn runtime(escaper: Escaper) -> mlua::Result<Lua> {
    let lua = sandbox()?;

    let escape = lua.create_function(move |_, text: String| Ok(escaper(&text)))?;
    lua.set_named_registry_value(ESCAPE_MODULE, escape.clone())?;
    lua.globals().set(ESCAPE, escape)?;

    let require = lua.create_function(|lua, name: String| -> mlua::Result<Function> {
        if name == ESCAPE_MODULE {
            lua.named_registry_value(ESCAPE_MODULE)
        } else {
            Err(mlua::Error::runtime(format!(
                "module '{}' is not available to templates",
                name
            )))
        }
    })?;
    lua.globals().set("require", require)?;

    Ok(lua)
}
