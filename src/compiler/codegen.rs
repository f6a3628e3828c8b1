//! Lua source generation helpers

use crate::scanner::lexicon;

/// Output buffer of a render function
pub const OUTPUT: &str = "__r";
/// Escaping function
pub const ESCAPE: &str = "__e";
/// Externals registry of the directive program
pub const EXTERNALS: &str = "__x";
/// Locals lookup of the enclosing render function, seen by nested ones
pub const SCOPE: &str = "__s";

/// Nesting limit for embedded Lua tables
const MAX_EMBED_DEPTH: usize = 32;

/// Escape text for use inside a quoted Lua string literal
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // Three digits so a following digit is not read as part of the escape
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// A double-quoted Lua string literal
pub fn string_literal(s: &str) -> String {
    format!("\"{}\"", escape_string(s))
}

/// Whether `name` can be bound as a local by generated code
pub fn is_bindable(name: &str) -> bool {
    let mut chars = name.chars();
    let starts = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    starts
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !lexicon::is_keyword(name)
        && !lexicon::RESERVED.contains(&name)
}

fn number_literal(n: f64) -> String {
    if n.is_nan() {
        "(0/0)".to_string()
    } else if n == f64::INFINITY {
        "math.huge".to_string()
    } else if n == f64::NEG_INFINITY {
        "-math.huge".to_string()
    } else {
        format!("{:?}", n)
    }
}

/// Lua literal for a compile-time Lua value
pub(crate) fn lua_literal(value: &mlua::Value) -> mlua::Result<String> {
    lua_literal_at(value, 0)
}

fn lua_literal_at(value: &mlua::Value, depth: usize) -> mlua::Result<String> {
    use mlua::Value;

    if depth > MAX_EMBED_DEPTH {
        return Err(mlua::Error::runtime("embedded value is nested too deeply"));
    }

    Ok(match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => number_literal(*n),
        Value::String(s) => string_literal(&s.to_str()?),
        Value::Table(table) => {
            let mut fields = Vec::new();
            for pair in table.pairs::<Value, Value>() {
                let (key, value) = pair?;
                fields.push(format!(
                    "[{}]={}",
                    lua_literal_at(&key, depth + 1)?,
                    lua_literal_at(&value, depth + 1)?
                ));
            }
            format!("{{{}}}", fields.join(","))
        }
        other => {
            return Err(mlua::Error::runtime(format!(
                "cannot embed a value of type {}",
                other.type_name()
            )))
        }
    })
}

/// Lua literal for a JSON value. Arrays become sequences.
pub fn json_literal(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => number_literal(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => string_literal(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(json_literal).collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Object(map) => {
            let fields: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("[{}]={}", string_literal(k), json_literal(v)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
    }
}
