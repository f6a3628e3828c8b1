//! Lexical helpers shared by the scanner and the assembler
//!
//! Both need to step over string literals and comments without looking inside
//! them: the scanner so that a close tag inside a literal does not end a code
//! fragment, the assembler so that names inside literals are not mistaken for
//! free variables.

use std::collections::HashSet;

/// Which literal forms are recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    /// Code inside template tags: Lua forms plus C-style comments and backtick strings
    Tag,
    /// Generated Lua source
    Lua,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub offset: usize,
    pub message: &'static str,
}

/// If a literal or comment starts at `pos`, return the offset just past it
pub(crate) fn skip_literal(
    src: &str,
    pos: usize,
    dialect: Dialect,
) -> Result<Option<usize>, LexError> {
    let rest = &src[pos..];

    match rest.as_bytes().first() {
        Some(b'/') if dialect == Dialect::Tag => {
            if rest.starts_with("/*") {
                return match rest[2..].find("*/") {
                    Some(end) => Ok(Some(pos + 2 + end + 2)),
                    None => Err(LexError {
                        offset: pos,
                        message: "expected end of comment",
                    }),
                };
            }
            if rest.starts_with("//") {
                return line_end(src, pos, dialect);
            }
            Ok(None)
        }
        Some(b'-') if rest.starts_with("--") => {
            if let Some(level) = long_bracket(&rest[2..]) {
                let close = closing_bracket(level);
                let body = pos + 2 + level + 2;
                return match src[body..].find(&close) {
                    Some(end) => Ok(Some(body + end + close.len())),
                    None => Err(LexError {
                        offset: pos,
                        message: "expected end of comment",
                    }),
                };
            }
            line_end(src, pos, dialect)
        }
        Some(b'[') => match long_bracket(rest) {
            Some(level) => {
                let close = closing_bracket(level);
                let body = pos + level + 2;
                match src[body..].find(&close) {
                    Some(end) => Ok(Some(body + end + close.len())),
                    None => Err(LexError {
                        offset: pos,
                        message: "expected end of long string",
                    }),
                }
            }
            None => Ok(None),
        },
        Some(&quote @ (b'\'' | b'"')) => string_end(src, pos, quote).map(Some),
        Some(b'`') if dialect == Dialect::Tag => string_end(src, pos, b'`').map(Some),
        _ => Ok(None),
    }
}

/// Level of a long bracket (`[[`, `[=[`, ...) at the start of `s`
fn long_bracket(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let level = bytes[1..].iter().take_while(|&&b| b == b'=').count();
    (bytes.get(level + 1) == Some(&b'[')).then_some(level)
}

fn closing_bracket(level: usize) -> String {
    format!("]{}]", "=".repeat(level))
}

fn line_end(src: &str, pos: usize, dialect: Dialect) -> Result<Option<usize>, LexError> {
    match src[pos..].find('\n') {
        Some(end) => Ok(Some(pos + end + 1)),
        None if dialect == Dialect::Lua => Ok(Some(src.len())),
        None => Err(LexError {
            offset: pos,
            message: "expected end of line",
        }),
    }
}

fn string_end(src: &str, pos: usize, quote: u8) -> Result<usize, LexError> {
    let bytes = src.as_bytes();
    let mut i = pos + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(LexError {
        offset: pos,
        message: "expected end of string literal",
    })
}

const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
    "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Globals that templates always see from the Lua environment
const STANDARD: &[&str] = &[
    "_G", "_ENV", "_VERSION", "assert", "error", "getmetatable", "ipairs", "next", "pairs",
    "pcall", "print", "rawequal", "rawget", "rawlen", "rawset", "select", "setmetatable",
    "tonumber", "tostring", "type", "xpcall", "require", "coroutine", "math", "string",
    "table", "utf8",
];

/// Names the compiler itself binds in generated code
pub(crate) const RESERVED: &[&str] = &["locals", "__r", "__e", "__x", "__v", "__s"];

pub(crate) fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Identifiers a chunk of Lua reads from its surroundings, in first-use order.
///
/// This is a lexical approximation: names after a single `.` or `:` are member
/// accesses and are skipped, as are keywords, standard globals and names the
/// compiler reserves. Locals declared by the chunk itself are still reported.
pub(crate) fn free_names(code: &str) -> Vec<&str> {
    let bytes = code.as_bytes();
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    let mut member = false;
    let mut i = 0;

    while i < bytes.len() {
        match skip_literal(code, i, Dialect::Lua) {
            Ok(Some(end)) => {
                i = end;
                member = false;
                continue;
            }
            Ok(None) => {}
            // Malformed generated code is reported by Lua when it loads
            Err(_) => break,
        }

        let b = bytes[i];
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let word = &code[start..i];
            if !member
                && !is_keyword(word)
                && !STANDARD.contains(&word)
                && !RESERVED.contains(&word)
                && seen.insert(word)
            {
                names.push(word);
            }
            member = false;
        } else if b.is_ascii_digit() {
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
            {
                i += 1;
            }
            member = false;
        } else if b == b'.' || b == b':' {
            if bytes.get(i + 1) == Some(&b) {
                while i < bytes.len() && bytes[i] == b {
                    i += 1;
                }
                member = false;
            } else {
                i += 1;
                member = true;
            }
        } else if b.is_ascii_whitespace() {
            i += 1;
        } else {
            i += code[i..].chars().next().map_or(1, char::len_utf8);
            member = false;
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_quoted_strings() {
        let src = r#"x = "a\"}}" .. 'b'"#;
        let start = src.find('"').unwrap();
        let end = skip_literal(src, start, Dialect::Tag).unwrap().unwrap();
        assert_eq!(&src[start..end], r#""a\"}}""#);
    }

    #[test]
    fn test_backtick_only_in_tags() {
        let src = "`}}`";
        assert_eq!(skip_literal(src, 0, Dialect::Tag).unwrap(), Some(4));
        assert_eq!(skip_literal(src, 0, Dialect::Lua).unwrap(), None);
    }

    #[test]
    fn test_skip_comments() {
        let src = "/* }} */";
        assert_eq!(skip_literal(src, 0, Dialect::Tag).unwrap(), Some(src.len()));

        let src = "-- }}\nx";
        assert_eq!(skip_literal(src, 0, Dialect::Tag).unwrap(), Some(6));

        let src = "--[==[ ]] }} ]==]x";
        assert_eq!(skip_literal(src, 0, Dialect::Tag).unwrap(), Some(src.len() - 1));
    }

    #[test]
    fn test_skip_long_string() {
        let src = "[[ a ]] b";
        assert_eq!(skip_literal(src, 0, Dialect::Lua).unwrap(), Some(7));
        assert_eq!(skip_literal("[1]", 0, Dialect::Lua).unwrap(), None);
    }

    #[test]
    fn test_unterminated_literals() {
        let err = skip_literal("x 'abc", 2, Dialect::Tag).unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.message, "expected end of string literal");

        let err = skip_literal("/* abc", 0, Dialect::Tag).unwrap_err();
        assert_eq!(err.message, "expected end of comment");

        let err = skip_literal("// abc", 0, Dialect::Tag).unwrap_err();
        assert_eq!(err.message, "expected end of line");

        let err = skip_literal("[=[ abc", 0, Dialect::Tag).unwrap_err();
        assert_eq!(err.message, "expected end of long string");
    }

    #[test]
    fn test_lua_line_comment_may_end_source() {
        assert_eq!(skip_literal("-- done", 0, Dialect::Lua).unwrap(), Some(7));
    }

    #[test]
    fn test_free_names() {
        let code = r#"__r[#__r + 1] = __e(tostring(user.name)) .. title:upper() .. "count" .. n"#;
        assert_eq!(free_names(code), vec!["user", "title", "n"]);
    }

    #[test]
    fn test_free_names_skip_keywords_and_members() {
        let code = "for i, item in ipairs(items) do local x = item.value end";
        assert_eq!(free_names(code), vec!["i", "item", "items", "x"]);
    }

    #[test]
    fn test_concatenation_is_not_member_access() {
        assert_eq!(free_names("a..b"), vec!["a", "b"]);
        assert_eq!(free_names("x = 1.5 .. y"), vec!["x", "y"]);
    }

    #[test]
    fn test_free_names_ignore_literals_and_comments() {
        let code = "-- hidden\nlocal s = 'also hidden' .. [[ hidden ]] .. shown";
        assert_eq!(free_names(code), vec!["s", "shown"]);
    }
}
