//! Delimiter-aware scanner
//!
//! Splits a template into plain text and tagged code fragments. It is the only
//! stage that knows the delimiter syntax.

pub(crate) mod lexicon;
mod source;
mod syntax;

pub use source::{Position, Source};
pub use syntax::Syntax;

use crate::error::Result;
use lexicon::Dialect;

/// What a fragment of template text is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// Literal output text
    Plain,
    /// Code executed at compile time
    CompilerDirective,
    /// Expression written with escaping
    WriteEscaped,
    /// Expression written verbatim
    WriteUnescaped,
    /// Code emitted verbatim into the render function
    Control,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub kind: FragmentKind,
    pub text: &'a str,
    /// Byte offset of `text`, or of the open tag for an escaped delimiter
    pub offset: usize,
}

impl<'a> Fragment<'a> {
    pub fn new(kind: FragmentKind, text: &'a str, offset: usize) -> Self {
        Self { kind, text, offset }
    }

    pub fn position(&self, src: &str) -> Position {
        Position::locate(src, self.offset)
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Text,
    Tag { open_at: usize },
    Done,
}

/// Iterator over the fragments of a template. Comments are skipped.
///
/// Fragments borrow the source only, so they outlive the syntax borrow.
pub struct Scanner<'a, 's> {
    source: Source<'a>,
    syntax: &'s Syntax,
    pos: usize,
    state: State,
}

/// Scan `src` with the given syntax
pub fn scan<'a, 's>(src: &'a str, syntax: &'s Syntax) -> Scanner<'a, 's> {
    Scanner::new(src, syntax)
}

impl<'a, 's> Scanner<'a, 's> {
    pub fn new(src: &'a str, syntax: &'s Syntax) -> Self {
        Self {
            source: Source::new(src),
            syntax,
            pos: 0,
            state: State::Text,
        }
    }

    pub fn source(&self) -> Source<'a> {
        self.source
    }

    /// Collect every fragment, stopping at the first error
    pub fn collect_fragments(self) -> Result<Vec<Fragment<'a>>> {
        self.collect()
    }

    fn next_fragment(&mut self) -> Result<Option<Fragment<'a>>> {
        let src = self.source.text();
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::Text => {
                    if self.pos >= src.len() {
                        self.state = State::Done;
                        return Ok(None);
                    }

                    let start = self.pos;
                    match src[start..].find(self.syntax.open.as_str()) {
                        None => {
                            self.pos = src.len();
                            self.state = State::Done;
                            return Ok(Some(Fragment::new(
                                FragmentKind::Plain,
                                &src[start..],
                                start,
                            )));
                        }
                        Some(rel) => {
                            let open_at = start + rel;
                            self.pos = open_at + self.syntax.open.len();
                            self.state = State::Tag { open_at };
                            if rel > 0 {
                                return Ok(Some(Fragment::new(
                                    FragmentKind::Plain,
                                    &src[start..open_at],
                                    start,
                                )));
                            }
                        }
                    }
                }
                State::Tag { open_at } => {
                    self.state = State::Text;
                    return self.scan_tag(open_at).map(Some);
                }
            }
        }
    }

    fn scan_tag(&mut self, open_at: usize) -> Result<Fragment<'a>> {
        let syntax = self.syntax;
        let c = self.source.text()[self.pos..]
            .chars()
            .next()
            .ok_or_else(|| self.source.error_at(open_at, "expected close tag"))?;

        let kind = if c == syntax.compiler_control {
            Some(FragmentKind::CompilerDirective)
        } else if c == syntax.write_escaped {
            Some(FragmentKind::WriteEscaped)
        } else if c == syntax.write_unescaped {
            Some(FragmentKind::WriteUnescaped)
        } else {
            None
        };

        if let Some(kind) = kind {
            self.pos += c.len_utf8();
            return self.scan_code(kind, open_at);
        }

        if c == syntax.comment {
            self.pos += c.len_utf8();
            return self.scan_comment(open_at);
        }

        if Some(c) == syntax.escape_sigil() {
            self.pos += c.len_utf8();
            let open = &self.source.text()[open_at..open_at + syntax.open.len()];
            return Ok(Fragment::new(FragmentKind::Plain, open, open_at));
        }

        self.scan_code(FragmentKind::Control, open_at)
    }

    fn scan_code(&mut self, kind: FragmentKind, open_at: usize) -> Result<Fragment<'a>> {
        let src = self.source.text();
        let close = self.syntax.close.as_str();
        let start = self.pos;

        while self.pos < src.len() {
            match lexicon::skip_literal(src, self.pos, Dialect::Tag) {
                Ok(Some(end)) => {
                    self.pos = end;
                    continue;
                }
                Ok(None) => {}
                Err(e) => return Err(self.source.error_at(e.offset, e.message)),
            }

            if src[self.pos..].starts_with(close) {
                let text = &src[start..self.pos];
                self.pos += close.len();
                return Ok(Fragment::new(kind, text, start));
            }

            self.pos += src[self.pos..].chars().next().map_or(1, char::len_utf8);
        }

        Err(self.source.error_at(open_at, "expected close tag"))
    }

    fn scan_comment(&mut self, open_at: usize) -> Result<Fragment<'a>> {
        let src = self.source.text();
        let start = self.pos;
        match src[start..].find(self.syntax.close.as_str()) {
            Some(rel) => {
                self.pos = start + rel + self.syntax.close.len();
                Ok(Fragment::new(
                    FragmentKind::Comment,
                    &src[start..start + rel],
                    start,
                ))
            }
            None => Err(self.source.error_at(open_at, "expected close tag")),
        }
    }
}

impl<'a> Iterator for Scanner<'a, '_> {
    type Item = Result<Fragment<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_fragment() {
                Ok(Some(fragment)) if fragment.kind == FragmentKind::Comment => continue,
                Ok(Some(fragment)) => return Some(Ok(fragment)),
                Ok(None) => return None,
                Err(e) => {
                    self.state = State::Done;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use FragmentKind::*;

    fn fragments(src: &str) -> Vec<(FragmentKind, String)> {
        fragments_with(src, &Syntax::default())
    }

    fn fragments_with(src: &str, syntax: &Syntax) -> Vec<(FragmentKind, String)> {
        scan(src, syntax)
            .collect_fragments()
            .unwrap()
            .into_iter()
            .map(|f| (f.kind, f.text.to_string()))
            .collect()
    }

    fn frag(kind: FragmentKind, text: &str) -> (FragmentKind, String) {
        (kind, text.to_string())
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(fragments("just text"), vec![frag(Plain, "just text")]);
        assert!(fragments("").is_empty());
    }

    #[test]
    fn test_control() {
        assert_eq!(
            fragments("a {{ b }} c"),
            vec![frag(Plain, "a "), frag(Control, " b "), frag(Plain, " c")]
        );
    }

    #[test]
    fn test_writes_and_directive() {
        assert_eq!(
            fragments("{{= a }}{{- b }}{{: c }}"),
            vec![
                frag(WriteEscaped, " a "),
                frag(WriteUnescaped, " b "),
                frag(CompilerDirective, " c "),
            ]
        );
    }

    #[test]
    fn test_comment_is_dropped() {
        assert_eq!(
            fragments("a {{# secret }} b"),
            vec![frag(Plain, "a "), frag(Plain, " b")]
        );
    }

    #[test]
    fn test_comment_ignores_literals() {
        assert_eq!(fragments("{{# it's }}x"), vec![frag(Plain, "x")]);
    }

    #[test]
    fn test_close_tag_inside_literals() {
        assert_eq!(
            fragments("a{{ '}}' }}b"),
            vec![frag(Plain, "a"), frag(Control, " '}}' "), frag(Plain, "b")]
        );
        assert_eq!(
            fragments(r#"{{= "\"}}" }}"#),
            vec![frag(WriteEscaped, r#" "\"}}" "#)]
        );
        assert_eq!(
            fragments("{{ x = [[}}]] }}"),
            vec![frag(Control, " x = [[}}]] ")]
        );
    }

    #[test]
    fn test_close_tag_inside_code_comments() {
        assert_eq!(
            fragments("{{ a /* }} */ }}"),
            vec![frag(Control, " a /* }} */ ")]
        );
        assert_eq!(
            fragments("{{ a -- }}\n}}"),
            vec![frag(Control, " a -- }}\n")]
        );
    }

    #[test]
    fn test_escaped_open_tag() {
        assert_eq!(
            fragments("a{{{b"),
            vec![frag(Plain, "a"), frag(Plain, "{{"), frag(Plain, "b")]
        );
    }

    #[test]
    fn test_custom_escape_sigil() {
        let syntax = Syntax::default().with_escape('?');
        assert_eq!(
            fragments_with("a{{?b", &syntax),
            vec![frag(Plain, "a"), frag(Plain, "{{"), frag(Plain, "b")]
        );
        // '{' is an ordinary control fragment start now
        assert_eq!(
            fragments_with("{{{ x }}", &syntax),
            vec![frag(Control, "{ x ")]
        );
    }

    #[test]
    fn test_mixed() {
        assert_eq!(
            fragments("a{{: b }}c{{= d }}{{{{{# e }}f"),
            vec![
                frag(Plain, "a"),
                frag(CompilerDirective, " b "),
                frag(Plain, "c"),
                frag(WriteEscaped, " d "),
                frag(Plain, "{{"),
                frag(Plain, "f"),
            ]
        );
    }

    #[test]
    fn test_custom_syntax() {
        let syntax = Syntax {
            open: "<%".into(),
            close: "%>".into(),
            compiler_control: '!',
            write_escaped: ':',
            write_unescaped: '~',
            comment: '/',
            escape: None,
        };
        assert_eq!(
            fragments_with("<%! a %><%: b %><%~ c %><%/ d %><% e %><%%>", &syntax),
            vec![
                frag(CompilerDirective, " a "),
                frag(WriteEscaped, " b "),
                frag(WriteUnescaped, " c "),
                frag(Control, " e "),
                frag(Plain, "<%"),
                frag(Plain, ">"),
            ]
        );
    }

    #[test]
    fn test_offsets() {
        let src = "ab{{= c }}";
        let all = scan(src, &Syntax::default()).collect_fragments().unwrap();
        assert_eq!(all[0].offset, 0);
        assert_eq!(all[1].offset, 5);
        assert_eq!(&src[all[1].offset..all[1].offset + all[1].text.len()], " c ");
    }

    #[test]
    fn test_unclosed_tag() {
        let err = scan("line\n  {{= value", &Syntax::default())
            .collect_fragments()
            .unwrap_err();
        match err {
            Error::Syntax { message, position } => {
                assert_eq!(message, "expected close tag");
                assert_eq!((position.line, position.column), (2, 3));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_open_tag_at_end() {
        let err = scan("a{{", &Syntax::default())
            .collect_fragments()
            .unwrap_err();
        assert_eq!(err.position().map(|p| p.column), Some(2));
    }

    #[test]
    fn test_unterminated_string() {
        let err = scan("a {{= 'oops }}", &Syntax::default())
            .collect_fragments()
            .unwrap_err();
        match err {
            Error::Syntax { message, position } => {
                assert_eq!(message, "expected end of string literal");
                assert_eq!(position.column, 7);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_comment() {
        let err = scan("{{# never closed", &Syntax::default())
            .collect_fragments()
            .unwrap_err();
        assert!(err.to_string().contains("expected close tag"));
    }

    #[test]
    fn test_fragments_outlive_syntax() {
        let src = String::from("x{{{y");
        let all = {
            let syntax = Syntax::default();
            scan(&src, &syntax).collect_fragments().unwrap()
        };
        assert_eq!(all[1].text, "{{");
        assert_eq!(all[1].offset, 1);
    }

    #[test]
    fn test_iteration_stops_after_error() {
        let syntax = Syntax::default();
        let mut scanner = scan("a{{ 'x", &syntax);
        assert!(matches!(scanner.next(), Some(Ok(_))));
        assert!(matches!(scanner.next(), Some(Err(_))));
        assert!(scanner.next().is_none());
    }
}
