//! Groups adjacent output fragments into single append statements

use super::codegen::{self, ESCAPE, OUTPUT};
use crate::error::Result;
use crate::scanner::{Fragment, FragmentKind};

/// One piece of an append statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendPart<'a> {
    Literal(&'a str),
    Escaped(&'a str),
    Unescaped(&'a str),
}

impl AppendPart<'_> {
    /// Lua expression producing this part's text
    pub fn to_lua(&self) -> String {
        match self {
            AppendPart::Literal(text) => codegen::string_literal(text),
            AppendPart::Escaped(expr) => format!("{}(tostring({}))", ESCAPE, expr),
            AppendPart::Unescaped(expr) => format!("tostring({})", expr),
        }
    }
}

/// Runtime statement appending `parts` to the output buffer
pub fn append_statement(parts: &[AppendPart<'_>]) -> String {
    let exprs: Vec<String> = parts.iter().map(AppendPart::to_lua).collect();
    format!("{0}[#{0} + 1] = {1}\n", OUTPUT, exprs.join(" .. "))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission<'a> {
    Append(Vec<AppendPart<'a>>),
    Directive(Fragment<'a>),
    Control(Fragment<'a>),
}

impl Emission<'_> {
    /// Runtime source for output and control emissions
    pub fn runtime_source(&self) -> Option<String> {
        match self {
            Emission::Append(parts) => Some(append_statement(parts)),
            Emission::Control(fragment) => Some(format!("{}\n", fragment.text)),
            Emission::Directive(_) => None,
        }
    }
}

/// Iterator adapter from fragments to emissions
pub struct Batcher<'a, I> {
    fragments: I,
    pending: Vec<AppendPart<'a>>,
    held: Option<Fragment<'a>>,
}

impl<'a, I> Batcher<'a, I>
where
    I: Iterator<Item = Result<Fragment<'a>>>,
{
    pub fn new(fragments: I) -> Self {
        Self {
            fragments,
            pending: Vec::new(),
            held: None,
        }
    }

    fn boundary(fragment: Fragment<'a>) -> Emission<'a> {
        match fragment.kind {
            FragmentKind::CompilerDirective => Emission::Directive(fragment),
            _ => Emission::Control(fragment),
        }
    }

    fn flush(&mut self) -> Emission<'a> {
        Emission::Append(std::mem::take(&mut self.pending))
    }
}

impl<'a, I> Iterator for Batcher<'a, I>
where
    I: Iterator<Item = Result<Fragment<'a>>>,
{
    type Item = Result<Emission<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(fragment) = self.held.take() {
            return Some(Ok(Self::boundary(fragment)));
        }

        loop {
            let fragment = match self.fragments.next() {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => return Some(Err(e)),
                None if self.pending.is_empty() => return None,
                None => return Some(Ok(self.flush())),
            };

            match fragment.kind {
                FragmentKind::Plain => self.pending.push(AppendPart::Literal(fragment.text)),
                FragmentKind::WriteEscaped => self.pending.push(AppendPart::Escaped(fragment.text)),
                FragmentKind::WriteUnescaped => {
                    self.pending.push(AppendPart::Unescaped(fragment.text))
                }
                FragmentKind::Comment => {}
                FragmentKind::CompilerDirective | FragmentKind::Control => {
                    if self.pending.is_empty() {
                        return Some(Ok(Self::boundary(fragment)));
                    }
                    self.held = Some(fragment);
                    return Some(Ok(self.flush()));
                }
            }
        }
    }
}
