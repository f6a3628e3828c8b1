//! Runtime assembly: the ordered pieces a compile produces and how they are
//! stitched into render functions

use super::batch::{append_statement, AppendPart};
use super::codegen::{self, OUTPUT, SCOPE};
use super::include::IncludeRequest;
use crate::scanner::lexicon;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An ordered element of a render function body
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece {
    Code(String),
    /// Binds `local name = <compiled include>` once the slot is resolved
    Include { name: String, slot: usize },
    /// Binds `local name = function(locals) ... end`
    Template(Frame),
}

/// One render function being assembled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Frame {
    pub name: String,
    pub use_with: bool,
    pub pieces: Vec<Piece>,
}

impl Frame {
    pub(crate) fn new(name: impl Into<String>, use_with: bool) -> Self {
        Self {
            name: name.into(),
            use_with,
            pieces: Vec::new(),
        }
    }
}

/// Everything directive execution has produced so far
#[derive(Debug, Default)]
pub(crate) struct Assembly {
    root: Frame,
    open: Vec<Frame>,
    includes: Vec<IncludeRequest>,
}

impl Assembly {
    pub(crate) fn new(use_with: bool) -> Self {
        Self {
            root: Frame::new("", use_with),
            ..Self::default()
        }
    }

    fn current(&mut self) -> &mut Frame {
        self.open.last_mut().unwrap_or(&mut self.root)
    }

    pub(crate) fn use_with(&self) -> bool {
        self.open.last().unwrap_or(&self.root).use_with
    }

    pub(crate) fn push(&mut self, piece: Piece) {
        self.current().pieces.push(piece);
    }

    pub(crate) fn open(&mut self, frame: Frame) {
        self.open.push(frame);
    }

    /// Close the innermost template frame into its parent
    pub(crate) fn close(&mut self) -> bool {
        match self.open.pop() {
            Some(frame) => {
                self.push(Piece::Template(frame));
                true
            }
            None => false,
        }
    }

    /// Drop the innermost template frame, e.g. after its body failed
    pub(crate) fn discard(&mut self) {
        self.open.pop();
    }

    pub(crate) fn reserve(&mut self, name: String, request: IncludeRequest) -> usize {
        let slot = self.includes.len();
        self.includes.push(request);
        self.push(Piece::Include { name, slot });
        slot
    }

    pub(crate) fn finish(mut self) -> (Frame, Vec<IncludeRequest>) {
        while self.close() {}
        (self.root, self.includes)
    }
}

/// Handle for appending runtime source to the frame being assembled.
///
/// Cheap to clone; every clone feeds the same compile.
#[derive(Debug, Clone)]
pub struct Writer {
    assembly: Arc<Mutex<Assembly>>,
}

impl Writer {
    pub(crate) fn new(use_with: bool) -> Self {
        Self {
            assembly: Arc::new(Mutex::new(Assembly::new(use_with))),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Assembly> {
        self.assembly.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append raw runtime Lua source
    pub fn write(&self, code: impl Into<String>) {
        self.lock().push(Piece::Code(code.into()));
    }

    /// Append literal text to the rendered output
    pub fn output(&self, text: &str) {
        self.write(append_statement(&[AppendPart::Literal(text)]));
    }

    /// Bind `name` to a JSON value in the render function.
    ///
    /// Fails when `name` is not a usable Lua identifier.
    pub fn embed(&self, name: &str, value: &serde_json::Value) -> mlua::Result<()> {
        check_name(name)?;
        self.write(format!("local {} = {}\n", name, codegen::json_literal(value)));
        Ok(())
    }

    pub(crate) fn take(&self) -> Assembly {
        std::mem::take(&mut *self.lock())
    }
}

pub(crate) fn check_name(name: &str) -> mlua::Result<()> {
    if codegen::is_bindable(name) {
        Ok(())
    } else {
        Err(mlua::Error::runtime(format!(
            "'{}' cannot be used as a binding name",
            name
        )))
    }
}

/// Render function source for `frame`, with compiled includes bound by slot.
///
/// The implicit-scope prelude covers the names of this frame's own code only.
/// Nested functions find their parent's locals through the scope table, so a
/// frame's local count does not grow with what it includes.
pub(crate) fn assemble(frame: &Frame, includes: &[Arc<str>]) -> String {
    let mut body = String::new();
    let mut own = String::new();
    let mut nested = false;
    for piece in &frame.pieces {
        match piece {
            Piece::Code(code) => {
                body.push_str(code);
                own.push_str(code);
                own.push('\n');
            }
            Piece::Include { name, slot } => {
                let code = includes.get(*slot).map(|c| &**c).unwrap_or("nil");
                body.push_str(&format!("local {} = {}", name, code));
                nested = true;
            }
            Piece::Template(inner) => {
                body.push_str(&format!("local {} = {}", inner.name, assemble(inner, includes)));
                nested = true;
            }
        }
        if !body.ends_with('\n') {
            body.push('\n');
        }
    }

    let mut out = String::with_capacity(body.len() + 96);
    out.push_str("function(locals)\n");
    out.push_str("locals = locals or {}\n");
    out.push_str(&format!("local {} = {{}}\n", OUTPUT));
    if nested {
        out.push_str(&scope());
    }
    if frame.use_with {
        out.push_str(&prelude(&own));
    }
    out.push_str(&body);
    out.push_str(&format!("return table.concat({})\nend", OUTPUT));
    out
}

/// Lookup table over this frame's locals, then the enclosing scope
fn scope() -> String {
    format!(
        "local {0} = setmetatable({{}}, {{ __index = function(_, k) local v = locals[k] \
if v == nil and {0} then v = {0}[k] end return v end }})\n",
        SCOPE
    )
}

/// Bind every free name of `code` from `locals`, falling back to the
/// enclosing binding and then to the enclosing scope when the field is nil
fn prelude(code: &str) -> String {
    let names = lexicon::free_names(code);
    if names.is_empty() {
        return String::new();
    }

    let mut out = String::from("local __v\n");
    for name in names {
        out.push_str(&format!(
            "__v = locals.{0} if __v == nil then __v = {0} end \
if __v == nil and {1} then __v = {1}.{0} end local {0} = __v\n",
            name, SCOPE
        ));
    }
    out
}
