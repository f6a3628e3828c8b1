use crate::scanner::Position;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of compiler failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed delimiters or an unusable syntax configuration
    Syntax,
    /// An include could not be located or read
    Resolution,
    /// Compile-time directive code failed
    Directive,
    /// The compiled artifact failed to load or render
    Runtime,
    Config,
    Io,
}

/// Main error type for the template compiler
#[derive(Error, Debug)]
pub enum Error {
    #[error("{message} ({position})")]
    Syntax { message: String, position: Position },

    #[error("Invalid syntax configuration: {0}")]
    InvalidSyntax(String),

    #[error("Cannot resolve include '{request}': {reason}")]
    Resolution { request: String, reason: String },

    #[error("Failed to read template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directive error: {0}")]
    Directive(#[source] mlua::Error),

    #[error("Failed to load compiled template: {0}")]
    Load(#[source] mlua::Error),

    #[error("Render error: {0}")]
    Runtime(#[source] mlua::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Render task failed: {0}")]
    Task(String),
}

impl Error {
    pub fn syntax(message: impl Into<String>, position: Position) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    pub fn resolution(request: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            request: request.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Convert a failure that surfaced from directive execution.
    ///
    /// Errors raised by the compiler's own capability callbacks travel through
    /// Lua as external errors; they are pulled back out so callers see the
    /// original variant instead of a generic directive failure.
    pub(crate) fn from_lua(err: mlua::Error) -> Self {
        surfaced(&err).unwrap_or(Self::Directive(err))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Syntax { .. } | Error::InvalidSyntax(_) => ErrorKind::Syntax,
            Error::Resolution { .. } | Error::Read { .. } => ErrorKind::Resolution,
            Error::Directive(_) => ErrorKind::Directive,
            Error::Load(_) | Error::Runtime(_) | Error::Task(_) => ErrorKind::Runtime,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Get a stable error code for diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Syntax { .. } => "E_SYNTAX",
            Error::InvalidSyntax(_) => "E_INVALID_SYNTAX",
            Error::Resolution { .. } => "E_RESOLUTION",
            Error::Read { .. } => "E_READ",
            Error::Directive(_) => "E_DIRECTIVE",
            Error::Load(_) => "E_LOAD",
            Error::Runtime(_) => "E_RUNTIME",
            Error::Config(_) => "E_CONFIG",
            Error::Io(_) => "E_IO",
            Error::Task(_) => "E_TASK",
        }
    }

    /// Source position of the failure, when the compiler knows it
    pub fn position(&self) -> Option<Position> {
        match self {
            Error::Syntax { position, .. } => Some(*position),
            _ => None,
        }
    }

    fn replicate(&self) -> Option<Self> {
        match self {
            Error::Syntax { message, position } => Some(Error::syntax(message.clone(), *position)),
            Error::InvalidSyntax(msg) => Some(Error::InvalidSyntax(msg.clone())),
            Error::Resolution { request, reason } => {
                Some(Error::resolution(request.clone(), reason.clone()))
            }
            Error::Config(msg) => Some(Error::Config(msg.clone())),
            _ => None,
        }
    }
}

fn surfaced(err: &mlua::Error) -> Option<Error> {
    match err {
        mlua::Error::CallbackError { cause, .. } => surfaced(cause),
        mlua::Error::WithContext { cause, .. } => surfaced(cause),
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<Error>().and_then(Error::replicate),
        _ => None,
    }
}
