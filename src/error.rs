use std::borrow::Cow;
use std::fmt;

/// Represents template errors.
///
/// Errors carry the kind of failure, an optional human readable detail, and
/// when raised during lexing, parsing or rendering also the name of the
/// template and the line/column of the failing construct.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    name: Option<String>,
    lineno: usize,
    column: usize,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for Error {}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A delimiter, string literal or number could not be tokenized.
    Lexical,
    /// The template has a syntax error.
    Syntax,
    /// A template was not found.
    TemplateNotFound,
    /// A template could not be loaded (loader I/O failure).
    TemplateLoad,
    /// A strict undefined value was used.
    UndefinedError,
    /// An operation was performed on unsupported operand types.
    TypeError,
    /// Attempted to call something that is not callable.
    NotCallable,
    /// A filter, test or function received invalid arguments.
    InvalidArgument,
    /// A filter is unknown.
    UnknownFilter,
    /// A test is unknown.
    UnknownTest,
    /// A sandboxed environment refused to invoke an unsafe callable.
    SecurityError,
    /// The render was cancelled through a cancellation token.
    Cancelled,
    /// Template inheritance, includes or macro calls recursed too deep.
    Recursion,
    /// A value could not be serialized into the internal format.
    BadSerialization,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::Lexical => "could not tokenize",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::TemplateLoad => "could not load template",
            ErrorKind::UndefinedError => "undefined value",
            ErrorKind::TypeError => "invalid operation",
            ErrorKind::NotCallable => "value is not callable",
            ErrorKind::InvalidArgument => "invalid arguments",
            ErrorKind::UnknownFilter => "unknown filter",
            ErrorKind::UnknownTest => "unknown test",
            ErrorKind::SecurityError => "operation not permitted in sandbox",
            ErrorKind::Cancelled => "render cancelled",
            ErrorKind::Recursion => "recursion limit exceeded",
            ErrorKind::BadSerialization => "could not serialize to internal format",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref detail) = self.detail {
            ok!(write!(f, "{}: {}", self.kind, detail));
        } else {
            ok!(write!(f, "{}", self.kind));
        }
        if let Some(ref name) = self.name {
            ok!(write!(f, " (in {}:{}", name, self.lineno));
            if self.column > 0 {
                ok!(write!(f, ":{}", self.column));
            }
            ok!(write!(f, ")"));
        }
        Ok(())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            kind,
            detail: Some(detail.into()),
            name: None,
            lineno: 0,
            column: 0,
            source: None,
        }
    }

    /// Creates a `TemplateNotFound` error for the given name.
    pub(crate) fn new_not_found(name: &str) -> Error {
        Error::new(
            ErrorKind::TemplateNotFound,
            format!("template {name:?} does not exist"),
        )
    }

    pub(crate) fn set_location(&mut self, name: &str, lineno: usize, column: usize) {
        if self.name.is_none() {
            self.name = Some(name.into());
            self.lineno = lineno;
            self.column = column;
        }
    }

    pub(crate) fn with_location(mut self, name: &str, lineno: usize, column: usize) -> Error {
        self.set_location(name, lineno, column);
        self
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the detail message if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the name of the template that failed.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the line of the failing construct.
    pub fn line(&self) -> Option<usize> {
        self.name.as_ref().map(|_| self.lineno)
    }

    /// Returns the column of the failing construct.
    pub fn column(&self) -> Option<usize> {
        self.name.as_ref().map(|_| self.column)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            detail: None,
            name: None,
            lineno: 0,
            column: 0,
            source: None,
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::new(ErrorKind::BadSerialization, "formatting failed")
    }
}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Error::new(ErrorKind::BadSerialization, msg.to_string())
    }
}
