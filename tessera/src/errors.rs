//! The Tessera error type, with optional nice terminal error reporting.
use std::fmt::{self};

use crate::reporting::generate_report;
use std::error::Error as StdError;

use crate::utils::Span;

/// Where in a template an error happened.
///
/// Only present on errors coming from templates compiled in debug mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportError {
    pub(crate) filename: String,
    pub(crate) source: String,
    pub(crate) span: Span,
}

impl ReportError {
    pub fn new(filename: &str, source: &str, span: &Span) -> Self {
        Self {
            filename: filename.to_string(),
            source: source.to_string(),
            span: span.clone(),
        }
    }

    /// Create a ReportError without filename/source - must call set_source before generating report
    pub fn new_without_source(span: &Span) -> Self {
        Self {
            filename: String::new(),
            source: String::new(),
            span: span.clone(),
        }
    }

    pub fn set_source(&mut self, filename: &str, source: &str) {
        self.filename = filename.to_string();
        self.source = source.to_string();
    }

    pub(crate) fn has_source(&self) -> bool {
        !self.source.is_empty()
    }

    /// The name of the template the error points to
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn generate_report(&self, message: &str) -> String {
        generate_report(message, self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Generic error
    Msg(String),
    /// Lexer, parser and tag compiler errors
    SyntaxError(String),
    /// A loop was found while looking up the inheritance chain
    CircularExtend {
        /// Name of the template with the loop
        tpl: String,
        /// All the parents templates we found so far
        inheritance_chain: Vec<String>,
    },
    /// A template was missing
    TemplateNotFound(String),
    /// `Context::pop` was called on the root frame
    ContextPop,
    /// A filter main value or argument was not the expected type
    InvalidArgument {
        expected_type: String,
        actual_type: String,
    },
    /// A filter was expecting an argument but it wasn't given
    MissingArgument { filter: String },
    /// An IO error occurred
    Io(std::io::ErrorKind),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Msg(ref message) => write!(f, "{message}"),
            ErrorKind::SyntaxError(ref message) => write!(f, "{message}"),
            ErrorKind::CircularExtend {
                ref tpl,
                ref inheritance_chain,
            } => write!(
                f,
                "Circular extend detected for template '{tpl}'. Inheritance chain: `{inheritance_chain:?}`",
            ),
            ErrorKind::TemplateNotFound(ref name) => write!(f, "Template '{name}' not found"),
            ErrorKind::ContextPop => write!(f, "pop called more often than push"),
            ErrorKind::InvalidArgument {
                ref expected_type,
                ref actual_type,
            } => write!(
                f,
                "Invalid type for the value, expected `{expected_type}` but got `{actual_type}`"
            ),
            ErrorKind::MissingArgument { ref filter } => {
                write!(f, "Filter `{filter}` is missing its argument")
            }
            ErrorKind::Io(ref io_error) => {
                write!(f, "Io error while loading a template: {:?}", io_error)
            }
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub(crate) location: Option<Box<ReportError>>,
    // If the error comes from some third party libs
    pub(crate) source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(ref loc) if loc.has_source() => {
                write!(f, "{}", loc.generate_report(&self.kind.to_string()))
            }
            _ => write!(f, "{}", self.kind),
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: None,
            source: None,
        }
    }

    /// Creates generic error with a source
    pub fn chain(value: impl ToString, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            kind: ErrorKind::Msg(value.to_string()),
            location: None,
            source: Some(source.into()),
        }
    }

    pub fn message(message: impl ToString) -> Self {
        Self::new(ErrorKind::Msg(message.to_string()))
    }

    /// The error every tag compiler raises for malformed input
    pub fn syntax(message: impl ToString) -> Self {
        Self::new(ErrorKind::SyntaxError(message.to_string()))
    }

    pub fn is_syntax_error(&self) -> bool {
        matches!(self.kind, ErrorKind::SyntaxError(_))
    }

    /// The source location of the error, if the template was compiled in debug mode.
    pub fn location(&self) -> Option<&ReportError> {
        self.location.as_deref()
    }

    /// Attaches a span if the error doesn't point anywhere yet.
    pub(crate) fn with_span(mut self, span: Option<&Span>) -> Self {
        if self.location.is_none() {
            if let Some(span) = span {
                self.location = Some(Box::new(ReportError::new_without_source(span)));
            }
        }
        self
    }

    /// Fills the template name and source of a location that doesn't have them yet.
    pub(crate) fn with_source(mut self, filename: &str, source: &str) -> Self {
        if let Some(ref mut loc) = self.location {
            if !loc.has_source() {
                loc.set_source(filename, source);
            }
        }
        self
    }

    pub(crate) fn circular_extend(tpl: impl ToString, inheritance_chain: Vec<String>) -> Self {
        Self::new(ErrorKind::CircularExtend {
            tpl: tpl.to_string(),
            inheritance_chain,
        })
    }

    pub(crate) fn io_error(error: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::Io(error.kind()),
            location: None,
            source: Some(Box::new(error)),
        }
    }

    pub(crate) fn template_not_found(tpl: impl ToString) -> Self {
        Self::new(ErrorKind::TemplateNotFound(tpl.to_string()))
    }

    pub(crate) fn context_pop() -> Self {
        Self::new(ErrorKind::ContextPop)
    }

    pub(crate) fn invalid_arg_type(
        expected_type: impl ToString,
        actual_type: impl ToString,
    ) -> Self {
        Self::new(ErrorKind::InvalidArgument {
            expected_type: expected_type.to_string(),
            actual_type: actual_type.to_string(),
        })
    }

    pub(crate) fn missing_arg(filter: impl ToString) -> Self {
        Self::new(ErrorKind::MissingArgument {
            filter: filter.to_string(),
        })
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::io_error(error)
    }
}

pub type TesseraResult<T> = Result<T, Error>;
