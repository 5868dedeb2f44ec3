//! Structured document errors
//!
//! Every failure raised while resolving or building a document is a
//! [`DocumentError`]: a kind tag, a message, an optional shared cause and an
//! [`ErrorStack`] of document frames. Frames are ordered origin first; each
//! enclosing document that sees the failure pass through an include appends
//! its own frame, so the final error reads like a stack trace across document
//! boundaries.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Shared, cloneable error cause
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The source provider has no document with this name
    NotFound,
    /// A document transitively included itself
    DependencyLoop,
    /// The language adapter rejected the source text
    Parsing,
    /// The language adapter parsed the source but could not prepare it
    Preparation,
    /// No adapter is registered for the document's tag
    LanguageAdapterMissing,
    /// The provider knows the name but could not read it
    Source,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::DependencyLoop => "dependency_loop",
            Self::Parsing => "parsing",
            Self::Preparation => "preparation",
            Self::LanguageAdapterMissing => "language_adapter_missing",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position inside a document (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Position {
    pub const UNKNOWN: Position = Position {
        line: None,
        column: None,
    };

    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
        }
    }
}

/// One document frame of an error stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    pub document: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ErrorFrame {
    pub fn new(document: impl Into<String>, position: Position) -> Self {
        Self {
            document: document.into(),
            line: position.line,
            column: position.column,
        }
    }

    /// Frame for a failure reported only by document name
    pub fn unknown(document: impl Into<String>) -> Self {
        Self::new(document, Position::UNKNOWN)
    }

    /// Line number, with `-1` standing in for unknown
    pub fn line_number(&self) -> i64 {
        self.line.map_or(-1, i64::from)
    }

    /// Column number, with `-1` standing in for unknown
    pub fn column_number(&self) -> i64 {
        self.column.map_or(-1, i64::from)
    }
}

impl fmt::Display for ErrorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.document,
            self.line_number(),
            self.column_number()
        )
    }
}

/// Ordered frames, origin first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorStack {
    frames: Vec<ErrorFrame>,
}

impl ErrorStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: ErrorFrame) {
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[ErrorFrame] {
        &self.frames
    }

    /// The frame where the failure originated
    pub fn origin(&self) -> Option<&ErrorFrame> {
        self.frames.first()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl fmt::Display for ErrorStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "  at {}", frame)?;
        }
        Ok(())
    }
}

/// Failure while resolving, building or including a document
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct DocumentError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Cause>,
    stack: ErrorStack,
}

impl DocumentError {
    fn with_origin(kind: ErrorKind, message: String, origin: ErrorFrame, cause: Option<Cause>) -> Self {
        let mut stack = ErrorStack::new();
        stack.push(origin);
        Self {
            kind,
            message,
            cause,
            stack,
        }
    }

    pub fn not_found(document: &str) -> Self {
        Self::with_origin(
            ErrorKind::NotFound,
            format!("Document not found: {}", document),
            ErrorFrame::unknown(document),
            None,
        )
    }

    /// `chain` lists the in-flight documents, origin first; `repeated` is the
    /// name that closed the loop.
    pub fn dependency_loop(chain: &[String], repeated: &str) -> Self {
        let mut path: Vec<&str> = chain.iter().map(String::as_str).collect();
        path.push(repeated);
        Self::with_origin(
            ErrorKind::DependencyLoop,
            format!("Dependency loop detected: {}", path.join(" -> ")),
            ErrorFrame::unknown(repeated),
            None,
        )
    }

    pub fn parsing(document: &str, position: Position, message: impl Into<String>) -> Self {
        Self::with_origin(
            ErrorKind::Parsing,
            format!("Failed to parse {}: {}", document, message.into()),
            ErrorFrame::new(document, position),
            None,
        )
    }

    pub fn preparation(document: &str, message: impl Into<String>, cause: Option<Cause>) -> Self {
        Self::with_origin(
            ErrorKind::Preparation,
            format!("Failed to prepare {}: {}", document, message.into()),
            ErrorFrame::unknown(document),
            cause,
        )
    }

    pub fn adapter_missing(document: &str, tag: &str) -> Self {
        Self::with_origin(
            ErrorKind::LanguageAdapterMissing,
            format!("No language adapter registered for tag '{}' ({})", tag, document),
            ErrorFrame::unknown(document),
            None,
        )
    }

    pub fn source_unavailable<E>(document: &str, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::with_origin(
            ErrorKind::Source,
            format!("Failed to read source of {}: {}", document, cause),
            ErrorFrame::unknown(document),
            Some(Arc::new(cause)),
        )
    }

    /// Append the frame of an enclosing document
    pub fn push_frame(&mut self, frame: ErrorFrame) {
        self.stack.push(frame);
    }

    pub fn with_frame(mut self, frame: ErrorFrame) -> Self {
        self.push_frame(frame);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    pub fn stack(&self) -> &ErrorStack {
        &self.stack
    }

    /// Document the failure originated in
    pub fn document(&self) -> Option<&str> {
        self.stack.origin().map(|frame| frame.document.as_str())
    }

    /// Message followed by the document stack, one frame per line
    pub fn report(&self) -> String {
        format!("{}\n{}", self.message, self.stack)
    }
}
