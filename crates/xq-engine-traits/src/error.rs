//! Error types for engine adapter operations

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::binding::{QueryKind, SessionVariant};
use crate::native::Fault;

/// Result type for engine adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all engine adapter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured distribution does not exist
    #[error("Distribution not found: {}", .0.display())]
    MissingDistribution(PathBuf),

    /// The distribution exists but lacks a capability the adapter needs
    #[error("Unsupported distribution {distribution}: {reason}")]
    UnsupportedDistribution {
        distribution: String,
        reason: String,
    },

    /// The engine has no session of the requested variant
    #[error("{engine} does not provide {variant} sessions")]
    UnsupportedEngineVariant {
        engine: String,
        variant: SessionVariant,
    },

    /// The engine cannot run this kind of query
    #[error("{engine} cannot run {kind} queries")]
    UnsupportedQueryType { engine: String, kind: QueryKind },

    /// The engine explicitly refused the call
    #[error("Operation not supported by the engine: {0}")]
    UnsupportedOperation(String),

    /// The remote host cannot be resolved or reached
    #[error("Host unreachable: {0}")]
    HostUnreachable(String),

    /// A query failed inside the engine
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A native failure the adapter does not recognize
    #[error(transparent)]
    Native(Fault),

    /// The session or query was already closed
    #[error("{0} is closed")]
    Closed(&'static str),

    /// The worker running the call was cancelled
    #[error("Worker task was cancelled")]
    Cancelled,

    /// Processor configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new unsupported distribution error
    pub fn unsupported_distribution<D: Into<String>, R: Into<String>>(
        distribution: D,
        reason: R,
    ) -> Self {
        Error::UnsupportedDistribution {
            distribution: distribution.into(),
            reason: reason.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// The translated query error, if this is one
    pub fn as_query_error(&self) -> Option<&QueryError> {
        match self {
            Error::Query(e) => Some(e),
            _ => None,
        }
    }

    /// Attach `path` to a query error that carries no usable location.
    pub fn with_fallback_path(self, path: Option<&str>) -> Self {
        match (self, path) {
            (Error::Query(e), Some(path)) => Error::Query(e.with_fallback_path(path)),
            (other, _) => other,
        }
    }
}

/// Source location of an error, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    pub path: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl StackFrame {
    pub fn new(path: Option<String>, line: Option<u32>, column: Option<u32>) -> Self {
        Self { path, line, column }
    }

    /// A frame that only names the file.
    pub fn path_only<S: Into<String>>(path: S) -> Self {
        Self {
            path: Some(path.into()),
            line: None,
            column: None,
        }
    }

    pub fn is_located(&self) -> bool {
        self.path.is_some() || self.line.is_some()
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path.as_deref().unwrap_or("<query>"))?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
            if let Some(column) = self.column {
                write!(f, ":{}", column)?;
            }
        }
        Ok(())
    }
}

/// A query failure normalized across vendors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryError {
    /// `localName` for standard errors, `prefix:localName` otherwise
    pub standard_code: String,
    /// The code as the vendor identified it, for errors outside the standard
    /// namespace: `Q{namespace}localName` when the namespace is known,
    /// otherwise the code text the vendor printed.
    pub vendor_code: Option<String>,
    pub description: Option<String>,
    pub frames: Vec<StackFrame>,
}

impl QueryError {
    pub fn new<S: Into<String>>(standard_code: S) -> Self {
        Self {
            standard_code: standard_code.into(),
            vendor_code: None,
            description: None,
            frames: Vec::new(),
        }
    }

    pub fn with_vendor_code<S: Into<String>>(mut self, code: S) -> Self {
        self.vendor_code = Some(code.into());
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        let description = description.into();
        self.description = if description.is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }

    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.frames.push(frame);
        self
    }

    /// The innermost frame.
    pub fn location(&self) -> Option<&StackFrame> {
        self.frames.first()
    }

    /// Replace unlocated frames with a path-only frame for `path`.
    pub fn with_fallback_path<S: Into<String>>(mut self, path: S) -> Self {
        if !self.frames.iter().any(StackFrame::is_located) {
            self.frames = vec![StackFrame::path_only(path)];
        }
        self
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.standard_code)?;
        if let Some(description) = &self.description {
            write!(f, " {}", description)?;
        }
        if let Some(frame) = self.location().filter(|frame| frame.is_located()) {
            write!(f, " at {}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {}
