//! Per-capability interfaces implemented once per vendor
//!
//! An [`EngineBinding`] is built from an installation's capability table and
//! opens [`NativeSession`]s; sessions prepare [`NativeQuery`]s. Every method
//! here may block on vendor code and is meant to be called from a worker
//! thread, never from the caller's thread.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityResolver;
use crate::error::Result;
use crate::model::{QueryResult, RunInfo};
use crate::types::SchemaVersion;

/// Language of a query's source text
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum QueryKind {
    XQuery,
    XPath,
    Xslt,
}

/// Where a session's engine instance lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionVariant {
    /// In-process, embedded engine
    Local,
    /// Socket connection to an engine server
    Client,
}

/// How an engine behaves when several queries of one session run at once.
///
/// The adapter never serializes these calls itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionConcurrency {
    /// Simultaneous queries are not safe
    Unsafe,
    /// The engine serializes simultaneous queries
    Serialized,
}

/// Settings for a client session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl ConnectionSettings {
    pub fn new<S: Into<String>>(hostname: S, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials<U: Into<String>, P: Into<String>>(mut self, username: U, password: P) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn display_string(&self) -> String {
        match &self.username {
            Some(user) => format!("{}@{}:{}", user, self.hostname, self.port),
            None => format!("{}:{}", self.hostname, self.port),
        }
    }
}

/// What a session connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    Local,
    Client(ConnectionSettings),
}

impl SessionTarget {
    pub fn variant(&self) -> SessionVariant {
        match self {
            SessionTarget::Local => SessionVariant::Local,
            SessionTarget::Client(_) => SessionVariant::Client,
        }
    }
}

/// A file whose text is decoded by the host
pub trait SourceFile: Send + Sync {
    /// Path or URI identifying the file
    fn path(&self) -> &str;

    /// The decoded text of the file
    fn decode(&self) -> io::Result<String>;
}

/// A UTF-8 file on disk.
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
    display: String,
}

impl DiskFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let display = path.display().to_string();
        Self { path, display }
    }
}

impl SourceFile for DiskFile {
    fn path(&self) -> &str {
        &self.display
    }

    fn decode(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }
}

/// The implicit context item of a query
#[derive(Clone)]
pub enum ContextItem {
    /// A raw scalar with its lexical type
    Value { value: String, type_name: String },
    /// A file decoded by the host
    File(Arc<dyn SourceFile>),
    /// A module path relative to a module root
    Module { root: PathBuf, path: String },
}

impl ContextItem {
    pub fn value<V: Into<String>, T: Into<String>>(value: V, type_name: T) -> Self {
        ContextItem::Value {
            value: value.into(),
            type_name: type_name.into(),
        }
    }

    pub fn file(file: Arc<dyn SourceFile>) -> Self {
        ContextItem::File(file)
    }

    pub fn module<R: Into<PathBuf>, P: Into<String>>(root: R, path: P) -> Self {
        ContextItem::Module {
            root: root.into(),
            path: path.into(),
        }
    }

    /// The file behind a file or module reference
    pub fn source(&self) -> Option<Arc<dyn SourceFile>> {
        match self {
            ContextItem::Value { .. } => None,
            ContextItem::File(file) => Some(Arc::clone(file)),
            ContextItem::Module { root, path } => {
                let relative = path.trim_start_matches('/');
                Some(Arc::new(DiskFile::new(root.join(relative))))
            }
        }
    }
}

impl std::fmt::Debug for ContextItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextItem::Value { value, type_name } => f
                .debug_struct("Value")
                .field("value", value)
                .field("type_name", type_name)
                .finish(),
            ContextItem::File(file) => f.debug_tuple("File").field(&file.path()).finish(),
            ContextItem::Module { root, path } => f
                .debug_struct("Module")
                .field("root", root)
                .field("path", path)
                .finish(),
        }
    }
}

/// One vendor engine, resolved from an installation.
pub trait EngineBinding: Send + Sync {
    /// Display name of the engine
    fn engine(&self) -> &str;

    /// Capability table and indirect-call boundary
    fn resolver(&self) -> &CapabilityResolver;

    /// XML Schema version used to downgrade bound types
    fn schema_version(&self) -> SchemaVersion;

    fn supports_kind(&self, kind: QueryKind) -> bool;

    fn supports_variant(&self, variant: SessionVariant) -> bool;

    fn concurrency(&self, variant: SessionVariant) -> SessionConcurrency;

    /// Create the native engine instance for a session
    fn open(&self, target: &SessionTarget) -> Result<Box<dyn NativeSession>>;
}

/// A native engine instance owned by one session.
pub trait NativeSession: Send {
    /// Compile `source` into a native query
    fn prepare(&mut self, kind: QueryKind, source: &str) -> Result<Box<dyn NativeQuery>>;

    /// Release the native instance; called at most once
    fn close(&mut self) -> Result<()>;
}

/// A native query handle.
///
/// The result cursor is destructive: once [`next`](Self::next) has returned
/// an item it cannot be produced again without calling
/// [`start`](Self::start) anew.
pub trait NativeQuery: Send {
    fn bind_variable(&mut self, name: &str, value: &str, type_name: &str) -> Result<()>;

    fn bind_context(&mut self, item: &ContextItem) -> Result<()>;

    /// Execute with the bindings applied so far
    fn start(&mut self) -> Result<()>;

    /// Pull the next result item
    fn next(&mut self) -> Result<Option<QueryResult>>;

    /// Metadata about the last run
    fn info(&mut self) -> Result<RunInfo> {
        Ok(RunInfo::default())
    }

    /// Release the native query; called at most once
    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_kind_parses_case_insensitively() {
        assert_eq!("XQuery".parse::<QueryKind>().unwrap(), QueryKind::XQuery);
        assert_eq!("xslt".parse::<QueryKind>().unwrap(), QueryKind::Xslt);
        assert_eq!(QueryKind::XPath.to_string(), "xpath");
    }

    #[test]
    fn module_context_resolves_against_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/data.xml"), "<a/>").unwrap();

        let item = ContextItem::module(dir.path(), "/lib/data.xml");
        let source = item.source().unwrap();
        assert_eq!(source.decode().unwrap(), "<a/>");
        assert!(source.path().ends_with("data.xml"));
    }

    #[test]
    fn scalar_context_has_no_source() {
        assert!(ContextItem::value("1", "xs:integer").source().is_none());
    }

    #[test]
    fn connection_display_hides_password() {
        let settings = ConnectionSettings::new("localhost", 1984).with_credentials("admin", "secret");
        assert_eq!(settings.display_string(), "admin@localhost:1984");
    }
}
