//! xq-engine: unified XQuery/XPath/XSLT execution over runtime-loaded engines
//!
//! Resolves a vendor distribution (BaseX or Saxon) into an [`Engine`], opens
//! [`Session`]s on it and runs [`Query`]s on a worker pool. Every blocking
//! native call happens on a worker; callers get a [`Pending`] back.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use xq_engine::{Backend, Engine, Installation, QueryKind};
//!
//! let engine = Engine::resolve(Backend::Basex, &Installation::from_unit(unit), None)?;
//! let session = engine.create_session()?;
//! let query = session.query(QueryKind::XQuery, "declare variable $n external; 1 to $n")?;
//! query.bind_variable("n", "3", "xs:integer")?;
//! let results = query.execute().get()?;
//! println!("{}", results.to_text());
//! ```

pub mod config;
pub mod query;
pub mod results;
pub mod scheduler;
pub mod session;
pub mod unified;

// Re-export core types
pub use xq_engine_traits::{
    ConnectionSettings, ContextItem, DiskFile, Error, Installation, QName, QueryError, QueryKind, QueryResult,
    QueryResults, Result, RunInfo, SchemaVersion, SessionConcurrency, SessionVariant, SourceFile, StackFrame,
    UnitLoader,
};

pub use config::{ConfigIssue, ProcessorConfig, ProcessorsConfig};
pub use query::Query;
pub use results::ResultIterator;
pub use scheduler::{Pending, Scheduler};
pub use session::Session;
pub use unified::{Backend, Engine};
