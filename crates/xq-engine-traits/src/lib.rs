//! Core abstractions for driving runtime-loaded XQuery engines.
//!
//! This crate defines the boundary between the adapter and a vendor
//! distribution: loading units and typed exports, the capability table with
//! its indirect-call check, the error translator, and the traits each vendor
//! binding implements.

pub mod binding;
pub mod capability;
pub mod error;
pub mod install;
pub mod model;
pub mod native;
pub mod translate;
pub mod types;

pub use binding::{
    ConnectionSettings, ContextItem, DiskFile, EngineBinding, NativeQuery, NativeSession, QueryKind,
    SessionConcurrency, SessionTarget, SessionVariant, SourceFile,
};
pub use capability::{CapabilityResolver, CapabilityTable};
pub use error::{Error, QueryError, Result, StackFrame};
pub use install::{Distribution, Installation, UnitLoader};
pub use model::{QueryResult, QueryResults, RunInfo};
pub use native::{Exception, Export, Fault, Handle, LoadingUnit, NativeResult, Property, StaticUnit, VendorException};
pub use types::{QName, SchemaVersion};
