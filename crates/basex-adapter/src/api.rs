//! Signatures and symbol names of the BaseX API
//!
//! BaseX 7 published its client API under `basex::server`; later releases
//! moved it to `basex::api::client`. Both families are probed, newest first.

use std::sync::Arc;

use xq_engine_traits::{CapabilityTable, Handle, LoadingUnit, NativeResult, Result};

/// An item as returned by `Query::next`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub value: String,
    pub type_name: String,
}

impl RawItem {
    pub fn new<V: Into<String>, T: Into<String>>(value: V, type_name: T) -> Self {
        Self {
            value: value.into(),
            type_name: type_name.into(),
        }
    }
}

/// `Context::new(config)`: the embedded engine state
pub type NewContext = dyn Fn(Option<&[u8]>) -> NativeResult<Handle> + Send + Sync;
/// `LocalSession::new(context)`
pub type NewLocalSession = dyn Fn(&mut Handle) -> NativeResult<Handle> + Send + Sync;
/// `ClientSession::new(host, port, user, password)`
pub type NewClientSession = dyn Fn(&str, u16, &str, &str) -> NativeResult<Handle> + Send + Sync;
/// `Session::query(session, source)`
pub type SessionQuery = dyn Fn(&mut Handle, &str) -> NativeResult<Handle> + Send + Sync;
/// `Session::close` and `Query::close`
pub type Close = dyn Fn(&mut Handle) -> NativeResult<()> + Send + Sync;
/// `Query::bind(query, name, value, type)`
pub type QueryBind = dyn Fn(&mut Handle, &str, &str, &str) -> NativeResult<()> + Send + Sync;
/// `Query::context(query, value, type)`
pub type QueryContext = dyn Fn(&mut Handle, &str, &str) -> NativeResult<()> + Send + Sync;
/// `Query::next(query)`: executes on first call
pub type QueryNext = dyn Fn(&mut Handle) -> NativeResult<Option<RawItem>> + Send + Sync;
/// `Query::info(query)`: the free-text query info block
pub type QueryInfo = dyn Fn(&mut Handle) -> NativeResult<String> + Send + Sync;

pub const CONTEXT_NEW: &str = "context.new";
pub const LOCAL_SESSION_NEW: &str = "local-session.new";
pub const CLIENT_SESSION_NEW: &str = "client-session.new";
pub const SESSION_QUERY: &str = "session.query";
pub const SESSION_CLOSE: &str = "session.close";
pub const QUERY_BIND: &str = "query.bind";
pub const QUERY_CONTEXT: &str = "query.context";
pub const QUERY_NEXT: &str = "query.next";
pub const QUERY_INFO: &str = "query.info";
pub const QUERY_CLOSE: &str = "query.close";
pub const QUERY_EXCEPTION: &str = "query-exception";
pub const BASEX_EXCEPTION: &str = "basex-exception";

/// Resolve every capability the adapter uses.
pub(crate) fn table(unit: Arc<dyn LoadingUnit>) -> Result<CapabilityTable> {
    CapabilityTable::builder(unit)
        .require::<NewContext>(CONTEXT_NEW, &["basex::core::Context::new"])
        .require::<NewLocalSession>(
            LOCAL_SESSION_NEW,
            &["basex::api::client::LocalSession::new", "basex::server::LocalSession::new"],
        )
        .require::<NewClientSession>(
            CLIENT_SESSION_NEW,
            &["basex::api::client::ClientSession::new", "basex::server::ClientSession::new"],
        )
        .require::<SessionQuery>(
            SESSION_QUERY,
            &["basex::api::client::Session::query", "basex::server::Session::query"],
        )
        .require::<Close>(
            SESSION_CLOSE,
            &["basex::api::client::Session::close", "basex::server::Session::close"],
        )
        .require::<QueryBind>(
            QUERY_BIND,
            &["basex::api::client::Query::bind", "basex::server::Query::bind"],
        )
        .require::<QueryContext>(
            QUERY_CONTEXT,
            &["basex::api::client::Query::context", "basex::server::Query::context"],
        )
        .require::<QueryNext>(
            QUERY_NEXT,
            &["basex::api::client::Query::next", "basex::server::Query::next"],
        )
        .optional::<QueryInfo>(
            QUERY_INFO,
            &["basex::api::client::Query::info", "basex::server::Query::info"],
        )
        .require::<Close>(
            QUERY_CLOSE,
            &["basex::api::client::Query::close", "basex::server::Query::close"],
        )
        .error_type(QUERY_EXCEPTION, &["basex::query::QueryException"])
        .error_type(BASEX_EXCEPTION, &["basex::core::BaseXException"])
        .build()
}
