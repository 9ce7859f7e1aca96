//! BaseX engine binding
//!
//! Local sessions share one embedded `Context` per installation, created on
//! first use. Client sessions talk to a BaseX server and never touch it.
//! Errors come back as free-text diagnostics and go through
//! [`translate::from_diagnostic`].

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use xq_engine_traits::{
    translate, CapabilityResolver, ContextItem, EngineBinding, Error, Export, Handle, Installation, NativeQuery,
    NativeSession, QueryError, QueryKind, QueryResult, Result, RunInfo, SchemaVersion, SessionConcurrency,
    SessionTarget, SessionVariant, UnitLoader, VendorException,
};

use crate::api::{self, Close, NewClientSession, NewContext, NewLocalSession, QueryBind, QueryContext, QueryInfo,
    QueryNext, RawItem, SessionQuery};
use crate::info::parse_info;

/// Lexical type BaseX expects for a document bound as context
const DOCUMENT_TYPE: &str = "document-node()";

fn translate_diagnostic(ex: &dyn VendorException) -> QueryError {
    translate::from_diagnostic(&ex.message().unwrap_or_default())
}

struct Api {
    new_context: Export<NewContext>,
    local_session: Export<NewLocalSession>,
    client_session: Export<NewClientSession>,
    session_query: Export<SessionQuery>,
    session_close: Export<Close>,
    query_bind: Export<QueryBind>,
    query_context: Export<QueryContext>,
    query_next: Export<QueryNext>,
    query_info: Option<Export<QueryInfo>>,
    query_close: Export<Close>,
}

struct Inner {
    resolver: CapabilityResolver,
    api: Api,
    config: Option<Arc<[u8]>>,
    context: Mutex<Option<Handle>>,
}

impl Inner {
    /// Open a local session against the shared context, creating it if needed.
    fn open_local(&self) -> Result<Handle> {
        let mut context = self.context.lock();
        if context.is_none() {
            let created = self
                .resolver
                .check(|| self.api.new_context.get()(self.config.as_deref()))?;
            debug!("created embedded BaseX context");
            *context = Some(created);
        }
        let context = context.as_mut().ok_or(Error::Closed("embedded context"))?;
        self.resolver.check(|| self.api.local_session.get()(context))
    }
}

/// A resolved BaseX installation.
#[derive(Clone)]
pub struct BasexBinding {
    inner: Arc<Inner>,
}

impl BasexBinding {
    pub const ENGINE: &'static str = "BaseX";

    /// Load the installation and resolve every capability the adapter uses.
    pub fn resolve(installation: &Installation, loader: Option<&dyn UnitLoader>) -> Result<Self> {
        let unit = installation.load(loader)?;
        let table = api::table(unit)?;
        let api = Api {
            new_context: table.get(api::CONTEXT_NEW)?,
            local_session: table.get(api::LOCAL_SESSION_NEW)?,
            client_session: table.get(api::CLIENT_SESSION_NEW)?,
            session_query: table.get(api::SESSION_QUERY)?,
            session_close: table.get(api::SESSION_CLOSE)?,
            query_bind: table.get(api::QUERY_BIND)?,
            query_context: table.get(api::QUERY_CONTEXT)?,
            query_next: table.get(api::QUERY_NEXT)?,
            query_info: table.find(api::QUERY_INFO),
            query_close: table.get(api::QUERY_CLOSE)?,
        };
        info!(
            engine = Self::ENGINE,
            unit = table.unit(),
            session = table.resolved(api::SESSION_QUERY).unwrap_or_default(),
            "resolved distribution"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                resolver: CapabilityResolver::new(table, translate_diagnostic),
                api,
                config: installation.config.clone(),
                context: Mutex::new(None),
            }),
        })
    }

    /// Whether the shared embedded context has been created
    pub fn has_context(&self) -> bool {
        self.inner.context.lock().is_some()
    }
}

impl EngineBinding for BasexBinding {
    fn engine(&self) -> &str {
        Self::ENGINE
    }

    fn resolver(&self) -> &CapabilityResolver {
        &self.inner.resolver
    }

    fn schema_version(&self) -> SchemaVersion {
        SchemaVersion::V1_0
    }

    fn supports_kind(&self, kind: QueryKind) -> bool {
        matches!(kind, QueryKind::XQuery | QueryKind::XPath)
    }

    fn supports_variant(&self, _variant: SessionVariant) -> bool {
        true
    }

    fn concurrency(&self, variant: SessionVariant) -> SessionConcurrency {
        match variant {
            SessionVariant::Local => SessionConcurrency::Unsafe,
            SessionVariant::Client => SessionConcurrency::Serialized,
        }
    }

    fn open(&self, target: &SessionTarget) -> Result<Box<dyn NativeSession>> {
        let inner = &self.inner;
        let handle = match target {
            SessionTarget::Local => inner.open_local()?,
            SessionTarget::Client(settings) => {
                debug!(server = %settings.display_string(), "connecting to BaseX server");
                inner.resolver.check(|| {
                    inner.api.client_session.get()(
                        &settings.hostname,
                        settings.port,
                        settings.username.as_deref().unwrap_or_default(),
                        settings.password.as_deref().unwrap_or_default(),
                    )
                })?
            }
        };
        Ok(Box::new(BasexSession {
            inner: Arc::clone(inner),
            handle,
        }))
    }
}

struct BasexSession {
    inner: Arc<Inner>,
    handle: Handle,
}

impl NativeSession for BasexSession {
    fn prepare(&mut self, _kind: QueryKind, source: &str) -> Result<Box<dyn NativeQuery>> {
        // XPath is a subset of XQuery, both go through Session::query
        let inner = &self.inner;
        let handle = inner
            .resolver
            .check(|| inner.api.session_query.get()(&mut self.handle, source))?;
        Ok(Box::new(BasexQuery {
            inner: Arc::clone(inner),
            handle,
            buffered: None,
            exhausted: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        let inner = &self.inner;
        inner.resolver.check(|| inner.api.session_close.get()(&mut self.handle))
    }
}

struct BasexQuery {
    inner: Arc<Inner>,
    handle: Handle,
    /// First item, pulled by `start` so that evaluation errors surface there
    buffered: Option<RawItem>,
    exhausted: bool,
}

impl BasexQuery {
    fn pull(&mut self) -> Result<Option<RawItem>> {
        let inner = &self.inner;
        let item = inner.resolver.check(|| inner.api.query_next.get()(&mut self.handle))?;
        self.exhausted = item.is_none();
        Ok(item)
    }
}

impl NativeQuery for BasexQuery {
    fn bind_variable(&mut self, name: &str, value: &str, type_name: &str) -> Result<()> {
        let inner = &self.inner;
        inner
            .resolver
            .check(|| inner.api.query_bind.get()(&mut self.handle, name, value, type_name))
    }

    fn bind_context(&mut self, item: &ContextItem) -> Result<()> {
        let (value, type_name) = match item {
            ContextItem::Value { value, type_name } => (value.clone(), type_name.as_str()),
            _ => {
                let source = item
                    .source()
                    .ok_or_else(|| Error::UnsupportedOperation("context without source".into()))?;
                (source.decode()?, DOCUMENT_TYPE)
            }
        };
        let inner = &self.inner;
        inner
            .resolver
            .check(|| inner.api.query_context.get()(&mut self.handle, &value, type_name))
    }

    fn start(&mut self) -> Result<()> {
        self.exhausted = false;
        self.buffered = self.pull()?;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<QueryResult>> {
        let item = match self.buffered.take() {
            Some(item) => Some(item),
            None if self.exhausted => None,
            None => self.pull()?,
        };
        Ok(item.map(|item| QueryResult::new(item.value, item.type_name)))
    }

    fn info(&mut self) -> Result<RunInfo> {
        let inner = &self.inner;
        match &inner.api.query_info {
            Some(op) => {
                let text = inner.resolver.check(|| op.get()(&mut self.handle))?;
                Ok(parse_info(&text))
            }
            None => Ok(RunInfo::default()),
        }
    }

    fn close(&mut self) -> Result<()> {
        let inner = &self.inner;
        inner.resolver.check(|| inner.api.query_close.get()(&mut self.handle))
    }
}
