//! Sessions over one native engine instance

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use xq_engine_traits::{
    EngineBinding, Error, NativeQuery, NativeSession, QueryKind, Result, SessionConcurrency, SessionTarget,
    SessionVariant, SourceFile,
};

use crate::query::{Query, QueryInner};
use crate::scheduler::{Pending, Scheduler};

enum SessionState {
    /// No native handle yet
    Unconnected,
    Open(Box<dyn NativeSession>),
    Closed,
}

pub(crate) struct SessionInner {
    binding: Arc<dyn EngineBinding>,
    target: SessionTarget,
    state: Mutex<SessionState>,
    queries: Mutex<Vec<Weak<QueryInner>>>,
    open: AtomicBool,
    close_requested: AtomicBool,
    closed: AtomicBool,
    /// Prepared native queries not yet closed
    live: AtomicUsize,
}

impl SessionInner {
    pub(crate) fn binding(&self) -> &dyn EngineBinding {
        self.binding.as_ref()
    }

    fn closing(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    /// Run `f` on the state, then finish a close requested meanwhile.
    fn with_state<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> T {
        let value = f(&mut self.state.lock());
        if self.closing() {
            if let Err(e) = self.settle() {
                warn!(engine = self.binding.engine(), error = %e, "failed to close session");
            }
        }
        value
    }

    /// Create the native handle if this is the first use.
    fn ensure_open(&self, state: &mut SessionState) -> Result<()> {
        if self.closing() {
            return Err(Error::Closed("session"));
        }
        match state {
            SessionState::Unconnected => {
                let native = self.binding.open(&self.target)?;
                info!(
                    engine = self.binding.engine(),
                    variant = %self.target.variant(),
                    "opened native session"
                );
                *state = SessionState::Open(native);
                self.open.store(true, Ordering::SeqCst);
                Ok(())
            }
            SessionState::Open(_) => Ok(()),
            SessionState::Closed => Err(Error::Closed("session")),
        }
    }

    /// Compile `source`, opening the native session on first use.
    pub(crate) fn prepare(&self, kind: QueryKind, source: &str) -> Result<Box<dyn NativeQuery>> {
        self.with_state(|state| {
            self.ensure_open(state)?;
            let query = match state {
                SessionState::Open(native) => native.prepare(kind, source)?,
                _ => return Err(Error::Closed("session")),
            };
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(query)
        })
    }

    /// A prepared native query was closed.
    pub(crate) fn release_query(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        if let Err(e) = self.settle() {
            warn!(engine = self.binding.engine(), error = %e, "failed to close session");
        }
    }

    /// Close the native handle once a close was requested and no prepared
    /// query is left. Never waits: whoever holds the state lock re-checks
    /// after releasing it.
    fn settle(&self) -> Result<()> {
        let mut result = Ok(());
        while self.closing() && !self.closed.load(Ordering::SeqCst) && self.live.load(Ordering::SeqCst) == 0 {
            let Some(mut state) = self.state.try_lock() else {
                break;
            };
            if self.live.load(Ordering::SeqCst) != 0 || self.closed.load(Ordering::SeqCst) {
                continue;
            }
            let previous = std::mem::replace(&mut *state, SessionState::Closed);
            self.open.store(false, Ordering::SeqCst);
            self.closed.store(true, Ordering::SeqCst);
            if let SessionState::Open(mut native) = previous {
                debug!(engine = self.binding.engine(), "closing native session");
                result = native.close();
            }
        }
        result
    }
}

/// A connection to one engine instance, local or remote.
///
/// The native handle is created on the first query run (or by
/// [`open`](Self::open)) and closed at most once. Dropping a session closes
/// it.
pub struct Session {
    inner: Arc<SessionInner>,
    scheduler: Scheduler,
}

impl Session {
    pub(crate) fn new(binding: Arc<dyn EngineBinding>, target: SessionTarget, scheduler: Scheduler) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                binding,
                target,
                state: Mutex::new(SessionState::Unconnected),
                queries: Mutex::new(Vec::new()),
                open: AtomicBool::new(false),
                close_requested: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                live: AtomicUsize::new(0),
            }),
            scheduler,
        }
    }

    pub fn engine(&self) -> &str {
        self.inner.binding.engine()
    }

    pub fn variant(&self) -> SessionVariant {
        self.inner.target.variant()
    }

    /// How the engine behaves with simultaneous queries on this session
    pub fn concurrency(&self) -> SessionConcurrency {
        self.inner.binding.concurrency(self.variant())
    }

    /// Whether the native handle exists
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst) && !self.inner.closing()
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.inner.closing()
    }

    /// Create the native handle now instead of on the first run.
    pub fn open(&self) -> Pending<()> {
        let inner = Arc::clone(&self.inner);
        self.scheduler.spawn(move || inner.with_state(|state| inner.ensure_open(state)))
    }

    /// Create a query over `source`. No native call is made.
    pub fn query<S: Into<String>>(&self, kind: QueryKind, source: S) -> Result<Query> {
        self.create_query(kind, source.into(), None)
    }

    /// Create a query over the text of `file`, reporting errors against its path.
    pub fn query_file(&self, kind: QueryKind, file: &dyn SourceFile) -> Result<Query> {
        let source = file.decode()?;
        self.create_query(kind, source, Some(file.path().to_string()))
    }

    fn create_query(&self, kind: QueryKind, source: String, origin: Option<String>) -> Result<Query> {
        if self.is_closed() {
            return Err(Error::Closed("session"));
        }
        if !self.inner.binding.supports_kind(kind) {
            return Err(Error::UnsupportedQueryType {
                engine: self.engine().to_string(),
                kind,
            });
        }
        let query = Arc::new(QueryInner::new(Arc::clone(&self.inner), kind, source, origin));
        let mut queries = self.inner.queries.lock();
        // Checked under the list lock so `close` cannot miss this query.
        if self.is_closed() {
            return Err(Error::Closed("session"));
        }
        queries.retain(|q| q.strong_count() > 0);
        queries.push(Arc::downgrade(&query));
        Ok(Query::new(query, self.scheduler.clone()))
    }

    /// Close open queries, then the native handle.
    ///
    /// Idempotent and never waits. Idle queries close now; a query with a run
    /// in flight closes when the run finishes, and the native handle follows
    /// the last of them. Makes no native call if no handle was ever created.
    pub fn close(&self) -> Result<()> {
        self.inner.close_requested.store(true, Ordering::SeqCst);
        let queries = std::mem::take(&mut *self.inner.queries.lock());
        let mut result = Ok(());
        for query in queries.iter().filter_map(Weak::upgrade) {
            if let Err(e) = query.request_close() {
                result = result.and(Err(e));
            }
        }
        result.and(self.inner.settle())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(engine = self.engine(), error = %e, "failed to close session");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.engine())
            .field("variant", &self.variant())
            .field("open", &self.is_open())
            .finish()
    }
}
