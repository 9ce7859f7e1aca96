//! Queries and their run lifecycle

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};
use xq_engine_traits::types::effective_type;
use xq_engine_traits::{ContextItem, Error, NativeQuery, QueryKind, QueryResult, QueryResults, Result, RunInfo};

use crate::results::ResultIterator;
use crate::scheduler::{Pending, Scheduler};
use crate::session::SessionInner;

/// Bindings as they stood when a run was dispatched
#[derive(Debug, Clone, Default)]
struct Bindings {
    /// name -> (lexical value, effective type)
    variables: BTreeMap<String, (String, String)>,
    context: Option<ContextItem>,
}

struct NativeSlot {
    query: Option<Box<dyn NativeQuery>>,
    closed: bool,
    /// Incremented by every successful run; older iterators go stale
    generation: u64,
}

pub(crate) struct QueryInner {
    session: Arc<SessionInner>,
    kind: QueryKind,
    source: String,
    origin: Option<String>,
    bindings: Mutex<Bindings>,
    native: Mutex<NativeSlot>,
    close_requested: AtomicBool,
}

impl QueryInner {
    pub(crate) fn new(session: Arc<SessionInner>, kind: QueryKind, source: String, origin: Option<String>) -> Self {
        Self {
            session,
            kind,
            source,
            origin,
            bindings: Mutex::new(Bindings::default()),
            native: Mutex::new(NativeSlot {
                query: None,
                closed: false,
                generation: 0,
            }),
            close_requested: AtomicBool::new(false),
        }
    }

    fn locate(&self, error: Error) -> Error {
        error.with_fallback_path(self.origin.as_deref())
    }

    fn closing(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    /// Lock the slot for `f`, then finish a close requested meanwhile.
    fn with_slot<T>(&self, f: impl FnOnce(&mut NativeSlot) -> T) -> T {
        let value = f(&mut self.native.lock());
        self.settle();
        value
    }

    /// Close the slot if a close was requested and nobody holds it.
    ///
    /// Every slot holder calls this after releasing the lock, so a request
    /// that found the slot busy is completed by the holder.
    fn settle(&self) {
        if !self.closing() {
            return;
        }
        if let Some(mut slot) = self.native.try_lock() {
            if let Err(e) = self.close_slot(&mut slot) {
                warn!(error = %e, "failed to close query");
            }
        }
    }

    fn close_slot(&self, slot: &mut NativeSlot) -> Result<()> {
        if slot.closed {
            return Ok(());
        }
        slot.closed = true;
        match slot.query.take() {
            Some(mut query) => {
                debug!("closing native query");
                let result = query.close();
                self.session.release_query();
                result
            }
            None => Ok(()),
        }
    }

    /// Prepare on first use, apply `bindings` and start. Runs on a worker.
    fn execute(self: &Arc<Self>, bindings: Bindings) -> Result<ResultIterator> {
        let started = Instant::now();
        let outcome = self.with_slot(|slot| {
            if slot.closed || self.closing() {
                return Err(Error::Closed("query"));
            }
            self.start(slot, &bindings)?;
            slot.generation += 1;
            Ok(slot.generation)
        });
        if self.closing() {
            debug!("query closed while its run was in flight");
            return Err(Error::Closed("query"));
        }
        let generation = outcome.map_err(|e| self.locate(e))?;
        Ok(ResultIterator::new(Arc::clone(self), generation, started))
    }

    fn start(&self, slot: &mut NativeSlot, bindings: &Bindings) -> Result<()> {
        if slot.query.is_none() {
            debug!(kind = %self.kind, origin = ?self.origin, "preparing native query");
            slot.query = Some(self.session.prepare(self.kind, &self.source)?);
        }
        let query = slot.query.as_mut().ok_or(Error::Closed("query"))?;
        for (name, (value, type_name)) in &bindings.variables {
            query.bind_variable(name, value, type_name)?;
        }
        if let Some(context) = &bindings.context {
            query.bind_context(context)?;
        }
        query.start()
    }

    /// Pull the next item of run `generation`.
    pub(crate) fn pull(&self, generation: u64) -> Result<Option<QueryResult>> {
        self.with_slot(|slot| {
            if slot.closed {
                return Err(Error::Closed("query"));
            }
            if slot.generation != generation {
                return Ok(None);
            }
            match slot.query.as_mut() {
                Some(query) => query.next().map_err(|e| self.locate(e)),
                None => Ok(None),
            }
        })
    }

    pub(crate) fn info(&self, generation: u64) -> Result<RunInfo> {
        self.with_slot(|slot| {
            if slot.closed {
                return Err(Error::Closed("query"));
            }
            if slot.generation != generation {
                return Ok(RunInfo::default());
            }
            match slot.query.as_mut() {
                Some(query) => query.info(),
                None => Ok(RunInfo::default()),
            }
        })
    }

    /// Close now, or once whoever holds the slot releases it. Never waits.
    pub(crate) fn request_close(&self) -> Result<()> {
        self.close_requested.store(true, Ordering::SeqCst);
        match self.native.try_lock() {
            Some(mut slot) => self.close_slot(&mut slot),
            None => {
                debug!("query busy, deferring close");
                Ok(())
            }
        }
    }
}

impl Drop for QueryInner {
    fn drop(&mut self) {
        let mut slot = std::mem::replace(
            self.native.get_mut(),
            NativeSlot {
                query: None,
                closed: true,
                generation: 0,
            },
        );
        if let Err(e) = self.close_slot(&mut slot) {
            warn!(error = %e, "failed to close query");
        }
    }
}

/// A query over one session.
///
/// Bindings are buffered and applied when [`run`](Self::run) dispatches.
/// Each run sees the bindings as they were at the moment it was called;
/// later binds only affect later runs.
pub struct Query {
    inner: Arc<QueryInner>,
    scheduler: Scheduler,
}

impl Query {
    pub(crate) fn new(inner: Arc<QueryInner>, scheduler: Scheduler) -> Self {
        Self { inner, scheduler }
    }

    pub fn kind(&self) -> QueryKind {
        self.inner.kind
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    /// Path of the file the source came from, if any
    pub fn origin(&self) -> Option<&str> {
        self.inner.origin.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.close_requested.load(Ordering::SeqCst)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Closed("query"))
        } else {
            Ok(())
        }
    }

    /// Declare an external variable.
    ///
    /// `type_name` is a lexical type name such as `xs:integer`; types the
    /// engine cannot represent are mapped to their nearest equivalent.
    pub fn bind_variable(&self, name: &str, value: &str, type_name: &str) -> Result<()> {
        self.ensure_usable()?;
        let schema = self.inner.session.binding().schema_version();
        let effective = effective_type(type_name, schema);
        if effective != type_name {
            debug!(variable = name, from = type_name, to = effective, "downgraded variable type");
        }
        self.inner
            .bindings
            .lock()
            .variables
            .insert(name.to_string(), (value.to_string(), effective.to_string()));
        Ok(())
    }

    /// Set the context item; scalar values are downgraded like variables.
    pub fn bind_context_item(&self, item: ContextItem) -> Result<()> {
        self.ensure_usable()?;
        let item = match item {
            ContextItem::Value { value, type_name } => {
                let schema = self.inner.session.binding().schema_version();
                ContextItem::value(value, effective_type(&type_name, schema))
            }
            other => other,
        };
        self.inner.bindings.lock().context = Some(item);
        Ok(())
    }

    /// Dispatch a run on a worker.
    ///
    /// Returns immediately. The result resolves to an iterator over the
    /// items, or to the translated error.
    pub fn run(&self) -> Pending<ResultIterator> {
        if let Err(e) = self.ensure_usable() {
            return self.scheduler.ready(Err(e));
        }
        let bindings = self.inner.bindings.lock().clone();
        let inner = Arc::clone(&self.inner);
        debug!(kind = %inner.kind, variables = bindings.variables.len(), "dispatching run");
        self.scheduler.spawn(move || inner.execute(bindings))
    }

    /// Run and drain every item on a worker.
    pub fn execute(&self) -> Pending<QueryResults> {
        self.run().then(ResultIterator::into_results)
    }

    /// Release the native query. Idempotent.
    ///
    /// If a run is in flight the native close happens when it finishes.
    pub fn close(&self) -> Result<()> {
        self.inner.request_close()
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("kind", &self.inner.kind)
            .field("origin", &self.inner.origin)
            .field("closed", &self.is_closed())
            .finish()
    }
}
