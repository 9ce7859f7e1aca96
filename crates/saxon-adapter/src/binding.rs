//! Saxon engine binding
//!
//! Saxon runs in-process only. Each session owns a `Processor` built from the
//! installation's configuration; queries compile against it and share it for
//! building atomic values and documents. Results are materialized in full
//! when a query starts, since the s9api iterator is not buffer-based.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use xq_engine_traits::{
    translate, CapabilityResolver, CapabilityTable, ContextItem, EngineBinding, Error, Export, Handle,
    Installation, NativeQuery, NativeSession, QueryError, QueryKind, QueryResult, Result, SchemaVersion,
    SessionConcurrency, SessionTarget, SessionVariant, UnitLoader, VendorException,
};

use crate::api::{
    self, BuildDocument, Close, Compile, Edition, Iterate, IteratorNext, Load, MakeAtomic, NewProcessor,
    SetContext, SetVariable, XdmItem,
};

/// Edition with XML Schema 1.1 support
const SCHEMA_AWARE_EDITION: &str = "EE";

fn translate_structured(ex: &dyn VendorException) -> QueryError {
    translate::from_structured(ex, &api::ACCESSORS)
}

/// Operations for one query kind
struct KindOps {
    compile: Export<Compile>,
    load: Export<Load>,
    set_variable: Export<SetVariable>,
    set_context: Export<SetContext>,
    iterate: Export<Iterate>,
}

impl KindOps {
    fn required(table: &CapabilityTable, kind: QueryKind) -> Result<Self> {
        let names = api::kind_names(kind);
        Ok(Self {
            compile: table.get(names.compile)?,
            load: table.get(names.load)?,
            set_variable: table.get(names.set_variable)?,
            set_context: table.get(names.set_context)?,
            iterate: table.get(names.iterate)?,
        })
    }

    /// `None` unless every operation of the kind resolved
    fn optional(table: &CapabilityTable, kind: QueryKind) -> Option<Self> {
        let names = api::kind_names(kind);
        Some(Self {
            compile: table.find(names.compile)?,
            load: table.find(names.load)?,
            set_variable: table.find(names.set_variable)?,
            set_context: table.find(names.set_context)?,
            iterate: table.find(names.iterate)?,
        })
    }
}

struct Api {
    new_processor: Export<NewProcessor>,
    close_processor: Option<Export<Close>>,
    make_atomic: Export<MakeAtomic>,
    build_document: Export<BuildDocument>,
    iterator_next: Export<IteratorNext>,
    xquery: Arc<KindOps>,
    xpath: Arc<KindOps>,
    xslt: Option<Arc<KindOps>>,
}

impl Api {
    fn ops(&self, kind: QueryKind) -> Option<Arc<KindOps>> {
        match kind {
            QueryKind::XQuery => Some(Arc::clone(&self.xquery)),
            QueryKind::XPath => Some(Arc::clone(&self.xpath)),
            QueryKind::Xslt => self.xslt.clone(),
        }
    }
}

struct Inner {
    resolver: CapabilityResolver,
    api: Api,
    config: Option<Arc<[u8]>>,
    schema: SchemaVersion,
    edition: String,
}

/// A resolved Saxon installation.
#[derive(Clone)]
pub struct SaxonBinding {
    inner: Arc<Inner>,
}

impl SaxonBinding {
    pub const ENGINE: &'static str = "Saxon";

    /// Load the installation, resolve its capabilities and detect the edition.
    pub fn resolve(installation: &Installation, loader: Option<&dyn UnitLoader>) -> Result<Self> {
        let unit = installation.load(loader)?;
        let table = api::table(unit)?;
        let api = Api {
            new_processor: table.get(api::PROCESSOR_NEW)?,
            close_processor: table.find(api::PROCESSOR_CLOSE),
            make_atomic: table.get(api::MAKE_ATOMIC)?,
            build_document: table.get(api::BUILD_DOCUMENT)?,
            iterator_next: table.get(api::ITERATOR_NEXT)?,
            xquery: Arc::new(KindOps::required(&table, QueryKind::XQuery)?),
            xpath: Arc::new(KindOps::required(&table, QueryKind::XPath)?),
            xslt: KindOps::optional(&table, QueryKind::Xslt).map(Arc::new),
        };
        let edition_op = table.find::<Edition>(api::EDITION);
        let resolver = CapabilityResolver::new(table, translate_structured);

        let edition = match edition_op {
            Some(op) => resolver.check(|| op.get()())?,
            None => "HE".to_string(),
        };
        let schema = if edition.eq_ignore_ascii_case(SCHEMA_AWARE_EDITION) {
            SchemaVersion::V1_1
        } else {
            SchemaVersion::V1_0
        };
        info!(
            engine = Self::ENGINE,
            unit = resolver.table().unit(),
            edition = %edition,
            xslt = api.xslt.is_some(),
            "resolved distribution"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                resolver,
                api,
                config: installation.config.clone(),
                schema,
                edition,
            }),
        })
    }

    /// Edition reported by the distribution (`HE` when it reports none)
    pub fn edition(&self) -> &str {
        &self.inner.edition
    }
}

impl EngineBinding for SaxonBinding {
    fn engine(&self) -> &str {
        Self::ENGINE
    }

    fn resolver(&self) -> &CapabilityResolver {
        &self.inner.resolver
    }

    fn schema_version(&self) -> SchemaVersion {
        self.inner.schema
    }

    fn supports_kind(&self, kind: QueryKind) -> bool {
        self.inner.api.ops(kind).is_some()
    }

    fn supports_variant(&self, variant: SessionVariant) -> bool {
        variant == SessionVariant::Local
    }

    fn concurrency(&self, _variant: SessionVariant) -> SessionConcurrency {
        SessionConcurrency::Unsafe
    }

    fn open(&self, target: &SessionTarget) -> Result<Box<dyn NativeSession>> {
        if target.variant() != SessionVariant::Local {
            return Err(Error::UnsupportedEngineVariant {
                engine: Self::ENGINE.to_string(),
                variant: target.variant(),
            });
        }
        let inner = &self.inner;
        let processor = inner
            .resolver
            .check(|| inner.api.new_processor.get()(inner.config.as_deref()))?;
        debug!(edition = %inner.edition, "created Saxon processor");
        Ok(Box::new(SaxonSession {
            inner: Arc::clone(inner),
            processor: Arc::new(Mutex::new(processor)),
        }))
    }
}

struct SaxonSession {
    inner: Arc<Inner>,
    processor: Arc<Mutex<Handle>>,
}

impl NativeSession for SaxonSession {
    fn prepare(&mut self, kind: QueryKind, source: &str) -> Result<Box<dyn NativeQuery>> {
        let inner = &self.inner;
        let ops = inner.api.ops(kind).ok_or_else(|| Error::UnsupportedQueryType {
            engine: SaxonBinding::ENGINE.to_string(),
            kind,
        })?;
        let mut executable = {
            let mut processor = self.processor.lock();
            inner.resolver.check(|| ops.compile.get()(&mut *processor, source))?
        };
        let evaluator = inner.resolver.check(|| ops.load.get()(&mut executable))?;
        Ok(Box::new(SaxonQuery {
            inner: Arc::clone(inner),
            processor: Arc::clone(&self.processor),
            ops,
            _executable: executable,
            evaluator,
            results: VecDeque::new(),
        }))
    }

    fn close(&mut self) -> Result<()> {
        let inner = &self.inner;
        match &inner.api.close_processor {
            Some(close) => {
                let mut processor = self.processor.lock();
                inner.resolver.check(|| close.get()(&mut *processor))
            }
            None => Ok(()),
        }
    }
}

struct SaxonQuery {
    inner: Arc<Inner>,
    processor: Arc<Mutex<Handle>>,
    ops: Arc<KindOps>,
    _executable: Handle,
    evaluator: Handle,
    results: VecDeque<XdmItem>,
}

impl SaxonQuery {
    fn make_atomic(&self, value: &str, type_name: &str) -> Result<Handle> {
        let inner = &self.inner;
        let mut processor = self.processor.lock();
        inner
            .resolver
            .check(|| inner.api.make_atomic.get()(&mut *processor, value, type_name))
    }

    fn build_document(&self, text: &str, system_id: &str) -> Result<Handle> {
        let inner = &self.inner;
        let mut processor = self.processor.lock();
        inner
            .resolver
            .check(|| inner.api.build_document.get()(&mut *processor, text, system_id))
    }
}

impl NativeQuery for SaxonQuery {
    fn bind_variable(&mut self, name: &str, value: &str, type_name: &str) -> Result<()> {
        let atomic = self.make_atomic(value, type_name)?;
        let inner = &self.inner;
        let ops = &self.ops;
        inner
            .resolver
            .check(|| ops.set_variable.get()(&mut self.evaluator, name, &atomic))
    }

    fn bind_context(&mut self, item: &ContextItem) -> Result<()> {
        let value = match item {
            ContextItem::Value { value, type_name } => self.make_atomic(value, type_name)?,
            _ => {
                let source = item
                    .source()
                    .ok_or_else(|| Error::UnsupportedOperation("context without source".into()))?;
                self.build_document(&source.decode()?, source.path())?
            }
        };
        let inner = &self.inner;
        let ops = &self.ops;
        inner
            .resolver
            .check(|| ops.set_context.get()(&mut self.evaluator, &value))
    }

    fn start(&mut self) -> Result<()> {
        let inner = &self.inner;
        let ops = &self.ops;
        let mut iterator = inner.resolver.check(|| ops.iterate.get()(&mut self.evaluator))?;

        let mut results = VecDeque::new();
        while let Some(item) = inner
            .resolver
            .check(|| inner.api.iterator_next.get()(&mut iterator))?
        {
            results.push_back(item);
        }
        debug!(items = results.len(), "materialized Saxon results");
        self.results = results;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<QueryResult>> {
        Ok(self
            .results
            .pop_front()
            .map(|item| QueryResult::new(item.value, item.type_name)))
    }

    fn close(&mut self) -> Result<()> {
        // s9api evaluators hold no native resources of their own
        self.results.clear();
        Ok(())
    }
}
