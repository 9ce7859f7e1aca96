//! Capability resolution against a loading unit
//!
//! Vendors move and rename their API across major releases. Each capability
//! the adapter needs is declared once with the ordered list of names it has
//! been published under; the first candidate that resolves with the expected
//! signature wins. The resulting [`CapabilityTable`] is immutable and shared
//! by every session created from the installation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, QueryError, Result};
use crate::native::{Export, Fault, LoadingUnit, NativeResult, Symbol, TypeDecl, VendorException};

/// One resolved capability.
#[derive(Clone)]
pub struct Capability {
    /// Fully-qualified name of the symbol that resolved
    pub symbol: String,
    export: Symbol,
}

/// Logical capability name to resolved symbol, built once per installation.
pub struct CapabilityTable {
    unit: String,
    entries: HashMap<&'static str, Capability>,
    error_types: Vec<String>,
}

impl CapabilityTable {
    pub fn builder(unit: Arc<dyn LoadingUnit>) -> TableBuilder {
        TableBuilder {
            unit,
            entries: HashMap::new(),
            error_types: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Name of the unit the table was resolved against
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The resolved symbol name of a capability
    pub fn resolved(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|c| c.symbol.as_str())
    }

    /// Fetch a required capability with signature `F`.
    pub fn get<F>(&self, name: &str) -> Result<Export<F>>
    where
        F: ?Sized + Send + Sync + 'static,
    {
        self.find(name).ok_or_else(|| {
            Error::unsupported_distribution(&self.unit, format!("capability {} was not resolved", name))
        })
    }

    /// Fetch an optional capability with signature `F`.
    pub fn find<F>(&self, name: &str) -> Option<Export<F>>
    where
        F: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .get(name)
            .and_then(|c| c.export.downcast_ref::<Export<F>>())
            .cloned()
    }

    /// Whether `type_name` is one of the vendor failure types resolved into the table
    pub fn recognizes(&self, type_name: &str) -> bool {
        self.error_types.iter().any(|t| t == type_name)
    }
}

/// Builds a [`CapabilityTable`] by probing candidate names.
pub struct TableBuilder {
    unit: Arc<dyn LoadingUnit>,
    entries: HashMap<&'static str, Capability>,
    error_types: Vec<String>,
    missing: Vec<&'static str>,
}

impl TableBuilder {
    /// Resolve `name` from the first candidate exported with signature `F`.
    pub fn require<F>(mut self, name: &'static str, candidates: &[&str]) -> Self
    where
        F: ?Sized + Send + Sync + 'static,
    {
        if !self.probe::<F>(name, candidates) {
            self.missing.push(name);
        }
        self
    }

    /// Like [`require`](Self::require), but a missing capability is not an error.
    pub fn optional<F>(mut self, name: &'static str, candidates: &[&str]) -> Self
    where
        F: ?Sized + Send + Sync + 'static,
    {
        self.probe::<F>(name, candidates);
        self
    }

    /// Resolve a vendor failure type from the first candidate the unit declares.
    pub fn error_type(mut self, name: &'static str, candidates: &[&str]) -> Self {
        let found = candidates.iter().find(|candidate| {
            self.unit
                .lookup(candidate)
                .is_some_and(|symbol| symbol.downcast_ref::<TypeDecl>().is_some())
        });
        match found {
            Some(type_name) => {
                debug!(unit = self.unit.name(), capability = name, resolved = *type_name, "resolved error type");
                self.error_types.push(type_name.to_string());
            }
            None => self.missing.push(name),
        }
        self
    }

    fn probe<F>(&mut self, name: &'static str, candidates: &[&str]) -> bool
    where
        F: ?Sized + Send + Sync + 'static,
    {
        for candidate in candidates {
            match self.unit.lookup(candidate) {
                Some(symbol) if symbol.downcast_ref::<Export<F>>().is_some() => {
                    debug!(unit = self.unit.name(), capability = name, resolved = *candidate, "resolved capability");
                    self.entries.insert(
                        name,
                        Capability {
                            symbol: candidate.to_string(),
                            export: symbol,
                        },
                    );
                    return true;
                }
                Some(_) => {
                    debug!(unit = self.unit.name(), capability = name, candidate = *candidate, "signature mismatch")
                }
                None => {}
            }
        }
        false
    }

    pub fn build(self) -> Result<CapabilityTable> {
        let unit = self.unit.name().to_string();
        if !self.missing.is_empty() {
            warn!(unit = %unit, missing = ?self.missing, "distribution is missing capabilities");
            return Err(Error::unsupported_distribution(
                unit,
                format!("missing {}", self.missing.join(", ")),
            ));
        }
        Ok(CapabilityTable {
            unit,
            entries: self.entries,
            error_types: self.error_types,
        })
    }
}

/// Translates a recognized vendor exception.
pub type Translate = fn(&dyn VendorException) -> QueryError;

/// Capability table plus the indirect-call boundary for one installation.
pub struct CapabilityResolver {
    table: CapabilityTable,
    translate: Translate,
    calls: AtomicUsize,
}

impl CapabilityResolver {
    pub fn new(table: CapabilityTable, translate: Translate) -> Self {
        Self {
            table,
            translate,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Number of indirect calls made through [`check`](Self::check)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Run one indirect call and classify its failure.
    ///
    /// Recognized vendor exceptions become [`Error::Query`], explicit refusals
    /// become [`Error::UnsupportedOperation`], and anything else is passed on
    /// unchanged as [`Error::Native`].
    pub fn check<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> NativeResult<T>,
    {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match op() {
            Ok(value) => Ok(value),
            Err(Fault::Raised(ex)) if self.table.recognizes(ex.type_name()) => {
                let error = (self.translate)(ex.as_ref());
                debug!(code = %error.standard_code, "translated vendor error");
                Err(Error::Query(error))
            }
            Err(Fault::Refused(op)) => Err(Error::UnsupportedOperation(op)),
            Err(fault) => Err(Error::Native(fault)),
        }
    }
}
