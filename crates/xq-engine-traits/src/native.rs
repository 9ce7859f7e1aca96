//! The indirect-call surface of a loaded vendor distribution.
//!
//! A [`LoadingUnit`] is one isolated symbol namespace. Every lookup stays
//! inside the unit it was made against, so two major versions of the same
//! vendor library can be loaded side by side without their symbols meeting.
//! Exports are typed: a symbol only resolves for a caller that asks for the
//! exact signature it was exported with.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A resolved symbol, still type-erased.
pub type Symbol = Arc<dyn Any + Send + Sync>;

/// Result of an indirect call.
pub type NativeResult<T> = std::result::Result<T, Fault>;

/// An isolated unit of loaded vendor code.
pub trait LoadingUnit: Send + Sync {
    /// Name of the distribution this unit was loaded from
    fn name(&self) -> &str;

    /// Look up a symbol by its fully-qualified name
    fn lookup(&self, symbol: &str) -> Option<Symbol>;
}

/// A typed export. `F` is the signature, usually a `dyn Fn(..)`.
pub struct Export<F: ?Sized>(Arc<F>);

impl<F: ?Sized> Export<F> {
    pub fn new(f: Arc<F>) -> Self {
        Self(f)
    }

    pub fn get(&self) -> &F {
        &self.0
    }
}

impl<F: ?Sized> Clone for Export<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> fmt::Debug for Export<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Export(..)")
    }
}

/// Marker exported for every type a unit declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDecl;

/// Opaque native object. Only the vendor code that created it looks inside.
pub struct Handle(Box<dyn Any + Send>);

impl Handle {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.downcast_mut()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handle(..)")
    }
}

/// A unit assembled in memory from named exports.
pub struct StaticUnit {
    name: String,
    symbols: HashMap<String, Symbol>,
}

impl StaticUnit {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            symbols: HashMap::new(),
        }
    }

    /// Export `f` under `symbol` with signature `F`.
    pub fn export<F>(mut self, symbol: &str, f: Arc<F>) -> Self
    where
        F: ?Sized + Send + Sync + 'static,
    {
        self.symbols
            .insert(symbol.to_string(), Arc::new(Export::new(f)));
        self
    }

    /// Declare a type, such as an exception class, without any operation.
    pub fn declare(mut self, type_name: &str) -> Self {
        self.symbols
            .insert(type_name.to_string(), Arc::new(TypeDecl));
        self
    }

    pub fn into_unit(self) -> Arc<dyn LoadingUnit> {
        Arc::new(self)
    }
}

impl LoadingUnit for StaticUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, symbol: &str) -> Option<Symbol> {
        self.symbols.get(symbol).cloned()
    }
}

/// Value returned by an exception accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    Null,
    Text(String),
    Int(i64),
}

impl Property {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Property::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Property::Int(i) => Some(*i),
            Property::Text(s) => s.trim().parse().ok(),
            Property::Null => None,
        }
    }
}

/// An exception object raised by vendor code.
pub trait VendorException: fmt::Debug + Send + Sync {
    /// Fully-qualified type of the exception
    fn type_name(&self) -> &str;

    /// The exception message
    fn message(&self) -> Option<String>;

    /// Invoke the no-argument accessor `name`; `None` if it does not exist
    fn accessor(&self, name: &str) -> Option<Property>;
}

/// General-purpose exception object for vendor code built in Rust.
#[derive(Debug, Clone)]
pub struct Exception {
    type_name: String,
    message: Option<String>,
    properties: HashMap<String, Property>,
}

impl Exception {
    pub fn new<S: Into<String>>(type_name: S) -> Self {
        Self {
            type_name: type_name.into(),
            message: None,
            properties: HashMap::new(),
        }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_property<S: Into<String>>(mut self, accessor: S, value: Property) -> Self {
        self.properties.insert(accessor.into(), value);
        self
    }

    pub fn raise(self) -> Fault {
        Fault::Raised(Arc::new(self))
    }
}

impl VendorException for Exception {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn message(&self) -> Option<String> {
        self.message.clone()
    }

    fn accessor(&self, name: &str) -> Option<Property> {
        self.properties.get(name).cloned()
    }
}

/// Failure escaping an indirect call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// The engine raised one of its exception objects
    Raised(Arc<dyn VendorException>),
    /// The engine explicitly refused the call
    Refused(String),
    /// Anything else that escaped the vendor code
    Internal(String),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Raised(ex) => match ex.message() {
                Some(message) => write!(f, "{}: {}", ex.type_name(), message),
                None => f.write_str(ex.type_name()),
            },
            Fault::Refused(op) => write!(f, "engine refused {}", op),
            Fault::Internal(msg) => write!(f, "native failure: {}", msg),
        }
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;

    type Add = dyn Fn(i64, i64) -> NativeResult<i64> + Send + Sync;
    type Negate = dyn Fn(i64) -> NativeResult<i64> + Send + Sync;

    fn unit() -> StaticUnit {
        StaticUnit::new("calc-1.0")
            .export::<Add>(
                "calc::Math::add",
                Arc::new(|a: i64, b: i64| -> NativeResult<i64> { Ok(a + b) }),
            )
            .declare("calc::MathError")
    }

    #[test]
    fn typed_lookup_matches_signature() {
        let symbol = unit().lookup("calc::Math::add").unwrap();
        let add = symbol.downcast_ref::<Export<Add>>().unwrap();
        assert_eq!(add.get()(2, 3).unwrap(), 5);
    }

    #[test]
    fn typed_lookup_rejects_other_signature() {
        let symbol = unit().lookup("calc::Math::add").unwrap();
        assert!(symbol.downcast_ref::<Export<Negate>>().is_none());
    }

    #[test]
    fn declared_types_resolve_as_markers() {
        let symbol = unit().lookup("calc::MathError").unwrap();
        assert!(symbol.downcast_ref::<TypeDecl>().is_some());
    }

    #[test]
    fn handle_downcasts_to_stored_type() {
        let mut handle = Handle::new(41_u32);
        *handle.downcast_mut::<u32>().unwrap() += 1;
        assert_eq!(handle.downcast_ref::<u32>(), Some(&42));
        assert!(handle.downcast_ref::<String>().is_none());
    }

    #[test]
    fn fault_display_names_exception_type() {
        let fault = Exception::new("calc::MathError")
            .with_message("overflow")
            .raise();
        assert_eq!(fault.to_string(), "calc::MathError: overflow");
    }
}
