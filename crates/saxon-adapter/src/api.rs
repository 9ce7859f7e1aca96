//! Signatures and symbol names of the Saxon s9api surface

use std::sync::Arc;

use xq_engine_traits::translate::Accessors;
use xq_engine_traits::{CapabilityTable, Handle, LoadingUnit, NativeResult, QueryKind, Result};

/// An item as returned by `XdmSequenceIterator::next`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XdmItem {
    pub value: String,
    pub type_name: String,
}

impl XdmItem {
    pub fn new<V: Into<String>, T: Into<String>>(value: V, type_name: T) -> Self {
        Self {
            value: value.into(),
            type_name: type_name.into(),
        }
    }
}

/// `Processor::new(config)`
pub type NewProcessor = dyn Fn(Option<&[u8]>) -> NativeResult<Handle> + Send + Sync;
/// `Version::software_edition()`: `HE`, `PE` or `EE`
pub type Edition = dyn Fn() -> NativeResult<String> + Send + Sync;
/// `Processor::close`
pub type Close = dyn Fn(&mut Handle) -> NativeResult<()> + Send + Sync;
/// `XdmAtomicValue::make(processor, lexical, type)`
pub type MakeAtomic = dyn Fn(&mut Handle, &str, &str) -> NativeResult<Handle> + Send + Sync;
/// `DocumentBuilder::build(processor, text, system_id)`
pub type BuildDocument = dyn Fn(&mut Handle, &str, &str) -> NativeResult<Handle> + Send + Sync;
/// `*Compiler::compile(processor, source)`
pub type Compile = dyn Fn(&mut Handle, &str) -> NativeResult<Handle> + Send + Sync;
/// `*Executable::load(executable)`
pub type Load = dyn Fn(&mut Handle) -> NativeResult<Handle> + Send + Sync;
/// Set a variable or parameter on an evaluator
pub type SetVariable = dyn Fn(&mut Handle, &str, &Handle) -> NativeResult<()> + Send + Sync;
/// Set the context item of an evaluator
pub type SetContext = dyn Fn(&mut Handle, &Handle) -> NativeResult<()> + Send + Sync;
/// Evaluate and return a sequence iterator
pub type Iterate = dyn Fn(&mut Handle) -> NativeResult<Handle> + Send + Sync;
/// `XdmSequenceIterator::next(iterator)`
pub type IteratorNext = dyn Fn(&mut Handle) -> NativeResult<Option<XdmItem>> + Send + Sync;

pub const PROCESSOR_NEW: &str = "processor.new";
pub const PROCESSOR_CLOSE: &str = "processor.close";
pub const EDITION: &str = "edition";
pub const MAKE_ATOMIC: &str = "atomic.make";
pub const BUILD_DOCUMENT: &str = "document.build";
pub const ITERATOR_NEXT: &str = "iterator.next";
pub const API_EXCEPTION: &str = "api-exception";
pub const XPATH_EXCEPTION: &str = "xpath-exception";

/// Accessors of `SaxonApiException` and `XPathException`
///
/// The local part of the error code is exposed as `local_part` or, in other
/// releases, `local_name`.
pub const ACCESSORS: Accessors = Accessors {
    namespace: &["error_code_namespace", "get_error_code_namespace"],
    prefix: &["error_code_prefix", "get_error_code_prefix"],
    local_name: &[
        "error_code_local_part",
        "get_error_code_local_part",
        "error_code_local_name",
        "get_error_code_local_name",
    ],
    system_id: &["system_id", "get_system_id"],
    line: &["line_number", "get_line_number"],
    column: &["column_number", "get_column_number"],
};

/// Logical names of the operations that differ per query kind
pub(crate) struct KindNames {
    pub compile: &'static str,
    pub load: &'static str,
    pub set_variable: &'static str,
    pub set_context: &'static str,
    pub iterate: &'static str,
}

pub(crate) fn kind_names(kind: QueryKind) -> KindNames {
    match kind {
        QueryKind::XQuery => KindNames {
            compile: "xquery.compile",
            load: "xquery.load",
            set_variable: "xquery.set-variable",
            set_context: "xquery.set-context",
            iterate: "xquery.iterate",
        },
        QueryKind::XPath => KindNames {
            compile: "xpath.compile",
            load: "xpath.load",
            set_variable: "xpath.set-variable",
            set_context: "xpath.set-context",
            iterate: "xpath.iterate",
        },
        QueryKind::Xslt => KindNames {
            compile: "xslt.compile",
            load: "xslt.load",
            set_variable: "xslt.set-parameter",
            set_context: "xslt.set-context",
            iterate: "xslt.apply-templates",
        },
    }
}

/// Resolve every capability the adapter uses. XSLT support is optional.
pub(crate) fn table(unit: Arc<dyn LoadingUnit>) -> Result<CapabilityTable> {
    let xquery = kind_names(QueryKind::XQuery);
    let xpath = kind_names(QueryKind::XPath);
    let xslt = kind_names(QueryKind::Xslt);

    CapabilityTable::builder(unit)
        .require::<NewProcessor>(PROCESSOR_NEW, &["saxon::s9api::Processor::new"])
        .optional::<Close>(PROCESSOR_CLOSE, &["saxon::s9api::Processor::close"])
        .optional::<Edition>(
            EDITION,
            &["saxon::Version::get_software_edition", "saxon::Version::software_edition"],
        )
        .require::<MakeAtomic>(
            MAKE_ATOMIC,
            &["saxon::s9api::XdmAtomicValue::make", "saxon::s9api::XdmAtomicValue::new"],
        )
        .require::<BuildDocument>(BUILD_DOCUMENT, &["saxon::s9api::DocumentBuilder::build"])
        .require::<IteratorNext>(ITERATOR_NEXT, &["saxon::s9api::XdmSequenceIterator::next"])
        // XQuery
        .require::<Compile>(xquery.compile, &["saxon::s9api::XQueryCompiler::compile"])
        .require::<Load>(xquery.load, &["saxon::s9api::XQueryExecutable::load"])
        .require::<SetVariable>(
            xquery.set_variable,
            &["saxon::s9api::XQueryEvaluator::set_external_variable"],
        )
        .require::<SetContext>(xquery.set_context, &["saxon::s9api::XQueryEvaluator::set_context_item"])
        .require::<Iterate>(xquery.iterate, &["saxon::s9api::XQueryEvaluator::iterator"])
        // XPath
        .require::<Compile>(xpath.compile, &["saxon::s9api::XPathCompiler::compile"])
        .require::<Load>(xpath.load, &["saxon::s9api::XPathExecutable::load"])
        .require::<SetVariable>(xpath.set_variable, &["saxon::s9api::XPathSelector::set_variable"])
        .require::<SetContext>(xpath.set_context, &["saxon::s9api::XPathSelector::set_context_item"])
        .require::<Iterate>(xpath.iterate, &["saxon::s9api::XPathSelector::iterator"])
        // XSLT: 3.0 transformer first, then the 2.0 one
        .optional::<Compile>(xslt.compile, &["saxon::s9api::XsltCompiler::compile"])
        .optional::<Load>(
            xslt.load,
            &["saxon::s9api::XsltExecutable::load30", "saxon::s9api::XsltExecutable::load"],
        )
        .optional::<SetVariable>(
            xslt.set_variable,
            &[
                "saxon::s9api::Xslt30Transformer::set_stylesheet_parameter",
                "saxon::s9api::XsltTransformer::set_parameter",
            ],
        )
        .optional::<SetContext>(
            xslt.set_context,
            &[
                "saxon::s9api::Xslt30Transformer::set_global_context_item",
                "saxon::s9api::XsltTransformer::set_initial_context_node",
            ],
        )
        .optional::<Iterate>(
            xslt.iterate,
            &[
                "saxon::s9api::Xslt30Transformer::apply_templates",
                "saxon::s9api::XsltTransformer::transform",
            ],
        )
        .error_type(API_EXCEPTION, &["saxon::s9api::SaxonApiException"])
        .error_type(XPATH_EXCEPTION, &["saxon::trans::XPathException"])
        .build()
}
