//! Saxon adapter for the unified query engine
//!
//! Resolves a Saxon distribution into a [`SaxonBinding`]. Saxon supports
//! XQuery and XPath, plus XSLT when the distribution exports a transformer.
//! Only local sessions exist; errors are structured exception objects.

pub mod api;
pub mod binding;

pub use api::XdmItem;
pub use binding::SaxonBinding;
