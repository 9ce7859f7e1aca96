//! BaseX adapter for the unified query engine
//!
//! Resolves a BaseX distribution (7.x through current releases) into a
//! [`BasexBinding`] implementing the xq-engine-traits interfaces. BaseX
//! supports XQuery and XPath, in local (embedded) and client sessions.

pub mod api;
pub mod binding;
pub mod info;

pub use api::RawItem;
pub use binding::BasexBinding;
pub use info::parse_info;
