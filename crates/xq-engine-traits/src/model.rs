//! Result types shared by every engine

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::QName;

/// Dynamic type name of `xs:QName` items
pub const XS_QNAME: &str = "xs:QName";

/// A single item produced by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Position in the result sequence, counting from zero
    pub position: Option<usize>,
    /// Serialized lexical value
    pub value: String,
    /// Dynamic type name, e.g. `xs:integer` or `element()`
    pub type_name: String,
}

impl QueryResult {
    pub fn new<V: Into<String>, T: Into<String>>(value: V, type_name: T) -> Self {
        Self {
            position: None,
            value: value.into(),
            type_name: type_name.into(),
        }
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    /// The value as a qualified name, for `xs:QName` items.
    pub fn qname(&self) -> Option<QName> {
        if self.type_name == XS_QNAME {
            QName::parse(&self.value)
        } else {
            None
        }
    }
}

/// Metadata an engine reports about a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub elapsed: Option<Duration>,
    pub plan: Option<String>,
}

/// The complete outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResults {
    pub items: Vec<QueryResult>,
    pub elapsed: Duration,
    pub plan: Option<String>,
}

impl QueryResults {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Item values joined by newlines
    pub fn to_text(&self) -> String {
        self.items
            .iter()
            .map(|item| item.value.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
