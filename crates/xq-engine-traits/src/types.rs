//! Lexical type names and qualified names

use std::fmt;

use serde::{Deserialize, Serialize};

/// XML Schema version an engine implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    V1_0,
    V1_1,
}

/// Types introduced by XML Schema 1.1 and their nearest 1.0 equivalent.
const XSD_1_1_FALLBACKS: &[(&str, &str)] = &[
    ("xs:dateTimeStamp", "xs:dateTime"),
    ("xs:precisionDecimal", "xs:decimal"),
];

/// Map a lexical type name onto one the engine can represent.
///
/// This is the only place type downgrades happen.
pub fn effective_type(type_name: &str, schema: SchemaVersion) -> &str {
    if schema == SchemaVersion::V1_1 {
        return type_name;
    }
    XSD_1_1_FALLBACKS
        .iter()
        .find(|(newer, _)| *newer == type_name)
        .map_or(type_name, |(_, fallback)| *fallback)
}

/// A qualified name.
///
/// The text form is `local`, `prefix:local`, `Q{ns}local`, or
/// `Q{ns}prefix:local` when both a namespace and a prefix are known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub local_name: String,
}

impl QName {
    pub fn new<S: Into<String>>(local_name: S) -> Self {
        Self {
            namespace: None,
            prefix: None,
            local_name: local_name.into(),
        }
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = Some(prefix.into()).filter(|p: &String| !p.is_empty());
        self
    }

    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = Some(namespace.into()).filter(|ns: &String| !ns.is_empty());
        self
    }

    /// Parse any of the text forms; `None` for malformed names.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (namespace, rest) = match text.strip_prefix("Q{") {
            Some(braced) => {
                let (ns, rest) = braced.split_once('}')?;
                (Some(ns), rest)
            }
            None => (None, text),
        };
        let (prefix, local_name) = match rest.split_once(':') {
            Some((prefix, local_name)) => (Some(prefix), local_name),
            None => (None, rest),
        };
        if local_name.is_empty() || local_name.contains(':') || prefix.is_some_and(str::is_empty) {
            return None;
        }
        let mut name = QName::new(local_name);
        if let Some(ns) = namespace {
            name = name.with_namespace(ns);
        }
        if let Some(prefix) = prefix {
            name = name.with_prefix(prefix);
        }
        Some(name)
    }

    /// `prefix:local` or `local`
    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local_name),
            None => self.local_name.clone(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "Q{{{}}}", ns)?;
        }
        f.write_str(&self.lexical())
    }
}
