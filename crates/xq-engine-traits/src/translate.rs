//! Normalizes vendor error shapes into [`QueryError`]
//!
//! Two shapes are understood:
//!
//! - diagnostic strings, such as
//!   `"Stopped at <path>, <line>/<col>:\n[<code>] <description>"`, with the
//!   code on the location line or the next one;
//! - structured exception objects exposing accessors for the error code
//!   and its location.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{QueryError, StackFrame};
use crate::native::{Property, VendorException};

/// Namespace of the errors defined by the XPath/XQuery specifications
pub const STANDARD_ERROR_NAMESPACE: &str = "http://www.w3.org/2005/xqt-errors";

/// Code used when the engine did not report one
pub const UNIDENTIFIED_ERROR: &str = "FOER0000";

static STOPPED_AT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^Stopped at (?:(?P<path>.+?), )?(?:(?P<line>\d+)/(?P<col>\d+)|line (?P<line2>\d+), column (?P<col2>\d+)):?(?:\s*\[(?P<code>[^\]\s]+)\]\s*(?P<description>.*))?\s*$",
    )
    .expect("location pattern is valid")
});

static ERROR_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(?P<code>[^\]\s]+)\]\s*(?P<description>.*)$").expect("code pattern is valid")
});

/// Turn a vendor error code into `prefix:localName` or `localName`.
///
/// Returns the normalized code and whether it lies outside the standard
/// error namespace.
pub fn normalize_code(namespace: Option<&str>, prefix: Option<&str>, local_name: &str) -> (String, bool) {
    let prefix = prefix.filter(|p| !p.is_empty());
    match (namespace.filter(|ns| !ns.is_empty()), prefix) {
        (Some(STANDARD_ERROR_NAMESPACE), _) | (_, None) => (local_name.to_string(), false),
        (None, Some("err")) => (local_name.to_string(), false),
        (_, Some(prefix)) => (format!("{}:{}", prefix, local_name), true),
    }
}

/// `raw` is the code as the vendor printed it; it becomes the vendor code
/// when it lies outside the standard namespace.
fn code_error(raw: &str) -> QueryError {
    let (prefix, local_name) = match raw.split_once(':') {
        Some((prefix, local_name)) => (Some(prefix), local_name),
        None => (None, raw),
    };
    let (code, vendor) = normalize_code(None, prefix, local_name);
    let error = QueryError::new(code);
    if vendor {
        error.with_vendor_code(raw)
    } else {
        error
    }
}

fn number(captures: &regex::Captures<'_>, names: [&str; 2]) -> Option<u32> {
    names
        .iter()
        .find_map(|name| captures.name(name))
        .and_then(|m| m.as_str().parse().ok())
}

/// Translate a free-text diagnostic message.
///
/// A missing location yields a single frame without path, line or column.
/// A path of `.` refers to the query itself and is dropped.
pub fn from_diagnostic(message: &str) -> QueryError {
    let mut frame = StackFrame::default();
    let mut error: Option<QueryError> = None;
    let mut description: Vec<&str> = Vec::new();

    for line in message.lines().map(str::trim_end) {
        if error.is_some() {
            description.push(line);
            continue;
        }
        if let Some(c) = STOPPED_AT.captures(line) {
            if let Some(code) = c.name("code") {
                error = Some(code_error(code.as_str()));
                description.push(c.name("description").map_or("", |m| m.as_str()));
            }
            frame = StackFrame {
                path: c
                    .name("path")
                    .map(|m| m.as_str().trim())
                    .filter(|p| !p.is_empty() && *p != ".")
                    .map(str::to_string),
                line: number(&c, ["line", "line2"]),
                column: number(&c, ["col", "col2"]),
            };
        } else if let Some(c) = ERROR_CODE.captures(line) {
            error = Some(code_error(&c["code"]));
            description.push(c.name("description").map_or("", |m| m.as_str()));
        }
    }

    match error {
        Some(error) => error
            .with_description(description.join("\n").trim())
            .with_frame(frame),
        None => QueryError::new(UNIDENTIFIED_ERROR)
            .with_description(message.trim())
            .with_frame(frame),
    }
}

/// Accessor names for a structured exception, each property under its
/// alternative names in order of preference.
#[derive(Debug, Clone, Copy)]
pub struct Accessors {
    pub namespace: &'static [&'static str],
    pub prefix: &'static [&'static str],
    pub local_name: &'static [&'static str],
    pub system_id: &'static [&'static str],
    pub line: &'static [&'static str],
    pub column: &'static [&'static str],
}

fn probe(ex: &dyn VendorException, names: &[&str]) -> Option<Property> {
    names.iter().find_map(|name| ex.accessor(name))
}

fn probe_text(ex: &dyn VendorException, names: &[&str]) -> Option<String> {
    probe(ex, names)
        .and_then(|p| p.as_text().map(str::to_string))
        .filter(|s| !s.is_empty())
}

fn probe_position(ex: &dyn VendorException, names: &[&str]) -> Option<u32> {
    probe(ex, names)
        .and_then(|p| p.as_int())
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
}

/// Translate a structured exception object.
pub fn from_structured(ex: &dyn VendorException, accessors: &Accessors) -> QueryError {
    let error = match probe_text(ex, accessors.local_name) {
        Some(local_name) => {
            let namespace = probe_text(ex, accessors.namespace);
            let prefix = probe_text(ex, accessors.prefix);
            let (code, vendor) = normalize_code(namespace.as_deref(), prefix.as_deref(), &local_name);
            let error = QueryError::new(code.clone());
            match (vendor, namespace) {
                (true, Some(namespace)) => error.with_vendor_code(format!("Q{{{}}}{}", namespace, local_name)),
                (true, None) => error.with_vendor_code(code),
                (false, _) => error,
            }
        }
        None => QueryError::new(UNIDENTIFIED_ERROR),
    };

    let frame = StackFrame {
        path: probe_text(ex, accessors.system_id),
        line: probe_position(ex, accessors.line),
        column: probe_position(ex, accessors.column),
    };
    error
        .with_description(ex.message().unwrap_or_default().trim())
        .with_frame(frame)
}
