//! Parser for the BaseX query info block
//!
//! `Query::info` returns free text. Only the timing and the plan are kept;
//! everything else (compile steps, lock info, hit counts) is skipped.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use xq_engine_traits::RunInfo;

/// `Name:` on a line of its own opens a block
static HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?P<name>[A-Z][A-Za-z ]*):$").expect("info pattern is valid"));

/// `Name: value` timing and counter lines
static METRIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>Parsing|Compiling|Optimizing|Evaluating|Printing|Total Time|Hit\(s\)|Updated|Printed|Read Locking|Write Locking):\s+(?P<value>\S.*)$",
    )
    .expect("info pattern is valid")
});

/// BaseX 7 prints only this line
static EXECUTED_IN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Query executed in (?P<value>.+?)\.?$").expect("info pattern is valid"));

static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<amount>\d+(?:\.\d+)?)\s*(?P<unit>ms|s|µs|us)?$").expect("info pattern is valid"));

#[derive(Clone, Copy, PartialEq, Eq)]
enum Block {
    Optimized,
    Plan,
    Other,
}

/// Parse a duration such as `1.25 ms`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let caps = DURATION.captures(text.trim())?;
    let amount: f64 = caps["amount"].parse().ok()?;
    let nanos_per_unit = match caps.name("unit").map(|m| m.as_str()) {
        Some("s") => 1e9,
        Some("µs") | Some("us") => 1e3,
        _ => 1e6,
    };
    Some(Duration::from_nanos((amount * nanos_per_unit).round() as u64))
}

/// Extract timing and plan from an info block.
pub fn parse_info(text: &str) -> RunInfo {
    let mut info = RunInfo::default();
    let mut block = None;
    let mut optimized: Vec<&str> = Vec::new();
    let mut plan: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(caps) = HEADER.captures(trimmed) {
            block = Some(match &caps["name"] {
                "Optimized Query" => Block::Optimized,
                "Query Plan" => Block::Plan,
                _ => Block::Other,
            });
            continue;
        }

        if let Some(caps) = METRIC.captures(trimmed) {
            block = None;
            if &caps["name"] == "Total Time" {
                info.elapsed = parse_duration(&caps["value"]);
            }
            continue;
        }

        if let Some(caps) = EXECUTED_IN.captures(trimmed) {
            block = None;
            if info.elapsed.is_none() {
                info.elapsed = parse_duration(&caps["value"]);
            }
            continue;
        }

        if trimmed.is_empty() {
            block = None;
            continue;
        }

        match block {
            Some(Block::Optimized) => optimized.push(line.trim_end()),
            Some(Block::Plan) => plan.push(line.trim_end()),
            _ => {}
        }
    }

    let chosen = if plan.is_empty() { optimized } else { plan };
    if !chosen.is_empty() {
        info.plan = Some(chosen.join("\n"));
    }
    info
}
