//! JSONL event emission.
//!
//! One event per line, so harness output can be collected and diffed by
//! outer tooling without parsing free-form text.

use std::io::Write;

use serde::Serialize;

/// One harness event.
#[derive(Debug, Serialize)]
pub struct Event<'a> {
    /// Scenario the event belongs to (`cert`, `loopback`).
    pub scenario: &'a str,
    /// Event name (`started`, `report`, ...).
    pub event: &'a str,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Writes events as JSON lines to a sink.
pub struct EventLog<W: Write> {
    out: W,
}

impl<W: Write> EventLog<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Emit one event. I/O failures are reported, not fatal.
    pub fn emit(&mut self, event: &Event<'_>) {
        match serde_json::to_string(event) {
            Ok(line) => {
                if writeln!(self.out, "{line}").is_err() {
                    log::warn!("failed to write harness event");
                }
            }
            Err(err) => log::warn!("failed to serialize harness event: {err}"),
        }
    }
}
