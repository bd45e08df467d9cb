//! # frankendump-harness
//!
//! Runs the whole stack end to end against the in-memory fixtures: resolve
//! a certificate chain out of a seeded E-ticket save, or stream a
//! deterministic payload across the loopback USB bus and verify the host
//! side received it bit-exact. Reports are serialized as JSON; progress is
//! emitted as JSONL events.

pub mod event_log;
pub mod scenario;
