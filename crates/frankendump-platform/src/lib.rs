//! # frankendump-platform
//!
//! Platform substrate for FrankenDump. The dumping cores run against two
//! platform services that are out of scope for this repository: the
//! encrypted save-container filesystem and the device-side USB services.
//! This crate pins both down as trait seams, together with the two
//! primitives everything above them relies on: a waitable event
//! ([`signal::Signal`]) and a page-aligned transfer buffer
//! ([`buffer::AlignedBuf`]).
//!
//! The traits are implemented for real hardware elsewhere; the
//! `frankendump-fixture` crate provides complete in-memory implementations
//! for tests and the harness.

pub mod buffer;
pub mod descriptor;
pub mod save;
pub mod signal;
pub mod usb;
