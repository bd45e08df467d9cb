//! # frankendump-core
//!
//! Pure logic shared by the FrankenDump stack: the certificate decoder and
//! chain assembler over the platform's E-ticket save container, and the
//! framed wire protocol spoken to the companion host application.
//!
//! Nothing in this crate blocks or touches hardware; the save container is
//! reached through the `frankendump-platform` seam and everything else is
//! plain byte work, which keeps the whole crate free of `unsafe`.

#![deny(unsafe_code)]

pub mod cert;
pub mod proto;
