//! # frankendump-link
//!
//! The device-side USB transfer engine: advertises a vendor-specific bulk
//! interface to the host, negotiates a session over the framed command
//! protocol from `frankendump-core::proto`, and streams file content in
//! page-aligned chunks. A background detection thread follows host
//! attach/detach and drives the session lifecycle.
//!
//! The engine is a single explicit [`UsbLink`] object (the platform only
//! has one device interface); clients receive it by reference instead of
//! reaching for module state.

pub mod config;
mod detection;
pub mod error;
mod link;
mod setup;

pub use config::LinkConfig;
pub use error::UsbError;
pub use link::UsbLink;

/// Size of the shared page-aligned transfer buffer (8 MiB), the upper
/// bound for a single command or data chunk.
pub const USB_TRANSFER_BUFFER_SIZE: usize = 0x80_0000;
