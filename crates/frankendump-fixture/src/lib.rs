//! # frankendump-fixture
//!
//! Complete in-memory implementations of the platform seams, used by the
//! test suites and the harness: a save store seeded with layout-exact
//! certificates, and a loopback USB bus whose host side can be driven
//! frame by frame from a test or left to a protocol-following
//! auto-responder thread.

pub mod certgen;
pub mod host;
pub mod save;
pub mod usb;

pub use host::{FakeHost, HostCommand, HostReport};
pub use save::MemSaveStore;
pub use usb::{LoopbackBus, SetupRecord};
