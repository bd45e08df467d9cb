//! The USB link engine.
//!
//! Shared state lives behind a process-wide gate lock; each endpoint
//! handle sits behind its own lock. Acquisition order is always gate →
//! interface → IN endpoint → OUT endpoint, never the reverse. The
//! detection thread holds the gate for its whole iteration, including the
//! indefinitely blocking `StartSession` exchange, which is why `exit()`
//! joins the thread before touching the gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use parking_lot::RwLock;

use frankendump_core::proto::{
    ABI_VERSION, COMMAND_HEADER_SIZE, Command, CommandHeader, FilePropertiesBlock,
    FILE_PROPERTIES_BLOCK_SIZE, FS_MAX_PATH, START_SESSION_BLOCK_SIZE, STATUS_FRAME_SIZE,
    StartSessionBlock, Status, StatusFrame,
};
use frankendump_platform::buffer::{AlignedBuf, is_page_aligned};
use frankendump_platform::signal::{Signal, wait_any};
use frankendump_platform::usb::{UsbDeviceServer, UsbEndpoint, UsbInterface, host_available};

use crate::config::LinkConfig;
use crate::detection;
use crate::error::UsbError;
use crate::setup;

/// Endpoint handles, each behind its own lock.
pub(crate) struct DeviceInterface {
    pub(crate) iface: RwLock<Option<Box<dyn UsbInterface>>>,
    pub(crate) ep_in: RwLock<Option<Box<dyn UsbEndpoint>>>,
    pub(crate) ep_out: RwLock<Option<Box<dyn UsbEndpoint>>>,
}

impl DeviceInterface {
    fn empty() -> Self {
        Self {
            iface: RwLock::new(None),
            ep_in: RwLock::new(None),
            ep_out: RwLock::new(None),
        }
    }

    /// Drop all handles. Locks are taken in interface → IN → OUT order.
    fn clear(&self) {
        let mut iface = self.iface.write();
        let mut ep_in = self.ep_in.write();
        let mut ep_out = self.ep_out.write();
        *iface = None;
        *ep_in = None;
        *ep_out = None;
    }
}

/// Session state and the shared transfer buffer, guarded by the gate.
pub(crate) struct LinkState {
    pub(crate) host_available: bool,
    pub(crate) session_started: bool,
    pub(crate) remaining_transfer: u64,
    pub(crate) buf: Option<AlignedBuf>,
}

pub(crate) struct LinkInner {
    pub(crate) server: Box<dyn UsbDeviceServer>,
    pub(crate) config: LinkConfig,
    pub(crate) gate: RwLock<LinkState>,
    pub(crate) iface: DeviceInterface,
    /// Auto-clear; the sole cancellation vehicle for blocking waits.
    pub(crate) exit_event: Signal,
    /// Auto-clear; kicks the detection thread into a session reset after
    /// an in-session transfer timed out.
    pub(crate) timeout_event: Signal,
    /// Raised by a transfer interrupted by the exit event, checked by the
    /// detection loop after a failed negotiation.
    pub(crate) exit_flag: AtomicBool,
}

enum WritePayload<'a> {
    /// First `len` bytes of the shared transfer buffer.
    Shared(usize),
    /// Caller-owned, already page-aligned data (zero-copy fast path).
    External(&'a [u8]),
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum WaitOutcome {
    Completed,
    TimedOut,
    Exit,
}

impl LinkInner {
    /// Wait for the URB posted on `endpoint` and validate its report.
    ///
    /// Within a session the wait is bounded by the configured timeout;
    /// during negotiation it blocks until completion or the exit event.
    /// Timeouts and exits cancel the URB, drain the completion signal, and
    /// raise the usermode timeout event if a session was active.
    fn finish_transfer(
        &self,
        state: &LinkState,
        endpoint: &dyn UsbEndpoint,
        urb: u32,
        len: usize,
    ) -> Result<(), UsbError> {
        let outcome = if state.session_started {
            if endpoint.completion().wait(Some(self.config.transfer_timeout)) {
                WaitOutcome::Completed
            } else {
                WaitOutcome::TimedOut
            }
        } else {
            match wait_any(&[endpoint.completion(), &self.exit_event], None) {
                Some(0) => WaitOutcome::Completed,
                _ => {
                    self.exit_flag.store(true, Ordering::SeqCst);
                    WaitOutcome::Exit
                }
            }
        };

        if outcome != WaitOutcome::Completed {
            endpoint.cancel();
            // Wait until the cancellation itself completes before reusing
            // the endpoint, then drain the signal.
            endpoint.completion().wait(None);
            endpoint.completion().clear();
            if state.session_started {
                self.timeout_event.signal();
            }
            return Err(if outcome == WaitOutcome::Exit {
                UsbError::Cancelled
            } else {
                error!("usb transfer of {len:#x} bytes timed out");
                UsbError::Timeout
            });
        }

        endpoint.completion().clear();

        let report = endpoint.report()?;
        if report.id != urb {
            return Err(UsbError::Io(
                frankendump_platform::usb::UsbIoError::ReportMismatch {
                    expected: urb,
                    got: report.id,
                },
            ));
        }
        if report.transferred != len {
            error!(
                "usb transfer incomplete: expected {len:#x} bytes, moved {:#x}",
                report.transferred
            );
            return Err(UsbError::TransferSizeMismatch {
                expected: len,
                got: report.transferred,
            });
        }
        Ok(())
    }

    /// Device-to-host write on the IN endpoint. Sets ZLT on success so a
    /// max-packet-multiple transfer is still delimited for the host.
    fn usb_write(&self, state: &LinkState, payload: WritePayload<'_>) -> Result<(), UsbError> {
        if !host_available(self.server.as_ref()) {
            warn!("usb write with no host available");
            return Err(UsbError::NotReady);
        }

        let guard = self.iface.ep_in.write();
        let endpoint = guard.as_ref().ok_or(UsbError::NotInitialized)?;

        let data: &[u8] = match payload {
            WritePayload::Shared(len) => {
                let buf = state.buf.as_ref().ok_or(UsbError::NotInitialized)?;
                buf.as_slice()
                    .get(..len)
                    .ok_or(UsbError::InvalidArgument("write exceeds the transfer buffer"))?
            }
            WritePayload::External(data) => data,
        };
        if data.is_empty() {
            return Err(UsbError::InvalidArgument("empty usb write"));
        }
        if !is_page_aligned(data.as_ptr()) {
            return Err(UsbError::InvalidArgument("write buffer is not page-aligned"));
        }

        let urb = endpoint.post_send(data)?;
        self.finish_transfer(state, endpoint.as_ref(), urb, data.len())?;
        endpoint.set_zlt(true);
        Ok(())
    }

    /// Host-to-device read of exactly `len` bytes into the front of the
    /// shared transfer buffer.
    fn usb_read(&self, state: &mut LinkState, len: usize) -> Result<(), UsbError> {
        if !host_available(self.server.as_ref()) {
            warn!("usb read with no host available");
            return Err(UsbError::NotReady);
        }
        if len == 0 {
            return Err(UsbError::InvalidArgument("empty usb read"));
        }

        let guard = self.iface.ep_out.write();
        let endpoint = guard.as_ref().ok_or(UsbError::NotInitialized)?;

        let urb = endpoint.post_recv(len)?;
        self.finish_transfer(state, endpoint.as_ref(), urb, len)?;

        let buf = state.buf.as_mut().ok_or(UsbError::NotInitialized)?;
        let slot = buf
            .as_mut_slice()
            .get_mut(..len)
            .ok_or(UsbError::InvalidArgument("read exceeds the transfer buffer"))?;
        endpoint.drain_recv(slot)?;
        Ok(())
    }

    /// Write the command header into the shared buffer.
    fn stage_header(
        &self,
        state: &mut LinkState,
        command: Command,
        block_size: u32,
    ) -> Result<(), UsbError> {
        let buf = state.buf.as_mut().ok_or(UsbError::NotInitialized)?;
        CommandHeader::new(command, block_size)
            .encode(buf.as_mut_slice())
            .ok_or(UsbError::InvalidArgument("transfer buffer too small for a header"))?;
        Ok(())
    }

    /// Send the staged command and consume its status frame.
    fn send_command(&self, state: &mut LinkState, cmd_size: usize) -> Result<(), UsbError> {
        let command = state
            .buf
            .as_ref()
            .and_then(|buf| CommandHeader::decode(buf.as_slice()).ok())
            .map_or(u32::MAX, |header| header.command);
        let buf_len = state.buf.as_ref().map_or(0, AlignedBuf::len);

        if cmd_size < COMMAND_HEADER_SIZE || cmd_size > buf_len {
            error!("invalid size {cmd_size:#x} for command {command:#x}");
            return Err(UsbError::InvalidArgument("command size out of range"));
        }

        // A failed write during an exit-interrupted negotiation is routine;
        // keep the log quiet for it.
        let quiet = !state.session_started && self.exit_flag.load(Ordering::SeqCst);

        if let Err(err) = self.usb_write(state, WritePayload::Shared(cmd_size)) {
            if !quiet && !matches!(err, UsbError::Cancelled) {
                error!("failed to write {cmd_size:#x}-byte block for command {command:#x}: {err}");
            }
            return Err(UsbError::WriteCommandFailed(Box::new(err)));
        }

        if let Err(err) = self.usb_read(state, STATUS_FRAME_SIZE) {
            if !quiet && !matches!(err, UsbError::Cancelled) {
                error!("failed to read status block for command {command:#x}: {err}");
            }
            return Err(UsbError::ReadStatusFailed(Box::new(err)));
        }

        let frame = state
            .buf
            .as_ref()
            .ok_or(UsbError::NotInitialized)
            .and_then(|buf| {
                StatusFrame::decode(buf.as_slice()).map_err(|_| {
                    error!("invalid status block magic word for command {command:#x}");
                    UsbError::InvalidMagicWord
                })
            })?;

        match frame.status() {
            Some(Status::Success) => Ok(()),
            Some(status) => {
                if let Some(detail) = status.host_detail() {
                    warn!("{detail}");
                }
                Err(UsbError::Host(status))
            }
            None => {
                warn!("unknown status code {:#x}", frame.status);
                Err(UsbError::HostUnknown(frame.status))
            }
        }
    }

    /// Negotiate a session. Blocks until the host answers or the exit
    /// event interrupts the exchange.
    pub(crate) fn start_session(&self, state: &mut LinkState) -> Result<(), UsbError> {
        debug!("negotiating usb session (abi {ABI_VERSION})");
        self.stage_header(state, Command::StartSession, START_SESSION_BLOCK_SIZE as u32)?;
        {
            let buf = state.buf.as_mut().ok_or(UsbError::NotInitialized)?;
            StartSessionBlock {
                version: self.config.version,
                abi_version: ABI_VERSION,
            }
            .encode(&mut buf.as_mut_slice()[COMMAND_HEADER_SIZE..])
            .ok_or(UsbError::InvalidArgument("transfer buffer too small for a block"))?;
        }
        self.send_command(state, COMMAND_HEADER_SIZE + START_SESSION_BLOCK_SIZE)
    }

    /// Best-effort `EndSession`; the host does not answer it.
    pub(crate) fn end_session(&self, state: &mut LinkState) {
        if !(state.host_available && state.session_started) {
            return;
        }
        debug!("ending usb session");
        if self.stage_header(state, Command::EndSession, 0).is_err() {
            return;
        }
        if let Err(err) = self.usb_write(state, WritePayload::Shared(COMMAND_HEADER_SIZE)) {
            warn!("failed to send EndSession command: {err}");
        }
    }

    fn send_file_properties_locked(
        &self,
        state: &mut LinkState,
        file_size: u64,
        filename: &str,
    ) -> Result<(), UsbError> {
        if state.buf.is_none() {
            return Err(UsbError::NotInitialized);
        }
        if !(state.host_available && state.session_started) {
            error!("file properties for {filename:?} with no active session");
            return Err(UsbError::NotReady);
        }
        if state.remaining_transfer > 0 {
            error!(
                "file properties for {filename:?} while {:#x} bytes are still outstanding",
                state.remaining_transfer
            );
            return Err(UsbError::InvalidArgument("previous file transfer still in flight"));
        }
        if filename.is_empty() || filename.len() >= FS_MAX_PATH {
            error!("filename length {} out of range", filename.len());
            return Err(UsbError::InvalidArgument("filename length out of range"));
        }

        self.stage_header(
            state,
            Command::SendFileProperties,
            FILE_PROPERTIES_BLOCK_SIZE as u32,
        )?;
        {
            let buf = state.buf.as_mut().ok_or(UsbError::NotInitialized)?;
            FilePropertiesBlock {
                file_size,
                filename: filename.to_owned(),
            }
            .encode(&mut buf.as_mut_slice()[COMMAND_HEADER_SIZE..])
            .map_err(|_| UsbError::InvalidArgument("filename rejected by the frame codec"))?;
        }

        self.send_command(state, COMMAND_HEADER_SIZE + FILE_PROPERTIES_BLOCK_SIZE)?;
        state.remaining_transfer = file_size;
        debug!("file {filename:?} announced ({file_size:#x} bytes)");
        Ok(())
    }

    fn send_file_data_locked(&self, state: &mut LinkState, data: &[u8]) -> Result<(), UsbError> {
        if state.buf.is_none() {
            return Err(UsbError::NotInitialized);
        }
        if !(state.host_available && state.session_started) {
            error!("file data with no active session");
            return Err(UsbError::NotReady);
        }
        if state.remaining_transfer == 0 {
            error!("file data with no file transfer in progress");
            return Err(UsbError::InvalidArgument("no file transfer in progress"));
        }
        if data.is_empty() {
            return Err(UsbError::InvalidArgument("empty file data chunk"));
        }
        let buf_len = state.buf.as_ref().map_or(0, AlignedBuf::len);
        if data.len() > buf_len {
            error!("chunk of {:#x} bytes exceeds the transfer buffer", data.len());
            return Err(UsbError::InvalidArgument("chunk exceeds the transfer buffer"));
        }
        if data.len() as u64 > state.remaining_transfer {
            error!(
                "chunk of {:#x} bytes exceeds the remaining {:#x}",
                data.len(),
                state.remaining_transfer
            );
            return Err(UsbError::InvalidArgument("chunk exceeds the remaining transfer"));
        }

        if is_page_aligned(data.as_ptr()) {
            // Already aligned: post the caller's buffer directly.
            self.usb_write(state, WritePayload::External(data))?;
        } else {
            let buf = state.buf.as_mut().ok_or(UsbError::NotInitialized)?;
            buf.as_mut_slice()[..data.len()].copy_from_slice(data);
            self.usb_write(state, WritePayload::Shared(data.len()))?;
        }

        state.remaining_transfer -= data.len() as u64;

        if state.remaining_transfer == 0 {
            // Final chunk: the host closes the file with one status frame.
            self.usb_read(state, STATUS_FRAME_SIZE).map_err(|err| {
                error!("failed to read the trailing status block: {err}");
                err
            })?;
            let frame = state
                .buf
                .as_ref()
                .ok_or(UsbError::NotInitialized)
                .and_then(|buf| {
                    StatusFrame::decode(buf.as_slice()).map_err(|_| {
                        error!("invalid magic word in the trailing status block");
                        UsbError::InvalidMagicWord
                    })
                })?;
            match frame.status() {
                Some(Status::Success) => Ok(()),
                Some(status) => {
                    if let Some(detail) = status.host_detail() {
                        warn!("{detail}");
                    }
                    Err(UsbError::Host(status))
                }
                None => {
                    warn!("unknown status code {:#x}", frame.status);
                    Err(UsbError::HostUnknown(frame.status))
                }
            }
        } else {
            Ok(())
        }
    }
}

/// The process-wide USB link.
///
/// Dropping the link performs the same orderly shutdown as [`UsbLink::exit`].
pub struct UsbLink {
    inner: Arc<LinkInner>,
    detection: Option<JoinHandle<()>>,
}

impl UsbLink {
    /// Allocate the transfer buffer, advertise descriptors, register the
    /// interface and endpoints, and spawn the detection thread.
    ///
    /// Setup failures tear down anything partially constructed and are
    /// fatal; the caller does not get a half-initialized link.
    pub fn initialize(
        server: Box<dyn UsbDeviceServer>,
        config: LinkConfig,
    ) -> Result<Self, UsbError> {
        let buf = AlignedBuf::new(config.transfer_buffer_size).ok_or_else(|| {
            error!(
                "failed to allocate a {:#x}-byte aligned transfer buffer",
                config.transfer_buffer_size
            );
            UsbError::BufferAllocFailed
        })?;

        let inner = Arc::new(LinkInner {
            server,
            config,
            gate: RwLock::new(LinkState {
                host_available: false,
                session_started: false,
                remaining_transfer: 0,
                buf: Some(buf),
            }),
            iface: DeviceInterface::empty(),
            exit_event: Signal::new(true),
            timeout_event: Signal::new(true),
            exit_flag: AtomicBool::new(false),
        });

        let setup_result = {
            let _gate = inner.gate.write();
            setup::initialize_device(&inner)
        };
        if let Err(err) = setup_result {
            error!("usb device setup failed: {err}");
            inner.iface.clear();
            inner.server.shutdown();
            return Err(err);
        }

        let thread_inner = Arc::clone(&inner);
        let detection = thread::Builder::new()
            .name("usb-detection".to_owned())
            .spawn(move || detection::run(thread_inner))
            .map_err(|err| {
                error!("failed to spawn the detection thread: {err}");
                inner.iface.clear();
                inner.server.shutdown();
                UsbError::ThreadSpawnFailed
            })?;

        info!("usb link initialized");
        Ok(Self {
            inner,
            detection: Some(detection),
        })
    }

    /// Orderly shutdown: stop the detection thread, then tear the device
    /// interface down and release the transfer buffer. Idempotent.
    pub fn exit(&mut self) {
        if let Some(handle) = self.detection.take() {
            self.inner.exit_event.signal();
            // Join before taking the gate: the detection thread may hold
            // it while blocked inside StartSession.
            if handle.join().is_err() {
                error!("detection thread panicked during shutdown");
            }
        }

        let mut state = self.inner.gate.write();
        self.inner.server.shutdown();
        self.inner.iface.clear();
        state.host_available = false;
        state.session_started = false;
        state.remaining_transfer = 0;
        if state.buf.take().is_some() {
            info!("usb link shut down");
        }
    }

    /// True once a host is attached and a session has been negotiated.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let state = self.inner.gate.read();
        state.host_available && state.session_started
    }

    /// Bytes of the announced file still owed to the host.
    #[must_use]
    pub fn remaining_transfer(&self) -> u64 {
        self.inner.gate.read().remaining_transfer
    }

    /// Announce a file of `file_size` bytes. On the host's ACK the link
    /// enters the data phase and [`Self::send_file_data`] becomes legal.
    pub fn send_file_properties(&self, file_size: u64, filename: &str) -> Result<(), UsbError> {
        let mut state = self.inner.gate.write();
        self.inner
            .send_file_properties_locked(&mut state, file_size, filename)
    }

    /// Stream one chunk of the announced file. Page-aligned chunks are
    /// posted zero-copy; others are staged through the shared buffer. Any
    /// failure abandons the in-flight file (`remaining_transfer` drops to
    /// zero) and, for timeouts, forces a session renegotiation.
    pub fn send_file_data(&self, data: &[u8]) -> Result<(), UsbError> {
        let mut state = self.inner.gate.write();
        let result = self.inner.send_file_data_locked(&mut state, data);
        if result.is_err() {
            state.remaining_transfer = 0;
        }
        result
    }
}

impl Drop for UsbLink {
    fn drop(&mut self) {
        self.exit();
    }
}
