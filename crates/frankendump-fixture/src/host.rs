//! Host side of the loopback bus.
//!
//! [`FakeHost`] can be driven frame by frame from a test (read one
//! command, reply one status, inject garbage) or left to
//! [`FakeHost::spawn_responder`], which follows the host protocol the way
//! the real companion application does: ACK `StartSession` when the ABI
//! revision matches, ACK `SendFileProperties`, swallow the announced
//! number of data bytes, emit the trailing status, and stop at
//! `EndSession`.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use frankendump_core::proto::{
    ABI_VERSION, COMMAND_HEADER_SIZE, Command, CommandHeader, FilePropertiesBlock,
    StartSessionBlock, STATUS_FRAME_SIZE, Status, StatusFrame,
};
use frankendump_platform::usb::USB_STATE_CONFIGURED;

use crate::usb::{BusShared, SetupRecord};

/// How long host-side helpers wait for the device before giving up.
pub const HOST_TIMEOUT: Duration = Duration::from_secs(5);

/// A command frame as the host decoded it.
#[derive(Debug)]
pub enum HostCommand {
    StartSession(StartSessionBlock),
    FileProperties(FilePropertiesBlock),
    EndSession,
    /// Recognisable header with a reserved or unknown command code.
    Unknown { command: u32 },
    /// Bad magic, truncated block, or block/header size disagreement.
    Malformed,
}

/// What an auto-responder session observed.
#[derive(Debug, Default)]
pub struct HostReport {
    /// Files received, in order: (filename, payload bytes).
    pub files: Vec<(String, Vec<u8>)>,
    pub session_started: bool,
    pub session_ended: bool,
    /// Commands answered with a non-`Success` status.
    pub protocol_errors: u32,
}

/// Host-side driver for a [`crate::usb::LoopbackBus`].
#[derive(Clone)]
pub struct FakeHost {
    shared: Arc<BusShared>,
}

impl FakeHost {
    pub(crate) fn new(shared: Arc<BusShared>) -> Self {
        Self { shared }
    }

    /// Attach the host: device state becomes configured and the
    /// state-change event fires.
    pub fn plug(&self) {
        self.shared.set_state(USB_STATE_CONFIGURED);
    }

    /// Detach the host.
    pub fn unplug(&self) {
        self.shared.set_state(0);
    }

    /// Snapshot of everything the device advertised during setup.
    #[must_use]
    pub fn setup_record(&self) -> SetupRecord {
        self.shared.setup_record()
    }

    /// Current ZLT flag of the device's IN endpoint.
    #[must_use]
    pub fn in_endpoint_zlt(&self) -> bool {
        self.shared.pipe_in.zlt()
    }

    /// True while the device has an unanswered IN transfer posted.
    #[must_use]
    pub fn has_pending_send(&self) -> bool {
        self.shared.pipe_in.has_posted()
    }

    /// Take one raw device-to-host transfer.
    pub fn read_frame(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.shared.pipe_in.host_take_send(timeout)
    }

    /// Take one device-to-host transfer and decode it as a command frame.
    pub fn read_command(&self, timeout: Duration) -> Option<HostCommand> {
        let bytes = self.read_frame(timeout)?;
        let Ok(header) = CommandHeader::decode(&bytes) else {
            warn!("host: command frame with bad magic or short header");
            return Some(HostCommand::Malformed);
        };
        let block = &bytes[COMMAND_HEADER_SIZE..];
        if block.len() != header.block_size as usize {
            warn!(
                "host: block size mismatch (header {:#x}, payload {:#x})",
                header.block_size,
                block.len()
            );
            return Some(HostCommand::Malformed);
        }
        let decoded = match header.command() {
            Some(Command::StartSession) => match StartSessionBlock::decode(block) {
                Ok(session) => HostCommand::StartSession(session),
                Err(_) => HostCommand::Malformed,
            },
            Some(Command::SendFileProperties) => match FilePropertiesBlock::decode(block) {
                Ok(props) => HostCommand::FileProperties(props),
                Err(_) => HostCommand::Malformed,
            },
            Some(Command::EndSession) => HostCommand::EndSession,
            Some(Command::SendNspHeader) | None => HostCommand::Unknown {
                command: header.command,
            },
        };
        Some(decoded)
    }

    /// Reply one well-formed status frame.
    pub fn write_status(&self, status: Status, timeout: Duration) -> bool {
        let mut frame = [0u8; STATUS_FRAME_SIZE];
        if StatusFrame::new(status).encode(&mut frame).is_none() {
            return false;
        }
        self.shared.pipe_out.host_give_recv(&frame, timeout)
    }

    /// Reply a status frame whose magic word is corrupted.
    pub fn write_status_bad_magic(&self, status: Status, timeout: Duration) -> bool {
        let mut frame = [0u8; STATUS_FRAME_SIZE];
        if StatusFrame::new(status).encode(&mut frame).is_none() {
            return false;
        }
        frame[0] = b'?';
        self.shared.pipe_out.host_give_recv(&frame, timeout)
    }

    /// Reply arbitrary bytes on the status pipe.
    pub fn write_raw(&self, bytes: &[u8], timeout: Duration) -> bool {
        self.shared.pipe_out.host_give_recv(bytes, timeout)
    }

    /// Run the protocol-following responder on a background thread.
    pub fn spawn_responder(&self) -> JoinHandle<HostReport> {
        let host = self.clone();
        thread::spawn(move || host.respond_until_end())
    }

    /// Follow the host protocol until `EndSession`, a timeout, or an
    /// unrecoverable framing problem.
    pub fn respond_until_end(&self) -> HostReport {
        let mut report = HostReport::default();
        loop {
            let Some(command) = self.read_command(HOST_TIMEOUT) else {
                break;
            };
            match command {
                HostCommand::StartSession(session) => {
                    debug!(
                        "host: StartSession from app {} (abi {})",
                        session.version, session.abi_version
                    );
                    if session.abi_version == ABI_VERSION {
                        report.session_started = true;
                        self.write_status(Status::Success, HOST_TIMEOUT);
                    } else {
                        report.protocol_errors += 1;
                        self.write_status(Status::UnsupportedAbiVersion, HOST_TIMEOUT);
                    }
                }
                HostCommand::FileProperties(props) => {
                    debug!(
                        "host: file {:?} ({:#x} bytes) announced",
                        props.filename, props.file_size
                    );
                    self.write_status(Status::Success, HOST_TIMEOUT);
                    let mut payload = Vec::new();
                    // Zero-length files have no data phase and no trailing
                    // status frame.
                    if props.file_size > 0 {
                        while (payload.len() as u64) < props.file_size {
                            let Some(chunk) = self.read_frame(HOST_TIMEOUT) else {
                                return report;
                            };
                            payload.extend_from_slice(&chunk);
                        }
                        self.write_status(Status::Success, HOST_TIMEOUT);
                    }
                    report.files.push((props.filename, payload));
                }
                HostCommand::EndSession => {
                    debug!("host: session ended by device");
                    report.session_ended = true;
                    break;
                }
                HostCommand::Unknown { command } => {
                    warn!("host: unsupported command {command:#x}");
                    report.protocol_errors += 1;
                    self.write_status(Status::UnsupportedCommand, HOST_TIMEOUT);
                }
                HostCommand::Malformed => {
                    report.protocol_errors += 1;
                    self.write_status(Status::MalformedCommand, HOST_TIMEOUT);
                }
            }
        }
        report
    }
}
