//! Loopback USB bus.
//!
//! An in-memory implementation of the device-server seam with one bulk IN
//! and one bulk OUT pipe. The device side behaves like the real service:
//! posting arms a single URB per endpoint and returns immediately, the
//! completion signal fires when the host side moves the data (or the URB
//! is cancelled), and the report describes the outcome. The host side is
//! exposed through [`crate::host::FakeHost`].
//!
//! Every descriptor upload is recorded in a [`SetupRecord`] so tests can
//! assert the advertised bytes for both firmware generations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use frankendump_platform::descriptor::{DeviceDescriptor, DeviceInfo, USB_ENDPOINT_IN};
use frankendump_platform::signal::Signal;
use frankendump_platform::usb::{
    Generation, UrbReport, UsbDeviceServer, UsbEndpoint, UsbInterface, UsbIoError, UsbSetupError,
    UsbSpeed,
};

/// Everything the device advertised during setup, for test assertions.
#[derive(Debug, Clone, Default)]
pub struct SetupRecord {
    pub languages: Vec<u16>,
    pub strings: Vec<String>,
    pub device_descriptors: Vec<(UsbSpeed, DeviceDescriptor)>,
    pub bos: Vec<u8>,
    pub device_info: Option<DeviceInfo>,
    pub config_blobs: Vec<(UsbSpeed, Vec<u8>)>,
    pub endpoint_addresses: Vec<u8>,
    pub interface_enabled: bool,
    pub device_enabled: bool,
    pub shutdown_count: u32,
}

#[derive(Debug)]
enum UrbKind {
    Send(Vec<u8>),
    Recv { capacity: usize },
}

#[derive(Debug)]
struct PostedUrb {
    id: u32,
    kind: UrbKind,
}

struct PipeState {
    next_urb: u32,
    posted: Option<PostedUrb>,
    report: Option<UrbReport>,
    recv_data: Option<Vec<u8>>,
    zlt: bool,
}

/// One direction of the loopback bus.
pub(crate) struct Pipe {
    state: Mutex<PipeState>,
    /// Raised when the host side finishes (or cancels) the posted URB.
    completion: Signal,
    /// Raised when the device posts; the host waits on this.
    device_posted: Signal,
}

impl Pipe {
    fn new() -> Self {
        Self {
            state: Mutex::new(PipeState {
                next_urb: 1,
                posted: None,
                report: None,
                recv_data: None,
                zlt: false,
            }),
            completion: Signal::new(false),
            device_posted: Signal::new(true),
        }
    }

    pub(crate) fn zlt(&self) -> bool {
        self.state.lock().zlt
    }

    pub(crate) fn has_posted(&self) -> bool {
        self.state.lock().posted.is_some()
    }

    /// Host side: take a device-to-host payload, completing its URB.
    pub(crate) fn host_take_send(&self, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock();
                if let Some(PostedUrb {
                    id,
                    kind: UrbKind::Send(data),
                }) = state.posted.take_if(|p| matches!(p.kind, UrbKind::Send(_)))
                {
                    state.report = Some(UrbReport {
                        id,
                        transferred: data.len(),
                    });
                    drop(state);
                    self.completion.signal();
                    return Some(data);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            self.device_posted.wait(Some(deadline - now));
        }
    }

    /// Host side: satisfy a host-to-device URB with `data`, completing it.
    pub(crate) fn host_give_recv(&self, data: &[u8], timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock();
                if let Some(PostedUrb {
                    id,
                    kind: UrbKind::Recv { capacity },
                }) = state
                    .posted
                    .take_if(|p| matches!(p.kind, UrbKind::Recv { .. }))
                {
                    let n = data.len().min(capacity);
                    state.recv_data = Some(data[..n].to_vec());
                    state.report = Some(UrbReport { id, transferred: n });
                    drop(state);
                    self.completion.signal();
                    return true;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.device_posted.wait(Some(deadline - now));
        }
    }
}

pub(crate) struct BusShared {
    generation: Generation,
    state: Mutex<u32>,
    state_change: Signal,
    pub(crate) pipe_in: Pipe,
    pub(crate) pipe_out: Pipe,
    record: Mutex<SetupRecord>,
}

impl BusShared {
    pub(crate) fn set_state(&self, state: u32) {
        *self.state.lock() = state;
        self.state_change.signal();
    }

    pub(crate) fn setup_record(&self) -> SetupRecord {
        self.record.lock().clone()
    }
}

/// Device-side handle implementing [`UsbDeviceServer`].
pub struct LoopbackBus {
    shared: Arc<BusShared>,
}

impl LoopbackBus {
    /// Create a bus and the host-side driver attached to it.
    #[must_use]
    pub fn new(generation: Generation) -> (Self, crate::host::FakeHost) {
        let shared = Arc::new(BusShared {
            generation,
            state: Mutex::new(0),
            state_change: Signal::new(true),
            pipe_in: Pipe::new(),
            pipe_out: Pipe::new(),
            record: Mutex::new(SetupRecord::default()),
        });
        let host = crate::host::FakeHost::new(Arc::clone(&shared));
        (Self { shared }, host)
    }
}

impl UsbDeviceServer for LoopbackBus {
    fn generation(&self) -> Generation {
        self.shared.generation
    }

    fn add_language_descriptor(&self, langs: &[u16]) -> Result<(), UsbSetupError> {
        if self.shared.generation != Generation::Modern {
            return Err(UsbSetupError::WrongGeneration);
        }
        self.shared.record.lock().languages = langs.to_vec();
        Ok(())
    }

    fn add_string_descriptor(&self, text: &str) -> Result<u8, UsbSetupError> {
        if self.shared.generation != Generation::Modern {
            return Err(UsbSetupError::WrongGeneration);
        }
        let mut record = self.shared.record.lock();
        record.strings.push(text.to_owned());
        Ok(record.strings.len() as u8)
    }

    fn set_device_descriptor(
        &self,
        speed: UsbSpeed,
        descriptor: &DeviceDescriptor,
    ) -> Result<(), UsbSetupError> {
        if self.shared.generation != Generation::Modern {
            return Err(UsbSetupError::WrongGeneration);
        }
        self.shared
            .record
            .lock()
            .device_descriptors
            .push((speed, *descriptor));
        Ok(())
    }

    fn set_binary_object_store(&self, bos: &[u8]) -> Result<(), UsbSetupError> {
        if self.shared.generation != Generation::Modern {
            return Err(UsbSetupError::WrongGeneration);
        }
        self.shared.record.lock().bos = bos.to_vec();
        Ok(())
    }

    fn set_device_info(&self, info: &DeviceInfo) -> Result<(), UsbSetupError> {
        if self.shared.generation != Generation::Legacy {
            return Err(UsbSetupError::WrongGeneration);
        }
        self.shared.record.lock().device_info = Some(info.clone());
        Ok(())
    }

    fn register_interface(&self) -> Result<Box<dyn UsbInterface>, UsbSetupError> {
        Ok(Box::new(LoopbackInterface {
            shared: Arc::clone(&self.shared),
            index: 0,
        }))
    }

    fn enable(&self) -> Result<(), UsbSetupError> {
        self.shared.record.lock().device_enabled = true;
        Ok(())
    }

    fn state(&self) -> u32 {
        *self.shared.state.lock()
    }

    fn state_change(&self) -> &Signal {
        &self.shared.state_change
    }

    fn shutdown(&self) {
        let mut record = self.shared.record.lock();
        record.shutdown_count += 1;
        record.interface_enabled = false;
        record.device_enabled = false;
    }
}

struct LoopbackInterface {
    shared: Arc<BusShared>,
    index: u8,
}

impl UsbInterface for LoopbackInterface {
    fn index(&self) -> u8 {
        self.index
    }

    fn append_configuration(&self, speed: UsbSpeed, descriptor: &[u8]) -> Result<(), UsbSetupError> {
        if descriptor.is_empty() {
            return Err(UsbSetupError::DescriptorRejected("empty configuration data"));
        }
        self.shared
            .record
            .lock()
            .config_blobs
            .push((speed, descriptor.to_vec()));
        Ok(())
    }

    fn register_endpoint(&self, address: u8) -> Result<Box<dyn UsbEndpoint>, UsbSetupError> {
        if address & !USB_ENDPOINT_IN == 0 {
            return Err(UsbSetupError::EndpointUnavailable(address));
        }
        self.shared.record.lock().endpoint_addresses.push(address);
        Ok(Box::new(LoopbackEndpoint {
            shared: Arc::clone(&self.shared),
            is_in: address & USB_ENDPOINT_IN != 0,
        }))
    }

    fn enable(&self) -> Result<(), UsbSetupError> {
        self.shared.record.lock().interface_enabled = true;
        Ok(())
    }
}

struct LoopbackEndpoint {
    shared: Arc<BusShared>,
    is_in: bool,
}

impl LoopbackEndpoint {
    fn pipe(&self) -> &Pipe {
        if self.is_in {
            &self.shared.pipe_in
        } else {
            &self.shared.pipe_out
        }
    }
}

impl UsbEndpoint for LoopbackEndpoint {
    fn post_send(&self, data: &[u8]) -> Result<u32, UsbIoError> {
        if !self.is_in {
            return Err(UsbIoError::Direction);
        }
        let pipe = self.pipe();
        let mut state = pipe.state.lock();
        if let Some(posted) = &state.posted {
            return Err(UsbIoError::Busy(posted.id));
        }
        let id = state.next_urb;
        state.next_urb += 1;
        state.report = None;
        state.posted = Some(PostedUrb {
            id,
            kind: UrbKind::Send(data.to_vec()),
        });
        drop(state);
        pipe.device_posted.signal();
        Ok(id)
    }

    fn post_recv(&self, len: usize) -> Result<u32, UsbIoError> {
        if self.is_in {
            return Err(UsbIoError::Direction);
        }
        let pipe = self.pipe();
        let mut state = pipe.state.lock();
        if let Some(posted) = &state.posted {
            return Err(UsbIoError::Busy(posted.id));
        }
        let id = state.next_urb;
        state.next_urb += 1;
        state.report = None;
        state.recv_data = None;
        state.posted = Some(PostedUrb {
            id,
            kind: UrbKind::Recv { capacity: len },
        });
        drop(state);
        pipe.device_posted.signal();
        Ok(id)
    }

    fn completion(&self) -> &Signal {
        &self.pipe().completion
    }

    fn report(&self) -> Result<UrbReport, UsbIoError> {
        self.pipe().state.lock().report.ok_or(UsbIoError::NoReport)
    }

    fn drain_recv(&self, buf: &mut [u8]) -> Result<usize, UsbIoError> {
        if self.is_in {
            return Err(UsbIoError::Direction);
        }
        let mut state = self.pipe().state.lock();
        let data = state.recv_data.take().ok_or(UsbIoError::NoReport)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn cancel(&self) {
        let pipe = self.pipe();
        {
            let mut state = pipe.state.lock();
            if let Some(posted) = state.posted.take() {
                state.report = Some(UrbReport {
                    id: posted.id,
                    transferred: 0,
                });
            }
        }
        // A cancelling waiter blocks on the completion signal afterwards;
        // raise it even when no URB was in flight.
        pipe.completion.signal();
    }

    fn set_zlt(&self, enabled: bool) {
        self.pipe().state.lock().zlt = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const TICK: Duration = Duration::from_millis(500);

    #[test]
    fn test_send_completes_when_host_reads() {
        let (bus, _host) = LoopbackBus::new(Generation::Modern);
        let iface = bus.register_interface().unwrap();
        let ep_in = iface.register_endpoint(0x81).unwrap();

        let id = ep_in.post_send(b"hello").unwrap();
        assert!(!ep_in.completion().is_set());

        let taken = bus.shared.pipe_in.host_take_send(TICK).unwrap();
        assert_eq!(taken, b"hello");
        assert!(ep_in.completion().wait(Some(TICK)));
        ep_in.completion().clear();
        let report = ep_in.report().unwrap();
        assert_eq!(report.id, id);
        assert_eq!(report.transferred, 5);
    }

    #[test]
    fn test_recv_round_trip() {
        let (bus, _host) = LoopbackBus::new(Generation::Modern);
        let iface = bus.register_interface().unwrap();
        let ep_out = iface.register_endpoint(0x01).unwrap();

        ep_out.post_recv(16).unwrap();
        assert!(bus.shared.pipe_out.host_give_recv(b"abc", TICK));
        assert!(ep_out.completion().wait(Some(TICK)));
        ep_out.completion().clear();
        assert_eq!(ep_out.report().unwrap().transferred, 3);
        let mut buf = [0u8; 16];
        assert_eq!(ep_out.drain_recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_cancel_signals_completion() {
        let (bus, _host) = LoopbackBus::new(Generation::Modern);
        let iface = bus.register_interface().unwrap();
        let ep_in = iface.register_endpoint(0x81).unwrap();
        ep_in.post_send(b"stuck").unwrap();
        ep_in.cancel();
        assert!(ep_in.completion().wait(Some(TICK)));
        assert_eq!(ep_in.report().unwrap().transferred, 0);
        // The cancelled payload never reaches the host.
        assert!(bus.shared.pipe_in.host_take_send(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_one_urb_in_flight_per_endpoint() {
        let (bus, _host) = LoopbackBus::new(Generation::Modern);
        let iface = bus.register_interface().unwrap();
        let ep_in = iface.register_endpoint(0x81).unwrap();
        ep_in.post_send(b"a").unwrap();
        assert!(matches!(ep_in.post_send(b"b"), Err(UsbIoError::Busy(_))));
        bus.shared.pipe_in.host_take_send(TICK).unwrap();
        assert!(ep_in.post_send(b"b").is_ok());
    }

    #[test]
    fn test_direction_enforced() {
        let (bus, _host) = LoopbackBus::new(Generation::Modern);
        let iface = bus.register_interface().unwrap();
        let ep_in = iface.register_endpoint(0x81).unwrap();
        let ep_out = iface.register_endpoint(0x01).unwrap();
        assert!(matches!(ep_in.post_recv(4), Err(UsbIoError::Direction)));
        assert!(matches!(ep_out.post_send(b"x"), Err(UsbIoError::Direction)));
    }

    #[test]
    fn test_host_blocks_until_device_posts() {
        let (bus, _host) = LoopbackBus::new(Generation::Modern);
        let iface = bus.register_interface().unwrap();
        let ep_in = iface.register_endpoint(0x81).unwrap();

        let shared = Arc::clone(&bus.shared);
        let reader = thread::spawn(move || shared.pipe_in.host_take_send(TICK));
        thread::sleep(Duration::from_millis(20));
        ep_in.post_send(b"late").unwrap();
        assert_eq!(reader.join().unwrap().unwrap(), b"late");
    }

    #[test]
    fn test_generation_gating() {
        let (legacy, _host) = LoopbackBus::new(Generation::Legacy);
        assert!(matches!(
            legacy.add_string_descriptor("x"),
            Err(UsbSetupError::WrongGeneration)
        ));
        let (modern, _host) = LoopbackBus::new(Generation::Modern);
        assert!(matches!(
            modern.set_device_info(&DeviceInfo {
                id_vendor: 0,
                id_product: 0,
                bcd_device: 0,
                manufacturer: String::new(),
                product: String::new(),
                serial_number: String::new(),
            }),
            Err(UsbSetupError::WrongGeneration)
        ));
    }
}
