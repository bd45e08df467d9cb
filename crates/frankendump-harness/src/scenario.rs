//! End-to-end scenarios over the fixtures.

use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use frankendump_core::cert::{CertError, CertStore};
use frankendump_fixture::certgen;
use frankendump_fixture::{LoopbackBus, MemSaveStore};
use frankendump_link::{LinkConfig, UsbError, UsbLink};
use frankendump_platform::buffer::AlignedBuf;
use frankendump_platform::usb::Generation;

/// One resolved link of a certificate chain.
#[derive(Debug, Serialize)]
pub struct CertLinkReport {
    pub name: String,
    pub issuer: String,
    pub kind: String,
    pub size: usize,
    pub cert_id: u32,
}

/// Result of the `cert` scenario.
#[derive(Debug, Serialize)]
pub struct CertReport {
    pub issuer: String,
    pub links: Vec<CertLinkReport>,
    pub raw_size: usize,
    pub raw_sha256: String,
}

/// Seed the fixture save with the standard chain and resolve `issuer`
/// against it, hashing the serialized raw chain.
pub fn cert_report(issuer: &str) -> Result<CertReport, CertError> {
    let mut saves = MemSaveStore::new();
    certgen::seed_standard_chain(&mut saves);
    let store = CertStore::new(saves);

    let chain = store.chain_by_issuer(issuer)?;
    let links = chain
        .certs()
        .iter()
        .map(|cert| CertLinkReport {
            name: cert.name(),
            issuer: cert.issuer(),
            kind: format!("{:?}+{:?}", cert.kind().sig, cert.kind().pub_key),
            size: cert.size(),
            cert_id: cert.cert_id(),
        })
        .collect();

    let raw = chain.serialize_raw();
    info!("resolved {issuer:?}: {} links, {:#x} raw bytes", chain.len(), raw.len());
    Ok(CertReport {
        issuer: issuer.to_owned(),
        links,
        raw_size: raw.len(),
        raw_sha256: hex_digest(&raw),
    })
}

/// Result of the `loopback` scenario.
#[derive(Debug, Serialize)]
pub struct LoopbackReport {
    pub file_name: String,
    pub bytes_sent: u64,
    pub chunks: u32,
    pub device_sha256: String,
    pub host_sha256: String,
    pub verified: bool,
    pub session_ended: bool,
}

/// Boot a [`UsbLink`] on the loopback bus, stream `total` deterministic
/// bytes in `chunk_size` pieces, and verify the fake host received them
/// bit-exact.
pub fn run_loopback(total: u64, chunk_size: usize) -> Result<LoopbackReport, UsbError> {
    const FILE_NAME: &str = "payload.bin";

    if total == 0 {
        return Err(UsbError::InvalidArgument("payload size must be non-zero"));
    }
    let config = LinkConfig::default();
    if chunk_size == 0 || chunk_size > config.transfer_buffer_size {
        return Err(UsbError::InvalidArgument("chunk size out of range"));
    }

    let (bus, host) = LoopbackBus::new(Generation::Modern);
    let link = UsbLink::initialize(Box::new(bus), config)?;
    let responder = host.spawn_responder();
    host.plug();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !link.is_ready() {
        if Instant::now() >= deadline {
            warn!("loopback host never established a session");
            return Err(UsbError::Timeout);
        }
        thread::sleep(Duration::from_millis(1));
    }

    let mut chunk = AlignedBuf::new(chunk_size).ok_or(UsbError::BufferAllocFailed)?;
    let mut hasher = Sha256::new();

    link.send_file_properties(total, FILE_NAME)?;

    let mut sent = 0u64;
    let mut chunks = 0u32;
    while sent < total {
        let n = chunk_size.min((total - sent) as usize);
        fill_payload(&mut chunk.as_mut_slice()[..n], sent);
        hasher.update(&chunk.as_slice()[..n]);
        link.send_file_data(&chunk.as_slice()[..n])?;
        sent += n as u64;
        chunks += 1;
    }
    info!("streamed {sent:#x} bytes in {chunks} chunks");

    // Dropping the link ends the session, which releases the responder.
    drop(link);
    let report = responder.join().unwrap_or_else(|_| {
        warn!("fake host responder panicked");
        Default::default()
    });

    let device_sha256 = hex_digest_finish(hasher);
    let host_sha256 = report
        .files
        .first()
        .filter(|(name, _)| name == FILE_NAME)
        .map(|(_, bytes)| hex_digest(bytes))
        .unwrap_or_default();

    Ok(LoopbackReport {
        file_name: FILE_NAME.to_owned(),
        bytes_sent: sent,
        chunks,
        verified: !host_sha256.is_empty() && host_sha256 == device_sha256,
        device_sha256,
        host_sha256,
        session_ended: report.session_ended,
    })
}

/// Deterministic payload: every byte derives from its absolute offset.
fn fill_payload(chunk: &mut [u8], base: u64) {
    for (i, byte) in chunk.iter_mut().enumerate() {
        let offset = base + i as u64;
        *byte = (offset ^ (offset >> 8) ^ (offset >> 16)) as u8;
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest_finish(hasher)
}

fn hex_digest_finish(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
