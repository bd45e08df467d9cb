//! Certificates and certificate chains.
//!
//! Certificates live in the platform's encrypted E-ticket save container as
//! raw signed blobs with a variable layout: a signature block whose size
//! depends on the signature algorithm, a fixed middle section (issuer,
//! public-key type, name, id), and a public-key block whose size depends on
//! the key algorithm. Six layout combinations are valid. [`layout`] walks
//! the bytes and recovers the combination; [`store`] resolves names and
//! issuer strings against the save container.

pub mod layout;
pub mod store;

use thiserror::Error;

use frankendump_platform::save::SaveError;

pub use layout::{CERT_MAX_SIZE, CERT_MIN_SIZE};
pub use store::CertStore;

/// Signature algorithm tag, big-endian u32 at the start of a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SignatureAlgorithm {
    Rsa4096Sha1 = 0x10000,
    Rsa2048Sha1 = 0x10001,
    Ecsda240Sha1 = 0x10002,
    Rsa4096Sha256 = 0x10003,
    Rsa2048Sha256 = 0x10004,
    Ecsda240Sha256 = 0x10005,
}

impl SignatureAlgorithm {
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x10000 => Some(Self::Rsa4096Sha1),
            0x10001 => Some(Self::Rsa2048Sha1),
            0x10002 => Some(Self::Ecsda240Sha1),
            0x10003 => Some(Self::Rsa4096Sha256),
            0x10004 => Some(Self::Rsa2048Sha256),
            0x10005 => Some(Self::Ecsda240Sha256),
            _ => None,
        }
    }

    #[must_use]
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Size of the whole signature block: the 4-byte tag, the signature
    /// itself and its padding.
    #[must_use]
    pub fn block_size(self) -> usize {
        match self {
            Self::Rsa4096Sha1 | Self::Rsa4096Sha256 => layout::SIG_BLOCK_RSA4096,
            Self::Rsa2048Sha1 | Self::Rsa2048Sha256 => layout::SIG_BLOCK_RSA2048,
            Self::Ecsda240Sha1 | Self::Ecsda240Sha256 => layout::SIG_BLOCK_ECSDA240,
        }
    }
}

/// Public-key algorithm tag, big-endian u32 in the certificate body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PubKeyAlgorithm {
    Rsa4096 = 0,
    Rsa2048 = 1,
    Ecsda240 = 2,
}

impl PubKeyAlgorithm {
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Rsa4096),
            1 => Some(Self::Rsa2048),
            2 => Some(Self::Ecsda240),
            _ => None,
        }
    }

    #[must_use]
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Size of the public-key block (key material plus padding).
    #[must_use]
    pub fn block_size(self) -> usize {
        match self {
            Self::Rsa4096 => layout::PUBKEY_BLOCK_RSA4096,
            Self::Rsa2048 => layout::PUBKEY_BLOCK_RSA2048,
            Self::Ecsda240 => layout::PUBKEY_BLOCK_ECSDA240,
        }
    }
}

/// The recovered certificate kind: one of the six valid
/// signature/public-key combinations. An unrecognised combination never
/// constructs a `CertKind`; it surfaces as a [`CertParseError`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CertKind {
    pub sig: SignatureAlgorithm,
    pub pub_key: PubKeyAlgorithm,
}

impl CertKind {
    /// Total certificate size this kind dictates on disk.
    #[must_use]
    pub fn cert_size(self) -> usize {
        self.sig.block_size() + layout::FIXED_FIELDS_SIZE + self.pub_key.block_size()
    }
}

/// Structural parse failures, summarised as [`CertError::Malformed`] by the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CertParseError {
    #[error("unrecognised signature type {0:#010x}")]
    UnknownSignatureType(u32),
    #[error("unrecognised public key type {0:#010x}")]
    UnknownPubKeyType(u32),
    #[error("computed end offset {computed:#x} does not match certificate size {actual:#x}")]
    LengthMismatch { computed: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum CertError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("signature issuer does not start with the root prefix")]
    BadIssuerPrefix,
    #[error("signature issuer carries no certificate names")]
    EmptyIssuer,
    #[error("certificate {0:?} not present in the E-ticket save")]
    NotFound(String),
    #[error("certificate {name:?} has invalid size {size:#x}")]
    SizeOutOfRange { name: String, size: u64 },
    #[error("short read: expected {expected:#x} bytes, got {read:#x}")]
    ShortRead { expected: u64, read: u64 },
    #[error("certificate {name:?} is malformed: {source}")]
    Malformed {
        name: String,
        #[source]
        source: CertParseError,
    },
    #[error("save container access failed: {0}")]
    Save(#[from] SaveError),
}

/// A parsed certificate: the recovered kind plus the untouched raw bytes.
///
/// The byte buffer is exactly what the save container held; consumers of a
/// raw chain expect it verbatim, so it is never normalised or mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    kind: CertKind,
    data: Vec<u8>,
}

impl Certificate {
    /// Take ownership of a raw certificate buffer, recovering its kind and
    /// validating the layout end-to-end.
    pub fn parse(data: Vec<u8>) -> Result<Self, CertParseError> {
        let kind = layout::recover_kind(&data)?;
        Ok(Self { kind, data })
    }

    #[must_use]
    pub fn kind(&self) -> CertKind {
        self.kind
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Issuer string embedded in the certificate body.
    #[must_use]
    pub fn issuer(&self) -> String {
        layout::field_string(&self.data, self.kind.sig.block_size(), layout::ISSUER_FIELD_SIZE)
    }

    /// Name string embedded in the certificate body.
    #[must_use]
    pub fn name(&self) -> String {
        let offset =
            self.kind.sig.block_size() + layout::ISSUER_FIELD_SIZE + layout::PUB_KEY_TYPE_SIZE;
        layout::field_string(&self.data, offset, layout::NAME_FIELD_SIZE)
    }

    /// Certificate id field (big-endian u32 after the name).
    #[must_use]
    pub fn cert_id(&self) -> u32 {
        let offset = self.kind.sig.block_size()
            + layout::ISSUER_FIELD_SIZE
            + layout::PUB_KEY_TYPE_SIZE
            + layout::NAME_FIELD_SIZE;
        layout::read_be_u32(&self.data, offset).unwrap_or(0)
    }
}

/// An ordered certificate chain, most-root-proximate first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertChain {
    certs: Vec<Certificate>,
}

impl CertChain {
    /// Build a chain from an already-ordered list. Empty chains are not
    /// representable through the store; this constructor mirrors that.
    pub fn new(certs: Vec<Certificate>) -> Result<Self, CertError> {
        if certs.is_empty() {
            return Err(CertError::EmptyIssuer);
        }
        Ok(Self { certs })
    }

    #[must_use]
    pub fn certs(&self) -> &[Certificate] {
        &self.certs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Sum of the raw sizes of every certificate in the chain.
    #[must_use]
    pub fn raw_size(&self) -> usize {
        self.certs.iter().map(Certificate::size).sum()
    }

    /// Concatenate the raw certificate bytes in chain order into a freshly
    /// allocated buffer. The chain itself is untouched.
    #[must_use]
    pub fn serialize_raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.raw_size());
        for cert in &self.certs {
            raw.extend_from_slice(cert.data());
        }
        raw
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Build a layout-exact certificate buffer for tests.
    pub fn build_cert_bytes(
        sig: SignatureAlgorithm,
        pub_key: PubKeyAlgorithm,
        issuer: &str,
        name: &str,
        cert_id: u32,
    ) -> Vec<u8> {
        let kind = CertKind { sig, pub_key };
        let mut data = vec![0u8; kind.cert_size()];
        data[..4].copy_from_slice(&sig.raw().to_be_bytes());
        for (i, byte) in data[4..sig.block_size()].iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(31).wrapping_add(7);
        }
        let issuer_off = sig.block_size();
        data[issuer_off..issuer_off + issuer.len()].copy_from_slice(issuer.as_bytes());
        let pk_type_off = issuer_off + layout::ISSUER_FIELD_SIZE;
        data[pk_type_off..pk_type_off + 4].copy_from_slice(&pub_key.raw().to_be_bytes());
        let name_off = pk_type_off + layout::PUB_KEY_TYPE_SIZE;
        data[name_off..name_off + name.len()].copy_from_slice(name.as_bytes());
        let id_off = name_off + layout::NAME_FIELD_SIZE;
        data[id_off..id_off + 4].copy_from_slice(&cert_id.to_be_bytes());
        for (i, byte) in data[id_off + 4..].iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(17).wrapping_add(3);
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::build_cert_bytes;
    use super::*;

    #[test]
    fn test_all_six_kinds_parse() {
        let sigs = [
            SignatureAlgorithm::Rsa4096Sha1,
            SignatureAlgorithm::Rsa4096Sha256,
            SignatureAlgorithm::Rsa2048Sha1,
            SignatureAlgorithm::Rsa2048Sha256,
            SignatureAlgorithm::Ecsda240Sha1,
            SignatureAlgorithm::Ecsda240Sha256,
        ];
        let keys = [
            PubKeyAlgorithm::Rsa4096,
            PubKeyAlgorithm::Rsa2048,
            PubKeyAlgorithm::Ecsda240,
        ];
        for sig in sigs {
            for pub_key in keys {
                let data = build_cert_bytes(sig, pub_key, "Root", "CA00000003", 7);
                let cert = Certificate::parse(data).unwrap();
                assert_eq!(cert.kind(), CertKind { sig, pub_key });
                assert_eq!(cert.size(), cert.kind().cert_size());
            }
        }
    }

    #[test]
    fn test_kind_sizes_match_layout_extremes() {
        let smallest = CertKind {
            sig: SignatureAlgorithm::Ecsda240Sha256,
            pub_key: PubKeyAlgorithm::Ecsda240,
        };
        let largest = CertKind {
            sig: SignatureAlgorithm::Rsa4096Sha1,
            pub_key: PubKeyAlgorithm::Rsa4096,
        };
        assert_eq!(smallest.cert_size(), CERT_MIN_SIZE);
        assert_eq!(largest.cert_size(), CERT_MAX_SIZE);
    }

    #[test]
    fn test_embedded_fields_round_trip() {
        let data = build_cert_bytes(
            SignatureAlgorithm::Rsa4096Sha256,
            PubKeyAlgorithm::Rsa2048,
            "Root",
            "CA00000003",
            0x0000_0003,
        );
        let cert = Certificate::parse(data).unwrap();
        assert_eq!(cert.issuer(), "Root");
        assert_eq!(cert.name(), "CA00000003");
        assert_eq!(cert.cert_id(), 3);
    }

    #[test]
    fn test_serialize_raw_concatenates_in_order() {
        let a = Certificate::parse(build_cert_bytes(
            SignatureAlgorithm::Rsa4096Sha256,
            PubKeyAlgorithm::Rsa2048,
            "Root",
            "CA00000003",
            1,
        ))
        .unwrap();
        let b = Certificate::parse(build_cert_bytes(
            SignatureAlgorithm::Rsa2048Sha256,
            PubKeyAlgorithm::Rsa2048,
            "Root-CA00000003",
            "XS00000020",
            2,
        ))
        .unwrap();
        let chain = CertChain::new(vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(chain.raw_size(), a.size() + b.size());
        let raw = chain.serialize_raw();
        assert_eq!(raw.len(), chain.raw_size());
        assert_eq!(&raw[..a.size()], a.data());
        assert_eq!(&raw[a.size()..], b.data());
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(matches!(CertChain::new(Vec::new()), Err(CertError::EmptyIssuer)));
    }
}
