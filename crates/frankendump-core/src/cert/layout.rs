//! On-disk certificate layout.
//!
//! All fields are contiguous with no padding between them:
//!
//! ```text
//! offset  field          width
//! ------  -------------  -------------------------
//! 0       sig_type       4 (big-endian)
//! 4       signature      algorithm-dependent (incl. trailing padding)
//! ...     issuer         0x40
//! ...     pub_key_type   4 (big-endian)
//! ...     name           0x40
//! ...     cert_id        4
//! ...     public_key     algorithm-dependent (incl. trailing padding)
//! ```
//!
//! Kind recovery walks these offsets and demands that the walk lands
//! exactly on the end of the buffer. Every read is bounds-checked; a
//! buffer too short for the next field fails instead of reading past it.

use super::{CertKind, CertParseError, PubKeyAlgorithm, SignatureAlgorithm};

/// Signature block sizes: 4-byte tag + signature + padding.
pub const SIG_BLOCK_RSA4096: usize = 0x240;
pub const SIG_BLOCK_RSA2048: usize = 0x140;
pub const SIG_BLOCK_ECSDA240: usize = 0x80;

/// Public-key block sizes: key material + exponent/padding.
pub const PUBKEY_BLOCK_RSA4096: usize = 0x238;
pub const PUBKEY_BLOCK_RSA2048: usize = 0x138;
pub const PUBKEY_BLOCK_ECSDA240: usize = 0x78;

pub const ISSUER_FIELD_SIZE: usize = 0x40;
pub const PUB_KEY_TYPE_SIZE: usize = 4;
pub const NAME_FIELD_SIZE: usize = 0x40;
pub const CERT_ID_SIZE: usize = 4;

/// Fixed middle section between the two algorithm-dependent blocks.
pub const FIXED_FIELDS_SIZE: usize =
    ISSUER_FIELD_SIZE + PUB_KEY_TYPE_SIZE + NAME_FIELD_SIZE + CERT_ID_SIZE;

/// Smallest valid certificate (ECSDA-240 signature, ECSDA-240 key).
pub const CERT_MIN_SIZE: usize = SIG_BLOCK_ECSDA240 + FIXED_FIELDS_SIZE + PUBKEY_BLOCK_ECSDA240;
/// Largest valid certificate (RSA-4096 signature, RSA-4096 key).
pub const CERT_MAX_SIZE: usize = SIG_BLOCK_RSA4096 + FIXED_FIELDS_SIZE + PUBKEY_BLOCK_RSA4096;

/// Bounds-checked big-endian u32 read.
pub(crate) fn read_be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Extract a NUL-padded string field, tolerating non-UTF-8 garbage.
pub(crate) fn field_string(data: &[u8], offset: usize, width: usize) -> String {
    let Some(field) = data.get(offset..offset + width) else {
        return String::new();
    };
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Walk the layout of a raw certificate buffer and recover its kind.
///
/// Succeeds iff both algorithm tags are recognised and the computed end
/// offset equals the buffer length exactly.
pub fn recover_kind(data: &[u8]) -> Result<CertKind, CertParseError> {
    let actual = data.len();

    let sig_raw = read_be_u32(data, 0).ok_or(CertParseError::LengthMismatch {
        computed: 4,
        actual,
    })?;
    let sig = SignatureAlgorithm::from_raw(sig_raw)
        .ok_or(CertParseError::UnknownSignatureType(sig_raw))?;

    let mut offset = sig.block_size() + ISSUER_FIELD_SIZE;

    let pk_raw = read_be_u32(data, offset).ok_or(CertParseError::LengthMismatch {
        computed: offset + PUB_KEY_TYPE_SIZE,
        actual,
    })?;
    let pub_key =
        PubKeyAlgorithm::from_raw(pk_raw).ok_or(CertParseError::UnknownPubKeyType(pk_raw))?;

    offset += PUB_KEY_TYPE_SIZE + NAME_FIELD_SIZE + CERT_ID_SIZE + pub_key.block_size();

    if offset != actual {
        return Err(CertParseError::LengthMismatch {
            computed: offset,
            actual,
        });
    }

    Ok(CertKind { sig, pub_key })
}
