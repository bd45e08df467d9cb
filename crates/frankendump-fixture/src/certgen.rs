//! Layout-exact certificate byte builders.
//!
//! Fixture certificates carry deterministic pseudo-random signature and
//! key material so raw-chain content checks are byte-for-byte repeatable.

use frankendump_core::cert::layout::{
    CERT_ID_SIZE, ISSUER_FIELD_SIZE, NAME_FIELD_SIZE, PUB_KEY_TYPE_SIZE,
};
use frankendump_core::cert::store::{CERT_SAVE_CONTAINER_PATH, CERT_STORAGE_BASE_PATH};
use frankendump_core::cert::{CertKind, PubKeyAlgorithm, SignatureAlgorithm};

use crate::save::MemSaveStore;

/// Everything needed to fabricate one certificate.
#[derive(Debug, Clone, Copy)]
pub struct CertSpec<'a> {
    pub sig: SignatureAlgorithm,
    pub pub_key: PubKeyAlgorithm,
    pub issuer: &'a str,
    pub name: &'a str,
    pub cert_id: u32,
}

/// Build the raw bytes of a certificate matching `spec`. Issuer and name
/// are truncated to their field widths if necessary.
#[must_use]
pub fn build_certificate(spec: &CertSpec<'_>) -> Vec<u8> {
    let kind = CertKind {
        sig: spec.sig,
        pub_key: spec.pub_key,
    };
    let mut data = vec![0u8; kind.cert_size()];

    data[..4].copy_from_slice(&spec.sig.raw().to_be_bytes());
    fill_pattern(&mut data[4..spec.sig.block_size()], spec.cert_id as u8);

    let issuer_off = spec.sig.block_size();
    write_field(&mut data[issuer_off..issuer_off + ISSUER_FIELD_SIZE], spec.issuer);

    let pk_type_off = issuer_off + ISSUER_FIELD_SIZE;
    data[pk_type_off..pk_type_off + PUB_KEY_TYPE_SIZE]
        .copy_from_slice(&spec.pub_key.raw().to_be_bytes());

    let name_off = pk_type_off + PUB_KEY_TYPE_SIZE;
    write_field(&mut data[name_off..name_off + NAME_FIELD_SIZE], spec.name);

    let id_off = name_off + NAME_FIELD_SIZE;
    data[id_off..id_off + CERT_ID_SIZE].copy_from_slice(&spec.cert_id.to_be_bytes());

    fill_pattern(&mut data[id_off + CERT_ID_SIZE..], spec.cert_id.wrapping_mul(3) as u8);
    data
}

/// Build and seed a certificate into the E-ticket save of `store`.
pub fn seed_certificate(store: &mut MemSaveStore, spec: &CertSpec<'_>) {
    let path = format!("{CERT_STORAGE_BASE_PATH}{}", spec.name);
    store.insert_file(CERT_SAVE_CONTAINER_PATH, &path, build_certificate(spec));
}

/// Seed the store with the standard two-link fixture chain:
/// `CA00000003` (RSA-4096-SHA256 signature over an RSA-2048 key, 0x400
/// bytes) issued by `Root`, and `XS00000020` (RSA-2048-SHA256 over
/// RSA-2048, 0x300 bytes) issued by `Root-CA00000003`.
pub fn seed_standard_chain(store: &mut MemSaveStore) {
    seed_certificate(
        store,
        &CertSpec {
            sig: SignatureAlgorithm::Rsa4096Sha256,
            pub_key: PubKeyAlgorithm::Rsa2048,
            issuer: "Root",
            name: "CA00000003",
            cert_id: 3,
        },
    );
    seed_certificate(
        store,
        &CertSpec {
            sig: SignatureAlgorithm::Rsa2048Sha256,
            pub_key: PubKeyAlgorithm::Rsa2048,
            issuer: "Root-CA00000003",
            name: "XS00000020",
            cert_id: 0x20,
        },
    );
}

fn write_field(field: &mut [u8], text: &str) {
    let n = text.len().min(field.len());
    field[..n].copy_from_slice(&text.as_bytes()[..n]);
}

fn fill_pattern(region: &mut [u8], seed: u8) {
    for (i, byte) in region.iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(31).wrapping_add(seed ^ 0x5A);
    }
}
