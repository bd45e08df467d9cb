//! CertStore scenarios over the in-memory save.

use frankendump_core::cert::store::{CERT_SAVE_CONTAINER_PATH, CERT_STORAGE_BASE_PATH};
use frankendump_core::cert::{
    CertError, CertParseError, CertStore, PubKeyAlgorithm, SignatureAlgorithm,
};
use frankendump_fixture::certgen::{self, CertSpec};
use frankendump_fixture::MemSaveStore;

fn seeded_store() -> CertStore<MemSaveStore> {
    let mut saves = MemSaveStore::new();
    certgen::seed_standard_chain(&mut saves);
    CertStore::new(saves)
}

#[test]
fn test_load_ca_certificate_by_name() {
    let store = seeded_store();
    let cert = store.certificate_by_name("CA00000003").unwrap();
    assert_eq!(cert.size(), 0x400);
    assert_eq!(cert.kind().sig, SignatureAlgorithm::Rsa4096Sha256);
    assert_eq!(cert.kind().pub_key, PubKeyAlgorithm::Rsa2048);
    assert_eq!(cert.name(), "CA00000003");
    assert_eq!(cert.issuer(), "Root");
}

#[test]
fn test_chain_preserves_issuer_order() {
    let store = seeded_store();
    let chain = store.chain_by_issuer("Root-CA00000003-XS00000020").unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain.certs()[0].name(), "CA00000003");
    assert_eq!(chain.certs()[1].name(), "XS00000020");
}

#[test]
fn test_raw_chain_single_link_is_verbatim() {
    let store = seeded_store();
    let cert = store.certificate_by_name("CA00000003").unwrap();
    let raw = store.raw_chain_by_issuer("Root-CA00000003").unwrap();
    assert_eq!(raw.len(), cert.size());
    assert_eq!(raw, cert.data());
}

#[test]
fn test_raw_chain_concatenates_both_links() {
    let store = seeded_store();
    let ca = store.certificate_by_name("CA00000003").unwrap();
    let xs = store.certificate_by_name("XS00000020").unwrap();
    let raw = store.raw_chain_by_issuer("Root-CA00000003-XS00000020").unwrap();
    assert_eq!(raw.len(), ca.size() + xs.size());
    assert_eq!(&raw[..ca.size()], ca.data());
    assert_eq!(&raw[ca.size()..], xs.data());
}

#[test]
fn test_missing_certificate_aborts_chain() {
    let store = seeded_store();
    let err = store
        .chain_by_issuer("Root-CA00000003-XX00000099")
        .unwrap_err();
    match err {
        CertError::NotFound(name) => assert_eq!(name, "XX00000099"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn test_issuer_edge_cases_are_distinct_errors() {
    let store = seeded_store();
    assert!(matches!(
        store.chain_by_issuer(""),
        Err(CertError::InvalidArgument(_))
    ));
    assert!(matches!(
        store.chain_by_issuer("CA00000003"),
        Err(CertError::BadIssuerPrefix)
    ));
    assert!(matches!(
        store.chain_by_issuer("Root-"),
        Err(CertError::EmptyIssuer)
    ));
    assert!(matches!(
        store.chain_by_issuer("Root---"),
        Err(CertError::EmptyIssuer)
    ));
}

#[test]
fn test_empty_name_rejected() {
    let store = seeded_store();
    assert!(matches!(
        store.certificate_by_name(""),
        Err(CertError::InvalidArgument(_))
    ));
}

#[test]
fn test_size_out_of_range() {
    let mut saves = MemSaveStore::new();
    saves.insert_file(
        CERT_SAVE_CONTAINER_PATH,
        &format!("{CERT_STORAGE_BASE_PATH}TINY"),
        vec![0u8; 0x10],
    );
    let store = CertStore::new(saves);
    assert!(matches!(
        store.certificate_by_name("TINY"),
        Err(CertError::SizeOutOfRange { size: 0x10, .. })
    ));
}

#[test]
fn test_short_read_detected() {
    let mut saves = MemSaveStore::new();
    certgen::seed_standard_chain(&mut saves);
    saves.set_read_cap(Some(0x100));
    let store = CertStore::new(saves);
    assert!(matches!(
        store.certificate_by_name("CA00000003"),
        Err(CertError::ShortRead {
            expected: 0x400,
            read: 0x100,
        })
    ));
}

#[test]
fn test_garbage_certificate_is_malformed() {
    let mut saves = MemSaveStore::new();
    saves.insert_file(
        CERT_SAVE_CONTAINER_PATH,
        &format!("{CERT_STORAGE_BASE_PATH}JUNK"),
        vec![0xFFu8; 0x200],
    );
    let store = CertStore::new(saves);
    assert!(matches!(
        store.certificate_by_name("JUNK"),
        Err(CertError::Malformed {
            source: CertParseError::UnknownSignatureType(_),
            ..
        })
    ));
}

#[test]
fn test_padded_certificate_fails_length_check() {
    let mut bytes = certgen::build_certificate(&CertSpec {
        sig: SignatureAlgorithm::Rsa2048Sha256,
        pub_key: PubKeyAlgorithm::Rsa2048,
        issuer: "Root",
        name: "PAD",
        cert_id: 1,
    });
    bytes.extend_from_slice(&[0u8; 4]);
    let mut saves = MemSaveStore::new();
    saves.insert_file(
        CERT_SAVE_CONTAINER_PATH,
        &format!("{CERT_STORAGE_BASE_PATH}PAD"),
        bytes,
    );
    let store = CertStore::new(saves);
    assert!(matches!(
        store.certificate_by_name("PAD"),
        Err(CertError::Malformed {
            source: CertParseError::LengthMismatch { .. },
            ..
        })
    ));
}
