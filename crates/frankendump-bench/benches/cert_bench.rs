use criterion::{Criterion, black_box, criterion_group, criterion_main};

use frankendump_core::cert::layout::recover_kind;
use frankendump_core::cert::{CertStore, PubKeyAlgorithm, SignatureAlgorithm};
use frankendump_fixture::certgen::{self, CertSpec};
use frankendump_fixture::MemSaveStore;

fn bench_recover_kind(c: &mut Criterion) {
    let data = certgen::build_certificate(&CertSpec {
        sig: SignatureAlgorithm::Rsa4096Sha256,
        pub_key: PubKeyAlgorithm::Rsa2048,
        issuer: "Root",
        name: "CA00000003",
        cert_id: 3,
    });
    c.bench_function("cert_recover_kind", |b| {
        b.iter(|| recover_kind(black_box(&data)))
    });
}

fn bench_chain_assembly(c: &mut Criterion) {
    let mut saves = MemSaveStore::new();
    certgen::seed_standard_chain(&mut saves);
    let store = CertStore::new(saves);
    c.bench_function("cert_raw_chain", |b| {
        b.iter(|| {
            store
                .raw_chain_by_issuer(black_box("Root-CA00000003-XS00000020"))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_recover_kind, bench_chain_assembly);
criterion_main!(benches);
