#![no_main]

use libfuzzer_sys::fuzz_target;

use frankendump_core::cert::CertStore;
use frankendump_fixture::MemSaveStore;

fuzz_target!(|data: &[u8]| {
    if let Ok(issuer) = std::str::from_utf8(data) {
        // Empty store: every lookup fails, but tokenization and error
        // propagation must stay panic-free for arbitrary issuer strings.
        let store = CertStore::new(MemSaveStore::new());
        let _ = store.chain_by_issuer(issuer);
    }
});
