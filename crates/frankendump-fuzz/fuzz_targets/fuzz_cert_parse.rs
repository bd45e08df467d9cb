#![no_main]

use libfuzzer_sys::fuzz_target;

use frankendump_core::cert::Certificate;
use frankendump_core::cert::layout::recover_kind;

fuzz_target!(|data: &[u8]| {
    // Kind recovery must never read past the buffer or panic.
    let _ = recover_kind(data);
    let _ = Certificate::parse(data.to_vec());
});
