#![no_main]

use libfuzzer_sys::fuzz_target;

use frankendump_core::proto::{
    CommandHeader, FilePropertiesBlock, StartSessionBlock, StatusFrame,
};

fuzz_target!(|data: &[u8]| {
    let _ = CommandHeader::decode(data);
    let _ = StatusFrame::decode(data);
    let _ = StartSessionBlock::decode(data);
    let _ = FilePropertiesBlock::decode(data);
});
