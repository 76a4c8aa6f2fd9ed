#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Err(e) = bacflow_core::codec::decode_npdu_frame(data) {
        assert!(e.offset <= data.len());
    }
});
