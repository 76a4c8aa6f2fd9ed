#![no_main]

use bacflow_core::codec::{decode, DecodedFrame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match decode(data) {
        Ok(DecodedFrame::Unrecognized { raw }) => assert_eq!(raw, data),
        Ok(_) => {}
        Err(e) => assert!(e.offset <= data.len()),
    }
});
