#![no_main]

use bacflow_datalink::bip::bvlc::BvllFrame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = BvllFrame::decode(data) {
        assert!(frame.npdu.len() <= data.len());
    }
});
