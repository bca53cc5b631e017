#![no_main]

use hart_rs::hart::frame::{checksum, decode, Frame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode(data);

    // Force a valid checksum so the structural checks get exercised
    if data.len() > 1 {
        let mut fixed = data.to_vec();
        let last = fixed.len() - 1;
        fixed[last] = checksum(&fixed[..last]);
        if let Ok(frame) = Frame::parse(&fixed) {
            assert_eq!(frame.as_bytes(), fixed.as_slice());
            assert_eq!(frame.data().len(), usize::from(frame.byte_count()));
        }
        let _ = decode(&fixed);
    }
});
