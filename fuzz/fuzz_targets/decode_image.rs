#![no_main]
use libfuzzer_sys::fuzz_target;

use tiffcore::decoder::{Decoder, Limits};

fuzz_target!(|data: &[u8]| {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1_000_000;
    limits.ifd_value_size = 1_000_000;
    limits.intermediate_buffer_size = 1_000_000;

    let decoder = Decoder::new(data).with_limits(limits);

    let _ = decoder.image_info();
    let _ = decoder.dump();
    if let Ok(contents) = decoder.read_directories(true) {
        for directory in &contents.directories {
            let _ = decoder.decode_directory(directory);
        }
    }
});
