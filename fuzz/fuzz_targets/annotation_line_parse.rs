//! Fuzz target for single annotation line parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use urlset::annotation::fuzz_parse_annotation_line;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_parse_annotation_line(line);
});
