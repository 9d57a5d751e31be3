//! Fuzz target for suffix cache parsing.
//!
//! Malformed records must be skipped, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use urlset::suffix::fuzz_from_cache_str;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_from_cache_str(text);
});
