//! Fuzz target for directory listing scanning.
//!
//! Feeds arbitrary UTF-8 pages to the listing scanner, checking for panics,
//! crashes, or hangs.

#![no_main]

use libfuzzer_sys::fuzz_target;
use urlset::suffix::fuzz_parse_listing;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(page) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_parse_listing(page);
});
