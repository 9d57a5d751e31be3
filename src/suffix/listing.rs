//! Extraction of `(number, suffix)` pairs from a directory listing page.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{ImageNumber, SuffixToken};

static SUFFIXED_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"image-(\d+)_([A-Za-z0-9]+)\.jpg").expect("suffixed image pattern is valid")
});

/// Scans a listing body for every `image-<number>_<token>.jpg` filename.
///
/// Listings usually mention each file more than once (link target and link
/// text). The first token seen for a number wins.
pub fn parse_listing(body: &str) -> BTreeMap<ImageNumber, SuffixToken> {
    let mut found = BTreeMap::new();
    for caps in SUFFIXED_IMAGE.captures_iter(body) {
        found
            .entry(ImageNumber::from(&caps[1]))
            .or_insert_with(|| SuffixToken::from(&caps[2]));
    }
    found
}

/// Returns `(number, token)` if `file_name` is itself a suffixed image name.
pub fn parse_suffixed_name(file_name: &str) -> Option<(ImageNumber, SuffixToken)> {
    let caps = SUFFIXED_IMAGE.captures(file_name)?;
    Some((ImageNumber::from(&caps[1]), SuffixToken::from(&caps[2])))
}

/// Fuzz-only entrypoint for listing scanning.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_listing(input: &str) -> usize {
    parse_listing(input).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body><h1>Index of /images/1_145/</h1><pre>
<a href="../">../</a>
<a href="image-0000601_EGD3NF.jpg">image-0000601_EGD3NF.jpg</a>   12-Mar-2024 10:01   183201
<a href="image-0000602_q8Zt1a.jpg">image-0000602_q8Zt1a.jpg</a>   12-Mar-2024 10:01   190442
<a href="image-0000603.png">image-0000603.png</a>   12-Mar-2024 10:01   190442
<a href="notes.txt">notes.txt</a>
</pre></body></html>"#;

    #[test]
    fn extracts_unique_pairs() {
        let found = parse_listing(LISTING);
        assert_eq!(found.len(), 2);
        assert_eq!(found.get("0000601").map(SuffixToken::as_str), Some("EGD3NF"));
        assert_eq!(found.get("0000602").map(SuffixToken::as_str), Some("q8Zt1a"));
        assert!(!found.contains_key("0000603"));
    }

    #[test]
    fn first_token_wins_within_a_listing() {
        let found = parse_listing("image-1_AAA.jpg image-1_BBB.jpg");
        assert_eq!(found.get("1").map(SuffixToken::as_str), Some("AAA"));
    }

    #[test]
    fn empty_listing_yields_nothing() {
        assert!(parse_listing("").is_empty());
        assert!(parse_listing("<html>403 Forbidden</html>").is_empty());
    }

    #[test]
    fn parses_single_file_names() {
        let (number, token) = parse_suffixed_name("image-0000601_EGD3NF.jpg").expect("match");
        assert_eq!(number.as_str(), "0000601");
        assert_eq!(token.as_str(), "EGD3NF");
        assert!(parse_suffixed_name("image-0000601.jpg").is_none());
    }
}
