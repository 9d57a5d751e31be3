#![allow(dead_code)]

use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use urlset::annotation::RawAnnotation;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Image sizes seen in practice, up to 4K.
pub fn arb_image_size() -> BoxedStrategy<(u32, u32)> {
    (1u32..=3840, 1u32..=2160).boxed()
}

/// Any raw box, including ones far outside the image or with swapped corners.
pub fn arb_raw_annotation() -> BoxedStrategy<RawAnnotation> {
    (
        0u32..16,
        -5000i64..10000,
        -5000i64..10000,
        -5000i64..10000,
        -5000i64..10000,
    )
        .prop_map(|(class_id, x1, y1, x2, y2)| RawAnnotation {
            class_id,
            x1,
            y1,
            x2,
            y2,
        })
        .boxed()
}

/// A well-formed raw box lying inside a `width x height` image.
pub fn arb_raw_annotation_within(width: u32, height: u32) -> BoxedStrategy<RawAnnotation> {
    let w = i64::from(width);
    let h = i64::from(height);
    (0u32..16, 0..=w, 0..=w, 0..=h, 0..=h)
        .prop_map(|(class_id, xa, xb, ya, yb)| RawAnnotation {
            class_id,
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
        })
        .boxed()
}

/// `(imageset, number, token)` cache records with realistic key shapes.
pub fn arb_cache_records() -> BoxedStrategy<Vec<(String, String, String)>> {
    prop::collection::vec(
        ("[0-9]{1,3}", "[0-9]{7}", "[A-Za-z0-9]{6}"),
        0..40,
    )
    .boxed()
}
