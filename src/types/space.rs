//! Coordinate spaces a box can live in.
//!
//! Annotation boxes arrive in source-image pixels and labels are written as
//! fractions of the image size. [`BBoxXYXY`](super::BBoxXYXY) carries one of
//! these uninhabited markers so the two cannot be swapped silently.

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Pixel {}
    impl Sealed for super::Normalized {}
}

/// A coordinate space marker.
pub trait CoordSpace: sealed::Sealed {
    /// Short name used in debug output.
    const NAME: &'static str;
}

/// Source-image pixels, origin at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Fractions of the image width and height; label boxes sit in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Normalized {}

impl CoordSpace for Pixel {
    const NAME: &'static str = "pixel";
}

impl CoordSpace for Normalized {
    const NAME: &'static str = "normalized";
}
