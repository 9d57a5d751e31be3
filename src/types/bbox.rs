//! Axis-aligned boxes in XYXY form, tagged with their coordinate space.

use std::fmt;
use std::marker::PhantomData;

use super::{CoordSpace, Normalized, Pixel};

/// An axis-aligned bounding box (xmin, ymin, xmax, ymax).
///
/// `TSpace` is [`Pixel`] or [`Normalized`]. Construction does not enforce
/// `min <= max`: raw annotations are not guaranteed to be well formed and
/// the conversion clamps rather than rejects.
#[derive(Clone, Copy, PartialEq)]
pub struct BBoxXYXY<TSpace> {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> BBoxXYXY<TSpace> {
    /// Creates a box from explicit corner coordinates.
    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            _space: PhantomData,
        }
    }

    #[inline]
    pub fn xmin(&self) -> f64 {
        self.xmin
    }

    #[inline]
    pub fn ymin(&self) -> f64 {
        self.ymin
    }

    #[inline]
    pub fn xmax(&self) -> f64 {
        self.xmax
    }

    #[inline]
    pub fn ymax(&self) -> f64 {
        self.ymax
    }

    /// Width of the box. Negative if the corners are swapped.
    #[inline]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Height of the box. Negative if the corners are swapped.
    #[inline]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Center point as `(cx, cy)`.
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    /// Returns true if all coordinates are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.xmin.is_finite()
            && self.ymin.is_finite()
            && self.xmax.is_finite()
            && self.ymax.is_finite()
    }

    /// Builds a box from center point and size.
    #[inline]
    pub fn from_cxcywh(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self::from_xyxy(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    /// Returns `(cx, cy, w, h)`.
    #[inline]
    pub fn to_cxcywh(&self) -> (f64, f64, f64, f64) {
        let (cx, cy) = self.center();
        (cx, cy, self.width(), self.height())
    }
}

impl<TSpace: CoordSpace> fmt::Debug for BBoxXYXY<TSpace> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BBoxXYXY")
            .field("space", &TSpace::NAME)
            .field("xmin", &self.xmin)
            .field("ymin", &self.ymin)
            .field("xmax", &self.xmax)
            .field("ymax", &self.ymax)
            .finish()
    }
}

impl BBoxXYXY<Pixel> {
    /// Converts pixel coordinates to fractions of the image size.
    pub fn to_normalized(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Normalized> {
        BBoxXYXY::from_xyxy(
            self.xmin / image_width,
            self.ymin / image_height,
            self.xmax / image_width,
            self.ymax / image_height,
        )
    }
}

impl BBoxXYXY<Normalized> {
    /// Converts fractions of the image size back to pixel coordinates.
    pub fn to_pixel(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Pixel> {
        BBoxXYXY::from_xyxy(
            self.xmin * image_width,
            self.ymin * image_height,
            self.xmax * image_width,
            self.ymax * image_height,
        )
    }
}
