//! Core value types shared by every stage of the pipeline.
//!
//! Remote images are addressed by three string keys ([`ImagesetId`],
//! [`ImageNumber`], [`SuffixToken`]); box geometry is carried in
//! [`BBoxXYXY`] tagged with its coordinate space so pixel-space annotation
//! boxes cannot be written out as normalized labels by accident.
//!
//! # Example
//!
//! ```
//! use urlset::types::{BBoxXYXY, Pixel};
//!
//! let bbox = BBoxXYXY::<Pixel>::from_xyxy(100.0, 200.0, 300.0, 400.0);
//! let (cx, cy, w, h) = bbox.to_normalized(1920.0, 1080.0).to_cxcywh();
//! assert!((cx - 0.104167).abs() < 1e-6);
//! assert!((w - 0.104167).abs() < 1e-6);
//! # let _ = (cy, h);
//! ```

mod bbox;
mod ids;
mod space;

pub use bbox::BBoxXYXY;
pub use ids::{ImageNumber, ImagesetId, SuffixToken};
pub use space::{CoordSpace, Normalized, Pixel};
