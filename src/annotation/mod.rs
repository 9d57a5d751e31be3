//! Conversion of raw annotation records into YOLO label files.
//!
//! An annotation source is a YAML document with an `images` list. Each entry
//! carries a `meta` string (`image-<number>.jpg, <width>, <height>`) and a
//! list of `classId, x1, y1, x2, y2, <ignored>` box strings in source pixels:
//!
//! ```yaml
//! images:
//!   - meta: image-0000601.jpg, 1920, 1080
//!     annotations:
//!       - 10, 100, 200, 300, 400, 0
//! ```
//!
//! Boxes are converted to normalized center form, clamped to `[0, 1]`, and
//! written one file per image as `"<class> <xc> <yc> <w> <h>"` lines with six
//! decimals. Records that do not parse are skipped with a warning and never
//! abort the batch.

mod locate;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::UrlsetError;
use crate::types::{BBoxXYXY, ImageNumber, Normalized, Pixel};

pub use locate::{
    default_matchers, locate_annotation_file, locate_annotation_files, AnnotationMatcher,
    LocatedAnnotations,
};

const LABEL_EXTENSION: &str = "txt";

static META_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"image-(\d+)\.jpg,\s*(\d+),\s*(\d+)").expect("meta pattern is valid")
});

/// One box as recorded by the annotation tool, in source pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawAnnotation {
    pub class_id: u32,
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl RawAnnotation {
    pub fn bbox(&self) -> BBoxXYXY<Pixel> {
        BBoxXYXY::from_xyxy(self.x1 as f64, self.y1 as f64, self.x2 as f64, self.y2 as f64)
    }
}

/// A YOLO box: class plus center and size as fractions of the image.
///
/// All four floats are in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct NormalizedBox {
    pub class_id: u32,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    /// Normalizes a raw box against the image size, remapping its class.
    ///
    /// `image_width` and `image_height` must be non-zero.
    pub fn from_raw(
        raw: &RawAnnotation,
        image_width: u32,
        image_height: u32,
        mapping: &ClassMapping,
    ) -> Self {
        let normalized = raw
            .bbox()
            .to_normalized(image_width as f64, image_height as f64);
        let (cx, cy, w, h) = normalized.to_cxcywh();
        Self {
            class_id: mapping.remap(raw.class_id),
            x_center: clamp_unit(cx),
            y_center: clamp_unit(cy),
            width: clamp_unit(w),
            height: clamp_unit(h),
        }
    }

    /// Reconstructs pixel bounds for an image of the given size.
    pub fn to_pixel(&self, image_width: u32, image_height: u32) -> BBoxXYXY<Pixel> {
        let normalized: BBoxXYXY<Normalized> =
            BBoxXYXY::from_cxcywh(self.x_center, self.y_center, self.width, self.height);
        normalized.to_pixel(image_width as f64, image_height as f64)
    }

    /// The label-file encoding of this box.
    pub fn to_label_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NormalizedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.x_center, self.y_center, self.width, self.height
        )
    }
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// All boxes for one image, in source order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LabelRecord {
    pub number: ImageNumber,
    pub image_width: u32,
    pub image_height: u32,
    pub boxes: Vec<NormalizedBox>,
}

impl LabelRecord {
    /// Label file contents: box lines joined by `\n`, no trailing newline.
    pub fn to_label_text(&self) -> String {
        self.boxes
            .iter()
            .map(NormalizedBox::to_label_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Caller-supplied raw-to-output class table. Unlisted classes pass through.
///
/// The table is never inferred from the data; several raw classes may map to
/// the same output class.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClassMapping(BTreeMap<u32, u32>);

impl ClassMapping {
    pub fn new(pairs: impl IntoIterator<Item = (u32, u32)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    pub fn remap(&self, class_id: u32) -> u32 {
        self.0.get(&class_id).copied().unwrap_or(class_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromStr for ClassMapping {
    type Err = String;

    /// Parses `from:to` pairs separated by commas, e.g. `1:1,3:1,10:0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut pairs = BTreeMap::new();
        for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (from, to) = item
                .split_once(':')
                .ok_or_else(|| format!("expected 'from:to', found '{item}'"))?;
            let from = from
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid source class '{}'", from.trim()))?;
            let to = to
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid target class '{}'", to.trim()))?;
            if pairs.insert(from, to).is_some() {
                return Err(format!("source class {from} is mapped twice"));
            }
        }
        Ok(Self(pairs))
    }
}

/// The annotation document as stored by the annotation tool.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AnnotationSource {
    #[serde(default)]
    pub images: Vec<SourceEntry>,
}

/// One image entry of an [`AnnotationSource`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SourceEntry {
    #[serde(default)]
    pub meta: String,
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// Image identity and size parsed from a `meta` string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageMeta {
    pub number: ImageNumber,
    pub width: u32,
    pub height: u32,
}

/// Reads and parses an annotation source file.
pub fn read_annotation_source(path: &Path) -> Result<AnnotationSource, UrlsetError> {
    let data = fs::read_to_string(path).map_err(UrlsetError::Io)?;
    from_annotation_str(&data).map_err(|source| UrlsetError::AnnotationParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses an annotation source document.
pub fn from_annotation_str(data: &str) -> Result<AnnotationSource, serde_yaml::Error> {
    // An empty document deserializes to unit, not to an empty mapping.
    if data.trim().is_empty() {
        return Ok(AnnotationSource::default());
    }
    serde_yaml::from_str(data)
}

/// Parses `image-<number>.jpg, <width>, <height>`.
pub fn parse_meta(meta: &str) -> Result<ImageMeta, String> {
    let caps = META_PATTERN
        .captures(meta)
        .ok_or_else(|| format!("meta '{meta}' does not match 'image-<n>.jpg, <w>, <h>'"))?;

    let width = caps[2]
        .parse::<u32>()
        .map_err(|_| format!("image width '{}' out of range", &caps[2]))?;
    let height = caps[3]
        .parse::<u32>()
        .map_err(|_| format!("image height '{}' out of range", &caps[3]))?;
    if width == 0 || height == 0 {
        return Err(format!("image size {width}x{height} has a zero dimension"));
    }

    Ok(ImageMeta {
        number: ImageNumber::from(&caps[1]),
        width,
        height,
    })
}

/// Parses `classId, x1, y1, x2, y2, <ignored>`.
pub fn parse_annotation_line(line: &str) -> Result<RawAnnotation, String> {
    // Take at most 6 fields so pathological inputs do not allocate unbounded memory.
    let fields: Vec<&str> = line.split(',').map(str::trim).take(6).collect();
    if fields.len() < 6 {
        return Err(format!(
            "expected 6 comma-separated fields, found {}",
            fields.len()
        ));
    }

    let class_id = fields[0]
        .parse::<u32>()
        .map_err(|_| format!("invalid class id '{}'", fields[0]))?;
    let coord = |index: usize, name: &str| {
        fields[index]
            .parse::<i64>()
            .map_err(|_| format!("invalid {name} '{}'", fields[index]))
    };

    Ok(RawAnnotation {
        class_id,
        x1: coord(1, "x1")?,
        y1: coord(2, "y1")?,
        x2: coord(3, "x2")?,
        y2: coord(4, "y2")?,
    })
}

/// Fuzz-only entrypoint for annotation line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_annotation_line(input: &str) -> Result<(), String> {
    let raw = parse_annotation_line(input)?;
    let boxed = NormalizedBox::from_raw(&raw, 640, 480, &ClassMapping::default());
    assert!((0.0..=1.0).contains(&boxed.x_center));
    Ok(())
}

/// Converter options.
#[derive(Clone, Debug, Default)]
pub struct ConvertOptions {
    pub class_mapping: ClassMapping,
}

/// Records produced from one annotation source.
#[derive(Clone, Debug, Default)]
pub struct Conversion {
    /// Images with at least one box, keyed by image number.
    pub records: BTreeMap<ImageNumber, LabelRecord>,
    pub report: ConvertReport,
}

/// Converts every entry of `source`.
pub fn convert(source: &AnnotationSource, opts: &ConvertOptions) -> Conversion {
    let mut conversion = Conversion::default();
    let report = &mut conversion.report;
    report.entries = source.images.len();

    for (entry_idx, entry) in source.images.iter().enumerate() {
        let meta = match parse_meta(&entry.meta) {
            Ok(meta) => meta,
            Err(message) => {
                log::warn!("skipping entry {}: {message}", entry_idx + 1);
                report.skipped_entries += 1;
                continue;
            }
        };

        let mut boxes = Vec::with_capacity(entry.annotations.len());
        for line in &entry.annotations {
            match parse_annotation_line(line) {
                Ok(raw) => boxes.push(NormalizedBox::from_raw(
                    &raw,
                    meta.width,
                    meta.height,
                    &opts.class_mapping,
                )),
                Err(message) => {
                    log::warn!(
                        "skipping annotation '{line}' of image {}: {message}",
                        meta.number
                    );
                    report.skipped_lines += 1;
                }
            }
        }

        if boxes.is_empty() {
            report.empty_images += 1;
            continue;
        }

        report.boxes += boxes.len();
        let record = LabelRecord {
            number: meta.number.clone(),
            image_width: meta.width,
            image_height: meta.height,
            boxes,
        };
        if let Some(previous) = conversion.records.insert(meta.number, record) {
            log::warn!(
                "image {} appears more than once; keeping the last entry",
                previous.number
            );
            report.boxes -= previous.boxes.len();
            report.duplicate_images += 1;
        }
    }

    conversion.report.images = conversion.records.len();
    conversion
}

/// Label file name for an unsuffixed image number.
pub fn label_file_name(number: &ImageNumber) -> String {
    format!("image-{number}.{LABEL_EXTENSION}")
}

/// Writes one label file per record into `dir`, returning each file's path.
pub fn write_label_files(
    dir: &Path,
    records: &BTreeMap<ImageNumber, LabelRecord>,
) -> Result<BTreeMap<ImageNumber, PathBuf>, UrlsetError> {
    fs::create_dir_all(dir).map_err(|source| UrlsetError::LabelWrite {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = BTreeMap::new();
    for (number, record) in records {
        let path = dir.join(label_file_name(number));
        if let Err(source) = fs::write(&path, record.to_label_text()) {
            return Err(UrlsetError::LabelWrite { path, source });
        }
        written.insert(number.clone(), path);
    }
    Ok(written)
}

/// Counts collected while converting one annotation source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConvertReport {
    /// Entries in the source document.
    pub entries: usize,
    /// Images that produced a label record.
    pub images: usize,
    pub boxes: usize,
    /// Entries whose `meta` did not parse.
    pub skipped_entries: usize,
    /// Annotation lines that did not parse.
    pub skipped_lines: usize,
    /// Entries with a valid `meta` but no valid boxes.
    pub empty_images: usize,
    pub duplicate_images: usize,
}

impl fmt::Display for ConvertReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries -> {} labelled images, {} boxes",
            self.entries, self.images, self.boxes
        )?;
        if self.skipped_entries + self.skipped_lines + self.empty_images > 0 {
            write!(
                f,
                " (skipped {} entries, {} box lines; {} images without boxes)",
                self.skipped_entries, self.skipped_lines, self.empty_images
            )?;
        }
        Ok(())
    }
}
