//! Train/validation dataset assembly.
//!
//! Label files are staged per imageset under `<output>/.staging/<id>/`, then
//! paired with resolved image URLs, shuffled, split and copied into
//! `labels/train` and `labels/val`. The URL lists and `dataset.yaml` are
//! rewritten from scratch on every run.

mod manifest;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use walkdir::WalkDir;

use crate::annotation::{
    convert, default_matchers, locate_annotation_files, read_annotation_source,
    write_label_files, ConvertOptions, ConvertReport,
};
use crate::error::UrlsetError;
use crate::fetch::destination_name;
use crate::suffix::{SuffixResolver, UnresolvedPolicy};
use crate::types::{ImageNumber, ImagesetId};

pub use manifest::{read_manifest, write_manifest, DatasetManifest, MANIFEST_FILE};

const STAGING_DIR: &str = ".staging";
const LABELS_DIR: &str = "labels";
const IMAGES_DIR: &str = "images";
const TRAIN_LIST: &str = "train.txt";
const VAL_LIST: &str = "val.txt";

/// Assembly options.
#[derive(Clone, Debug)]
pub struct AssembleOptions {
    /// Fraction of pairs that go to the train split, in `[0, 1]`.
    pub split_ratio: f64,
    /// Shuffle seed. `None` draws from the OS RNG.
    pub seed: Option<u64>,
    /// Output class names, indexed by output class id.
    pub class_names: Vec<String>,
    pub unresolved: UnresolvedPolicy,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            split_ratio: 0.8,
            seed: None,
            class_names: vec!["red".to_string(), "blue".to_string()],
            unresolved: UnresolvedPolicy::Skip,
        }
    }
}

/// Validate assembly options before running.
pub fn validate_assemble_options(opts: &AssembleOptions) -> Result<(), UrlsetError> {
    if !(0.0..=1.0).contains(&opts.split_ratio) {
        return Err(UrlsetError::InvalidOption {
            message: format!(
                "split ratio must be in the interval [0.0, 1.0], got {}",
                opts.split_ratio
            ),
        });
    }
    if opts.class_names.is_empty() {
        return Err(UrlsetError::InvalidOption {
            message: "at least one class name is required".to_string(),
        });
    }
    if opts.class_names.iter().any(|name| name.trim().is_empty()) {
        return Err(UrlsetError::InvalidOption {
            message: "class names must not be blank".to_string(),
        });
    }
    Ok(())
}

/// The staging directory used by a dataset rooted at `output_dir`.
pub fn staging_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(STAGING_DIR)
}

/// Converted label files of one imageset, waiting to be assembled.
#[derive(Clone, Debug)]
pub struct StagedImageset {
    pub imageset: ImagesetId,
    pub labels: BTreeMap<ImageNumber, PathBuf>,
    pub convert: ConvertReport,
}

/// Converts one annotation file into staged label files.
pub fn stage_imageset(
    output_dir: &Path,
    imageset: &ImagesetId,
    annotation_file: &Path,
    opts: &ConvertOptions,
) -> Result<StagedImageset, UrlsetError> {
    let source = read_annotation_source(annotation_file)?;
    let conversion = convert(&source, opts);
    let dir = staging_dir(output_dir).join(imageset.as_str());
    let labels = write_label_files(&dir, &conversion.records)?;
    log::info!("imageset {imageset}: {}", conversion.report);
    Ok(StagedImageset {
        imageset: imageset.clone(),
        labels,
        convert: conversion.report,
    })
}

/// One image URL bound to its label file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedPair {
    pub imageset: ImagesetId,
    pub number: ImageNumber,
    pub url: String,
    pub label_path: PathBuf,
    pub guessed: bool,
}

impl ResolvedPair {
    /// File name of the label copy inside a split directory: the URL basename
    /// with a `.txt` extension.
    pub fn split_label_name(&self) -> String {
        match destination_name(&self.url) {
            Some(name) => Path::new(&name)
                .with_extension("txt")
                .to_string_lossy()
                .into_owned(),
            None => format!("image-{}.txt", self.number),
        }
    }
}

/// Disjoint train and validation pairs.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DatasetSplit {
    pub train: Vec<ResolvedPair>,
    pub val: Vec<ResolvedPair>,
}

impl DatasetSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shuffles `items` and splits them at `floor(ratio * len)`.
///
/// The first part is the train split. The same seed and input order always
/// give the same split.
pub fn split_items<T>(mut items: Vec<T>, ratio: f64, seed: Option<u64>) -> (Vec<T>, Vec<T>) {
    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed);
        items.shuffle(&mut rng);
    } else {
        let mut rng = rand::rng();
        items.shuffle(&mut rng);
    }

    let train_len = ((ratio * items.len() as f64).floor() as usize).min(items.len());
    let val = items.split_off(train_len);
    (items, val)
}

/// Pairs staged labels with image URLs.
///
/// Returns the pooled pairs, in imageset then image number order, and one
/// report row per imageset.
pub fn pair_labels<C>(
    staged: &[StagedImageset],
    resolver: &SuffixResolver<C>,
    policy: UnresolvedPolicy,
) -> (Vec<ResolvedPair>, Vec<ImagesetAssembly>) {
    let mut pairs = Vec::new();
    let mut rows = Vec::with_capacity(staged.len());

    for imageset in staged {
        let mut row = ImagesetAssembly {
            imageset: imageset.imageset.clone(),
            converted: imageset.labels.len(),
            resolved: 0,
            guessed: 0,
            dropped: 0,
        };
        for (number, label_path) in &imageset.labels {
            match resolver.image_url(&imageset.imageset, number, policy) {
                Some(image_url) => {
                    if image_url.guessed {
                        row.guessed += 1;
                    } else {
                        row.resolved += 1;
                    }
                    pairs.push(ResolvedPair {
                        imageset: imageset.imageset.clone(),
                        number: number.clone(),
                        url: image_url.url,
                        label_path: label_path.clone(),
                        guessed: image_url.guessed,
                    });
                }
                None => {
                    log::debug!(
                        "dropping image {number} of imageset {}: no suffix",
                        imageset.imageset
                    );
                    row.dropped += 1;
                }
            }
        }
        if row.dropped > 0 {
            log::warn!(
                "imageset {}: {} of {} labelled image(s) have no resolved URL",
                row.imageset,
                row.dropped,
                row.converted
            );
        }
        rows.push(row);
    }

    (pairs, rows)
}

fn recreate_dir(path: &Path) -> Result<(), UrlsetError> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(UrlsetError::Io)?;
    }
    fs::create_dir_all(path).map_err(|source| UrlsetError::LabelWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Copies each pair's label into `dir` and returns the pairs that made it.
///
/// A failed copy is logged and recorded in `failures`; the pair is left out
/// so the URL lists only name images that have a label.
fn copy_split_labels(
    pairs: Vec<ResolvedPair>,
    dir: &Path,
    failures: &mut Vec<LabelCopyFailure>,
) -> Vec<ResolvedPair> {
    let mut copied = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let target = dir.join(pair.split_label_name());
        if target.exists() {
            log::warn!(
                "{} is produced by more than one image; keeping the last",
                target.display()
            );
        }
        match fs::copy(&pair.label_path, &target) {
            Ok(_) => copied.push(pair),
            Err(err) => {
                log::warn!(
                    "failed to copy label {} to {}: {err}; leaving image {} of imageset {} out",
                    pair.label_path.display(),
                    target.display(),
                    pair.number,
                    pair.imageset
                );
                failures.push(LabelCopyFailure {
                    imageset: pair.imageset,
                    number: pair.number,
                    label_path: pair.label_path,
                    error: err.to_string(),
                });
            }
        }
    }
    copied
}

fn write_url_list(path: &Path, pairs: &[ResolvedPair]) -> Result<(), UrlsetError> {
    let mut content = String::new();
    for pair in pairs {
        content.push_str(&pair.url);
        content.push('\n');
    }
    fs::write(path, content).map_err(|source| UrlsetError::UrlListWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Result of [`assemble`].
#[derive(Clone, Debug)]
pub struct Assembled {
    pub split: DatasetSplit,
    pub manifest: DatasetManifest,
    pub report: AssembleReport,
}

/// Splits staged imagesets and writes the dataset under `output_dir`.
///
/// The staging tree is removed once the split label copies are written. A
/// label that cannot be copied drops its pair from the split and is listed
/// in the report's `copy_failures`.
pub fn assemble<C>(
    output_dir: &Path,
    staged: &[StagedImageset],
    resolver: &SuffixResolver<C>,
    opts: &AssembleOptions,
) -> Result<Assembled, UrlsetError> {
    validate_assemble_options(opts)?;
    fs::create_dir_all(output_dir).map_err(UrlsetError::Io)?;
    let root = fs::canonicalize(output_dir).map_err(UrlsetError::Io)?;

    let (pairs, rows) = pair_labels(staged, resolver, opts.unresolved);
    let (train, val) = split_items(pairs, opts.split_ratio, opts.seed);

    let train_dir = root.join(LABELS_DIR).join("train");
    let val_dir = root.join(LABELS_DIR).join("val");
    recreate_dir(&train_dir)?;
    recreate_dir(&val_dir)?;
    let mut copy_failures = Vec::new();
    let train = copy_split_labels(train, &train_dir, &mut copy_failures);
    let val = copy_split_labels(val, &val_dir, &mut copy_failures);

    write_url_list(&root.join(TRAIN_LIST), &train)?;
    write_url_list(&root.join(VAL_LIST), &val)?;

    let manifest = DatasetManifest::new(&root, TRAIN_LIST, VAL_LIST, &opts.class_names);
    write_manifest(&root.join(MANIFEST_FILE), &manifest)?;

    let staging = staging_dir(&root);
    if staging.exists() {
        if let Err(err) = fs::remove_dir_all(&staging) {
            log::warn!("failed to remove staging directory {}: {err}", staging.display());
        }
    }

    let report = AssembleReport {
        imagesets: rows,
        missing_annotations: Vec::new(),
        failed_imagesets: Vec::new(),
        copy_failures,
        train: train.len(),
        val: val.len(),
        output_dir: root,
    };
    log::info!(
        "dataset written: {} train, {} val",
        report.train,
        report.val
    );
    if !report.copy_failures.is_empty() {
        log::warn!(
            "{} label file(s) could not be copied",
            report.copy_failures.len()
        );
    }

    Ok(Assembled {
        split: DatasetSplit { train, val },
        manifest,
        report,
    })
}

/// Locates, converts and assembles every imageset in one pass.
///
/// Imagesets without an annotation file, or whose file cannot be read, are
/// skipped and listed in the report.
pub fn build_dataset<C>(
    annotations_dir: &Path,
    imagesets: &[ImagesetId],
    resolver: &SuffixResolver<C>,
    output_dir: &Path,
    convert_opts: &ConvertOptions,
    assemble_opts: &AssembleOptions,
) -> Result<Assembled, UrlsetError> {
    validate_assemble_options(assemble_opts)?;
    let located = locate_annotation_files(annotations_dir, imagesets, &default_matchers())?;

    let staging = staging_dir(output_dir);
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(UrlsetError::Io)?;
    }

    let mut staged = Vec::with_capacity(located.found.len());
    let mut failed = Vec::new();
    for imageset in imagesets {
        let Some(path) = located.found.get(imageset) else {
            continue;
        };
        if staged.iter().any(|s: &StagedImageset| &s.imageset == imageset) {
            continue;
        }
        match stage_imageset(output_dir, imageset, path, convert_opts) {
            Ok(done) => staged.push(done),
            Err(err) => {
                log::warn!("skipping imageset {imageset}: {err}");
                failed.push(ImagesetFailure {
                    imageset: imageset.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    let mut assembled = assemble(output_dir, &staged, resolver, assemble_opts)?;
    assembled.report.missing_annotations = located.missing;
    assembled.report.failed_imagesets = failed;
    Ok(assembled)
}

/// Result of [`write_local_manifest`].
#[derive(Clone, Debug, Serialize)]
pub struct LocalizeReport {
    pub labels_copied: usize,
    pub manifest_path: PathBuf,
}

impl fmt::Display for LocalizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Copied {} label file(s); local manifest at {}",
            self.labels_copied,
            self.manifest_path.display()
        )?;
        writeln!(f, "Place images under images/train and images/val")
    }
}

/// Derives a local-image copy of a URL dataset.
///
/// Copies `labels/`, creates `images/train` and `images/val`, and writes a
/// manifest pointing at those directories. Class names are carried over.
pub fn write_local_manifest(
    url_dataset_dir: &Path,
    output_dir: &Path,
) -> Result<LocalizeReport, UrlsetError> {
    let source_labels = url_dataset_dir.join(LABELS_DIR);
    if !source_labels.is_dir() {
        return Err(UrlsetError::MissingInput {
            path: source_labels,
            what: "dataset labels directory".to_string(),
        });
    }
    let source_manifest = read_manifest(&url_dataset_dir.join(MANIFEST_FILE))?;

    fs::create_dir_all(output_dir).map_err(UrlsetError::Io)?;
    let root = fs::canonicalize(output_dir).map_err(UrlsetError::Io)?;

    let target_labels = root.join(LABELS_DIR);
    let mut labels_copied = 0;
    for entry in WalkDir::new(&source_labels).sort_by_file_name() {
        let entry = entry.map_err(|e| UrlsetError::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(&source_labels)
            .map_err(|e| UrlsetError::Io(std::io::Error::other(e)))?;
        let target = target_labels.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(UrlsetError::Io)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(UrlsetError::Io)?;
            labels_copied += 1;
        }
    }

    fs::create_dir_all(root.join(IMAGES_DIR).join("train")).map_err(UrlsetError::Io)?;
    fs::create_dir_all(root.join(IMAGES_DIR).join("val")).map_err(UrlsetError::Io)?;

    let manifest = DatasetManifest {
        path: root.display().to_string(),
        train: format!("{IMAGES_DIR}/train"),
        val: format!("{IMAGES_DIR}/val"),
        ..source_manifest
    };
    let manifest_path = root.join(MANIFEST_FILE);
    write_manifest(&manifest_path, &manifest)?;
    log::info!("created local manifest at {}", manifest_path.display());

    Ok(LocalizeReport {
        labels_copied,
        manifest_path,
    })
}

/// Per-imageset pairing counts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImagesetAssembly {
    pub imageset: ImagesetId,
    /// Images with a label record.
    pub converted: usize,
    pub resolved: usize,
    /// Pairs using an unsuffixed best-guess URL.
    pub guessed: usize,
    /// Records left out for lack of a URL.
    pub dropped: usize,
}

/// An imageset whose annotation file could not be used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImagesetFailure {
    pub imageset: ImagesetId,
    pub error: String,
}

/// A staged label that could not be copied into its split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LabelCopyFailure {
    pub imageset: ImagesetId,
    pub number: ImageNumber,
    pub label_path: PathBuf,
    pub error: String,
}

/// Summary of a dataset assembly run.
#[derive(Clone, Debug, Serialize)]
pub struct AssembleReport {
    pub imagesets: Vec<ImagesetAssembly>,
    /// Imagesets with no matching annotation file.
    pub missing_annotations: Vec<ImagesetId>,
    pub failed_imagesets: Vec<ImagesetFailure>,
    /// Pairs left out because their label copy failed.
    pub copy_failures: Vec<LabelCopyFailure>,
    pub train: usize,
    pub val: usize,
    pub output_dir: PathBuf,
}

impl AssembleReport {
    pub fn total_dropped(&self) -> usize {
        self.imagesets.iter().map(|row| row.dropped).sum()
    }

    pub fn total_guessed(&self) -> usize {
        self.imagesets.iter().map(|row| row.guessed).sum()
    }
}

impl fmt::Display for AssembleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset written to {}", self.output_dir.display())?;
        writeln!(f, "  train: {} image(s)", self.train)?;
        writeln!(f, "  val:   {} image(s)", self.val)?;

        if !self.imagesets.is_empty() {
            writeln!(f)?;
            writeln!(f, "Imagesets:")?;
            for row in &self.imagesets {
                write!(
                    f,
                    "  {}: {} labelled, {} resolved",
                    row.imageset, row.converted, row.resolved
                )?;
                if row.guessed > 0 {
                    write!(f, ", {} guessed", row.guessed)?;
                }
                if row.dropped > 0 {
                    write!(f, ", {} dropped", row.dropped)?;
                }
                writeln!(f)?;
            }
        }

        if !self.missing_annotations.is_empty() {
            let missing: Vec<&str> = self
                .missing_annotations
                .iter()
                .map(ImagesetId::as_str)
                .collect();
            writeln!(f, "No annotation file for: {}", missing.join(", "))?;
        }
        for failure in &self.failed_imagesets {
            writeln!(f, "Skipped {}: {}", failure.imageset, failure.error)?;
        }
        for failure in &self.copy_failures {
            writeln!(
                f,
                "Label copy failed for imageset {}, image {}: {}",
                failure.imageset, failure.number, failure.error
            )?;
        }
        Ok(())
    }
}
