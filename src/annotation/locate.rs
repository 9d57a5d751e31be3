//! Finding the annotation file that belongs to an imageset.
//!
//! Annotation files are named inconsistently (`x__blue_145__y.yaml`,
//! `run_145.yaml`, ...). Matchers are tried in order against the `*.yaml`
//! files of the annotation directory; the first matcher with a hit wins, and
//! within a matcher the lexicographically first file wins.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::UrlsetError;
use crate::types::ImagesetId;

const ID_PLACEHOLDER: &str = "{id}";

/// One way of recognising an imageset's annotation file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnnotationMatcher {
    /// Shell-style pattern over the file name; `{id}` is substituted.
    FileName(String),
    /// File contents contain any of these needles; `{id}` is substituted.
    Contents(Vec<String>),
}

impl AnnotationMatcher {
    fn matches(&self, path: &Path, file_name: &str, imageset: &ImagesetId) -> bool {
        match self {
            AnnotationMatcher::FileName(pattern) => {
                let id = glob::Pattern::escape(imageset.as_str());
                let pattern = pattern.replace(ID_PLACEHOLDER, &id);
                match glob::Pattern::new(&pattern) {
                    Ok(pattern) => pattern.matches(file_name),
                    Err(err) => {
                        log::warn!("ignoring invalid file name pattern '{pattern}': {err}");
                        false
                    }
                }
            }
            AnnotationMatcher::Contents(needles) => match fs::read_to_string(path) {
                Ok(content) => needles
                    .iter()
                    .map(|needle| needle.replace(ID_PLACEHOLDER, imageset.as_str()))
                    .any(|needle| content.contains(&needle)),
                Err(err) => {
                    log::debug!("cannot scan {}: {err}", path.display());
                    false
                }
            },
        }
    }
}

/// The matcher order used by the annotation tool's exports.
///
/// File name patterns come first, most specific to least; a content scan is
/// the last resort.
pub fn default_matchers() -> Vec<AnnotationMatcher> {
    vec![
        AnnotationMatcher::FileName("*__blue_{id}__*.yaml".to_string()),
        AnnotationMatcher::FileName("*__blue_{id}.yaml".to_string()),
        AnnotationMatcher::FileName("*_blue_{id}.yaml".to_string()),
        AnnotationMatcher::FileName("*_{id}_*.yaml".to_string()),
        AnnotationMatcher::FileName("*_{id}.yaml".to_string()),
        AnnotationMatcher::Contents(vec![
            "blue_{id}".to_string(),
            "_{id}_".to_string(),
            "_{id}/".to_string(),
        ]),
    ]
}

fn yaml_candidates(dir: &Path) -> Result<Vec<(PathBuf, String)>, UrlsetError> {
    if !dir.is_dir() {
        return Err(UrlsetError::MissingInput {
            path: dir.to_path_buf(),
            what: "annotation directory".to_string(),
        });
    }

    let mut candidates = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| UrlsetError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            candidates.push((path.to_path_buf(), name.to_string()));
        }
    }
    Ok(candidates)
}

fn first_match(
    candidates: &[(PathBuf, String)],
    imageset: &ImagesetId,
    matchers: &[AnnotationMatcher],
) -> Option<PathBuf> {
    matchers.iter().find_map(|matcher| {
        candidates
            .iter()
            .find(|(path, name)| matcher.matches(path, name, imageset))
            .map(|(path, _)| path.clone())
    })
}

/// Finds the annotation file for one imageset.
///
/// Returns `Ok(None)` when nothing matches; a missing directory is an error.
pub fn locate_annotation_file(
    dir: &Path,
    imageset: &ImagesetId,
    matchers: &[AnnotationMatcher],
) -> Result<Option<PathBuf>, UrlsetError> {
    let candidates = yaml_candidates(dir)?;
    Ok(first_match(&candidates, imageset, matchers))
}

/// Annotation files found for a batch of imagesets.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LocatedAnnotations {
    pub found: BTreeMap<ImagesetId, PathBuf>,
    pub missing: Vec<ImagesetId>,
}

/// Finds annotation files for every imageset, listing the directory once.
///
/// Imagesets without a match are logged and reported as missing.
pub fn locate_annotation_files(
    dir: &Path,
    imagesets: &[ImagesetId],
    matchers: &[AnnotationMatcher],
) -> Result<LocatedAnnotations, UrlsetError> {
    let candidates = yaml_candidates(dir)?;

    let mut located = LocatedAnnotations::default();
    for imageset in imagesets {
        if located.found.contains_key(imageset) || located.missing.contains(imageset) {
            continue;
        }
        match first_match(&candidates, imageset, matchers) {
            Some(path) => {
                log::info!("imageset {imageset}: using {}", path.display());
                located.found.insert(imageset.clone(), path);
            }
            None => {
                log::warn!(
                    "no annotation file found for imageset {imageset} in {}",
                    dir.display()
                );
                located.missing.push(imageset.clone());
            }
        }
    }
    Ok(located)
}
