//! `dataset.yaml` reading and writing.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::UrlsetError;

/// File name of the manifest inside a dataset root.
pub const MANIFEST_FILE: &str = "dataset.yaml";

/// The training framework's dataset descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Absolute dataset root.
    pub path: String,
    pub train: String,
    pub val: String,
    #[serde(default)]
    pub test: String,
    pub nc: usize,
    pub names: BTreeMap<usize, String>,
}

impl DatasetManifest {
    /// A manifest whose class table is `class_names` in index order.
    pub fn new(
        root: &Path,
        train: impl Into<String>,
        val: impl Into<String>,
        class_names: &[String],
    ) -> Self {
        Self {
            path: root.display().to_string(),
            train: train.into(),
            val: val.into(),
            test: String::new(),
            nc: class_names.len(),
            names: class_names.iter().cloned().enumerate().collect(),
        }
    }
}

/// Reads a manifest file.
pub fn read_manifest(path: &Path) -> Result<DatasetManifest, UrlsetError> {
    if !path.is_file() {
        return Err(UrlsetError::MissingInput {
            path: path.to_path_buf(),
            what: "dataset manifest".to_string(),
        });
    }
    let data = fs::read_to_string(path).map_err(UrlsetError::Io)?;
    serde_yaml::from_str(&data).map_err(|source| UrlsetError::ManifestRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a manifest file, replacing any previous one.
pub fn write_manifest(path: &Path, manifest: &DatasetManifest) -> Result<(), UrlsetError> {
    let data = serde_yaml::to_string(manifest).map_err(|source| UrlsetError::ManifestWrite {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, data).map_err(UrlsetError::Io)
}
