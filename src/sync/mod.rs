//! Renaming local label files to carry their image's suffix token.
//!
//! A label set produced before suffixes were known has files named
//! `image-<number>.txt`. Once the tokens are resolved each file is renamed to
//! `image-<number>_<token>.txt` so it lines up with the suffixed image name.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::UrlsetError;
use crate::suffix::parse_suffixed_name;
use crate::types::{ImageNumber, SuffixToken};

static UNSUFFIXED_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^image-(\d+)\.txt$").expect("unsuffixed label pattern is valid")
});

/// One rename that could not be carried out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenameFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a synchronization pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub renamed: usize,
    /// Candidates with no known suffix; left untouched.
    pub unmatched: Vec<PathBuf>,
    /// `.txt` files that are not named `image-<number>.txt`.
    pub nonstandard: Vec<PathBuf>,
    pub failed: Vec<RenameFailure>,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Renamed {} label file(s); {} without a suffix, {} non-standard, {} failed",
            self.renamed,
            self.unmatched.len(),
            self.nonstandard.len(),
            self.failed.len()
        )?;
        for failure in &self.failed {
            writeln!(f, "  {}: {}", failure.path.display(), failure.error)?;
        }
        Ok(())
    }
}

/// Renames every `image-<number>.txt` in `label_dir` with a known suffix.
///
/// Existing targets are never overwritten; such collisions are reported as
/// failures along with I/O errors, and the pass continues.
pub fn synchronize(
    label_dir: &Path,
    suffixes: &BTreeMap<ImageNumber, SuffixToken>,
) -> Result<SyncReport, UrlsetError> {
    if !label_dir.is_dir() {
        return Err(UrlsetError::MissingInput {
            path: label_dir.to_path_buf(),
            what: "label directory".to_string(),
        });
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(label_dir)
        .map_err(UrlsetError::Io)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("txt"))
        .collect();
    entries.sort();

    let mut report = SyncReport::default();
    for path in entries {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            report.nonstandard.push(path);
            continue;
        };
        let Some(caps) = UNSUFFIXED_LABEL.captures(file_name) else {
            log::debug!("skipping non-standard label file {}", path.display());
            report.nonstandard.push(path);
            continue;
        };
        let number = &caps[1];

        let Some(token) = suffixes.get(number) else {
            log::warn!("no suffix found for {file_name}");
            report.unmatched.push(path);
            continue;
        };

        let target = label_dir.join(format!("image-{number}_{token}.txt"));
        if target.exists() {
            log::warn!(
                "not renaming {file_name}: {} already exists",
                target.display()
            );
            report.failed.push(RenameFailure {
                path,
                error: format!("target {} already exists", target.display()),
            });
            continue;
        }

        match fs::rename(&path, &target) {
            Ok(()) => {
                log::debug!("renamed {file_name} -> {}", target.display());
                report.renamed += 1;
            }
            Err(err) => {
                log::warn!("failed to rename {file_name}: {err}");
                report.failed.push(RenameFailure {
                    path,
                    error: err.to_string(),
                });
            }
        }
    }

    log::info!(
        "renamed {} label file(s) in {}",
        report.renamed,
        label_dir.display()
    );
    Ok(report)
}

/// Collects `number -> token` from the suffixed image URLs of a URL list.
///
/// Lines without a suffixed image name are ignored; the first token seen for
/// a number wins.
pub fn suffixes_from_url_list(
    path: &Path,
) -> Result<BTreeMap<ImageNumber, SuffixToken>, UrlsetError> {
    if !path.is_file() {
        return Err(UrlsetError::MissingInput {
            path: path.to_path_buf(),
            what: "URL list".to_string(),
        });
    }
    let content = fs::read_to_string(path).map_err(UrlsetError::Io)?;

    let mut suffixes = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        let file_name = line.rsplit('/').next().unwrap_or(line);
        if let Some((number, token)) = parse_suffixed_name(file_name) {
            suffixes.entry(number).or_insert(token);
        }
    }
    log::info!("found {} suffix(es) in {}", suffixes.len(), path.display());
    Ok(suffixes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffixes(pairs: &[(&str, &str)]) -> BTreeMap<ImageNumber, SuffixToken> {
        pairs
            .iter()
            .map(|(number, token)| (ImageNumber::from(*number), SuffixToken::from(*token)))
            .collect()
    }

    #[test]
    fn renames_known_and_reports_the_rest() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let dir = temp.path();
        for name in ["image-0000601.txt", "image-0000777.txt", "notes.txt"] {
            fs::write(dir.join(name), "0 0.5 0.5 0.1 0.1").expect("write label");
        }

        let report = synchronize(dir, &suffixes(&[("0000601", "EGD3NF")])).expect("sync");
        assert_eq!(report.renamed, 1);
        assert_eq!(report.unmatched, vec![dir.join("image-0000777.txt")]);
        assert_eq!(report.nonstandard, vec![dir.join("notes.txt")]);
        assert!(report.failed.is_empty());

        assert!(dir.join("image-0000601_EGD3NF.txt").exists());
        assert!(!dir.join("image-0000601.txt").exists());
        assert!(dir.join("image-0000777.txt").exists());
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join("image-1.txt"), "").expect("write label");
        let map = suffixes(&[("1", "AAA")]);

        synchronize(temp.path(), &map).expect("first pass");
        let report = synchronize(temp.path(), &map).expect("second pass");
        assert_eq!(report.renamed, 0);
        assert_eq!(report.nonstandard.len(), 1);
    }

    #[test]
    fn collision_is_a_failure_and_keeps_both_files() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join("image-1.txt"), "new").expect("write label");
        fs::write(temp.path().join("image-1_AAA.txt"), "old").expect("write label");

        let report = synchronize(temp.path(), &suffixes(&[("1", "AAA")])).expect("sync");
        assert_eq!(report.renamed, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(
            fs::read_to_string(temp.path().join("image-1_AAA.txt")).expect("read"),
            "old"
        );
    }

    #[test]
    fn missing_label_dir_is_fatal() {
        let temp = tempfile::tempdir().expect("create temp dir");
        assert!(synchronize(&temp.path().join("absent"), &BTreeMap::new()).is_err());
    }

    #[test]
    fn reads_suffixes_from_url_list() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let list = temp.path().join("train.txt");
        fs::write(
            &list,
            "https://prism-static.aruw.org/images/1_145/image-0000601_EGD3NF.jpg\n\
             https://prism-static.aruw.org/images/1_145/image-0000602.jpg\n\
             \n",
        )
        .expect("write list");

        let map = suffixes_from_url_list(&list).expect("read list");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("0000601").map(SuffixToken::as_str), Some("EGD3NF"));
    }
}
