//! Concurrent image download with skip-if-present semantics.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::UrlsetError;
use crate::remote::{HttpClient, UreqClient, DEFAULT_TIMEOUT};

/// Default number of concurrent downloads.
pub const DEFAULT_CONCURRENCY: usize = 20;

const PART_EXTENSION: &str = "part";

/// Fetch options.
#[derive(Clone, Debug)]
pub struct FetchOptions {
    /// Worker pool size.
    pub concurrency: usize,
    /// Per-request timeout of the client built by [`FetchOptions::client`].
    pub timeout: Duration,
    /// Take at most this many URLs from the front of the list.
    pub max_images: Option<usize>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            max_images: None,
        }
    }
}

impl FetchOptions {
    /// An HTTP client whose requests time out after `self.timeout`.
    pub fn client(&self) -> UreqClient {
        UreqClient::new(self.timeout)
    }
}

/// Validate fetch options before running.
pub fn validate_fetch_options(opts: &FetchOptions) -> Result<(), UrlsetError> {
    if opts.concurrency == 0 {
        return Err(UrlsetError::InvalidOption {
            message: "concurrency must be greater than 0".to_string(),
        });
    }
    if opts.timeout.is_zero() {
        return Err(UrlsetError::InvalidOption {
            message: "timeout must be greater than 0".to_string(),
        });
    }
    if opts.max_images == Some(0) {
        return Err(UrlsetError::InvalidOption {
            message: "max images must be greater than 0".to_string(),
        });
    }
    Ok(())
}

/// The local file name for `url`: the last path segment, query stripped.
pub fn destination_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// What happened to one URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Downloaded { path: PathBuf, bytes: usize },
    /// The destination already existed; nothing was requested.
    Skipped { path: PathBuf },
    Failed { error: String },
}

/// A URL and its outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UrlOutcome {
    pub url: String,
    #[serde(flatten)]
    pub outcome: FetchOutcome,
}

/// Per-URL outcomes in input order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FetchReport {
    pub outcomes: Vec<UrlOutcome>,
}

impl FetchReport {
    fn count(&self, pred: impl Fn(&FetchOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Downloaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Failed { .. }))
    }
}

impl fmt::Display for FetchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Fetched {} URL(s): {} downloaded, {} skipped, {} failed",
            self.outcomes.len(),
            self.downloaded(),
            self.skipped(),
            self.failed()
        )?;
        for outcome in &self.outcomes {
            if let FetchOutcome::Failed { error } = &outcome.outcome {
                writeln!(f, "  {}: {}", outcome.url, error)?;
            }
        }
        Ok(())
    }
}

fn warn_duplicate_names(urls: &[String]) {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for url in urls {
        let Some(name) = destination_name(url) else {
            continue;
        };
        if let Some(first) = seen.get(&name) {
            log::warn!("{url} and {first} both download to {name}; the last one wins");
        } else {
            seen.insert(name, url.as_str());
        }
    }
}

fn fetch_one<C: HttpClient>(url: &str, dest_dir: &Path, client: &C) -> FetchOutcome {
    let Some(name) = destination_name(url) else {
        log::warn!("cannot derive a file name from {url}");
        return FetchOutcome::Failed {
            error: "URL has no file name".to_string(),
        };
    };

    let path = dest_dir.join(&name);
    if path.exists() {
        log::debug!("{} exists, skipping", path.display());
        return FetchOutcome::Skipped { path };
    }

    let bytes = match client.get_bytes(url) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("error downloading {url}: {err}");
            return FetchOutcome::Failed {
                error: err.to_string(),
            };
        }
    };

    let part = dest_dir.join(format!("{name}.{PART_EXTENSION}"));
    let written = fs::write(&part, &bytes).and_then(|()| fs::rename(&part, &path));
    match written {
        Ok(()) => {
            log::debug!("downloaded {}", path.display());
            FetchOutcome::Downloaded {
                path,
                bytes: bytes.len(),
            }
        }
        Err(err) => {
            log::warn!("error saving {}: {err}", path.display());
            let _ = fs::remove_file(&part);
            FetchOutcome::Failed {
                error: err.to_string(),
            }
        }
    }
}

/// Downloads `urls` into `dest_dir` with a fixed-size worker pool.
///
/// Existing files are skipped without a request. Failures are recorded per
/// URL and never retried. Outcomes come back in input order. Requests use
/// `client` as given; [`download`] builds one from `opts.timeout`.
pub fn fetch<C: HttpClient>(
    urls: &[String],
    dest_dir: &Path,
    client: &C,
    opts: &FetchOptions,
) -> Result<FetchReport, UrlsetError> {
    validate_fetch_options(opts)?;
    fs::create_dir_all(dest_dir).map_err(UrlsetError::Io)?;

    let urls = match opts.max_images {
        Some(max) if max < urls.len() => &urls[..max],
        _ => urls,
    };
    warn_duplicate_names(urls);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.concurrency)
        .build()?;
    let outcomes: Vec<UrlOutcome> = pool.install(|| {
        urls.par_iter()
            .map(|url| UrlOutcome {
                url: url.clone(),
                outcome: fetch_one(url, dest_dir, client),
            })
            .collect()
    });

    let report = FetchReport { outcomes };
    log::info!(
        "{} downloaded, {} skipped, {} failed",
        report.downloaded(),
        report.skipped(),
        report.failed()
    );
    Ok(report)
}

/// Reads a URL list (one per line, blank lines ignored) and fetches it.
pub fn fetch_url_list<C: HttpClient>(
    list_path: &Path,
    dest_dir: &Path,
    client: &C,
    opts: &FetchOptions,
) -> Result<FetchReport, UrlsetError> {
    if !list_path.is_file() {
        return Err(UrlsetError::MissingInput {
            path: list_path.to_path_buf(),
            what: "URL list".to_string(),
        });
    }
    let content = fs::read_to_string(list_path).map_err(UrlsetError::Io)?;
    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    log::info!("fetching {} URL(s) from {}", urls.len(), list_path.display());
    fetch(&urls, dest_dir, client, opts)
}

/// Downloads `urls` with a `ureq` client built from `opts.timeout`.
pub fn download(
    urls: &[String],
    dest_dir: &Path,
    opts: &FetchOptions,
) -> Result<FetchReport, UrlsetError> {
    validate_fetch_options(opts)?;
    fetch(urls, dest_dir, &opts.client(), opts)
}

/// [`fetch_url_list`] with a `ureq` client built from `opts.timeout`.
pub fn download_url_list(
    list_path: &Path,
    dest_dir: &Path,
    opts: &FetchOptions,
) -> Result<FetchReport, UrlsetError> {
    validate_fetch_options(opts)?;
    fetch_url_list(list_path, dest_dir, &opts.client(), opts)
}
