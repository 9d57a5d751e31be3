//! Persisted `imageset x number -> suffix` mapping.
//!
//! On disk the cache is a headerless CSV with one
//! `imagesetId,imageNumber,suffixToken` record per line.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::UrlsetError;
use crate::types::{ImageNumber, ImagesetId, SuffixToken};

/// Every suffix token discovered so far, grouped by imageset.
///
/// Entries are never overwritten: once a token is known for a key, later
/// observations of the same key are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuffixCache {
    entries: BTreeMap<ImagesetId, BTreeMap<ImageNumber, SuffixToken>>,
}

impl SuffixCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a token. Returns `false` if the key was already known.
    pub fn insert(
        &mut self,
        imageset: ImagesetId,
        number: ImageNumber,
        token: SuffixToken,
    ) -> bool {
        let numbers = self.entries.entry(imageset).or_default();
        if numbers.contains_key(&number) {
            return false;
        }
        numbers.insert(number, token);
        true
    }

    /// Merges a batch of tokens for one imageset; returns how many were new.
    pub fn merge(
        &mut self,
        imageset: &ImagesetId,
        found: impl IntoIterator<Item = (ImageNumber, SuffixToken)>,
    ) -> usize {
        found
            .into_iter()
            .filter(|(number, token)| {
                self.insert(imageset.clone(), number.clone(), token.clone())
            })
            .count()
    }

    pub fn get(&self, imageset: &str, number: &str) -> Option<&SuffixToken> {
        self.entries.get(imageset)?.get(number)
    }

    /// All tokens known for one imageset.
    pub fn imageset(&self, imageset: &str) -> Option<&BTreeMap<ImageNumber, SuffixToken>> {
        self.entries.get(imageset)
    }

    pub fn contains_imageset(&self, imageset: &str) -> bool {
        self.entries.contains_key(imageset)
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates records in `(imageset, number)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&ImagesetId, &ImageNumber, &SuffixToken)> {
        self.entries.iter().flat_map(|(imageset, numbers)| {
            numbers
                .iter()
                .map(move |(number, token)| (imageset, number, token))
        })
    }
}

/// Loads a cache file written by [`write_cache`].
pub fn read_cache(path: &Path) -> Result<SuffixCache, UrlsetError> {
    let file = fs::File::open(path).map_err(UrlsetError::Io)?;
    read_cache_from(file).map_err(|source| UrlsetError::CacheRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses cache records from a string.
pub fn from_cache_str(data: &str) -> Result<SuffixCache, csv::Error> {
    read_cache_from(data.as_bytes())
}

fn read_cache_from<R: Read>(reader: R) -> Result<SuffixCache, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut cache = SuffixCache::new();
    for (index, record) in csv_reader.records().enumerate() {
        let record = record?;
        match (record.len(), record.get(0), record.get(1), record.get(2)) {
            (3, Some(imageset), Some(number), Some(token))
                if !imageset.is_empty() && !number.is_empty() && !token.is_empty() =>
            {
                cache.insert(imageset.into(), number.into(), token.into());
            }
            _ => {
                log::warn!(
                    "ignoring malformed suffix cache record {}: {:?}",
                    index + 1,
                    record
                );
            }
        }
    }

    Ok(cache)
}

/// Writes the whole cache, replacing any previous file.
pub fn write_cache(path: &Path, cache: &SuffixCache) -> Result<(), UrlsetError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(UrlsetError::Io)?;
    }
    let file = fs::File::create(path).map_err(UrlsetError::Io)?;
    write_cache_to(file, cache).map_err(|source| UrlsetError::CacheWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Serializes the cache to its on-disk text form.
pub fn to_cache_string(cache: &SuffixCache) -> Result<String, csv::Error> {
    let mut buffer = Vec::new();
    write_cache_to(&mut buffer, cache)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn write_cache_to<W: Write>(writer: W, cache: &SuffixCache) -> Result<(), csv::Error> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    for (imageset, number, token) in cache.iter() {
        csv_writer.write_record([imageset.as_str(), number.as_str(), token.as_str()])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Fuzz-only entrypoint for cache parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_from_cache_str(input: &str) -> Result<(), csv::Error> {
    let _ = from_cache_str(input)?;
    Ok(())
}
