//! Suffix token resolution.
//!
//! The image host appends a random token to every filename
//! (`image-0000601_EGD3NF.jpg`), so image URLs cannot be computed from an
//! image number alone. [`SuffixResolver`] discovers tokens by scraping each
//! imageset's directory listing once and keeps them in a [`SuffixCache`]
//! with an explicit load/save lifecycle:
//!
//! - if the configured cache file exists it is loaded wholesale and the
//!   resolver never touches the network again, not even for a miss;
//! - otherwise [`SuffixResolver::scrape`] fetches one listing per imageset,
//!   sequentially, and persists the cache according to [`PersistMode`].

mod cache;
mod listing;
mod rewrite;
mod template;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::UrlsetError;
use crate::remote::HttpClient;
use crate::types::{ImageNumber, ImagesetId, SuffixToken};

pub use cache::{from_cache_str, read_cache, to_cache_string, write_cache, SuffixCache};
pub use listing::{parse_listing, parse_suffixed_name};
pub use rewrite::{
    imagesets_in_url_list, rewrite_url_line, rewrite_url_list, RewriteReport, RewrittenLine,
};
pub use template::{ImageUrlParts, UrlTemplate, DEFAULT_URL_TEMPLATE};

#[cfg(feature = "fuzzing")]
pub use cache::fuzz_from_cache_str;
#[cfg(feature = "fuzzing")]
pub use listing::fuzz_parse_listing;

/// When the cache is written back to disk during a scrape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PersistMode {
    /// Once, after every imageset has been scraped. An interrupted pass
    /// loses everything it discovered.
    #[default]
    EndOfPass,
    /// After every imageset listing, trading extra writes for resilience.
    PerImageset,
}

/// What a caller wants when no token is known for an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// Treat the image as unavailable.
    #[default]
    Skip,
    /// Fall back to the unsuffixed `image-<number>.jpg` URL.
    GuessUnsuffixed,
}

/// Resolver configuration.
#[derive(Clone, Debug, Default)]
pub struct ResolverConfig {
    /// Cache file to load from and save to. `None` keeps the cache in memory.
    pub cache_path: Option<PathBuf>,
    pub url_template: UrlTemplate,
    pub persist: PersistMode,
    /// Fail on open instead of scraping when the cache file is absent.
    pub require_cache: bool,
}

/// Where the resolver's tokens came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    /// Loaded from an existing cache file; no network access.
    Disk,
    /// Built from directory listings during this run.
    Listings,
}

/// A resolved image URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageUrl {
    pub url: String,
    /// True when the URL is an unsuffixed best guess rather than a resolution.
    pub guessed: bool,
}

/// Owns the suffix cache and the means to fill it.
pub struct SuffixResolver<C> {
    config: ResolverConfig,
    client: C,
    cache: SuffixCache,
    source: CacheSource,
    /// Imagesets whose listing has been fetched successfully.
    scraped: BTreeSet<ImagesetId>,
}

impl<C: HttpClient> SuffixResolver<C> {
    /// Creates a resolver, loading the cache file when one exists.
    pub fn open(config: ResolverConfig, client: C) -> Result<Self, UrlsetError> {
        let existing = config.cache_path.as_ref().filter(|path| path.is_file());

        let (cache, source) = match existing {
            Some(path) => {
                let cache = read_cache(path)?;
                log::info!(
                    "loaded {} suffix(es) from cache file {}",
                    cache.len(),
                    path.display()
                );
                (cache, CacheSource::Disk)
            }
            None if config.require_cache => {
                return Err(UrlsetError::MissingInput {
                    path: config.cache_path.clone().unwrap_or_default(),
                    what: "suffix cache file".to_string(),
                });
            }
            None => (SuffixCache::new(), CacheSource::Listings),
        };

        Ok(Self {
            config,
            client,
            cache,
            source,
            scraped: BTreeSet::new(),
        })
    }

    /// Scrapes the directory listing of every imageset not already scraped.
    ///
    /// Listings are fetched one after another. An imageset whose listing was
    /// fetched by an earlier call is skipped. A failed listing is logged and
    /// contributes nothing; the pass carries on and a later call retries it. When the resolver was loaded
    /// from disk this is a no-op. The cache is persisted per [`PersistMode`];
    /// only a failure to write it is returned as an error.
    pub fn scrape(&mut self, imagesets: &[ImagesetId]) -> Result<ScrapeReport, UrlsetError> {
        let mut report = ScrapeReport {
            source: self.source,
            imagesets: Vec::new(),
        };

        if self.source == CacheSource::Disk {
            log::info!(
                "serving suffixes from cache; skipping listing scrape for {} imageset(s)",
                imagesets.len()
            );
            return Ok(report);
        }

        let mut seen = BTreeSet::new();
        for imageset in imagesets {
            if !seen.insert(imageset) || self.scraped.contains(imageset) {
                continue;
            }

            let listing_url = self.config.url_template.listing_url(imageset);
            let outcome = match self.client.get_text(&listing_url) {
                Ok(body) => {
                    let found = parse_listing(&body);
                    let discovered = found.len();
                    let added = self.cache.merge(imageset, found);
                    log::info!("found {discovered} image(s) for imageset {imageset}");
                    self.scraped.insert(imageset.clone());
                    ImagesetScrape {
                        imageset: imageset.clone(),
                        discovered,
                        added,
                        error: None,
                    }
                }
                Err(source) => {
                    log::warn!("failed to list imageset {imageset}: {source}");
                    ImagesetScrape {
                        imageset: imageset.clone(),
                        discovered: 0,
                        added: 0,
                        error: Some(source.to_string()),
                    }
                }
            };
            report.imagesets.push(outcome);

            if self.config.persist == PersistMode::PerImageset {
                self.save()?;
            }
        }

        if self.config.persist == PersistMode::EndOfPass {
            self.save()?;
        }

        Ok(report)
    }
}

impl<C> SuffixResolver<C> {
    /// Creates a resolver over an already populated cache. No network access
    /// is made by a resolver built this way.
    pub fn with_cache(config: ResolverConfig, client: C, cache: SuffixCache) -> Self {
        Self {
            config,
            client,
            cache,
            source: CacheSource::Disk,
            scraped: BTreeSet::new(),
        }
    }

    pub fn source(&self) -> CacheSource {
        self.source
    }

    pub fn cache(&self) -> &SuffixCache {
        &self.cache
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn template(&self) -> &UrlTemplate {
        &self.config.url_template
    }

    /// Writes the cache to the configured path, if any.
    pub fn save(&self) -> Result<(), UrlsetError> {
        let Some(path) = self.config.cache_path.as_deref() else {
            log::debug!("no cache path configured; keeping suffixes in memory");
            return Ok(());
        };
        write_cache(path, &self.cache)?;
        log::info!(
            "saved {} suffix(es) to cache file {}",
            self.cache.len(),
            path.display()
        );
        Ok(())
    }

    /// Looks up the token for one image. `None` means not found; no network
    /// call is ever made here.
    pub fn resolve(&self, imageset: &str, number: &str) -> Option<&SuffixToken> {
        self.cache.get(imageset, number)
    }

    /// Builds the URL of one image according to `policy`.
    pub fn image_url(
        &self,
        imageset: &ImagesetId,
        number: &ImageNumber,
        policy: UnresolvedPolicy,
    ) -> Option<ImageUrl> {
        let template = &self.config.url_template;
        match (self.resolve(imageset.as_str(), number.as_str()), policy) {
            (Some(token), _) => Some(ImageUrl {
                url: template.image_url(imageset, number, Some(token)),
                guessed: false,
            }),
            (None, UnresolvedPolicy::Skip) => None,
            (None, UnresolvedPolicy::GuessUnsuffixed) => {
                let url = template.image_url(imageset, number, None);
                log::warn!(
                    "no suffix for imageset {imageset}, image {number}; guessing {url}"
                );
                Some(ImageUrl { url, guessed: true })
            }
        }
    }

    /// A copy of every token known for one imageset.
    pub fn suffixes_for(&self, imageset: &str) -> BTreeMap<ImageNumber, SuffixToken> {
        self.cache.imageset(imageset).cloned().unwrap_or_default()
    }
}

/// Outcome of a scrape pass.
#[derive(Clone, Debug, Serialize)]
pub struct ScrapeReport {
    pub source: CacheSource,
    pub imagesets: Vec<ImagesetScrape>,
}

/// Outcome of scraping one imageset listing.
#[derive(Clone, Debug, Serialize)]
pub struct ImagesetScrape {
    pub imageset: ImagesetId,
    /// Distinct suffixed images found in the listing.
    pub discovered: usize,
    /// Entries that were new to the cache.
    pub added: usize,
    pub error: Option<String>,
}

impl ScrapeReport {
    pub fn failed_count(&self) -> usize {
        self.imagesets.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn added_count(&self) -> usize {
        self.imagesets.iter().map(|s| s.added).sum()
    }
}

impl fmt::Display for ScrapeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source == CacheSource::Disk {
            return writeln!(f, "Suffixes served from cache file (no listings fetched)");
        }

        writeln!(
            f,
            "Scraped {} imageset(s): {} new suffix(es), {} failed",
            self.imagesets.len(),
            self.added_count(),
            self.failed_count()
        )?;
        for scrape in &self.imagesets {
            match &scrape.error {
                Some(error) => writeln!(f, "  {}: failed ({})", scrape.imageset, error)?,
                None => writeln!(
                    f,
                    "  {}: {} found, {} new",
                    scrape.imageset, scrape.discovered, scrape.added
                )?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeHost {
        pages: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl FakeHost {
        fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HttpClient for FakeHost {
        fn get_text(&self, url: &str) -> Result<String, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages.get(url).cloned().ok_or_else(|| RemoteError::Status {
                url: url.to_string(),
                status: 404,
            })
        }

        fn get_bytes(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
            self.get_text(url).map(String::into_bytes)
        }
    }

    fn config(cache_path: Option<PathBuf>) -> ResolverConfig {
        ResolverConfig {
            cache_path,
            ..Default::default()
        }
    }

    const LISTING_145: &str = "<a href=\"image-0000601_EGD3NF.jpg\">image-0000601_EGD3NF.jpg</a>\n\
                               <a href=\"image-0000602_q8Zt1a.jpg\">image-0000602_q8Zt1a.jpg</a>";

    #[test]
    fn cached_resolver_never_calls_network() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let cache_path = temp.path().join("image_suffixes.cache");
        fs::write(&cache_path, "145,0000601,EGD3NF\n").expect("write cache");

        let mut resolver =
            SuffixResolver::open(config(Some(cache_path)), FakeHost::default()).expect("open");
        assert_eq!(resolver.source(), CacheSource::Disk);

        let report = resolver.scrape(&["145".into(), "146".into()]).expect("scrape");
        assert!(report.imagesets.is_empty());
        assert_eq!(
            resolver.resolve("145", "0000601").map(SuffixToken::as_str),
            Some("EGD3NF")
        );
        assert!(resolver.resolve("145", "9999999").is_none());
        assert_eq!(resolver.client().calls(), 0);
    }

    #[test]
    fn required_cache_missing_is_fatal() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let cfg = ResolverConfig {
            require_cache: true,
            ..config(Some(temp.path().join("absent.cache")))
        };
        let err = SuffixResolver::open(cfg, FakeHost::default())
            .err()
            .expect("open should fail");
        assert!(matches!(err, UrlsetError::MissingInput { .. }));
    }

    #[test]
    fn scrape_fetches_each_listing_once_and_persists_at_end() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let cache_path = temp.path().join("image_suffixes.cache");
        let host = FakeHost::default()
            .with_page("https://prism-static.aruw.org/images/1_145/", LISTING_145);

        let mut resolver =
            SuffixResolver::open(config(Some(cache_path.clone())), host).expect("open");
        let report = resolver
            .scrape(&["145".into(), "146".into(), "145".into()])
            .expect("scrape");

        assert_eq!(resolver.client().calls(), 2);
        assert_eq!(report.added_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert!(report.imagesets[1].error.as_deref().unwrap_or("").contains("404"));

        let saved = read_cache(&cache_path).expect("read saved cache");
        assert_eq!(&saved, resolver.cache());
    }

    #[test]
    fn later_scrapes_skip_listed_imagesets_and_retry_failures() {
        let host = FakeHost::default()
            .with_page("https://prism-static.aruw.org/images/1_145/", LISTING_145);
        let mut resolver = SuffixResolver::open(config(None), host).expect("open");

        resolver.scrape(&["145".into(), "146".into()]).expect("first scrape");
        assert_eq!(resolver.client().calls(), 2);

        let report = resolver
            .scrape(&["145".into(), "146".into()])
            .expect("second scrape");
        assert_eq!(resolver.client().calls(), 3);
        assert_eq!(report.imagesets.len(), 1);
        assert_eq!(report.imagesets[0].imageset.as_str(), "146");
    }

    #[test]
    fn per_imageset_persistence_writes_after_each_listing() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let cache_path = temp.path().join("image_suffixes.cache");
        let host = FakeHost::default()
            .with_page("https://prism-static.aruw.org/images/1_145/", LISTING_145);
        let cfg = ResolverConfig {
            persist: PersistMode::PerImageset,
            ..config(Some(cache_path.clone()))
        };

        let mut resolver = SuffixResolver::open(cfg, host).expect("open");
        resolver.scrape(&["145".into()]).expect("scrape");
        assert_eq!(read_cache(&cache_path).expect("read").len(), 2);
    }

    #[test]
    fn image_url_honours_policy() {
        let cache = from_cache_str("145,0000601,EGD3NF\n").expect("parse cache");
        let resolver = SuffixResolver::with_cache(config(None), FakeHost::default(), cache);
        let set = ImagesetId::from("145");

        let resolved = resolver
            .image_url(&set, &"0000601".into(), UnresolvedPolicy::Skip)
            .expect("resolved");
        assert_eq!(
            resolved.url,
            "https://prism-static.aruw.org/images/1_145/image-0000601_EGD3NF.jpg"
        );
        assert!(!resolved.guessed);

        assert!(resolver
            .image_url(&set, &"0000999".into(), UnresolvedPolicy::Skip)
            .is_none());

        let guessed = resolver
            .image_url(&set, &"0000999".into(), UnresolvedPolicy::GuessUnsuffixed)
            .expect("guessed");
        assert_eq!(
            guessed.url,
            "https://prism-static.aruw.org/images/1_145/image-0000999.jpg"
        );
        assert!(guessed.guessed);
    }
}
