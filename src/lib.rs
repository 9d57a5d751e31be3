//! urlset: labelled image datasets from a suffix-scrambled image host.
//!
//! The image host appends an unpredictable token to every filename, and the
//! annotation tool exports boxes in its own record format. urlset resolves
//! the tokens, converts the records into YOLO label files, and assembles a
//! reproducible train/validation split whose URL lists point at the real
//! image locations.
//!
//! # Modules
//!
//! - [`suffix`]: suffix token resolution, cache and URL list rewriting
//! - [`annotation`]: annotation parsing, box normalization and file lookup
//! - [`dataset`]: pairing, splitting and manifest writing
//! - [`sync`]: renaming local label files to their suffixed names
//! - [`fetch`]: concurrent image download
//! - [`remote`]: the HTTP seam shared by the resolver and the fetcher
//! - [`types`]: id newtypes and typed bounding-box geometry
//! - [`error`]: error types for urlset operations

pub mod annotation;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod remote;
pub mod suffix;
pub mod sync;
pub mod types;

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

pub use error::{RemoteError, UrlsetError};

use annotation::{ClassMapping, ConvertOptions};
use dataset::AssembleOptions;
use fetch::FetchOptions;
use remote::UreqClient;
use suffix::{
    PersistMode, ResolverConfig, SuffixResolver, UnresolvedPolicy, UrlTemplate,
    DEFAULT_URL_TEMPLATE,
};
use types::ImagesetId;

/// Imagesets processed when none are given on the command line.
pub const DEFAULT_IMAGESETS: &[&str] = &[
    "145", "146", "147", "148", "149", "152", "153", "154", "158", "175",
];

/// Default location of the suffix cache file.
pub const DEFAULT_CACHE_FILE: &str = "image_suffixes.cache";

/// The urlset CLI application.
#[derive(Parser)]
#[command(name = "urlset")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Scrape imageset listings into the suffix cache.
    Resolve(ResolveArgs),
    /// Convert annotations and assemble a train/val dataset.
    Build(BuildArgs),
    /// Rename image-<n>.txt label files to their suffixed names.
    SyncLabels(SyncArgs),
    /// Download the images of a URL list.
    Fetch(FetchArgs),
    /// Rewrite unsuffixed image URLs in a URL list.
    RewriteUrls(RewriteArgs),
    /// Derive a local-image copy of a URL dataset.
    Localize(LocalizeArgs),
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary
    Text,
    /// The serialized report
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PersistArg {
    EndOfPass,
    PerImageset,
}

impl From<PersistArg> for PersistMode {
    fn from(arg: PersistArg) -> Self {
        match arg {
            PersistArg::EndOfPass => PersistMode::EndOfPass,
            PersistArg::PerImageset => PersistMode::PerImageset,
        }
    }
}

/// Suffix resolver settings shared by several subcommands.
#[derive(clap::Args)]
struct ResolverArgs {
    /// Suffix cache file; loaded when present, written after scraping.
    #[arg(long, env = "URLSET_CACHE_FILE", default_value = DEFAULT_CACHE_FILE)]
    cache_file: PathBuf,

    /// Imageset base URL with an {id} placeholder.
    #[arg(long, env = "URLSET_URL_TEMPLATE", default_value = DEFAULT_URL_TEMPLATE)]
    url_template: String,

    /// When to write the cache while scraping.
    #[arg(long, value_enum, default_value_t = PersistArg::EndOfPass)]
    persist: PersistArg,

    /// Fail instead of scraping when the cache file does not exist.
    #[arg(long)]
    require_cache: bool,

    /// Timeout for each listing request, in seconds.
    #[arg(long, default_value_t = 10)]
    listing_timeout_secs: u64,
}

impl ResolverArgs {
    fn open(&self) -> Result<SuffixResolver<UreqClient>, UrlsetError> {
        let config = ResolverConfig {
            cache_path: Some(self.cache_file.clone()),
            url_template: UrlTemplate::parse(&self.url_template)?,
            persist: self.persist.into(),
            require_cache: self.require_cache,
        };
        let client = UreqClient::new(timeout_from_secs(self.listing_timeout_secs)?);
        SuffixResolver::open(config, client)
    }
}

#[derive(clap::Args)]
struct ResolveArgs {
    /// Imagesets to resolve (defaults to the standard competition sets).
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    imagesets: Vec<String>,

    #[command(flatten)]
    resolver: ResolverArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Imagesets to include (defaults to the standard competition sets).
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    imagesets: Vec<String>,

    /// Directory holding the annotation tool's YAML exports.
    #[arg(long)]
    annotations_dir: PathBuf,

    /// Dataset root to write.
    #[arg(long)]
    output_dir: PathBuf,

    /// Fraction of images in the train split.
    #[arg(long, default_value_t = 0.8)]
    split_ratio: f64,

    /// Shuffle seed for a reproducible split.
    #[arg(long)]
    seed: Option<u64>,

    /// Class remapping as from:to pairs, e.g. 1:1,3:1,10:0.
    #[arg(long)]
    class_map: Option<ClassMapping>,

    /// Output class names in class id order.
    #[arg(long, value_delimiter = ',', default_value = "red,blue")]
    names: Vec<String>,

    /// Use unsuffixed URLs for images without a known suffix.
    #[arg(long)]
    guess_unresolved: bool,

    #[command(flatten)]
    resolver: ResolverArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct SyncArgs {
    /// Directory of image-<n>.txt label files.
    #[arg(long)]
    label_dir: PathBuf,

    /// Take suffixes from the suffixed URLs of this list.
    #[arg(long, conflicts_with = "imageset", required_unless_present = "imageset")]
    url_file: Option<PathBuf>,

    /// Take suffixes for this imageset from the resolver.
    #[arg(long)]
    imageset: Option<String>,

    #[command(flatten)]
    resolver: ResolverArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct FetchArgs {
    /// URL list, one URL per line.
    #[arg(long)]
    url_file: PathBuf,

    /// Directory to download into.
    #[arg(long)]
    dest_dir: PathBuf,

    /// Number of concurrent downloads.
    #[arg(long, default_value_t = fetch::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Timeout for each request, in seconds.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Download at most this many images.
    #[arg(long)]
    max_images: Option<usize>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct RewriteArgs {
    /// URL list to rewrite.
    #[arg(long)]
    url_file: PathBuf,

    /// Where to write the result (defaults to rewriting in place).
    #[arg(long)]
    output_file: Option<PathBuf>,

    #[command(flatten)]
    resolver: ResolverArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct LocalizeArgs {
    /// Root of a dataset written by `build`.
    #[arg(long)]
    url_dataset: PathBuf,

    /// Root of the local-image dataset to create.
    #[arg(long)]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Run the urlset CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), UrlsetError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Resolve(args)) => run_resolve(args),
        Some(Commands::Build(args)) => run_build(args),
        Some(Commands::SyncLabels(args)) => run_sync(args),
        Some(Commands::Fetch(args)) => run_fetch(args),
        Some(Commands::RewriteUrls(args)) => run_rewrite(args),
        Some(Commands::Localize(args)) => run_localize(args),
        None => {
            println!("urlset {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Labelled image datasets from a suffix-scrambled image host.");
            println!();
            println!("Run 'urlset --help' for usage information.");
            Ok(())
        }
    }
}

fn emit<T: Serialize + Display>(report: &T, format: OutputFormat) -> Result<(), UrlsetError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => print!("{report}"),
    }
    Ok(())
}

fn timeout_from_secs(secs: u64) -> Result<Duration, UrlsetError> {
    if secs == 0 {
        return Err(UrlsetError::InvalidOption {
            message: "timeout must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn imageset_ids(args: &[String]) -> Vec<ImagesetId> {
    if args.is_empty() {
        DEFAULT_IMAGESETS.iter().copied().map(ImagesetId::from).collect()
    } else {
        args.iter().map(|id| ImagesetId::from(id.trim())).collect()
    }
}

fn run_resolve(args: ResolveArgs) -> Result<(), UrlsetError> {
    let imagesets = imageset_ids(&args.imagesets);
    let mut resolver = args.resolver.open()?;
    let report = resolver.scrape(&imagesets)?;
    emit(&report, args.output)
}

fn run_build(args: BuildArgs) -> Result<(), UrlsetError> {
    let assemble_opts = AssembleOptions {
        split_ratio: args.split_ratio,
        seed: args.seed,
        class_names: args.names.iter().map(|name| name.trim().to_string()).collect(),
        unresolved: if args.guess_unresolved {
            UnresolvedPolicy::GuessUnsuffixed
        } else {
            UnresolvedPolicy::Skip
        },
    };
    dataset::validate_assemble_options(&assemble_opts)?;
    let convert_opts = ConvertOptions {
        class_mapping: args.class_map.unwrap_or_default(),
    };

    let imagesets = imageset_ids(&args.imagesets);
    let mut resolver = args.resolver.open()?;
    resolver.scrape(&imagesets)?;

    let assembled = dataset::build_dataset(
        &args.annotations_dir,
        &imagesets,
        &resolver,
        &args.output_dir,
        &convert_opts,
        &assemble_opts,
    )?;
    emit(&assembled.report, args.output)
}

fn run_sync(args: SyncArgs) -> Result<(), UrlsetError> {
    let suffixes = match (&args.url_file, &args.imageset) {
        (Some(url_file), _) => sync::suffixes_from_url_list(url_file)?,
        (None, Some(imageset)) => {
            let imageset = ImagesetId::from(imageset.trim());
            let mut resolver = args.resolver.open()?;
            resolver.scrape(std::slice::from_ref(&imageset))?;
            resolver.suffixes_for(imageset.as_str())
        }
        (None, None) => {
            return Err(UrlsetError::InvalidOption {
                message: "either --url-file or --imageset is required".to_string(),
            });
        }
    };

    let report = sync::synchronize(&args.label_dir, &suffixes)?;
    emit(&report, args.output)
}

fn run_fetch(args: FetchArgs) -> Result<(), UrlsetError> {
    let opts = FetchOptions {
        concurrency: args.concurrency,
        timeout: timeout_from_secs(args.timeout_secs)?,
        max_images: args.max_images,
    };
    let report = fetch::download_url_list(&args.url_file, &args.dest_dir, &opts)?;
    emit(&report, args.output)
}

fn run_rewrite(args: RewriteArgs) -> Result<(), UrlsetError> {
    let mut resolver = args.resolver.open()?;
    let imagesets = suffix::imagesets_in_url_list(&args.url_file, resolver.template())?;
    resolver.scrape(&imagesets)?;

    let output = args
        .output_file
        .as_deref()
        .unwrap_or(args.url_file.as_path());
    let report = suffix::rewrite_url_list(&args.url_file, output, &resolver)?;
    emit(&report, args.output)
}

fn run_localize(args: LocalizeArgs) -> Result<(), UrlsetError> {
    let report = dataset::write_local_manifest(&args.url_dataset, &args.output_dir)?;
    emit(&report, args.output)
}
