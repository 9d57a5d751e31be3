//! Rewriting of previously generated URL lists to their suffixed form.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;

use super::{SuffixResolver, UrlTemplate};
use crate::error::UrlsetError;
use crate::types::ImagesetId;

/// What happened to one line of a URL list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RewrittenLine {
    /// An unsuffixed image URL that now carries its token.
    Rewritten(String),
    /// An image URL of the template with no known token; kept verbatim.
    Unresolved(String),
    /// Anything else (already suffixed, foreign URL, blank); kept verbatim.
    Unchanged(String),
}

impl RewrittenLine {
    pub fn text(&self) -> &str {
        match self {
            RewrittenLine::Rewritten(text)
            | RewrittenLine::Unresolved(text)
            | RewrittenLine::Unchanged(text) => text,
        }
    }
}

/// Rewrites one URL using the resolver's cache.
pub fn rewrite_url_line<C>(line: &str, resolver: &SuffixResolver<C>) -> RewrittenLine {
    let line = line.trim();
    let Some(parts) = resolver.template().parse_image_url(line) else {
        return RewrittenLine::Unchanged(line.to_string());
    };
    if parts.suffix.is_some() {
        return RewrittenLine::Unchanged(line.to_string());
    }

    match resolver.resolve(parts.imageset.as_str(), parts.number.as_str()) {
        Some(token) => {
            let replacement =
                resolver
                    .template()
                    .image_url(&parts.imageset, &parts.number, Some(token));
            RewrittenLine::Rewritten(format!(
                "{}{}{}",
                &line[..parts.start],
                replacement,
                &line[parts.end..]
            ))
        }
        None => {
            log::warn!(
                "no suffix found for imageset {}, image {}",
                parts.imageset,
                parts.number
            );
            RewrittenLine::Unresolved(line.to_string())
        }
    }
}

fn read_url_list(path: &Path) -> Result<String, UrlsetError> {
    if !path.is_file() {
        return Err(UrlsetError::MissingInput {
            path: path.to_path_buf(),
            what: "URL list".to_string(),
        });
    }
    fs::read_to_string(path).map_err(UrlsetError::Io)
}

/// Imagesets referenced by the template's image URLs in a URL list, sorted.
pub fn imagesets_in_url_list(
    path: &Path,
    template: &UrlTemplate,
) -> Result<Vec<ImagesetId>, UrlsetError> {
    let content = read_url_list(path)?;
    let imagesets: BTreeSet<ImagesetId> = content
        .lines()
        .filter_map(|line| template.parse_image_url(line))
        .map(|parts| parts.imageset)
        .collect();
    Ok(imagesets.into_iter().collect())
}

/// Rewrites every line of `input` into `output`.
///
/// `input` and `output` may be the same path; the whole list is read before
/// anything is written.
pub fn rewrite_url_list<C>(
    input: &Path,
    output: &Path,
    resolver: &SuffixResolver<C>,
) -> Result<RewriteReport, UrlsetError> {
    let content = read_url_list(input)?;

    let mut report = RewriteReport::default();
    let mut rewritten = String::with_capacity(content.len() + content.len() / 8);
    for line in content.lines() {
        let outcome = rewrite_url_line(line, resolver);
        match &outcome {
            RewrittenLine::Rewritten(_) => report.rewritten += 1,
            RewrittenLine::Unresolved(_) => report.unresolved += 1,
            RewrittenLine::Unchanged(_) => report.unchanged += 1,
        }
        rewritten.push_str(outcome.text());
        rewritten.push('\n');
    }

    fs::write(output, rewritten).map_err(|source| UrlsetError::UrlListWrite {
        path: output.to_path_buf(),
        source,
    })?;
    log::info!("updated URLs saved to {}", output.display());
    Ok(report)
}

/// Line counts of a URL list rewrite.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    pub rewritten: usize,
    pub unresolved: usize,
    pub unchanged: usize,
}

impl fmt::Display for RewriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Rewrote {} URL(s); {} without a known suffix, {} left unchanged",
            self.rewritten, self.unresolved, self.unchanged
        )
    }
}
