//! Mapping between imageset ids and host URLs.

use regex::Regex;

use crate::error::UrlsetError;
use crate::types::{ImageNumber, ImagesetId, SuffixToken};

/// Template used when none is configured.
pub const DEFAULT_URL_TEMPLATE: &str = "https://prism-static.aruw.org/images/1_{id}/";

const ID_PLACEHOLDER: &str = "{id}";

/// An imageset base URL template with a single `{id}` placeholder.
///
/// Besides building listing and image URLs, the template is compiled into a
/// pattern that recognises image URLs belonging to any imageset, which is how
/// existing URL lists are mapped back to `(imageset, number)` keys.
#[derive(Clone, Debug)]
pub struct UrlTemplate {
    template: String,
    image_url_pattern: Regex,
}

/// The pieces of an image URL recognised by [`UrlTemplate::parse_image_url`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageUrlParts {
    pub imageset: ImagesetId,
    pub number: ImageNumber,
    pub suffix: Option<SuffixToken>,
    /// Byte range of the matched URL prefix + filename within the input.
    pub start: usize,
    pub end: usize,
}

impl UrlTemplate {
    /// Parses a template such as `https://host/images/1_{id}/`.
    pub fn parse(template: &str) -> Result<Self, UrlsetError> {
        let trimmed = template.trim();
        let Some((prefix, rest)) = trimmed.split_once(ID_PLACEHOLDER) else {
            return Err(UrlsetError::InvalidUrlTemplate {
                template: template.to_string(),
                message: format!("missing '{ID_PLACEHOLDER}' placeholder"),
            });
        };
        if rest.contains(ID_PLACEHOLDER) {
            return Err(UrlsetError::InvalidUrlTemplate {
                template: template.to_string(),
                message: format!("'{ID_PLACEHOLDER}' may appear only once"),
            });
        }

        let pattern = format!(
            r"{}([^/?#]+){}/image-(\d+)(?:_([A-Za-z0-9]+))?\.jpg",
            regex::escape(prefix),
            regex::escape(rest.trim_end_matches('/')),
        );
        let image_url_pattern =
            Regex::new(&pattern).map_err(|source| UrlsetError::InvalidUrlTemplate {
                template: template.to_string(),
                message: source.to_string(),
            })?;

        Ok(Self {
            template: trimmed.to_string(),
            image_url_pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Base URL of an imageset directory, without a trailing slash.
    pub fn base_url(&self, imageset: &ImagesetId) -> String {
        self.template
            .replace(ID_PLACEHOLDER, imageset.as_str())
            .trim_end_matches('/')
            .to_string()
    }

    /// URL of the server-rendered directory listing for an imageset.
    pub fn listing_url(&self, imageset: &ImagesetId) -> String {
        format!("{}/", self.base_url(imageset))
    }

    /// URL of one image, suffixed when a token is known.
    pub fn image_url(
        &self,
        imageset: &ImagesetId,
        number: &ImageNumber,
        suffix: Option<&SuffixToken>,
    ) -> String {
        let base = self.base_url(imageset);
        match suffix {
            Some(token) => format!("{base}/image-{number}_{token}.jpg"),
            None => format!("{base}/image-{number}.jpg"),
        }
    }

    /// Recognises the first image URL of this template inside `text`.
    pub fn parse_image_url(&self, text: &str) -> Option<ImageUrlParts> {
        let caps = self.image_url_pattern.captures(text)?;
        let whole = caps.get(0)?;
        Some(ImageUrlParts {
            imageset: ImagesetId::from(caps.get(1)?.as_str()),
            number: ImageNumber::from(caps.get(2)?.as_str()),
            suffix: caps.get(3).map(|m| SuffixToken::from(m.as_str())),
            start: whole.start(),
            end: whole.end(),
        })
    }
}

impl Default for UrlTemplate {
    fn default() -> Self {
        Self::parse(DEFAULT_URL_TEMPLATE).expect("default template is valid")
    }
}
