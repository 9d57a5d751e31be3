//! HTTP access to the image host.
//!
//! Every network call the pipeline makes goes through [`HttpClient`], so the
//! resolver and fetcher can be driven by an in-memory fake in tests.

use std::time::Duration;

use crate::error::RemoteError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimal blocking HTTP GET interface.
///
/// Implementations must treat any non-2xx status as an error. They are
/// shared across fetch workers, hence `Sync`.
pub trait HttpClient: Sync {
    /// GET `url` and decode the body as UTF-8 text.
    fn get_text(&self, url: &str) -> Result<String, RemoteError>;

    /// GET `url` and return the raw body.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, RemoteError>;
}

/// [`HttpClient`] backed by a `ureq` agent with a global per-request timeout.
pub struct UreqClient {
    agent: ureq::Agent,
    timeout: Duration,
}

impl UreqClient {
    /// Creates a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn call(&self, url: &str) -> Result<ureq::http::Response<ureq::Body>, RemoteError> {
        self.agent.get(url).call().map_err(|source| match source {
            ureq::Error::StatusCode(status) => RemoteError::Status {
                url: url.to_string(),
                status,
            },
            other => RemoteError::Transport {
                url: url.to_string(),
                message: other.to_string(),
            },
        })
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl HttpClient for UreqClient {
    fn get_text(&self, url: &str) -> Result<String, RemoteError> {
        let mut response = self.call(url)?;
        response
            .body_mut()
            .read_to_string()
            .map_err(|source| RemoteError::Transport {
                url: url.to_string(),
                message: source.to_string(),
            })
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let mut response = self.call(url)?;
        // Images can exceed ureq's default 10 MB body limit.
        response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(|source| RemoteError::Transport {
                url: url.to_string(),
                message: source.to_string(),
            })
    }
}

impl<T: HttpClient + ?Sized> HttpClient for &T {
    fn get_text(&self, url: &str) -> Result<String, RemoteError> {
        (**self).get_text(url)
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        (**self).get_bytes(url)
    }
}
