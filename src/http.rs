//! Blocking download of remote CSV sources.

use std::time::Duration;
use thiserror::Error;

/// Default timeout for HTTP requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur during HTTP fetching.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP error {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote sources need the `http` feature")]
    Disabled,
}

#[cfg(feature = "http")]
impl From<ureq::Error> for HttpError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => HttpError::HttpStatus {
                status: code,
                message: format!("Server returned status {code}"),
            },
            _ => HttpError::Network(err.to_string()),
        }
    }
}

/// Returns true if the locator looks like a remote URL.
pub fn is_url(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

/// Download the whole body of `url`.
///
/// The body is returned as raw bytes; decompression and decoding happen in
/// the caller so that local and remote sources share one path.
#[cfg(feature = "http")]
pub fn fetch_url(url: &str, timeout: Duration) -> Result<Vec<u8>, HttpError> {
    use std::io::Read;

    if !is_url(url) {
        return Err(HttpError::InvalidUrl(format!(
            "URL must start with http:// or https://: {url}"
        )));
    }

    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = agent.get(url).call()?;

    let content_length = response
        .headers()
        .get("Content-Length")
        .and_then(|h| h.to_str().ok()?.parse::<usize>().ok());

    let mut reader = response.into_body().into_reader();
    let mut data = Vec::with_capacity(content_length.unwrap_or(0));
    reader.read_to_end(&mut data)?;

    tracing::debug!(url, bytes = data.len(), "fetched remote source");
    Ok(data)
}

#[cfg(not(feature = "http"))]
pub fn fetch_url(url: &str, _timeout: Duration) -> Result<Vec<u8>, HttpError> {
    if !is_url(url) {
        return Err(HttpError::InvalidUrl(url.to_string()));
    }
    Err(HttpError::Disabled)
}
