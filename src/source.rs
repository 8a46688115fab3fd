//! Source locators and raw byte loading.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;

use crate::encoding::{TextEncoding, decode_text};
use crate::error::{Result, ServeError};
use crate::http::{DEFAULT_TIMEOUT, fetch_url, is_url};

/// File read when neither a URL nor a path is configured.
pub const FALLBACK_SOURCE: &str = "dataset.csv";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Where the dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// Remote `http://` or `https://` URL.
    Url(String),
    /// Local file.
    Path(PathBuf),
}

impl SourceLocator {
    /// Pick the source: URL first, then path, then [`FALLBACK_SOURCE`].
    ///
    /// Blank values count as unset.
    pub fn resolve(url: Option<&str>, path: Option<&str>) -> Self {
        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
            return SourceLocator::Url(url.to_string());
        }
        if let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) {
            return SourceLocator::from(path);
        }
        SourceLocator::Path(PathBuf::from(FALLBACK_SOURCE))
    }

    /// Whether the locator names a gzip file (`.gz`, ignoring any query string).
    pub fn has_gz_suffix(&self) -> bool {
        match self {
            SourceLocator::Url(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.to_ascii_lowercase().ends_with(".gz")
            }
            SourceLocator::Path(path) => path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("gz")),
        }
    }
}

impl From<&str> for SourceLocator {
    fn from(s: &str) -> Self {
        if is_url(s) {
            SourceLocator::Url(s.to_string())
        } else {
            SourceLocator::Path(PathBuf::from(s))
        }
    }
}

impl From<&Path> for SourceLocator {
    fn from(p: &Path) -> Self {
        SourceLocator::Path(p.to_path_buf())
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Url(url) => write!(f, "{url}"),
            SourceLocator::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Decoded source text ready for CSV parsing.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub text: String,
    pub encoding: TextEncoding,
    pub was_gzip: bool,
}

/// Loads a [`SourceLocator`] into text.
#[derive(Debug, Clone)]
pub struct SourceLoader {
    fetch_timeout: Duration,
}

impl Default for SourceLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceLoader {
    pub fn new() -> Self {
        Self {
            fetch_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the timeout used for remote fetches.
    pub fn fetch_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Read raw bytes, decompress gzip if detected, and decode to UTF-8.
    pub fn load(&self, source: &SourceLocator) -> Result<SourceText> {
        let raw = match source {
            SourceLocator::Url(url) => fetch_url(url, self.fetch_timeout)?,
            SourceLocator::Path(path) => {
                let mut buf = Vec::new();
                File::open(path)?.read_to_end(&mut buf)?;
                buf
            }
        };

        let was_gzip = raw.starts_with(&GZIP_MAGIC) || source.has_gz_suffix();
        let bytes = if was_gzip { gunzip(&raw)? } else { raw };

        let (text, encoding) = decode_text(&bytes);
        if encoding != TextEncoding::Utf8 {
            tracing::debug!(%source, ?encoding, "source text was not clean UTF-8");
        }

        Ok(SourceText {
            text: text.into_owned(),
            encoding,
            was_gzip,
        })
    }
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ServeError::Decompress(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_resolve_prefers_url() {
        let src = SourceLocator::resolve(Some("https://x.io/a.csv"), Some("local.csv"));
        assert_eq!(src, SourceLocator::Url("https://x.io/a.csv".into()));

        let src = SourceLocator::resolve(Some("  "), Some("local.csv"));
        assert_eq!(src, SourceLocator::Path("local.csv".into()));

        let src = SourceLocator::resolve(None, Some(""));
        assert_eq!(src, SourceLocator::Path(FALLBACK_SOURCE.into()));
    }

    #[test]
    fn test_gz_suffix() {
        assert!(SourceLocator::from("https://x.io/a.csv.gz?dl=1").has_gz_suffix());
        assert!(SourceLocator::from("data/a.CSV.GZ").has_gz_suffix());
        assert!(!SourceLocator::from("data/a.csv").has_gz_suffix());
    }

    #[test]
    fn test_load_gzip_by_magic() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"a,b\n1,2\n").unwrap();
        let gz = enc.finish().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&gz).unwrap();
        file.flush().unwrap();

        let loaded = SourceLoader::new()
            .load(&SourceLocator::from(file.path()))
            .unwrap();
        assert!(loaded.was_gzip);
        assert_eq!(loaded.text, "a,b\n1,2\n");
    }

    #[test]
    fn test_load_missing_file() {
        let err = SourceLoader::new()
            .load(&SourceLocator::from("/definitely/not/here.csv"))
            .unwrap_err();
        assert!(matches!(err, ServeError::Io(_)));
    }

    #[test]
    fn test_corrupt_gzip() {
        let mut file = tempfile::Builder::new().suffix(".csv.gz").tempfile().unwrap();
        file.write_all(b"not gzip at all").unwrap();
        file.flush().unwrap();

        let err = SourceLoader::new()
            .load(&SourceLocator::from(file.path()))
            .unwrap_err();
        assert!(matches!(err, ServeError::Decompress(_)));
    }
}
