//! Runtime configuration for the service.

use std::time::Duration;

use crate::cache::CsvLoader;
use crate::error::{Result, ServeError};
use crate::http::DEFAULT_TIMEOUT;
use crate::normalize::{DatePreference, NormalizeRules};
use crate::query::QueryColumns;
use crate::reader::TableReader;
use crate::source::SourceLocator;

/// Everything needed to build a [`Service`](crate::Service).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use csv_serve::ServiceConfig;
///
/// let mut config = ServiceConfig::default();
/// config.api_key("secret").csv_path("data.csv").delay(Duration::from_millis(250));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.source().to_string(), "data.csv");
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Remote source; preferred over `csv_path`.
    pub csv_url: Option<String>,
    pub csv_path: Option<String>,
    /// Delimiter tried before sniffing.
    pub delimiter: Option<u8>,
    /// Sleep before serving `/schema` and `/dados`.
    pub delay: Duration,
    /// Shared secret expected in `x-api-key`.
    pub api_key: String,
    pub app_version: String,
    /// Reported by `/`.
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub fetch_timeout: Duration,
    /// Load the dataset before accepting requests.
    pub eager: bool,
    pub normalize: NormalizeRules,
    pub query_columns: QueryColumns,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            csv_url: None,
            csv_path: None,
            delimiter: None,
            delay: Duration::ZERO,
            api_key: String::new(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            service_name: env!("CARGO_PKG_NAME").to_string(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            fetch_timeout: DEFAULT_TIMEOUT,
            eager: false,
            normalize: NormalizeRules::default(),
            query_columns: QueryColumns::default(),
        }
    }
}

impl ServiceConfig {
    pub fn csv_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.csv_url = Some(url.into());
        self
    }

    pub fn csv_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.csv_path = Some(path.into());
        self
    }

    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn delay(&mut self, delay: Duration) -> &mut Self {
        self.delay = delay;
        self
    }

    pub fn api_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.api_key = key.into();
        self
    }

    pub fn app_version(&mut self, version: impl Into<String>) -> &mut Self {
        self.app_version = version.into();
        self
    }

    pub fn bind(&mut self, host: impl Into<String>, port: u16) -> &mut Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn date_preference(&mut self, preference: DatePreference) -> &mut Self {
        self.normalize.date_preference = preference;
        self
    }

    pub fn fetch_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn eager(&mut self, eager: bool) -> &mut Self {
        self.eager = eager;
        self
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ServeError::InvalidConfig("api key must not be empty".into()));
        }
        if let Some(d) = self.delimiter
            && matches!(d, b'"' | b'\n' | b'\r')
        {
            return Err(ServeError::InvalidConfig(format!(
                "{:?} cannot be used as a delimiter",
                d as char
            )));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ServeError::InvalidConfig("fetch timeout must be positive".into()));
        }
        Ok(())
    }

    /// `host:port` to listen on.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn source(&self) -> SourceLocator {
        SourceLocator::resolve(self.csv_url.as_deref(), self.csv_path.as_deref())
    }

    pub fn table_reader(&self) -> TableReader {
        let mut reader = TableReader::new();
        reader.fetch_timeout(self.fetch_timeout);
        if let Some(d) = self.delimiter {
            reader.delimiter_override(d);
        }
        reader
    }

    /// The loader for the configured source.
    pub fn loader(&self) -> CsvLoader {
        CsvLoader::new(self.source(), self.table_reader(), self.normalize.clone())
    }
}

/// Convert a delay in seconds, rejecting negative, NaN and out of range values.
pub fn delay_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        ServeError::InvalidConfig(format!("delay must be a non-negative number of seconds, got {secs}: {e}"))
    })
}
