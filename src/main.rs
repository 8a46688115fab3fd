//! csv-serve CLI - serve a CSV dataset over HTTP

use clap::Parser;
use csv_serve::config::delay_from_secs;
use csv_serve::{DatePreference, HttpServer, Service, ServiceConfig, parse_delimiter};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Serve one CSV dataset from memory.
///
/// The dataset is read from a URL or a local file (gzip allowed), parsed with
/// an automatically detected delimiter and served as JSON or NDJSON.
#[derive(Parser, Debug)]
#[command(name = "csv-serve")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Remote CSV source (preferred over --csv-path)
    #[arg(long, env = "CSV_URL")]
    csv_url: Option<String>,

    /// Local CSV source (default: dataset.csv)
    #[arg(long, env = "CSV_PATH")]
    csv_path: Option<String>,

    /// Delimiter to try before sniffing (single character, or \t)
    #[arg(long, env = "CSV_SEP")]
    csv_sep: Option<String>,

    /// Seconds to sleep before answering /schema and /dados
    #[arg(long, env = "DELAY", default_value = "0")]
    delay: f64,

    /// Shared secret expected in the x-api-key header
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,

    /// Version reported by /version (default: crate version)
    #[arg(long, env = "APP_VER")]
    app_version: Option<String>,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short = 'p', long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Read ambiguous dates day first (default: month first)
    #[arg(long, env = "DATE_DMY")]
    dmy: bool,

    /// Timeout for fetching --csv-url, in seconds
    #[arg(long, env = "FETCH_TIMEOUT", default_value = "30")]
    fetch_timeout: u64,

    /// Load the dataset before accepting requests
    #[arg(long, env = "EAGER_LOAD")]
    eager: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

fn build_config(args: &Args) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    let mut config = ServiceConfig::default();
    config
        .api_key(args.api_key.as_str())
        .bind(args.host.as_str(), args.port)
        .fetch_timeout(Duration::from_secs(args.fetch_timeout))
        .eager(args.eager);

    if let Some(url) = &args.csv_url {
        config.csv_url(url.as_str());
    }
    if let Some(path) = &args.csv_path {
        config.csv_path(path.as_str());
    }
    if let Some(version) = &args.app_version {
        config.app_version(version.as_str());
    }
    if args.dmy {
        config.date_preference(DatePreference::DmyFormat);
    }

    if let Some(sep) = args.csv_sep.as_deref().filter(|s| !s.is_empty()) {
        let delimiter = parse_delimiter(sep).ok_or_else(|| format!("invalid delimiter {sep:?}"))?;
        config.delimiter(delimiter);
    }

    config.delay(delay_from_secs(args.delay)?);

    config.validate()?;
    Ok(config)
}

fn run(config: &ServiceConfig) -> csv_serve::Result<()> {
    let service = Arc::new(Service::from_config(config));
    tracing::info!(source = %config.source(), "configured dataset source");

    if config.eager {
        let dataset = service.cache().get();
        tracing::info!(rows = dataset.num_rows(), "dataset ready");
    }

    let server = HttpServer::bind(&config.bind_addr(), service)?;
    tracing::info!(addr = %config.bind_addr(), "listening");
    server.serve();
    Ok(())
}
