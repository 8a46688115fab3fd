//! csv-serve: serve one CSV dataset from memory
//!
//! Loads a CSV file or URL (optionally gzip-compressed, in any common text
//! encoding, with an unknown delimiter and some broken rows), keeps it resident
//! and answers filtered, projected and paginated queries as JSON or NDJSON.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use csv_serve::{HttpServer, Service, ServiceConfig};
//!
//! let mut config = ServiceConfig::default();
//! config.api_key("secret").csv_path("vendas.csv.gz");
//!
//! let service = Arc::new(Service::from_config(&config));
//! let server = HttpServer::bind(&config.bind_addr(), service).unwrap();
//! server.serve();
//! ```
//!
//! # Reading a table directly
//!
//! ```
//! use csv_serve::{DelimiterChoice, TableReader, Type};
//!
//! let report = TableReader::new().read_text("id\tvalor\n1\t2.5\n2\t4\n");
//! assert_eq!(report.strategy().unwrap().delimiter, DelimiterChoice::Sniff);
//! assert_eq!(report.table.columns()[1].ty, Type::Float);
//! ```
//!
//! # Ingestion
//!
//! The reader tries an ordered list of strategies and keeps the first that
//! yields a table:
//! 1. The configured delimiter override, if any
//! 2. A sniffed delimiter, scored by how uniform the field counts are
//! 3. Semicolon
//! 4. Comma with a strict reader
//!
//! Rows with the wrong number of fields are dropped. If nothing works the
//! dataset is an empty table and `/health` reports a null strategy.

pub mod cache;
pub mod config;
mod dialect;
pub mod encode;
mod encoding;
mod error;
mod field_type;
mod http;
pub mod normalize;
pub mod query;
pub mod reader;
pub mod server;
pub mod service;
mod sniffer;
pub mod source;
mod table;
mod type_detection;
mod value;

pub use cache::{CsvLoader, Dataset, DatasetCache, DatasetLoader};
pub use config::ServiceConfig;
pub use dialect::{Dialect, Quote, parse_delimiter};
pub use encode::{NdjsonStream, to_json_array};
pub use error::{Result, ServeError};
pub use field_type::Type;
pub use http::HttpError;
pub use normalize::{DatePreference, NormalizeRules};
pub use query::{OutputFormat, QueryColumns, QueryParams, RowView};
pub use reader::{Attempt, DelimiterChoice, Engine, Outcome, ParseReport, Strategy, TableReader};
pub use server::HttpServer;
pub use service::{ApiRequest, ApiResponse, Body, Method, Service};
pub use sniffer::Sniffer;
pub use source::{SourceLoader, SourceLocator};
pub use table::{Column, Table};
pub use value::Value;

// Re-export for advanced usage
pub use encoding::{TextEncoding, decode_text, is_utf8};
