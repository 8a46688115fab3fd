//! Multi-strategy CSV reading.
//!
//! A [`TableReader`] holds an ordered list of [`Strategy`] descriptors and
//! runs them in turn against the source text until one produces a table.
//! Every run is recorded as an [`Attempt`]; when all of them fail the reader
//! returns an empty table instead of an error, so a broken source degrades to
//! "no data" rather than taking the service down.

use std::fmt;
use std::time::{Duration, Instant};

use crate::dialect::{Dialect, Quote};
use crate::error::{Result, ServeError};
use crate::sniffer::Sniffer;
use crate::source::{SourceLoader, SourceLocator};
use crate::table::Table;

/// How a strategy picks its delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterChoice {
    /// Operator-configured delimiter; must occur in the header line.
    Override(u8),
    /// Detect the delimiter from the data.
    Sniff,
    /// Fixed delimiter.
    Fixed(u8),
}

/// Record parsing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Variable record lengths; any unreadable record is skipped.
    Tolerant,
    /// Fixed record length; only length mismatches are skipped, any other
    /// read error aborts the attempt.
    Strict,
}

/// One parse configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    pub delimiter: DelimiterChoice,
    pub engine: Engine,
}

impl Strategy {
    pub const fn new(delimiter: DelimiterChoice, engine: Engine) -> Self {
        Self { delimiter, engine }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.delimiter {
            DelimiterChoice::Override(d) => write!(f, "sep={:?} (override)", d as char)?,
            DelimiterChoice::Sniff => write!(f, "sep=auto")?,
            DelimiterChoice::Fixed(d) => write!(f, "sep={:?}", d as char)?,
        }
        match self.engine {
            Engine::Tolerant => write!(f, " engine=tolerant"),
            Engine::Strict => write!(f, " engine=strict"),
        }
    }
}

/// Result of running one strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Parsed {
        rows: usize,
        columns: usize,
        /// Records dropped for having the wrong number of fields.
        skipped: usize,
    },
    Failed {
        reason: String,
    },
}

/// A strategy together with what happened when it ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub strategy: Strategy,
    pub outcome: Outcome,
}

impl Attempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, Outcome::Parsed { .. })
    }
}

/// Everything the reader did for one source.
#[derive(Debug, Clone)]
pub struct ParseReport {
    /// Display form of the source.
    pub source: String,
    /// Attempts in the order they ran.
    pub attempts: Vec<Attempt>,
    /// The parsed table; empty when every attempt failed.
    pub table: Table,
    pub elapsed: Duration,
}

impl ParseReport {
    /// The strategy that produced the table, if any.
    pub fn strategy(&self) -> Option<Strategy> {
        self.attempts
            .iter()
            .find(|a| a.succeeded())
            .map(|a| a.strategy)
    }

    /// True when no strategy succeeded.
    pub fn failed(&self) -> bool {
        self.strategy().is_none()
    }
}

/// Header, well-formed records and the malformed-record count.
struct Records {
    header: Vec<String>,
    records: Vec<Vec<String>>,
    skipped: usize,
}

/// Reads a CSV source by trying several strategies in order.
///
/// # Example
///
/// ```
/// use csv_serve::TableReader;
///
/// let report = TableReader::new().read_text("id;name\n1;Ana\n2;Bruno\n");
/// assert_eq!(report.table.num_rows(), 2);
/// assert_eq!(report.table.columns()[1].name, "name");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TableReader {
    delimiter_override: Option<u8>,
    sniffer: Sniffer,
    loader: SourceLoader,
}

impl TableReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try `delimiter` before any other strategy.
    pub fn delimiter_override(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter_override = Some(delimiter);
        self
    }

    /// Number of records the sniffer samples.
    pub fn sample_records(&mut self, n: usize) -> &mut Self {
        self.sniffer.sample_records(n);
        self
    }

    /// Timeout for remote sources.
    pub fn fetch_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.loader.fetch_timeout(timeout);
        self
    }

    /// The strategies in the order they are tried.
    pub fn strategies(&self) -> Vec<Strategy> {
        let mut strategies = Vec::with_capacity(4);
        if let Some(d) = self.delimiter_override {
            strategies.push(Strategy::new(DelimiterChoice::Override(d), Engine::Tolerant));
        }
        strategies.push(Strategy::new(DelimiterChoice::Sniff, Engine::Tolerant));
        strategies.push(Strategy::new(DelimiterChoice::Fixed(b';'), Engine::Tolerant));
        strategies.push(Strategy::new(DelimiterChoice::Fixed(b','), Engine::Strict));
        strategies
    }

    /// Load and parse `source`. Never fails; see [`ParseReport::failed`].
    pub fn read(&self, source: &SourceLocator) -> ParseReport {
        let start = Instant::now();
        tracing::info!(%source, "loading dataset");

        match self.loader.load(source) {
            Ok(loaded) => self.parse(source.to_string(), &loaded.text, start),
            Err(e) => {
                let reason = e.to_string();
                let attempts = self
                    .strategies()
                    .into_iter()
                    .map(|strategy| {
                        tracing::warn!(%strategy, error = %reason, "parse attempt failed");
                        Attempt {
                            strategy,
                            outcome: Outcome::Failed {
                                reason: reason.clone(),
                            },
                        }
                    })
                    .collect();
                tracing::error!(%source, error = %reason, "could not read source, serving an empty table");
                ParseReport {
                    source: source.to_string(),
                    attempts,
                    table: Table::empty(),
                    elapsed: start.elapsed(),
                }
            }
        }
    }

    /// Parse in-memory CSV text.
    pub fn read_text(&self, text: &str) -> ParseReport {
        self.parse("<memory>".to_string(), text, Instant::now())
    }

    fn parse(&self, source: String, text: &str, start: Instant) -> ParseReport {
        let mut attempts = Vec::new();

        for strategy in self.strategies() {
            match self.try_strategy(text, strategy) {
                Ok(parsed) => {
                    let table = Table::from_records(parsed.header, parsed.records);
                    tracing::info!(
                        %strategy,
                        rows = table.num_rows(),
                        columns = table.num_columns(),
                        skipped = parsed.skipped,
                        "parsed CSV"
                    );
                    attempts.push(Attempt {
                        strategy,
                        outcome: Outcome::Parsed {
                            rows: table.num_rows(),
                            columns: table.num_columns(),
                            skipped: parsed.skipped,
                        },
                    });
                    return ParseReport {
                        source,
                        attempts,
                        table,
                        elapsed: start.elapsed(),
                    };
                }
                Err(e) => {
                    tracing::warn!(%strategy, error = %e, "parse attempt failed");
                    attempts.push(Attempt {
                        strategy,
                        outcome: Outcome::Failed {
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }

        tracing::error!(%source, attempts = attempts.len(), "all parse strategies failed, serving an empty table");
        ParseReport {
            source,
            attempts,
            table: Table::empty(),
            elapsed: start.elapsed(),
        }
    }

    fn try_strategy(&self, text: &str, strategy: Strategy) -> Result<Records> {
        let dialect = match strategy.delimiter {
            DelimiterChoice::Override(d) => {
                let header_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
                if !header_line.as_bytes().contains(&d) {
                    return Err(ServeError::NoDialectDetected(format!(
                        "delimiter {:?} does not occur in the header",
                        d as char
                    )));
                }
                Dialect::new(d, Quote::default())
            }
            DelimiterChoice::Sniff => self.sniffer.sniff(text)?,
            DelimiterChoice::Fixed(d) => Dialect::new(d, Quote::default()),
        };
        read_records(text, dialect, strategy.engine)
    }
}

fn read_records(text: &str, dialect: Dialect, engine: Engine) -> Result<Records> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(engine == Engine::Tolerant);
    dialect.apply(&mut builder);
    let mut reader = builder.from_reader(text.as_bytes());

    let mut record = csv::StringRecord::new();
    let mut header: Option<Vec<String>> = None;
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut skipped = 0;

    loop {
        match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                if let Some(h) = &header {
                    if record.len() == h.len() {
                        records.push(record.iter().map(str::to_string).collect());
                    } else {
                        skipped += 1;
                    }
                } else {
                    header = Some(normalize_header(&record, engine == Engine::Tolerant));
                }
            }
            Err(e) if matches!(e.kind(), csv::ErrorKind::UnequalLengths { .. }) => skipped += 1,
            Err(_) if engine == Engine::Tolerant => skipped += 1,
            Err(e) => return Err(e.into()),
        }
    }

    let header = header.ok_or(ServeError::EmptyData)?;
    if skipped > 0 {
        tracing::debug!(skipped, "dropped malformed records");
    }
    Ok(Records {
        header,
        records,
        skipped,
    })
}

/// Fill in blank names and make duplicates unique (`a`, `a.1`, `a.2`).
fn normalize_header(record: &csv::StringRecord, trim: bool) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(record.len());
    for (i, raw) in record.iter().enumerate() {
        let name = if trim { raw.trim() } else { raw };
        let base = if name.is_empty() {
            format!("Unnamed: {i}")
        } else {
            name.to_string()
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while names.contains(&candidate) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        names.push(candidate);
    }
    names
}
