//! The resident dataset and its population discipline.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::normalize::{NormalizeRules, normalize};
use crate::reader::{Attempt, ParseReport, Strategy, TableReader};
use crate::source::SourceLocator;
use crate::table::Table;

/// A loaded table together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub table: Table,
    pub source: String,
    pub attempts: Vec<Attempt>,
    pub elapsed: Duration,
}

impl Dataset {
    /// Wrap an already built table.
    pub fn new(table: Table) -> Self {
        Self {
            table,
            source: "<memory>".to_string(),
            attempts: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// The strategy that produced the table; `None` when ingestion failed.
    pub fn strategy(&self) -> Option<Strategy> {
        self.attempts.iter().find(|a| a.succeeded()).map(|a| a.strategy)
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }
}

impl From<ParseReport> for Dataset {
    fn from(report: ParseReport) -> Self {
        Self {
            table: report.table,
            source: report.source,
            attempts: report.attempts,
            elapsed: report.elapsed,
        }
    }
}

/// Produces a fresh dataset. Must not fail; failures become an empty table.
pub trait DatasetLoader: Send + Sync {
    fn load(&self) -> Dataset;
}

impl<F> DatasetLoader for F
where
    F: Fn() -> Dataset + Send + Sync,
{
    fn load(&self) -> Dataset {
        self()
    }
}

/// Reads, parses and normalizes one CSV source.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    source: SourceLocator,
    reader: TableReader,
    rules: NormalizeRules,
}

impl CsvLoader {
    pub fn new(source: SourceLocator, reader: TableReader, rules: NormalizeRules) -> Self {
        Self {
            source,
            reader,
            rules,
        }
    }

    pub fn source(&self) -> &SourceLocator {
        &self.source
    }
}

impl DatasetLoader for CsvLoader {
    fn load(&self) -> Dataset {
        let mut report = self.reader.read(&self.source);
        if !report.failed() {
            normalize(&mut report.table, &self.rules);
        }
        Dataset::from(report)
    }
}

/// Holds at most one dataset and loads it on demand.
///
/// Population is single-flight: concurrent callers that find the cache empty
/// wait for one load and share its result. Readers get an `Arc` snapshot that
/// stays valid across a later reload.
pub struct DatasetCache<L = CsvLoader> {
    loader: L,
    resident: RwLock<Option<Arc<Dataset>>>,
    gate: Mutex<()>,
}

impl<L: DatasetLoader> DatasetCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            resident: RwLock::new(None),
            gate: Mutex::new(()),
        }
    }

    /// The resident dataset, loading it first if needed.
    pub fn get(&self) -> Arc<Dataset> {
        if let Some(dataset) = self.snapshot() {
            return dataset;
        }

        let _gate = self.gate.lock();
        // Another caller may have populated while we waited
        if let Some(dataset) = self.snapshot() {
            return dataset;
        }
        self.populate()
    }

    /// Drop the resident dataset; the next [`get`](Self::get) reloads.
    pub fn invalidate(&self) {
        if self.resident.write().take().is_some() {
            tracing::debug!("dataset invalidated");
        }
    }

    /// Discard the resident dataset and load a fresh one before returning.
    ///
    /// Readers arriving meanwhile wait for the new dataset.
    pub fn reload(&self) -> Arc<Dataset> {
        let _gate = self.gate.lock();
        self.resident.write().take();
        self.populate()
    }

    /// True when a dataset is resident.
    pub fn is_loaded(&self) -> bool {
        self.resident.read().is_some()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    fn snapshot(&self) -> Option<Arc<Dataset>> {
        self.resident.read().clone()
    }

    // Caller holds the gate.
    fn populate(&self) -> Arc<Dataset> {
        let dataset = Arc::new(self.loader.load());
        tracing::info!(
            source = %dataset.source,
            rows = dataset.num_rows(),
            columns = dataset.table.num_columns(),
            elapsed_ms = dataset.elapsed.as_millis() as u64,
            "dataset loaded"
        );
        *self.resident.write() = Some(Arc::clone(&dataset));
        dataset
    }
}
