//! Delimiter sniffing based on table uniformity.
//!
//! Every (delimiter, quote) candidate splits a sample of the input; the
//! candidate whose field counts are the most uniform wins. The scoring
//! follows the uniformity measures of the Table Uniformity Method
//! (van den Burg, Nazábal and Sutton, 2019): `tau_0` rewards a small
//! standard deviation of field counts, `tau_1` rewards a narrow range, few
//! transitions and a dominant modal count.
//!
//! Unlike a dialect *guesser*, the sniffer refuses to answer when two
//! different delimiters explain the sample equally well, so the caller can
//! fall back to an explicit delimiter.

use std::cmp::Ordering;

use foldhash::{HashMap, HashMapExt};
use rayon::prelude::*;

use crate::dialect::{DELIMITERS, Dialect, QUOTES, Quote};
use crate::error::{Result, ServeError};

/// Relative score difference under which two delimiters are considered tied.
const TIE_EPSILON: f64 = 1e-9;

/// Field counts of the sampled records for one candidate dialect.
#[derive(Debug, Clone, Default)]
pub struct FieldCounts {
    counts: Vec<usize>,
    modal: usize,
    modal_freq: usize,
}

impl FieldCounts {
    pub fn new(counts: Vec<usize>) -> Self {
        let mut freq: HashMap<usize, usize> = HashMap::with_capacity(counts.len());
        for &fc in &counts {
            *freq.entry(fc).or_insert(0) += 1;
        }
        // Prefer the higher field count on equal frequency so the result
        // does not depend on map iteration order.
        let (modal, modal_freq) = freq
            .into_iter()
            .max_by(|(fc_a, n_a), (fc_b, n_b)| n_a.cmp(n_b).then_with(|| fc_a.cmp(fc_b)))
            .unwrap_or((0, 0));
        Self {
            counts,
            modal,
            modal_freq,
        }
    }

    pub fn modal(&self) -> usize {
        self.modal
    }

    pub fn is_uniform(&self) -> bool {
        self.counts.windows(2).all(|w| w[0] == w[1])
    }

    /// Consistency: `1 / (1 + 2 * sigma)`.
    pub fn tau_0(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        let n = self.counts.len() as f64;
        let mean = self.counts.iter().sum::<usize>() as f64 / n;
        let variance = self
            .counts
            .iter()
            .map(|&v| {
                let diff = v as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / n;
        1.0 / 2.0f64.mul_add(variance.sqrt(), 1.0)
    }

    /// Dispersion: weighted range, transition and mode dominance components.
    pub fn tau_1(&self) -> f64 {
        let n = self.counts.len();
        match n {
            0 => return 0.0,
            1 => return 1.0,
            _ => {}
        }

        let min = self.counts.iter().copied().min().unwrap_or(0);
        let max = self.counts.iter().copied().max().unwrap_or(0);
        let range_score = if max == 0 {
            0.0
        } else {
            1.0 - ((max - min) as f64 / max as f64).min(1.0)
        };

        let transitions = self.counts.windows(2).filter(|w| w[0] != w[1]).count();
        let transition_score = 1.0 - transitions as f64 / (n - 1) as f64;

        let mode_score = self.modal_freq as f64 / n as f64;

        mode_score.mul_add(0.4, range_score * 0.3 + transition_score * 0.3)
    }
}

/// Score of one candidate dialect.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub dialect: Dialect,
    pub num_fields: usize,
    pub score: f64,
}

/// Detects the delimiter of CSV text.
///
/// # Example
///
/// ```
/// use csv_serve::Sniffer;
///
/// let dialect = Sniffer::new().sniff("a|b|c\n1|2|3\n4|5|6\n").unwrap();
/// assert_eq!(dialect.delimiter, b'|');
/// ```
#[derive(Debug, Clone)]
pub struct Sniffer {
    sample_records: usize,
}

impl Default for Sniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sniffer {
    /// Create a sniffer sampling the first 100 records.
    pub fn new() -> Self {
        Self {
            sample_records: 100,
        }
    }

    /// Set how many records are sampled per candidate.
    pub fn sample_records(&mut self, n: usize) -> &mut Self {
        self.sample_records = n.max(1);
        self
    }

    /// Detect the dialect of `text`.
    ///
    /// Fails with [`ServeError::NoDialectDetected`] when no candidate splits
    /// the sample into two or more columns, and with
    /// [`ServeError::AmbiguousDialect`] when two delimiters tie.
    pub fn sniff(&self, text: &str) -> Result<Dialect> {
        if text.trim().is_empty() {
            return Err(ServeError::EmptyData);
        }

        let mut per_delimiter = self.score_candidates(text);
        per_delimiter.retain(|c| c.score > 0.0);
        per_delimiter.sort_by(compare_candidates);

        let Some(best) = per_delimiter.first() else {
            return Err(ServeError::NoDialectDetected(
                "no delimiter yields more than one column".to_string(),
            ));
        };

        if let Some(runner_up) = per_delimiter.get(1)
            && (best.score - runner_up.score).abs() <= TIE_EPSILON * best.score
        {
            return Err(ServeError::AmbiguousDialect(
                best.dialect.delimiter as char,
                runner_up.dialect.delimiter as char,
            ));
        }

        tracing::debug!(
            dialect = %best.dialect,
            fields = best.num_fields,
            score = best.score,
            "sniffed dialect"
        );
        Ok(best.dialect)
    }

    /// Score every candidate and keep the best quote setting per delimiter.
    pub fn score_candidates(&self, text: &str) -> Vec<Candidate> {
        let density = QuoteDensity::new(text.as_bytes());

        let mut all: Vec<Candidate> = DELIMITERS
            .par_iter()
            .flat_map_iter(|&delimiter| {
                QUOTES.iter().map(move |&quote| Dialect::new(delimiter, quote))
            })
            .map(|dialect| {
                let counts = sample_field_counts(text, dialect, self.sample_records);
                let score = score(&counts, dialect, density);
                Candidate {
                    dialect,
                    num_fields: counts.modal(),
                    score,
                }
            })
            .collect();

        all.sort_by(compare_candidates);
        let mut best_per_delimiter: Vec<Candidate> = Vec::with_capacity(DELIMITERS.len());
        for candidate in all {
            if !best_per_delimiter
                .iter()
                .any(|c| c.dialect.delimiter == candidate.dialect.delimiter)
            {
                best_per_delimiter.push(candidate);
            }
        }
        best_per_delimiter
    }
}

/// Highest score first; equal scores fall back to delimiter then quote priority.
fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| delimiter_priority(b.dialect.delimiter).cmp(&delimiter_priority(a.dialect.delimiter)))
        .then_with(|| quote_priority(b.dialect.quote).cmp(&quote_priority(a.dialect.quote)))
}

fn sample_field_counts(text: &str, dialect: Dialect, max_records: usize) -> FieldCounts {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(false).flexible(true);
    dialect.apply(&mut builder);
    let mut reader = builder.from_reader(text.as_bytes());

    let mut counts = Vec::new();
    let mut record = csv::ByteRecord::new();
    while counts.len() < max_records {
        match reader.read_byte_record(&mut record) {
            Ok(true) => {
                if record.len() == 1 && record[0].is_empty() {
                    continue;
                }
                counts.push(record.len());
            }
            Ok(false) | Err(_) => break,
        }
    }
    FieldCounts::new(counts)
}

fn score(counts: &FieldCounts, dialect: Dialect, density: QuoteDensity) -> f64 {
    let fields = counts.modal();
    if fields < 2 {
        return 0.0;
    }

    let uniformity = (counts.tau_0() * counts.tau_1()).sqrt();
    let field_bonus = 1.0 + (fields.min(10) as f64 / 10.0) * 0.2;
    let high_field_penalty = if fields > 100 {
        0.5
    } else if fields > 50 {
        0.8
    } else {
        1.0
    };

    uniformity
        * field_bonus
        * high_field_penalty
        * delimiter_penalty(dialect.delimiter)
        * density.multiplier(dialect.quote)
}

/// Penalty for uncommon delimiters so rare characters do not win on
/// accidental patterns.
const fn delimiter_penalty(delimiter: u8) -> f64 {
    match delimiter {
        b',' | b';' | b'\t' => 1.0,
        b'|' => 0.98,
        b' ' => 0.75,
        b'^' | b'~' => 0.80,
        b'#' | b'&' => 0.60,
        b'/' => 0.65,
        _ => 0.70,
    }
}

const fn delimiter_priority(delimiter: u8) -> u8 {
    match delimiter {
        b',' => 10,
        b';' => 9,
        b'\t' => 8,
        b'|' => 7,
        b'^' | b'~' => 3,
        b'/' | b' ' => 2,
        b'#' | b'&' => 1,
        _ => 0,
    }
}

const fn quote_priority(quote: Quote) -> u8 {
    match quote {
        Quote::Some(b'"') => 3,
        Quote::Some(b'\'') => 2,
        Quote::None => 1,
        Quote::Some(_) => 0,
    }
}

/// Quote characters per 1000 bytes of input.
#[derive(Debug, Clone, Copy)]
struct QuoteDensity {
    double: usize,
    single: usize,
}

impl QuoteDensity {
    // ~0.5% of the bytes
    const THRESHOLD: usize = 5;

    fn new(data: &[u8]) -> Self {
        if data.is_empty() {
            return Self { double: 0, single: 0 };
        }
        Self {
            double: bytecount::count(data, b'"') * 1000 / data.len(),
            single: bytecount::count(data, b'\'') * 1000 / data.len(),
        }
    }

    /// Apostrophes in text are common, so single quotes only win with strong
    /// evidence and no double quotes around.
    fn multiplier(self, quote: Quote) -> f64 {
        match quote {
            Quote::Some(b'"') if self.double >= Self::THRESHOLD => 1.03,
            Quote::Some(b'\'')
                if self.single >= Self::THRESHOLD * 2 && self.double < Self::THRESHOLD =>
            {
                1.05
            }
            Quote::Some(b'\'') if self.double >= Self::THRESHOLD => 0.95,
            Quote::None if self.double >= Self::THRESHOLD => 0.90,
            _ => 1.0,
        }
    }
}
