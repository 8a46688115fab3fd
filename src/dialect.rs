use std::fmt;

/// Candidate delimiters for sniffing, ordered by real-world frequency.
/// Colon is left out because it shows up in time values (HH:MM:SS).
pub const DELIMITERS: &[u8] = b",;\t| ^~#&/";

/// Quote characters to test.
pub const QUOTES: &[Quote] = &[
    Quote::Some(b'"'),  // Double quote (most common)
    Quote::Some(b'\''), // Single quote
    Quote::None,        // No quoting
];

/// A delimiter + quote pair used to split records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dialect {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Quote character configuration.
    pub quote: Quote,
}

impl Dialect {
    pub const fn new(delimiter: u8, quote: Quote) -> Self {
        Self { delimiter, quote }
    }

    /// Configure a csv reader for this dialect.
    pub fn apply(&self, builder: &mut csv::ReaderBuilder) {
        builder.delimiter(self.delimiter);
        match self.quote {
            Quote::None => {
                builder.quoting(false);
            }
            Quote::Some(q) => {
                builder.quoting(true).quote(q);
            }
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::new(b',', Quote::default())
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sep={:?} quote={}", self.delimiter as char, self.quote)
    }
}

/// Quote character configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quote {
    /// No quoting.
    None,
    /// Quote with the specified character.
    Some(u8),
}

impl Default for Quote {
    fn default() -> Self {
        Quote::Some(b'"')
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quote::None => write!(f, "none"),
            Quote::Some(c) => write!(f, "{}", *c as char),
        }
    }
}

/// Parse an operator-supplied delimiter such as `;`, `|`, `\t` or `tab`.
pub fn parse_delimiter(s: &str) -> Option<u8> {
    match s {
        "\\t" | "tab" | "TAB" => Some(b'\t'),
        _ => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii() => Some(c as u8),
                _ => None,
            }
        }
    }
}
