//! Allow-list of coverage points
//!
//! The filter file is a flat list of point identifiers separated by
//! whitespace. No comments, no escapes. An empty (or missing) file means
//! every point is allowed.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Filter file consulted when nothing else is configured
pub const DEFAULT_FILTER_FILE: &str = "covfilter.txt";

/// How a filter treats points it does not list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// No entries, every point passes
    Permissive,
    /// Only listed points pass
    Restricted,
}

impl std::fmt::Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterMode::Permissive => write!(f, "permissive"),
            FilterMode::Restricted => write!(f, "restricted"),
        }
    }
}

/// Set of point identifiers allowed to emit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    points: BTreeSet<String>,
}

impl Filter {
    /// Create an empty (permissive) filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a filter file
    ///
    /// A file that cannot be opened yields an empty filter. A read error
    /// part way through ends the token stream; whatever was read so far is kept.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match File::open(path) {
            Ok(file) => {
                let filter = Self::from_reader(BufReader::new(file));
                log::debug!(
                    "Loaded {} filter entries from {} ({})",
                    filter.len(),
                    path.display(),
                    filter.mode()
                );
                filter
            }
            Err(e) => {
                log::debug!("No filter at {} ({}), all points pass", path.display(), e);
                Self::new()
            }
        }
    }

    /// Read whitespace-separated tokens until end of input or the first read error
    pub fn from_reader<R: BufRead>(mut reader: R) -> Self {
        let mut filter = Self::new();
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => filter.insert_tokens(&line),
                Err(e) => {
                    // bytes read before the error are still in `line`
                    filter.insert_tokens(&line);
                    log::debug!("Filter read stopped early: {}", e);
                    break;
                }
            }
        }

        filter
    }

    fn insert_tokens(&mut self, bytes: &[u8]) {
        for token in bytes.split(|b| is_separator(*b)).filter(|t| !t.is_empty()) {
            self.insert(String::from_utf8_lossy(token));
        }
    }

    /// Add a point to the filter
    pub fn insert<S: Into<String>>(&mut self, id: S) -> bool {
        self.points.insert(id.into())
    }

    /// Whether `id` may emit under this filter
    pub fn allows(&self, id: &str) -> bool {
        self.points.is_empty() || self.points.contains(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.points.contains(id)
    }

    pub fn mode(&self) -> FilterMode {
        if self.points.is_empty() {
            FilterMode::Permissive
        } else {
            FilterMode::Restricted
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Listed points in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.points.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Filter {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().map(Into::into).collect(),
        }
    }
}

// Same set as C's isspace in the "C" locale
fn is_separator(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0B' | b'\x0C')
}
