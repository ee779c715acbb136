//! Coverage report over captured trace output
//!
//! A trace log is whatever a traced program printed to stdout. Only the
//! `COV: ` lines matter; everything else the program printed is skipped.

use chrono::Local;
use indexmap::IndexMap;
use serde::Serialize;
use std::io::BufRead;

use crate::emitter::LINE_PREFIX;
use crate::filter::{Filter, FilterMode};

/// Points found in one or more captured traces
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    /// Emission count per point, in first-seen order
    points: IndexMap<String, usize>,
    lines: usize,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single captured trace
    pub fn parse<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut log = Self::new();
        log.extend_from(reader)?;
        Ok(log)
    }

    /// Add another captured trace, typically from a second process
    pub fn extend_from<R: BufRead>(&mut self, mut reader: R) -> std::io::Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            self.lines += 1;

            let mut line = buf.as_slice();
            if let Some(rest) = line.strip_suffix(b"\n") {
                line = rest.strip_suffix(b"\r").unwrap_or(rest);
            }
            if let Some(id) = line.strip_prefix(LINE_PREFIX.as_bytes()) {
                let id = String::from_utf8_lossy(id).into_owned();
                *self.points.entry(id).or_insert(0) += 1;
            }
        }
        Ok(())
    }

    /// Number of emissions of `id`
    pub fn count(&self, id: &str) -> usize {
        self.points.get(id).copied().unwrap_or(0)
    }

    /// Distinct points in first-seen order
    pub fn points(&self) -> impl Iterator<Item = (&str, usize)> {
        self.points.iter().map(|(id, count)| (id.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Lines read, including ones that were not trace lines
    pub fn lines_read(&self) -> usize {
        self.lines
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PointHit {
    pub id: String,
    /// Number of `COV:` lines for this point across the merged traces
    pub emissions: usize,
}

/// A trace log compared against a filter
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub generated: String,
    pub mode: FilterMode,
    pub filter_size: usize,
    /// Allowed points that were emitted, first-seen order
    pub hit: Vec<PointHit>,
    /// Filter entries never emitted, sorted
    pub missed: Vec<String>,
    /// Emitted points the filter does not list
    pub unexpected: Vec<PointHit>,
    /// `None` in permissive mode, where there is nothing to measure against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage_percent: Option<f64>,
}

impl CoverageReport {
    pub fn new(log: &TraceLog, filter: &Filter) -> Self {
        let mut hit = Vec::new();
        let mut unexpected = Vec::new();

        for (id, emissions) in log.points() {
            let entry = PointHit {
                id: id.to_string(),
                emissions,
            };
            if filter.allows(id) {
                hit.push(entry);
            } else {
                unexpected.push(entry);
            }
        }

        let missed: Vec<String> = filter
            .iter()
            .filter(|id| log.count(id) == 0)
            .map(str::to_string)
            .collect();

        let coverage_percent = match filter.mode() {
            FilterMode::Permissive => None,
            FilterMode::Restricted => Some(hit.len() as f64 * 100.0 / filter.len() as f64),
        };

        Self {
            generated: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            mode: filter.mode(),
            filter_size: filter.len(),
            hit,
            missed,
            unexpected,
            coverage_percent,
        }
    }

    /// Whether coverage reaches `threshold` percent; permissive reports always pass
    pub fn meets(&self, threshold: f64) -> bool {
        self.coverage_percent.is_none_or(|pct| pct >= threshold)
    }
}
