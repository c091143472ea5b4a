//! Bulk composite definitions delivered as a map.
//!
//! One composite per line:
//!
//! ```text
//! BAD_HEADER:4.5 HEADER_MISSING & !WHITELISTED
//! ```
//!
//! The map arrives in chunks. Chunks are only buffered; parsing starts when
//! the transfer is finished, and a failed transfer throws the buffer away.

use crate::loader::CompositeLoader;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapLineError {
    #[error("missing score for {0}")]
    MissingScore(String),
    #[error("invalid score for {0}")]
    InvalidScore(String),
}

/// A well-formed map line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapLine<'a> {
    pub name: &'a str,
    pub score: f64,
    pub expression: &'a str,
}

/// Splits `name:score expression` on the first space, then on the first colon.
pub fn parse_line(line: &str) -> Result<MapLine<'_>, MapLineError> {
    let (name_and_score, expression) = line.split_once(' ').unwrap_or((line, ""));
    let (name, score_text) = name_and_score
        .split_once(':')
        .unwrap_or((name_and_score, ""));

    if score_text.is_empty() {
        return Err(MapLineError::MissingScore(name_and_score.to_string()));
    }

    let score: f64 = score_text
        .parse()
        .map_err(|_| MapLineError::InvalidScore(name_and_score.to_string()))?;

    // Scores must fit a single precision float
    if score.is_nan() || score.abs() >= f64::from(f32::MAX) {
        return Err(MapLineError::InvalidScore(name_and_score.to_string()));
    }

    Ok(MapLine {
        name,
        score,
        expression,
    })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MapLoadSummary {
    pub loaded: usize,
    pub skipped: usize,
}

/// Receive buffer for one composites map.
#[derive(Debug)]
pub struct CompositesMap {
    source: String,
    buf: Vec<u8>,
    received: bool,
}

impl CompositesMap {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            buf: Vec::new(),
            received: false,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn read_chunk(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        self.received = true;
    }

    /// Drops everything received so far, for a transfer that failed.
    pub fn discard(&mut self) {
        if self.received {
            log::warn!(
                "discarding {} bytes of composites map {} after a failed transfer",
                self.buf.len(),
                self.source
            );
        }
        self.buf.clear();
        self.received = false;
    }

    /// Parses the completed transfer and loads every valid line.
    ///
    /// Lines load in silent duplicate mode. A bad line is logged and skipped
    /// without affecting the rest of the map.
    pub fn finish(&mut self, loader: &mut CompositeLoader<'_>) -> MapLoadSummary {
        let mut summary = MapLoadSummary::default();

        if !self.received {
            log::error!("no data read for composites map {}", self.source);
            return summary;
        }

        let buf = std::mem::take(&mut self.buf);
        self.received = false;
        let text = String::from_utf8_lossy(&buf);

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let entry = match parse_line(line) {
                Ok(entry) => entry,
                Err(e) => {
                    log::error!("{e}");
                    summary.skipped += 1;
                    continue;
                }
            };

            match loader.add_from_expression(entry.name, entry.expression, true, entry.score) {
                Ok(_) => summary.loaded += 1,
                Err(_) => {
                    log::error!("cannot add composite {}", entry.name);
                    summary.skipped += 1;
                }
            }
        }

        log::info!(
            "loaded {} composites from map {} ({} lines skipped)",
            summary.loaded,
            self.source,
            summary.skipped
        );
        summary
    }
}
