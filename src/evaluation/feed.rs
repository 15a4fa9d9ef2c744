//! Ground-Truth Feed
//!
//! Sequential, time-ordered source of ground-truth events. The sliding window
//! pulls from a feed on demand and never holds more than its window's worth of
//! events, so the file-backed feed reads one line at a time.

use crate::evaluation::events::{GroundTruthEvent, Millis, UNKNOWN_USER};
use crate::evaluation::timestamp::parse_timestamp_field;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug)]
pub enum FeedError {
    /// Opening or reading the underlying log failed.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "ground truth I/O error on {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for FeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
        }
    }
}

// =============================================================================
// COUNTERS
// =============================================================================

/// Line-level bookkeeping of a feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCounters {
    /// Physical lines read (including skipped ones).
    pub lines_read: u64,
    /// Events handed out through `next_event`.
    pub events_yielded: u64,
    /// Comment and blank lines.
    pub lines_ignored: u64,
    /// Short or unparseable lines.
    pub lines_malformed: u64,
}

// =============================================================================
// FEED TRAIT
// =============================================================================

/// Trait for sources that replay ground-truth events in non-decreasing time order.
pub trait GroundTruthFeed {
    /// Get the next event from the feed. `Ok(None)` means exhausted.
    fn next_event(&mut self) -> Result<Option<GroundTruthEvent>, FeedError>;

    /// Peek at the timestamp of the next event without consuming it.
    fn peek_time(&mut self) -> Result<Option<Millis>, FeedError>;

    /// Release the underlying resource. Further reads yield `Ok(None)`.
    fn close(&mut self) -> Result<(), FeedError> {
        Ok(())
    }

    /// Feed identifier for logging/diagnostics.
    fn name(&self) -> &str {
        "unknown"
    }

    fn counters(&self) -> FeedCounters {
        FeedCounters::default()
    }
}

// =============================================================================
// IN-MEMORY FEED
// =============================================================================

/// A feed backed by an in-memory vector of events.
pub struct VecFeed {
    events: Vec<GroundTruthEvent>,
    index: usize,
    name: String,
}

impl VecFeed {
    pub fn new(name: impl Into<String>, mut events: Vec<GroundTruthEvent>) -> Self {
        // Stable sort keeps log order among equal timestamps.
        events.sort_by_key(|e| e.timestamp);
        Self {
            events,
            index: 0,
            name: name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.events.len().saturating_sub(self.index)
    }
}

impl GroundTruthFeed for VecFeed {
    fn next_event(&mut self) -> Result<Option<GroundTruthEvent>, FeedError> {
        let event = self.events.get(self.index).copied();
        if event.is_some() {
            self.index += 1;
        }
        Ok(event)
    }

    fn peek_time(&mut self) -> Result<Option<Millis>, FeedError> {
        Ok(self.events.get(self.index).map(|e| e.timestamp))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn counters(&self) -> FeedCounters {
        FeedCounters {
            lines_read: self.index as u64,
            events_yielded: self.index as u64,
            ..Default::default()
        }
    }
}

// =============================================================================
// TSV FILE FEED
// =============================================================================

/// Column positions of the ground-truth fields in a tab-separated line.
///
/// Defaults follow the contest log layout shared with the prediction log:
/// `type, messageID, timestamp, responseTime, itemID, userID, domainID, ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundTruthLayout {
    pub timestamp_column: usize,
    pub item_column: usize,
    pub user_column: usize,
    pub domain_column: usize,
}

impl Default for GroundTruthLayout {
    fn default() -> Self {
        Self {
            timestamp_column: 2,
            item_column: 4,
            user_column: 5,
            domain_column: 6,
        }
    }
}

impl GroundTruthLayout {
    /// Number of columns a line must have to be usable.
    pub fn min_columns(&self) -> usize {
        [
            self.timestamp_column,
            self.item_column,
            self.user_column,
            self.domain_column,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }

    /// Extract an event from one log line.
    ///
    /// Returns `None` for short lines and lines whose item, domain or timestamp
    /// do not parse. An unparseable user maps to `UNKNOWN_USER`.
    pub fn parse_line(&self, line: &str) -> Option<GroundTruthEvent> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < self.min_columns() {
            return None;
        }

        let item_id = fields[self.item_column].trim().parse().ok()?;
        let domain_id = fields[self.domain_column].trim().parse().ok()?;
        let timestamp = parse_timestamp_field(fields[self.timestamp_column]).ok()?;
        let user_id = fields[self.user_column]
            .trim()
            .parse()
            .unwrap_or(UNKNOWN_USER);

        Some(GroundTruthEvent::new(user_id, item_id, domain_id, timestamp))
    }
}

/// Line-oriented ground-truth log reader with one event of read-ahead.
pub struct TsvGroundTruthFeed<R: BufRead = BufReader<File>> {
    reader: Option<R>,
    path: PathBuf,
    name: String,
    layout: GroundTruthLayout,
    pending: Option<GroundTruthEvent>,
    line_buf: Vec<u8>,
    counters: FeedCounters,
}

impl TsvGroundTruthFeed<BufReader<File>> {
    /// Open a ground-truth log. A missing or unreadable file is fatal.
    pub fn open(path: impl AsRef<Path>, layout: GroundTruthLayout) -> Result<Self, FeedError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| FeedError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "opened ground truth log");
        Ok(Self::from_reader(BufReader::new(file), path, layout))
    }
}

impl<R: BufRead> TsvGroundTruthFeed<R> {
    /// Wrap an already-open reader; `origin` is only used in messages.
    pub fn from_reader(reader: R, origin: impl Into<PathBuf>, layout: GroundTruthLayout) -> Self {
        let path = origin.into();
        Self {
            name: path.display().to_string(),
            reader: Some(reader),
            path,
            layout,
            pending: None,
            line_buf: Vec::new(),
            counters: FeedCounters::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Read lines until one yields an event, or the log ends.
    fn read_next(&mut self) -> Result<Option<GroundTruthEvent>, FeedError> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };

            self.line_buf.clear();
            let n = reader
                .read_until(b'\n', &mut self.line_buf)
                .map_err(|source| FeedError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            if n == 0 {
                return Ok(None);
            }
            self.counters.lines_read += 1;

            let Ok(line) = std::str::from_utf8(&self.line_buf) else {
                self.counters.lines_malformed += 1;
                debug!(
                    feed = %self.name,
                    line_no = self.counters.lines_read,
                    "skipping ground truth line that is not valid UTF-8"
                );
                continue;
            };
            let line = line.trim_end_matches(['\r', '\n']);
            if line.len() < 2 || line.starts_with('#') {
                self.counters.lines_ignored += 1;
                continue;
            }

            match self.layout.parse_line(line) {
                Some(event) => return Ok(Some(event)),
                None => {
                    self.counters.lines_malformed += 1;
                    debug!(
                        feed = %self.name,
                        line_no = self.counters.lines_read,
                        "skipping malformed ground truth line"
                    );
                }
            }
        }
    }

    fn fill_pending(&mut self) -> Result<(), FeedError> {
        if self.pending.is_none() {
            self.pending = self.read_next()?;
        }
        Ok(())
    }
}

impl<R: BufRead> GroundTruthFeed for TsvGroundTruthFeed<R> {
    fn next_event(&mut self) -> Result<Option<GroundTruthEvent>, FeedError> {
        self.fill_pending()?;
        let event = self.pending.take();
        if event.is_some() {
            self.counters.events_yielded += 1;
        }
        Ok(event)
    }

    fn peek_time(&mut self) -> Result<Option<Millis>, FeedError> {
        self.fill_pending()?;
        Ok(self.pending.map(|e| e.timestamp))
    }

    fn close(&mut self) -> Result<(), FeedError> {
        if self.reader.take().is_some() {
            debug!(feed = %self.name, counters = ?self.counters, "closed ground truth log");
        }
        self.pending = None;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn counters(&self) -> FeedCounters {
        self.counters
    }
}
