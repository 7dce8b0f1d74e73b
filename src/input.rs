//! JSON-lines input from the pose provider.
//!
//! One record per line:
//!
//! ```text
//! {"kind":"frame","t":0.033,"pose":{"joints":[...],"anchor":{"x":0.4,"y":0.5}}}
//! {"kind":"frame","t":0.066,"pose":null}
//! {"kind":"voice","t":0.100,"action":"temp_up"}
//! ```
//!
//! `t` is seconds from the start of the stream and drives the session clock.

use crate::error::InputError;
use crate::frame::PoseFrame;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputRecord {
    /// A camera frame; `pose` is absent when no hand was detected
    Frame {
        #[serde(default)]
        t: Option<f64>,
        #[serde(default)]
        pose: Option<PoseFrame>,
    },
    /// A recognized voice action
    Voice {
        #[serde(default)]
        t: Option<f64>,
        action: String,
    },
}

impl InputRecord {
    pub fn t(&self) -> Option<f64> {
        match self {
            InputRecord::Frame { t, .. } | InputRecord::Voice { t, .. } => *t,
        }
    }
}

/// Parse one line; blank lines and `#` comments yield `None`
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<InputRecord>, InputError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| InputError::Parse {
            line: line_no,
            details: e.to_string(),
        })
}

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

/// Reads records from a file or stdin, skipping malformed lines
pub struct InputReader {
    name: String,
    lines: Lines<BufReader<BoxedReader>>,
    line_no: usize,
    skipped: u64,
}

impl InputReader {
    /// Open a path, or stdin for `-`
    pub async fn open(source: &str) -> Result<Self, InputError> {
        let reader: BoxedReader = if source == "-" {
            Box::new(tokio::io::stdin())
        } else {
            let file = tokio::fs::File::open(source)
                .await
                .map_err(|e| InputError::Open {
                    path: source.to_string(),
                    details: e.to_string(),
                })?;
            Box::new(file)
        };

        debug!("Reading input from {}", if source == "-" { "stdin" } else { source });
        Ok(Self::from_reader(source, reader))
    }

    pub fn from_reader(name: &str, reader: BoxedReader) -> Self {
        Self {
            name: name.to_string(),
            lines: BufReader::new(reader).lines(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Next well-formed record, `None` at end of input
    pub async fn next_record(&mut self) -> Result<Option<InputRecord>, InputError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| InputError::Open {
                    path: self.name.clone(),
                    details: e.to_string(),
                })?;

            let Some(line) = line else {
                return Ok(None);
            };
            self.line_no += 1;

            match parse_line(&line, self.line_no) {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => continue,
                Err(e) => {
                    self.skipped += 1;
                    warn!("Skipping input: {}", e);
                }
            }
        }
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn line_count(&self) -> usize {
        self.line_no
    }
}

/// Maps record timestamps onto the session clock
///
/// Timestamped records land at `origin + t`; untimestamped ones at the wall
/// clock. Timestamps that cannot be placed (negative, NaN, past the end of
/// `Instant`) reuse the last instant. The result never goes backwards. In realtime mode the clock waits
/// until a timestamped record is due.
pub struct ReplayClock {
    origin: Instant,
    realtime: bool,
    last: Instant,
}

impl ReplayClock {
    pub fn new(origin: Instant, realtime: bool) -> Self {
        Self {
            origin,
            realtime,
            last: origin,
        }
    }

    pub async fn instant_for(&mut self, t: Option<f64>) -> Instant {
        let due = match t {
            Some(t) => {
                let due = Duration::try_from_secs_f64(t)
                    .ok()
                    .and_then(|offset| self.origin.checked_add(offset));
                if due.is_none() {
                    warn!("Timestamp {} is out of range, keeping the session clock", t);
                }
                due
            }
            None => None,
        };

        let at = match (t, due) {
            (_, Some(due)) => due,
            (Some(_), None) => self.last,
            (None, None) => Instant::now(),
        }
        .max(self.last);

        if self.realtime && due.is_some() {
            tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
        }

        self.last = at;
        at
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// The most recent instant handed out
    pub fn last(&self) -> Instant {
        self.last
    }
}
