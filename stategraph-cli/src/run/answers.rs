//! Answers to suspensions: queued `--answer` values first, then lines from a reader.

use std::collections::VecDeque;
use std::io::BufRead;

use serde_json::Value;
use stategraph::Delta;

use crate::config::Error;

/// Parses one answer; it must be a JSON object.
pub fn parse_answer(raw: &str) -> Result<Delta, Error> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| format!("answer is not JSON: {}", e))?;
    Delta::from_value(value).ok_or_else(|| format!("answer must be a JSON object: {}", raw).into())
}

/// Source of resume inputs for the driver.
pub struct Answers<R> {
    queued: VecDeque<Delta>,
    reader: Option<R>,
}

impl<R: BufRead> Answers<R> {
    /// `queued` are consumed first; `reader` (usually stdin) supplies the rest.
    pub fn new(queued: Vec<Delta>, reader: Option<R>) -> Self {
        Self {
            queued: queued.into(),
            reader,
        }
    }

    /// Parses each raw `--answer` value.
    pub fn from_args(raw: &[String], reader: Option<R>) -> Result<Self, Error> {
        let queued = raw
            .iter()
            .map(|a| parse_answer(a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(queued, reader))
    }

    /// Next answer, or `None` when both sources are exhausted.
    ///
    /// Blank lines are skipped; a line that is not a JSON object is an error.
    pub fn next_answer(&mut self) -> Result<Option<Delta>, Error> {
        if let Some(answer) = self.queued.pop_front() {
            return Ok(Some(answer));
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if !line.trim().is_empty() {
                return parse_answer(&line).map(Some);
            }
        }
    }
}
