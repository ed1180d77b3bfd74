use std::io::{BufRead, Split};

use serde::Serialize;

use super::Frame;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Counters for the rows and groups the reader had to throw away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseStats {
    pub lines_read: usize,
    pub accepted_rows: usize,
    /// Rows whose field count differed from the grid width.
    pub rejected_rows: usize,
    /// Fields that were not numbers and were read as 0.
    pub defaulted_fields: usize,
    /// Groups that ended with fewer than `width * width` cells.
    pub dropped_groups: usize,
    pub frames: usize,
}

/// Lazy frame sequence over a line source.
///
/// Lines are consumed in consecutive groups of `width`. A line whose field
/// count is not `width` is skipped but still counts toward its group, so a
/// group containing any rejected line cannot fill a frame and is dropped.
/// Non-numeric fields read as 0. The reader consumes its source and cannot be
/// restarted.
pub struct FrameReader<R> {
    lines: Split<R>,
    width: usize,
    capacity: usize,
    delimiter: char,
    stats: ParseStats,
    exhausted: bool,
}

impl<R: BufRead> FrameReader<R> {
    /// A zero width, or one whose square overflows `usize`, yields no frames.
    pub fn new(source: R, width: usize, delimiter: char) -> Self {
        let capacity = width.checked_mul(width).unwrap_or(0);
        Self {
            lines: source.split(b'\n'),
            width,
            capacity,
            delimiter,
            stats: ParseStats::default(),
            exhausted: capacity == 0,
        }
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Drains the reader, returning every frame plus the final counters.
    pub fn read_all(mut self) -> (Vec<Frame>, ParseStats) {
        let frames: Vec<Frame> = self.by_ref().collect();
        (frames, self.stats)
    }

    fn next_line(&mut self) -> Option<String> {
        match self.lines.next()? {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) => {
                log_warn!(
                    "stopping frame read after {} lines: {err}",
                    self.stats.lines_read
                );
                self.exhausted = true;
                None
            }
        }
    }

    fn parse_row(&mut self, line: &str) -> Option<Vec<f64>> {
        let fields: Vec<&str> = line.split(self.delimiter).collect();
        if fields.len() != self.width {
            return None;
        }

        let row = fields
            .iter()
            .map(|field| match field.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => value,
                _ => {
                    self.stats.defaulted_fields += 1;
                    0.0
                }
            })
            .collect();
        Some(row)
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let capacity = self.capacity;

        // Grown per accepted row, never reserved for the whole grid.
        while !self.exhausted {
            let mut cells = Vec::new();
            let mut consumed = 0;

            while consumed < self.width {
                let Some(line) = self.next_line() else {
                    self.exhausted = true;
                    break;
                };
                consumed += 1;
                self.stats.lines_read += 1;

                match self.parse_row(&line) {
                    Some(row) => {
                        self.stats.accepted_rows += 1;
                        cells.extend(row);
                    }
                    None => self.stats.rejected_rows += 1,
                }
            }

            if consumed == 0 {
                break;
            }

            if cells.len() == capacity {
                if let Ok(frame) = Frame::from_values(self.width, cells) {
                    self.stats.frames += 1;
                    return Some(frame);
                }
            }
            self.stats.dropped_groups += 1;
        }

        None
    }
}
