//! Line-oriented parser for the ZED sensor text dump.
//!
//! The upstream tool prints blocks of the form:
//!
//! ```text
//! IMU:
//!   Orientation (Ox, Oy, Oz, Ow): [0.0012, -0.0034, 0.0001, 0.9999]
//!   Acceleration [m/s^2]: [0.0150, -0.0420, 9.8100]
//!   Angular velocity [deg/s]: [0.1200, 0.0800, -0.0300]
//! ```
//!
//! interleaved with arbitrary other output. The parser is fed one line at a
//! time and emits a complete [`ImuSample`] when the angular-velocity line
//! closes a block. A malformed field rejects the whole block; nothing
//! partial ever reaches the processor.

use thiserror::Error;

use crate::quat::Quaternion;
use crate::types::{ImuSample, Vec3};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no bracketed vector in line")]
    MissingBrackets,
    #[error("expected {expected} components, got {got}")]
    WrongComponentCount { expected: usize, got: usize },
    #[error("non-numeric component: {0:?}")]
    BadNumber(String),
    #[error("non-finite component")]
    NonFinite,
    #[error("field out of block order: {0}")]
    OutOfOrder(&'static str),
}

/// Streaming block assembler. One per input stream.
pub struct ImuBlockParser {
    orientation: Option<Quaternion>,
    acceleration: Option<Vec3>,
    samples_emitted: u64,
    blocks_rejected: u64,
}

impl ImuBlockParser {
    pub fn new() -> Self {
        Self {
            orientation: None,
            acceleration: None,
            samples_emitted: 0,
            blocks_rejected: 0,
        }
    }

    pub fn samples_emitted(&self) -> u64 {
        self.samples_emitted
    }

    pub fn blocks_rejected(&self) -> u64 {
        self.blocks_rejected
    }

    /// Feed one line. `arrival_ts` stamps the sample when the block closes.
    ///
    /// Lines that belong to no IMU block are skipped silently (the dump is
    /// full of unrelated output). A malformed IMU field discards the pending
    /// block and reports why.
    pub fn push_line(
        &mut self,
        line: &str,
        arrival_ts: f64,
    ) -> Result<Option<ImuSample>, ParseError> {
        let trimmed = line.trim();

        if trimmed.contains("Orientation") {
            // A new orientation line always opens a fresh block; a dangling
            // half-parsed block from before is dropped.
            self.orientation = None;
            self.acceleration = None;
            let v = self.parse_field(trimmed, 4)?;
            self.orientation = Some(Quaternion::new(v[0], v[1], v[2], v[3]));
            return Ok(None);
        }

        if trimmed.contains("Acceleration") {
            if self.orientation.is_none() {
                self.blocks_rejected += 1;
                return Err(ParseError::OutOfOrder("acceleration before orientation"));
            }
            let v = self.parse_field(trimmed, 3)?;
            self.acceleration = Some(Vec3::new(v[0], v[1], v[2]));
            return Ok(None);
        }

        if trimmed.contains("Angular velocity") {
            let (Some(quaternion), Some(acceleration)) = (self.orientation, self.acceleration)
            else {
                self.reset();
                self.blocks_rejected += 1;
                return Err(ParseError::OutOfOrder("angular velocity before full block"));
            };
            let v = self.parse_field(trimmed, 3)?;
            self.reset();
            self.samples_emitted += 1;
            return Ok(Some(ImuSample {
                timestamp: arrival_ts,
                quaternion,
                acceleration,
                gyro: Vec3::new(v[0], v[1], v[2]),
            }));
        }

        Ok(None)
    }

    fn reset(&mut self) {
        self.orientation = None;
        self.acceleration = None;
    }

    /// Parse the `[a, b, c]` tail of a field line, rejecting the pending
    /// block on any failure.
    fn parse_field(&mut self, line: &str, expected: usize) -> Result<Vec<f64>, ParseError> {
        match parse_bracketed(line, expected) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.reset();
                self.blocks_rejected += 1;
                Err(e)
            }
        }
    }
}

impl Default for ImuBlockParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bracketed(line: &str, expected: usize) -> Result<Vec<f64>, ParseError> {
    let start = line.rfind('[').ok_or(ParseError::MissingBrackets)?;
    let end = line[start..]
        .find(']')
        .map(|i| start + i)
        .ok_or(ParseError::MissingBrackets)?;

    let inner = &line[start + 1..end];
    let mut values = Vec::with_capacity(expected);
    for part in inner.split(',') {
        let text = part.trim();
        let value: f64 = text
            .parse()
            .map_err(|_| ParseError::BadNumber(text.to_string()))?;
        if !value.is_finite() {
            return Err(ParseError::NonFinite);
        }
        values.push(value);
    }

    if values.len() != expected {
        return Err(ParseError::WrongComponentCount { expected, got: values.len() });
    }
    Ok(values)
}
