//! Slider line protocol
//!
//! A device report is one text line holding one raw reading per slider,
//! e.g. `100|50|0`. Field order defines the slider index.

pub mod tracker;

use crate::error::MalformedLineError;

pub use tracker::{NoiseReduction, SliderStateTracker, TrackerSettings};

/// Default field delimiter used by the device firmware
pub const DEFAULT_SEPARATOR: &str = "|";

/// One slider crossed the change tolerance since the last report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderMoveEvent {
    pub slider_index: usize,
    pub percent_value: f32,
}

/// A decoded device report: raw readings in slider order
#[derive(Debug, Clone, PartialEq)]
pub struct SliderLine {
    readings: Vec<f32>,
}

impl SliderLine {
    /// Parse a raw line, ignoring the transport's trailing line terminator.
    ///
    /// Every field must be a finite, non-negative number.
    pub fn parse(raw: &str, separator: &str) -> Result<Self, MalformedLineError> {
        let line = strip_line_terminator(raw);
        if line.is_empty() {
            return Err(MalformedLineError::Empty);
        }

        let readings = line
            .split(separator)
            .enumerate()
            .map(|(index, field)| match field.parse::<f32>() {
                Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
                _ => Err(MalformedLineError::InvalidField {
                    index,
                    field: field.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { readings })
    }

    pub fn readings(&self) -> &[f32] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Strip any trailing `\r` / `\n` characters
pub fn strip_line_terminator(raw: &str) -> &str {
    raw.trim_end_matches(['\r', '\n'])
}
