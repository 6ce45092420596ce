//! Scale frame decoder.
//!
//! Turns one delimiter-stripped frame into a [`Reading`]. Decoding is pure:
//! no I/O and no state beyond the compiled protocol pattern.

use crate::framing::RawFrame;
use crate::protocol::{FrameProtocol, ProtocolError, WeightLimits};
use crate::reading::Reading;
use regex::Regex;
use std::time::SystemTime;
use thiserror::Error;

/// Error types for decoding scale frames.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Frame text does not have the configured prefix/digit layout
    #[error("Pattern mismatch: {0:?}")]
    PatternMismatch(String),
    /// Captured weight digits could not be parsed as a number
    #[error("Numeric parse failure: {0:?}")]
    NumericParseFailure(String),
    /// Weight decoded fine but falls outside the configured limits
    #[error("Weight {0} kg outside configured limits")]
    OutOfRange(f64),
}

/// Convenience alias for decoded readings or decode errors.
pub type ReadingResult = Result<Reading, DecodeError>;

/// Decoder for one configured frame protocol.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    pattern: Regex,
    limits: WeightLimits,
}

impl FrameDecoder {
    /// Compile a decoder for `protocol` with no weight limits.
    pub fn new(protocol: &FrameProtocol) -> Result<Self, ProtocolError> {
        Self::with_limits(protocol, WeightLimits::default())
    }

    pub fn with_limits(
        protocol: &FrameProtocol,
        limits: WeightLimits,
    ) -> Result<Self, ProtocolError> {
        let pattern =
            Regex::new(&protocol.pattern()?).map_err(|e| ProtocolError::Pattern(e.to_string()))?;
        Ok(Self { pattern, limits })
    }

    /// Decode a frame, stamping the reading with the current time.
    pub fn decode(&self, frame: &RawFrame) -> ReadingResult {
        self.decode_at(frame, SystemTime::now())
    }

    /// Decode a frame observed at `observed_at`.
    pub fn decode_at(&self, frame: &RawFrame, observed_at: SystemTime) -> ReadingResult {
        let text = String::from_utf8_lossy(&frame.bytes);

        let captures = self
            .pattern
            .captures(&text)
            .ok_or_else(|| DecodeError::PatternMismatch(text.to_string()))?;

        let weight = &captures[1];
        let trailer = &captures[2];
        let value_kg = weight_from_digits(weight)?;

        if !self.limits.contains(value_kg) {
            return Err(DecodeError::OutOfRange(value_kg));
        }

        Ok(Reading::new(value_kg, observed_at, trailer))
    }
}

/// Convert a weight-digit run into kilograms.
///
/// The last digit is the single decimal; the rest form the integer part with
/// leading zeros stripped ("000139" -> "13.9", "000000" -> "0.0").
pub fn weight_from_digits(digits: &str) -> Result<f64, DecodeError> {
    let split = match digits.len().checked_sub(1) {
        Some(split) if digits.is_ascii() => split,
        _ => return Err(DecodeError::NumericParseFailure(digits.to_string())),
    };
    let (integer, fraction) = digits.split_at(split);

    let integer = match integer.trim_start_matches('0') {
        "" => "0",
        stripped => stripped,
    };

    let value: f64 = format!("{integer}.{fraction}")
        .parse()
        .map_err(|_| DecodeError::NumericParseFailure(digits.to_string()))?;

    if value.is_finite() {
        Ok(value)
    } else {
        Err(DecodeError::NumericParseFailure(digits.to_string()))
    }
}
