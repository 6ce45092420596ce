//! Weight reading data structure.

use std::time::SystemTime;

/// A weight reading decoded from one scale frame.
///
/// Readings are immutable once built. The decoder only ever produces
/// finite, non-negative values since the weight field is digits only.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Weight in kilograms
    pub value_kg: f64,
    /// Timestamp when the frame was decoded
    pub observed_at: SystemTime,
    /// Digits following the weight field, kept verbatim and never interpreted
    pub trailer: String,
}

impl Reading {
    pub fn new(value_kg: f64, observed_at: SystemTime, trailer: impl Into<String>) -> Self {
        Self {
            value_kg,
            observed_at,
            trailer: trailer.into(),
        }
    }
}
