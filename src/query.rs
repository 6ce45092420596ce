//! Weight query: the single read operation exposed to consumers.

use crate::store::LatestReading;
use serde::Serialize;
use thiserror::Error;

/// Unit label attached to every weight response.
pub const UNIT_KG: &str = "kg";

/// Successful `getWeight` response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightResponse {
    pub weight: f64,
    pub unit: &'static str,
}

/// No reading has been decoded since the process started.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("No weight reading available yet")]
pub struct ReadingUnavailable;

/// Body sent alongside non-success statuses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<ReadingUnavailable> for ErrorResponse {
    fn from(err: ReadingUnavailable) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Return the latest weight, or [`ReadingUnavailable`] before the first reading.
pub fn get_weight(store: &LatestReading) -> Result<WeightResponse, ReadingUnavailable> {
    store
        .current()
        .map(|reading| WeightResponse {
            weight: reading.value_kg,
            unit: UNIT_KG,
        })
        .ok_or(ReadingUnavailable)
}
