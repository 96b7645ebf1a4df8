//! Resolution policy
//!
//! Turns one frame's prediction set into at most one catalog entry: the
//! single most probable label, if it clears the confidence gate, looked up
//! in the effective catalog mapping.

use crate::catalog::CatalogMapping;
use crate::models::{Label, Prediction, PriceRecord};
use serde::Serialize;

/// Minimum confidence a prediction must exceed to be shown
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.85;

/// Where the record of a detection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Found in the override or default layer
    Catalog,
    /// Synthesized because the label has no catalog entry
    Fallback,
}

/// A label that cleared the gate, with its resolved record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub label: Label,
    pub confidence: f32,
    pub record: PriceRecord,
    pub source: RecordSource,
}

/// The one current result of a resolution tick
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResolvedResult {
    #[default]
    Empty,
    Detected(Detection),
}

impl ResolvedResult {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResolvedResult::Empty)
    }

    pub fn detection(&self) -> Option<&Detection> {
        match self {
            ResolvedResult::Empty => None,
            ResolvedResult::Detected(d) => Some(d),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.detection().map(|d| d.label.as_str())
    }
}

/// Prediction with the strictly greatest probability.
///
/// Ties keep the first one seen. NaN compares false and so never wins.
pub fn top_prediction(predictions: &[Prediction]) -> Option<&Prediction> {
    let mut best: Option<&Prediction> = None;
    for prediction in predictions {
        match best {
            None if !prediction.probability.is_nan() => best = Some(prediction),
            Some(current) if prediction.probability > current.probability => {
                best = Some(prediction)
            }
            _ => {}
        }
    }
    best
}

/// Decide the current result for one prediction set.
///
/// Pure: the same predictions, mapping and threshold always give the same
/// result. A winner exactly at the threshold does not clear the gate.
pub fn resolve(
    predictions: &[Prediction],
    mapping: &CatalogMapping,
    threshold: f32,
) -> ResolvedResult {
    let Some(top) = top_prediction(predictions) else {
        return ResolvedResult::Empty;
    };

    if top.probability <= threshold {
        return ResolvedResult::Empty;
    }

    let (record, source) = match mapping.get(&top.label) {
        Some(record) => (record.clone(), RecordSource::Catalog),
        None => (PriceRecord::unmapped(&top.label), RecordSource::Fallback),
    };

    ResolvedResult::Detected(Detection {
        label: top.label.clone(),
        confidence: top.probability,
        record,
        source,
    })
}
