//! Core data models for the price scanner

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classifier output identifier, the join key between predictions and the catalog
pub type Label = String;

/// One layer of the catalog: label to price record.
///
/// Ordered so that serialized layers are byte-stable for identical content.
pub type PriceTable = BTreeMap<Label, PriceRecord>;

/// A single (label, probability) pair produced by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub probability: f32,
}

impl Prediction {
    pub fn new(label: impl Into<Label>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Catalog entry shown to the user for a detected product
///
/// Replacing a record is always a full overwrite; there is no partial patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    #[serde(alias = "name")]
    pub display_name: String,
    /// Preformatted price, never parsed numerically
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Price shown for a label that cleared the confidence gate but has no catalog entry
pub const UNMAPPED_PRICE: &str = "Not mapped";

/// Category shown for a label that has no catalog entry
pub const UNMAPPED_CATEGORY: &str = "Unknown ID";

impl PriceRecord {
    pub fn new(display_name: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            price: price.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Synthesized record for a classified label missing from both catalog layers
    pub fn unmapped(label: &str) -> Self {
        Self {
            display_name: label.to_string(),
            price: UNMAPPED_PRICE.to_string(),
            category: Some(UNMAPPED_CATEGORY.to_string()),
        }
    }
}
