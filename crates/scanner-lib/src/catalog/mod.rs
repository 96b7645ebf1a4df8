//! Price catalog: built-in defaults layered under user overrides
//!
//! This module provides:
//! - The immutable default layer shipped with the build
//! - The pure merge of defaults and overrides into an effective mapping
//! - A durable override store with fail-soft startup loading

mod backend;
pub mod defaults;
mod store;


pub use backend::{FileBackend, MemoryBackend, OverrideBackend};
pub use defaults::default_catalog;
pub use store::{OverrideStore, DEFAULT_OVERRIDE_KEY};

use crate::models::{PriceRecord, PriceTable};
use serde::Serialize;
use std::sync::Arc;

/// Which catalog layer an effective record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Default,
    Override,
}

/// Effective mapping: overrides merged over defaults, override wins per key
///
/// Holds both layers by reference and answers lookups on demand, so the
/// effective record is always computed from the current pair of layers.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMapping {
    defaults: Arc<PriceTable>,
    overrides: Arc<PriceTable>,
}

/// Merge an override layer over a default layer
pub fn merge(defaults: Arc<PriceTable>, overrides: Arc<PriceTable>) -> CatalogMapping {
    CatalogMapping {
        defaults,
        overrides,
    }
}

impl CatalogMapping {
    /// Effective record for a label, if either layer has one
    pub fn get(&self, label: &str) -> Option<&PriceRecord> {
        self.overrides
            .get(label)
            .or_else(|| self.defaults.get(label))
    }

    /// Effective record together with the layer that supplied it
    pub fn get_with_layer(&self, label: &str) -> Option<(&PriceRecord, Layer)> {
        if let Some(record) = self.overrides.get(label) {
            return Some((record, Layer::Override));
        }
        self.defaults.get(label).map(|r| (r, Layer::Default))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn defaults(&self) -> &PriceTable {
        &self.defaults
    }

    pub fn overrides(&self) -> &PriceTable {
        &self.overrides
    }

    /// Flatten into a single table
    pub fn to_table(&self) -> PriceTable {
        let mut table = (*self.defaults).clone();
        table.extend(
            self.overrides
                .iter()
                .map(|(label, record)| (label.clone(), record.clone())),
        );
        table
    }
}
