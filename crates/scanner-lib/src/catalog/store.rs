//! Override store
//!
//! The override layer is an immutable table behind an `Arc` that is swapped
//! wholesale on every edit. Readers clone the `Arc` and never wait on disk
//! I/O; writers are serialized so the full layer reaching storage is always
//! the latest one.

use super::backend::OverrideBackend;
use super::{merge, CatalogMapping};
use crate::error::PersistError;
use crate::models::{Label, PriceRecord, PriceTable};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Storage key used when none is configured
pub const DEFAULT_OVERRIDE_KEY: &str = "price_overrides";

/// Durable user overrides layered over the built-in defaults
pub struct OverrideStore {
    defaults: Arc<PriceTable>,
    overrides: RwLock<Arc<PriceTable>>,
    backend: Box<dyn OverrideBackend>,
    write_lock: Mutex<()>,
}

impl OverrideStore {
    /// Create a store with an empty override layer, without reading storage
    pub fn new(defaults: PriceTable, backend: Box<dyn OverrideBackend>) -> Self {
        Self {
            defaults: Arc::new(defaults),
            overrides: RwLock::new(Arc::new(PriceTable::new())),
            backend,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a store and load the persisted override layer.
    ///
    /// Never fails: unreadable or corrupt storage yields an empty layer.
    pub fn open(defaults: PriceTable, backend: Box<dyn OverrideBackend>) -> Self {
        let store = Self::new(defaults, backend);
        let persisted = store.load_persisted();

        info!(
            location = %store.backend.describe(),
            defaults = store.defaults.len(),
            overrides = persisted.len(),
            "Override store opened"
        );

        *store.overrides.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(persisted);
        store
    }

    /// Read the persisted override layer, recovering to empty on any failure
    pub fn load_persisted(&self) -> PriceTable {
        let contents = match self.backend.read() {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                debug!(location = %self.backend.describe(), "No persisted overrides");
                return PriceTable::new();
            }
            Err(e) => {
                warn!(
                    location = %self.backend.describe(),
                    error = %e,
                    "Failed to read persisted overrides, starting with none"
                );
                return PriceTable::new();
            }
        };

        match serde_json::from_str::<PriceTable>(&contents) {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    location = %self.backend.describe(),
                    error = %e,
                    "Persisted overrides are corrupt, starting with none"
                );
                PriceTable::new()
            }
        }
    }

    /// Snapshot of the effective mapping
    pub fn effective(&self) -> CatalogMapping {
        merge(self.defaults.clone(), self.overrides())
    }

    /// Effective record for one label
    pub fn get_effective(&self, label: &str) -> Option<PriceRecord> {
        self.effective().get(label).cloned()
    }

    pub fn defaults(&self) -> Arc<PriceTable> {
        self.defaults.clone()
    }

    /// Current override layer
    pub fn overrides(&self) -> Arc<PriceTable> {
        self.overrides
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Set the record for a label and persist the full override layer.
    ///
    /// The in-memory layer is updated first and stays updated even when the
    /// write to storage fails.
    pub fn set_override(
        &self,
        label: impl Into<Label>,
        record: PriceRecord,
    ) -> Result<(), PersistError> {
        let label = label.into();
        let _writer = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut next = (*self.overrides()).clone();
        next.insert(label.clone(), record);
        let layer = self.swap_layer(next);

        debug!(label = %label, overrides = layer.len(), "Override applied");
        self.persist(&layer)
    }

    /// Remove a label's override so the default applies again.
    ///
    /// Returns whether an override existed. Same persistence semantics as
    /// [`OverrideStore::set_override`].
    pub fn clear_override(&self, label: &str) -> Result<bool, PersistError> {
        let _writer = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.overrides();
        if !current.contains_key(label) {
            return Ok(false);
        }

        let mut next = (*current).clone();
        next.remove(label);
        let layer = self.swap_layer(next);

        debug!(label = %label, overrides = layer.len(), "Override cleared");
        self.persist(&layer)?;
        Ok(true)
    }

    fn swap_layer(&self, next: PriceTable) -> Arc<PriceTable> {
        let layer = Arc::new(next);
        *self.overrides.write().unwrap_or_else(|e| e.into_inner()) = layer.clone();
        layer
    }

    fn persist(&self, layer: &PriceTable) -> Result<(), PersistError> {
        let json = serde_json::to_string(layer)?;
        self.backend.write(&json).map_err(|e| {
            warn!(
                location = %self.backend.describe(),
                error = %e,
                "Failed to persist overrides, edit kept in memory only"
            );
            PersistError::from(e)
        })
    }
}
