//! Lazily populated cache of loaded models
//!
//! The registry is an ordinary value: construct one per service (or per
//! test), share it by reference, and drop it, or call
//! [`ModelRegistry::unload_all`], to release every graph.
//!
//! Each identifier owns a once-cell. Concurrent first requests for the same
//! identifier block on that cell, so the artifact is read exactly once and
//! every caller receives the same `Arc`. Requests for different identifiers
//! load in parallel.

use crate::adapter::{device_name, AdapterInfo, ModelAdapter, ModelArtifactDescriptor};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::types::ModelId;
use candle_core::Device;
use log::info;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

type Slot = Arc<OnceLock<Arc<ModelAdapter>>>;

/// Shared, lazily loaded model cache
#[derive(Debug)]
pub struct ModelRegistry {
    models_dir: PathBuf,
    device: Device,
    slots: Mutex<HashMap<ModelId, Slot>>,
    loads: AtomicUsize,
}

impl ModelRegistry {
    /// Creates an empty registry reading artifacts from `models_dir`
    pub fn new(models_dir: impl Into<PathBuf>, device: Device) -> Self {
        Self {
            models_dir: models_dir.into(),
            device,
            slots: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Creates a registry from service configuration
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Ok(Self::new(&config.models_dir, config.resolve_device()?))
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Artifact descriptor for `id` under this registry's models directory
    pub fn descriptor(&self, id: ModelId) -> ModelArtifactDescriptor {
        ModelArtifactDescriptor::resolve(id, &self.models_dir)
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ModelId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the model for `id`, loading it on first use
    ///
    /// Never fails because of a bad artifact: the returned adapter may be
    /// running its stand-in graph (see [`ModelAdapter::status`]).
    pub fn get(&self, id: ModelId) -> Result<Arc<ModelAdapter>> {
        let slot = self.slot(id);
        self.fill(id, &slot)
    }

    fn slot(&self, id: ModelId) -> Slot {
        self.slots().entry(id).or_default().clone()
    }

    /// Loads into `slot` and keeps it registered under `id`
    ///
    /// An `unload` between taking the slot and filling it leaves the slot
    /// detached; it is put back unless a newer slot already took its place.
    fn fill(&self, id: ModelId, slot: &Slot) -> Result<Arc<ModelAdapter>> {
        if let Some(model) = slot.get() {
            return Ok(model.clone());
        }
        // Build the adapter outside the once-cell so construction errors propagate
        let adapter = ModelAdapter::new(self.descriptor(id), self.device.clone())?;
        let model = slot
            .get_or_init(|| {
                self.loads.fetch_add(1, Ordering::SeqCst);
                let mut adapter = adapter;
                adapter.load();
                Arc::new(adapter)
            })
            .clone();
        self.slots().entry(id).or_insert_with(|| slot.clone());
        Ok(model)
    }

    /// Parses `name` and returns its model
    pub fn get_by_name(&self, name: &str) -> Result<Arc<ModelAdapter>> {
        self.get(name.parse()?)
    }

    /// Whether `id` is currently loaded
    pub fn is_loaded(&self, id: ModelId) -> bool {
        self.slots()
            .get(&id)
            .map(|slot| slot.get().is_some())
            .unwrap_or(false)
    }

    /// Evicts one model; outstanding `Arc`s stay valid
    pub fn unload(&self, id: ModelId) -> bool {
        let removed = self.slots().remove(&id).is_some();
        if removed {
            info!("Unloaded model {}", id);
        }
        removed
    }

    /// Evicts every model
    pub fn unload_all(&self) {
        let mut slots = self.slots();
        let count = slots.len();
        slots.clear();
        info!("Unloaded all models ({})", count);
    }

    /// Status of every loaded model, keyed by identifier
    pub fn describe_loaded(&self) -> BTreeMap<String, AdapterInfo> {
        self.slots()
            .iter()
            .filter_map(|(id, slot)| slot.get().map(|model| (id.to_string(), model.info())))
            .collect()
    }

    /// Number of artifact loads performed so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Short name of the configured device
    pub fn device_name(&self) -> String {
        device_name(&self.device)
    }
}
