//! Capability registry of forecast adapters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::forecast::{
    AdapterKind, ArimaAdapter, ForecastAdapter, HoltAdapter, LinearTrendAdapter, ModelSelector,
};

/// Immutable snapshot of the adapters available to a predictor.
///
/// Built once (usually with [`detect`](Self::detect)) and handed to the
/// consumers that need it; nothing is detected at call time.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    adapters: BTreeMap<AdapterKind, Arc<dyn ForecastAdapter>>,
}

impl CapabilityRegistry {
    /// Register every adapter compiled in through cargo features.
    pub fn detect() -> Self {
        let mut builder = Self::builder();
        if cfg!(feature = "arima") {
            builder = builder.with(ArimaAdapter::default());
        }
        if cfg!(feature = "holt") {
            builder = builder.with(HoltAdapter::default());
        }
        if cfg!(feature = "linear-trend") {
            builder = builder.with(LinearTrendAdapter::default());
        }
        let registry = builder.build();
        debug!("Detected forecast adapters: {:?}", registry.kinds());
        registry
    }

    /// A registry with no adapters; only the baseline is usable.
    pub fn baseline_only() -> Self {
        Self::default()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, kind: AdapterKind) -> Option<&Arc<dyn ForecastAdapter>> {
        self.adapters.get(&kind)
    }

    pub fn is_available(&self, kind: AdapterKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    /// Registered adapter kinds in a fixed order.
    pub fn kinds(&self) -> Vec<AdapterKind> {
        self.adapters.keys().copied().collect()
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn ForecastAdapter>> {
        self.adapters.values()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// An ensemble can be built from any non-empty set of adapters.
    pub fn ensemble_available(&self) -> bool {
        !self.adapters.is_empty()
    }

    /// Whether `auto` should resolve to the ensemble: at least two adapters.
    pub fn prefers_ensemble(&self) -> bool {
        self.adapters.len() >= 2
    }

    /// Every selector that can be served, `auto` first.
    pub fn available_models(&self) -> Vec<ModelSelector> {
        let mut models = vec![ModelSelector::Auto, ModelSelector::Baseline];
        models.extend(self.adapters.keys().map(|&k| ModelSelector::Adapter(k)));
        if self.ensemble_available() {
            models.push(ModelSelector::Ensemble);
        }
        models
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("adapters", &self.kinds())
            .finish()
    }
}

/// Builder for [`CapabilityRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    adapters: BTreeMap<AdapterKind, Arc<dyn ForecastAdapter>>,
}

impl RegistryBuilder {
    /// Register an adapter under its own kind, replacing any previous one.
    pub fn with<A: ForecastAdapter + 'static>(mut self, adapter: A) -> Self {
        self.adapters.insert(adapter.kind(), Arc::new(adapter));
        self
    }

    pub fn with_shared(mut self, adapter: Arc<dyn ForecastAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            adapters: self.adapters,
        }
    }
}
