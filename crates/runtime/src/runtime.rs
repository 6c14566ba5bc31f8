//! Runtime assembly.
//!
//! [`SheetRuntime`] wires a store, the mutation guard, the derivation
//! pipeline and the coordinator together and owns the shared event bus and
//! metrics. Use [`RuntimeBuilder`] to assemble one.

use std::env;
use std::sync::Arc;

use sheet_core::{
    Derivation, DerivationPipeline, EntityId, ModifierAggregator, ResolverConfig, SourceProvider,
};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::coordinator::{BusyPolicy, HydrationReport, MutationCoordinator};
use crate::events::{Event, EventBus, Topic};
use crate::guard::{AuditLog, GuardMode, GuardedStore, MutationGuard};
use crate::metrics::MutationMetrics;
use crate::store::{EntityStore, InMemoryEntityStore, StoreError};

/// Runtime configuration shared by the guard, coordinator and resolver.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub guard_mode: GuardMode,
    pub audit_capacity: usize,
    pub busy_policy: BusyPolicy,
    pub event_buffer_size: usize,
    pub resolver: ResolverConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            guard_mode: GuardMode::default(),
            audit_capacity: AuditLog::DEFAULT_CAPACITY,
            busy_policy: BusyPolicy::default(),
            event_buffer_size: EventBus::DEFAULT_CAPACITY,
            resolver: ResolverConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Construct configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SHEET_GUARD_MODE` - `permissive` or `strict` (default: permissive)
    /// - `SHEET_AUDIT_CAPACITY` - Audit ring size (default: 1024)
    /// - `SHEET_BUSY_POLICY` - `queue` or `reject` (default: queue)
    /// - `SHEET_EVENT_BUFFER` - Per-topic event buffer (default: 100)
    /// - `SHEET_CONTRIBUTION_WARN` - Contribution count warning threshold (default: 256)
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = env::var("SHEET_GUARD_MODE") {
            match GuardMode::parse(&raw) {
                Some(mode) => config.guard_mode = mode,
                None => tracing::warn!(value = %raw, "ignoring unknown SHEET_GUARD_MODE"),
            }
        }
        if let Ok(raw) = env::var("SHEET_BUSY_POLICY") {
            match BusyPolicy::parse(&raw) {
                Some(policy) => config.busy_policy = policy,
                None => tracing::warn!(value = %raw, "ignoring unknown SHEET_BUSY_POLICY"),
            }
        }
        if let Some(capacity) = read_env::<usize>("SHEET_AUDIT_CAPACITY") {
            config.audit_capacity = capacity.max(1);
        }
        if let Some(buffer) = read_env::<usize>("SHEET_EVENT_BUFFER") {
            config.event_buffer_size = buffer.max(1);
        }
        if let Some(threshold) = read_env::<usize>("SHEET_CONTRIBUTION_WARN") {
            config.resolver.contribution_warn_threshold = threshold;
        }

        config
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = env::var(key).ok()?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
    }
    parsed
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("a custom derivation and modifier providers cannot be combined")]
    ConflictingDerivation,
}

/// Assembled character-sheet runtime.
pub struct SheetRuntime {
    config: RuntimeConfig,
    coordinator: Arc<MutationCoordinator>,
    guard: Arc<MutationGuard>,
    store: GuardedStore,
    events: EventBus,
    metrics: Arc<MutationMetrics>,
}

impl SheetRuntime {
    /// Create a new runtime builder
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Shared coordinator; clone the `Arc` to apply plans from other tasks.
    pub fn coordinator(&self) -> &Arc<MutationCoordinator> {
        &self.coordinator
    }

    pub fn guard(&self) -> &Arc<MutationGuard> {
        &self.guard
    }

    /// Guarded handle to the runtime's storage. Writes through it that are
    /// not part of a coordinated apply are audited as violations.
    pub fn store(&self) -> &GuardedStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<MutationMetrics> {
        &self.metrics
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.events.subscribe(topic)
    }

    /// Recomputes derived state for every stored entity.
    pub async fn hydrate(&self) -> Result<HydrationReport> {
        Ok(self.coordinator.hydrate().await?)
    }

    pub async fn entity(&self, id: EntityId) -> Result<Option<sheet_core::Entity>> {
        Ok(self.coordinator.read(id).await?)
    }
}

impl std::fmt::Debug for SheetRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetRuntime")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

/// Builder for [`SheetRuntime`] with flexible configuration.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    store: Option<Arc<dyn EntityStore>>,
    providers: Vec<Arc<dyn SourceProvider>>,
    derivation: Option<Arc<dyn Derivation>>,
    hydrate: bool,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            store: None,
            providers: Vec::new(),
            derivation: None,
            hydrate: false,
        }
    }

    /// Override runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Entity store to run against (default: empty in-memory store).
    ///
    /// The runtime takes ownership; use [`SheetRuntime::store`] afterwards.
    pub fn store(mut self, store: impl EntityStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Register a provider of external modifiers (buffs, auras, ...).
    pub fn provider(mut self, provider: Arc<dyn SourceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replace the default aggregator + resolver pipeline.
    pub fn derivation(mut self, derivation: Arc<dyn Derivation>) -> Self {
        self.derivation = Some(derivation);
        self
    }

    /// Recompute every stored entity's derived state during `build`.
    pub fn hydrate_on_build(mut self, enable: bool) -> Self {
        self.hydrate = enable;
        self
    }

    /// Build the runtime
    pub async fn build(self) -> Result<SheetRuntime> {
        let derivation: Arc<dyn Derivation> = match self.derivation {
            Some(_) if !self.providers.is_empty() => {
                return Err(RuntimeError::ConflictingDerivation);
            }
            Some(derivation) => derivation,
            None => {
                let aggregator = self
                    .providers
                    .into_iter()
                    .fold(ModifierAggregator::new(), |aggregator, provider| {
                        aggregator.with_provider(provider)
                    });
                Arc::new(DerivationPipeline::new(aggregator, self.config.resolver))
            }
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryEntityStore::new()));
        let events = EventBus::with_capacity(self.config.event_buffer_size);
        let metrics = Arc::new(MutationMetrics::new());

        let guard = Arc::new(MutationGuard::new(
            store,
            self.config.guard_mode,
            self.config.audit_capacity,
            events.clone(),
            Arc::clone(&metrics),
        ));
        let coordinator = Arc::new(MutationCoordinator::new(
            Arc::clone(&guard),
            derivation,
            self.config.busy_policy,
            events.clone(),
            Arc::clone(&metrics),
        ));

        tracing::info!(
            guard_mode = %self.config.guard_mode,
            busy_policy = %self.config.busy_policy,
            audit_capacity = self.config.audit_capacity,
            "sheet runtime assembled"
        );

        let runtime = SheetRuntime {
            config: self.config,
            coordinator,
            store: GuardedStore::new(Arc::clone(&guard)),
            guard,
            events,
            metrics,
        };

        if self.hydrate {
            runtime.hydrate().await?;
        }
        Ok(runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RuntimeConfig::default();
        assert_eq!(config.guard_mode, GuardMode::Permissive);
        assert_eq!(config.busy_policy, BusyPolicy::Queue);
        assert_eq!(config.audit_capacity, 1024);
        assert_eq!(config.resolver.contribution_warn_threshold, 256);
    }

    #[tokio::test]
    async fn builder_rejects_providers_with_custom_derivation() {
        struct Nothing;
        impl Derivation for Nothing {
            fn derive(
                &self,
                _entity: &sheet_core::Entity,
            ) -> std::result::Result<sheet_core::Resolution, sheet_core::DerivationError> {
                Ok(sheet_core::Resolution::default())
            }
        }
        struct NoSources;
        impl SourceProvider for NoSources {
            fn sources_for(&self, _entity: &sheet_core::Entity) -> Vec<sheet_core::ExternalSource> {
                Vec::new()
            }
        }

        let result = SheetRuntime::builder()
            .derivation(Arc::new(Nothing))
            .provider(Arc::new(NoSources))
            .build()
            .await;
        assert!(matches!(result, Err(RuntimeError::ConflictingDerivation)));
    }
}
