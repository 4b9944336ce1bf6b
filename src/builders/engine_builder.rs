//! Builders to assemble a catalog, scheduler and I/O supervisor from
//! configuration.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::info;

use crate::config::{BasketConfig, EngineConfig};
use crate::core::{AppResult, BasketCatalog, ExecutionBackend, Scheduler, SchedulerResult};
use crate::infra::IoSupervisor;

/// A fully wired scheduler with its baskets and I/O supervision.
pub struct Engine<B: ExecutionBackend> {
    /// Baskets shared by every component.
    pub catalog: Arc<BasketCatalog>,
    /// Continuous-query scheduler.
    pub scheduler: Scheduler<B>,
    /// Receptors and emitters.
    pub io: IoSupervisor,
}

impl<B: ExecutionBackend> Engine<B> {
    /// Stop the I/O workers, then the scheduler.
    ///
    /// # Errors
    ///
    /// Propagates a scheduler stop timeout.
    pub fn shutdown(&self) -> AppResult<()> {
        self.io.stop_all();
        self.scheduler
            .stop_scheduler()
            .context("failed to stop scheduler")?;
        Ok(())
    }
}

/// Create a catalog holding every configured basket.
///
/// # Errors
///
/// Fails if the configuration is invalid or a basket cannot be registered.
pub fn build_catalog(cfg: &EngineConfig) -> AppResult<Arc<BasketCatalog>> {
    cfg.validate()
        .map_err(|e| anyhow!("config invalid: {e}"))?;
    let catalog = Arc::new(BasketCatalog::with_error_capacity(
        cfg.scheduler.lock_timeout(),
        cfg.scheduler.error_log_capacity,
    ));
    for basket in &cfg.baskets {
        apply_basket(&catalog, basket)
            .with_context(|| format!("failed to create basket `{}`", basket.name))?;
    }
    Ok(catalog)
}

fn apply_basket(catalog: &BasketCatalog, cfg: &BasketConfig) -> SchedulerResult<()> {
    let basket = catalog.register(&cfg.name, cfg.columns.clone())?;
    let name = basket.name();
    catalog.set_threshold(name, cfg.threshold)?;
    catalog.set_beat(name, cfg.beat_ms)?;
    if cfg.window > 0 {
        catalog.set_window(name, cfg.window, cfg.stride)?;
    }
    if cfg.time_slice_ms > 0 {
        catalog.set_time_window(name, cfg.time_slice_ms, cfg.time_stride_ms)?;
    }
    Ok(())
}

/// Build a complete engine. `backend_factory` receives the populated catalog
/// so bodies can be bound to it.
///
/// # Errors
///
/// Fails if the configuration is invalid, a basket cannot be created, the
/// backend factory fails or the scheduler cannot be constructed.
pub fn build_engine<B, F>(cfg: &EngineConfig, backend_factory: F) -> AppResult<Engine<B>>
where
    B: ExecutionBackend,
    F: FnOnce(&Arc<BasketCatalog>) -> SchedulerResult<B>,
{
    let catalog = build_catalog(cfg)?;
    let backend = backend_factory(&catalog).context("failed to create execution backend")?;
    let scheduler = Scheduler::new(cfg.scheduler.clone(), Arc::clone(&catalog), backend)
        .context("failed to create scheduler")?;
    let io = IoSupervisor::new(Arc::clone(&catalog), cfg.io.clone());
    info!(baskets = cfg.baskets.len(), "engine built");
    Ok(Engine {
        catalog,
        scheduler,
        io,
    })
}
