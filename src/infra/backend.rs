//! In-process execution backend mapping entry points to closures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::core::basket::BasketCatalog;
use crate::core::executor::{ExecutionBackend, ExecutionError};
use crate::core::transition::{Dependencies, EntryPoint};
use crate::core::{SchedulerError, SchedulerResult};

/// Transition body: runs against the catalog and drains/fills baskets itself.
pub type BodyFn = dyn Fn(&BasketCatalog) -> Result<(), ExecutionError> + Send + Sync;

/// Rollback hook invoked after a failed body.
pub type AbortFn = dyn Fn(&BasketCatalog, &EntryPoint) + Send + Sync;

struct Function {
    deps: Dependencies,
    body: Arc<BodyFn>,
}

/// Execution backend for bodies written as Rust closures.
pub struct FunctionBackend {
    catalog: Arc<BasketCatalog>,
    functions: RwLock<HashMap<EntryPoint, Function>>,
    abort: Option<Arc<AbortFn>>,
    aborts: AtomicU64,
}

impl FunctionBackend {
    /// Create a backend whose bodies operate on `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<BasketCatalog>) -> Self {
        Self {
            catalog,
            functions: RwLock::new(HashMap::new()),
            abort: None,
            aborts: AtomicU64::new(0),
        }
    }

    /// Install a rollback hook; failed firings call it.
    #[must_use]
    pub fn with_abort(
        mut self,
        hook: impl Fn(&BasketCatalog, &EntryPoint) + Send + Sync + 'static,
    ) -> Self {
        self.abort = Some(Arc::new(hook));
        self
    }

    /// Define (or redefine) a body with its declared baskets.
    pub fn define(
        &self,
        entry: EntryPoint,
        deps: Dependencies,
        body: impl Fn(&BasketCatalog) -> Result<(), ExecutionError> + Send + Sync + 'static,
    ) {
        debug!(entry = %entry, sources = deps.sources.len(), targets = deps.targets.len(), "function defined");
        self.functions.write().insert(
            entry,
            Function {
                deps,
                body: Arc::new(body),
            },
        );
    }

    /// Define a body that drains every source and appends the rows to
    /// `target` (when given).
    pub fn define_forward(&self, entry: EntryPoint, sources: &[&str], target: Option<&str>) {
        let source_names: Vec<String> = sources.iter().map(ToString::to_string).collect();
        let target_name = target.map(ToString::to_string);
        let deps = Dependencies {
            sources: source_names.clone(),
            targets: target_name.iter().cloned().collect(),
        };
        self.define(entry, deps, move |catalog| {
            for source in &source_names {
                let batch = catalog
                    .swap(source)
                    .map_err(|e| ExecutionError::Failed(e.to_string()))?;
                if let Some(target) = &target_name {
                    catalog
                        .append_rows(target, batch.rows())
                        .map_err(|e| ExecutionError::Failed(e.to_string()))?;
                }
            }
            Ok(())
        });
    }

    /// Forget a body.
    pub fn undefine(&self, entry: &EntryPoint) -> bool {
        self.functions.write().remove(entry).is_some()
    }

    /// Number of abort hook invocations.
    #[must_use]
    pub fn aborts(&self) -> u64 {
        self.aborts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExecutionBackend for FunctionBackend {
    fn dependencies(&self, entry: &EntryPoint) -> SchedulerResult<Dependencies> {
        self.functions
            .read()
            .get(entry)
            .map(|f| f.deps.clone())
            .ok_or_else(|| SchedulerError::FunctionNotFound(entry.to_string()))
    }

    async fn invoke(&self, entry: &EntryPoint) -> Result<(), ExecutionError> {
        let body = self.functions.read().get(entry).map(|f| Arc::clone(&f.body));
        match body {
            Some(body) => body(&self.catalog),
            None => Err(ExecutionError::Failed(format!("function not found: {entry}"))),
        }
    }

    async fn abort(&self, entry: &EntryPoint) -> Result<(), ExecutionError> {
        if let Some(hook) = &self.abort {
            hook(&self.catalog, entry);
            self.aborts.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn supports_abort(&self) -> bool {
        self.abort.is_some()
    }
}
