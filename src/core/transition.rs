//! Transitions: registered continuous queries and their basket edges.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::basket::{Basket, BasketCatalog};
use crate::core::{SchedulerError, SchedulerResult};
use crate::util::types::{lookup_keys, qualify_name, BasketId, TransitionId};

/// Lifecycle status of a single transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransitionStatus {
    /// Never scheduled.
    Init,
    /// Registered but not eligible for firing.
    Paused,
    /// Eligible for firing.
    Running,
    /// Removed or stopped.
    Stopped,
    /// Last firing failed; reset to `Running` on the next round.
    Error,
}

impl fmt::Display for TransitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::Paused => "PAUSED",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Qualified name of a transition body in the execution backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Module (schema) the function lives in.
    pub module: String,
    /// Function name.
    pub function: String,
}

impl EntryPoint {
    /// Build an entry point from a module and function name.
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

/// Baskets a transition body reads from and writes to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Input baskets, drained by the body.
    pub sources: Vec<String>,
    /// Output baskets, appended to by the body.
    pub targets: Vec<String>,
}

/// Edge between a transition and one basket.
#[derive(Debug, Clone)]
pub struct PoolRec {
    /// Owning transition.
    pub transition: TransitionId,
    /// Basket identity captured at registration.
    pub basket: BasketId,
    /// Qualified basket name.
    pub basket_name: String,
    /// Rows seen in the basket during the last evaluation.
    pub available: usize,
    /// Row count observed at the last evaluation (sources) or firing (targets).
    pub last_count: usize,
    /// Rows consumed through this edge over its lifetime.
    pub consumed: u64,
    handle: Arc<Basket>,
}

impl PoolRec {
    fn new(transition: TransitionId, handle: Arc<Basket>) -> Self {
        Self {
            transition,
            basket: handle.id(),
            basket_name: handle.name().to_string(),
            available: 0,
            last_count: 0,
            consumed: 0,
            handle,
        }
    }

    /// Basket handle captured at registration.
    #[must_use]
    pub fn basket(&self) -> &Arc<Basket> {
        &self.handle
    }
}

/// A registered continuous query.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Stable identifier.
    pub id: TransitionId,
    /// Qualified transition name.
    pub name: String,
    /// Source text of the query, informational.
    pub definition: String,
    /// Body to invoke on firing.
    pub entry: EntryPoint,
    /// Lifecycle status.
    pub status: TransitionStatus,
    /// Input edges.
    pub sources: Vec<PoolRec>,
    /// Output edges.
    pub targets: Vec<PoolRec>,
    /// Number of firings.
    pub cycles: u64,
    /// Events consumed by successful firings.
    pub events_consumed: u64,
    /// Cumulative body execution time in microseconds.
    pub total_time_micros: u64,
    /// Wall-clock of the last successful firing.
    pub last_seen_ms: Option<u64>,
    /// Message of the last failure, cleared on success.
    pub last_error: Option<String>,
}

/// Ordered set of registered transitions.
#[derive(Debug, Default)]
pub struct TransitionRegistry {
    transitions: Vec<Transition>,
    next_id: u64,
    generation: u64,
}

impl TransitionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every register/remove; firing tables keyed on it go stale.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of registered transitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Whether no transition is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Register a transition in `Paused` state.
    ///
    /// Checks run in order: duplicate name, unknown basket, then a source
    /// basket already consumed by another transition. A failed registration
    /// leaves the registry unchanged.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::DuplicateTransition`
    /// - `SchedulerError::BasketNotFound`
    /// - `SchedulerError::DuplicateBasketConsumption`
    pub fn register(
        &mut self,
        catalog: &BasketCatalog,
        name: &str,
        definition: &str,
        entry: EntryPoint,
        deps: &Dependencies,
    ) -> SchedulerResult<TransitionId> {
        let qualified = qualify_name(name);
        if self.position(name).is_some() {
            return Err(SchedulerError::DuplicateTransition(qualified));
        }

        let sources = resolve_unique(catalog, &deps.sources)?;
        let targets = resolve_unique(catalog, &deps.targets)?;

        for source in &sources {
            if let Some(owner) = self
                .transitions
                .iter()
                .find(|t| t.sources.iter().any(|s| s.basket == source.id()))
            {
                return Err(SchedulerError::DuplicateBasketConsumption {
                    basket: source.name().to_string(),
                    owner: owner.name.clone(),
                });
            }
        }

        self.next_id += 1;
        let id = TransitionId(self.next_id);
        self.transitions.push(Transition {
            id,
            name: qualified,
            definition: definition.to_string(),
            entry,
            status: TransitionStatus::Paused,
            sources: sources.into_iter().map(|b| PoolRec::new(id, b)).collect(),
            targets: targets.into_iter().map(|b| PoolRec::new(id, b)).collect(),
            cycles: 0,
            events_consumed: 0,
            total_time_micros: 0,
            last_seen_ms: None,
            last_error: None,
        });
        self.generation += 1;
        Ok(id)
    }

    /// Remove a transition, returning it.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TransitionNotFound` for unknown names.
    pub fn remove(&mut self, name: &str) -> SchedulerResult<Transition> {
        let idx = self
            .position(name)
            .ok_or_else(|| SchedulerError::TransitionNotFound(name.to_string()))?;
        let mut removed = self.transitions.remove(idx);
        removed.status = TransitionStatus::Stopped;
        self.generation += 1;
        Ok(removed)
    }

    /// Index of a transition by exact or qualified name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        let keys = lookup_keys(name);
        keys.iter()
            .find_map(|k| self.transitions.iter().position(|t| &t.name == k))
    }

    /// Transition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Transition> {
        self.position(name).map(|i| &self.transitions[i])
    }

    /// Transition by id.
    #[must_use]
    pub fn get_by_id(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == id)
    }

    /// Mutable transition by id.
    pub fn get_by_id_mut(&mut self, id: TransitionId) -> Option<&mut Transition> {
        self.transitions.iter_mut().find(|t| t.id == id)
    }

    /// Transitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    /// Mutable transitions in registration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Transition> {
        self.transitions.iter_mut()
    }

    /// Set the status of a named transition, returning the previous status.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::TransitionNotFound` for unknown names.
    pub fn set_status(
        &mut self,
        name: &str,
        status: TransitionStatus,
    ) -> SchedulerResult<TransitionStatus> {
        let idx = self
            .position(name)
            .ok_or_else(|| SchedulerError::TransitionNotFound(name.to_string()))?;
        let t = &mut self.transitions[idx];
        Ok(std::mem::replace(&mut t.status, status))
    }
}

fn resolve_unique(catalog: &BasketCatalog, names: &[String]) -> SchedulerResult<Vec<Arc<Basket>>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let basket = catalog.resolve(name)?;
        if seen.insert(basket.id()) {
            out.push(basket);
        }
    }
    Ok(out)
}
