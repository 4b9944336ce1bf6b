//! Control surface: serializable requests dispatched against a scheduler.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{
    BasketSnapshot, Dump, EntryPoint, ExecutionBackend, Scheduler, SchedulerResult,
    SchedulerStatus,
};
use crate::util::types::TransitionId;

/// Administrative request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Register a transition.
    Register {
        /// Transition name.
        name: String,
        /// Body module.
        module: String,
        /// Body function.
        function: String,
        /// Query text.
        #[serde(default)]
        definition: String,
    },
    /// Remove a transition (scheduler must be paused).
    Remove {
        /// Transition name.
        name: String,
    },
    /// Pause the scheduler.
    PauseScheduler,
    /// Resume the scheduler.
    ResumeScheduler,
    /// Stop the scheduler.
    StopScheduler,
    /// Pause one transition.
    PauseTransition {
        /// Transition name.
        name: String,
    },
    /// Resume one transition.
    ResumeTransition {
        /// Transition name.
        name: String,
    },
    /// Pause every running transition.
    PauseAll,
    /// Resume every paused transition.
    ResumeAll,
    /// Inspect transitions and edges.
    Dump,
    /// Inspect baskets.
    Baskets,
    /// Liveness summary.
    Health,
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Global scheduler status.
    pub status: SchedulerStatus,
    /// Registered transitions.
    pub transitions: usize,
    /// Rounds executed.
    pub rounds: u64,
}

/// Response to a [`ControlRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlResponse {
    /// Request applied.
    Ok,
    /// Transition registered.
    Registered {
        /// Assigned id.
        id: TransitionId,
    },
    /// Bulk change applied.
    Changed {
        /// Number of transitions affected.
        count: usize,
    },
    /// Scheduler snapshot.
    Dump(Dump),
    /// Basket snapshots.
    Baskets {
        /// One entry per basket.
        baskets: Vec<BasketSnapshot>,
    },
    /// Liveness summary.
    Health(Health),
    /// Request failed.
    Error {
        /// Error message.
        message: String,
    },
}

/// Liveness summary of a scheduler.
pub fn health<B: ExecutionBackend>(scheduler: &Scheduler<B>) -> Health {
    let status = scheduler.status();
    Health {
        ok: status != SchedulerStatus::Stopped,
        status,
        transitions: scheduler.transition_count(),
        rounds: scheduler.rounds(),
    }
}

/// Apply one request.
///
/// # Errors
///
/// Propagates the error of the underlying scheduler operation.
pub fn handle_request<B: ExecutionBackend>(
    scheduler: &Scheduler<B>,
    request: ControlRequest,
) -> SchedulerResult<ControlResponse> {
    debug!(?request, "control request");
    let response = match request {
        ControlRequest::Register {
            name,
            module,
            function,
            definition,
        } => {
            let id = scheduler.register(&name, EntryPoint::new(module, function), &definition)?;
            ControlResponse::Registered { id }
        }
        ControlRequest::Remove { name } => {
            scheduler.remove(&name)?;
            ControlResponse::Ok
        }
        ControlRequest::PauseScheduler => {
            scheduler.pause_scheduler()?;
            ControlResponse::Ok
        }
        ControlRequest::ResumeScheduler => {
            scheduler.resume_scheduler()?;
            ControlResponse::Ok
        }
        ControlRequest::StopScheduler => {
            scheduler.stop_scheduler()?;
            ControlResponse::Ok
        }
        ControlRequest::PauseTransition { name } => {
            scheduler.pause_transition(&name)?;
            ControlResponse::Ok
        }
        ControlRequest::ResumeTransition { name } => {
            scheduler.resume_transition(&name)?;
            ControlResponse::Ok
        }
        ControlRequest::PauseAll => ControlResponse::Changed {
            count: scheduler.pause_all(),
        },
        ControlRequest::ResumeAll => ControlResponse::Changed {
            count: scheduler.resume_all(),
        },
        ControlRequest::Dump => ControlResponse::Dump(scheduler.dump()),
        ControlRequest::Baskets => ControlResponse::Baskets {
            baskets: scheduler.baskets(),
        },
        ControlRequest::Health => ControlResponse::Health(health(scheduler)),
    };
    Ok(response)
}

/// Apply a JSON-encoded request and return the JSON-encoded response.
/// Parse and scheduler errors are reported as an `error` response.
pub fn handle_json<B: ExecutionBackend>(scheduler: &Scheduler<B>, input: &str) -> String {
    let response = match serde_json::from_str::<ControlRequest>(input) {
        Ok(request) => handle_request(scheduler, request).unwrap_or_else(|e| {
            ControlResponse::Error {
                message: e.to_string(),
            }
        }),
        Err(e) => ControlResponse::Error {
            message: format!("parse error: {e}"),
        },
    };
    serde_json::to_string(&response)
        .unwrap_or_else(|e| format!(r#"{{"kind":"error","message":"encode error: {e}"}}"#))
}
