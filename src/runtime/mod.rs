//! Control API surface.

pub mod api;

pub use api::{handle_json, handle_request, health, ControlRequest, ControlResponse, Health};
