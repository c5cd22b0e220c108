//! # API Route Handlers
//!
//! This module organizes all the Axum route handlers for the `docrag-server`.

pub mod chat;
pub mod general;
pub mod search;

// Re-export all handlers so the router can reach them under `handlers::`.
pub use chat::*;
pub use general::*;
pub use search::*;

// Shared items used by multiple handler modules.
use super::{errors::AppError, state::AppState};
