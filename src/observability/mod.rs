//! Observability for the history layer
//!
//! Structured logging through `tracing`. Every event carries a typed
//! [`Event`] name:
//!
//! ```ignore
//! use aerodb_history::observability::{init_logging, Event, LogFormat};
//!
//! init_logging(LogFormat::Json);
//! tracing::info!(event = %Event::Recorded, collection = "users_history");
//! ```
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. Logging never changes the outcome of a mutation
//! 3. Failures to record history are always logged at ERROR

mod events;
mod logging;

pub use events::Event;
pub use logging::{init_logging, LogFormat, DEFAULT_FILTER};
