//! Observability
//!
//! Structured logging through `tracing`, with typed event names.
//!
//! ```ignore
//! use todo_rls::observability::{init_logging, Event, LogFormat};
//!
//! init_logging("info", LogFormat::Json)?;
//! tracing::info!(event = %Event::Serving, addr = %addr, "listening");
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{init_logging, LogFormat};
