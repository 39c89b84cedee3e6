//! Application shell subsystem.
//!
//! # Responsibilities
//! - Own the router, event listeners and shared services
//! - Run each request through the dispatch and output events
//! - Turn handler results into a [`SiteResponse`](crate::http::SiteResponse)
//!
//! # Design Decisions
//! - Handlers are synchronous; the server runs the shell on the blocking pool
//! - Services are built once from config and shared behind an `Arc`

pub mod events;
pub mod shell;

pub use events::{Event, Events, Listener};
pub use shell::{App, AppContext, AppError};
