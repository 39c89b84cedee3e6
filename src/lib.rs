//! sitekit: a small site framework.
//!
//! Pattern routing over shortcut-expanded regexes, a thin SQL layer over
//! SQLite, a key-value store and a document store built on it, and an
//! application shell with dispatch and output events, served by Axum.

pub mod app;
pub mod config;
pub mod http;
pub mod routing;
pub mod sql;
pub mod store;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use app::{App, AppContext, AppError};
pub use config::SiteConfig;
pub use http::{HttpServer, Request, SiteResponse};
pub use lifecycle::Shutdown;
pub use routing::{Context, Handler, Router};
