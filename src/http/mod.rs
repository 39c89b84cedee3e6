//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, limits)
//!     → request.rs (method, routing path, query, body, headers)
//!     → app shell (events, router, handlers)
//!     → redirect.rs (when a handler redirects)
//!     → response.rs (status, site headers, body)
//!     → Send to client
//! ```

pub mod redirect;
pub mod request;
pub mod response;
pub mod server;

pub use redirect::RedirectMode;
pub use request::{PathSource, Request, RequestOptions, X_REQUEST_ID};
pub use response::SiteResponse;
pub use server::HttpServer;
