//! Pattern router.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     route("GET|POST", "/user/{num}", handler)
//!     → pattern.rs (group base, slash normalization, shortcut tokens)
//!     → handler.rs (resolve Handler → RouteTarget)
//!     → router.rs (store in the method bucket, compile regex)
//!
//! Dispatch:
//!     (method, path) → normalize_path
//!     → buckets accepting the method, in registration order
//!     → first pattern per bucket whose handler runs
//!     → output accumulated in Context
//! ```
//!
//! # Design Decisions
//! - Linear scan over regexes; no tree or precompiled automaton
//! - Function and file handlers need a full match, controllers a prefix
//!   match
//! - Routes and shortcuts are mutable until the router is handed to the
//!   application; dispatch only borrows it

pub mod error;
pub mod handler;
pub mod pattern;
pub mod router;

pub use error::{HandlerError, RouteError};
pub use handler::{Context, Controller, Handler, HandlerFn, RouteTarget};
pub use pattern::{normalize_path, Shortcuts};
pub use router::{MatchPolicy, Router, ANY};
