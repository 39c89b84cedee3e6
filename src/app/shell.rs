//! The application shell: services, router and the output cycle.
//!
//! # Data Flow
//! ```text
//! Request
//!     → dispatch.before          (listener text appended to output)
//!     → Router::dispatch         (no match → fixed 404 page, cycle ends)
//!     → dispatch.after           (appended)
//!     → output.before            (appended)
//!     → output.filter            (replaces output when non-empty)
//!     → HEAD? drop body
//!     → output.after             (result ignored)
//!     → SiteResponse + Content-Type / X-Powered-By
//! ```
//!
//! A header redirect halts the cycle right after dispatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use thiserror::Error;

use crate::app::events::{
    Event, Events, DISPATCH_AFTER, DISPATCH_BEFORE, OUTPUT_AFTER, OUTPUT_BEFORE, OUTPUT_FILTER,
};
use crate::config::{validate_config, ConfigError, SiteConfig};
use crate::http::request::RequestOptions;
use crate::http::{Request, SiteResponse};
use crate::observability::metrics;
use crate::routing::{Context, HandlerError, RouteError, Router};
use crate::sql::{ConnectOptions, Db, DbError, Ident, Raw};
use crate::store::{DocStore, KvStore};

/// Errors raised while building or configuring an [`App`].
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("could not create the {0} tables")]
    Schema(&'static str),
}

/// Services reachable from handlers through [`Context`].
#[derive(Debug, Clone)]
pub struct AppContext {
    pub db: Option<Arc<Db>>,
    pub kv: Option<KvStore>,
    pub docs: Option<DocStore>,
    /// Base for relative redirect targets.
    pub base_url: String,
}

impl Default for AppContext {
    fn default() -> Self {
        Self {
            db: None,
            kv: None,
            docs: None,
            base_url: "/".to_string(),
        }
    }
}

impl AppContext {
    /// Open the database and stores described by `config`.
    pub fn from_config(config: &SiteConfig) -> Result<Self, AppError> {
        let db = match &config.database.dsn {
            Some(dsn) => {
                let options = ConnectOptions {
                    foreign_keys: true,
                    synchronous_off: config.database.synchronous_off,
                    busy_timeout: Some(Duration::from_millis(config.database.busy_timeout_ms)),
                };
                Some(Arc::new(Db::connect(
                    dsn,
                    config.database.username.as_deref(),
                    config.database.password.as_deref(),
                    &options,
                )?))
            }
            None => None,
        };

        let kv = match (&db, config.kv.enabled) {
            (Some(db), true) => {
                let kv = KvStore::new(db.clone(), Ident::new(config.kv.table.as_str())?)
                    .with_locking(config.kv.locking);
                if !kv.create()? {
                    return Err(AppError::Schema("key-value"));
                }
                Some(kv)
            }
            (None, true) => {
                tracing::debug!("No database configured; stores disabled");
                None
            }
            _ => None,
        };

        let docs = match (&db, config.docstore.enabled) {
            (Some(db), true) => {
                let docs = DocStore::new(db.clone(), Ident::new(config.docstore.table.as_str())?)
                    .with_id_length(config.docstore.id_length);
                if !docs.create()? {
                    return Err(AppError::Schema("document"));
                }
                for index in &config.docstore.indexes {
                    if !docs.index(&index.name, &Raw::new(index.sql_type.as_str()))? {
                        return Err(AppError::Schema("document index"));
                    }
                }
                Some(docs)
            }
            _ => None,
        };

        Ok(Self {
            db,
            kv,
            docs,
            base_url: config.site.base_url.clone(),
        })
    }
}

/// A site: router, event listeners and shared services.
pub struct App {
    router: Router,
    events: Events,
    context: Arc<AppContext>,
    request_options: RequestOptions,
    powered_by: String,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("router", &self.router)
            .field("events", &self.events)
            .field("context", &self.context)
            .finish()
    }
}

impl App {
    /// Validate `config`, then build the database, stores, router policy
    /// and extra shortcuts from it.
    pub fn new(config: &SiteConfig) -> Result<Self, AppError> {
        validate_config(config).map_err(ConfigError::Validation)?;
        let context = AppContext::from_config(config)?;
        let mut app = Self::with_context(context);

        app.router = Router::new().with_policy(config.router.match_policy);
        for shortcut in &config.router.shortcuts {
            app.router.shortcut(shortcut.token.as_str(), shortcut.pattern.as_str());
        }
        app.request_options = RequestOptions {
            path_source: config.router.path_source,
            mount_path: config.router.mount_path.clone(),
        };
        app.powered_by = config.site.powered_by.clone();

        tracing::info!(
            database = app.context.db.as_ref().map(|db| db.database()).unwrap_or("none"),
            kv = app.context.kv.is_some(),
            docstore = app.context.docs.is_some(),
            policy = ?config.router.match_policy,
            "Application built"
        );
        Ok(app)
    }

    /// An app around existing services with default settings.
    pub fn with_context(context: AppContext) -> Self {
        let defaults = SiteConfig::default();
        Self {
            router: Router::new(),
            events: Events::default(),
            context: Arc::new(context),
            request_options: RequestOptions::default(),
            powered_by: defaults.site.powered_by,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    pub fn request_options(&self) -> &RequestOptions {
        &self.request_options
    }

    /// Subscribe to an event tag (see [`crate::app::events`]).
    pub fn listen<F>(&mut self, tag: &str, priority: i32, listener: F)
    where
        F: Fn(&Event<'_>) -> Option<String> + Send + Sync + 'static,
    {
        self.events.listen(tag, priority, listener);
    }

    /// Run one request through the output cycle.
    pub fn handle(&self, request: Request) -> SiteResponse {
        let started = Instant::now();
        let request = Arc::new(request);

        let response = match self.run_cycle(&request) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    request_id = request.request_id().unwrap_or("-"),
                    method = %request.method(),
                    path = %request.path(),
                    "Handler failed"
                );
                SiteResponse::server_error()
            }
        }
        .with_site_headers(&self.powered_by);

        metrics::record_request(request.method(), response.status.as_u16(), started);
        tracing::debug!(
            request_id = request.request_id().unwrap_or("-"),
            method = %request.method(),
            path = %request.path(),
            status = response.status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request handled"
        );
        response
    }

    fn run_cycle(&self, request: &Arc<Request>) -> Result<SiteResponse, HandlerError> {
        let mut cx = Context::new(request.clone(), self.context.clone());

        self.append_event(DISPATCH_BEFORE, request, &mut cx);
        if !self.router.dispatch(request.method(), request.path(), &mut cx)? {
            return Ok(SiteResponse::not_found());
        }
        if cx.is_halted() {
            return Ok(into_response(cx, false));
        }
        self.append_event(DISPATCH_AFTER, request, &mut cx);
        self.append_event(OUTPUT_BEFORE, request, &mut cx);

        let output = cx.take_output();
        let output = self
            .events
            .trigger(OUTPUT_FILTER, request, &output, None)
            .unwrap_or(output);
        self.events.trigger(OUTPUT_AFTER, request, &output, None);
        cx.replace_output(output);

        Ok(into_response(cx, request.is_head()))
    }

    fn append_event(&self, tag: &str, request: &Request, cx: &mut Context) {
        if let Some(text) = self.events.trigger(tag, request, cx.output(), None) {
            cx.echo(&text);
        }
    }
}

fn into_response(cx: Context, drop_body: bool) -> SiteResponse {
    let (status, headers, body) = cx.into_parts();
    SiteResponse {
        status: status.unwrap_or(StatusCode::OK),
        headers,
        body: if drop_body { String::new() } else { body },
    }
}
