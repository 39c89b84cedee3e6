//! Handlers and the per-request context they write into.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use regex::Captures;

use crate::app::AppContext;
use crate::http::redirect::{self, RedirectMode};
use crate::http::Request;
use crate::routing::error::HandlerError;
use crate::routing::pattern::normalize_path;
use crate::sql::Db;
use crate::store::{DocStore, KvStore};

/// A function handler. Captured groups are available through
/// [`Context::args`].
pub type HandlerFn = Arc<dyn Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync>;

/// Builds a fresh controller for every dispatch that reaches it.
pub type ControllerFactory = Arc<dyn Fn() -> Arc<dyn Controller> + Send + Sync>;

/// A group of actions selected by the first path segment after the route
/// prefix.
///
/// For a controller mounted at `/blog`, the path `/blog/show/42/` calls
/// `call("show", cx)` with `cx.args() == ["42"]`. An empty remainder calls
/// `index`.
pub trait Controller: Send + Sync {
    /// Run `action`. Returns `Ok(false)` when the controller has no such
    /// action; the route then does not count as matched.
    fn call(&self, action: &str, cx: &mut Context) -> Result<bool, HandlerError>;
}

/// What a route points at, as given to [`Router::route`](super::Router::route).
#[derive(Clone)]
pub enum Handler {
    Function(HandlerFn),
    Controller(Arc<dyn Controller>),
    /// A controller registered with
    /// [`Router::register_controller`](super::Router::register_controller).
    ControllerName(String),
    /// A file whose contents are written to the output. `{{0}}`, `{{1}}`
    /// ... are replaced by the captured arguments.
    File(PathBuf),
    /// Reuse the handler of an already registered pattern.
    Alias(String),
}

impl Handler {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    pub fn controller(c: impl Controller + 'static) -> Self {
        Self::Controller(Arc::new(c))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::ControllerName(name.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn alias(pattern: impl Into<String>) -> Self {
        Self::Alias(pattern.into())
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Function(_) => f.write_str("Function"),
            Handler::Controller(_) => f.write_str("Controller"),
            Handler::ControllerName(name) => write!(f, "ControllerName({name})"),
            Handler::File(path) => write!(f, "File({})", path.display()),
            Handler::Alias(pattern) => write!(f, "Alias({pattern})"),
        }
    }
}

/// A resolved handler stored in a route entry.
#[derive(Clone)]
pub enum RouteTarget {
    Function(HandlerFn),
    Controller(Arc<dyn Controller>),
    Named {
        name: String,
        factory: ControllerFactory,
    },
    File(PathBuf),
}

impl fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

impl RouteTarget {
    /// Controllers match a prefix of the path; everything else must match
    /// the whole path.
    pub fn is_prefix(&self) -> bool {
        matches!(self, RouteTarget::Controller(_) | RouteTarget::Named { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RouteTarget::Function(_) => "function",
            RouteTarget::Controller(_) => "controller",
            RouteTarget::Named { .. } => "controller_name",
            RouteTarget::File(_) => "file",
        }
    }

    /// Run the handler against a matched path. Returns whether it ran.
    pub fn invoke(
        &self,
        captures: &Captures<'_>,
        path: &str,
        cx: &mut Context,
    ) -> Result<bool, HandlerError> {
        match self {
            RouteTarget::Function(f) => {
                cx.args = captured_args(captures);
                f(cx)?;
                Ok(true)
            }
            RouteTarget::File(file) => {
                let args = captured_args(captures);
                let mut body = std::fs::read_to_string(file).map_err(|source| HandlerError::File {
                    path: file.display().to_string(),
                    source,
                })?;
                for (i, arg) in args.iter().enumerate() {
                    body = body.replace(&format!("{{{{{i}}}}}"), arg);
                }
                cx.args = args;
                cx.echo(&body);
                Ok(true)
            }
            RouteTarget::Controller(controller) => {
                run_action(controller.as_ref(), captures, path, cx)
            }
            RouteTarget::Named { name, factory } => {
                tracing::trace!(controller = %name, "Instantiating controller");
                let controller = factory();
                run_action(controller.as_ref(), captures, path, cx)
            }
        }
    }
}

fn captured_args(captures: &Captures<'_>) -> Vec<String> {
    captures
        .iter()
        .skip(1)
        .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
        .collect()
}

fn run_action(
    controller: &dyn Controller,
    captures: &Captures<'_>,
    path: &str,
    cx: &mut Context,
) -> Result<bool, HandlerError> {
    let matched_to = captures.get(0).map(|m| m.end()).unwrap_or(0);
    let (action, args) = split_action(&path[matched_to..]);
    if action.starts_with('_') {
        tracing::debug!(action = %action, "Rejected internal action");
        return Ok(false);
    }
    cx.args = args;
    controller.call(&action, cx)
}

/// `/action/arg/arg/` → (`action`, `[arg, arg]`). The action defaults to
/// `index`; `-` and `.` become `_`.
pub fn split_action(remainder: &str) -> (String, Vec<String>) {
    let uri = normalize_path(remainder);
    let mut segments = uri
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let action = segments
        .next()
        .unwrap_or_else(|| "index".to_string())
        .replace(['-', '.'], "_");
    (action, segments.collect())
}

/// Per-request state shared by every handler that runs for a request.
pub struct Context {
    request: Arc<Request>,
    app: Arc<AppContext>,
    args: Vec<String>,
    output: String,
    status: Option<StatusCode>,
    headers: HeaderMap,
    halted: bool,
}

impl Context {
    pub fn new(request: Arc<Request>, app: Arc<AppContext>) -> Self {
        Self {
            request,
            app,
            args: Vec::new(),
            output: String::new(),
            status: None,
            headers: HeaderMap::new(),
            halted: false,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn app(&self) -> &AppContext {
        &self.app
    }

    /// Positional arguments of the running handler.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Append to the output buffer.
    pub fn echo(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn replace_output(&mut self, output: String) {
        self.output = output;
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Set a response header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), HandlerError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HandlerError::msg(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HandlerError::msg(format!("invalid header value {value:?}: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Stop dispatching further handlers and skip the output events.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Redirect to `to`, resolved against the site base URL when relative.
    pub fn redirect(&mut self, to: &str, mode: RedirectMode) -> Result<(), HandlerError> {
        redirect::apply(self, to, mode)
    }

    pub fn db(&self) -> Result<&Arc<Db>, HandlerError> {
        self.app.db.as_ref().ok_or(HandlerError::Unavailable("database"))
    }

    pub fn kv(&self) -> Result<&KvStore, HandlerError> {
        self.app.kv.as_ref().ok_or(HandlerError::Unavailable("key-value store"))
    }

    pub fn docs(&self) -> Result<&DocStore, HandlerError> {
        self.app
            .docs
            .as_ref()
            .ok_or(HandlerError::Unavailable("document store"))
    }

    pub(crate) fn into_parts(self) -> (Option<StatusCode>, HeaderMap, String) {
        (self.status, self.headers, self.output)
    }
}

impl fmt::Write for Context {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.output.push_str(s);
        Ok(())
    }
}
