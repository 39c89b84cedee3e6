//! Method buckets of compiled patterns and the dispatch scan.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::routing::error::{HandlerError, RouteError};
use crate::routing::handler::{Context, Controller, ControllerFactory, Handler, RouteTarget};
use crate::routing::pattern::{compile, normalize_path, prepare, Shortcuts};

/// The wildcard method bucket.
pub const ANY: &str = "ANY";

/// How many handlers a dispatch may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Stop at the first handler that runs.
    #[default]
    FirstMatch,
    /// Run the first matching handler of every bucket that accepts the
    /// method and concatenate their output.
    EveryBucket,
}

struct RouteEntry {
    pattern: String,
    regex: Regex,
    target: RouteTarget,
}

struct Bucket {
    method: String,
    routes: Vec<RouteEntry>,
}

impl Bucket {
    fn accepts(&self, method: &str) -> bool {
        self.method == ANY || self.method == method
    }
}

/// Pattern router.
///
/// Routes live in per-method buckets kept in registration order. Dispatch
/// scans the buckets that accept the request method and, inside each one,
/// tries patterns in registration order.
pub struct Router {
    buckets: Vec<Bucket>,
    shortcuts: Shortcuts,
    base: String,
    controllers: HashMap<String, ControllerFactory>,
    policy: MatchPolicy,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.len())
            .field("base", &self.base)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            buckets: Vec::new(),
            shortcuts: Shortcuts::default(),
            base: "/".to_string(),
            controllers: HashMap::new(),
            policy: MatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Number of (method, pattern) entries.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.routes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add or replace a shortcut token. Affects routes registered later.
    pub fn shortcut(&mut self, token: impl Into<String>, fragment: impl Into<String>) {
        self.shortcuts.set(token, fragment);
    }

    pub fn unshortcut(&mut self, token: &str) -> bool {
        self.shortcuts.remove(token)
    }

    pub fn shortcuts(&self) -> &Shortcuts {
        &self.shortcuts
    }

    /// Make `name` usable as [`Handler::ControllerName`].
    pub fn register_controller<F, C>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Controller + 'static,
    {
        let factory: ControllerFactory = std::sync::Arc::new(move || {
            std::sync::Arc::new(factory()) as std::sync::Arc<dyn Controller>
        });
        self.controllers.insert(name.into(), factory);
    }

    /// Register `handler` for every method in `methods` (`"GET|POST"`,
    /// `"ANY"`).
    ///
    /// Registering the same (method, pattern) again replaces the handler
    /// but keeps the entry's place in the scan order.
    pub fn route(
        &mut self,
        methods: &str,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), RouteError> {
        let methods: Vec<String> = methods
            .split('|')
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        if methods.is_empty() {
            return Err(RouteError::NoMethod(pattern.to_string()));
        }

        let target = self.resolve(&methods, pattern, handler)?;
        let prepared = prepare(&self.base, pattern, &self.shortcuts);
        let regex = compile(&prepared, !target.is_prefix())?;

        for method in methods {
            tracing::debug!(
                method = %method,
                pattern = %prepared,
                kind = target.kind(),
                "Route registered"
            );
            let bucket = match self.buckets.iter().position(|b| b.method == method) {
                Some(i) => &mut self.buckets[i],
                None => {
                    self.buckets.push(Bucket {
                        method,
                        routes: Vec::new(),
                    });
                    let last = self.buckets.len() - 1;
                    &mut self.buckets[last]
                }
            };
            let entry = RouteEntry {
                pattern: prepared.clone(),
                regex: regex.clone(),
                target: target.clone(),
            };
            match bucket.routes.iter_mut().find(|r| r.pattern == prepared) {
                Some(existing) => *existing = entry,
                None => bucket.routes.push(entry),
            }
        }
        Ok(())
    }

    pub fn get(&mut self, pattern: &str, handler: Handler) -> Result<(), RouteError> {
        self.route("GET", pattern, handler)
    }

    pub fn post(&mut self, pattern: &str, handler: Handler) -> Result<(), RouteError> {
        self.route("POST", pattern, handler)
    }

    pub fn put(&mut self, pattern: &str, handler: Handler) -> Result<(), RouteError> {
        self.route("PUT", pattern, handler)
    }

    pub fn delete(&mut self, pattern: &str, handler: Handler) -> Result<(), RouteError> {
        self.route("DELETE", pattern, handler)
    }

    pub fn patch(&mut self, pattern: &str, handler: Handler) -> Result<(), RouteError> {
        self.route("PATCH", pattern, handler)
    }

    pub fn any(&mut self, pattern: &str, handler: Handler) -> Result<(), RouteError> {
        self.route(ANY, pattern, handler)
    }

    /// Register the routes added by `body` under `base`. The base goes
    /// back to `/` afterwards.
    pub fn group<F>(&mut self, base: &str, body: F) -> Result<(), RouteError>
    where
        F: FnOnce(&mut Router) -> Result<(), RouteError>,
    {
        self.base = prepare(&self.base, base, &self.shortcuts);
        let result = body(self);
        self.base = "/".to_string();
        result
    }

    /// Does `path` match `pattern`? `strict` requires a full match,
    /// otherwise a prefix match is enough.
    pub fn is_match(&self, pattern: &str, path: &str, strict: bool) -> Result<bool, RouteError> {
        let regex = compile(&prepare(&self.base, pattern, &self.shortcuts), strict)?;
        Ok(regex.is_match(&normalize_path(path)))
    }

    /// Run the handlers matching `method` and `path`, writing into `cx`.
    ///
    /// Returns `Ok(false)` when no handler ran.
    pub fn dispatch(
        &self,
        method: &str,
        path: &str,
        cx: &mut Context,
    ) -> Result<bool, HandlerError> {
        let method = method.to_uppercase();
        let path = normalize_path(path);
        let mut ran = 0usize;

        for bucket in self.buckets.iter().filter(|b| b.accepts(&method)) {
            for entry in &bucket.routes {
                let Some(captures) = entry.regex.captures(&path) else {
                    continue;
                };
                if entry.target.invoke(&captures, &path, cx)? {
                    tracing::debug!(
                        method = %method,
                        bucket = %bucket.method,
                        pattern = %entry.pattern,
                        path = %path,
                        "Route dispatched"
                    );
                    ran += 1;
                    break;
                }
            }
            if ran > 0 && (self.policy == MatchPolicy::FirstMatch || cx.is_halted()) {
                break;
            }
        }

        if ran == 0 {
            tracing::debug!(method = %method, path = %path, "No route matched");
        }
        Ok(ran > 0)
    }

    fn resolve(
        &self,
        methods: &[String],
        pattern: &str,
        handler: Handler,
    ) -> Result<RouteTarget, RouteError> {
        let invalid = |reason: String| RouteError::InvalidHandler {
            pattern: pattern.to_string(),
            reason,
        };
        match handler {
            Handler::Function(f) => Ok(RouteTarget::Function(f)),
            Handler::Controller(c) => Ok(RouteTarget::Controller(c)),
            Handler::ControllerName(name) => match self.controllers.get(&name) {
                Some(factory) => Ok(RouteTarget::Named {
                    factory: factory.clone(),
                    name,
                }),
                None => Err(invalid(format!("no controller registered as {name:?}"))),
            },
            Handler::File(path) => {
                if Path::new(&path).is_file() {
                    Ok(RouteTarget::File(path))
                } else {
                    Err(invalid(format!("{} is not a file", path.display())))
                }
            }
            Handler::Alias(other) => {
                let prepared = prepare(&self.base, &other, &self.shortcuts);
                methods
                    .iter()
                    .filter_map(|m| self.buckets.iter().find(|b| &b.method == m))
                    .flat_map(|b| b.routes.iter())
                    .find(|r| r.pattern == prepared)
                    .map(|r| r.target.clone())
                    .ok_or_else(|| invalid(format!("{other} is not a registered pattern")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppContext;
    use crate::http::Request;
    use std::sync::Arc;

    fn cx() -> Context {
        Context::new(
            Arc::new(Request::new("GET", "/")),
            Arc::new(AppContext::default()),
        )
    }

    fn echo(text: &'static str) -> Handler {
        Handler::function(move |cx| {
            cx.echo(text);
            Ok(())
        })
    }

    fn run(router: &Router, method: &str, path: &str) -> Option<String> {
        let mut cx = cx();
        router
            .dispatch(method, path, &mut cx)
            .unwrap()
            .then(|| cx.take_output())
    }

    struct Blog;

    impl Controller for Blog {
        fn call(&self, action: &str, cx: &mut Context) -> Result<bool, HandlerError> {
            match action {
                "index" => cx.echo("blog index"),
                "show" => {
                    let id = cx.arg(0).unwrap_or("none").to_string();
                    cx.echo(&format!("post {id}"));
                }
                "edit_post" => cx.echo("editing"),
                "_secret" => cx.echo("leaked"),
                _ => return Ok(false),
            }
            Ok(true)
        }
    }

    #[test]
    fn test_num_shortcut_captures() {
        let mut router = Router::new();
        router
            .get(
                "/user/{num}/",
                Handler::function(|cx| {
                    let id = cx.arg(0).unwrap_or_default().to_string();
                    cx.echo(&id);
                    Ok(())
                }),
            )
            .unwrap();

        assert_eq!(run(&router, "GET", "/user/42/").as_deref(), Some("42"));
        assert_eq!(run(&router, "GET", "/user/42").as_deref(), Some("42"));
        assert_eq!(run(&router, "get", "//user//42").as_deref(), Some("42"));
        assert_eq!(run(&router, "GET", "/user/abc/"), None);
        assert_eq!(run(&router, "POST", "/user/42/"), None);
    }

    #[test]
    fn test_method_lists_and_any() {
        let mut router = Router::new();
        router.route("GET|post", "/form", echo("form")).unwrap();
        router.any("/ping", echo("pong")).unwrap();

        assert_eq!(run(&router, "POST", "/form").as_deref(), Some("form"));
        assert_eq!(run(&router, "GET", "/form").as_deref(), Some("form"));
        assert_eq!(run(&router, "PUT", "/form"), None);
        assert_eq!(run(&router, "DELETE", "/ping").as_deref(), Some("pong"));
    }

    #[test]
    fn test_first_match_policy_stops() {
        let mut router = Router::new();
        router.get("/page", echo("get")).unwrap();
        router.any("/page", echo("any")).unwrap();
        assert_eq!(run(&router, "GET", "/page").as_deref(), Some("get"));
    }

    #[test]
    fn test_every_bucket_policy_concatenates() {
        let mut router = Router::new().with_policy(MatchPolicy::EveryBucket);
        router.get("/page", echo("get;")).unwrap();
        router.get("/{any}", echo("second-in-bucket;")).unwrap();
        router.any("/page", echo("any;")).unwrap();
        assert_eq!(run(&router, "GET", "/page").as_deref(), Some("get;any;"));
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut router = Router::new();
        router.get("/{any}", echo("first")).unwrap();
        router.get("/about", echo("about")).unwrap();
        router.get("/{any}", echo("replaced")).unwrap();
        assert_eq!(router.len(), 2);
        assert_eq!(run(&router, "GET", "/about").as_deref(), Some("replaced"));
    }

    #[test]
    fn test_group_prefixes_and_restores_base() {
        let mut router = Router::new();
        router
            .group("/admin", |r| {
                r.get("/users", echo("admin users"))?;
                r.get("/", echo("admin home"))
            })
            .unwrap();
        router.get("/users", echo("public users")).unwrap();

        assert_eq!(run(&router, "GET", "/admin/users").as_deref(), Some("admin users"));
        assert_eq!(run(&router, "GET", "/admin").as_deref(), Some("admin home"));
        assert_eq!(run(&router, "GET", "/users").as_deref(), Some("public users"));
    }

    #[test]
    fn test_controller_actions() {
        let mut router = Router::new();
        router.get("/blog", Handler::controller(Blog)).unwrap();

        assert_eq!(run(&router, "GET", "/blog").as_deref(), Some("blog index"));
        assert_eq!(run(&router, "GET", "/blog/show/7").as_deref(), Some("post 7"));
        assert_eq!(run(&router, "GET", "/blog/edit-post").as_deref(), Some("editing"));
        assert_eq!(run(&router, "GET", "/blog/_secret"), None);
        assert_eq!(run(&router, "GET", "/blog/missing"), None);
    }

    #[test]
    fn test_unknown_action_falls_through_to_next_route() {
        let mut router = Router::new();
        router.get("/blog", Handler::controller(Blog)).unwrap();
        router.get("/blog/{any}", echo("fallback")).unwrap();
        assert_eq!(run(&router, "GET", "/blog/missing").as_deref(), Some("fallback"));
    }

    #[test]
    fn test_named_controller() {
        let mut router = Router::new();
        assert!(matches!(
            router.get("/blog", Handler::named("Blog")),
            Err(RouteError::InvalidHandler { .. })
        ));

        router.register_controller("Blog", || Blog);
        router.get("/blog", Handler::named("Blog")).unwrap();
        assert_eq!(run(&router, "GET", "/blog/show/1").as_deref(), Some("post 1"));
    }

    #[test]
    fn test_alias_reuses_handler() {
        let mut router = Router::new();
        router.get("/home", echo("home")).unwrap();
        router.get("/", Handler::alias("/home")).unwrap();
        assert_eq!(run(&router, "GET", "/").as_deref(), Some("home"));

        assert!(matches!(
            router.get("/x", Handler::alias("/nowhere")),
            Err(RouteError::InvalidHandler { .. })
        ));
        assert!(matches!(
            router.post("/x", Handler::alias("/home")),
            Err(RouteError::InvalidHandler { .. })
        ));
    }

    #[test]
    fn test_file_handler() {
        let dir = std::env::temp_dir().join(format!("sitekit-router-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("hello.html");
        std::fs::write(&file, "<p>hello {{0}}</p>").unwrap();

        let mut router = Router::new();
        router.get("/hello/{alpha}", Handler::file(&file)).unwrap();
        assert_eq!(
            run(&router, "GET", "/hello/world").as_deref(),
            Some("<p>hello world</p>")
        );

        assert!(matches!(
            router.get("/gone", Handler::file(dir.join("missing.html"))),
            Err(RouteError::InvalidHandler { .. })
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_shortcut_changes_apply_to_later_routes() {
        let mut router = Router::new();
        router.shortcut("{slug}", "([a-z-]+)");
        router
            .get(
                "/post/{slug}",
                Handler::function(|cx| {
                    let slug = cx.arg(0).unwrap_or_default().to_string();
                    cx.echo(&slug);
                    Ok(())
                }),
            )
            .unwrap();
        assert_eq!(run(&router, "GET", "/post/hello-world").as_deref(), Some("hello-world"));

        assert!(router.unshortcut("{slug}"));
        assert_eq!(router.shortcuts().get("{slug}"), None);
        assert_eq!(run(&router, "GET", "/post/still-works").as_deref(), Some("still-works"));
    }

    #[test]
    fn test_is_match() {
        let router = Router::new();
        assert!(router.is_match("/user/{num}", "/user/5", true).unwrap());
        assert!(!router.is_match("/user", "/user/5", true).unwrap());
        assert!(router.is_match("/user", "/user/5", false).unwrap());
    }

    #[test]
    fn test_wildcard_route_matches_bare_prefix() {
        let mut router = Router::new();
        router
            .get(
                "/files/{*}",
                Handler::function(|cx| {
                    let rest = cx.arg(0).unwrap_or("missing").to_string();
                    cx.echo(&format!("[{rest}]"));
                    Ok(())
                }),
            )
            .unwrap();

        assert_eq!(run(&router, "GET", "/files/a/b").as_deref(), Some("[a/b]"));
        assert_eq!(run(&router, "GET", "/files/").as_deref(), Some("[]"));
        assert_eq!(run(&router, "GET", "/files").as_deref(), Some("[]"));
    }

    #[test]
    fn test_handler_error_propagates() {
        let mut router = Router::new();
        router
            .get("/boom", Handler::function(|_| Err(HandlerError::msg("boom"))))
            .unwrap();
        let mut cx = cx();
        assert!(router.dispatch("GET", "/boom", &mut cx).is_err());
    }

    #[test]
    fn test_empty_method_list() {
        let mut router = Router::new();
        assert!(matches!(
            router.route(" | ", "/x", echo("x")),
            Err(RouteError::NoMethod(_))
        ));
    }
}
