//! Request routing: map URL patterns and HTTP methods to adapted handlers.
//!
//! This module provides [`Router`], which dispatches incoming requests to the
//! [`RequestAdapter`] registered for the request method and path. Two pattern
//! styles are supported:
//!
//! | Pattern              | Example match              | Captured params              |
//! |----------------------|----------------------------|------------------------------|
//! | `/blogs`             | `/blogs`                   | *(none)*                     |
//! | `/blog/:id`          | `/blog/42`                 | `id → "42"`                  |
//!
//! Trailing slashes are normalized on both patterns and incoming paths, so `/blogs/` and
//! `/blogs` are treated as equivalent.
//!
//! Routes are matched in registration order; the first route whose method and pattern both
//! match the incoming request wins. Registering the same method and path again replaces the
//! earlier handler in place.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::context::PathParams;
use crate::http::form;
use crate::handler::{
    Handler, HandlerError, HandlerResult, IntoHandler, Renderer, RequestAdapter, Signature,
    SignatureError,
};
use crate::{Method, Request, Response, StatusCode};

/// Declaration-time routing errors.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("@get or @post not defined in {handler}")]
    MissingRoute { handler: String },

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("invalid route path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

/// Method and path a handler answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub method: Method,
    pub path: String,
}

impl RouteSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }
}

/// A handler with its signature and, once annotated, its route.
///
/// # Examples
///
/// ```rust
/// use weft::context::Args;
/// use weft::handler::{HandlerError, Reply, Signature};
/// use weft::router::{Endpoint, Router};
///
/// async fn index(_args: Args) -> Result<Reply, HandlerError> {
///     Ok(Reply::from("<h1>Blogs</h1>"))
/// }
///
/// let mut router = Router::new();
/// let registered = router
///     .register_all([Endpoint::new(Signature::new("index").request(), index).get("/")])
///     .unwrap();
/// assert_eq!(registered, 1);
/// ```
pub struct Endpoint {
    signature: Signature,
    handler: Handler,
    route: Option<RouteSpec>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("signature", &self.signature)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    pub fn new(signature: Signature, handler: impl IntoHandler) -> Self {
        Self {
            signature,
            handler: handler.into_handler(),
            route: None,
        }
    }

    /// Annotates the endpoint with a route.
    #[must_use]
    pub fn route(mut self, route: RouteSpec) -> Self {
        self.route = Some(route);
        self
    }

    #[must_use]
    pub fn get(self, path: impl Into<String>) -> Self {
        self.route(RouteSpec::get(path))
    }

    #[must_use]
    pub fn post(self, path: impl Into<String>) -> Self {
        self.route(RouteSpec::post(path))
    }

    /// The handler name from its signature.
    pub fn name(&self) -> &str {
        self.signature.handler()
    }

    pub fn route_spec(&self) -> Option<&RouteSpec> {
        self.route.as_ref()
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/blogs`.
    Exact(String),
    // Matches a fixed number of segments where some may be named captures, e.g. `/blog/:id`.
    Parameterized { segments: Vec<Segment> },
}

impl Pattern {
    /// Parse a route pattern string into a `Pattern`.
    ///
    /// A trailing slash (other than on the root `/`) is stripped first, so that `/blogs/`
    /// and `/blogs` compile to identical patterns. Patterns containing `:` become
    /// [`Pattern::Parameterized`]; everything else is [`Pattern::Exact`].
    fn parse(pattern: &str) -> Result<Self, RouteError> {
        let invalid = |reason| RouteError::InvalidPath {
            path: pattern.to_owned(),
            reason,
        };
        if !pattern.starts_with('/') {
            return Err(invalid("must start with `/`"));
        }
        let trimmed = trim_trailing_slash(pattern);

        if !trimmed.contains(':') {
            return Ok(Pattern::Exact(trimmed.to_string()));
        }

        let mut segments = Vec::new();
        for s in trimmed.split('/').filter(|s| !s.is_empty()) {
            match s.strip_prefix(':') {
                Some("") => return Err(invalid("empty parameter name")),
                Some(name) => segments.push(Segment::Parameter(name.to_string())),
                None => segments.push(Segment::Static(s.to_string())),
            }
        }
        Ok(Pattern::Parameterized { segments })
    }

    // Try to match `path` against this pattern, returning extracted [`PathParams`] on success.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let mut params = PathParams::new();
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

                if segments.len() != path_segments.len() {
                    return None;
                }

                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) => {
                            if s != path_seg {
                                return None;
                            }
                        }
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), form::decode_path_segment(path_seg));
                        }
                    }
                }

                Some(params)
            }
        }
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

// A single registered route binding a method + pattern to an adapted handler.
struct Route {
    method: Method,
    pattern: Pattern,
    adapter: Arc<RequestAdapter>,
}

impl Route {
    // Returns `Some(params)` when both the HTTP method and path pattern match, `None` otherwise.
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// Dispatch table from (method, path) to adapted handlers.
///
/// Every handler is wrapped in a [`RequestAdapter`] at registration time, so
/// signature errors surface before the first request. When no route matches,
/// [`route`](Self::route) answers `404 Not Found`.
///
/// # Examples
///
/// ```rust
/// use weft::context::Args;
/// use weft::handler::{HandlerError, Reply, Signature};
/// use weft::http::{Method, Request, StatusCode};
/// use weft::router::Router;
///
/// # async fn example() -> Result<(), weft::router::RouteError> {
/// let mut router = Router::new();
/// router.get("/blog/:id", Signature::new("get_blog").param("id"), |args: Args| async move {
///     let id: String = args.value("id")?;
///     Ok::<_, HandlerError>(Reply::Html(format!("blog {id}")))
/// })?;
///
/// let response = router.route(Request::new(Method::Get, "/blog/42")).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.text(), "blog 42");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    index: HashMap<(Method, String), usize>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl Router {
    /// Create a new, empty `Router` with no registered routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `renderer` for [`Reply::Template`](crate::handler::Reply::Template) replies.
    #[must_use]
    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Register `handler` for `method` requests matching `path`.
    ///
    /// # Errors
    ///
    /// - [`RouteError::Signature`]: `signature` is malformed.
    /// - [`RouteError::InvalidPath`]: `path` is not a valid pattern.
    pub fn add(
        &mut self,
        method: Method,
        path: &str,
        signature: Signature,
        handler: impl IntoHandler,
    ) -> Result<(), RouteError> {
        self.insert(
            RouteSpec::new(method, path),
            &signature,
            handler.into_handler(),
        )
    }

    /// Register `handler` for `GET` requests matching `path`.
    pub fn get(
        &mut self,
        path: &str,
        signature: Signature,
        handler: impl IntoHandler,
    ) -> Result<(), RouteError> {
        self.add(Method::Get, path, signature, handler)
    }

    /// Register `handler` for `POST` requests matching `path`.
    pub fn post(
        &mut self,
        path: &str,
        signature: Signature,
        handler: impl IntoHandler,
    ) -> Result<(), RouteError> {
        self.add(Method::Post, path, signature, handler)
    }

    /// Register an annotated endpoint.
    ///
    /// # Errors
    ///
    /// [`RouteError::MissingRoute`] when the endpoint has no route, plus the
    /// errors of [`add`](Self::add).
    pub fn register(&mut self, endpoint: Endpoint) -> Result<(), RouteError> {
        let Some(route) = endpoint.route else {
            return Err(RouteError::MissingRoute {
                handler: endpoint.signature.handler().to_owned(),
            });
        };
        self.insert(route, &endpoint.signature, endpoint.handler)
    }

    /// Register every endpoint that has a route and a public name.
    ///
    /// Endpoints whose name starts with `_` and endpoints without a route are
    /// skipped. Returns how many were registered.
    pub fn register_all(
        &mut self,
        endpoints: impl IntoIterator<Item = Endpoint>,
    ) -> Result<usize, RouteError> {
        let mut registered = 0;
        for endpoint in endpoints {
            if endpoint.name().starts_with('_') || endpoint.route.is_none() {
                debug!(handler = endpoint.name(), "skipping endpoint");
                continue;
            }
            self.register(endpoint)?;
            registered += 1;
        }
        Ok(registered)
    }

    fn insert(
        &mut self,
        route: RouteSpec,
        signature: &Signature,
        handler: Handler,
    ) -> Result<(), RouteError> {
        let pattern = Pattern::parse(&route.path)?;
        let adapter = Arc::new(RequestAdapter::new(signature, handler)?);
        info!(method = %route.method, path = %route.path, handler = %signature, "add route");

        let key = (route.method.clone(), trim_trailing_slash(&route.path).to_owned());
        let entry = Route {
            method: route.method,
            pattern,
            adapter,
        };
        match self.index.get(&key).copied() {
            Some(slot) => {
                warn!(method = %key.0, path = %key.1, "route registered twice, replacing handler");
                self.routes[slot] = entry;
            }
            None => {
                self.index.insert(key, self.routes.len());
                self.routes.push(entry);
            }
        }
        Ok(())
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs the first route matching `request`, or returns `None` when none does.
    pub async fn dispatch(&self, request: Request) -> Option<HandlerResult> {
        let matched = self.routes.iter().find_map(|route| {
            route
                .matches(request.method(), request.path())
                .map(|params| (Arc::clone(&route.adapter), params))
        });
        let (adapter, params) = matched?;
        Some(adapter.call(request, params).await)
    }

    /// Dispatches `request` and converts the outcome to a [`Response`].
    ///
    /// No matching route answers `404`, a [`HandlerError::BadRequest`] answers
    /// `400` with its message, and any other error answers `500`.
    pub async fn route(&self, request: Request) -> Response {
        let method = request.method().clone();
        let path = request.path().to_owned();

        match self.dispatch(request).await {
            None => {
                debug!(%method, %path, "no route");
                Response::new(StatusCode::NotFound)
            }
            Some(Ok(reply)) => reply.into_response(self.renderer.as_deref()),
            Some(Err(HandlerError::BadRequest(message))) => {
                debug!(%method, %path, %message, "bad request");
                Response::new(StatusCode::BadRequest)
                    .header("Content-Type", "text/plain; charset=utf-8")
                    .body(message)
            }
            Some(Err(e)) => {
                error!(%method, %path, error = %e, "handler failed");
                Response::new(StatusCode::InternalServerError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Args;
    use crate::handler::{ApiError, Reply};

    fn ok(_args: Args) -> impl Future<Output = HandlerResult> + Send {
        async { Ok(Reply::Status(StatusCode::Ok)) }
    }

    fn created(_args: Args) -> impl Future<Output = HandlerResult> + Send {
        async { Ok(Reply::Status(StatusCode::Created)) }
    }

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    // ── Pattern::parse ────────────────────────────────────────────────────────

    #[test]
    fn pattern_parse_root() {
        assert!(matches!(Pattern::parse("/"), Ok(Pattern::Exact(s)) if s == "/"));
    }

    #[test]
    fn pattern_parse_trailing_slash_stripped() {
        assert!(matches!(Pattern::parse("/blogs/"), Ok(Pattern::Exact(s)) if s == "/blogs"));
    }

    #[test]
    fn pattern_parse_parameterized_multi() {
        match Pattern::parse("/user/:id/blog/:blog_id").unwrap() {
            Pattern::Parameterized { segments } => {
                assert_eq!(segments.len(), 4);
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "id"));
                assert!(matches!(&segments[3], Segment::Parameter(s) if s == "blog_id"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn pattern_parse_rejects_bad_paths() {
        assert!(matches!(
            Pattern::parse("blogs"),
            Err(RouteError::InvalidPath { .. })
        ));
        assert!(matches!(
            Pattern::parse("/blog/:"),
            Err(RouteError::InvalidPath { .. })
        ));
    }

    // ── Pattern::matches ──────────────────────────────────────────────────────

    #[test]
    fn pattern_exact_match() {
        let pat = Pattern::parse("/blogs").unwrap();
        assert!(pat.matches("/blogs").is_some());
        assert!(pat.matches("/blogs/").is_some());
        assert!(pat.matches("/posts").is_none());
    }

    #[test]
    fn pattern_param_extracts_values() {
        let pat = Pattern::parse("/user/:id/blog/:blog_id").unwrap();
        let params = pat.matches("/user/7/blog/99").unwrap();
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get("blog_id"), Some("99"));
        assert!(pat.matches("/user/7/blog").is_none());
        assert!(pat.matches("/users/7/blog/99").is_none());
    }

    #[test]
    fn pattern_param_values_are_decoded() {
        let pat = Pattern::parse("/tag/:name").unwrap();
        assert_eq!(pat.matches("/tag/a%20b").unwrap().get("name"), Some("a b"));
        assert_eq!(pat.matches("/tag/c++").unwrap().get("name"), Some("c++"));
    }

    // ── Router ────────────────────────────────────────────────────────────────

    #[test]
    fn router_len_increments_on_add() {
        let mut router = Router::new();
        assert!(router.is_empty());
        router.get("/a", Signature::new("a"), ok).unwrap();
        router.post("/b", Signature::new("b"), ok).unwrap();
        assert_eq!(router.len(), 2);
    }

    #[tokio::test]
    async fn router_empty_returns_404() {
        let router = Router::new();
        assert!(router.dispatch(make_request("GET", "/")).await.is_none());
        let res = router.route(make_request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn router_get_does_not_match_post() {
        let mut router = Router::new();
        router.get("/hello", Signature::new("hello"), ok).unwrap();
        assert_eq!(
            router.route(make_request("GET", "/hello")).await.status(),
            StatusCode::Ok
        );
        assert_eq!(
            router.route(make_request("POST", "/hello")).await.status(),
            StatusCode::NotFound
        );
    }

    #[tokio::test]
    async fn router_reregistration_replaces_handler() {
        let mut router = Router::new();
        router.get("/path", Signature::new("first"), ok).unwrap();
        router.get("/path/", Signature::new("second"), created).unwrap();
        assert_eq!(router.len(), 1);

        let res = router.route(make_request("GET", "/path")).await;
        assert_eq!(res.status(), StatusCode::Created);
    }

    #[tokio::test]
    async fn router_first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/blog/:id", Signature::new("by_id").param("id"), ok).unwrap();
        router.get("/blog/new", Signature::new("new"), created).unwrap();

        let res = router.route(make_request("GET", "/blog/new")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn router_maps_errors_to_statuses() {
        let mut router = Router::new();
        router
            .post("/signin", Signature::new("signin").keyword("email"), ok)
            .unwrap();
        router
            .get("/boom", Signature::new("boom"), |_args: Args| async {
                Err::<Reply, _>(HandlerError::Internal("boom".into()))
            })
            .unwrap();
        router
            .get("/denied", Signature::new("denied"), |_args: Args| async {
                Err::<Reply, _>(HandlerError::from(ApiError::permission("no")))
            })
            .unwrap();

        let bad = Request::new(Method::Post, "/signin")
            .header("Content-Type", "application/json")
            .body("{}");
        let res = router.route(bad).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert_eq!(res.text(), "Missing argument: email");

        let res = router.route(make_request("GET", "/boom")).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);

        let res = router.route(make_request("GET", "/denied")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(res.text().contains("permission:forbidden"));
    }

    #[test]
    fn register_requires_a_route() {
        let mut router = Router::new();
        let err = router
            .register(Endpoint::new(Signature::new("orphan"), ok))
            .unwrap_err();
        assert!(matches!(err, RouteError::MissingRoute { handler } if handler == "orphan"));
    }

    #[test]
    fn register_all_skips_private_and_unrouted() {
        let mut router = Router::new();
        let n = router
            .register_all([
                Endpoint::new(Signature::new("index"), ok).get("/"),
                Endpoint::new(Signature::new("_helper"), ok).get("/helper"),
                Endpoint::new(Signature::new("plain"), ok),
                Endpoint::new(Signature::new("signin"), ok).post("/api/signin"),
            ])
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn register_surfaces_signature_errors() {
        let mut router = Router::new();
        let err = router
            .get("/x", Signature::new("x").request().param("id"), ok)
            .unwrap_err();
        assert!(matches!(
            err,
            RouteError::Signature(SignatureError::RequestNotLast { .. })
        ));
        assert!(router.is_empty());
    }
}
