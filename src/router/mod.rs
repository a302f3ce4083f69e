//! Request multiplexing — map hosts, paths and methods to handlers, and drive
//! the interceptor lifecycle around them.
//!
//! A [`ServeMux`] is assembled with [`ServeMuxConfig`]:
//!
//! ```rust,no_run
//! use safeweb::context::Context;
//! use safeweb::http::{Method, StatusCode};
//! use safeweb::response::SafeHtml;
//! use safeweb::router::ServeMuxConfig;
//! use safeweb::security::{hsts, static_headers};
//!
//! let mux = ServeMuxConfig::default()
//!     .intercept(hsts::Interceptor::default())
//!     .intercept(static_headers::Interceptor)
//!     .handle("/", Method::Get, |ctx: Context| async move {
//!         ctx.write(SafeHtml::from_static("<h1>hello</h1>"))
//!     })
//!     .handle("/users/:id", Method::Delete, |ctx: Context| async move {
//!         ctx.write_error(StatusCode::Forbidden)
//!     })
//!     .build();
//! ```
//!
//! For each request the mux:
//!
//! 1. finds the route (host-specific routes first, then host-less ones; the
//!    first registered match wins), or prepares a 404/405;
//! 2. runs every interceptor's `before` in registration order, stopping at
//!    the first [`Flow::Respond`];
//! 3. calls the handler if nobody responded;
//! 4. runs `commit` in reverse order on the interceptors whose `before` ran;
//! 5. encodes the response with the [`Dispatcher`] and logs the outcome.

pub mod pattern;

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::context::{Context, PathParams, Written};
use crate::http::{HttpResponse, Method, Request, StatusCode};
use crate::interceptor::{Configs, Flow, Interceptor};
use crate::response::{DefaultDispatcher, Dispatcher, Rendered, Response};

use pattern::{Pattern, normalize_host, split_host};

/// Type-erased, heap-allocated async handler that consumes a [`Context`] and returns the
/// [`Written`] proof.
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be cloned and shared across
/// threads without copying the underlying closure. In practice you never construct this
/// type directly — pass a closure or `async fn` to [`ServeMuxConfig::handle`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Written> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Written> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically via the blanket impl
/// below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Written> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Written> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Written> + Send>> {
        Box::pin((self)(ctx))
    }
}

// A single registered route binding a host + method + pattern to a handler.
#[derive(Clone)]
struct Route {
    host: Option<String>,
    method: Method,
    raw: String,
    pattern: Pattern,
    handler: Handler,
    configs: Configs,
}

enum Lookup<'a> {
    Found(&'a Route, PathParams),
    MethodNotAllowed,
    NotFound,
}

/// Builder for a [`ServeMux`].
///
/// Interceptors apply to every route, including the implicit 404/405
/// responses. The builder is `Clone`, so a shared base configuration can be
/// extended into several muxes.
#[derive(Clone)]
pub struct ServeMuxConfig {
    dispatcher: Arc<dyn Dispatcher>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    routes: Vec<Route>,
}

impl Default for ServeMuxConfig {
    fn default() -> Self {
        Self::new(DefaultDispatcher)
    }
}

impl ServeMuxConfig {
    pub fn new(dispatcher: impl Dispatcher + 'static) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            interceptors: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Appends an interceptor. Order matters: `before` runs in the order
    /// interceptors were added.
    #[must_use]
    pub fn intercept(self, interceptor: impl Interceptor + 'static) -> Self {
        self.intercept_shared(Arc::new(interceptor))
    }

    /// Appends an already shared interceptor.
    #[must_use]
    pub fn intercept_shared(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Registers `handler` for `method` requests matching `route`.
    ///
    /// `route` is a path pattern (`/users/:id`, `/static/*`) optionally
    /// prefixed with a host (`admin.example.com/users`).
    #[must_use]
    pub fn handle(self, route: &str, method: Method, handler: impl IntoHandler) -> Self {
        self.handle_with(route, method, handler, Configs::default())
    }

    /// Like [`handle`](Self::handle), with per-route interceptor
    /// configuration.
    #[must_use]
    pub fn handle_with(
        mut self,
        route: &str,
        method: Method,
        handler: impl IntoHandler,
        configs: Configs,
    ) -> Self {
        let (host, path) = split_host(route);
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            host,
            method,
            raw: route.to_owned(),
            pattern: Pattern::parse(path),
            handler,
            configs,
        });
        self
    }

    /// Freezes the configuration into a mux.
    ///
    /// # Panics
    ///
    /// Panics if the same route and method were registered twice. That is a
    /// programming error caught at startup, never while serving.
    pub fn build(self) -> ServeMux {
        let mut seen = HashSet::new();
        for route in &self.routes {
            let key = (route.host.clone(), route.pattern.clone(), route.method.clone());
            if !seen.insert(key) {
                panic!(
                    "route `{}` registered twice for method {}",
                    route.raw, route.method
                );
            }
        }
        debug!(
            routes = self.routes.len(),
            interceptors = self.interceptors.len(),
            "serve mux built"
        );
        ServeMux {
            dispatcher: self.dispatcher,
            interceptors: self.interceptors,
            routes: self.routes,
        }
    }
}

/// The request multiplexer.
///
/// Cheap to share behind an `Arc`; [`Server::serve`](crate::server::Server::serve)
/// does exactly that.
pub struct ServeMux {
    dispatcher: Arc<dyn Dispatcher>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    routes: Vec<Route>,
}

impl ServeMux {
    /// Returns the number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs the full lifecycle for `request` and returns the wire response.
    pub async fn serve(&self, request: Request) -> HttpResponse {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_owned();
        let keep_alive = request.is_keep_alive();

        let (ctx, target, configs) = match self.lookup(&request) {
            Lookup::Found(route, params) => (
                Context::with_params(request, params),
                Ok(Arc::clone(&route.handler)),
                route.configs.clone(),
            ),
            Lookup::MethodNotAllowed => (
                Context::new(request),
                Err(StatusCode::MethodNotAllowed),
                Configs::default(),
            ),
            Lookup::NotFound => (
                Context::new(request),
                Err(StatusCode::NotFound),
                Configs::default(),
            ),
        };

        let (ctx, response) = self.run(ctx, target, &configs).await;
        let wire = self.encode(ctx, response).keep_alive(keep_alive);

        info!(
            method = %method,
            path = %path,
            status = wire.status().as_u16(),
            elapsed = ?start.elapsed(),
            "request served"
        );
        wire
    }

    // A host-specific route that matches the path shadows every host-less
    // route for that path, whatever the method.
    fn lookup(&self, request: &Request) -> Lookup<'_> {
        let host = normalize_host(request.host());
        let path = request.path();
        let method = request.method();

        let host_specific = self
            .routes
            .iter()
            .filter(|r| r.host.as_deref() == Some(host.as_str()));
        let host_less = self.routes.iter().filter(|r| r.host.is_none());

        for group in [host_specific.collect::<Vec<_>>(), host_less.collect()] {
            let mut path_matched = false;
            for route in group {
                if let Some(params) = route.pattern.matches(path) {
                    if &route.method == method {
                        return Lookup::Found(route, params);
                    }
                    path_matched = true;
                }
            }
            if path_matched {
                return Lookup::MethodNotAllowed;
            }
        }

        Lookup::NotFound
    }

    async fn run(
        &self,
        mut ctx: Context,
        target: Result<Handler, StatusCode>,
        configs: &Configs,
    ) -> (Context, Response) {
        let mut ran = 0;
        let mut early = None;
        for interceptor in &self.interceptors {
            ran += 1;
            if let Flow::Respond(response) = interceptor.before(&mut ctx, configs) {
                debug!(
                    interceptor = interceptor.name(),
                    status = response.status().as_u16(),
                    "interceptor responded before handler"
                );
                early = Some(response);
                break;
            }
        }

        let written = match (early, target) {
            (Some(response), _) => ctx.write(response),
            (None, Ok(handler)) => handler(ctx).await,
            (None, Err(code)) => ctx.write_error(code),
        };

        let (mut ctx, mut response) = written.into_parts();
        for interceptor in self.interceptors[..ran].iter().rev() {
            interceptor.commit(&mut ctx, &mut response, configs);
        }
        (ctx, response)
    }

    fn encode(&self, ctx: Context, response: Response) -> HttpResponse {
        let rendered = self.dispatcher.render(response).or_else(|err| {
            error!(error = %err, "failed to render response");
            self.dispatcher
                .render(Response::Error(StatusCode::InternalServerError))
        });
        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(err) => {
                error!(error = %err, "dispatcher cannot render errors, using fallback");
                Rendered {
                    status: StatusCode::InternalServerError,
                    content_type: Some("text/plain; charset=utf-8"),
                    location: None,
                    body: StatusCode::InternalServerError
                        .canonical_reason()
                        .as_bytes()
                        .to_vec(),
                }
            }
        };

        let mut headers = ctx.into_headers();
        match rendered.content_type {
            Some(content_type) => headers.set("Content-Type", content_type),
            None => {
                headers.remove("content-type");
            }
        }
        if let Some(location) = rendered.location {
            headers.set("Location", location);
        }

        let mut wire = HttpResponse::new(rendered.status).body_bytes(rendered.body);
        for (name, value) in headers.iter() {
            wire.add_header(name, value);
        }
        wire
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs;
    use crate::response::SafeHtml;
    use crate::test_utils::{get, init_tracing, ok_html, request, text};
    use std::sync::Mutex;

    /// Records lifecycle events and optionally rejects.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        reject: bool,
    }

    impl Interceptor for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn before(&self, ctx: &mut Context, configs: &Configs) -> Flow {
            let tag = configs.find::<&'static str>().copied().unwrap_or("-");
            self.log
                .lock()
                .unwrap()
                .push(format!("before {} {tag}", self.name));
            ctx.headers_mut()
                .add("X-Seen", self.name)
                .expect("valid header");
            if self.reject {
                Flow::reject(StatusCode::Forbidden)
            } else {
                Flow::Continue
            }
        }

        fn commit(&self, _ctx: &mut Context, response: &mut Response, _configs: &Configs) {
            self.log.lock().unwrap().push(format!(
                "commit {} {}",
                self.name,
                response.status().as_u16()
            ));
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>, reject: bool) -> Recorder {
        Recorder {
            name,
            log: Arc::clone(log),
            reject,
        }
    }

    #[tokio::test]
    async fn routes_by_method_and_path() {
        init_tracing();
        let mux = ServeMuxConfig::default()
            .handle("/a", Method::Get, ok_html)
            .handle("/users/:id", Method::Get, |ctx: Context| async move {
                let id = ctx.params().get("id").unwrap_or_default().to_owned();
                ctx.write(SafeHtml::escape(&id))
            })
            .build();
        assert_eq!(mux.len(), 2);

        let res = mux.serve(get("/a")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(
            res.headers().get("content-type"),
            Some("text/html; charset=utf-8")
        );

        let res = mux.serve(get("/users/a&b")).await;
        assert_eq!(text(&res), "a&amp;b");

        assert_eq!(
            mux.serve(request("POST", "/a", &[], "")).await.status(),
            StatusCode::MethodNotAllowed
        );
        assert_eq!(mux.serve(get("/nope")).await.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn host_specific_routes_win() {
        let mux = ServeMuxConfig::default()
            .handle("/", Method::Get, ok_html)
            .handle("Admin.Example.com/", Method::Get, |ctx: Context| async move {
                ctx.write(SafeHtml::from_static("admin"))
            })
            .build();

        let res = mux
            .serve(request("GET", "/", &[("Host", "admin.example.com:8080")], ""))
            .await;
        assert_eq!(text(&res), "admin");
        let res = mux
            .serve(request("GET", "/", &[("Host", "www.example.com")], ""))
            .await;
        assert_eq!(text(&res), "ok");
    }

    #[tokio::test]
    async fn host_route_shadows_host_less_route_for_other_methods() {
        let mux = ServeMuxConfig::default()
            .handle("admin.example.com/x", Method::Get, |ctx: Context| async move {
                ctx.write(SafeHtml::from_static("admin"))
            })
            .handle("/x", Method::Post, |ctx: Context| async move {
                ctx.write(SafeHtml::from_static("public"))
            })
            .build();

        let admin = [("Host", "admin.example.com")];
        let res = mux.serve(request("POST", "/x", &admin, "")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        let res = mux.serve(request("GET", "/x", &admin, "")).await;
        assert_eq!(text(&res), "admin");
        let res = mux.serve(request("POST", "/x", &[("Host", "www.example.com")], "")).await;
        assert_eq!(text(&res), "public");
        // Paths the host routes do not cover still fall through.
        let res = mux.serve(request("GET", "/y", &admin, "")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_route_panics() {
        let _ = ServeMuxConfig::default()
            .handle("/a", Method::Get, ok_html)
            .handle("/a/", Method::Get, ok_html)
            .build();
    }

    #[test]
    fn same_path_different_methods_is_fine() {
        let mux = ServeMuxConfig::default()
            .handle("/a", Method::Get, ok_html)
            .handle("/a", Method::Post, ok_html)
            .build();
        assert_eq!(mux.len(), 2);
    }

    #[tokio::test]
    async fn lifecycle_order_and_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handled = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&handled);
        let mux = ServeMuxConfig::default()
            .intercept(recorder("one", &log, false))
            .intercept(recorder("two", &log, true))
            .intercept(recorder("three", &log, false))
            .handle_with(
                "/",
                Method::Get,
                move |ctx: Context| {
                    let flag = Arc::clone(&flag);
                    async move {
                        *flag.lock().unwrap() = true;
                        ctx.write(SafeHtml::from_static("handler"))
                    }
                },
                configs!["route-cfg"],
            )
            .build();

        let res = mux.serve(get("/")).await;
        assert_eq!(res.status(), StatusCode::Forbidden);
        assert!(!*handled.lock().unwrap());
        assert_eq!(
            res.headers().get_all("x-seen").collect::<Vec<_>>(),
            vec!["one", "two"]
        );
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "before one route-cfg",
                "before two route-cfg",
                "commit two 403",
                "commit one 403",
            ]
        );
    }

    #[tokio::test]
    async fn not_found_runs_interceptors() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mux = ServeMuxConfig::default()
            .intercept(recorder("one", &log, false))
            .build();
        let res = mux.serve(get("/missing")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(text(&res), "Not Found");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["before one -", "commit one 404"]
        );
    }

    #[tokio::test]
    async fn dispatch_failure_becomes_500() {
        let mux = ServeMuxConfig::default()
            .handle("/", Method::Get, |ctx: Context| async move {
                ctx.redirect("javascript:alert(1)", StatusCode::Found)
            })
            .build();
        let res = mux.serve(get("/")).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
        assert_eq!(res.headers().get("location"), None);
    }

    #[tokio::test]
    async fn dispatcher_content_type_overrides_handler() {
        let mux = ServeMuxConfig::default()
            .handle("/", Method::Get, |mut ctx: Context| async move {
                ctx.headers_mut().set("Content-Type", "text/html").unwrap();
                ctx.write(Response::Json(serde_json::json!([1])))
            })
            .build();
        let res = mux.serve(get("/")).await;
        assert_eq!(
            res.headers().get_all("content-type").collect::<Vec<_>>(),
            vec!["application/json; charset=utf-8"]
        );
        assert_eq!(text(&res), ")]}',\n[1]");
    }

    #[tokio::test]
    async fn redirect_sets_location_and_cookies_flatten() {
        let mux = ServeMuxConfig::default()
            .handle("/", Method::Get, |mut ctx: Context| async move {
                ctx.set_cookie(crate::http::Cookie::new("seen", "1").unwrap());
                ctx.redirect("/next", StatusCode::SeeOther)
            })
            .build();
        let res = mux.serve(get("/")).await;
        assert_eq!(res.status(), StatusCode::SeeOther);
        assert_eq!(res.headers().get("location"), Some("/next"));
        assert!(res.headers().get("set-cookie").unwrap().starts_with("seen=1;"));
    }
}
