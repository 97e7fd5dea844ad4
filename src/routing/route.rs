//! Route definitions and per-verb helper constructors.
//!
//! A [`RouteDef`] is an immutable `(method, path, handler, options)` entry.
//! Handlers take the framework request and return anything convertible to a
//! response; the calling-convention conversion onto the application runtime
//! happens later, when the defs are mounted (see
//! [`App::add_routes`](crate::App::add_routes) and the bootstrap).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodFilter;
use tracing::error;

use crate::bridge::AppHandle;
use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Boxed response future.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A mounted handler: invoked by the dispatch loop with the request and the
/// application-runtime handle to bridge through.
pub(crate) type BoxHandler = Arc<dyn Fn(Request, AppHandle) -> BoxFuture<Response> + Send + Sync>;

/// Which requests a route entry answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MethodSpec {
    /// A single HTTP method.
    Only(Method),
    /// Every method (the `view` helper).
    Any,
}

/// Maps a method to its router filter.
///
/// `None` for methods the router cannot dispatch on (`CONNECT`, extension
/// methods).
pub(crate) fn method_filter(method: &Method) -> Option<MethodFilter> {
    match *method {
        Method::GET => Some(MethodFilter::GET),
        Method::POST => Some(MethodFilter::POST),
        Method::PUT => Some(MethodFilter::PUT),
        Method::PATCH => Some(MethodFilter::PATCH),
        Method::DELETE => Some(MethodFilter::DELETE),
        Method::HEAD => Some(MethodFilter::HEAD),
        Method::OPTIONS => Some(MethodFilter::OPTIONS),
        Method::TRACE => Some(MethodFilter::TRACE),
        _ => None,
    }
}

// ============================================================================
// RouteDef
// ============================================================================

/// One route-table entry: method, path pattern, handler, options.
///
/// Immutable once constructed apart from the fluent option setters, which
/// consume and return the def. Consumed by
/// [`App::add_routes`](crate::App::add_routes).
pub struct RouteDef {
    /// Method specification.
    pub(crate) method: MethodSpec,
    /// Path pattern, router syntax (e.g. `/users/{id}`).
    pub(crate) path: String,
    /// The wrapped handler.
    pub(crate) handler: BoxHandler,
    /// Optional route name (metadata only).
    pub(crate) name: Option<String>,
    /// Whether a GET entry also answers HEAD.
    pub(crate) allow_head: bool,
}

impl RouteDef {
    /// Sets the route name.
    ///
    /// Carried as metadata; the router has no URL reversal.
    #[inline]
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Controls whether a GET route also answers HEAD requests.
    ///
    /// Defaults to `true`. Ignored for non-GET entries.
    #[inline]
    #[must_use]
    pub fn allow_head(mut self, allow: bool) -> Self {
        self.allow_head = allow;
        self
    }

    /// Returns the path pattern.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the route name, if one was set.
    #[inline]
    #[must_use]
    pub fn route_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the method name, or `"*"` for any-method entries.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        match &self.method {
            MethodSpec::Only(m) => m.as_str(),
            MethodSpec::Any => "*",
        }
    }
}

impl fmt::Debug for RouteDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDef")
            .field("method", &self.method())
            .field("path", &self.path)
            .field("name", &self.name)
            .field("allow_head", &self.allow_head)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// Wraps a plain handler into the mounted form.
///
/// The returned closure runs on the server loop; it ships the handler call
/// to the application runtime and waits for the response. A panicking
/// handler is reported and answered with a 500.
fn wrap_handler<H, Fut, R>(handler: H) -> BoxHandler
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    let handler = Arc::new(handler);

    Arc::new(move |request: Request, app: AppHandle| {
        let handler = Arc::clone(&handler);

        Box::pin(async move {
            let outcome = app
                .run(async move { handler(request).await.into_response() })
                .await;

            match outcome {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "bridged handler failed");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        })
    })
}

/// Builds a route entry for a method spec. Infallible internal form backing
/// the per-verb helpers.
fn on_method<H, Fut, R>(method: MethodSpec, path: impl Into<String>, handler: H) -> RouteDef
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    RouteDef {
        method,
        path: path.into(),
        handler: wrap_handler(handler),
        name: None,
        allow_head: true,
    }
}

/// Builds a route entry for an arbitrary HTTP method.
///
/// # Errors
///
/// - [`Error::InvalidMethod`] for methods the router cannot dispatch on
///   (e.g. `CONNECT` or extension methods)
pub fn route<H, Fut, R>(method: Method, path: impl Into<String>, handler: H) -> Result<RouteDef>
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    if method_filter(&method).is_none() {
        return Err(Error::invalid_method(method.as_str()));
    }
    Ok(on_method(MethodSpec::Only(method), path, handler))
}

/// Builds a GET route entry.
///
/// Also answers HEAD requests unless disabled with
/// [`RouteDef::allow_head`]. The HTTP layer strips the body from HEAD
/// responses.
pub fn get<H, Fut, R>(path: impl Into<String>, handler: H) -> RouteDef
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    on_method(MethodSpec::Only(Method::GET), path, handler)
}

/// Builds a POST route entry.
pub fn post<H, Fut, R>(path: impl Into<String>, handler: H) -> RouteDef
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    on_method(MethodSpec::Only(Method::POST), path, handler)
}

/// Builds a PUT route entry.
pub fn put<H, Fut, R>(path: impl Into<String>, handler: H) -> RouteDef
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    on_method(MethodSpec::Only(Method::PUT), path, handler)
}

/// Builds a PATCH route entry.
pub fn patch<H, Fut, R>(path: impl Into<String>, handler: H) -> RouteDef
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    on_method(MethodSpec::Only(Method::PATCH), path, handler)
}

/// Builds a DELETE route entry.
pub fn delete<H, Fut, R>(path: impl Into<String>, handler: H) -> RouteDef
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    on_method(MethodSpec::Only(Method::DELETE), path, handler)
}

/// Builds a HEAD route entry.
pub fn head<H, Fut, R>(path: impl Into<String>, handler: H) -> RouteDef
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    on_method(MethodSpec::Only(Method::HEAD), path, handler)
}

/// Builds a route entry answering every method.
pub fn view<H, Fut, R>(path: impl Into<String>, handler: H) -> RouteDef
where
    H: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    on_method(MethodSpec::Any, path, handler)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn dummy(_req: Request) -> &'static str {
        "ok"
    }

    #[test]
    fn test_verb_helpers_set_method() {
        assert_eq!(get("/a", dummy).method(), "GET");
        assert_eq!(post("/a", dummy).method(), "POST");
        assert_eq!(put("/a", dummy).method(), "PUT");
        assert_eq!(patch("/a", dummy).method(), "PATCH");
        assert_eq!(delete("/a", dummy).method(), "DELETE");
        assert_eq!(head("/a", dummy).method(), "HEAD");
        assert_eq!(view("/a", dummy).method(), "*");
    }

    #[test]
    fn test_route_generic_method() {
        let def = route(Method::OPTIONS, "/o", dummy).expect("route");
        assert_eq!(def.method(), "OPTIONS");
        assert_eq!(def.path(), "/o");
    }

    #[test]
    fn test_route_rejects_connect() {
        let result = route(Method::CONNECT, "/c", dummy);
        assert!(matches!(result, Err(Error::InvalidMethod { .. })));
    }

    #[test]
    fn test_options_fluent() {
        let def = get("/x", dummy).name("index").allow_head(false);
        assert_eq!(def.route_name(), Some("index"));
        assert!(!def.allow_head);
    }

    #[test]
    fn test_allow_head_default() {
        assert!(get("/x", dummy).allow_head);
    }

    #[test]
    fn test_debug_omits_handler() {
        let text = format!("{:?}", get("/x", dummy));
        assert!(text.contains("GET"));
        assert!(text.contains("/x"));
    }
}
