//! Application: an ordered collection of route entries.
//!
//! [`App`] is what the bootstrap serves. Conversion into the framework
//! router happens once, inside [`run_app`](crate::run_app); that is also
//! the single point where handlers get bound to the application runtime.

// ============================================================================
// Imports
// ============================================================================

use std::future::{IntoFuture, Ready, ready};

use axum::Router;
use axum::extract::Request;
use axum::routing::{MethodFilter, any, on};
use tracing::debug;

use crate::bridge::AppHandle;
use crate::error::{Error, Result};

use super::route::{BoxHandler, MethodSpec, RouteDef, method_filter};

// ============================================================================
// App
// ============================================================================

/// A web application: route entries in registration order.
///
/// ```ignore
/// let app = App::new().add_routes([
///     get("/", index),
///     websocket("/ws", talk),
/// ]);
/// run_app(app, ServeConfig::default()).await?;
/// ```
#[derive(Debug, Default)]
pub struct App {
    routes: Vec<RouteDef>,
}

impl App {
    /// Creates an empty application.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends route entries, preserving order.
    #[must_use]
    pub fn add_routes(mut self, routes: impl IntoIterator<Item = RouteDef>) -> Self {
        self.routes.extend(routes);
        self
    }

    /// Returns the number of registered routes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Converts the route table into a framework router, binding every
    /// handler to the given application runtime.
    ///
    /// Entries sharing a path merge into one dispatch node; registering the
    /// same method twice on one path is a routing error surfaced by the
    /// framework (panic at mount, as the framework defines it).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMethod`] if an entry carries a method the router
    ///   cannot dispatch on
    pub(crate) fn into_router(self, app: &AppHandle) -> Result<Router> {
        let mut router = Router::new();

        for def in self.routes {
            debug!(
                method = def.method(),
                path = %def.path,
                name = def.name.as_deref().unwrap_or(""),
                "mounting route"
            );

            let RouteDef {
                method,
                path,
                handler,
                allow_head,
                ..
            } = def;

            let endpoint = mounted(handler, app.clone());

            let method_router = match method {
                MethodSpec::Any => any(endpoint),
                MethodSpec::Only(m) => {
                    let mut filter =
                        method_filter(&m).ok_or_else(|| Error::invalid_method(m.as_str()))?;
                    if m == axum::http::Method::GET && allow_head {
                        filter = filter.or(MethodFilter::HEAD);
                    }
                    on(filter, endpoint)
                }
            };

            router = router.route(&path, method_router);
        }

        Ok(router)
    }
}

impl IntoFuture for App {
    type Output = App;
    type IntoFuture = Ready<App>;

    /// An [`App`] used where an awaitable application is expected resolves
    /// to itself immediately.
    fn into_future(self) -> Self::IntoFuture {
        ready(self)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Adapts a wrapped handler into a framework endpoint closure.
fn mounted(
    handler: BoxHandler,
    app: AppHandle,
) -> impl Fn(Request) -> super::route::BoxFuture<axum::response::Response>
+ Clone
+ Send
+ Sync
+ 'static {
    move |request: Request| handler(request, app.clone())
}

// ============================================================================
// Tests
// ============================================================================
