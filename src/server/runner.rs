//! The bootstrap: [`run_app`].
//!
//! Opens the server loop, mounts the application, binds and starts every
//! derived site on the loop, prints the banner, then blocks until the
//! shutdown token fires or a site fails. Teardown runs on every exit path,
//! including cancellation of the `run_app` future itself (the loop guard's
//! drop covers that case).

// ============================================================================
// Imports
// ============================================================================

use std::future::IntoFuture;

use axum::Router;
use futures_util::future::select_all;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::bridge::{AppHandle, Remote, ServerLoop};
use crate::error::{Error, Result};
use crate::routing::App;

use super::config::{ServeConfig, ServeOptions};
use super::site::{ListenTarget, Site};

// ============================================================================
// run_app
// ============================================================================

/// Serves an application until shut down.
///
/// Accepts the application directly or anything that resolves to one, so a
/// future building the app works the same as the app itself:
///
/// ```ignore
/// run_app(make_app(), ServeConfig::new().port(8080)).await?;
/// ```
///
/// Blocks until the configured shutdown token is cancelled or a site stops
/// on its own; either way every site is wound down and the server loop is
/// closed before this returns.
///
/// # Errors
///
/// - [`Error::Config`] if called outside an async runtime
/// - [`Error::Bind`] if any endpoint cannot be bound
/// - [`Error::Serve`] if a site fails while serving
/// - [`Error::InvalidMethod`] if the application carries an unmountable route
pub async fn run_app<A>(app: A, config: ServeConfig) -> Result<()>
where
    A: IntoFuture<Output = App>,
{
    let handle = AppHandle::try_current()?;
    let server_loop = ServerLoop::open()?;

    let result = serve(&server_loop, app.into_future().await, config, handle).await;

    server_loop.close().await;
    result
}

// ============================================================================
// Serve Flow
// ============================================================================

/// One site in flight: display name plus its completion channel.
type RunningSite = (String, oneshot::Receiver<Result<()>>);

/// Mounts, binds, serves, and winds down. The caller closes the loop.
async fn serve(
    server_loop: &ServerLoop,
    app: App,
    config: ServeConfig,
    handle: AppHandle,
) -> Result<()> {
    let (targets, options) = config.into_parts();

    let mut router = app.into_router(&handle)?;
    if options.access_log {
        router = router.layer(TraceLayer::new_for_http());
    }

    let shutdown = options.shutdown.clone().unwrap_or_default();
    let remote = server_loop.remote()?;

    let mut sites = Vec::with_capacity(targets.len());
    let started = start_sites(&remote, targets, router, &options, &shutdown, &mut sites).await;

    let outcome = match started {
        Err(e) => Err(e),
        Ok(()) => {
            announce(&options, &sites);
            wait(&shutdown, &mut sites).await
        }
    };

    // Wind-down runs regardless of how serving ended.
    shutdown.cancel();
    if timeout(options.shutdown_timeout, drain(&mut sites))
        .await
        .is_err()
    {
        warn!("sites did not stop within the shutdown timeout");
    }

    outcome
}

/// Binds and starts every target on the server loop, in order.
///
/// Stops at the first bind failure; sites already started are wound down by
/// the caller's cleanup path.
async fn start_sites(
    remote: &Remote,
    targets: Vec<ListenTarget>,
    router: Router,
    options: &ServeOptions,
    shutdown: &CancellationToken,
    sites: &mut Vec<RunningSite>,
) -> Result<()> {
    for target in targets {
        let bind = options.bind.clone();
        let tls = options.tls.clone();
        let router = router.clone();
        let token = shutdown.clone();

        let (name, done) = remote
            .run(async move {
                let site = Site::bind(target, &bind, tls).await?;
                let name = site.name().to_owned();
                let done = site.start(router, token);
                Ok::<_, Error>((name, done))
            })
            .await??;

        sites.push((name, done));
    }

    Ok(())
}

/// Prints the startup banner, unless suppressed.
fn announce(options: &ServeOptions, sites: &[RunningSite]) {
    let mut names: Vec<&str> = sites.iter().map(|(name, _)| name.as_str()).collect();
    names.sort_unstable();

    info!(sites = ?names, "serving");

    if let Some(printer) = &options.printer {
        printer(&format!(
            "======== Running on {} ========\n(Press CTRL+C to quit)",
            names.join(", ")
        ));
    }
}

/// Blocks until shutdown fires or some site stops on its own.
///
/// A site that stops early is removed from the running set; its error, if
/// any, becomes the serve outcome.
async fn wait(shutdown: &CancellationToken, sites: &mut Vec<RunningSite>) -> Result<()> {
    if sites.is_empty() {
        shutdown.cancelled().await;
        return Ok(());
    }

    let stopped = tokio::select! {
        () = shutdown.cancelled() => None,
        (result, index, _) = select_all(sites.iter_mut().map(|(_, done)| done)) => {
            Some((result, index))
        }
    };

    match stopped {
        None => Ok(()),
        Some((result, index)) => {
            let (name, _) = sites.swap_remove(index);
            match result {
                Ok(Ok(())) => {
                    debug!(site = %name, "site stopped");
                    Ok(())
                }
                Ok(Err(e)) => Err(e),
                // The serve task vanished without reporting; only loop
                // teardown does that.
                Err(_) => Err(Error::BridgeClosed),
            }
        }
    }
}

/// Waits for the remaining sites to report in after cancellation.
async fn drain(sites: &mut Vec<RunningSite>) {
    for (name, done) in sites.drain(..) {
        match done.await {
            Ok(Ok(())) => debug!(site = %name, "site stopped"),
            Ok(Err(e)) => warn!(site = %name, error = %e, "site stopped with error"),
            Err(_) => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use axum::extract::Request;

    use crate::routing::get;

    async fn hello(_req: Request) -> &'static str {
        "hello"
    }

    fn test_app() -> App {
        App::new().add_routes([get("/", hello)])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_token_stops_serving() {
        let token = CancellationToken::new();
        let config = ServeConfig::new()
            .host("127.0.0.1")
            .port(0)
            .quiet()
            .shutdown(token.clone());

        let server = tokio::spawn(run_app(test_app(), config));

        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("run_app should stop after cancellation")
            .expect("join");
        assert!(result.is_ok(), "unexpected error: {result:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bind_failure_is_reported() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = occupied.local_addr().expect("addr").port();

        let config = ServeConfig::new().host("127.0.0.1").port(port).quiet();
        let result = run_app(test_app(), config).await;

        assert!(matches!(result, Err(Error::Bind { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_banner_lists_sites_sorted() {
        let token = CancellationToken::new();
        let banner: &'static Mutex<String> = Box::leak(Box::new(Mutex::new(String::new())));

        let config = ServeConfig::new()
            .host("127.0.0.1")
            .port(0)
            .printer(|line| banner.lock().expect("lock").push_str(line))
            .shutdown(token.clone());

        let server = tokio::spawn(run_app(test_app(), config));
        tokio::time::sleep(Duration::from_millis(200)).await;

        {
            let text = banner.lock().expect("lock");
            assert!(
                text.starts_with("======== Running on http://127.0.0.1:"),
                "banner was: {text:?}"
            );
            assert!(text.ends_with(" ========\n(Press CTRL+C to quit)"));
        }

        token.cancel();
        server.await.expect("join").expect("serve");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_accepts_future_of_app() {
        static BUILT: AtomicBool = AtomicBool::new(false);

        let token = CancellationToken::new();
        let config = ServeConfig::new()
            .host("127.0.0.1")
            .port(0)
            .quiet()
            .shutdown(token.clone());

        let app = async {
            BUILT.store(true, Ordering::SeqCst);
            test_app()
        };

        let server = tokio::spawn(run_app(app, config));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(BUILT.load(Ordering::SeqCst));

        token.cancel();
        server.await.expect("join").expect("serve");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_outside_runtime_context_is_config_error() {
        let result = std::thread::spawn(|| AppHandle::try_current())
            .join()
            .expect("join");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
