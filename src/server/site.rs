//! Listen targets and bound sites.
//!
//! A [`ListenTarget`] names one endpoint the bootstrap should serve on; a
//! [`Site`] is that endpoint after binding. Binding and starting always
//! happen on the server loop.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::{TcpSocket, lookup_host};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};

// ============================================================================
// ListenTarget
// ============================================================================

/// One endpoint to serve on.
///
/// Replaces duck-typed host/path/socket arguments with an explicit
/// discriminated type; see [`ServeConfig`](crate::ServeConfig) for the
/// builder methods that produce these.
#[derive(Debug)]
pub enum ListenTarget {
    /// TCP endpoint, bound fresh.
    Tcp {
        /// Host name or address to bind.
        host: String,
        /// Port to bind.
        port: u16,
    },
    /// Unix-domain socket endpoint, bound fresh.
    #[cfg(unix)]
    Unix(std::path::PathBuf),
    /// Pre-bound TCP listener handed over by the caller.
    Socket(std::net::TcpListener),
}

impl ListenTarget {
    /// Returns `true` for TCP-family targets (the ones TLS applies to).
    #[must_use]
    pub fn is_tcp(&self) -> bool {
        match self {
            Self::Tcp { .. } | Self::Socket(_) => true,
            #[cfg(unix)]
            Self::Unix(_) => false,
        }
    }

    /// Human-readable name used in bind errors, before the actual local
    /// address is known.
    fn describe(&self) -> String {
        match self {
            Self::Tcp { host, port } => format!("{host}:{port}"),
            #[cfg(unix)]
            Self::Unix(path) => format!("unix:{}", path.display()),
            Self::Socket(_) => "pre-bound socket".to_owned(),
        }
    }
}

// ============================================================================
// BindOptions
// ============================================================================

/// Socket-level tuning applied while binding TCP targets.
#[derive(Debug, Clone)]
pub(crate) struct BindOptions {
    /// Accept backlog.
    pub backlog: u32,
    /// `SO_REUSEADDR`, when explicitly requested.
    pub reuse_address: Option<bool>,
    /// `SO_REUSEPORT`, when explicitly requested (unix only).
    pub reuse_port: Option<bool>,
}

// ============================================================================
// Site
// ============================================================================

/// A bound endpoint, ready to start serving.
pub(crate) struct Site {
    /// Display name, e.g. `http://127.0.0.1:8080` or `unix:/run/app.sock`.
    name: String,
    listener: BoundListener,
    /// TLS configuration for TCP sites.
    tls: Option<RustlsConfig>,
}

enum BoundListener {
    Tcp(tokio::net::TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

impl Site {
    /// Binds a listen target. Must run on the server loop.
    ///
    /// `tls` marks the site as TLS-terminating (TCP family only) and
    /// switches its name to the `https` scheme.
    ///
    /// # Errors
    ///
    /// - [`Error::Bind`] if resolution or binding fails
    pub(crate) async fn bind(
        target: ListenTarget,
        options: &BindOptions,
        tls: Option<RustlsConfig>,
    ) -> Result<Self> {
        let described = target.describe();
        let tls = if target.is_tcp() { tls } else { None };
        let scheme = if tls.is_some() { "https" } else { "http" };

        match target {
            ListenTarget::Tcp { host, port } => {
                let addr = resolve(&host, port)
                    .await
                    .map_err(|e| Error::bind(&described, e))?;
                let listener =
                    bind_tcp(addr, options).map_err(|e| Error::bind(&described, e))?;
                let local = listener.local_addr().map_err(|e| Error::bind(&described, e))?;

                debug!(addr = %local, "TCP site bound");

                Ok(Self {
                    name: format!("{scheme}://{local}"),
                    listener: BoundListener::Tcp(listener),
                    tls,
                })
            }

            #[cfg(unix)]
            ListenTarget::Unix(path) => {
                let listener = tokio::net::UnixListener::bind(&path)
                    .map_err(|e| Error::bind(&described, e))?;

                debug!(path = %path.display(), "unix site bound");

                Ok(Self {
                    name: format!("unix:{}", path.display()),
                    listener: BoundListener::Unix(listener),
                    tls: None,
                })
            }

            ListenTarget::Socket(std_listener) => {
                std_listener
                    .set_nonblocking(true)
                    .map_err(|e| Error::bind(&described, e))?;
                let listener = tokio::net::TcpListener::from_std(std_listener)
                    .map_err(|e| Error::bind(&described, e))?;
                let local = listener.local_addr().map_err(|e| Error::bind(&described, e))?;

                debug!(addr = %local, "pre-bound site adopted");

                Ok(Self {
                    name: format!("{scheme}://{local}"),
                    listener: BoundListener::Tcp(listener),
                    tls,
                })
            }
        }
    }

    /// Returns the site's display name.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Starts serving. Must run on the server loop.
    ///
    /// The returned channel yields the serve outcome once the site stops —
    /// normally after `shutdown` fires, or early on a transport error.
    pub(crate) fn start(
        self,
        router: Router,
        shutdown: CancellationToken,
    ) -> oneshot::Receiver<Result<()>> {
        let (done_tx, done_rx) = oneshot::channel();
        let name = self.name;

        info!(site = %name, "site started");

        match self.listener {
            BoundListener::Tcp(listener) => match self.tls {
                Some(tls) => serve_tls(listener, tls, router, shutdown, name, done_tx),
                None => {
                    tokio::spawn(async move {
                        let result = axum::serve(listener, router)
                            .with_graceful_shutdown(shutdown.cancelled_owned())
                            .await;
                        let _ = done_tx.send(result.map_err(|e| Error::serve(&name, e.to_string())));
                    });
                }
            },

            #[cfg(unix)]
            BoundListener::Unix(listener) => {
                tokio::spawn(async move {
                    let result = axum::serve(listener, router)
                        .with_graceful_shutdown(shutdown.cancelled_owned())
                        .await;
                    let _ = done_tx.send(result.map_err(|e| Error::serve(&name, e.to_string())));
                });
            }
        }

        done_rx
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolves a host/port pair to the first usable address.
async fn resolve(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    lookup_host((host, port)).await?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("host {host} resolved to no addresses"),
        )
    })
}

/// Binds a TCP listener with the configured socket options.
fn bind_tcp(addr: SocketAddr, options: &BindOptions) -> std::io::Result<tokio::net::TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    if let Some(reuse) = options.reuse_address {
        socket.set_reuseaddr(reuse)?;
    }
    #[cfg(unix)]
    if let Some(reuse) = options.reuse_port {
        socket.set_reuseport(reuse)?;
    }

    socket.bind(addr)?;
    socket.listen(options.backlog)
}

/// Spawns a TLS serve task plus its shutdown watcher.
fn serve_tls(
    listener: tokio::net::TcpListener,
    tls: RustlsConfig,
    router: Router,
    shutdown: CancellationToken,
    name: String,
    done_tx: oneshot::Sender<Result<()>>,
) {
    let std_listener = match listener.into_std() {
        Ok(l) => l,
        Err(e) => {
            let _ = done_tx.send(Err(Error::bind(&name, e)));
            return;
        }
    };

    let handle = axum_server::Handle::new();

    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.cancelled().await;
            handle.graceful_shutdown(None);
        }
    });

    tokio::spawn(async move {
        let result = axum_server::from_tcp_rustls(std_listener, tls)
            .handle(handle)
            .serve(router.into_make_service())
            .await;
        let _ = done_tx.send(result.map_err(|e| Error::serve(&name, e.to_string())));
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> BindOptions {
        BindOptions {
            backlog: 128,
            reuse_address: None,
            reuse_port: None,
        }
    }

    #[tokio::test]
    async fn test_bind_tcp_ephemeral() {
        let target = ListenTarget::Tcp {
            host: "127.0.0.1".into(),
            port: 0,
        };
        let site = Site::bind(target, &options(), None).await.expect("bind");

        assert!(site.name().starts_with("http://127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_bind_prebound_socket() {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").expect("std bind");
        let port = std_listener.local_addr().expect("addr").port();

        let site = Site::bind(ListenTarget::Socket(std_listener), &options(), None)
            .await
            .expect("bind");
        assert_eq!(site.name(), &format!("http://127.0.0.1:{port}"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bind_unix() {
        let dir = std::env::temp_dir().join(format!("loopbridge-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("site.sock");
        let _ = std::fs::remove_file(&path);

        let site = Site::bind(ListenTarget::Unix(path.clone()), &options(), None)
            .await
            .expect("bind");
        assert_eq!(site.name(), &format!("unix:{}", path.display()));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_bind_conflict_fails() {
        let first = std::net::TcpListener::bind("127.0.0.1:0").expect("std bind");
        let port = first.local_addr().expect("addr").port();

        let target = ListenTarget::Tcp {
            host: "127.0.0.1".into(),
            port,
        };
        let result = Site::bind(target, &options(), None).await;
        assert!(matches!(result, Err(Error::Bind { .. })));
    }

    #[test]
    fn test_target_is_tcp() {
        assert!(
            ListenTarget::Tcp {
                host: "h".into(),
                port: 1
            }
            .is_tcp()
        );
        #[cfg(unix)]
        assert!(!ListenTarget::Unix("/tmp/x.sock".into()).is_tcp());
    }
}
