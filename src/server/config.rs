//! Serve configuration.
//!
//! [`ServeConfig`] collects everything the bootstrap needs besides the
//! application itself: where to listen, socket tuning, shutdown behavior,
//! and how to announce the running sites.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;

use super::site::{BindOptions, ListenTarget};

// ============================================================================
// Constants
// ============================================================================

/// Port used when hosts are given without a port, and for the default
/// wildcard site.
pub const DEFAULT_PORT: u16 = 8080;

/// Host the default wildcard site binds.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Accept backlog applied to freshly bound TCP sites.
const DEFAULT_BACKLOG: u32 = 128;

/// How long shutdown waits for sites to finish before giving up.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Printer
// ============================================================================

/// Sink for the startup banner.
pub type Printer = Box<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// ServeConfig
// ============================================================================

/// Configuration for [`run_app`](crate::run_app).
///
/// The default config serves on `0.0.0.0:8080` and prints the banner to
/// stdout. Every listen endpoint goes through one of the typed builder
/// methods ([`host`](Self::host), [`unix_path`](Self::unix_path),
/// [`listener`](Self::listener)); there is no positional guessing about
/// what kind of endpoint an argument is.
///
/// ```ignore
/// let config = ServeConfig::new()
///     .host("127.0.0.1")
///     .port(8080)
///     .shutdown(token.clone());
/// run_app(app, config).await?;
/// ```
pub struct ServeConfig {
    hosts: Vec<String>,
    port: Option<u16>,
    #[cfg(unix)]
    unix_paths: Vec<std::path::PathBuf>,
    listeners: Vec<std::net::TcpListener>,
    backlog: u32,
    reuse_address: Option<bool>,
    reuse_port: Option<bool>,
    shutdown_timeout: Duration,
    access_log: bool,
    printer: Option<Printer>,
    shutdown: Option<CancellationToken>,
    tls: Option<RustlsConfig>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            port: None,
            #[cfg(unix)]
            unix_paths: Vec::new(),
            listeners: Vec::new(),
            backlog: DEFAULT_BACKLOG,
            reuse_address: None,
            reuse_port: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            access_log: true,
            printer: Some(Box::new(|line| println!("{line}"))),
            shutdown: None,
            tls: None,
        }
    }
}

impl ServeConfig {
    /// Creates the default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host to bind. Each host becomes one TCP site on the
    /// configured [`port`](Self::port) (default 8080).
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push(host.into());
        self
    }

    /// Sets the TCP port. Also forces the default wildcard site into
    /// existence when no hosts are given, matching the everything-default
    /// case.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Adds a unix-domain socket path to bind.
    #[cfg(unix)]
    #[must_use]
    pub fn unix_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.unix_paths.push(path.into());
        self
    }

    /// Adds a pre-bound TCP listener to serve on as-is.
    #[must_use]
    pub fn listener(mut self, listener: std::net::TcpListener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Sets the accept backlog for freshly bound TCP sites.
    #[inline]
    #[must_use]
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Sets `SO_REUSEADDR` on freshly bound TCP sites.
    #[inline]
    #[must_use]
    pub fn reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = Some(reuse);
        self
    }

    /// Sets `SO_REUSEPORT` on freshly bound TCP sites (unix only; ignored
    /// elsewhere).
    #[inline]
    #[must_use]
    pub fn reuse_port(mut self, reuse: bool) -> Self {
        self.reuse_port = Some(reuse);
        self
    }

    /// Sets how long shutdown waits for sites to drain.
    #[inline]
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Toggles per-request access logging through the tracing stack.
    /// Enabled by default.
    #[inline]
    #[must_use]
    pub fn access_log(mut self, enabled: bool) -> Self {
        self.access_log = enabled;
        self
    }

    /// Replaces the banner sink. The sink receives the full banner as one
    /// string (it contains a newline).
    #[must_use]
    pub fn printer(mut self, printer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.printer = Some(Box::new(printer));
        self
    }

    /// Suppresses the startup banner entirely.
    #[inline]
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.printer = None;
        self
    }

    /// Installs an external shutdown trigger. Cancelling the token makes
    /// [`run_app`](crate::run_app) stop serving and return.
    #[inline]
    #[must_use]
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Enables TLS termination on all TCP sites.
    #[inline]
    #[must_use]
    pub fn tls(mut self, config: RustlsConfig) -> Self {
        self.tls = Some(config);
        self
    }

    /// Derives the list of endpoints to serve on.
    ///
    /// One TCP target per host; one unix target per path; one socket target
    /// per pre-bound listener. With no hosts at all, a wildcard TCP target
    /// is added when either nothing else was requested or a port was set
    /// explicitly.
    fn targets(&mut self) -> Vec<ListenTarget> {
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let mut targets = Vec::new();

        for host in self.hosts.drain(..) {
            targets.push(ListenTarget::Tcp { host, port });
        }

        #[cfg(unix)]
        let others_requested = !self.unix_paths.is_empty() || !self.listeners.is_empty();
        #[cfg(not(unix))]
        let others_requested = !self.listeners.is_empty();

        if targets.is_empty() && (!others_requested || self.port.is_some()) {
            targets.push(ListenTarget::Tcp {
                host: DEFAULT_HOST.to_owned(),
                port,
            });
        }

        #[cfg(unix)]
        for path in self.unix_paths.drain(..) {
            targets.push(ListenTarget::Unix(path));
        }

        for listener in self.listeners.drain(..) {
            targets.push(ListenTarget::Socket(listener));
        }

        targets
    }

    /// Splits the config into the derived endpoint list and the runtime
    /// options the bootstrap carries through serving.
    pub(crate) fn into_parts(mut self) -> (Vec<ListenTarget>, ServeOptions) {
        let targets = self.targets();

        let options = ServeOptions {
            bind: BindOptions {
                backlog: self.backlog,
                reuse_address: self.reuse_address,
                reuse_port: self.reuse_port,
            },
            shutdown_timeout: self.shutdown_timeout,
            access_log: self.access_log,
            printer: self.printer,
            shutdown: self.shutdown,
            tls: self.tls,
        };

        (targets, options)
    }
}

impl fmt::Debug for ServeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ServeConfig");
        s.field("hosts", &self.hosts)
            .field("port", &self.port)
            .field("listeners", &self.listeners.len())
            .field("backlog", &self.backlog)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("access_log", &self.access_log)
            .field("banner", &self.printer.is_some())
            .field("tls", &self.tls.is_some());
        #[cfg(unix)]
        s.field("unix_paths", &self.unix_paths);
        s.finish_non_exhaustive()
    }
}

// ============================================================================
// ServeOptions
// ============================================================================

/// What remains of the config once endpoints are derived.
pub(crate) struct ServeOptions {
    pub bind: BindOptions,
    pub shutdown_timeout: Duration,
    pub access_log: bool,
    pub printer: Option<Printer>,
    pub shutdown: Option<CancellationToken>,
    pub tls: Option<RustlsConfig>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn tcp_targets(targets: &[ListenTarget]) -> Vec<(String, u16)> {
        targets
            .iter()
            .filter_map(|t| match t {
                ListenTarget::Tcp { host, port } => Some((host.clone(), *port)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_default_is_wildcard_8080() {
        let (targets, _) = ServeConfig::new().into_parts();
        assert_eq!(tcp_targets(&targets), vec![("0.0.0.0".to_owned(), 8080)]);
    }

    #[test]
    fn test_hosts_share_the_port() {
        let (targets, _) = ServeConfig::new()
            .host("127.0.0.1")
            .host("::1")
            .port(9000)
            .into_parts();
        assert_eq!(
            tcp_targets(&targets),
            vec![("127.0.0.1".to_owned(), 9000), ("::1".to_owned(), 9000)]
        );
    }

    #[test]
    fn test_hosts_default_port() {
        let (targets, _) = ServeConfig::new().host("10.0.0.1").into_parts();
        assert_eq!(tcp_targets(&targets), vec![("10.0.0.1".to_owned(), 8080)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_path_alone_suppresses_wildcard() {
        let (targets, _) = ServeConfig::new().unix_path("/tmp/app.sock").into_parts();
        assert_eq!(targets.len(), 1);
        assert!(matches!(&targets[0], ListenTarget::Unix(p) if p.ends_with("app.sock")));
    }

    #[cfg(unix)]
    #[test]
    fn test_explicit_port_restores_wildcard() {
        let (targets, _) = ServeConfig::new()
            .unix_path("/tmp/app.sock")
            .port(8443)
            .into_parts();

        assert_eq!(tcp_targets(&targets), vec![("0.0.0.0".to_owned(), 8443)]);
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_listener_alone_suppresses_wildcard() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let (targets, _) = ServeConfig::new().listener(listener).into_parts();

        assert_eq!(targets.len(), 1);
        assert!(matches!(&targets[0], ListenTarget::Socket(_)));
    }

    #[test]
    fn test_tcp_targets_come_first() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let (targets, _) = ServeConfig::new()
            .host("127.0.0.1")
            .listener(listener)
            .into_parts();

        assert!(matches!(&targets[0], ListenTarget::Tcp { .. }));
        assert!(matches!(&targets[1], ListenTarget::Socket(_)));
    }

    #[test]
    fn test_quiet_drops_printer() {
        let (_, options) = ServeConfig::new().quiet().into_parts();
        assert!(options.printer.is_none());
    }

    #[test]
    fn test_options_carry_tuning() {
        let (_, options) = ServeConfig::new()
            .backlog(16)
            .reuse_address(true)
            .shutdown_timeout(Duration::from_secs(5))
            .access_log(false)
            .into_parts();

        assert_eq!(options.bind.backlog, 16);
        assert_eq!(options.bind.reuse_address, Some(true));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(5));
        assert!(!options.access_log);
    }

    proptest! {
        /// Every config derives at least one endpoint unless the caller
        /// asked only for non-TCP endpoints without a port.
        #[test]
        fn prop_hosts_map_one_to_one(
            hosts in proptest::collection::vec("[a-z]{1,8}", 0..4),
            port in proptest::option::of(1024u16..u16::MAX),
        ) {
            let mut config = ServeConfig::new();
            for host in &hosts {
                config = config.host(host.clone());
            }
            if let Some(p) = port {
                config = config.port(p);
            }

            let (targets, _) = config.into_parts();
            let tcp = tcp_targets(&targets);

            if hosts.is_empty() {
                prop_assert_eq!(tcp, vec![("0.0.0.0".to_owned(), port.unwrap_or(8080))]);
            } else {
                let expected: Vec<_> = hosts
                    .iter()
                    .map(|h| (h.clone(), port.unwrap_or(8080)))
                    .collect();
                prop_assert_eq!(tcp, expected);
            }
        }
    }
}
