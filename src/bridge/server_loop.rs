//! Server loop: a dedicated event-loop thread and its remote handle.
//!
//! [`ServerLoop::open`] spawns an OS thread running a single-threaded tokio
//! runtime whose only job is to execute futures shipped over from the
//! application runtime. The guard owns the thread: closing it (or dropping
//! it) stops the dispatch loop and joins the thread, so the loop cannot
//! outlive the bootstrap call that opened it.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Name of the server-loop OS thread.
const LOOP_THREAD_NAME: &str = "loopbridge-server";

/// Grace period for tasks still running when the dispatch loop exits.
const LOOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Types
// ============================================================================

/// A unit of work shipped to the server loop.
///
/// Output delivery is the shipped future's own concern (see
/// [`Remote::run`]), so the dispatcher only ever sees `()` futures.
type LoopTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// ============================================================================
// Remote
// ============================================================================

/// Cheap-to-clone handle for submitting work to the server loop.
#[derive(Clone)]
pub struct Remote {
    task_tx: mpsc::UnboundedSender<LoopTask>,
}

impl Remote {
    /// Runs a future on the server loop and waits for its output.
    ///
    /// The calling task suspends until the loop has executed the future to
    /// completion and sent the output back.
    ///
    /// # Errors
    ///
    /// - [`Error::BridgeClosed`] if the loop has shut down before or during
    ///   the call
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (out_tx, out_rx) = oneshot::channel();

        let task: LoopTask = Box::pin(async move {
            let _ = out_tx.send(fut.await);
        });

        self.task_tx.send(task).map_err(|_| Error::BridgeClosed)?;

        out_rx.await.map_err(|_| Error::BridgeClosed)
    }

    /// Spawns a future on the server loop without waiting for it.
    ///
    /// # Errors
    ///
    /// - [`Error::BridgeClosed`] if the loop has shut down
    pub fn spawn<F>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.task_tx
            .send(Box::pin(fut))
            .map_err(|_| Error::BridgeClosed)
    }
}

// ============================================================================
// ServerLoop
// ============================================================================

/// Guard owning the server event-loop thread.
///
/// Open for the duration of one bootstrap call. Teardown happens on every
/// exit path: [`close`](Self::close) on the normal path, [`Drop`] when the
/// owning future is cancelled.
pub struct ServerLoop {
    /// Remote handle. `None` once teardown has begun.
    remote: Option<Remote>,
    /// Loop thread handle. `None` once joined.
    thread: Option<JoinHandle<()>>,
}

impl ServerLoop {
    /// Opens the bridge: spawns the loop thread and its runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the OS thread cannot be spawned
    /// - [`Error::Config`] if the loop runtime fails to build
    pub fn open() -> Result<Self> {
        let (task_tx, task_rx) = mpsc::unbounded_channel::<LoopTask>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::io::Result<()>>();

        let thread = std::thread::Builder::new()
            .name(LOOP_THREAD_NAME.into())
            .spawn(move || run_loop_thread(task_rx, ready_tx))?;

        // The thread reports runtime construction before entering the loop.
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(Error::config(format!(
                    "failed to build server-loop runtime: {e}"
                )));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::BridgeClosed);
            }
        }

        debug!("server loop opened");

        Ok(Self {
            remote: Some(Remote { task_tx }),
            thread: Some(thread),
        })
    }

    /// Returns a clone of the remote handle.
    ///
    /// # Errors
    ///
    /// - [`Error::BridgeClosed`] if teardown has already begun
    pub fn remote(&self) -> Result<Remote> {
        self.remote.clone().ok_or(Error::BridgeClosed)
    }

    /// Runs a future on the server loop and waits for its output.
    ///
    /// Convenience for [`Remote::run`].
    ///
    /// # Errors
    ///
    /// - [`Error::BridgeClosed`] if the loop has shut down
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match &self.remote {
            Some(remote) => remote.run(fut).await,
            None => Err(Error::BridgeClosed),
        }
    }

    /// Closes the bridge and joins the loop thread.
    ///
    /// Pending submissions already queued are still executed; new ones are
    /// rejected. The join runs on the blocking pool so the caller's runtime
    /// is not stalled.
    pub async fn close(mut self) {
        self.remote = None;

        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            match joined {
                Ok(Ok(())) => debug!("server loop closed"),
                Ok(Err(_)) => error!("server-loop thread panicked"),
                Err(e) => error!(error = %e, "failed to join server-loop thread"),
            }
        }
    }
}

impl Drop for ServerLoop {
    fn drop(&mut self) {
        // Backstop for cancelled bootstrap calls: dropping the sender ends
        // the dispatch loop, then the thread is joined synchronously.
        self.remote = None;

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("server-loop thread panicked during drop");
            }
        }
    }
}

// ============================================================================
// Loop Thread
// ============================================================================

/// Body of the server-loop thread.
///
/// Builds the runtime, reports readiness, then dispatches tasks until the
/// submission channel closes. Tasks still running at that point get a short
/// drain window before the runtime is torn down.
fn run_loop_thread(
    mut task_rx: mpsc::UnboundedReceiver<LoopTask>,
    ready_tx: std::sync::mpsc::Sender<std::io::Result<()>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => {
            let _ = ready_tx.send(Ok(()));
            rt
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    runtime.block_on(async move {
        while let Some(task) = task_rx.recv().await {
            tokio::spawn(task);
        }
        debug!("server-loop dispatcher finished");
    });

    // Equivalent of the final async-generator drain: give spawned tasks a
    // moment to observe shutdown, then drop the runtime.
    runtime.shutdown_timeout(LOOP_DRAIN_TIMEOUT);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_output() {
        let server_loop = ServerLoop::open().expect("open should succeed");

        let value = server_loop.run(async { 6 * 7 }).await.expect("run");
        assert_eq!(value, 42);

        server_loop.close().await;
    }

    #[tokio::test]
    async fn test_run_sees_loop_thread() {
        let server_loop = ServerLoop::open().expect("open should succeed");

        let name = server_loop
            .run(async {
                std::thread::current()
                    .name()
                    .map(str::to_owned)
                    .unwrap_or_default()
            })
            .await
            .expect("run");
        assert_eq!(name, LOOP_THREAD_NAME);

        server_loop.close().await;
    }

    #[tokio::test]
    async fn test_remote_after_close_fails() {
        let server_loop = ServerLoop::open().expect("open should succeed");
        let remote = server_loop.remote().expect("remote");
        server_loop.close().await;

        let result = remote.run(async { 1 }).await;
        assert!(matches!(result, Err(Error::BridgeClosed)));
    }

    #[tokio::test]
    async fn test_concurrent_submissions() {
        let server_loop = ServerLoop::open().expect("open should succeed");
        let remote = server_loop.remote().expect("remote");

        let mut joins = Vec::new();
        for i in 0..16u64 {
            let remote = remote.clone();
            joins.push(tokio::spawn(async move {
                remote.run(async move { i * 2 }).await
            }));
        }

        for (i, join) in joins.into_iter().enumerate() {
            let value = join.await.expect("join").expect("run");
            assert_eq!(value, (i as u64) * 2);
        }

        server_loop.close().await;
    }

    #[test]
    fn test_drop_joins_thread() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("runtime");

        rt.block_on(async {
            let server_loop = ServerLoop::open().expect("open should succeed");
            drop(server_loop);
        });
    }
}
