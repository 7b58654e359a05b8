//! The arbiter: singleton root supervisor.
//!
//! The arbiter runs in the main thread of the main process. It owns the
//! mailbox server every actor connects back to, proxies every
//! inter-actor message, keeps the directory of actors and monitors, and
//! drives graceful shutdown on SIGTERM/SIGINT.

pub mod core;
pub mod error;
pub mod global;
pub mod handle;

pub use self::core::{Arbiter, Shutdown};
pub use error::ArbiterError;
pub use global::{get_arbiter, init_arbiter, teardown_arbiter};
pub use handle::{ArbiterHandle, SpawnRequest};

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use tokio::sync::watch;
use tracing::{error, info};

// Layer 3: Internal module imports
use crate::system::{ExitCode, RuntimeConfig};

/// Run an arbiter on the calling thread until shutdown.
///
/// This is the loader entry: it builds the arbiter's own event loop,
/// installs signal handling (SIGTERM/SIGINT stop the system, SIGHUP
/// fires the reload hook), registers the process-wide handle, and maps
/// the outcome to an exit code.
pub fn run(config: RuntimeConfig) -> ExitCode {
    if let Err(error) = config.validate() {
        error!(%error, "invalid runtime configuration");
        return ExitCode::Config;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "cannot build arbiter runtime");
            return ExitCode::Internal;
        }
    };

    let outcome = runtime.block_on(async move {
        let (arbiter, handle) = Arbiter::bind(config).await?;
        init_arbiter(handle.clone())?;

        let (signal_tx, signal_rx) = watch::channel(false);
        spawn_signal_task(signal_tx, handle.clone());

        let shutdown = arbiter.with_shutdown(signal_rx).serve().await;
        teardown_arbiter();
        shutdown
    });

    match outcome {
        Ok(Shutdown::Graceful) => {
            info!("arbiter exited");
            ExitCode::Ok
        }
        Ok(Shutdown::Forced) => {
            error!("graceful timeout exceeded, children were force-killed");
            ExitCode::Forced
        }
        Err(error) if error.is_config() => {
            error!(%error, "configuration error");
            ExitCode::Config
        }
        Err(error) => {
            error!(%error, "arbiter failed");
            ExitCode::Internal
        }
    }
}

#[cfg(unix)]
fn spawn_signal_task(signal_tx: watch::Sender<bool>, handle: ArbiterHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut term = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(error) => {
                error!(%error, "cannot install SIGTERM handler");
                return;
            }
        };
        let mut int = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(error) => {
                error!(%error, "cannot install SIGINT handler");
                return;
            }
        };
        let mut hup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(error) => {
                error!(%error, "cannot install SIGHUP handler");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = term.recv() => {
                    info!("SIGTERM received, shutting down");
                    let _ = signal_tx.send(true);
                }
                _ = int.recv() => {
                    info!("SIGINT received, shutting down");
                    let _ = signal_tx.send(true);
                }
                _ = hup.recv() => {
                    info!("SIGHUP received, firing reload");
                    handle.fire_reload();
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_signal_task(signal_tx: watch::Sender<bool>, _handle: ArbiterHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = signal_tx.send(true);
        }
    });
}
