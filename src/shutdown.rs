//! Operator interrupt handling shared by the supervisor and login binaries.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Future resolving on Ctrl-C, or on SIGTERM where available.
///
/// The SIGTERM handler is registered when this is called, not when the
/// future is first polled. Must be called from within a tokio runtime.
/// Once registered the handlers stay installed, so a second interrupt during
/// teardown cannot kill the process before its children are stopped.
pub fn shutdown_signal() -> impl Future<Output = ()> + Send {
    #[cfg(unix)]
    let sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());

    async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match sigterm {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                    let _ = ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(err) = ctrl_c.await {
                tracing::error!(%err, "ctrl-c signal handler failed");
            }
        }
    }
}

/// Spawn a task that cancels `ct` when an interrupt arrives.
pub fn cancel_on_shutdown(ct: &CancellationToken) {
    let ct = ct.clone();
    let signal = shutdown_signal();
    tokio::spawn(async move {
        signal.await;
        info!("shutdown signal received");
        ct.cancel();
    });
}
