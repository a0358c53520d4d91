//! Converts operator shutdown signals into a cancellation token owned by the
//! caller of the reconciliation engine.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Returns a root shutdown token that fires on SIGINT (Ctrl-C) or, on Unix,
/// SIGTERM. The listener task exits quietly if the token is cancelled by
/// someone else first.
pub fn shutdown_on_signals() -> (CancellationToken, JoinHandle<()>) {
    let token = CancellationToken::new();
    let handle = spawn_signal_listener(token.clone());
    (token, handle)
}

pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            signal = wait_for_signal() => {
                tracing::info!(signal, "graceful shutdown requested");
                token.cancel();
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut terminate = match unix_signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(
                error = %err,
                "failed to install SIGTERM handler; listening for Ctrl-C only"
            );
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        name = wait_for_ctrl_c() => name,
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(err) = signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for Ctrl-C");
        // Without a working handler the only way out is external cancellation.
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
