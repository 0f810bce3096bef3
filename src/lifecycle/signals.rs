//! OS signal handling.
//!
//! SIGINT (Ctrl+C) and SIGTERM both request termination. There is no
//! signal-driven reload; reloads come from the config watcher.

use std::fmt;

use tokio::signal;

/// Signal that ended the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminationSignal::Interrupt => "SIGINT",
            TerminationSignal::Terminate => "SIGTERM",
        })
    }
}

/// Wait for the first termination request.
pub async fn wait_for_termination() -> std::io::Result<TerminationSignal> {
    let received = tokio::select! {
        result = wait_ctrl_c() => result?,
        result = wait_sigterm() => result?,
    };

    tracing::info!(signal = %received, "Termination signal received");
    Ok(received)
}

async fn wait_ctrl_c() -> std::io::Result<TerminationSignal> {
    signal::ctrl_c().await.map_err(|e| {
        tracing::error!(error = %e, "Error handling Ctrl+C signal");
        e
    })?;
    Ok(TerminationSignal::Interrupt)
}

#[cfg(unix)]
async fn wait_sigterm() -> std::io::Result<TerminationSignal> {
    let mut handler = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        tracing::error!(error = %e, "Failed to install SIGTERM handler");
        e
    })?;
    handler.recv().await;
    Ok(TerminationSignal::Terminate)
}

#[cfg(not(unix))]
async fn wait_sigterm() -> std::io::Result<TerminationSignal> {
    std::future::pending().await
}
