//! Reload dispatch.
//!
//! # Responsibilities
//! - Carry `RestartSignal`s from the watcher to the supervisor
//! - Process them one at a time, in arrival order
//! - Report each outcome on an optional typed channel
//!
//! # Design Decisions
//! - Delivery is a rendezvous: `RestartSender::signal` only returns once the
//!   reload triggered by that signal has finished
//! - The loop ends when the sender side closes or the supervisor stops

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::lifecycle::supervisor::{ReloadError, SupervisorHandle, SupervisorState, SwapReport};
use crate::observability::metrics;

/// Zero-payload token meaning "a reload was requested".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartSignal;

/// The receiving side is gone; no further reloads will happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("restart channel closed")]
pub struct RestartClosed;

struct Delivery {
    _signal: RestartSignal,
    ack: oneshot::Sender<()>,
}

/// Create a rendezvous channel for restart signals.
pub fn restart_channel() -> (RestartSender, RestartReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (RestartSender { tx }, RestartReceiver { rx })
}

#[derive(Clone)]
pub struct RestartSender {
    tx: mpsc::Sender<Delivery>,
}

impl RestartSender {
    /// Deliver one signal and wait until the receiver finished handling it.
    pub async fn signal(&self) -> Result<(), RestartClosed> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Delivery {
                _signal: RestartSignal,
                ack,
            })
            .await
            .map_err(|_| RestartClosed)?;
        done.await.map_err(|_| RestartClosed)
    }
}

pub struct RestartReceiver {
    rx: mpsc::Receiver<Delivery>,
}

impl RestartReceiver {
    /// Wait for the next signal. `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<PendingRestart> {
        self.rx.recv().await.map(|d| PendingRestart { ack: d.ack })
    }
}

/// A received signal whose sender is still blocked.
///
/// Dropping it without calling [`PendingRestart::complete`] releases the
/// sender with [`RestartClosed`].
#[must_use = "the sender stays blocked until the restart is completed"]
pub struct PendingRestart {
    ack: oneshot::Sender<()>,
}

impl PendingRestart {
    pub fn signal(&self) -> RestartSignal {
        RestartSignal
    }

    /// Release the sender.
    pub fn complete(self) {
        let _ = self.ack.send(());
    }
}

/// Result of handling one restart signal.
#[derive(Debug)]
pub enum ReloadOutcome {
    Swapped(SwapReport),
    Failed(ReloadError),
}

/// Spawn the task that turns restart signals into supervisor swaps.
pub fn spawn_reload_loop(
    receiver: RestartReceiver,
    supervisor: SupervisorHandle,
    outcomes: Option<mpsc::UnboundedSender<ReloadOutcome>>,
) -> JoinHandle<()> {
    tokio::spawn(run_reload_loop(receiver, supervisor, outcomes))
}

async fn run_reload_loop(
    mut receiver: RestartReceiver,
    supervisor: SupervisorHandle,
    outcomes: Option<mpsc::UnboundedSender<ReloadOutcome>>,
) {
    while let Some(pending) = receiver.recv().await {
        tracing::info!("Restarting service due to config change");

        let outcome = match supervisor.swap().await {
            Ok(report) => {
                tracing::info!(
                    generation = report.generation,
                    instance_id = %report.instance_id,
                    "Service restarted successfully with new config"
                );
                metrics::record_reload("success");
                ReloadOutcome::Swapped(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Reload failed");
                metrics::record_reload("failure");
                ReloadOutcome::Failed(e)
            }
        };

        let finished = matches!(
            outcome,
            ReloadOutcome::Failed(ReloadError::NotRunning(SupervisorState::Stopped))
                | ReloadOutcome::Failed(ReloadError::Unavailable)
        );

        if let Some(tx) = &outcomes {
            let _ = tx.send(outcome);
        }
        pending.complete();

        if finished {
            tracing::info!("Supervisor stopped, reload loop exiting");
            break;
        }
    }
    tracing::debug!("Reload loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::{ConfigFormat, JsonConfigLoader, MergedConfig};
    use crate::config::source::ConfigSource;
    use crate::engine::{BuildError, CloseError, Server, ServerBuilder, StartError};
    use crate::lifecycle::startup::Bootstrapper;
    use crate::lifecycle::supervisor::{ReloadPolicy, ServiceSupervisor};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use uuid::Uuid;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct JournalBuilder {
        journal: Journal,
    }

    struct JournalServer {
        label: String,
        journal: Journal,
    }

    impl ServerBuilder for JournalBuilder {
        fn build(&self, config: &MergedConfig) -> Result<Box<dyn Server>, BuildError> {
            let label = format!("x={}", config.as_value()["x"]);
            self.journal.lock().unwrap().push(format!("build {}", label));
            Ok(Box::new(JournalServer {
                label,
                journal: self.journal.clone(),
            }))
        }
    }

    #[async_trait]
    impl Server for JournalServer {
        fn instance_id(&self) -> Uuid {
            Uuid::nil()
        }

        async fn start(&mut self) -> Result<(), StartError> {
            self.journal.lock().unwrap().push(format!("start {}", self.label));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), CloseError> {
            self.journal.lock().unwrap().push(format!("close {}", self.label));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_loop_swaps_once_per_signal_and_stops_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        std::fs::write(&path, r#"{"x": 0}"#).unwrap();
        let journal = Journal::default();

        let bootstrapper = Bootstrapper::new(
            ConfigFormat::Auto,
            ConfigSource::file(&path),
            Arc::new(JsonConfigLoader),
            Arc::new(JournalBuilder {
                journal: journal.clone(),
            }),
        );
        let mut supervisor = ServiceSupervisor::new(bootstrapper, ReloadPolicy::StartFirst);
        supervisor.initialize().await.unwrap();
        let (handle, supervisor_task) = supervisor.spawn();

        let (restart_tx, restart_rx) = restart_channel();
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let reload_task = spawn_reload_loop(restart_rx, handle.clone(), Some(outcome_tx));

        let mut generations = Vec::new();
        for x in 1..=3 {
            std::fs::write(&path, format!(r#"{{"x": {}}}"#, x)).unwrap();
            restart_tx.signal().await.unwrap();
            match outcome_rx.recv().await {
                Some(ReloadOutcome::Swapped(report)) => generations.push(report.generation),
                other => panic!("expected swap, got {:?}", other),
            }
        }
        assert_eq!(generations, vec![1, 2, 3]);
        assert_eq!(
            journal.lock().unwrap().iter().filter(|e| e.starts_with("start")).count(),
            4
        );

        handle.shutdown().await.unwrap();
        let after_shutdown = journal.lock().unwrap().len();

        // Still acknowledged, but no swap runs and the loop exits.
        restart_tx.signal().await.unwrap();
        assert!(matches!(
            outcome_rx.recv().await,
            Some(ReloadOutcome::Failed(ReloadError::NotRunning(SupervisorState::Stopped)))
        ));
        reload_task.await.unwrap();
        assert_eq!(journal.lock().unwrap().len(), after_shutdown);
        assert_eq!(restart_tx.signal().await, Err(RestartClosed));

        drop(handle);
        supervisor_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_signal_blocks_until_completed() {
        let (tx, mut rx) = restart_channel();

        let sender = tokio::spawn(async move { tx.signal().await });

        let pending = rx.recv().await.unwrap();
        assert_eq!(pending.signal(), RestartSignal);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sender.is_finished());

        pending.complete();
        assert_eq!(sender.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_dropped_pending_releases_sender() {
        let (tx, mut rx) = restart_channel();
        let sender = tokio::spawn(async move { tx.signal().await });

        drop(rx.recv().await.unwrap());
        assert_eq!(sender.await.unwrap(), Err(RestartClosed));
    }

    #[tokio::test]
    async fn test_closed_receiver_fails_fast() {
        let (tx, rx) = restart_channel();
        drop(rx);
        assert_eq!(tx.signal().await, Err(RestartClosed));
    }
}
