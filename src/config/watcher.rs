//! Configuration file watcher for hot reload.
//!
//! # Responsibilities
//! - Register every WatchSet file with the OS notification backend
//! - Classify events; content writes and creates are restart triggers
//! - Emit one `RestartSignal` per trigger, or one per burst when a
//!   debounce window is configured
//!
//! # Debounce contract
//! With a window `W > 0`, a trigger opens a window and every further trigger
//! arriving within `W` of the previous one extends it. A single signal is
//! emitted `W` after the last trigger of the burst; the reload then reads the
//! files as they are at that point (last write wins). `W = 0` disables
//! coalescing: N triggers produce N signals.
//!
//! # Backpressure
//! Raw events travel over a bounded channel. While a reload holds the
//! restart rendezvous the buffer fills up and the backend thread blocks in
//! its callback until the consumer catches up.

use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::source::WatchSet;
use crate::lifecycle::reload::RestartSender;
use crate::observability::metrics;

/// Raw item produced by a notification source.
pub type WatchEventResult = notify::Result<Event>;

/// Raw events buffered between the backend thread and the consumer task.
pub const EVENT_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to create file watcher: {0}")]
    Init(#[source] notify::Error),
    #[error("file watcher error: {0}")]
    Source(#[source] notify::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherOptions {
    /// Coalescing window; zero disables debouncing.
    pub debounce: Duration,
}

/// Whether an event should trigger a reload.
pub fn is_restart_trigger(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}

/// A watcher that turns config file changes into restart signals.
pub struct ConfigWatcher {
    backend: Option<RecommendedWatcher>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    errors: Option<mpsc::UnboundedReceiver<WatchError>>,
}

impl ConfigWatcher {
    /// Watch the files of `watch_set` with the platform backend.
    ///
    /// A file that cannot be registered is logged and skipped.
    pub fn start(
        watch_set: &WatchSet,
        restart: RestartSender,
        options: WatcherOptions,
    ) -> Result<Self, WatchError> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        // The callback runs on the backend's own thread, outside the runtime.
        let mut backend = RecommendedWatcher::new(
            move |res: WatchEventResult| {
                let _ = event_tx.blocking_send(res);
            },
            notify::Config::default(),
        )
        .map_err(WatchError::Init)?;

        let mut watched = 0usize;
        for path in watch_set.iter() {
            match backend.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "Watching config file");
                    watched += 1;
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Error watching config file");
                }
            }
        }
        if watched == 0 {
            tracing::warn!("No config files are being watched");
        }

        let mut watcher = Self::with_source(event_rx, restart, options);
        watcher.backend = Some(backend);
        Ok(watcher)
    }

    /// Consume events from an arbitrary source instead of the OS backend.
    pub fn with_source(
        events: mpsc::Receiver<WatchEventResult>,
        restart: RestartSender,
        options: WatcherOptions,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        let event_loop = EventLoop {
            events,
            restart,
            debounce: options.debounce,
            errors: errors_tx,
            stop: stop_rx,
        };
        let task = tokio::spawn(event_loop.run());

        Self {
            backend: None,
            stop: Some(stop_tx),
            task: Some(task),
            errors: Some(errors_rx),
        }
    }

    /// Take the channel on which source errors are published.
    pub fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<WatchError>> {
        self.errors.take()
    }

    /// Stop the backend and wait for the event task to finish.
    ///
    /// Events not yet turned into a delivered signal are discarded.
    pub async fn close(mut self) {
        drop(self.backend.take());
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Config watcher task failed");
            }
        }
        tracing::info!("Config watcher stopped");
    }
}

enum Window {
    Elapsed,
    SourceClosed,
    Stopped,
}

struct EventLoop {
    events: mpsc::Receiver<WatchEventResult>,
    restart: RestartSender,
    debounce: Duration,
    errors: mpsc::UnboundedSender<WatchError>,
    stop: oneshot::Receiver<()>,
}

impl EventLoop {
    async fn run(mut self) {
        loop {
            let next = tokio::select! {
                biased;
                _ = &mut self.stop => break,
                next = self.events.recv() => next,
            };
            let Some(result) = next else { break };

            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    self.report(e);
                    continue;
                }
            };
            if !is_restart_trigger(&event.kind) {
                tracing::trace!(kind = ?event.kind, "Ignoring file event");
                continue;
            }
            tracing::info!(paths = ?event.paths, "Config file changed");
            metrics::record_watch_event();

            let mut source_closed = false;
            if !self.debounce.is_zero() {
                match self.settle().await {
                    Window::Elapsed => {}
                    Window::SourceClosed => source_closed = true,
                    Window::Stopped => break,
                }
            }

            let delivered = tokio::select! {
                biased;
                _ = &mut self.stop => break,
                delivered = self.restart.signal() => delivered,
            };
            if delivered.is_err() {
                tracing::info!("Restart channel closed, config watcher exiting");
                break;
            }
            if source_closed {
                break;
            }
        }
        tracing::debug!("Config watcher event loop terminated");
    }

    /// Wait until no trigger arrived for one full window.
    async fn settle(&mut self) -> Window {
        let deadline = tokio::time::sleep(self.debounce);
        tokio::pin!(deadline);
        let mut coalesced = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = &mut self.stop => return Window::Stopped,
                _ = &mut deadline => {
                    if coalesced > 0 {
                        tracing::debug!(coalesced, "Coalesced config change events");
                    }
                    return Window::Elapsed;
                }
                next = self.events.recv() => match next {
                    None => return Window::SourceClosed,
                    Some(Err(e)) => self.report(e),
                    Some(Ok(event)) if is_restart_trigger(&event.kind) => {
                        metrics::record_watch_event();
                        coalesced += 1;
                        deadline.as_mut().reset(Instant::now() + self.debounce);
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    fn report(&self, e: notify::Error) {
        tracing::warn!(error = %e, "File watcher error");
        metrics::record_watch_error();
        let _ = self.errors.send(WatchError::Source(e));
    }
}
