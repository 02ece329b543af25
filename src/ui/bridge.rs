// Event loop bridge
//
// The Slint event loop owns the main thread and every UI object. State
// changes arrive from tokio workers and the state subscription thread, so UI
// work is queued as closures and replayed on the event loop by a forwarding
// thread.

use crate::metrics::Metrics;
use anyhow::{Context, Result};
use slint::{ComponentHandle, Weak};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Queue depth before UI updates are dropped
const UI_QUEUE_DEPTH: usize = 100;

type UiUpdate<T> = Box<dyn FnOnce(&T) + Send>;

/// Owner of the forwarding thread; hand out [`EventLoopBridgeHandle`]s to
/// callbacks and background threads.
///
/// ```ignore
/// let bridge = EventLoopBridge::new(&ui, runtime.handle().clone(), metrics)?;
/// let handle = bridge.clone_handle();
/// handle.update_ui(|ui| ui.set_status_message("Connected to OBS".into()));
/// ```
pub struct EventLoopBridge<T: ComponentHandle> {
    handle: EventLoopBridgeHandle<T>,
}

impl<T: ComponentHandle + 'static> EventLoopBridge<T> {
    pub fn new(ui: &T, runtime: Handle, metrics: Arc<Metrics>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<UiUpdate<T>>(UI_QUEUE_DEPTH);

        let target = ui.as_weak();
        std::thread::Builder::new()
            .name("ui-bridge".to_string())
            .spawn(move || forward_updates(rx, target))
            .context("Failed to start UI bridge thread")?;

        Ok(Self {
            handle: EventLoopBridgeHandle {
                runtime,
                tx,
                metrics,
            },
        })
    }

    pub fn clone_handle(&self) -> EventLoopBridgeHandle<T> {
        self.handle.clone()
    }
}

/// Replay queued closures on the event loop until every sender is gone or
/// the event loop has quit.
fn forward_updates<T: ComponentHandle + 'static>(
    mut rx: mpsc::Receiver<UiUpdate<T>>,
    target: Weak<T>,
) {
    tracing::debug!("UI bridge thread started");

    while let Some(update) = rx.blocking_recv() {
        if let Err(e) = target.upgrade_in_event_loop(move |ui| update(&ui)) {
            tracing::warn!("Event loop gone, dropping UI updates: {:?}", e);
            break;
        }
    }

    tracing::debug!("UI bridge thread stopped");
}

/// Cloneable, `Send` handle for queuing UI work and spawning tokio tasks
pub struct EventLoopBridgeHandle<T: ComponentHandle> {
    runtime: Handle,
    tx: mpsc::Sender<UiUpdate<T>>,
    metrics: Arc<Metrics>,
}

// Derive would demand T: Clone
impl<T: ComponentHandle> Clone for EventLoopBridgeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            tx: self.tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<T: ComponentHandle + 'static> EventLoopBridgeHandle<T> {
    /// Queue `update` to run on the event loop.
    ///
    /// Never blocks: when the queue is full the update is dropped with a
    /// warning. Later state events carry the current values anyway.
    pub fn update_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        match self.tx.try_send(Box::new(update)) {
            Ok(()) => self.metrics.record_ui_update(),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("UI update queue full, dropping update");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("UI bridge closed, dropping update");
            }
        }
    }

    /// Run `make_future()` on the tokio runtime, off the UI thread
    pub fn spawn_async<F, Fut>(&self, make_future: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(async move { make_future().await });
    }
}
