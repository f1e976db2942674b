// ── Write path ──
//
// `DataUpdater` serializes mutations issued through one handle: every call
// waits for all earlier calls on the same handle before running. Loading
// goes true when the first call is queued and false once the queue drains.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared, join_all};
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::notify::{ErrorMessage, Notifier, Severity, SuccessMessage};
use crate::params::Params;
use crate::stream::ChangeStream;

/// An updater function: `Ok((success, payload))` for any completed
/// operation, `Err` only for misconfiguration.
pub type UpdaterFn =
    Arc<dyn Fn(Params) -> BoxFuture<'static, Result<(bool, Value), CoreError>> + Send + Sync>;

/// Invoked with the last outcome once the queue drains.
pub type CompletionFn = Arc<dyn Fn(bool, &Value) + Send + Sync>;

type UpdateResult = Result<(bool, Value), CoreError>;
type Turn = Shared<BoxFuture<'static, ()>>;

/// Per-handle behaviour of a [`DataUpdater`].
#[derive(Clone, Default)]
pub struct UpdaterOptions {
    pub on_complete: Option<CompletionFn>,
    /// Notification title, usually the entity name.
    pub title: Option<String>,
    pub error_message: Option<ErrorMessage>,
    /// Only notified when set.
    pub success_message: Option<SuccessMessage>,
}

impl UpdaterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(bool, &Value) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<ErrorMessage>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn success_message(mut self, message: impl Into<SuccessMessage>) -> Self {
        self.success_message = Some(message.into());
        self
    }
}

impl fmt::Debug for UpdaterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdaterOptions")
            .field("on_complete", &self.on_complete.is_some())
            .field("title", &self.title)
            .field("error_message", &self.error_message)
            .field("success_message", &self.success_message)
            .finish()
    }
}

#[derive(Default)]
struct Queue {
    next_ticket: u64,
    pending: VecDeque<(u64, Turn)>,
}

/// FIFO write handle. Cheaply cloneable; clones share one queue.
#[derive(Clone)]
pub struct DataUpdater {
    inner: Arc<UpdaterInner>,
}

struct UpdaterInner {
    updater: UpdaterFn,
    notifier: Arc<dyn Notifier>,
    options: UpdaterOptions,
    queue: Mutex<Queue>,
    loading: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl DataUpdater {
    pub(crate) fn new(updater: UpdaterFn, notifier: Arc<dyn Notifier>, options: UpdaterOptions) -> Self {
        let (loading, _) = watch::channel(false);
        Self {
            inner: Arc::new(UpdaterInner {
                updater,
                notifier,
                options,
                queue: Mutex::new(Queue::default()),
                loading,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Run the updater with `params` after every earlier call on this
    /// handle has finished.
    ///
    /// Failed operations are notified and returned as `Ok((false, _))`.
    pub async fn update(&self, params: Params) -> UpdateResult {
        let (mut ticket, earlier) = self.inner.enqueue();
        join_all(earlier).await;

        debug!(ticket = ticket.id, "running update");
        let outcome = (self.inner.updater)(params.clone()).await;
        self.inner.report(&outcome, &params);
        ticket.release(Some(&outcome));
        outcome
    }

    pub fn loading(&self) -> bool {
        *self.inner.loading.borrow()
    }

    pub fn subscribe_loading(&self) -> ChangeStream<bool> {
        ChangeStream::new(self.inner.loading.subscribe())
    }

    /// Number of calls queued or running.
    pub fn pending(&self) -> usize {
        self.inner.lock_queue().pending.len()
    }

    /// Stop publishing loading state and completion callbacks. Calls
    /// already in flight still run to completion.
    pub fn teardown(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

impl fmt::Debug for DataUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataUpdater")
            .field("pending", &self.pending())
            .field("loading", &self.loading())
            .field("torn_down", &self.is_torn_down())
            .finish_non_exhaustive()
    }
}

impl UpdaterInner {
    fn lock_queue(&self) -> std::sync::MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self) -> (Ticket<'_>, Vec<Turn>) {
        let (done, turn) = oneshot::channel::<()>();
        let mut queue = self.lock_queue();
        if queue.pending.is_empty() && !self.cancel.is_cancelled() {
            self.loading.send_replace(true);
        }
        let earlier = queue.pending.iter().map(|(_, t)| t.clone()).collect();
        let id = queue.next_ticket;
        queue.next_ticket += 1;
        // A dropped sender also resolves the turn, so an abandoned call
        // never blocks the ones behind it.
        queue
            .pending
            .push_back((id, turn.map(|_| ()).boxed().shared()));
        drop(queue);

        (
            Ticket {
                inner: self,
                id,
                done: Some(done),
            },
            earlier,
        )
    }

    fn report(&self, outcome: &UpdateResult, params: &Params) {
        let title = self.options.title.as_deref().unwrap_or("Update");
        match outcome {
            Ok((true, result)) => {
                if let Some(message) = &self.options.success_message {
                    self.notifier
                        .notify(title, &message.render(result, params), Severity::Success);
                }
            }
            Ok((false, payload)) => {
                let text = payload_text(payload);
                warn!(error = %text, "update failed");
                let message = match &self.options.error_message {
                    Some(m) => m.render(&CoreError::operation(text), params),
                    None => text,
                };
                self.notifier.notify(title, &message, Severity::Error);
            }
            Err(err) => {
                warn!(error = %err, "update rejected");
                self.notifier.notify(title, &err.to_string(), Severity::Error);
            }
        }
    }
}

fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A call's place in the queue. Releasing it (explicitly or on drop)
/// lets the next call run.
struct Ticket<'a> {
    inner: &'a UpdaterInner,
    id: u64,
    done: Option<oneshot::Sender<()>>,
}

impl Ticket<'_> {
    fn release(&mut self, outcome: Option<&UpdateResult>) {
        let Some(done) = self.done.take() else {
            return;
        };
        let _ = done.send(());

        {
            // Lowered under the lock so a concurrent enqueue cannot raise
            // the flag in between and have it cleared behind its back.
            let mut queue = self.inner.lock_queue();
            queue.pending.retain(|(id, _)| *id != self.id);
            if !queue.pending.is_empty() || self.inner.cancel.is_cancelled() {
                return;
            }
            self.inner.loading.send_replace(false);
        }
        if let (Some(on_complete), Some(outcome)) = (&self.inner.options.on_complete, outcome) {
            match outcome {
                Ok((success, payload)) => on_complete(*success, payload),
                Err(err) => on_complete(false, &Value::String(err.to_string())),
            }
        }
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.release(None);
    }
}
