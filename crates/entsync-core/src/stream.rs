// ── Change subscriptions ──
//
// Watch-backed handles for store revisions, scope changes and the
// loading/state flags of loaders and updaters.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A subscription to one observable value of the engine.
///
/// `current()` is the value the subscriber last saw; `changed()` and
/// `settled()` advance it.
pub struct ChangeStream<T: Clone + Send + Sync + 'static> {
    seen: T,
    receiver: watch::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> ChangeStream<T> {
    pub(crate) fn new(mut receiver: watch::Receiver<T>) -> Self {
        let seen = receiver.borrow_and_update().clone();
        Self { seen, receiver }
    }

    /// The value last observed by this subscriber.
    pub fn current(&self) -> &T {
        &self.seen
    }

    /// The producer's value right now, without marking it seen.
    pub fn latest(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// Whether the producer moved on since the last observation.
    pub fn is_stale(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Wait for the next change. `None` once the producer is gone.
    pub async fn changed(&mut self) -> Option<T> {
        self.receiver.changed().await.ok()?;
        Some(self.observe())
    }

    /// Wait until the value satisfies `done`, checking the current value
    /// first. `None` if the producer goes away before that happens.
    pub async fn settled<F>(&mut self, mut done: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let value = self.receiver.wait_for(|v| done(v)).await.ok()?.clone();
        self.seen = value.clone();
        Some(value)
    }

    fn observe(&mut self) -> T {
        let value = self.receiver.borrow_and_update().clone();
        self.seen = value.clone();
        value
    }

    /// Every value from now on, starting with the current one.
    pub fn into_stream(self) -> ChangeWatchStream<T> {
        ChangeWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }

    /// Only values published after this call.
    pub fn into_changes(self) -> ChangeWatchStream<T> {
        ChangeWatchStream {
            inner: WatchStream::from_changes(self.receiver),
        }
    }
}

/// `Stream` view of a [`ChangeStream`]. Intermediate values may be skipped
/// when the producer outpaces the consumer.
pub struct ChangeWatchStream<T: Clone + Send + Sync + 'static> {
    inner: WatchStream<T>,
}

impl<T: Clone + Send + Sync + 'static> Stream for ChangeWatchStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
