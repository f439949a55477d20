//! Fan-out channel with per-subscriber bounded queues.
//!
//! Unlike `tokio::sync::broadcast`, a lagging receiver here is not skipped
//! forward silently: it is disconnected and told why, while every other
//! subscriber keeps receiving the full sequence. Publishing never waits on a
//! subscriber.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use hostctl_core::StreamError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

struct SubscriberSlot<T> {
    tx: mpsc::Sender<T>,
    lagged: Arc<AtomicBool>,
}

struct Inner<T> {
    subscribers: HashMap<u64, SubscriberSlot<T>>,
    history: VecDeque<T>,
    history_cap: usize,
    queue_cap: usize,
    next_id: u64,
    closed: bool,
}

/// Multi-subscriber channel preserving publish order for every subscriber.
pub struct Broadcast<T> {
    inner: Arc<StdMutex<Inner<T>>>,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn lock<T>(inner: &StdMutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    // Fan-out never panics while holding the lock; recover the data if a
    // subscriber's Clone impl ever does.
    inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl<T: Clone + Send + 'static> Broadcast<T> {
    /// Create a channel.
    ///
    /// `queue_cap` is the per-subscriber backlog before it counts as slow;
    /// `history_cap` is how many recent items are kept for late subscribers
    /// (0 disables history).
    pub fn new(queue_cap: usize, history_cap: usize) -> Self {
        Self {
            inner: Arc::new(StdMutex::new(Inner {
                subscribers: HashMap::new(),
                history: VecDeque::with_capacity(history_cap.min(1024)),
                history_cap,
                queue_cap: queue_cap.max(1),
                next_id: 1,
                closed: false,
            })),
        }
    }

    /// Subscribe to items published from now on.
    pub fn subscribe(&self) -> Subscription<T> {
        self.subscribe_with_history(0)
    }

    /// Subscribe and first receive up to `n` of the most recent items.
    ///
    /// The snapshot and the registration happen under one lock, so the
    /// replayed items are followed by live items without gaps or repeats.
    pub fn subscribe_with_history(&self, n: usize) -> Subscription<T> {
        let mut inner = lock(&self.inner);
        let skip = inner.history.len().saturating_sub(n);
        let replay: VecDeque<T> = inner.history.iter().skip(skip).cloned().collect();

        let id = inner.next_id;
        inner.next_id += 1;
        let lagged = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(inner.queue_cap);
        let done = inner.closed;
        if !done {
            inner.subscribers.insert(
                id,
                SubscriberSlot {
                    tx,
                    lagged: Arc::clone(&lagged),
                },
            );
        }
        debug!(subscriber = id, replay = replay.len(), "Subscriber attached");

        Subscription {
            id,
            rx,
            replay,
            lagged,
            channel: Arc::downgrade(&self.inner),
            done,
        }
    }

    /// Deliver `item` to every subscriber without waiting.
    ///
    /// A subscriber whose queue is full is disconnected. Returns how many
    /// subscribers received the item.
    pub fn publish(&self, item: T) -> usize {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return 0;
        }
        if inner.history_cap > 0 {
            if inner.history.len() >= inner.history_cap {
                inner.history.pop_front();
            }
            inner.history.push_back(item.clone());
        }

        let mut delivered = 0;
        inner.subscribers.retain(|id, slot| match slot.tx.try_send(item.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = id, "Disconnecting slow subscriber");
                slot.lagged.store(true, Ordering::Release);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }

    /// End every subscription normally. Later publishes are dropped.
    pub fn close(&self) {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return;
        }
        inner.closed = true;
        let count = inner.subscribers.len();
        inner.subscribers.clear();
        debug!(subscribers = count, "Broadcast closed");
    }

    /// Copy of the retained history, oldest first.
    pub fn history(&self) -> Vec<T> {
        lock(&self.inner).history.iter().cloned().collect()
    }
}

impl<T> Broadcast<T> {
    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }
}

/// Receiving end of a [`Broadcast`].
///
/// Yields `Ok(item)` in publish order. If the subscriber fell behind it
/// yields a single `Err(StreamError::SlowConsumer)` after the items it did
/// receive, then ends. Dropping it unsubscribes.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::Receiver<T>,
    replay: VecDeque<T>,
    lagged: Arc<AtomicBool>,
    channel: Weak<StdMutex<Inner<T>>>,
    done: bool,
}

impl<T> Unpin for Subscription<T> {}

impl<T> Subscription<T> {
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Detach from the channel. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            lock(&channel).subscribers.remove(&self.id);
        }
        self.channel = Weak::new();
        self.rx.close();
    }

    /// Next item, error, or `None` once the subscription ended.
    pub async fn recv(&mut self) -> Option<Result<T, StreamError>> {
        self.next().await
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(item) = self.replay.pop_front() {
            return Poll::Ready(Some(Ok(item)));
        }
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(Ok(item))),
            Poll::Ready(None) => {
                self.done = true;
                if self.lagged.load(Ordering::Acquire) {
                    Poll::Ready(Some(Err(StreamError::SlowConsumer {
                        subscriber: self.id,
                    })))
                } else {
                    Poll::Ready(None)
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
