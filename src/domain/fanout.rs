//! Fan-out of notifications to independently registered consumers.
//!
//! A [`Fanout`] delivers each emitted event to every active consumer in
//! registration order. Delivery works on a snapshot of the subscriber list
//! taken after the lock is released, so consumers may read the emitting
//! component, subscribe, or dispose from inside a handler.
//!
//! A consumer that returns an error or panics is logged and skipped; the
//! remaining consumers still receive the event and the emitting call
//! returns normally.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::sync::mpsc;

use super::errors::ConsumerError;

/// Consumer callback.
pub type Handler<E> = Arc<dyn Fn(&E) -> Result<(), ConsumerError> + Send + Sync>;

struct Registration<E> {
    id: u64,
    name: Arc<str>,
    active: Arc<AtomicBool>,
    handler: Handler<E>,
}

impl<E> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            active: Arc::clone(&self.active),
            handler: Arc::clone(&self.handler),
        }
    }
}

struct FanoutInner<E> {
    next_id: AtomicU64,
    consumer_failures: AtomicU64,
    subscribers: RwLock<Vec<Registration<E>>>,
}

impl<E> FanoutInner<E> {
    fn remove(&self, id: u64) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|r| r.id != id);
    }
}

/// Multi-consumer notification fan-out.
pub struct Fanout<E> {
    inner: Arc<FanoutInner<E>>,
}

impl<E> Clone for Fanout<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for Fanout<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> fmt::Debug for Fanout<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fanout")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<E: 'static> Fanout<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FanoutInner {
                next_id: AtomicU64::new(1),
                consumer_failures: AtomicU64::new(0),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a named consumer.
    ///
    /// Delivery stops once the returned [`Subscription`] is disposed or dropped.
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&E) -> Result<(), ConsumerError> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name: Arc<str> = Arc::from(name.into());
        let active = Arc::new(AtomicBool::new(true));

        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                id,
                name: Arc::clone(&name),
                active: Arc::clone(&active),
                handler: Arc::new(handler),
            });

        tracing::debug!(consumer = %name, id, "consumer subscribed");

        let weak: Weak<FanoutInner<E>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            name,
            active,
            detach: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.remove(id);
                }
            })),
        }
    }

    /// Deliver one event to every active consumer. Returns the number of
    /// consumers that accepted it.
    pub fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<Registration<E>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0;
        for registration in snapshot {
            // disposed while this delivery was in flight
            if !registration.active.load(Ordering::Acquire) {
                continue;
            }

            let handler = &registration.handler;
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    self.inner.consumer_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        consumer = %registration.name,
                        error = %err,
                        "consumer failed during notification delivery"
                    );
                }
                Err(payload) => {
                    self.inner.consumer_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        consumer = %registration.name,
                        panic = %panic_message(payload.as_ref()),
                        "consumer panicked during notification delivery"
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total number of handler errors and panics caught so far.
    pub fn consumer_failures(&self) -> u64 {
        self.inner.consumer_failures.load(Ordering::Relaxed)
    }
}

impl<E: Clone + Send + 'static> Fanout<E> {
    /// Register a consumer that receives events through an unbounded channel.
    ///
    /// The emitter only enqueues, so an async consumer that is slow to drain
    /// never holds up delivery to anyone else.
    pub fn subscribe_channel(
        &self,
        name: impl Into<String>,
    ) -> (Subscription, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(name, move |event: &E| {
            tx.send(event.clone())
                .map_err(|_| ConsumerError::new("receiver dropped"))
        });
        (subscription, rx)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Disposable registration handle.
///
/// Disposing (explicitly or by drop) guarantees no further delivery to
/// this consumer, including deliveries already in flight for other
/// consumers.
pub struct Subscription {
    id: u64,
    name: Arc<str>,
    active: Arc<AtomicBool>,
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub const fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(detach) = self.detach.take() {
            detach();
            tracing::debug!(consumer = %self.name, id = self.id, "consumer disposed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
