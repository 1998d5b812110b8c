//! Replaying multicast stage
//!
//! [`Buffered`] subscribes to its upstream as soon as it is built, with
//! unbounded demand, and appends every value to one shared history. Each
//! downstream subscription is a [`Cursor`] into that history: it replays from
//! the start at whatever pace its own demand allows, so the stage can be
//! subscribed any number of times, at any moment, and every subscriber sees
//! the complete sequence.
//!
//! The history is written only by the internal upstream subscriber and read
//! by every cursor; a cursor reads up to the length it captured when taking
//! the read lock.
//!
//! Cancelling the last live cursor cancels the shared upstream subscription.
//! The history collected so far stays available, and later subscribers replay
//! it and complete.

use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::{
  error::Error,
  graph::{Describe, Node},
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscriber_set::SubscriberSet,
  subscription::{BoxedSubscription, Demand, DrainGuard, Subscription, UNBOUNDED},
};

/// Eager replay cache over an upstream publisher.
///
/// Clones share the history and the upstream subscription.
pub struct Buffered<S, T> {
  source: S,
  core: Arc<BufferCore<T>>,
}

impl<S, T> Buffered<S, T>
where
  S: Publisher<T>,
  T: Clone + Send + Sync + 'static,
{
  /// Subscribes to `source` immediately.
  pub fn new(source: S) -> Self {
    let core = Arc::new(BufferCore::default());
    source.subscribe(Arc::new(BufferSink { core: core.clone() }));
    Self { source, core }
  }
}

impl<S, T> Buffered<S, T> {
  /// Number of values recorded so far.
  pub fn len(&self) -> usize { self.core.values.read().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Live cursors.
  pub fn subscriber_count(&self) -> usize { self.core.cursors.lock().len() }

  /// Whether the upstream has terminated (completed, failed or been
  /// cancelled after the last cursor left).
  pub fn is_terminated(&self) -> bool { self.core.upstream_done.load(Ordering::Acquire) }
}

impl<S: Clone, T> Clone for Buffered<S, T> {
  fn clone(&self) -> Self { Self { source: self.source.clone(), core: self.core.clone() } }
}

impl<S, T> Publisher<T> for Buffered<S, T>
where
  S: Send + Sync,
  T: Clone + Send + Sync + 'static,
{
  fn subscribe(&self, subscriber: BoxedSubscriber<T>) {
    let core = self.core.clone();
    let cursor = self
      .core
      .cursors
      .lock()
      .join(|id| {
        Arc::new(Cursor {
          id,
          core,
          subscriber,
          consumed: AtomicUsize::new(0),
          demand: Demand::default(),
          drain: DrainGuard::default(),
          terminated: AtomicBool::new(false),
        })
      })
      .into_inner();
    trace!(id = cursor.id, "buffered cursor opened");
    cursor.subscriber.on_subscribe(cursor.clone());
    cursor.drain();
  }
}

impl<S: Describe, T> Describe for Buffered<S, T> {
  fn describe(&self) -> Node<'_> { Node::Buffered(&self.source) }
}

// ============================================================================
// Shared history
// ============================================================================

struct BufferCore<T> {
  values: RwLock<Vec<T>>,
  cursors: Mutex<SubscriberSet<Arc<Cursor<T>>>>,
  upstream: OnceCell<BoxedSubscription>,
  upstream_done: AtomicBool,
  error: Mutex<Option<Error>>,
}

impl<T> Default for BufferCore<T> {
  fn default() -> Self {
    Self {
      values: RwLock::new(vec![]),
      cursors: Mutex::new(SubscriberSet::default()),
      upstream: OnceCell::new(),
      upstream_done: AtomicBool::new(false),
      error: Mutex::new(None),
    }
  }
}

impl<T> BufferCore<T> {
  fn detach(&self, id: usize) {
    let last = {
      let mut cursors = self.cursors.lock();
      cursors.leave(id) && cursors.is_empty()
    };
    trace!(id, "buffered cursor closed");
    if last && !self.upstream_done.load(Ordering::Acquire) {
      if let Some(upstream) = self.upstream.get() {
        debug!("last buffered cursor left, cancelling upstream");
        upstream.cancel();
      }
    }
  }
}

impl<T: Clone + Send + Sync> BufferCore<T> {
  fn drain_all(&self) {
    let cursors = self.cursors.lock().members();
    for cursor in cursors {
      cursor.drain();
    }
  }
}

/// Internal upstream subscriber feeding the history.
struct BufferSink<T> {
  core: Arc<BufferCore<T>>,
}

impl<T: Clone + Send + Sync> Subscriber<T> for BufferSink<T> {
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    let _ = self.core.upstream.set(subscription.clone());
    subscription.request(UNBOUNDED);
  }

  fn on_next(&self, value: T) {
    if self.core.upstream_done.load(Ordering::Acquire) {
      return;
    }
    self.core.values.write().push(value);
    self.core.drain_all();
  }

  fn on_error(&self, error: Error) {
    debug!(label = error.as_label(), "buffered upstream failed");
    *self.core.error.lock() = Some(error);
    self.core.upstream_done.store(true, Ordering::Release);
    self.core.drain_all();
  }

  fn on_complete(&self) {
    debug!(recorded = self.core.values.read().len(), "buffered upstream completed");
    self.core.upstream_done.store(true, Ordering::Release);
    self.core.drain_all();
  }
}

// ============================================================================
// Cursor
// ============================================================================

/// One subscriber's position in the shared history.
pub struct Cursor<T> {
  id: usize,
  core: Arc<BufferCore<T>>,
  subscriber: BoxedSubscriber<T>,
  /// Values already delivered.
  consumed: AtomicUsize,
  demand: Demand,
  drain: DrainGuard,
  terminated: AtomicBool,
}

impl<T> Cursor<T> {
  #[inline]
  pub fn id(&self) -> usize { self.id }

  /// Values already delivered to this subscriber.
  #[inline]
  pub fn position(&self) -> usize { self.consumed.load(Ordering::Acquire) }

  #[inline]
  fn is_terminated(&self) -> bool { self.terminated.load(Ordering::Acquire) }

  fn terminate(&self) -> bool { !self.terminated.swap(true, Ordering::AcqRel) }
}

impl<T: Clone + Send + Sync> Cursor<T> {
  fn drain(&self) { self.drain.run(|| self.drain_pass()) }

  fn drain_pass(&self) {
    loop {
      if self.is_terminated() {
        return;
      }
      let error = self.core.error.lock().clone();
      if let Some(error) = error {
        if self.terminate() {
          self.subscriber.on_error(error);
          self.core.detach(self.id);
        }
        return;
      }

      let batch: Vec<T> = {
        let values = self.core.values.read();
        let from = self.position();
        let n = self.demand.get().min((values.len() - from) as u64) as usize;
        values[from..from + n].to_vec()
      };
      if batch.is_empty() {
        break;
      }
      for value in batch {
        if self.is_terminated() {
          return;
        }
        self.consumed.fetch_add(1, Ordering::AcqRel);
        self.demand.consume();
        self.subscriber.on_next(value);
      }
    }

    if self.core.upstream_done.load(Ordering::Acquire)
      && self.position() == self.core.values.read().len()
      && self.terminate()
    {
      self.subscriber.on_complete();
      self.core.detach(self.id);
    }
  }
}

impl<T: Clone + Send + Sync> Subscription for Cursor<T> {
  fn request(&self, n: u64) {
    if n == 0 || self.is_terminated() {
      return;
    }
    let demand = self.demand.add(n);
    trace!(id = self.id, n, demand, "buffered request");
    if !self.core.upstream_done.load(Ordering::Acquire) {
      let available = (self.core.values.read().len() - self.position()) as u64;
      if demand > available {
        if let Some(upstream) = self.core.upstream.get() {
          upstream.request(demand - available);
        }
      }
    }
    self.drain();
  }

  fn cancel(&self) {
    if self.terminate() {
      self.subscriber.on_complete();
      self.core.detach(self.id);
    }
  }
}
