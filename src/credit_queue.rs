//! Per-subscriber FIFO queue with credit-based delivery
//!
//! [`CreditQueue`] is the subscription handed out by the source stage. The
//! producer side enqueues values at any rate (the queue is unbounded); the
//! consumer side grants credit through [`Subscription::request`]. Every
//! enqueue, request and terminal signal attempts a drain: while credit is
//! positive and the queue non-empty, the oldest value is delivered.
//!
//! # Concurrency
//!
//! - The queue is only touched under its lock, and only to push or to extract
//!   a batch of at most `credit` values. Delivery happens outside the lock.
//! - Drains are serialized by a work-in-progress counter: a producer thread
//!   and a consumer thread racing into `drain` never deliver concurrently, and
//!   a subscriber calling `request` from inside `on_next` does not recurse.
//! - Terminal delivery (completion, failure or cancellation) is guarded by a
//!   single test-and-set flag and, like every other callback, happens inside
//!   the drain loop. A `cancel` from another thread only marks the queue and
//!   leaves the completion to whichever thread owns the loop.

use std::{
  collections::VecDeque,
  fmt,
  sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use crate::{
  error::Error,
  subscriber::BoxedSubscriber,
  subscription::{Demand, DrainGuard, Subscription},
};

type Detach = Box<dyn Fn(usize) + Send + Sync>;

/// Subscription owning one subscriber's pending values and credit.
pub struct CreditQueue<T> {
  id: usize,
  subscriber: BoxedSubscriber<T>,
  queue: Mutex<VecDeque<T>>,
  demand: Demand,
  drain: DrainGuard,
  upstream_completed: AtomicBool,
  failure: Mutex<Option<Error>>,
  cancelled: AtomicBool,
  terminated: AtomicBool,
  detach: Detach,
}

impl<T> CreditQueue<T> {
  /// Creates a queue for `subscriber`. `detach` is invoked exactly once with
  /// `id` when the subscription terminates, to drop it from its subscriber set.
  pub fn new(
    id: usize,
    subscriber: BoxedSubscriber<T>,
    detach: impl Fn(usize) + Send + Sync + 'static,
  ) -> Self {
    Self {
      id,
      subscriber,
      queue: Mutex::new(VecDeque::new()),
      demand: Demand::default(),
      drain: DrainGuard::default(),
      upstream_completed: AtomicBool::new(false),
      failure: Mutex::new(None),
      cancelled: AtomicBool::new(false),
      terminated: AtomicBool::new(false),
      detach: Box::new(detach),
    }
  }

  #[inline]
  pub fn id(&self) -> usize { self.id }

  /// Credit granted but not yet used.
  #[inline]
  pub fn demand(&self) -> u64 { self.demand.get() }

  /// Values waiting for credit.
  pub fn queued(&self) -> usize { self.queue.lock().len() }

  #[inline]
  pub fn is_terminated(&self) -> bool { self.terminated.load(Ordering::Acquire) }

  /// Terminated, or cancelled and waiting for the drain loop to complete it.
  #[inline]
  fn is_stopped(&self) -> bool { self.cancelled.load(Ordering::Acquire) || self.is_terminated() }

  /// Appends a value and delivers whatever the current credit allows.
  pub fn push(&self, value: T) {
    if self.is_stopped() {
      return;
    }
    self.queue.lock().push_back(value);
    self.drain();
  }

  /// Marks the upstream complete. Completion reaches the subscriber once the
  /// backlog has been delivered, possibly during a later `request`.
  pub fn complete(&self) {
    self.upstream_completed.store(true, Ordering::Release);
    self.drain();
  }

  /// Fails the subscription. The failure overtakes any queued backlog.
  pub fn fail(&self, error: Error) {
    {
      let mut failure = self.failure.lock();
      if failure.is_none() {
        *failure = Some(error);
      }
    }
    self.drain();
  }

  fn drain(&self) { self.drain.run(|| self.drain_pass()) }

  fn drain_pass(&self) {
    loop {
      if self.is_terminated() {
        return;
      }
      if self.cancelled.load(Ordering::Acquire) {
        if self.terminate() {
          self.queue.lock().clear();
          self.subscriber.on_complete();
          (self.detach)(self.id);
        }
        return;
      }
      let failure = self.failure.lock().take();
      if let Some(error) = failure {
        if self.terminate() {
          self.queue.lock().clear();
          self.subscriber.on_error(error);
          (self.detach)(self.id);
        }
        return;
      }

      let batch: SmallVec<[T; 8]> = {
        let mut queue = self.queue.lock();
        let n = self.demand.get().min(queue.len() as u64) as usize;
        queue.drain(..n).collect()
      };
      if batch.is_empty() {
        break;
      }
      for value in batch {
        if self.is_stopped() {
          break;
        }
        self.demand.consume();
        self.subscriber.on_next(value);
      }
    }

    if self.upstream_completed.load(Ordering::Acquire)
      && self.queue.lock().is_empty()
      && self.terminate()
    {
      self.subscriber.on_complete();
      (self.detach)(self.id);
    }
  }

  /// First caller wins.
  fn terminate(&self) -> bool { !self.terminated.swap(true, Ordering::AcqRel) }
}

impl<T: Send> Subscription for CreditQueue<T> {
  fn request(&self, n: u64) {
    if n == 0 || self.is_stopped() {
      return;
    }
    let demand = self.demand.add(n);
    trace!(id = self.id, n, demand, "request");
    self.drain();
  }

  fn cancel(&self) {
    if self.is_terminated() || self.cancelled.swap(true, Ordering::AcqRel) {
      return;
    }
    trace!(id = self.id, "cancel");
    self.drain();
  }
}

impl<T> fmt::Debug for CreditQueue<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CreditQueue")
      .field("id", &self.id)
      .field("demand", &self.demand.get())
      .field("queued", &self.queued())
      .field("terminated", &self.is_terminated())
      .finish()
  }
}
