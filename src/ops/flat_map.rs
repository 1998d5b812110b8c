//! Dynamic fan-out stage
//!
//! For every upstream value the mapping function builds a new publisher,
//! which is subscribed at once with unbounded demand. All inner publishers
//! feed the same downstream, so values of different inner publishers
//! interleave freely; each inner publisher's own order is kept.
//!
//! Downstream demand only paces the *outer* upstream (how many inner
//! publishers get opened). Inner publishers are always drained at full rate.
//!
//! # Modes
//!
//! [`FlatMapMode::Detached`] hands the raw upstream subscription downstream
//! and never tracks inner subscriptions. Cancelling downstream stops the
//! outer upstream only; outer completion is forwarded at once even though
//! inner publishers may still emit afterwards.
//!
//! [`FlatMapMode::Tracked`] keeps every live inner subscriber in a
//! subscriber set. Cancelling downstream or an error anywhere cancels all of them,
//! and completion is only forwarded once the outer upstream and every inner
//! publisher completed.

use std::{
  marker::PhantomData,
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  },
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::trace;

use crate::{
  error::Error,
  graph::{Describe, Node},
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscriber_set::{Joined, SubscriberSet},
  subscription::{BoxedSubscription, Subscription, UNBOUNDED},
};

/// Lifecycle of the inner subscriptions opened by [`FlatMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlatMapMode {
  #[default]
  Detached,
  Tracked,
}

pub struct FlatMap<S, F, T> {
  source: S,
  func: Arc<F>,
  mode: FlatMapMode,
  _p: PhantomData<fn(T)>,
}

impl<S, F, T> FlatMap<S, F, T> {
  pub fn new(source: S, func: F, mode: FlatMapMode) -> Self {
    Self { source, func: Arc::new(func), mode, _p: PhantomData }
  }

  #[inline]
  pub fn mode(&self) -> FlatMapMode { self.mode }
}

impl<S: Clone, F, T> Clone for FlatMap<S, F, T> {
  fn clone(&self) -> Self {
    Self { source: self.source.clone(), func: self.func.clone(), mode: self.mode, _p: PhantomData }
  }
}

impl<S, F, T, P, U> Publisher<U> for FlatMap<S, F, T>
where
  S: Publisher<T>,
  F: Fn(T) -> P + Send + Sync + 'static,
  P: Publisher<U>,
  T: 'static,
  U: 'static,
{
  fn subscribe(&self, subscriber: BoxedSubscriber<U>) {
    let core = Arc::new(FlatMapCore {
      downstream: subscriber,
      mode: self.mode,
      upstream: OnceCell::new(),
      inners: Mutex::new(SubscriberSet::default()),
      active: AtomicUsize::new(0),
      outer_done: AtomicBool::new(false),
      cancelled: AtomicBool::new(false),
      done: AtomicBool::new(false),
    });
    self.source.subscribe(Arc::new(OuterSubscriber { core, func: self.func.clone() }))
  }
}

impl<S: Describe, F, T> Describe for FlatMap<S, F, T> {
  fn describe(&self) -> Node<'_> { Node::FlatMap(&self.source) }
}

// ============================================================================
// Shared state
// ============================================================================

/// State shared by the outer subscriber and every inner one. In tracked mode
/// it is also the subscription handed downstream.
struct FlatMapCore<U> {
  downstream: BoxedSubscriber<U>,
  mode: FlatMapMode,
  upstream: OnceCell<BoxedSubscription>,
  inners: Mutex<SubscriberSet<Arc<InnerSubscriber<U>>>>,
  /// Inner publishers opened and not yet terminated.
  active: AtomicUsize,
  outer_done: AtomicBool,
  cancelled: AtomicBool,
  done: AtomicBool,
}

impl<U> FlatMapCore<U> {
  #[inline]
  fn tracked(&self) -> bool { self.mode == FlatMapMode::Tracked }

  fn finish(&self) -> bool { !self.done.swap(true, Ordering::AcqRel) }

  fn fail(&self, error: Error) {
    if !self.finish() {
      return;
    }
    if self.tracked() {
      self.cancel_all();
    }
    self.downstream.on_error(error)
  }

  fn cancel_all(&self) {
    if let Some(upstream) = self.upstream.get() {
      upstream.cancel();
    }
    let inners = self.inners.lock().evict_all();
    for inner in inners {
      inner.stop();
    }
  }

  /// Tracked mode: completes downstream once nothing is left running.
  fn try_complete(&self) {
    if self.outer_done.load(Ordering::Acquire)
      && self.active.load(Ordering::Acquire) == 0
      && self.finish()
    {
      self.downstream.on_complete()
    }
  }
}

impl<U> Subscription for FlatMapCore<U> {
  fn request(&self, n: u64) {
    if let Some(upstream) = self.upstream.get() {
      upstream.request(n)
    }
  }

  fn cancel(&self) {
    if self.cancelled.swap(true, Ordering::AcqRel) {
      return;
    }
    trace!(inners = self.active.load(Ordering::Acquire), "flat_map cancel");
    self.cancel_all();
  }
}

// ============================================================================
// Outer subscriber
// ============================================================================

struct OuterSubscriber<U, F> {
  core: Arc<FlatMapCore<U>>,
  func: Arc<F>,
}

impl<T, U, P, F> Subscriber<T> for OuterSubscriber<U, F>
where
  F: Fn(T) -> P + Send + Sync,
  P: Publisher<U>,
  U: 'static,
{
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    let _ = self.core.upstream.set(subscription.clone());
    if self.core.tracked() {
      self.core.downstream.on_subscribe(self.core.clone())
    } else {
      self.core.downstream.on_subscribe(subscription)
    }
  }

  fn on_next(&self, value: T) {
    let core = &self.core;
    if core.tracked() && (core.cancelled.load(Ordering::Acquire) || core.done.load(Ordering::Acquire))
    {
      return;
    }
    let inner = (self.func)(value);
    core.active.fetch_add(1, Ordering::AcqRel);
    let subscriber = if core.tracked() {
      let joined = core.inners.lock().join(|key| InnerSubscriber::new(core, Some(key)));
      match joined {
        Joined::Live(subscriber) => subscriber,
        Joined::Closed(subscriber) => {
          subscriber.stop();
          subscriber
        }
      }
    } else {
      InnerSubscriber::new(core, None)
    };
    trace!(key = ?subscriber.key, "flat_map inner open");
    inner.subscribe(subscriber);
  }

  fn on_error(&self, error: Error) { self.core.fail(error) }

  fn on_complete(&self) {
    let core = &self.core;
    core.outer_done.store(true, Ordering::Release);
    if core.tracked() {
      core.try_complete()
    } else if core.finish() {
      core.downstream.on_complete()
    }
  }
}

// ============================================================================
// Inner subscriber
// ============================================================================

enum InnerSlot {
  Pending,
  Open(BoxedSubscription),
  Stopped,
}

struct InnerSubscriber<U> {
  core: Arc<FlatMapCore<U>>,
  /// Key in the core's subscriber set, tracked mode only.
  key: Option<usize>,
  slot: Mutex<InnerSlot>,
  finished: AtomicBool,
}

impl<U> InnerSubscriber<U> {
  fn new(core: &Arc<FlatMapCore<U>>, key: Option<usize>) -> Arc<Self> {
    Arc::new(Self {
      core: core.clone(),
      key,
      slot: Mutex::new(InnerSlot::Pending),
      finished: AtomicBool::new(false),
    })
  }

  /// Cancels the inner subscription, now or as soon as it arrives.
  fn stop(&self) {
    let slot = std::mem::replace(&mut *self.slot.lock(), InnerSlot::Stopped);
    if let InnerSlot::Open(subscription) = slot {
      subscription.cancel();
    }
  }

  /// Drops this inner from the bookkeeping. True on the first call.
  fn release(&self) -> bool {
    if self.finished.swap(true, Ordering::AcqRel) {
      return false;
    }
    if let Some(key) = self.key {
      self.core.inners.lock().leave(key);
    }
    self.core.active.fetch_sub(1, Ordering::AcqRel);
    true
  }
}

impl<U> Subscriber<U> for InnerSubscriber<U> {
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    let admitted = {
      let mut slot = self.slot.lock();
      let pending = matches!(*slot, InnerSlot::Pending);
      if pending {
        *slot = InnerSlot::Open(subscription.clone());
      }
      pending
    };
    if admitted {
      subscription.request(UNBOUNDED)
    } else {
      subscription.cancel()
    }
  }

  fn on_next(&self, value: U) {
    if self.core.tracked() && self.core.done.load(Ordering::Acquire) {
      return;
    }
    self.core.downstream.on_next(value)
  }

  fn on_error(&self, error: Error) {
    if self.release() {
      self.core.fail(error)
    }
  }

  fn on_complete(&self) {
    if self.release() && self.core.tracked() {
      self.core.try_complete()
    }
  }
}
