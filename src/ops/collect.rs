use std::{
  marker::PhantomData,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

use crate::{
  error::Error,
  graph::{Describe, Node},
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{BoxedSubscription, Subscription},
};

/// Accumulates every upstream value and, on completion, emits them as one
/// `Vec` followed by completion.
///
/// An upstream error discards the accumulated values and is forwarded.
/// Downstream requests are forwarded to the upstream unchanged, so a
/// downstream that wants the list must request enough to drain the whole
/// upstream (normally [`UNBOUNDED`](crate::subscription::UNBOUNDED)). The list
/// is only delivered once downstream requested at least once; until then it
/// is held back.
///
/// Cancelling discards the list and completes downstream.
pub struct Collect<S, T> {
  source: S,
  _p: PhantomData<fn(T)>,
}

impl<S, T> Collect<S, T> {
  pub fn new(source: S) -> Self { Self { source, _p: PhantomData } }
}

impl<S: Clone, T> Clone for Collect<S, T> {
  fn clone(&self) -> Self { Self::new(self.source.clone()) }
}

impl<S, T> Publisher<Vec<T>> for Collect<S, T>
where
  S: Publisher<T>,
  T: Send + 'static,
{
  fn subscribe(&self, subscriber: BoxedSubscriber<Vec<T>>) {
    let core = Arc::new(CollectCore {
      downstream: subscriber,
      phase: Mutex::new(Phase::Collecting(vec![])),
      requested: AtomicBool::new(false),
      cancelled: AtomicBool::new(false),
    });
    self.source.subscribe(Arc::new(CollectSubscriber { core }))
  }
}

impl<S: Describe, T> Describe for Collect<S, T> {
  fn describe(&self) -> Node<'_> { Node::Collect(&self.source) }
}

enum Phase<T> {
  Collecting(Vec<T>),
  /// Upstream completed before downstream asked for anything.
  Ready(Vec<T>),
  Done,
}

struct CollectCore<T> {
  downstream: BoxedSubscriber<Vec<T>>,
  phase: Mutex<Phase<T>>,
  requested: AtomicBool,
  cancelled: AtomicBool,
}

impl<T> CollectCore<T> {
  fn deliver(&self, items: Option<Vec<T>>) {
    if let Some(items) = items {
      self.downstream.on_next(items);
    }
    self.downstream.on_complete();
  }

  /// Ends the stage without a list. True if it was still running.
  fn close(&self) -> bool {
    !matches!(std::mem::replace(&mut *self.phase.lock(), Phase::Done), Phase::Done)
  }
}

struct CollectSubscriber<T> {
  core: Arc<CollectCore<T>>,
}

impl<T: Send + 'static> Subscriber<T> for CollectSubscriber<T> {
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    self
      .core
      .downstream
      .on_subscribe(Arc::new(CollectSubscription { upstream: subscription, core: self.core.clone() }))
  }

  fn on_next(&self, value: T) {
    if let Phase::Collecting(items) = &mut *self.core.phase.lock() {
      items.push(value);
    }
  }

  fn on_error(&self, error: Error) {
    if self.core.close() {
      self.core.downstream.on_error(error)
    }
  }

  fn on_complete(&self) {
    let ready = {
      let mut phase = self.core.phase.lock();
      match std::mem::replace(&mut *phase, Phase::Done) {
        Phase::Collecting(_) if self.core.cancelled.load(Ordering::Acquire) => Some(None),
        Phase::Collecting(items) if self.core.requested.load(Ordering::Acquire) => Some(Some(items)),
        Phase::Collecting(items) => {
          *phase = Phase::Ready(items);
          None
        }
        held => {
          *phase = held;
          None
        }
      }
    };
    if let Some(items) = ready {
      self.core.deliver(items);
    }
  }
}

/// Subscription handed downstream: the upstream one, plus the bookkeeping
/// that releases a held list.
struct CollectSubscription<T> {
  upstream: BoxedSubscription,
  core: Arc<CollectCore<T>>,
}

impl<T: Send> Subscription for CollectSubscription<T> {
  fn request(&self, n: u64) {
    if n == 0 {
      return;
    }
    self.core.requested.store(true, Ordering::Release);
    self.upstream.request(n);

    let held = {
      let mut phase = self.core.phase.lock();
      match std::mem::replace(&mut *phase, Phase::Done) {
        Phase::Ready(items) => Some(items),
        other => {
          *phase = other;
          None
        }
      }
    };
    if held.is_some() {
      self.core.deliver(held);
    }
  }

  fn cancel(&self) {
    if self.core.cancelled.swap(true, Ordering::AcqRel) {
      return;
    }
    self.upstream.cancel();
    if self.core.close() {
      self.core.downstream.on_complete();
    }
  }
}
