use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use once_cell::sync::OnceCell;

use crate::{
  error::Error,
  graph::{Describe, Node},
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::BoxedSubscription,
};

/// Emits the first value of the upstream, then completes and cancels the
/// upstream subscription. If the upstream terminates first, the terminal
/// signal is forwarded as is.
///
/// Every subscription is independent: subscribing twice to the same `Next`
/// yields two single-value flows.
#[derive(Clone)]
pub struct Next<S> {
  source: S,
}

impl<S> Next<S> {
  pub fn new(source: S) -> Self { Self { source } }
}

impl<S, T> Publisher<T> for Next<S>
where
  S: Publisher<T>,
  T: 'static,
{
  fn subscribe(&self, subscriber: BoxedSubscriber<T>) {
    self.source.subscribe(Arc::new(NextSubscriber {
      downstream: subscriber,
      upstream: OnceCell::new(),
      done: AtomicBool::new(false),
    }))
  }
}

impl<S: Describe> Describe for Next<S> {
  fn describe(&self) -> Node<'_> { Node::Next(&self.source) }
}

struct NextSubscriber<T> {
  downstream: BoxedSubscriber<T>,
  upstream: OnceCell<BoxedSubscription>,
  done: AtomicBool,
}

impl<T> NextSubscriber<T> {
  #[inline]
  fn finish(&self) -> bool { !self.done.swap(true, Ordering::AcqRel) }
}

impl<T> Subscriber<T> for NextSubscriber<T> {
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    let _ = self.upstream.set(subscription.clone());
    self.downstream.on_subscribe(subscription)
  }

  fn on_next(&self, value: T) {
    if !self.finish() {
      return;
    }
    self.downstream.on_next(value);
    self.downstream.on_complete();
    if let Some(upstream) = self.upstream.get() {
      upstream.cancel();
    }
  }

  fn on_error(&self, error: Error) {
    if self.finish() {
      self.downstream.on_error(error)
    }
  }

  fn on_complete(&self) {
    if self.finish() {
      self.downstream.on_complete()
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, testing::TestSubscriber};

  #[test]
  fn takes_first_value() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    source.clone().filter(|v| *v == 5).next().subscribe(sub.clone());
    source.emit_next([1, 2, 3, 4, 5, 5, 5, 5]);

    assert_eq!(sub.values(), vec![5]);
    assert_eq!(sub.completions(), 1);
    assert_eq!(sub.violations(), 0);
  }

  #[test]
  fn upstream_is_cancelled_after_first() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    source.clone().next().subscribe(sub.clone());
    assert_eq!(source.subscriber_count(), 1);

    source.emit_next([1]);
    assert_eq!(source.subscriber_count(), 0);
    source.emit_next([2]);
    assert_eq!(sub.values(), vec![1]);
    assert_eq!(sub.completions(), 1);
  }

  #[test]
  fn respects_downstream_demand() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::manual();
    source.clone().next().subscribe(sub.clone());
    source.emit_next([1, 2]);
    assert!(sub.values().is_empty());

    sub.request(1);
    assert_eq!(sub.values(), vec![1]);
    assert_eq!(sub.completions(), 1);
  }

  #[test]
  fn empty_upstream_just_completes() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    source.clone().next().subscribe(sub.clone());
    source.complete();
    assert!(sub.values().is_empty());
    assert_eq!(sub.completions(), 1);
  }

  #[test]
  fn independent_subscriptions() {
    let source = Source::<i32>::new();
    let stage = source.clone().next();
    let subs: Vec<_> = (0..100).map(|_| TestSubscriber::<i32>::unbounded()).collect();
    subs.iter().for_each(|s| stage.subscribe(s.clone()));

    source.emit_next([1, 2]).emit_next([1, 2]);
    for sub in subs {
      assert_eq!(sub.values(), vec![1]);
      assert_eq!(sub.completions(), 1);
      assert_eq!(sub.violations(), 0);
    }
  }
}
