use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{
  error::Error,
  graph::{Describe, Node},
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::BoxedSubscription,
};

/// Emit only those values that pass a predicate.
///
/// Every rejected value consumed one unit of the downstream's credit without
/// reaching it, so the stage gives that unit back with `request(1)` on the
/// upstream subscription. Without this a subscriber requesting `n` could wait
/// forever behind non-matching values.
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use backflow::prelude::*;
///
/// let numbers = Source::<i32>::new();
/// let coll = Arc::new(Mutex::new(vec![]));
/// let c_coll = coll.clone();
///
/// numbers.clone().filter(|v| *v % 2 == 0).subscribe_fn(move |v| c_coll.lock().unwrap().push(v));
/// numbers.emit_next(0..10);
///
/// // only even numbers received.
/// assert_eq!(*coll.lock().unwrap(), vec![0, 2, 4, 6, 8]);
/// ```
pub struct Filter<S, F> {
  source: S,
  predicate: Arc<F>,
}

impl<S, F> Filter<S, F> {
  pub fn new(source: S, predicate: F) -> Self { Self { source, predicate: Arc::new(predicate) } }
}

impl<S: Clone, F> Clone for Filter<S, F> {
  fn clone(&self) -> Self { Self { source: self.source.clone(), predicate: self.predicate.clone() } }
}

impl<S, F, T> Publisher<T> for Filter<S, F>
where
  S: Publisher<T>,
  F: Fn(&T) -> bool + Send + Sync + 'static,
  T: 'static,
{
  fn subscribe(&self, subscriber: BoxedSubscriber<T>) {
    self.source.subscribe(Arc::new(FilterSubscriber {
      downstream: subscriber,
      predicate: self.predicate.clone(),
      upstream: OnceCell::new(),
    }))
  }
}

impl<S: Describe, F> Describe for Filter<S, F> {
  fn describe(&self) -> Node<'_> { Node::Filter(&self.source) }
}

struct FilterSubscriber<T, F> {
  downstream: BoxedSubscriber<T>,
  predicate: Arc<F>,
  upstream: OnceCell<BoxedSubscription>,
}

impl<T, F> Subscriber<T> for FilterSubscriber<T, F>
where
  F: Fn(&T) -> bool + Send + Sync,
{
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    let _ = self.upstream.set(subscription.clone());
    self.downstream.on_subscribe(subscription)
  }

  fn on_next(&self, value: T) {
    if (self.predicate)(&value) {
      self.downstream.on_next(value)
    } else if let Some(upstream) = self.upstream.get() {
      upstream.request(1)
    }
  }

  #[inline]
  fn on_error(&self, error: Error) { self.downstream.on_error(error) }

  #[inline]
  fn on_complete(&self) { self.downstream.on_complete() }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, testing::TestSubscriber};

  #[test]
  fn keeps_matching_values() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    source.clone().filter(|v| v % 2 == 0).subscribe(sub.clone());
    source.emit_next(1..=10);
    assert_eq!(sub.values(), vec![2, 4, 6, 8, 10]);
  }

  #[test]
  fn rejected_values_give_credit_back() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::manual();
    source.clone().filter(|v| *v == 42).subscribe(sub.clone());

    sub.request(1);
    source.emit_next([1, 2, 3, 4, 42]);
    assert_eq!(sub.values(), vec![42]);
    assert_eq!(sub.violations(), 0);
  }

  #[test]
  fn compensation_with_unbounded_demand() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    source.clone().filter(|v| *v == 7).subscribe(sub.clone());
    source.emit_next((0..100).filter(|v| *v != 7).chain([7]));
    assert_eq!(sub.values(), vec![7]);
  }

  #[test]
  fn backlog_behind_rejects_still_drains() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::manual();
    source.clone().filter(|v| v % 3 == 0).subscribe(sub.clone());
    source.emit_next(1..=9);
    assert!(sub.values().is_empty());

    sub.request(2);
    assert_eq!(sub.values(), vec![3, 6]);
    sub.request(1);
    assert_eq!(sub.values(), vec![3, 6, 9]);
    assert_eq!(sub.violations(), 0);
  }

  #[test]
  fn completion_passes_through() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    source.clone().filter(|_| false).subscribe(sub.clone());
    source.emit_next([1, 2]);
    source.complete();
    assert!(sub.values().is_empty());
    assert_eq!(sub.completions(), 1);
  }
}
