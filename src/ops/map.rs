use std::{marker::PhantomData, sync::Arc};

use crate::{
  error::Error,
  graph::{Describe, Node},
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::BoxedSubscription,
};

/// Applies a function to every value. Demand, completion and errors pass
/// through untouched.
pub struct Map<S, F, T> {
  source: S,
  func: Arc<F>,
  _p: PhantomData<fn(T)>,
}

impl<S, F, T> Map<S, F, T> {
  pub fn new(source: S, func: F) -> Self { Self { source, func: Arc::new(func), _p: PhantomData } }
}

impl<S: Clone, F, T> Clone for Map<S, F, T> {
  fn clone(&self) -> Self {
    Self { source: self.source.clone(), func: self.func.clone(), _p: PhantomData }
  }
}

impl<S, F, T, U> Publisher<U> for Map<S, F, T>
where
  S: Publisher<T>,
  F: Fn(T) -> U + Send + Sync + 'static,
  T: 'static,
  U: 'static,
{
  fn subscribe(&self, subscriber: BoxedSubscriber<U>) {
    self.source.subscribe(Arc::new(MapSubscriber { downstream: subscriber, func: self.func.clone() }))
  }
}

impl<S: Describe, F, T> Describe for Map<S, F, T> {
  fn describe(&self) -> Node<'_> { Node::Map(&self.source) }
}

struct MapSubscriber<U, F> {
  downstream: BoxedSubscriber<U>,
  func: Arc<F>,
}

impl<T, U, F> Subscriber<T> for MapSubscriber<U, F>
where
  F: Fn(T) -> U + Send + Sync,
{
  #[inline]
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    self.downstream.on_subscribe(subscription)
  }

  #[inline]
  fn on_next(&self, value: T) { self.downstream.on_next((self.func)(value)) }

  #[inline]
  fn on_error(&self, error: Error) { self.downstream.on_error(error) }

  #[inline]
  fn on_complete(&self) { self.downstream.on_complete() }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, testing::TestSubscriber};

  #[test]
  fn primitive_type() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    source.clone().map(|v| v * 2).subscribe(sub.clone());
    source.emit_next([100]);
    assert_eq!(sub.values(), vec![200]);
  }

  #[test]
  fn map_types_mixed() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<String>::unbounded();
    source.clone().map(|v| format!("number {v}")).subscribe(sub.clone());
    source.emit_next(1..=3);
    assert_eq!(sub.values(), vec!["number 1", "number 2", "number 3"]);
  }

  #[test]
  fn demand_passes_through() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::manual();
    source.clone().map(|v| v + 1).subscribe(sub.clone());
    source.emit_next(0..5);
    assert!(sub.values().is_empty());

    sub.request(2);
    assert_eq!(sub.values(), vec![1, 2]);
    assert_eq!(sub.violations(), 0);
  }

  #[test]
  fn error_and_completion_pass_through() {
    let source = Source::<i32>::new();
    let a = TestSubscriber::<i32>::unbounded();
    source.clone().map(|v| v).subscribe(a.clone());
    source.complete();
    assert_eq!(a.completions(), 1);

    let failing = Source::<i32>::new();
    let b = TestSubscriber::<i32>::unbounded();
    failing.clone().map(|v| v).subscribe(b.clone());
    failing.error(Error::msg("boom"));
    assert_eq!(b.errors().len(), 1);
    assert_eq!(b.completions(), 0);
  }

  #[test]
  fn stage_is_resubscribable() {
    let source = Source::<i32>::new();
    let stage = source.clone().map(|v| v * 10);
    let a = TestSubscriber::<i32>::unbounded();
    let b = TestSubscriber::<i32>::unbounded();
    stage.subscribe(a.clone());
    stage.subscribe(b.clone());
    source.emit_next([1]);
    assert_eq!(a.values(), vec![10]);
    assert_eq!(b.values(), vec![10]);
  }
}
