//! Push-side front end for producers.
//!
//! A [`Sink`] is a [`Source`] seen from the producing side: values are pushed
//! in with [`Sink::emit_next`] and the flow is ended with [`Sink::complete`].
//! Hand the sink to whoever produces and the publisher view
//! (`sink.publisher()` or the sink itself) to whoever consumes.

use crate::{
  graph::{Describe, Node},
  publisher::Publisher,
  source::Source,
  subscriber::BoxedSubscriber,
};

/// Manual emitter over a multicast [`Source`].
///
/// ```
/// use backflow::prelude::*;
///
/// let sink = Sink::<&str>::new();
/// let words = sink.publisher().collect_list().boxed();
///
/// let out = std::sync::Arc::new(std::sync::Mutex::new(vec![]));
/// let c_out = out.clone();
/// words.subscribe_fn(move |list| c_out.lock().unwrap().extend(list));
///
/// sink.emit_next(["hello", "world"]);
/// sink.complete();
/// assert_eq!(*out.lock().unwrap(), vec!["hello", "world"]);
/// ```
pub struct Sink<T> {
  source: Source<T>,
}

impl<T> Clone for Sink<T> {
  fn clone(&self) -> Self { Self { source: self.source.clone() } }
}

impl<T> Default for Sink<T> {
  fn default() -> Self { Self { source: Source::new() } }
}

impl<T> Sink<T> {
  pub fn new() -> Self { Self::default() }

  /// Publisher side of this sink, sharing its subscriber set.
  pub fn publisher(&self) -> Source<T> { self.source.clone() }

  pub fn complete(&self) { self.source.complete() }
}

impl<T: Clone> Sink<T> {
  /// Emits `values` to every current subscriber.
  pub fn emit_next(&self, values: impl IntoIterator<Item = T>) -> &Self {
    self.source.emit_next(values);
    self
  }
}

impl<T> From<Source<T>> for Sink<T> {
  fn from(source: Source<T>) -> Self { Self { source } }
}

impl<T: Send + 'static> Publisher<T> for Sink<T> {
  #[inline]
  fn subscribe(&self, subscriber: BoxedSubscriber<T>) { self.source.subscribe(subscriber) }
}

impl<T> Describe for Sink<T> {
  fn describe(&self) -> Node<'_> { self.source.describe() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::TestSubscriber;

  #[test]
  fn pushes_to_subscribers() {
    let sink = Sink::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    sink.subscribe(sub.clone());
    sink.emit_next([1]).emit_next([2]);
    sink.complete();
    assert_eq!(sub.values(), vec![1, 2]);
    assert_eq!(sub.completions(), 1);
  }

  #[test]
  fn wraps_an_existing_source() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    source.subscribe(sub.clone());

    let sink = Sink::from(source.clone());
    sink.emit_next([7]).complete();
    assert_eq!(sub.values(), vec![7]);
    assert_eq!(sub.completions(), 1);
    assert!(source.is_terminated());
  }
}
