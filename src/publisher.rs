//! Publisher trait and the operator builders
//!
//! A [`Publisher`] is a re-subscribable source of values. Operator stages are
//! publishers too: each `subscribe` call wraps the caller in a decorating
//! subscriber and subscribes that wrapper upstream, so independent
//! subscribers to one stage never share mutable state (the buffered and
//! concat stages being the intended exceptions).

use std::sync::Arc;

use crate::{
  error::Result,
  ops::{
    buffered::Buffered,
    collect::Collect,
    concat::Concat,
    filter::Filter,
    flat_map::{FlatMap, FlatMapMode},
    map::Map,
    next::Next,
  },
  subscriber::{BoxedSubscriber, LambdaSubscriber},
};

/// Re-subscribable source of a value sequence.
pub trait Publisher<T>: Send + Sync {
  /// Attaches `subscriber`. The subscriber receives `on_subscribe` before any
  /// other signal. May be called any number of times.
  fn subscribe(&self, subscriber: BoxedSubscriber<T>);
}

impl<T, P: Publisher<T> + ?Sized> Publisher<T> for Arc<P> {
  #[inline]
  fn subscribe(&self, subscriber: BoxedSubscriber<T>) { (**self).subscribe(subscriber) }
}

impl<T, P: Publisher<T> + ?Sized> Publisher<T> for Box<P> {
  #[inline]
  fn subscribe(&self, subscriber: BoxedSubscriber<T>) { (**self).subscribe(subscriber) }
}

/// Type-erased publisher, handy for mixing stage types in one `concat`.
pub type BoxedPublisher<T> = Arc<dyn Publisher<T>>;

/// Operator builders available on every publisher.
pub trait PublisherExt<T>: Publisher<T> + Sized {
  /// Transforms every value with `f`.
  fn map<U, F>(self, f: F) -> Map<Self, F, T>
  where
    F: Fn(T) -> U + Send + Sync + 'static,
  {
    Map::new(self, f)
  }

  /// Forwards only values matching `predicate`. Rejected values are
  /// compensated with `request(1)` upstream so downstream demand never stalls.
  fn filter<F>(self, predicate: F) -> Filter<Self, F>
  where
    F: Fn(&T) -> bool + Send + Sync + 'static,
  {
    Filter::new(self, predicate)
  }

  /// Takes the first value, then cancels upstream and completes.
  fn next(self) -> Next<Self> { Next::new(self) }

  /// Emits every value as one `Vec` when upstream completes.
  fn collect_list(self) -> Collect<Self, T> { Collect::new(self) }

  /// Subscribes to the publisher produced by `f` for every value and merges
  /// their outputs. Inner subscriptions are left to run on their own.
  fn flat_map<U, P, F>(self, f: F) -> FlatMap<Self, F, T>
  where
    F: Fn(T) -> P + Send + Sync + 'static,
    P: Publisher<U>,
  {
    FlatMap::new(self, f, FlatMapMode::Detached)
  }

  /// Like [`PublisherExt::flat_map`], but inner subscriptions are tracked:
  /// they are cancelled with the outer subscription and completion waits
  /// for all of them.
  fn flat_map_tracked<U, P, F>(self, f: F) -> FlatMap<Self, F, T>
  where
    F: Fn(T) -> P + Send + Sync + 'static,
    P: Publisher<U>,
  {
    FlatMap::new(self, f, FlatMapMode::Tracked)
  }

  /// Subscribes eagerly and replays the whole history to every subscriber.
  fn buffer(self) -> Buffered<Self, T>
  where
    T: Clone + Send + Sync + 'static,
  {
    Buffered::new(self)
  }

  /// Subscribes a closure that requests unbounded demand.
  fn subscribe_fn<F>(&self, f: F)
  where
    F: Fn(T) + Send + Sync + 'static,
    T: 'static,
  {
    self.subscribe(Arc::new(LambdaSubscriber::new(f)));
  }

  fn boxed(self) -> BoxedPublisher<T>
  where
    Self: 'static,
  {
    Arc::new(self)
  }

  /// Bridges into a `futures::Stream` that requests one value per poll.
  #[cfg(feature = "stream")]
  fn into_stream(self) -> crate::ops::into_stream::IntoStream<T>
  where
    T: Send + 'static,
  {
    crate::ops::into_stream::IntoStream::new(&self)
  }
}

impl<T, P: Publisher<T>> PublisherExt<T> for P {}

/// Chains `publishers` one after another.
///
/// Fails with [`Error::EmptyConcat`](crate::error::Error::EmptyConcat) when the
/// list is empty.
pub fn concat<P>(publishers: impl IntoIterator<Item = P>) -> Result<Concat<P>> {
  Concat::new(publishers)
}
