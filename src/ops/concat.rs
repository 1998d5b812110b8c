use std::{
  marker::PhantomData,
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Weak,
  },
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
  error::{Error, Result},
  graph::{Describe, Node},
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{BoxedSubscription, Demand, DrainGuard, Subscription},
};

/// Subscribes to a list of publishers one after another, forwarding each
/// one's values and moving on when it completes.
///
/// Demand the downstream granted but that was not yet satisfied when one
/// upstream completes is re-issued to the next upstream, so a downstream
/// requesting `n` once keeps receiving until `n` values arrived overall.
///
/// The first error ends the whole stage.
pub struct Concat<P> {
  sources: Arc<[P]>,
}

impl<P> Concat<P> {
  /// Fails with [`Error::EmptyConcat`] when `sources` yields nothing.
  pub fn new(sources: impl IntoIterator<Item = P>) -> Result<Self> {
    let sources: Arc<[P]> = sources.into_iter().collect();
    if sources.is_empty() {
      return Err(Error::EmptyConcat);
    }
    Ok(Self { sources })
  }

  pub fn len(&self) -> usize { self.sources.len() }

  pub fn is_empty(&self) -> bool { self.sources.is_empty() }
}

impl<P> Clone for Concat<P> {
  fn clone(&self) -> Self { Self { sources: self.sources.clone() } }
}

impl<P, T> Publisher<T> for Concat<P>
where
  P: Publisher<T> + 'static,
  T: 'static,
{
  fn subscribe(&self, subscriber: BoxedSubscriber<T>) {
    let concat = Arc::new_cyclic(|me| ConcatSubscriber {
      me: me.clone(),
      downstream: subscriber,
      sources: self.sources.clone(),
      index: AtomicUsize::new(0),
      current: Mutex::new(None),
      outstanding: Demand::default(),
      switch_pending: AtomicBool::new(true),
      subscribing: DrainGuard::default(),
      cancelled: AtomicBool::new(false),
      done: AtomicBool::new(false),
      _p: PhantomData,
    });
    concat.downstream.on_subscribe(concat.clone());
    concat.advance();
  }
}

impl<P: Describe> Describe for Concat<P> {
  fn describe(&self) -> Node<'_> {
    Node::Concat(self.sources.iter().map(|p| p as &dyn Describe).collect())
  }
}

/// Subscriber to the current upstream and subscription handed downstream.
struct ConcatSubscriber<P, T> {
  me: Weak<Self>,
  downstream: BoxedSubscriber<T>,
  sources: Arc<[P]>,
  index: AtomicUsize,
  /// Active upstream. Its lock also covers every change to `outstanding`
  /// made by `request`, so a newly attached upstream is granted each unit
  /// of demand exactly once.
  current: Mutex<Option<BoxedSubscription>>,
  /// Requested by downstream but not yet delivered.
  outstanding: Demand,
  /// Set when the upstream at `index` still has to be subscribed.
  switch_pending: AtomicBool,
  /// Serializes subscribing, so an upstream completing inside its own
  /// `subscribe` is followed by the next one in a loop, not a nested call.
  subscribing: DrainGuard,
  cancelled: AtomicBool,
  done: AtomicBool,
  _p: PhantomData<fn(T)>,
}

impl<P, T> ConcatSubscriber<P, T>
where
  P: Publisher<T> + 'static,
  T: 'static,
{
  fn advance(&self) { self.subscribing.run(|| self.subscribe_pending()) }

  fn subscribe_pending(&self) {
    if !self.switch_pending.swap(false, Ordering::AcqRel) {
      return;
    }
    let Some(me) = self.me.upgrade() else { return };
    let index = self.index.load(Ordering::Acquire);
    if let Some(source) = self.sources.get(index) {
      source.subscribe(me);
    }
  }

  fn finish(&self) -> bool { !self.done.swap(true, Ordering::AcqRel) }
}

impl<P, T> Subscriber<T> for ConcatSubscriber<P, T>
where
  P: Publisher<T> + 'static,
  T: 'static,
{
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    let outstanding = {
      let mut current = self.current.lock();
      *current = Some(subscription.clone());
      (!self.cancelled.load(Ordering::Acquire)).then(|| self.outstanding.get())
    };
    match outstanding {
      None => subscription.cancel(),
      Some(0) => {}
      Some(n) => subscription.request(n),
    }
  }

  fn on_next(&self, value: T) {
    if self.done.load(Ordering::Acquire) {
      return;
    }
    self.outstanding.consume();
    self.downstream.on_next(value)
  }

  fn on_error(&self, error: Error) {
    if self.finish() {
      self.downstream.on_error(error)
    }
  }

  fn on_complete(&self) {
    if self.done.load(Ordering::Acquire) {
      return;
    }
    let next = self.index.load(Ordering::Acquire) + 1;
    if self.cancelled.load(Ordering::Acquire) || next >= self.sources.len() {
      if self.finish() {
        self.downstream.on_complete();
      }
      return;
    }
    debug!(index = next, total = self.sources.len(), "concat advancing");
    *self.current.lock() = None;
    self.index.store(next, Ordering::Release);
    self.switch_pending.store(true, Ordering::Release);
    self.advance();
  }
}

impl<P, T> Subscription for ConcatSubscriber<P, T>
where
  P: Send + Sync,
{
  fn request(&self, n: u64) {
    if n == 0 || self.cancelled.load(Ordering::Acquire) {
      return;
    }
    let current = {
      let current = self.current.lock();
      self.outstanding.add(n);
      current.clone()
    };
    if let Some(current) = current {
      current.request(n);
    }
  }

  fn cancel(&self) {
    if self.cancelled.swap(true, Ordering::AcqRel) {
      return;
    }
    let current = self.current.lock().clone();
    if let Some(current) = current {
      current.cancel();
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{prelude::*, testing::TestSubscriber};

  #[test]
  fn empty_list_is_rejected() {
    let parts: Vec<Source<i32>> = vec![];
    assert!(matches!(concat(parts), Err(Error::EmptyConcat)));
  }

  #[test]
  fn chains_in_order() {
    let a = Source::<i32>::new();
    let b = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    concat([a.clone(), b.clone()]).unwrap().subscribe(sub.clone());

    b.emit_next([100]);
    a.emit_next([1, 2]);
    a.complete();
    b.emit_next([3]);
    b.complete();

    assert_eq!(sub.values(), vec![1, 2, 3]);
    assert_eq!(sub.completions(), 1);
  }

  #[test]
  fn chain_of_nexts() {
    let source = Source::<i32>::new();
    let parts = (1..=100).map(|i| source.clone().filter(move |v| *v == i).next());
    let sub = TestSubscriber::<i32>::unbounded();
    concat(parts).unwrap().subscribe(sub.clone());

    for _ in 0..2 {
      source.emit_next(1..=100);
    }
    assert_eq!(sub.values(), (1..=100).collect::<Vec<_>>());
    assert_eq!(sub.completions(), 1);
    assert_eq!(sub.violations(), 0);
  }

  #[test]
  fn outstanding_demand_moves_to_next_upstream() {
    let a = Source::<i32>::new();
    let b = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::manual();
    concat([a.clone(), b.clone()]).unwrap().subscribe(sub.clone());

    sub.request(3);
    a.emit_next([1]);
    a.complete();
    b.emit_next([2, 3, 4]);

    assert_eq!(sub.values(), vec![1, 2, 3]);
    assert_eq!(b.links()[0].queued, 1);
    assert_eq!(sub.violations(), 0);
  }

  #[test]
  fn error_ends_the_chain() {
    let a = Source::<i32>::new();
    let b = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    concat([a.clone(), b.clone()]).unwrap().subscribe(sub.clone());

    a.error(Error::msg("boom"));
    assert_eq!(sub.errors().len(), 1);
    assert_eq!(b.subscriber_count(), 0);
  }

  #[test]
  fn cancel_stops_current_and_skips_rest() {
    let a = Source::<i32>::new();
    let b = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    concat([a.clone(), b.clone()]).unwrap().subscribe(sub.clone());

    sub.cancel();
    sub.cancel();
    assert_eq!(a.subscriber_count(), 0);
    assert_eq!(b.subscriber_count(), 0);
    assert_eq!(sub.completions(), 1);
  }

  #[test]
  fn long_chain_of_completed_stages() {
    let source = Source::<i32>::new();
    let replay = source.clone().buffer();
    source.emit_next([1]);
    source.complete();

    let sub = TestSubscriber::<i32>::unbounded();
    concat((0..10_000).map(|_| replay.clone())).unwrap().subscribe(sub.clone());
    assert_eq!(sub.value_count(), 10_000);
    assert_eq!(sub.completions(), 1);
    assert_eq!(sub.violations(), 0);
  }

  #[test]
  fn long_chain_of_terminated_sources() {
    let source = Source::<i32>::new();
    source.complete();

    let sub = TestSubscriber::<i32>::manual();
    concat(vec![source; 10_000]).unwrap().subscribe(sub.clone());
    assert!(sub.values().is_empty());
    assert_eq!(sub.completions(), 1);
  }

  #[test]
  fn concurrent_requests_during_switches() {
    const STAGES: usize = 200;
    const PER_STAGE: usize = 4;
    let source = Source::<usize>::new();
    let replay = source.clone().buffer();
    source.emit_next(0..PER_STAGE);
    source.complete();

    let sub = TestSubscriber::<usize>::manual();
    concat(vec![replay; STAGES]).unwrap().subscribe(sub.clone());

    let handles: Vec<_> = (0..2)
      .map(|_| {
        let sub = sub.clone();
        std::thread::spawn(move || {
          for _ in 0..STAGES * PER_STAGE / 2 {
            sub.request(1);
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(sub.value_count(), STAGES * PER_STAGE);
    assert_eq!(sub.completions(), 1);
    assert_eq!(sub.violations(), 0);
  }

  #[test]
  fn mixed_stage_types_through_boxing() {
    let source = Source::<i32>::new();
    let parts: Vec<BoxedPublisher<i32>> =
      vec![source.clone().next().boxed(), source.clone().map(|v| v * 10).next().boxed()];
    let sub = TestSubscriber::<Vec<i32>>::unbounded();
    concat(parts).unwrap().collect_list().subscribe(sub.clone());

    source.emit_next([1, 2]);
    assert_eq!(sub.values(), vec![vec![1, 20]]);
  }
}
