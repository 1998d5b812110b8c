//! Multicast hot publisher
//!
//! [`Source`] is where values enter a pipeline. It keeps the set of live
//! [`CreditQueue`] subscriptions and fans every emitted value out to each of
//! them. Subscribers only see values emitted while they are registered.
//!
//! # Locking
//!
//! The subscriber set and the terminal state share one lock. It is held only to
//! add/remove an entry or to copy the current entries out; every callback
//! runs on the copy, after the lock is released, so a subscriber may cancel
//! or subscribe again from inside `on_next` without deadlocking.

use std::{
  fmt,
  sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
  credit_queue::CreditQueue,
  error::Error,
  graph::{Describe, Node, SubscriberLink},
  publisher::Publisher,
  subscriber::BoxedSubscriber,
  subscriber_set::{Members, SubscriberSet},
};

#[derive(Clone)]
enum Terminal {
  Completed,
  Failed(Error),
}

struct SourceState<T> {
  queues: SubscriberSet<Arc<CreditQueue<T>>>,
  /// Set together with closing `queues`.
  terminal: Option<Terminal>,
}

struct SourceCore<T> {
  state: Mutex<SourceState<T>>,
}

impl<T> SourceCore<T> {
  fn detach(&self, id: usize) {
    if self.state.lock().queues.leave(id) {
      trace!(id, "subscription removed");
    }
  }
}

/// Hot multicast publisher with manual emission.
///
/// Cloning is cheap and every clone drives the same subscriber set.
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use backflow::prelude::*;
///
/// let numbers = Source::<i32>::new();
/// let seen = Arc::new(Mutex::new(vec![]));
/// let c_seen = seen.clone();
/// numbers.clone().filter(|v: &i32| v % 2 == 0).subscribe_fn(move |v| c_seen.lock().unwrap().push(v));
///
/// numbers.emit_next(1..=6);
/// assert_eq!(*seen.lock().unwrap(), vec![2, 4, 6]);
/// ```
pub struct Source<T> {
  core: Arc<SourceCore<T>>,
}

impl<T> Clone for Source<T> {
  fn clone(&self) -> Self { Self { core: self.core.clone() } }
}

impl<T> Default for Source<T> {
  fn default() -> Self {
    Self {
      core: Arc::new(SourceCore {
        state: Mutex::new(SourceState { queues: SubscriberSet::default(), terminal: None }),
      }),
    }
  }
}

impl<T> Source<T> {
  pub fn new() -> Self { Self::default() }

  /// Number of live subscriptions.
  pub fn subscriber_count(&self) -> usize { self.core.state.lock().queues.len() }

  /// Whether `complete` or `error` has been called.
  pub fn is_terminated(&self) -> bool { self.core.state.lock().terminal.is_some() }

  /// Read-only view of the live subscriptions.
  pub fn links(&self) -> Vec<SubscriberLink> {
    self
      .core
      .state
      .lock()
      .queues
      .keyed()
      .map(|(id, queue)| SubscriberLink { id, demand: queue.demand(), queued: queue.queued() })
      .collect()
  }

  fn snapshot(&self) -> Option<Members<Arc<CreditQueue<T>>>> {
    self.core.state.lock().queues.open_members()
  }

  /// Terminates the stage. Each subscription completes once its backlog is
  /// delivered. Later calls are no-ops.
  pub fn complete(&self) {
    let Some(queues) = self.terminate(Terminal::Completed) else { return };
    debug!(subscribers = queues.len(), "source completed");
    for queue in queues {
      queue.complete();
    }
  }

  /// Terminates the stage with a failure delivered to every subscription
  /// ahead of its backlog. Later calls are no-ops.
  pub fn error(&self, error: Error) {
    let Some(queues) = self.terminate(Terminal::Failed(error.clone())) else { return };
    debug!(subscribers = queues.len(), label = error.as_label(), "source failed");
    for queue in queues {
      queue.fail(error.clone());
    }
  }

  fn terminate(&self, terminal: Terminal) -> Option<Members<Arc<CreditQueue<T>>>> {
    let mut state = self.core.state.lock();
    let queues = state.queues.close()?;
    state.terminal = Some(terminal);
    Some(queues)
  }
}

impl<T: Clone> Source<T> {
  /// Emits `values` in order to every currently registered subscriber.
  ///
  /// The subscriber set is snapshotted per value, so a subscriber registered while
  /// an earlier value of the same call was being delivered receives the
  /// remaining ones. Values emitted after termination are dropped.
  pub fn emit_next(&self, values: impl IntoIterator<Item = T>) -> &Self {
    for value in values {
      let Some(queues) = self.snapshot() else {
        warn!("emit_next called on a terminated source, dropping values");
        return self;
      };
      broadcast(queues, value);
    }
    self
  }
}

/// Clones the value for every queue except the last one, which takes it.
fn broadcast<T: Clone>(queues: Members<Arc<CreditQueue<T>>>, value: T) {
  let mut iter = queues.into_iter().peekable();
  while let Some(queue) = iter.next() {
    if iter.peek().is_some() {
      queue.push(value.clone());
    } else {
      queue.push(value);
      break;
    }
  }
}

impl<T: Send + 'static> Publisher<T> for Source<T> {
  fn subscribe(&self, subscriber: BoxedSubscriber<T>) {
    let weak: Weak<SourceCore<T>> = Arc::downgrade(&self.core);
    let (queue, terminal) = {
      let mut state = self.core.state.lock();
      let queue = state.queues.join(|key| {
        Arc::new(CreditQueue::new(key, subscriber.clone(), move |key| {
          if let Some(core) = weak.upgrade() {
            core.detach(key);
          }
        }))
      });
      (queue.into_inner(), state.terminal.clone())
    };
    trace!(id = queue.id(), "subscribe");

    subscriber.on_subscribe(queue.clone());
    match terminal {
      None => {}
      Some(Terminal::Completed) => queue.complete(),
      Some(Terminal::Failed(error)) => queue.fail(error),
    }
  }
}

impl<T> Describe for Source<T> {
  fn describe(&self) -> Node<'_> { Node::Source { links: self.links() } }
}

impl<T> fmt::Debug for Source<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Source")
      .field("subscribers", &self.subscriber_count())
      .field("terminated", &self.is_terminated())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::TestSubscriber;

  #[test]
  fn fans_out_to_every_subscriber() {
    let source = Source::<i32>::new();
    let a = TestSubscriber::<i32>::unbounded();
    let b = TestSubscriber::<i32>::unbounded();
    source.subscribe(a.clone());
    source.subscribe(b.clone());

    source.emit_next([1, 2]).emit_next([3]);
    assert_eq!(a.values(), vec![1, 2, 3]);
    assert_eq!(b.values(), vec![1, 2, 3]);
  }

  #[test]
  fn late_subscriber_misses_past_values() {
    let source = Source::<i32>::new();
    let early = TestSubscriber::<i32>::unbounded();
    source.subscribe(early.clone());
    source.emit_next([1, 2]);

    let late = TestSubscriber::<i32>::unbounded();
    source.subscribe(late.clone());
    source.emit_next([3]);

    assert_eq!(early.values(), vec![1, 2, 3]);
    assert_eq!(late.values(), vec![3]);
  }

  #[test]
  fn cancel_removes_subscription() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    source.subscribe(sub.clone());
    assert_eq!(source.subscriber_count(), 1);

    sub.cancel();
    assert_eq!(source.subscriber_count(), 0);
    assert_eq!(sub.completions(), 1);
    source.emit_next([1]);
    assert!(sub.values().is_empty());
  }

  #[test]
  fn cancel_from_inside_on_next() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded().cancel_after(2);
    source.subscribe(sub.clone());

    source.emit_next(1..=5);
    assert_eq!(sub.values(), vec![1, 2]);
    assert_eq!(sub.completions(), 1);
    assert_eq!(source.subscriber_count(), 0);
  }

  #[test]
  fn completion_is_deferred_until_drained() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::manual();
    source.subscribe(sub.clone());
    source.emit_next([1, 2, 3]);
    source.complete();
    assert_eq!(sub.completions(), 0);
    assert_eq!(source.subscriber_count(), 1);

    sub.request(3);
    assert_eq!(sub.values(), vec![1, 2, 3]);
    assert_eq!(sub.completions(), 1);
    assert_eq!(source.subscriber_count(), 0);
  }

  #[test]
  fn emit_after_complete_is_dropped() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::unbounded();
    source.subscribe(sub.clone());
    source.complete();
    source.complete();
    source.emit_next([1]);
    assert!(sub.values().is_empty());
    assert_eq!(sub.completions(), 1);
  }

  #[test]
  fn subscriber_after_termination_gets_terminal_signal() {
    let source = Source::<i32>::new();
    source.error(Error::msg("gone"));

    let sub = TestSubscriber::<i32>::unbounded();
    source.subscribe(sub.clone());
    assert_eq!(sub.subscriptions(), 1);
    assert_eq!(sub.errors().len(), 1);
    assert_eq!(source.subscriber_count(), 0);
  }

  #[test]
  fn links_report_demand_and_backlog() {
    let source = Source::<i32>::new();
    let sub = TestSubscriber::<i32>::manual();
    source.subscribe(sub.clone());
    source.emit_next([1, 2, 3]);
    sub.request(1);

    let links = source.links();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].demand, 0);
    assert_eq!(links[0].queued, 2);
  }
}
