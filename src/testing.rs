//! Test support: a recording subscriber with manual demand control.
//!
//! [`TestSubscriber`] records every signal it receives and checks the
//! protocol while doing so: more elements than granted demand, elements
//! after a terminal signal and repeated terminal signals are all counted as
//! violations.

use std::sync::{
  atomic::{AtomicU64, AtomicUsize, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{
  error::Error,
  subscriber::Subscriber,
  subscription::{BoxedSubscription, Demand, Subscription, UNBOUNDED},
};

/// Recording subscriber.
pub struct TestSubscriber<T> {
  subscription: Mutex<Option<BoxedSubscription>>,
  initial_request: u64,
  request_on_next: AtomicU64,
  cancel_after: AtomicUsize,
  granted: Demand,
  values: Mutex<Vec<T>>,
  errors: Mutex<Vec<Error>>,
  completions: AtomicUsize,
  subscriptions: AtomicUsize,
  violations: AtomicUsize,
}

impl<T> TestSubscriber<T> {
  /// Subscriber that requests `n` on subscribe.
  pub fn with_request(n: u64) -> Arc<Self> {
    Arc::new(Self {
      subscription: Mutex::new(None),
      initial_request: n,
      request_on_next: AtomicU64::new(0),
      cancel_after: AtomicUsize::new(0),
      granted: Demand::default(),
      values: Mutex::new(vec![]),
      errors: Mutex::new(vec![]),
      completions: AtomicUsize::new(0),
      subscriptions: AtomicUsize::new(0),
      violations: AtomicUsize::new(0),
    })
  }

  /// Subscriber that requests nothing until told to.
  pub fn manual() -> Arc<Self> { Self::with_request(0) }

  /// Subscriber that requests [`UNBOUNDED`] on subscribe.
  pub fn unbounded() -> Arc<Self> { Self::with_request(UNBOUNDED) }

  /// Requests `n` more after every received element.
  pub fn request_on_next(self: Arc<Self>, n: u64) -> Arc<Self> {
    self.request_on_next.store(n, Ordering::SeqCst);
    self
  }

  /// Cancels from inside `on_next` once `n` elements were received.
  pub fn cancel_after(self: Arc<Self>, n: usize) -> Arc<Self> {
    self.cancel_after.store(n, Ordering::SeqCst);
    self
  }

  pub fn request(&self, n: u64) {
    let subscription = self.subscription.lock().clone();
    if let Some(subscription) = subscription {
      self.granted.add(n);
      subscription.request(n);
    }
  }

  pub fn cancel(&self) {
    let subscription = self.subscription.lock().clone();
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
  }

  pub fn errors(&self) -> Vec<Error> { self.errors.lock().clone() }

  pub fn completions(&self) -> usize { self.completions.load(Ordering::SeqCst) }

  /// Number of `on_subscribe` calls received.
  pub fn subscriptions(&self) -> usize { self.subscriptions.load(Ordering::SeqCst) }

  pub fn value_count(&self) -> usize { self.values.lock().len() }

  pub fn is_terminated(&self) -> bool { self.completions() > 0 || !self.errors.lock().is_empty() }

  /// Protocol breaches observed so far.
  pub fn violations(&self) -> usize { self.violations.load(Ordering::SeqCst) }

  fn violation(&self) { self.violations.fetch_add(1, Ordering::SeqCst); }
}

impl<T: Clone> TestSubscriber<T> {
  pub fn values(&self) -> Vec<T> { self.values.lock().clone() }
}

impl<T: Send> Subscriber<T> for TestSubscriber<T> {
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    if self.subscriptions.fetch_add(1, Ordering::SeqCst) > 0 {
      self.violation();
    }
    *self.subscription.lock() = Some(subscription);
    if self.initial_request > 0 {
      self.request(self.initial_request);
    }
  }

  fn on_next(&self, value: T) {
    if self.is_terminated() {
      self.violation();
    }
    let received = {
      let mut values = self.values.lock();
      values.push(value);
      values.len()
    };
    if !self.granted.is_unbounded() && received as u64 > self.granted.get() {
      self.violation();
    }

    let more = self.request_on_next.load(Ordering::SeqCst);
    if more > 0 {
      self.request(more);
    }
    if self.cancel_after.load(Ordering::SeqCst) == received {
      self.cancel();
    }
  }

  fn on_error(&self, error: Error) {
    if self.is_terminated() {
      self.violation();
    }
    self.errors.lock().push(error);
  }

  fn on_complete(&self) {
    if self.is_terminated() {
      self.violation();
    }
    self.completions.fetch_add(1, Ordering::SeqCst);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Noop;

  impl Subscription for Noop {
    fn request(&self, _: u64) {}
    fn cancel(&self) {}
  }

  #[test]
  fn flags_excess_elements() {
    let sub = TestSubscriber::<i32>::manual();
    sub.on_subscribe(Arc::new(Noop));
    sub.request(1);
    sub.on_next(1);
    assert_eq!(sub.violations(), 0);
    sub.on_next(2);
    assert_eq!(sub.violations(), 1);
  }

  #[test]
  fn flags_signals_after_termination() {
    let sub = TestSubscriber::<i32>::unbounded();
    sub.on_subscribe(Arc::new(Noop));
    sub.on_complete();
    sub.on_next(1);
    sub.on_complete();
    assert_eq!(sub.violations(), 2);
  }
}
