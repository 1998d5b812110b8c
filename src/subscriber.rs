//! Subscriber trait and the closure-backed [`LambdaSubscriber`]
//!
//! A subscriber receives `on_subscribe` exactly once, then any number of
//! `on_next`, terminated by at most one of `on_error` / `on_complete`.
//! All methods take `&self`: callbacks may arrive re-entrantly (for example a
//! stage cancelling its upstream from inside `on_next`), so implementations
//! keep their state behind atomics or short-lived locks.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::{
  error::Error,
  subscription::{BoxedSubscription, Subscription, UNBOUNDED},
};

/// Consumer of a value sequence.
pub trait Subscriber<T>: Send + Sync {
  /// Hands over the subscription controlling this flow.
  fn on_subscribe(&self, subscription: BoxedSubscription);

  /// Receives the next element.
  fn on_next(&self, value: T);

  /// Receives a terminal failure.
  fn on_error(&self, error: Error);

  /// Receives the terminal completion.
  fn on_complete(&self);
}

impl<T, S: Subscriber<T> + ?Sized> Subscriber<T> for Arc<S> {
  #[inline]
  fn on_subscribe(&self, subscription: BoxedSubscription) { (**self).on_subscribe(subscription) }

  #[inline]
  fn on_next(&self, value: T) { (**self).on_next(value) }

  #[inline]
  fn on_error(&self, error: Error) { (**self).on_error(error) }

  #[inline]
  fn on_complete(&self) { (**self).on_complete() }
}

/// Type-erased subscriber as stored by stages.
pub type BoxedSubscriber<T> = Arc<dyn Subscriber<T>>;

// ============================================================================
// LambdaSubscriber - Closure adapter
// ============================================================================

type ErrorFn = Box<dyn Fn(Error) + Send + Sync>;
type CompleteFn = Box<dyn Fn() + Send + Sync>;

/// Subscriber built from closures.
///
/// By default it requests [`UNBOUNDED`] demand as soon as it is subscribed and
/// ignores errors and completion.
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use backflow::prelude::*;
///
/// let source = Source::<i32>::new();
/// let seen = Arc::new(Mutex::new(vec![]));
/// let c_seen = seen.clone();
/// source.subscribe(LambdaSubscriber::new(move |v: i32| c_seen.lock().unwrap().push(v)).boxed());
///
/// source.emit_next([1, 2, 3]);
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
/// ```
pub struct LambdaSubscriber<F> {
  next: F,
  error: Option<ErrorFn>,
  complete: Option<CompleteFn>,
  initial_request: u64,
  subscription: OnceCell<BoxedSubscription>,
}

impl<F> LambdaSubscriber<F> {
  pub fn new(next: F) -> Self {
    Self {
      next,
      error: None,
      complete: None,
      initial_request: UNBOUNDED,
      subscription: OnceCell::new(),
    }
  }

  /// Replaces the demand granted on subscribe; `0` leaves requesting to the
  /// caller through [`LambdaSubscriber::subscription`].
  pub fn initial_request(mut self, n: u64) -> Self {
    self.initial_request = n;
    self
  }

  pub fn on_error(mut self, f: impl Fn(Error) + Send + Sync + 'static) -> Self {
    self.error = Some(Box::new(f));
    self
  }

  pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
    self.complete = Some(Box::new(f));
    self
  }

  /// The subscription received in `on_subscribe`, once subscribed.
  pub fn subscription(&self) -> Option<&BoxedSubscription> { self.subscription.get() }

  pub fn boxed<T>(self) -> BoxedSubscriber<T>
  where
    Self: Subscriber<T> + 'static,
  {
    Arc::new(self)
  }
}

impl<T, F> Subscriber<T> for LambdaSubscriber<F>
where
  F: Fn(T) + Send + Sync,
{
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    let subscription = self.subscription.get_or_init(|| subscription);
    if self.initial_request > 0 {
      subscription.request(self.initial_request);
    }
  }

  #[inline]
  fn on_next(&self, value: T) { (self.next)(value) }

  fn on_error(&self, error: Error) {
    if let Some(f) = &self.error {
      f(error);
    }
  }

  fn on_complete(&self) {
    if let Some(f) = &self.complete {
      f();
    }
  }
}
