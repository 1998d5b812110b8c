//! Subscription trait and demand bookkeeping helpers
//!
//! A [`Subscription`] is the handle a subscriber uses to pull elements
//! (`request`) and to stop the flow (`cancel`). Demand is additive and
//! saturating; a counter that reaches [`UNBOUNDED`] is treated as "no limit".

use std::sync::{
  atomic::{AtomicU64, AtomicUsize, Ordering},
  Arc,
};

/// Demand value meaning "deliver everything".
pub const UNBOUNDED: u64 = u64::MAX;

/// Per-subscriber handle controlling demand and termination.
pub trait Subscription: Send + Sync {
  /// Grants `n` more elements of demand. Additive and saturating.
  fn request(&self, n: u64);

  /// Stops the flow. Idempotent; the first call wins.
  fn cancel(&self);
}

impl<S: Subscription + ?Sized> Subscription for Arc<S> {
  #[inline]
  fn request(&self, n: u64) { (**self).request(n) }

  #[inline]
  fn cancel(&self) { (**self).cancel() }
}

impl<S: Subscription + ?Sized> Subscription for Box<S> {
  #[inline]
  fn request(&self, n: u64) { (**self).request(n) }

  #[inline]
  fn cancel(&self) { (**self).cancel() }
}

/// Type-erased subscription as passed through `on_subscribe`.
pub type BoxedSubscription = Arc<dyn Subscription>;

// ============================================================================
// Demand counter
// ============================================================================

/// Atomic credit counter.
///
/// Increments saturate at [`UNBOUNDED`]; once saturated the counter stays
/// there and [`Demand::consume`] becomes a no-op.
#[derive(Debug, Default)]
pub struct Demand(AtomicU64);

impl Demand {
  pub fn new(initial: u64) -> Self { Self(AtomicU64::new(initial)) }

  /// Adds `n`, saturating. Returns the new value.
  pub fn add(&self, n: u64) -> u64 {
    let prev = self
      .0
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some(c.saturating_add(n)))
      .unwrap_or_else(|c| c);
    prev.saturating_add(n)
  }

  /// Accounts for one delivered element.
  pub fn consume(&self) {
    let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| match c {
      UNBOUNDED | 0 => None,
      c => Some(c - 1),
    });
  }

  #[inline]
  pub fn get(&self) -> u64 { self.0.load(Ordering::Acquire) }

  #[inline]
  pub fn is_unbounded(&self) -> bool { self.get() == UNBOUNDED }
}

// ============================================================================
// Drain serialization
// ============================================================================

/// Work-in-progress counter serializing a drain loop.
///
/// Whoever moves the counter off zero owns the loop; concurrent or re-entrant
/// callers only record a missed pass, which the owner replays before leaving.
/// Emission therefore never runs on two threads at once and never recurses.
#[derive(Debug, Default)]
pub(crate) struct DrainGuard(AtomicUsize);

impl DrainGuard {
  pub(crate) fn run(&self, mut pass: impl FnMut()) {
    if self.0.fetch_add(1, Ordering::AcqRel) != 0 {
      return;
    }
    let mut missed = 1;
    loop {
      pass();
      missed = self.0.fetch_sub(missed, Ordering::AcqRel) - missed;
      if missed == 0 {
        break;
      }
    }
  }
}

// ============================================================================
// SubscriptionGuard
// ============================================================================

/// An RAII implementation of a "scoped subscription".
/// When this structure is dropped (falls out of scope), the subscription is
/// cancelled.
///
/// If you want to cancel it immediately, wrap it in its own scope.
#[must_use]
pub struct SubscriptionGuard(BoxedSubscription);

impl SubscriptionGuard {
  pub fn new(subscription: BoxedSubscription) -> Self { Self(subscription) }

  pub fn request(&self, n: u64) { self.0.request(n) }
}

impl Drop for SubscriptionGuard {
  #[inline]
  fn drop(&mut self) { self.0.cancel() }
}
