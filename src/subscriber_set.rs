//! Live membership of a multicast stage.
//!
//! Every stage that fans out to, or fans in from, several subscriptions keeps
//! them in a [`SubscriberSet`]: the source stage's credit queues, the
//! buffered stage's cursors and the inner subscribers of a tracked flat-map.
//! Each member learns its key while it is being built, so it can later leave
//! the set on its own.
//!
//! A set can be closed once. Closing reports who was present; members that
//! join afterwards are built but never admitted, which is how a stage that
//! already terminated still hands every newcomer a handle of its own.

use smallvec::SmallVec;

/// Point-in-time copy of the members, taken under the caller's lock and used
/// after releasing it.
pub(crate) type Members<U> = SmallVec<[U; 2]>;

/// Result of [`SubscriberSet::join`].
pub(crate) enum Joined<U> {
  /// The member was admitted.
  Live(U),
  /// The set was already closed; the member was built but not kept.
  Closed(U),
}

impl<U> Joined<U> {
  pub(crate) fn into_inner(self) -> U {
    match self {
      Joined::Live(u) | Joined::Closed(u) => u,
    }
  }
}

pub(crate) struct SubscriberSet<U> {
  keys: usize,
  live: SmallVec<[(usize, U); 2]>,
  closed: bool,
}

impl<U> Default for SubscriberSet<U> {
  fn default() -> Self { Self { keys: 0, live: SmallVec::new(), closed: false } }
}

impl<U: Clone> SubscriberSet<U> {
  /// Builds a member around a fresh key and admits it unless the set is
  /// closed. Keys are never handed out twice.
  pub(crate) fn join(&mut self, build: impl FnOnce(usize) -> U) -> Joined<U> {
    let key = self.keys;
    self.keys += 1;
    let member = build(key);
    if self.closed {
      return Joined::Closed(member);
    }
    self.live.push((key, member.clone()));
    Joined::Live(member)
  }

  /// Current members, or `None` once the set is closed.
  pub(crate) fn open_members(&self) -> Option<Members<U>> {
    (!self.closed).then(|| self.members())
  }

  pub(crate) fn members(&self) -> Members<U> { self.live.iter().map(|(_, u)| u.clone()).collect() }

  /// Closes the set and returns the members present at that moment. They
  /// stay registered until they leave. `None` if it was already closed.
  pub(crate) fn close(&mut self) -> Option<Members<U>> {
    if std::mem::replace(&mut self.closed, true) {
      return None;
    }
    Some(self.members())
  }

  /// Closes the set and removes every member, for stages that tear all of
  /// them down at once.
  pub(crate) fn evict_all(&mut self) -> Members<U> {
    self.closed = true;
    self.live.drain(..).map(|(_, u)| u).collect()
  }
}

impl<U> SubscriberSet<U> {
  /// Removes the member with `key`. True if it was still present.
  pub(crate) fn leave(&mut self, key: usize) -> bool {
    match self.live.iter().position(|(k, _)| *k == key) {
      Some(at) => {
        self.live.remove(at);
        true
      }
      None => false,
    }
  }

  #[inline]
  pub(crate) fn len(&self) -> usize { self.live.len() }

  #[inline]
  pub(crate) fn is_empty(&self) -> bool { self.live.is_empty() }

  /// Members with their keys, in join order.
  pub(crate) fn keyed(&self) -> impl Iterator<Item = (usize, &U)> {
    self.live.iter().map(|(key, u)| (*key, u))
  }
}
