//! Bridge from a publisher into a `futures::Stream`.
//!
//! The stream requests one value each time it is polled with nothing
//! buffered, so the async consumer paces the upstream. Items are
//! `Result<T, Error>`: an upstream error is yielded once as `Err`, after
//! which the stream ends. Dropping the stream cancels the subscription.
//!
//! ```rust
//! use futures::{executor::block_on, StreamExt};
//! use backflow::prelude::*;
//!
//! let source = Source::<i32>::new();
//! let buffered = source.clone().buffer();
//! source.emit_next([1, 2, 3]);
//! source.complete();
//!
//! let values: Vec<i32> = block_on(buffered.into_stream().map(|v| v.unwrap()).collect());
//! assert_eq!(values, vec![1, 2, 3]);
//! ```

use std::{
  collections::VecDeque,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll, Waker},
};

use futures::stream::Stream;
use parking_lot::Mutex;

use crate::{
  error::Error,
  publisher::Publisher,
  subscriber::Subscriber,
  subscription::BoxedSubscription,
};

struct IntoStreamState<T> {
  /// Items and errors waiting to be polled.
  queue: VecDeque<Result<T, Error>>,
  waker: Option<Waker>,
  /// Set once the upstream terminated.
  closed: bool,
  subscription: Option<BoxedSubscription>,
  /// A `request(1)` is in flight.
  requested: bool,
}

impl<T> Default for IntoStreamState<T> {
  fn default() -> Self {
    Self { queue: VecDeque::new(), waker: None, closed: false, subscription: None, requested: false }
  }
}

/// `Stream` yielding the values of a publisher.
///
/// Created by [`PublisherExt::into_stream`](crate::publisher::PublisherExt::into_stream).
pub struct IntoStream<T> {
  state: Arc<Mutex<IntoStreamState<T>>>,
}

impl<T: Send + 'static> IntoStream<T> {
  /// Subscribes to `publisher`.
  pub fn new<P: Publisher<T> + ?Sized>(publisher: &P) -> Self {
    let state = Arc::new(Mutex::new(IntoStreamState::default()));
    publisher.subscribe(Arc::new(IntoStreamSubscriber { state: state.clone() }));
    IntoStream { state }
  }
}

impl<T> Stream for IntoStream<T> {
  type Item = Result<T, Error>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    loop {
      let request = {
        let mut state = self.state.lock();
        if let Some(item) = state.queue.pop_front() {
          return Poll::Ready(Some(item));
        }
        if state.closed {
          return Poll::Ready(None);
        }
        state.waker = Some(cx.waker().clone());
        match state.subscription.clone() {
          Some(subscription) if !state.requested => {
            state.requested = true;
            subscription
          }
          _ => return Poll::Pending,
        }
      };
      // The value may arrive synchronously, so look again afterwards.
      request.request(1);
    }
  }
}

impl<T> Drop for IntoStream<T> {
  fn drop(&mut self) {
    let subscription = {
      let mut state = self.state.lock();
      state.closed = true;
      state.subscription.take()
    };
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
  }
}

struct IntoStreamSubscriber<T> {
  state: Arc<Mutex<IntoStreamState<T>>>,
}

impl<T> IntoStreamSubscriber<T> {
  fn update(&self, f: impl FnOnce(&mut IntoStreamState<T>)) {
    let waker = {
      let mut state = self.state.lock();
      f(&mut state);
      state.waker.take()
    };
    if let Some(waker) = waker {
      waker.wake();
    }
  }
}

impl<T: Send> Subscriber<T> for IntoStreamSubscriber<T> {
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    let stale = {
      let mut state = self.state.lock();
      if state.closed {
        Some(subscription)
      } else {
        state.subscription = Some(subscription);
        None
      }
    };
    if let Some(subscription) = stale {
      subscription.cancel();
    }
  }

  fn on_next(&self, value: T) {
    self.update(|state| {
      state.requested = false;
      state.queue.push_back(Ok(value));
    })
  }

  fn on_error(&self, error: Error) {
    self.update(|state| {
      state.queue.push_back(Err(error));
      state.closed = true;
      state.subscription = None;
    })
  }

  fn on_complete(&self) {
    self.update(|state| {
      state.closed = true;
      state.subscription = None;
    })
  }
}
