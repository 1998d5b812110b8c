//! Prelude module for convenient imports
//!
//! This module re-exports the protocol traits, the stages and the builders.

// Protocol
pub use crate::publisher::{concat, BoxedPublisher, Publisher, PublisherExt};
pub use crate::subscriber::{BoxedSubscriber, LambdaSubscriber, Subscriber};
pub use crate::subscription::{BoxedSubscription, Subscription, SubscriptionGuard, UNBOUNDED};
// Stages
#[cfg(feature = "stream")]
pub use crate::ops::into_stream::IntoStream;
pub use crate::ops::{
  buffered::Buffered,
  collect::Collect,
  concat::Concat,
  filter::Filter,
  flat_map::{FlatMap, FlatMapMode},
  map::Map,
  next::Next,
};
pub use crate::{
  error::Error,
  graph::{Describe, Node},
  sink::Sink,
  source::Source,
};
