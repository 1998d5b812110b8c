//! Operator stages.
//!
//! Each stage is a `(upstream, transformation)` pair that is itself a
//! [`Publisher`](crate::publisher::Publisher). Builders live on
//! [`PublisherExt`](crate::publisher::PublisherExt).

pub mod buffered;
pub mod collect;
pub mod concat;
pub mod filter;
pub mod flat_map;
#[cfg(feature = "stream")]
pub mod into_stream;
pub mod map;
pub mod next;
