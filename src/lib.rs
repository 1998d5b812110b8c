//! # backflow: demand-driven reactive streams
//!
//! A small publish/subscribe runtime with credit-based backpressure. Every
//! subscriber controls its own intake through
//! [`Subscription::request`](subscription::Subscription::request); producers
//! may emit at any rate and values wait in per-subscriber queues until credit
//! arrives.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use backflow::prelude::*;
//!
//! let numbers = Source::<i32>::new();
//! let out = Arc::new(Mutex::new(vec![]));
//! let c_out = out.clone();
//!
//! numbers
//!   .clone()
//!   .filter(|v| v % 2 == 0)
//!   .map(|v| v * 10)
//!   .subscribe_fn(move |v| c_out.lock().unwrap().push(v));
//!
//! numbers.emit_next(0..6);
//! assert_eq!(*out.lock().unwrap(), vec![0, 20, 40]);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] | Re-subscribable source of values; every stage is one |
//! | [`Subscriber`] | Receives `on_subscribe`, `on_next`, `on_error`, `on_complete` |
//! | [`Subscription`] | Grants demand (`request`) or stops the flow (`cancel`) |
//! | [`Source`] / [`Sink`] | Hot multicast entry point with manual emission |
//!
//! Operators are built through [`PublisherExt`]: `map`, `filter`, `next`,
//! `collect_list`, `flat_map`, `flat_map_tracked`, `buffer`, plus the free
//! function [`concat`].
//!
//! All callbacks run synchronously on the calling thread. Stages are
//! `Send + Sync` and may be driven from several threads at once.
//!
//! ## Feature Flags
//!
//! - **`stream`** (default): `into_stream`, bridging a publisher into a
//!   `futures::Stream`.
//!
//! [`Publisher`]: publisher::Publisher
//! [`PublisherExt`]: publisher::PublisherExt
//! [`Subscriber`]: subscriber::Subscriber
//! [`Subscription`]: subscription::Subscription
//! [`Source`]: source::Source
//! [`Sink`]: sink::Sink
//! [`concat`]: publisher::concat

pub mod credit_queue;
pub mod error;
pub mod graph;
pub mod ops;
pub mod prelude;
pub mod publisher;
pub mod sink;
pub mod source;
pub mod subscriber;
mod subscriber_set;
pub mod subscription;
pub mod testing;

// Re-export the prelude module
pub use prelude::*;

pub use crate::error::Result;

// Bring README.md into Cargo-driven doctests. This module is only compiled
// for rustdoc doctest builds.
#[cfg(doctest)]
mod __markdown_doctests {
  mod readme {
    #![doc = include_str!("../README.md")]
  }
}
