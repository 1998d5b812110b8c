//! Error type shared by every stage of a pipeline.
//!
//! Failures travel downstream through `Subscriber::on_error` and are fanned out
//! to many subscribers by the multicast stages, so [`Error`] is cheap to clone.

use std::sync::Arc;

use thiserror::Error;

/// Errors raised by pipeline construction or delivered through `on_error`.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum Error {
  /// `concat` was given an empty list of upstream publishers.
  #[error("concat requires at least one upstream publisher")]
  EmptyConcat,

  /// A producer failed; the cause is forwarded unmodified by every stage.
  #[error("upstream failure: {0}")]
  Upstream(Arc<dyn std::error::Error + Send + Sync + 'static>),

  /// A producer failed with a plain message.
  #[error("{0}")]
  Message(String),
}

impl Error {
  /// Wraps an arbitrary error as an upstream failure.
  pub fn upstream<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Upstream(Arc::new(err))
  }

  /// Builds a failure from a message.
  pub fn msg(message: impl Into<String>) -> Self { Error::Message(message.into()) }

  /// Short stable label for logs.
  pub fn as_label(&self) -> &'static str {
    match self {
      Error::EmptyConcat => "empty_concat",
      Error::Upstream(_) => "upstream",
      Error::Message(_) => "message",
    }
  }
}

/// Result alias used by fallible constructors.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, thiserror::Error)]
  #[error("disk on fire")]
  struct Fire;

  #[test]
  fn upstream_keeps_cause_text() {
    let err = Error::upstream(Fire);
    assert_eq!(err.to_string(), "upstream failure: disk on fire");
    assert_eq!(err.as_label(), "upstream");
  }

  #[test]
  fn clones_share_cause() {
    let err = Error::upstream(Fire);
    let Error::Upstream(a) = err.clone() else { panic!("wrong variant") };
    let Error::Upstream(b) = err else { panic!("wrong variant") };
    assert!(Arc::ptr_eq(&a, &b));
  }

  #[test]
  fn empty_concat_message() {
    assert_eq!(Error::EmptyConcat.to_string(), "concat requires at least one upstream publisher");
    assert_eq!(Error::msg("boom").to_string(), "boom");
  }
}
