//! Read-only view of a constructed pipeline.
//!
//! Every stage implements [`Describe`], returning a [`Node`] that names its
//! kind and borrows its upstream stage(s). A diagram or debug renderer walks
//! the graph by matching on the variants; nothing here mutates a stage.

/// One live subscription of a source stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberLink {
  /// Key of the subscription within its source.
  pub id: usize,
  /// Credit granted but not yet used.
  pub demand: u64,
  /// Values waiting for credit.
  pub queued: usize,
}

/// A stage and its upstream reference(s).
pub enum Node<'a> {
  Source { links: Vec<SubscriberLink> },
  Map(&'a dyn Describe),
  Filter(&'a dyn Describe),
  Next(&'a dyn Describe),
  Collect(&'a dyn Describe),
  FlatMap(&'a dyn Describe),
  Buffered(&'a dyn Describe),
  Concat(Vec<&'a dyn Describe>),
  /// A publisher that is not one of the built-in stages.
  Opaque,
}

impl<'a> Node<'a> {
  pub fn kind(&self) -> &'static str {
    match self {
      Node::Source { .. } => "source",
      Node::Map(_) => "map",
      Node::Filter(_) => "filter",
      Node::Next(_) => "next",
      Node::Collect(_) => "collect",
      Node::FlatMap(_) => "flat_map",
      Node::Buffered(_) => "buffered",
      Node::Concat(_) => "concat",
      Node::Opaque => "opaque",
    }
  }

  /// Upstream stages, in subscription order.
  pub fn parents(&self) -> Vec<&'a dyn Describe> {
    match self {
      Node::Source { .. } | Node::Opaque => vec![],
      Node::Map(p)
      | Node::Filter(p)
      | Node::Next(p)
      | Node::Collect(p)
      | Node::FlatMap(p)
      | Node::Buffered(p) => vec![*p],
      Node::Concat(ps) => ps.clone(),
    }
  }
}

/// Implemented by every stage to expose its place in the graph.
pub trait Describe {
  fn describe(&self) -> Node<'_>;
}

impl<D: Describe + ?Sized> Describe for std::sync::Arc<D> {
  fn describe(&self) -> Node<'_> { (**self).describe() }
}

/// Depth-first walk from `root` towards the sources. `visit` receives the
/// depth (root = 0) and each node.
pub fn walk(root: &dyn Describe, visit: &mut dyn FnMut(usize, &Node<'_>)) {
  fn go(stage: &dyn Describe, depth: usize, visit: &mut dyn FnMut(usize, &Node<'_>)) {
    let node = stage.describe();
    visit(depth, &node);
    for parent in node.parents() {
      go(parent, depth + 1, visit);
    }
  }
  go(root, 0, visit)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{prelude::*, testing::TestSubscriber};

  fn kinds(root: &dyn Describe) -> Vec<(usize, &'static str)> {
    let mut out = vec![];
    walk(root, &mut |depth, node| out.push((depth, node.kind())));
    out
  }

  #[test]
  fn linear_chain() {
    let source = Source::<i32>::new();
    let stage = source.clone().filter(|v| *v > 1).map(|v| v * 2).next();
    assert_eq!(kinds(&stage), vec![(0, "next"), (1, "map"), (2, "filter"), (3, "source")]);
  }

  #[test]
  fn concat_lists_every_parent() {
    let source = Source::<i32>::new();
    let parts = (0..3).map(|i| source.clone().filter(move |v| *v == i).next());
    let stage = concat(parts).unwrap().collect_list();
    let kinds = kinds(&stage);
    assert_eq!(kinds[0], (0, "collect"));
    assert_eq!(kinds[1], (1, "concat"));
    assert_eq!(kinds.iter().filter(|(_, k)| *k == "source").count(), 3);
  }

  #[test]
  fn source_exposes_live_links() {
    let source = Source::<i32>::new();
    let _buffered = source.clone().buffer();
    source.clone().subscribe(TestSubscriber::<i32>::manual());

    match source.describe() {
      Node::Source { links } => {
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].demand, UNBOUNDED);
        assert_eq!(links[1].demand, 0);
      }
      _ => panic!("expected a source node"),
    }
  }
}
