//! Randomized attempt order over a shard's node set.

use rand::Rng;
use rand::seq::SliceRandom;
use stow_types::NodeId;

/// Return a uniformly random permutation of `nodes`.
///
/// Each call draws a new order, spreading initial writes across nodes. The
/// input is left untouched.
pub fn attempt_order(nodes: &[NodeId]) -> Vec<NodeId> {
    attempt_order_with(nodes, &mut rand::rng())
}

/// Like [`attempt_order`], drawing from the given generator.
pub fn attempt_order_with<R: Rng + ?Sized>(nodes: &[NodeId], rng: &mut R) -> Vec<NodeId> {
    let mut order = nodes.to_vec();
    order.shuffle(rng);
    order
}
