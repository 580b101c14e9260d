//! Depth-first flattening of nested comment trees.

use crate::types::{CommentNode, FlatComment};

/// Flattens `nodes` into pre-order: every comment is emitted before its
/// replies, siblings keep upstream order, and a reply's depth is its parent's
/// depth plus one. Top-level comments have depth 0.
pub fn flatten(nodes: &[CommentNode], post_id: &str) -> Vec<FlatComment> {
    let capacity = nodes.iter().map(CommentNode::subtree_len).sum();
    let mut out = Vec::with_capacity(capacity);
    for node in nodes {
        push_subtree(node, post_id, 0, &mut out);
    }
    out
}

fn push_subtree(node: &CommentNode, post_id: &str, depth: usize, out: &mut Vec<FlatComment>) {
    out.push(FlatComment {
        id: node.id.clone(),
        post_id: post_id.to_string(),
        author: node.author.clone(),
        body: node.body.clone(),
        score: node.score,
        created_at: node.created_at,
        depth,
    });
    for child in &node.children {
        push_subtree(child, post_id, depth + 1, out);
    }
}
