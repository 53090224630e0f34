//! # Reply Threads
//!
//! Replies come back from the backend as a flat list in creation order, each
//! optionally pointing at a parent reply. This module nests them into a
//! forest for display.
//!
//! ## Rules
//! - Every reply shows up exactly once.
//! - A missing or unknown parent makes the reply top-level instead of
//!   dropping it.
//! - Siblings keep the order they had in the input.
//! - Depth is unbounded here. Capping indentation is a presentation concern.
//!
//! ## Implementation
//! - Index replies by id (first occurrence wins for duplicated ids)
//! - Resolve each reply to a parent position or the top level
//! - Assemble nodes with an explicit stack so long chains cannot blow the call stack
//! - O(n) in the number of replies
//!
//! Dropping and serializing a forest are iterative too, see [`to_json`].
use std::{
    collections::{HashMap, hash_map::Entry},
    mem,
    slice::Iter,
};

use crate::models::{Reply, ReplyId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyNode {
    pub reply: Reply,
    pub children: Vec<ReplyNode>,
}

impl Drop for ReplyNode {
    fn drop(&mut self) {
        let mut pending = mem::take(&mut self.children);

        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

impl ReplyNode {
    /// Number of replies in this subtree, including this one.
    pub fn reply_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];

        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }

        count
    }

    /// Height of this subtree. A leaf has depth 1.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];

        while let Some((node, level)) = stack.pop() {
            deepest = deepest.max(level);
            stack.extend(node.children.iter().map(|child| (child, level + 1)));
        }

        deepest
    }
}

struct Frame {
    index: usize,
    next_child: usize,
    children: Vec<ReplyNode>,
}

impl Frame {
    fn new(index: usize) -> Self {
        Self {
            index,
            next_child: 0,
            children: Vec::new(),
        }
    }
}

pub fn build_reply_tree(replies: &[Reply]) -> Vec<ReplyNode> {
    let mut positions: HashMap<ReplyId, usize> = HashMap::with_capacity(replies.len());
    for (index, reply) in replies.iter().enumerate() {
        if let Entry::Vacant(entry) = positions.entry(reply.id) {
            entry.insert(index);
        }
    }

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); replies.len()];

    for (index, reply) in replies.iter().enumerate() {
        let parent = reply
            .parent_id
            .filter(|&parent_id| parent_id != reply.id)
            .and_then(|parent_id| positions.get(&parent_id).copied())
            .filter(|&parent| parent != index);

        match parent {
            Some(parent) => children[parent].push(index),
            None => roots.push(index),
        }
    }

    let mut visited = vec![false; replies.len()];
    let mut forest = Vec::with_capacity(roots.len());

    for root in roots {
        assemble(root, replies, &children, &mut visited, &mut forest);
    }

    // only reachable when parent links loop back on themselves
    for index in 0..replies.len() {
        if !visited[index] {
            assemble(index, replies, &children, &mut visited, &mut forest);
        }
    }

    forest
}

fn assemble(
    root: usize,
    replies: &[Reply],
    children: &[Vec<usize>],
    visited: &mut [bool],
    forest: &mut Vec<ReplyNode>,
) {
    visited[root] = true;
    let mut stack = vec![Frame::new(root)];

    while let Some(top) = stack.last_mut() {
        if let Some(&child) = children[top.index].get(top.next_child) {
            top.next_child += 1;

            if !visited[child] {
                visited[child] = true;
                stack.push(Frame::new(child));
            }

            continue;
        }

        let Some(frame) = stack.pop() else {
            break;
        };

        let node = ReplyNode {
            reply: replies[frame.index].clone(),
            children: frame.children,
        };

        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => forest.push(node),
        }
    }
}

/// Pre-order walk of the forest, pairing each reply with its depth (0 for
/// top-level replies).
pub fn flatten(forest: &[ReplyNode]) -> Vec<(usize, &Reply)> {
    let mut out = Vec::new();
    let mut stack: Vec<(usize, &ReplyNode)> = forest.iter().rev().map(|node| (0, node)).collect();

    while let Some((depth, node)) = stack.pop() {
        out.push((depth, &node.reply));
        stack.extend(node.children.iter().rev().map(|child| (depth + 1, child)));
    }

    out
}

/// Serializes the forest as a JSON array of reply objects, each carrying the
/// reply's own fields plus a `children` array.
pub fn to_json(forest: &[ReplyNode]) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = vec![b'['];
    let mut levels: Vec<Iter<'_, ReplyNode>> = vec![forest.iter()];
    let mut first = true;

    while let Some(level) = levels.last_mut() {
        match level.next() {
            Some(node) => {
                if !first {
                    out.push(b',');
                }

                // reply fields without the closing brace
                let fields = serde_json::to_vec(&node.reply)?;
                out.extend_from_slice(&fields[..fields.len() - 1]);
                out.extend_from_slice(b",\"children\":[");

                first = true;
                levels.push(node.children.iter());
            }
            None => {
                levels.pop();
                out.push(b']');
                if !levels.is_empty() {
                    out.push(b'}');
                }

                first = false;
            }
        }
    }

    Ok(out)
}
