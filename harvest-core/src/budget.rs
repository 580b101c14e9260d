//! Global comment budget shared by every post in a run.

use crate::types::FlatComment;
use serde::Serialize;

/// Outcome of offering one post's comments to the budget.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub accepted: Vec<FlatComment>,
    pub remaining: usize,
    pub should_stop: bool,
}

/// Accepts as many of `comments` as `remaining` allows, keeping flattened
/// order. Signals stop once nothing is left for later posts.
pub fn admit(mut comments: Vec<FlatComment>, remaining: usize) -> Admission {
    if comments.len() <= remaining {
        let remaining = remaining - comments.len();
        Admission {
            accepted: comments,
            remaining,
            should_stop: remaining == 0,
        }
    } else {
        comments.truncate(remaining);
        Admission {
            accepted: comments,
            remaining: 0,
            should_stop: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchBudget {
    target_total: usize,
    consumed: usize,
}

impl FetchBudget {
    pub fn new(target_total: usize) -> Self {
        Self {
            target_total,
            consumed: 0,
        }
    }

    pub fn target_total(&self) -> usize {
        self.target_total
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.target_total - self.consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.target_total
    }

    pub fn admit(&mut self, comments: Vec<FlatComment>) -> Admission {
        let admission = admit(comments, self.remaining());
        self.consumed += admission.accepted.len();
        debug_assert!(self.consumed <= self.target_total);
        admission
    }
}
