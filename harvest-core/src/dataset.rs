//! Assembly of the final export document.

use crate::types::{FlatComment, Post, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The comments admitted for one post, in flattened order.
#[derive(Debug, Clone, PartialEq)]
pub struct PostComments {
    pub post: Post,
    pub comments: Vec<FlatComment>,
}

/// Run-level facts the assembler cannot derive from the content itself.
#[derive(Debug, Clone)]
pub struct AssemblyContext {
    pub strategy_tag: String,
    pub status: RunStatus,
    pub target_comment_budget: usize,
    pub fetched_at: DateTime<Utc>,
    pub fetch_duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSummary {
    pub total_comments: usize,
    pub top_level_comments: usize,
    pub reply_comments: usize,
    pub average_score: f64,
    pub max_depth: usize,
}

impl CommentSummary {
    pub fn from_comments(comments: &[FlatComment]) -> Self {
        let top_level_comments = comments.iter().filter(|c| c.depth == 0).count();
        Self {
            total_comments: comments.len(),
            top_level_comments,
            reply_comments: comments.len() - top_level_comments,
            average_score: average_score(comments),
            max_depth: comments.iter().map(|c| c.depth).max().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEntry {
    pub post: Post,
    pub comment_summary: CommentSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub query: String,
    pub fetched_at: DateTime<Utc>,
    pub total_posts: usize,
    pub total_comments: usize,
    pub strategy_tag: String,
    pub status: RunStatus,
    pub partial: bool,
    pub target_comment_budget: usize,
    pub fetch_duration_secs: f64,
    pub comments_per_second: f64,
    pub average_score: f64,
}

/// The single immutable artifact of a harvest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    metadata: DatasetMetadata,
    posts: Vec<PostEntry>,
    comments: Vec<FlatComment>,
}

impl Dataset {
    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn posts(&self) -> &[PostEntry] {
        &self.posts
    }

    pub fn comments(&self) -> &[FlatComment] {
        &self.comments
    }

    pub fn is_partial(&self) -> bool {
        self.metadata.partial
    }
}

pub fn assemble(query: &str, entries: Vec<PostComments>, context: AssemblyContext) -> Dataset {
    let mut posts = Vec::with_capacity(entries.len());
    let mut comments = Vec::with_capacity(entries.iter().map(|e| e.comments.len()).sum());

    for entry in entries {
        let comment_summary = CommentSummary::from_comments(&entry.comments);
        posts.push(PostEntry {
            post: entry.post,
            comment_summary,
        });
        comments.extend(entry.comments);
    }

    let seconds = context.fetch_duration.as_secs_f64();
    let comments_per_second = if seconds > 0.0 {
        round2(comments.len() as f64 / seconds)
    } else {
        0.0
    };

    let metadata = DatasetMetadata {
        query: query.to_string(),
        fetched_at: context.fetched_at,
        total_posts: posts.len(),
        total_comments: comments.len(),
        strategy_tag: context.strategy_tag,
        status: context.status,
        partial: context.status.is_partial(),
        target_comment_budget: context.target_comment_budget,
        fetch_duration_secs: round2(seconds),
        comments_per_second,
        average_score: average_score(&comments),
    };

    Dataset {
        metadata,
        posts,
        comments,
    }
}

fn average_score(comments: &[FlatComment]) -> f64 {
    if comments.is_empty() {
        return 0.0;
    }
    let total: i64 = comments.iter().map(|c| c.score).sum();
    round2(total as f64 / comments.len() as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
