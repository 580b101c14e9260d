use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A submission discovered through search. `id` is unique within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub author: String,
    pub subreddit: String,
    pub body_text: String,
    pub score: i64,
    pub comment_count_hint: u64,
    pub permalink: String,
    pub created_at: DateTime<Utc>,
}

/// One comment as returned by the comment-tree endpoint, replies nested in
/// upstream order.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, the node itself included.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(CommentNode::subtree_len).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatComment {
    pub id: String,
    pub post_id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub depth: usize,
}

/// How a run ended. Cancelled runs still produce a dataset, tagged partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

impl RunStatus {
    pub fn is_partial(&self) -> bool {
        matches!(self, RunStatus::Cancelled)
    }
}

/// Reddit reports creation times as fractional unix seconds.
pub fn timestamp_from_unix(seconds: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds.trunc() as i64, 0)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_from_unix() {
        let ts = timestamp_from_unix(1640995200.7);
        assert_eq!(ts.timestamp(), 1640995200);
        assert_eq!(ts.to_rfc3339(), "2022-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_subtree_len() {
        let leaf = |id: &str| CommentNode {
            id: id.to_string(),
            author: "a".to_string(),
            body: "body".to_string(),
            score: 1,
            created_at: timestamp_from_unix(0.0),
            children: Vec::new(),
        };
        let mut root = leaf("root");
        let mut mid = leaf("mid");
        mid.children.push(leaf("deep"));
        root.children.push(mid);
        root.children.push(leaf("sibling"));

        assert_eq!(root.subtree_len(), 4);
    }

    #[test]
    fn test_run_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert!(RunStatus::Cancelled.is_partial());
        assert!(!RunStatus::Completed.is_partial());
    }
}
