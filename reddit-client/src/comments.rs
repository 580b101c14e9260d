//! Comment forest retrieval for a single post.

use crate::api::{RedditApiClient, RedditCommentData, RedditListing, RedditListingChild};
use crate::token::TokenManager;
use harvest_core::{
    timestamp_from_unix, AuthError, CommentNode, CommentSort, CommentsConfig, CoreError, ErrorExt,
    RedditApiError,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reddit refuses comment limits above this.
pub const MAX_COMMENT_LIMIT: usize = 500;

const REMOVED_BODIES: [&str; 2] = ["[deleted]", "[removed]"];

/// Which comments survive parsing. A rejected comment takes its replies
/// with it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentFilter {
    pub min_body_chars: usize,
    pub min_score: Option<i64>,
    pub max_depth: Option<usize>,
}

impl CommentFilter {
    pub fn from_config(config: &CommentsConfig) -> Self {
        Self {
            min_body_chars: config.min_body_chars,
            min_score: config.min_score,
            max_depth: config.max_depth,
        }
    }

    fn accepts(&self, comment: &RedditCommentData, depth: usize) -> bool {
        if self.max_depth.is_some_and(|max| depth > max) {
            return false;
        }
        let body = comment.body.trim();
        if REMOVED_BODIES.contains(&body) || body.chars().count() < self.min_body_chars {
            return false;
        }
        self.min_score.map_or(true, |min| comment.score >= min)
    }
}

impl Default for CommentFilter {
    fn default() -> Self {
        Self::from_config(&CommentsConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct CommentTreeFetcher {
    client: Arc<RedditApiClient>,
    tokens: Arc<TokenManager>,
    config: CommentsConfig,
    filter: CommentFilter,
}

impl CommentTreeFetcher {
    pub fn new(
        client: Arc<RedditApiClient>,
        tokens: Arc<TokenManager>,
        config: CommentsConfig,
    ) -> Self {
        let filter = CommentFilter::from_config(&config);
        Self {
            client,
            tokens,
            config,
            filter,
        }
    }

    pub fn config(&self) -> &CommentsConfig {
        &self.config
    }

    /// The `limit` to ask for so the per-post cap can be met in one request.
    pub fn request_limit(&self) -> usize {
        self.config.comments_per_post_cap.clamp(1, MAX_COMMENT_LIMIT)
    }

    /// Fetches and parses one post's comments. Any failure other than token
    /// acquisition yields an empty forest.
    pub async fn fetch_tree(
        &self,
        permalink: &str,
        limit: usize,
        sort: CommentSort,
    ) -> Result<Vec<CommentNode>, AuthError> {
        let token = self.tokens.get_token().await?;

        match self
            .client
            .get_comment_page(token.value(), permalink, limit, sort)
            .await
        {
            Ok(page) => {
                let nodes = parse_comment_page(page, &self.filter);
                debug!(
                    "Parsed {} comments for {}",
                    nodes.iter().map(CommentNode::subtree_len).sum::<usize>(),
                    permalink
                );
                Ok(nodes)
            }
            Err(error) => {
                if matches!(error, CoreError::RedditApi(RedditApiError::InvalidToken)) {
                    self.tokens.invalidate().await;
                }
                warn!("Skipping comments for {}", permalink);
                error.log_warn();
                Ok(Vec::new())
            }
        }
    }
}

/// Builds the forest from the `[post listing, comment listing]` page.
pub fn parse_comment_page(page: Vec<RedditListing<Value>>, filter: &CommentFilter) -> Vec<CommentNode> {
    page.into_iter()
        .nth(1)
        .map(|listing| build_nodes(listing.data.children, 0, filter))
        .unwrap_or_default()
}

fn build_nodes(
    children: Vec<RedditListingChild<Value>>,
    depth: usize,
    filter: &CommentFilter,
) -> Vec<CommentNode> {
    children
        .into_iter()
        // "more" stubs and anything else that is not a comment
        .filter(|child| child.kind == "t1")
        .filter_map(|child| match serde_json::from_value::<RedditCommentData>(child.data) {
            Ok(comment) => Some(comment),
            Err(e) => {
                debug!("Skipping malformed comment: {}", e);
                None
            }
        })
        .filter(|comment| !comment.id.is_empty() && filter.accepts(comment, depth))
        .map(|comment| build_node(comment, depth, filter))
        .collect()
}

fn build_node(comment: RedditCommentData, depth: usize, filter: &CommentFilter) -> CommentNode {
    let children = match comment.replies {
        Value::Object(_) => match serde_json::from_value::<RedditListing<Value>>(comment.replies) {
            Ok(listing) => build_nodes(listing.data.children, depth + 1, filter),
            Err(e) => {
                debug!("Ignoring unreadable replies of {}: {}", comment.id, e);
                Vec::new()
            }
        },
        // An empty string when there are no replies.
        _ => Vec::new(),
    };

    CommentNode {
        id: comment.id,
        author: comment.author,
        body: comment.body,
        score: comment.score,
        created_at: timestamp_from_unix(comment.created_utc),
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment(id: &str, body: &str, score: i64, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "author": format!("author_{}", id),
                "body": body,
                "score": score,
                "created_utc": 1700000000.0,
                "replies": replies
            }
        })
    }

    fn listing(children: Vec<Value>) -> Value {
        json!({"kind": "Listing", "data": {"children": children, "after": null, "before": null}})
    }

    fn page(children: Vec<Value>) -> Vec<RedditListing<Value>> {
        let post = listing(vec![json!({"kind": "t3", "data": {"id": "post"}})]);
        serde_json::from_value(json!([post, listing(children)])).unwrap()
    }

    fn lenient() -> CommentFilter {
        CommentFilter {
            min_body_chars: 0,
            min_score: None,
            max_depth: None,
        }
    }

    #[test]
    fn test_nested_replies_are_parsed() {
        let tree = page(vec![comment(
            "a",
            "top level comment",
            5,
            listing(vec![
                comment("b", "first reply here", 2, json!("")),
                comment("c", "second reply here", 1, json!("")),
            ]),
        )]);

        let nodes = parse_comment_page(tree, &CommentFilter::default());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "a");
        let reply_ids: Vec<_> = nodes[0].children.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(reply_ids, vec!["b", "c"]);
        assert_eq!(nodes[0].created_at.timestamp(), 1700000000);
    }

    #[test]
    fn test_more_stubs_are_ignored() {
        let tree = page(vec![
            comment("a", "kept comment", 1, json!("")),
            json!({"kind": "more", "data": {"id": "m", "children": ["x", "y"]}}),
        ]);
        let nodes = parse_comment_page(tree, &lenient());
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_short_and_removed_bodies_are_filtered() {
        let tree = page(vec![
            comment("a", "   ok   ", 1, json!("")),
            comment("b", "[deleted]", 1, json!("")),
            comment("c", "[removed]", 1, json!("")),
            comment("d", "long enough to keep", 1, json!("")),
        ]);
        let nodes = parse_comment_page(tree, &CommentFilter::default());
        let ids: Vec<_> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["d"]);
    }

    #[test]
    fn test_filtered_parent_drops_its_replies() {
        let tree = page(vec![comment(
            "a",
            "[removed]",
            1,
            listing(vec![comment("b", "orphaned reply text", 1, json!(""))]),
        )]);
        assert!(parse_comment_page(tree, &CommentFilter::default()).is_empty());
    }

    #[test]
    fn test_min_score_and_max_depth() {
        let tree = page(vec![
            comment(
                "a",
                "good comment",
                10,
                listing(vec![comment(
                    "b",
                    "good reply",
                    10,
                    listing(vec![comment("c", "deep reply", 10, json!(""))]),
                )]),
            ),
            comment("d", "downvoted comment", -3, json!("")),
        ]);

        let filter = CommentFilter {
            min_body_chars: 0,
            min_score: Some(0),
            max_depth: Some(1),
        };
        let nodes = parse_comment_page(tree, &filter);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].children.len(), 1);
        assert!(nodes[0].children[0].children.is_empty());
    }

    #[test]
    fn test_page_without_comment_listing() {
        let only_post: Vec<RedditListing<Value>> =
            serde_json::from_value(json!([listing(vec![])])).unwrap();
        assert!(parse_comment_page(only_post, &lenient()).is_empty());
    }
}
