//! Paginated post discovery through the search endpoint.

use crate::api::{RedditApiClient, RedditPostData};
use crate::pacing::{jittered_delay, pause};
use crate::token::TokenManager;
use harvest_core::{AuthError, CancelSignal, CoreError, ErrorExt, Post, RedditApiError, SearchConfig};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Position in the listing. `after` is the fullname of the last post seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCursor {
    pub after: Option<String>,
    pub pages_fetched: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchStop {
    /// The listing had no further pages.
    Exhausted,
    PageLimit,
    /// A page failed; posts from earlier pages are kept.
    Degraded(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Unique by id, in order of first appearance.
    pub posts: Vec<Post>,
    pub pages_fetched: usize,
    pub next_cursor: Option<String>,
    pub stop: SearchStop,
}

impl SearchOutcome {
    pub fn was_cancelled(&self) -> bool {
        self.stop == SearchStop::Cancelled
    }
}

#[derive(Debug, Clone)]
pub struct SearchPaginator {
    client: Arc<RedditApiClient>,
    tokens: Arc<TokenManager>,
}

impl SearchPaginator {
    pub fn new(client: Arc<RedditApiClient>, tokens: Arc<TokenManager>) -> Self {
        Self { client, tokens }
    }

    /// Walks up to `max_pages` pages of results. Only a failure to obtain a
    /// token is returned as an error; page failures end the walk early.
    pub async fn search(
        &self,
        config: &SearchConfig,
        cancel: &CancelSignal,
    ) -> Result<SearchOutcome, AuthError> {
        let mut cursor = SearchCursor::default();
        let mut seen = HashSet::new();
        let mut posts = Vec::new();

        let stop = loop {
            if cursor.pages_fetched >= config.max_pages {
                break SearchStop::PageLimit;
            }
            if cursor.pages_fetched > 0 {
                let delay = jittered_delay(config.inter_page_delay_ms, config.inter_page_jitter_ms);
                if !pause(delay, cancel).await {
                    break SearchStop::Cancelled;
                }
            } else if cancel.is_cancelled() {
                break SearchStop::Cancelled;
            }

            let token = self.tokens.get_token().await?;
            let page = tokio::select! {
                page = self.client.search_posts(token.value(), config, cursor.after.as_deref()) => page,
                _ = cancel.cancelled() => {
                    info!("Search page {} abandoned on cancellation", cursor.pages_fetched + 1);
                    break SearchStop::Cancelled;
                }
            };

            let listing = match page {
                Ok(listing) => listing,
                Err(error) => {
                    self.handle_page_error(&error).await;
                    break SearchStop::Degraded(error.to_string());
                }
            };

            cursor.pages_fetched += 1;
            let received = listing.data.children.len();
            let before = posts.len();
            for child in listing.data.children {
                let data = child.data;
                if data.id.is_empty() || !keep_post(&data, config) {
                    continue;
                }
                if seen.insert(data.id.clone()) {
                    posts.push(Post::from(data));
                }
            }
            debug!(
                "Page {}: {} received, {} new, {} total",
                cursor.pages_fetched,
                received,
                posts.len() - before,
                posts.len()
            );

            cursor.after = listing.data.after.filter(|after| !after.is_empty());
            if cursor.after.is_none() {
                break SearchStop::Exhausted;
            }
        };

        info!(
            "Search for '{}' found {} unique posts over {} pages ({:?})",
            config.query,
            posts.len(),
            cursor.pages_fetched,
            stop
        );

        Ok(SearchOutcome {
            posts,
            pages_fetched: cursor.pages_fetched,
            next_cursor: cursor.after,
            stop,
        })
    }

    async fn handle_page_error(&self, error: &CoreError) {
        if matches!(error, CoreError::RedditApi(RedditApiError::InvalidToken)) {
            self.tokens.invalidate().await;
        }
        warn!("Search pagination stopped early");
        error.log_warn();
    }
}

fn keep_post(data: &RedditPostData, config: &SearchConfig) -> bool {
    if !config.include_nsfw && data.over_18 {
        return false;
    }
    if config.skip_stickied && data.stickied {
        return false;
    }
    if config.text_only && (data.is_media() || !data.has_meaningful_text()) {
        return false;
    }
    true
}
