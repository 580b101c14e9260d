pub mod api;
pub mod comments;
pub mod metrics;
pub mod pacing;
pub mod rate_limiter;
pub mod retry;
pub mod search;
pub mod token;

pub use api::RedditApiClient;
pub use comments::{CommentFilter, CommentTreeFetcher};
pub use search::{SearchCursor, SearchOutcome, SearchPaginator, SearchStop};
pub use token::{AccessToken, TokenManager};

use harvest_core::{CommentsConfig, CoreError, HarvestConfig};
use std::sync::Arc;

/// One account's connection to Reddit: the shared HTTP client and the token
/// cache every paginator and fetcher built from it reuses.
#[derive(Debug, Clone)]
pub struct RedditClient {
    api: Arc<RedditApiClient>,
    tokens: Arc<TokenManager>,
}

impl RedditClient {
    pub fn from_config(config: &HarvestConfig) -> Result<Self, CoreError> {
        let api = RedditApiClient::new(&config.http, config.credentials.user_agent.clone())?;
        let tokens = TokenManager::new(&config.credentials, &config.http, api.http_client());

        Ok(Self {
            api: Arc::new(api),
            tokens: Arc::new(tokens),
        })
    }

    pub fn api(&self) -> &Arc<RedditApiClient> {
        &self.api
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn search_paginator(&self) -> SearchPaginator {
        SearchPaginator::new(self.api.clone(), self.tokens.clone())
    }

    pub fn comment_fetcher(&self, config: CommentsConfig) -> CommentTreeFetcher {
        CommentTreeFetcher::new(self.api.clone(), self.tokens.clone(), config)
    }
}
