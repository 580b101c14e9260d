use crate::metrics::{ApiMetrics, MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use crate::retry::{RetryConfig, RetryExecutor};
use harvest_core::{
    timestamp_from_unix, CommentSort, CoreError, HttpConfig, Post, RedditApiError, SearchConfig,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub author: String,
    pub subreddit: String,
    pub url: String,
    pub permalink: String,
    pub created_utc: f64,
    pub score: i64,
    pub num_comments: u64,
    pub over_18: bool,
    pub stickied: bool,
    pub is_self: bool,
    pub is_video: bool,
    pub post_hint: Option<String>,
}

impl RedditPostData {
    /// Image and video posts carry little text to analyse.
    pub fn is_media(&self) -> bool {
        self.is_video
            || matches!(
                self.post_hint.as_deref(),
                Some("image") | Some("hosted:video") | Some("rich:video")
            )
    }

    pub fn has_meaningful_text(&self) -> bool {
        !self.selftext.trim().is_empty() || self.title.chars().count() >= 20
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditCommentData {
    pub id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_utc: f64,
    /// Either an empty string or a nested listing of replies.
    pub replies: serde_json::Value,
}

/// The two-part comment page: the post itself, then the comment forest.
pub type CommentPage = Vec<RedditListing<serde_json::Value>>;

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    base_url: Url,
    rate_limiter: RateLimiter,
    metrics: MetricsCollector,
    retry: RetryExecutor,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(config: &HttpConfig, user_agent: String) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(config.request_timeout())
            .build()?;

        let base_url = Url::parse(&config.api_base_url).map_err(|e| CoreError::InvalidInput {
            message: format!("invalid api_base_url {}: {}", config.api_base_url, e),
        })?;

        Ok(Self {
            http_client,
            base_url,
            rate_limiter: RateLimiter::new(RateLimitConfig::from_http_config(config)),
            metrics: MetricsCollector::new(),
            retry: RetryExecutor::new(RetryConfig::from_http_config(config)),
            user_agent,
        })
    }

    /// The underlying client, shared with the token manager.
    pub fn http_client(&self) -> Client {
        self.http_client.clone()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        label: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = self.base_url.join(endpoint).map_err(|e| CoreError::InvalidInput {
            message: format!("invalid endpoint {}: {}", endpoint, e),
        })?;

        let permit = self.rate_limiter.acquire_permit().await;
        if permit.queue_wait_time > Duration::from_millis(500) {
            debug!(
                "Waited {:?} for a rate limit permit for {}",
                permit.queue_wait_time, endpoint
            );
        }

        let request_builder = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(access_token)
            .query(query_params);

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let start_time = Instant::now();
        let outcome = request_builder.send().await;
        let response_time = start_time.elapsed();

        let (result, status_code) = match outcome {
            Ok(response) => {
                let status = response.status();
                let checked = if status.is_success() {
                    Ok(response)
                } else {
                    error!("Request failed with status: {} for {}", status, endpoint);
                    Err(status_error(status, response.headers(), endpoint))
                };
                (checked, Some(status.as_u16()))
            }
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                let error = if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                };
                (Err(error), None)
            }
        };

        self.metrics
            .record_request(RequestMetrics {
                endpoint: label.to_string(),
                status_code,
                response_time,
                success: result.is_ok(),
                rate_limited: status_code == Some(429),
            })
            .await;

        result
    }

    /// GET `endpoint` and decode the JSON body, retrying transient failures.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        label: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<T, CoreError> {
        self.retry
            .execute(label, move || async move {
                let response = self
                    .make_request(Method::GET, endpoint, label, access_token, query_params)
                    .await?;
                response.json::<T>().await.map_err(|e| {
                    error!("Failed to parse {} response: {}", label, e);
                    CoreError::RedditApi(RedditApiError::InvalidResponse {
                        details: format!("Failed to parse {} response: {}", label, e),
                    })
                })
            })
            .await
    }

    /// One page of search results, optionally restricted to a subreddit.
    pub async fn search_posts(
        &self,
        access_token: &str,
        search: &SearchConfig,
        after: Option<&str>,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let endpoint = match &search.subreddit {
            Some(subreddit) => format!("/r/{}/search", subreddit),
            None => "/search".to_string(),
        };

        let mut params = vec![
            ("q", search.query.trim().to_string()),
            ("limit", search.page_size.to_string()),
            ("sort", search.sort.as_str().to_string()),
            ("t", search.time_window.as_str().to_string()),
            ("type", "link".to_string()),
            ("raw_json", "1".to_string()),
        ];
        if search.subreddit.is_some() {
            params.push(("restrict_sr", "1".to_string()));
        }
        if let Some(after_val) = after {
            params.push(("after", after_val.to_string()));
        }

        let listing: RedditListing<RedditPostData> =
            self.get_json(&endpoint, "search", access_token, &params).await?;

        info!(
            "Retrieved {} posts for '{}' (after: {:?})",
            listing.data.children.len(),
            search.query,
            after
        );
        Ok(listing)
    }

    /// The comment page for one post.
    pub async fn get_comment_page(
        &self,
        access_token: &str,
        permalink: &str,
        limit: usize,
        sort: CommentSort,
    ) -> Result<CommentPage, CoreError> {
        let endpoint = comment_endpoint(permalink);
        let params = [
            ("limit", limit.to_string()),
            ("sort", sort.as_str().to_string()),
            ("raw_json", "1".to_string()),
        ];

        let page: CommentPage = self
            .get_json(&endpoint, "comments", access_token, &params)
            .await?;
        if page.len() < 2 {
            warn!("Comment page for {} has no comment listing", permalink);
        }
        Ok(page)
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }

    pub async fn reset_metrics(&self) {
        self.metrics.reset_metrics().await;
    }

    pub fn total_retries(&self) -> u64 {
        self.retry.total_retries()
    }
}

fn comment_endpoint(permalink: &str) -> String {
    let trimmed = permalink.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn status_error(status: StatusCode, headers: &HeaderMap, endpoint: &str) -> CoreError {
    let error = match status.as_u16() {
        429 => {
            let retry_after = retry_after_seconds(headers).unwrap_or(60);
            warn!("Rate limited, retry after {} seconds", retry_after);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => RedditApiError::NotFound {
            resource: endpoint.to_string(),
        },
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::UnexpectedStatus {
            status_code: code,
            endpoint: endpoint.to_string(),
        },
    };
    CoreError::RedditApi(error)
}

/// Seconds to wait from `Retry-After`, falling back to Reddit's
/// `x-ratelimit-reset`.
fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    ["retry-after", "x-ratelimit-reset"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.trim().parse::<f64>().ok())
        .map(|seconds| seconds.max(0.0).ceil() as u64)
        .next()
}

impl From<RedditPostData> for Post {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            title: post_data.title,
            author: post_data.author,
            subreddit: post_data.subreddit,
            body_text: post_data.selftext,
            score: post_data.score,
            comment_count_hint: post_data.num_comments,
            permalink: post_data.permalink,
            created_at: timestamp_from_unix(post_data.created_utc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn post_data() -> RedditPostData {
        RedditPostData {
            id: "test123".to_string(),
            title: "Test Post".to_string(),
            selftext: "This is test content".to_string(),
            author: "test_user".to_string(),
            subreddit: "test".to_string(),
            url: "https://reddit.com/r/test/comments/test123".to_string(),
            permalink: "/r/test/comments/test123/test_post/".to_string(),
            created_utc: 1640995200.0,
            score: 42,
            num_comments: 5,
            ..RedditPostData::default()
        }
    }

    #[tokio::test]
    async fn test_api_client_creation() {
        let client =
            RedditApiClient::new(&HttpConfig::default(), "test-user-agent/1.0".to_string())
                .unwrap();
        assert_eq!(client.user_agent(), "test-user-agent/1.0");

        let status = client.get_rate_limit_status().await;
        assert!(status.available_tokens > 0);
        assert_eq!(client.get_metrics().await.total_requests, 0);
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = HttpConfig {
            api_base_url: "not a url".to_string(),
            ..HttpConfig::default()
        };
        let result = RedditApiClient::new(&config, "ua".to_string());
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
    }

    #[test]
    fn test_reddit_post_conversion() {
        let post: Post = post_data().into();
        assert_eq!(post.id, "test123");
        assert_eq!(post.title, "Test Post");
        assert_eq!(post.body_text, "This is test content");
        assert_eq!(post.comment_count_hint, 5);
        assert_eq!(post.created_at.timestamp(), 1640995200);
    }

    #[test]
    fn test_post_data_tolerates_missing_fields() {
        let data: RedditPostData =
            serde_json::from_str(r#"{"id": "abc", "title": "Hello", "permalink": "/r/x/comments/abc/"}"#)
                .unwrap();
        assert_eq!(data.id, "abc");
        assert_eq!(data.score, 0);
        assert!(data.post_hint.is_none());
    }

    #[test]
    fn test_media_and_text_detection() {
        let mut data = post_data();
        assert!(!data.is_media());
        assert!(data.has_meaningful_text());

        data.post_hint = Some("image".to_string());
        assert!(data.is_media());

        let short = RedditPostData {
            title: "pic".to_string(),
            ..RedditPostData::default()
        };
        assert!(!short.has_meaningful_text());
    }

    #[test]
    fn test_comment_endpoint_normalisation() {
        assert_eq!(
            comment_endpoint("/r/rust/comments/abc/title/"),
            "/r/rust/comments/abc/title"
        );
        assert_eq!(
            comment_endpoint("r/rust/comments/abc/title"),
            "/r/rust/comments/abc/title"
        );
    }

    #[test]
    fn test_status_mapping() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("12"));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, &headers, "/search"),
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 12 })
        ));

        let empty = HeaderMap::new();
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, &empty, "/search"),
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 })
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, &empty, "/search"),
            CoreError::RedditApi(RedditApiError::InvalidToken)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, &empty, "/search"),
            CoreError::RedditApi(RedditApiError::ServerError { status_code: 502 })
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, &empty, "/search"),
            CoreError::RedditApi(RedditApiError::UnexpectedStatus { status_code: 400, .. })
        ));
    }

    #[test]
    fn test_ratelimit_reset_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("4.2"));
        assert_eq!(retry_after_seconds(&headers), Some(5));
    }
}
