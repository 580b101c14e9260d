//! Harvest configuration: a TOML file with environment overrides for
//! credentials. Every field has a default so an empty file is valid apart
//! from the query and credentials.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "reddit-harvest/0.1 (comment dataset builder)";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub credentials: CredentialsConfig,
    pub search: SearchConfig,
    pub comments: CommentsConfig,
    pub schedule: ScheduleConfig,
    pub http: HttpConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("CredentialsConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    Relevance,
    Hot,
    Top,
    New,
    Comments,
}

impl SearchSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSort::Relevance => "relevance",
            SearchSort::Hot => "hot",
            SearchSort::Top => "top",
            SearchSort::New => "new",
            SearchSort::Comments => "comments",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    Confidence,
    Top,
    New,
    Controversial,
    Old,
    Qa,
}

impl CommentSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentSort::Confidence => "confidence",
            CommentSort::Top => "top",
            CommentSort::New => "new",
            CommentSort::Controversial => "controversial",
            CommentSort::Old => "old",
            CommentSort::Qa => "qa",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub query: String,
    pub max_pages: usize,
    /// Items per search page; the API caps this at 100.
    pub page_size: usize,
    pub sort: SearchSort,
    pub time_window: TimeWindow,
    /// Restrict the search to one subreddit.
    pub subreddit: Option<String>,
    /// Drop image/video posts and link posts without meaningful text.
    pub text_only: bool,
    pub include_nsfw: bool,
    pub skip_stickied: bool,
    pub inter_page_delay_ms: u64,
    pub inter_page_jitter_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            max_pages: 3,
            page_size: 100,
            sort: SearchSort::Relevance,
            time_window: TimeWindow::All,
            subreddit: None,
            text_only: false,
            include_nsfw: true,
            skip_stickied: false,
            inter_page_delay_ms: 800,
            inter_page_jitter_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentsConfig {
    pub target_comment_budget: usize,
    pub comments_per_post_cap: usize,
    pub sort: CommentSort,
    pub min_score: Option<i64>,
    pub min_body_chars: usize,
    /// Deepest reply level kept; 0 keeps top-level comments only.
    pub max_depth: Option<usize>,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            target_comment_budget: 5000,
            comments_per_post_cap: 100,
            sort: CommentSort::Top,
            min_score: None,
            min_body_chars: 10,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub inter_batch_jitter_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_batch_delay_ms: 500,
            inter_batch_jitter_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub api_base_url: String,
    pub auth_base_url: String,
    pub request_timeout_secs: u64,
    pub requests_per_minute: u32,
    pub burst: u32,
    /// Extra attempts for transient failures; 0 disables retrying.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub token_safety_margin_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://oauth.reddit.com".to_string(),
            auth_base_url: "https://www.reddit.com".to_string(),
            request_timeout_secs: 30,
            requests_per_minute: 100,
            burst: 10,
            max_retries: 2,
            retry_base_delay_ms: 1000,
            token_safety_margin_secs: 300,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_safety_margin(&self) -> Duration {
        Duration::from_secs(self.token_safety_margin_secs)
    }
}

impl HarvestConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads the file if given and applies `REDDIT_*` environment overrides.
    /// Validation is left to the caller, which may still override fields
    /// such as the query.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let creds = &mut self.credentials;
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("REDDIT_CLIENT_ID") {
            creds.client_id = Some(v);
        }
        if let Some(v) = non_empty("REDDIT_CLIENT_SECRET") {
            creds.client_secret = Some(v);
        }
        if let Some(v) = non_empty("REDDIT_USERNAME") {
            creds.username = Some(v);
        }
        if let Some(v) = non_empty("REDDIT_PASSWORD") {
            creds.password = Some(v);
        }
        if let Some(v) = non_empty("REDDIT_USER_AGENT") {
            creds.user_agent = v;
        }
    }

    /// Checks ranges and required fields. Credentials are checked lazily by
    /// the token manager so a misconfigured account surfaces as an auth error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.query.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "search.query".to_string(),
            });
        }
        if !(1..=100).contains(&self.search.page_size) {
            return Err(invalid("search.page_size", self.search.page_size));
        }
        if self.search.max_pages == 0 {
            return Err(invalid("search.max_pages", self.search.max_pages));
        }
        if self.comments.target_comment_budget == 0 {
            return Err(invalid(
                "comments.target_comment_budget",
                self.comments.target_comment_budget,
            ));
        }
        if self.comments.comments_per_post_cap == 0 {
            return Err(invalid(
                "comments.comments_per_post_cap",
                self.comments.comments_per_post_cap,
            ));
        }
        if self.schedule.batch_size == 0 {
            return Err(invalid("schedule.batch_size", self.schedule.batch_size));
        }
        if self.http.requests_per_minute == 0 || self.http.burst == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "http.requests_per_minute and http.burst must be positive".to_string(),
            });
        }
        for (field, value) in [
            ("http.api_base_url", &self.http.api_base_url),
            ("http.auth_base_url", &self.http.auth_base_url),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(invalid(field, value));
            }
        }
        Ok(())
    }

    /// Describes the pagination and budget policy for the dataset metadata.
    pub fn strategy_tag(&self) -> String {
        let scope = match &self.search.subreddit {
            Some(sub) => format!("r/{}", sub),
            None => "all".to_string(),
        };
        format!(
            "search[{}]:{}/{} pages<={}x{} | comments:{} cap={}/post budget={} | batch={}",
            scope,
            self.search.sort.as_str(),
            self.search.time_window.as_str(),
            self.search.max_pages,
            self.search.page_size,
            self.comments.sort.as_str(),
            self.comments.comments_per_post_cap,
            self.comments.target_comment_budget,
            self.schedule.batch_size,
        )
    }
}

fn invalid(field: &str, value: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}
