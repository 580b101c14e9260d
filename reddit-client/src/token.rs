//! Bearer token lifecycle for the Reddit OAuth API.
//!
//! Tokens come from the resource-owner password grant ("script" apps) and
//! are cached until they get within the safety margin of expiry. Refreshes
//! are single-flight: the cache lock is held across the token request, so
//! callers arriving mid-refresh wait and then reuse its outcome, the error
//! included.

use harvest_core::{AuthError, CredentialsConfig, HttpConfig};
use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    ResourceOwnerPassword, ResourceOwnerUsername, TokenResponse, TokenUrl,
};
use reqwest::Client;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The instant after which the token is no longer handed out. Already
    /// reduced by the safety margin.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Clone)]
struct PasswordGrant {
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for PasswordGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordGrant")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl PasswordGrant {
    fn from_config(credentials: &CredentialsConfig) -> Result<Self, AuthError> {
        let required = |value: &Option<String>, field: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| AuthError::MissingCredential {
                    field: field.to_string(),
                })
        };

        Ok(Self {
            client_id: required(&credentials.client_id, "client_id")?,
            client_secret: required(&credentials.client_secret, "client_secret")?,
            username: required(&credentials.username, "username")?,
            password: required(&credentials.password, "password")?,
        })
    }
}

#[derive(Debug, Default)]
struct TokenCache {
    token: Option<AccessToken>,
    /// Outcome of the most recent refresh when it failed.
    last_error: Option<AuthError>,
}

#[derive(Debug)]
pub struct TokenManager {
    grant: Result<PasswordGrant, AuthError>,
    auth_base_url: String,
    http_client: Client,
    safety_margin: Duration,
    cache: Mutex<TokenCache>,
    refresh_count: AtomicU64,
}

impl TokenManager {
    /// Missing credentials are not an error here; they surface as
    /// `AuthError::MissingCredential` on the first `get_token`.
    pub fn new(credentials: &CredentialsConfig, http: &HttpConfig, http_client: Client) -> Self {
        Self {
            grant: PasswordGrant::from_config(credentials),
            auth_base_url: http.auth_base_url.trim_end_matches('/').to_string(),
            http_client,
            safety_margin: http.token_safety_margin(),
            cache: Mutex::new(TokenCache::default()),
            refresh_count: AtomicU64::new(0),
        }
    }

    pub async fn get_token(&self) -> Result<AccessToken, AuthError> {
        let refreshes_seen = self.refresh_count.load(Ordering::Acquire);
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.token.as_ref() {
            if token.is_fresh() {
                return Ok(token.clone());
            }
            debug!("Cached access token is within the safety margin, refreshing");
        }

        // A refresh failed while this caller was queued on the lock.
        if self.refresh_count.load(Ordering::Acquire) != refreshes_seen {
            if let Some(error) = cache.last_error.as_ref() {
                return Err(error.clone());
            }
        }

        match self.request_token().await {
            Ok(token) => {
                cache.token = Some(token.clone());
                cache.last_error = None;
                Ok(token)
            }
            Err(error) => {
                cache.token = None;
                cache.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Drops the cached token so the next caller fetches a new one. Used when
    /// the API rejects a token the cache still considers fresh.
    pub async fn invalidate(&self) {
        self.cache.lock().await.token.take();
    }

    /// Number of token requests issued so far.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    async fn request_token(&self) -> Result<AccessToken, AuthError> {
        let grant = self.grant.as_ref().map_err(Clone::clone)?;
        self.refresh_count.fetch_add(1, Ordering::AcqRel);

        let auth_url = AuthUrl::new(format!("{}/api/v1/authorize", self.auth_base_url))
            .map_err(invalid_endpoint)?;
        let token_url = TokenUrl::new(format!("{}/api/v1/access_token", self.auth_base_url))
            .map_err(invalid_endpoint)?;

        let client = BasicClient::new(
            ClientId::new(grant.client_id.clone()),
            Some(ClientSecret::new(grant.client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        let last_status = Arc::new(AtomicU16::new(0));
        let http_client = self.http_client.clone();
        let status_slot = last_status.clone();

        info!("Requesting Reddit access token for {}", grant.username);
        let requested_at = Instant::now();
        let response = client
            .exchange_password(
                &ResourceOwnerUsername::new(grant.username.clone()),
                &ResourceOwnerPassword::new(grant.password.clone()),
            )
            .request_async(move |request| send_token_request(http_client, request, status_slot))
            .await;

        let status = match last_status.load(Ordering::Relaxed) {
            0 => None,
            code => Some(code),
        };

        let token = response.map_err(|e| {
            let auth_error = map_token_error(e, status);
            error!("Reddit token request failed: {}", auth_error);
            auth_error
        })?;

        let expires_in = token.expires_in().unwrap_or(DEFAULT_EXPIRES_IN);
        let lifetime = usable_lifetime(expires_in, self.safety_margin);
        debug!(
            "Obtained access token valid for {:?} ({:?} before margin)",
            lifetime, expires_in
        );

        Ok(AccessToken {
            value: token.access_token().secret().clone(),
            expires_at: requested_at + lifetime,
        })
    }
}

/// Lifetime left after the safety margin. The margin is capped at half the
/// granted lifetime so a short-lived grant is still usable when issued.
fn usable_lifetime(expires_in: Duration, safety_margin: Duration) -> Duration {
    expires_in.saturating_sub(safety_margin.min(expires_in / 2))
}

fn invalid_endpoint(e: oauth2::url::ParseError) -> AuthError {
    AuthError::Transport {
        message: format!("invalid token endpoint: {}", e),
    }
}

/// Sends the OAuth request through the shared client so the configured user
/// agent and timeout apply to token requests as well.
async fn send_token_request(
    http_client: Client,
    request: HttpRequest,
    status_slot: Arc<AtomicU16>,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    status_slot.store(status_code.as_u16(), Ordering::Relaxed);
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

fn map_token_error(
    error: RequestTokenError<reqwest::Error, BasicErrorResponse>,
    status: Option<u16>,
) -> AuthError {
    match error {
        RequestTokenError::ServerResponse(response) => {
            let mut message = response.error().to_string();
            if let Some(description) = response.error_description() {
                message = format!("{}: {}", message, description);
            }
            AuthError::Rejected { status, message }
        }
        // Reddit answers bad credentials with 200 and `{"error": "invalid_grant"}`,
        // which fails token parsing; the body is the useful part.
        RequestTokenError::Parse(_, body) => AuthError::Rejected {
            status,
            message: String::from_utf8_lossy(&body).trim().to_string(),
        },
        RequestTokenError::Request(e) => AuthError::Transport {
            message: e.to_string(),
        },
        RequestTokenError::Other(message) => AuthError::Rejected { status, message },
    }
}
