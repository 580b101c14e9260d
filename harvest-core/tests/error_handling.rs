use harvest_core::{AuthError, ConfigError, CoreError, ErrorExt, ErrorReporter, RedditApiError};
use std::time::Duration;

#[test]
fn test_error_codes() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    assert_eq!(reddit_error.error_code(), "REDDIT_API");

    let auth_error = CoreError::Auth(AuthError::Rejected {
        status: Some(401),
        message: "invalid_grant".to_string(),
    });
    assert_eq!(auth_error.error_code(), "AUTH");

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "search.query".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");

    let missing = AuthError::MissingCredential {
        field: "client_id".to_string(),
    };
    assert_eq!(missing.error_code(), "AUTH_MISSING_CREDENTIAL");
}

#[test]
fn test_retryable_errors() {
    let retryable_error =
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 });
    assert!(retryable_error.is_retryable());

    let server_error = CoreError::RedditApi(RedditApiError::ServerError { status_code: 503 });
    assert!(server_error.is_retryable());

    let forbidden = CoreError::RedditApi(RedditApiError::Forbidden {
        resource: "/r/private".to_string(),
    });
    assert!(!forbidden.is_retryable());

    let auth_error = CoreError::Auth(AuthError::Transport {
        message: "connection refused".to_string(),
    });
    assert!(!auth_error.is_retryable());
}

#[test]
fn test_only_auth_and_config_errors_are_fatal() {
    let auth_error = CoreError::Auth(AuthError::MissingCredential {
        field: "password".to_string(),
    });
    assert!(auth_error.is_fatal());

    let config_error = CoreError::Config(ConfigError::ValidationFailed {
        reason: "bad".to_string(),
    });
    assert!(config_error.is_fatal());

    let page_error = CoreError::RedditApi(RedditApiError::ServerError { status_code: 502 });
    assert!(!page_error.is_fatal());

    let parse_error = CoreError::RedditApi(RedditApiError::InvalidResponse {
        details: "truncated".to_string(),
    });
    assert!(!parse_error.is_fatal());
}

#[test]
fn test_retry_after() {
    let rate_limit_error =
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 });
    assert_eq!(
        rate_limit_error.retry_after(),
        Some(Duration::from_secs(60))
    );

    let not_found = CoreError::RedditApi(RedditApiError::NotFound {
        resource: "/r/x/comments/1".to_string(),
    });
    assert_eq!(not_found.retry_after(), None);
}

#[test]
fn test_user_friendly_messages() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    let message = reddit_error.user_friendly_message();
    assert!(message.contains("authentication token is invalid"));

    let auth_error = CoreError::Auth(AuthError::MissingCredential {
        field: "client_secret".to_string(),
    });
    assert!(auth_error.user_friendly_message().contains("client_secret"));

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "search.query".to_string(),
    });
    assert!(config_error.user_friendly_message().contains("search.query"));
}

#[test]
fn test_auth_error_display_carries_upstream_message() {
    let error = AuthError::Rejected {
        status: Some(401),
        message: "Unauthorized".to_string(),
    };
    let rendered = error.to_string();
    assert!(rendered.contains("401"));
    assert!(rendered.contains("Unauthorized"));
}

#[test]
fn test_error_reporter() {
    let reporter = ErrorReporter::new()
        .with_error_reporting(true)
        .with_warning_reporting(true);
    let error = CoreError::RedditApi(RedditApiError::InvalidToken);

    // This test just ensures the methods don't panic
    reporter.report_error(&error);
    reporter.report_warning(&error);
}
