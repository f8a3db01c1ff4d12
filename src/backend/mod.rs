pub mod diff;
pub mod gitbucket;
pub mod github;
pub mod gitlab;
pub mod html;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::config::{Settings, Target};
use crate::review::Collected;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Request to {service} failed: {message}")]
    Transport { service: String, message: String },

    #[error("Authentication failed ({message}). Check the access token and repository permissions.")]
    Authentication { message: String },

    #[error("The {resource} was not found. Check the organization, repository and pull request settings.")]
    NotFound { resource: String },

    #[error("The API rate limit was exceeded. Wait a while and run again.")]
    RateLimited,

    #[error("Unexpected response: {0}")]
    Shape(String),

    #[error("Thread {id} was not returned by its continuation request")]
    UnmatchedThread { id: String },

    #[error("Invalid proxy URL: {0}")]
    InvalidProxy(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        let service = err
            .url()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "server".to_string());
        if err.is_decode() {
            return Self::Shape(err.to_string());
        }
        Self::Transport {
            service,
            message: err.to_string(),
        }
    }
}

/// A hosting service that can produce the review discussions of one pull/merge request.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short service name used in logs (e.g., "github")
    fn name(&self) -> &str;

    /// Fetch every discussion, in encounter order, plus the diff size.
    /// Any failed request aborts the whole collection.
    async fn collect(&self) -> Result<Collected, BackendError>;
}

/// Build the backend selected by `settings.target`.
pub fn build(settings: &Settings) -> Result<Box<dyn Backend>, BackendError> {
    let client = build_http_client(settings)?;
    debug!(target_service = %settings.target, endpoint = %settings.endpoint, "building backend");
    let backend: Box<dyn Backend> = match settings.target {
        Target::Github => Box::new(github::GitHub::new(settings.clone(), client)),
        Target::Gitlab => Box::new(gitlab::GitLab::new(settings.clone(), client)),
        Target::Gitbucket => Box::new(gitbucket::GitBucket::new(settings.clone(), client)),
    };
    Ok(backend)
}

/// HTTP client honoring the configured proxy. Environment proxies are ignored.
/// GitBucket needs a cookie store for its login session.
pub fn build_http_client(settings: &Settings) -> Result<reqwest::Client, BackendError> {
    let mut builder = reqwest::Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));
    builder = match settings.proxy.as_deref() {
        Some(proxy) => {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|_| BackendError::InvalidProxy(proxy.to_string()))?;
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };
    if settings.target == Target::Gitbucket {
        builder = builder.cookie_store(true);
    }
    Ok(builder.build()?)
}

/// Map a non-success status to the error a user can act on.
fn status_error(status: StatusCode, body: &str, resource: &str) -> BackendError {
    if is_rate_limited(status, body) {
        return BackendError::RateLimited;
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Authentication {
            message: status.to_string(),
        },
        StatusCode::NOT_FOUND => BackendError::NotFound {
            resource: resource.to_string(),
        },
        _ => BackendError::Shape(format!("{resource} request returned {status}")),
    }
}

fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || body.contains("API rate limit exceeded")
}
