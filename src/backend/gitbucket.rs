use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};

use super::html::{walk_panels, DomNode, PanelLayout};
use super::{status_error, Backend, BackendError};
use crate::config::Settings;
use crate::review::Collected;

/// GitBucket, which offers no review API: sign in with a form, scrape the
/// pull request page and sign out again.
///
/// The access token is `user:password`. Diff size is not available and is
/// reported as zero.
pub struct GitBucket {
    settings: Settings,
    client: reqwest::Client,
}

impl GitBucket {
    pub fn new(settings: Settings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.endpoint, path)
    }

    fn pull_url(&self) -> String {
        self.url(&format!(
            "{}/{}/pull/{}",
            self.settings.org, self.settings.repo, self.settings.pull
        ))
    }

    fn credentials(&self) -> Result<(&str, &str), BackendError> {
        self.settings
            .access_token
            .split_once(':')
            .ok_or_else(|| BackendError::InvalidCredentials("expected user:password".to_string()))
    }

    #[instrument(skip(self))]
    async fn sign_in(&self) -> Result<(), BackendError> {
        let (user, password) = self.credentials()?;

        let response = self.client.get(self.url("signin")).send().await?;
        if response.status() != StatusCode::OK {
            return Err(BackendError::Transport {
                service: self.settings.endpoint.clone(),
                message: format!("sign-in page returned {}", response.status()),
            });
        }

        let response = self
            .client
            .post(self.url("signin"))
            .form(&[("userName", user), ("password", password)])
            .send()
            .await?;
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(BackendError::Authentication {
                message: format!("sign-in returned {status}"),
            });
        }
        debug!(%status, "signed in");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn pull_page(&self) -> Result<String, BackendError> {
        let response = self.client.get(self.pull_url()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, "pull request"));
        }
        Ok(response.text().await?)
    }

    async fn sign_out(&self) {
        match self.client.get(self.url("signout")).send().await {
            Ok(response) if response.status().is_success() || response.status().is_redirection() => {
                debug!("signed out");
            }
            Ok(response) => warn!(status = %response.status(), "sign-out failed"),
            Err(err) => warn!(error = %err, "sign-out failed"),
        }
    }
}

#[async_trait]
impl Backend for GitBucket {
    fn name(&self) -> &str {
        "gitbucket"
    }

    #[instrument(skip(self), fields(org = %self.settings.org, repo = %self.settings.repo, pull = self.settings.pull))]
    async fn collect(&self) -> Result<Collected, BackendError> {
        self.sign_in().await?;
        let page = self.pull_page().await;
        self.sign_out().await;
        let page = page?;

        let root = DomNode::parse_document(&page);
        let walked = walk_panels(&root, &PanelLayout::GITBUCKET, &self.pull_url())?;
        info!(discussions = walked.discussions.len(), "scraped GitBucket pull request");

        Ok(Collected {
            document_author: walked.document_author,
            additions: 0,
            deletions: 0,
            discussions: walked.discussions,
            session_threads: false,
        })
    }
}
