use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::diff::{count_changes, DiffStat};
use super::{status_error, Backend, BackendError};
use crate::config::Settings;
use crate::review::{Collected, Discussion, Note, Page, Thread};

/// GitLab through its REST API (v4).
///
/// Every comment on a merge request is a discussion, so GitLab yields threads
/// only. The delimiter is never applied.
pub struct GitLab {
    settings: Settings,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct User {
    username: String,
}

#[derive(Debug, Deserialize)]
struct MergeRequestInfo {
    author: User,
    web_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiDiscussion {
    id: String,
    #[serde(default)]
    notes: Vec<ApiNote>,
}

#[derive(Debug, Deserialize)]
struct ApiNote {
    id: u64,
    #[serde(default)]
    body: String,
    author: Option<User>,
    #[serde(default)]
    system: bool,
    /// Absent on notes that cannot be resolved
    #[serde(default)]
    resolved: Option<bool>,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Changes {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    diff: String,
}

impl ApiDiscussion {
    fn into_thread(self, web_url: &str) -> Thread {
        let resolved = self.notes.last().and_then(|note| note.resolved).unwrap_or(false);
        Thread {
            id: self.id,
            resolved: Some(resolved),
            notes: self
                .notes
                .into_iter()
                .map(|note| Note {
                    author: note.author.map(|user| user.username).unwrap_or_default(),
                    body: note.body,
                    timestamp: note.created_at,
                    location_ref: format!("{web_url}#note_{}", note.id),
                    system_generated: note.system,
                })
                .collect(),
        }
    }
}

impl GitLab {
    pub fn new(settings: Settings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    /// `{endpoint}/projects/{repo}/merge_requests/{pull}/{tail..}`; the project
    /// id may be a `group/project` path and is encoded as one segment.
    fn merge_request_url(&self, tail: &[&str]) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.settings.endpoint)
            .map_err(|_| BackendError::Shape(format!("invalid endpoint {}", self.settings.endpoint)))?;
        let pull = self.settings.pull.to_string();
        url.path_segments_mut()
            .map_err(|_| BackendError::Shape(format!("endpoint {} cannot be a base URL", self.settings.endpoint)))?
            .pop_if_empty()
            .extend(["projects", self.settings.repo.as_str(), "merge_requests", pull.as_str()])
            .extend(tail);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        page: Option<&str>,
        resource: &str,
    ) -> Result<(T, Option<String>), BackendError> {
        let mut request = self
            .client
            .get(url)
            .header("PRIVATE-TOKEN", &self.settings.access_token);
        if let Some(page) = page {
            request = request.query(&[("per_page", self.settings.page_size.to_string()), ("page", page.to_string())]);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, resource));
        }

        let next_page = response
            .headers()
            .get("X-Next-Page")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Ok((response.json().await?, next_page))
    }

    /// Fetch one page of a `page`/`per_page` collection.
    async fn get_page<T: DeserializeOwned>(
        &self,
        tail: &str,
        page: &str,
        resource: &str,
    ) -> Result<Page<T>, BackendError> {
        let (items, next_cursor): (Vec<T>, _) = self.get(self.merge_request_url(&[tail])?, Some(page), resource).await?;
        Ok(Page {
            items,
            has_more: next_cursor.is_some(),
            next_cursor,
        })
    }

    #[instrument(skip(self))]
    async fn merge_request(&self) -> Result<MergeRequestInfo, BackendError> {
        let (info, _) = self.get(self.merge_request_url(&[])?, None, "merge request").await?;
        Ok(info)
    }

    #[instrument(skip(self))]
    async fn discussions(&self) -> Result<Vec<ApiDiscussion>, BackendError> {
        let mut discussions = Vec::new();
        let mut page = "1".to_string();
        loop {
            let fetched: Page<ApiDiscussion> = self.get_page("discussions", &page, "merge request").await?;
            debug!(page = %page, discussions = fetched.items.len(), "fetched discussion page");
            discussions.extend(fetched.items);
            match fetched.next_cursor {
                Some(next) if fetched.has_more => page = next,
                _ => return Ok(discussions),
            }
        }
    }

    #[instrument(skip(self))]
    async fn diff_stat(&self) -> Result<DiffStat, BackendError> {
        let mut total = DiffStat::default();
        let mut page = "1".to_string();
        loop {
            let (changes, next): (Changes, _) = self
                .get(self.merge_request_url(&["changes"])?, Some(page.as_str()), "merge request")
                .await?;
            for change in &changes.changes {
                total += count_changes(&change.diff);
            }
            match next {
                Some(next) => page = next,
                None => return Ok(total),
            }
        }
    }
}

#[async_trait]
impl Backend for GitLab {
    fn name(&self) -> &str {
        "gitlab"
    }

    #[instrument(skip(self), fields(project = %self.settings.repo, merge_request = self.settings.pull))]
    async fn collect(&self) -> Result<Collected, BackendError> {
        let info = self.merge_request().await?;
        let discussions = self.discussions().await?;
        let stat = self.diff_stat().await?;
        info!(
            discussions = discussions.len(),
            additions = stat.additions,
            deletions = stat.deletions,
            "fetched GitLab review data"
        );

        Ok(Collected {
            document_author: info.author.username,
            additions: stat.additions,
            deletions: stat.deletions,
            discussions: discussions
                .into_iter()
                .map(|discussion| Discussion::Thread(discussion.into_thread(&info.web_url)))
                .collect(),
            session_threads: true,
        })
    }
}
