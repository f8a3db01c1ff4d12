use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::{status_error, Backend, BackendError};
use crate::config::Settings;
use crate::review::thread::{ThreadPage, ThreadReconstructor, ThreadSlice, ThreadSource, ThreadWindow};
use crate::review::{Collected, Discussion, Note, Page};

const COMMENTS_QUERY: &str = include_str!("queries/comments.graphql");
const THREADS_QUERY: &str = include_str!("queries/threads.graphql");

/// GitHub through its GraphQL API.
///
/// Flat comments are the conversation comments plus review summaries; threads
/// are the inline review threads, which report resolution.
pub struct GitHub {
    settings: Settings,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryData<P> {
    repository: Option<RepositoryNode<P>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode<P> {
    pull_request: Option<P>,
}

#[derive(Debug, Deserialize)]
struct Actor {
    login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Edge<N> {
    node: N,
    #[serde(default)]
    cursor: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<N> {
    edges: Vec<Edge<N>>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentNode {
    url: String,
    #[serde(default)]
    body: String,
    created_at: String,
    author: Option<Actor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentsPull {
    additions: usize,
    deletions: usize,
    comments: Connection<CommentNode>,
    reviews: Connection<CommentNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadNode {
    id: String,
    is_resolved: bool,
    comments: Connection<CommentNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadsPull {
    author: Option<Actor>,
    review_threads: Connection<ThreadNode>,
}

impl From<CommentNode> for Note {
    fn from(node: CommentNode) -> Self {
        Note {
            author: login(node.author),
            body: node.body,
            timestamp: Some(node.created_at),
            location_ref: node.url,
            system_generated: false,
        }
    }
}

impl<N> Connection<N> {
    fn into_page<T>(self, convert: impl Fn(Edge<N>) -> T) -> Page<T> {
        Page {
            items: self.edges.into_iter().map(convert).collect(),
            next_cursor: self.page_info.end_cursor,
            has_more: self.page_info.has_next_page,
        }
    }
}

/// Deleted accounts come back as a null author.
fn login(actor: Option<Actor>) -> String {
    actor.map(|actor| actor.login).unwrap_or_default()
}

/// Move `cursor` to the end of the page just read and report whether more follow.
///
/// A collection that is already exhausted is parked at its end cursor, so the
/// next request returns nothing new for it while the other collection pages on.
fn advance(cursor: &mut Option<String>, page_info: &PageInfo) -> bool {
    if let Some(end) = &page_info.end_cursor {
        *cursor = Some(end.clone());
    }
    page_info.has_next_page
}

impl GitHub {
    pub fn new(settings: Settings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    async fn query<P: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<P, BackendError> {
        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.access_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, "pull request"));
        }

        let envelope: GraphQlResponse<RepositoryData<P>> = response.json().await?;
        if let Some(error) = envelope.errors.first() {
            return Err(match error.kind.as_deref() {
                Some("NOT_FOUND") => BackendError::NotFound {
                    resource: "pull request".to_string(),
                },
                Some("RATE_LIMITED") => BackendError::RateLimited,
                _ => BackendError::Shape(error.message.clone()),
            });
        }

        envelope
            .data
            .and_then(|data| data.repository)
            .and_then(|repository| repository.pull_request)
            .ok_or_else(|| BackendError::NotFound {
                resource: "pull request".to_string(),
            })
    }

    /// Conversation comments and review bodies, paged together.
    #[instrument(skip(self))]
    async fn flat_comments(&self) -> Result<(Vec<Note>, usize, usize), BackendError> {
        let mut notes = Vec::new();
        let mut comments_cursor: Option<String> = None;
        let mut reviews_cursor: Option<String> = None;

        loop {
            let variables = json!({
                "org": self.settings.org,
                "repo": self.settings.repo,
                "pull": self.settings.pull,
                "limit": self.settings.page_size,
                "commentsCursor": comments_cursor,
                "reviewsCursor": reviews_cursor,
            });
            let pull: CommentsPull = self.query(COMMENTS_QUERY, variables).await?;
            debug!(
                comments = pull.comments.edges.len(),
                reviews = pull.reviews.edges.len(),
                "fetched comment page"
            );

            let more_comments = advance(&mut comments_cursor, &pull.comments.page_info);
            let more_reviews = advance(&mut reviews_cursor, &pull.reviews.page_info);
            notes.extend(pull.comments.edges.into_iter().map(|edge| Note::from(edge.node)));
            notes.extend(pull.reviews.edges.into_iter().map(|edge| Note::from(edge.node)));

            if !more_comments && !more_reviews {
                return Ok((notes, pull.additions, pull.deletions));
            }
        }
    }
}

#[async_trait]
impl ThreadSource for GitHub {
    async fn fetch_threads(&self, window: ThreadWindow) -> Result<ThreadPage, BackendError> {
        let variables = json!({
            "org": self.settings.org,
            "repo": self.settings.repo,
            "pull": self.settings.pull,
            "reviewThreadsLimit": window.thread_limit,
            "reviewThreadsCursor": window.threads_after,
            "commentsLimit": window.note_limit,
            "commentsCursor": window.notes_after,
        });
        let pull: ThreadsPull = self.query(THREADS_QUERY, variables).await?;

        Ok(ThreadPage {
            document_author: login(pull.author),
            threads: pull.review_threads.into_page(|edge| ThreadSlice {
                id: edge.node.id,
                cursor: edge.cursor,
                resolved: Some(edge.node.is_resolved),
                notes: edge.node.comments.into_page(|comment| Note::from(comment.node)),
            }),
        })
    }
}

#[async_trait]
impl Backend for GitHub {
    fn name(&self) -> &str {
        "github"
    }

    #[instrument(skip(self), fields(org = %self.settings.org, repo = %self.settings.repo, pull = self.settings.pull))]
    async fn collect(&self) -> Result<Collected, BackendError> {
        let (flat, additions, deletions) = self.flat_comments().await?;
        let (document_author, threads) = ThreadReconstructor::new(self, self.settings.page_size)
            .reconstruct_all()
            .await?;
        info!(flat = flat.len(), threads = threads.len(), "fetched GitHub review data");

        // flat comments go first so they win timestamp ties
        let discussions = flat
            .into_iter()
            .map(Discussion::Flat)
            .chain(threads.into_iter().map(Discussion::Thread))
            .collect();

        Ok(Collected {
            document_author,
            additions,
            deletions,
            discussions,
            session_threads: false,
        })
    }
}
