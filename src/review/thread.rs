use async_trait::async_trait;
use tracing::{debug, instrument};

use super::types::{Note, Page, Thread};
use crate::backend::BackendError;

/// One request against a two-level (threads, then notes) paginated source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadWindow {
    /// Outer cursor: threads strictly after this position
    pub threads_after: Option<String>,
    pub thread_limit: u8,
    /// Inner cursor: notes of the first returned thread after this position
    pub notes_after: Option<String>,
    pub note_limit: u8,
}

impl ThreadWindow {
    /// Window opening a fresh page of threads with their first notes.
    pub fn threads(after: Option<String>, page_size: u8) -> Self {
        Self {
            threads_after: after,
            thread_limit: page_size,
            notes_after: None,
            note_limit: page_size,
        }
    }
}

/// Position of the next note page of a thread that did not fit in one fetch.
///
/// The source can only address a thread as "the next thread after some outer
/// cursor", so both cursors travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationCursor {
    /// Outer cursor of the thread before the target; `None` for the first thread
    pub preceding: Option<String>,
    /// End cursor of the notes already collected for the target
    pub notes: String,
}

impl ContinuationCursor {
    fn window(&self, page_size: u8) -> ThreadWindow {
        ThreadWindow {
            threads_after: self.preceding.clone(),
            thread_limit: 1,
            notes_after: Some(self.notes.clone()),
            note_limit: page_size,
        }
    }
}

/// A thread as returned by one fetch, possibly missing later notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSlice {
    pub id: String,
    /// Outer cursor of this thread within the thread collection
    pub cursor: String,
    pub resolved: Option<bool>,
    pub notes: Page<Note>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPage {
    /// Author of the pull request the threads belong to
    pub document_author: String,
    pub threads: Page<ThreadSlice>,
}

/// A backend that serves review threads with nested note pagination.
#[async_trait]
pub trait ThreadSource: Send + Sync {
    async fn fetch_threads(&self, window: ThreadWindow) -> Result<ThreadPage, BackendError>;
}

/// Rebuilds complete threads from a [`ThreadSource`].
pub struct ThreadReconstructor<'a, S: ThreadSource + ?Sized> {
    source: &'a S,
    page_size: u8,
}

impl<'a, S: ThreadSource + ?Sized> ThreadReconstructor<'a, S> {
    pub fn new(source: &'a S, page_size: u8) -> Self {
        Self { source, page_size }
    }

    /// Fetch every thread with all of its notes.
    /// Returns the document author reported by the source alongside the threads.
    #[instrument(skip(self), fields(page_size = self.page_size))]
    pub async fn reconstruct_all(&self) -> Result<(String, Vec<Thread>), BackendError> {
        let mut threads = Vec::new();
        let mut document_author = String::new();
        let mut outer: Option<String> = None;

        loop {
            let page = self
                .source
                .fetch_threads(ThreadWindow::threads(outer.clone(), self.page_size))
                .await?;
            document_author = page.document_author;
            debug!(threads = page.threads.items.len(), has_more = page.threads.has_more, "fetched thread page");

            let mut preceding = outer.clone();
            for slice in page.threads.items {
                let own_cursor = slice.cursor.clone();
                threads.push(self.reconstruct(slice, preceding).await?);
                preceding = Some(own_cursor);
            }

            if !page.threads.has_more {
                break;
            }
            outer = page.threads.next_cursor;
        }

        Ok((document_author, threads))
    }

    /// Complete one thread, fetching continuation pages of its notes.
    ///
    /// `preceding` is the outer cursor of the thread listed before this one,
    /// or the cursor the enclosing page was opened with.
    pub async fn reconstruct(
        &self,
        slice: ThreadSlice,
        preceding: Option<String>,
    ) -> Result<Thread, BackendError> {
        let ThreadSlice {
            id,
            resolved,
            notes: first_page,
            ..
        } = slice;
        let mut notes = first_page.items;
        let mut has_more = first_page.has_more;
        let mut notes_cursor = first_page.next_cursor;

        while has_more {
            let cursor = ContinuationCursor {
                preceding: preceding.clone(),
                notes: notes_cursor.take().ok_or_else(|| {
                    BackendError::Shape(format!("thread {id} reports more notes without a cursor"))
                })?,
            };
            debug!(thread = %id, notes_after = %cursor.notes, "fetching thread continuation");

            let page = self.source.fetch_threads(cursor.window(self.page_size)).await?;
            let continued = page
                .threads
                .items
                .into_iter()
                .find(|candidate| candidate.id == id)
                .ok_or_else(|| BackendError::UnmatchedThread { id: id.clone() })?;

            notes.extend(continued.notes.items);
            has_more = continued.notes.has_more;
            notes_cursor = continued.notes.next_cursor;
        }

        Ok(Thread {
            id,
            resolved,
            notes,
        })
    }
}

/// Reviewer/reviewee view of a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    /// Author of the first non-author note; later participants do not replace it
    pub reviewer: String,
    pub reviewer_comment: String,
    pub reviewee_comment: String,
}

impl Thread {
    /// Attribute each note to the reviewer or the reviewee side.
    ///
    /// Notes by `document_author` are the reviewee's. Notes from one side are
    /// joined in order, each after the first prefixed by a line break and
    /// `postscript_prefix`. Empty notes are skipped.
    pub fn attribute(&self, document_author: &str, postscript_prefix: &str) -> Attribution {
        let separator = format!("\n{postscript_prefix}");
        let mut reviewer = None;
        let mut reviewer_notes = Vec::new();
        let mut reviewee_notes = Vec::new();

        for note in self.notes.iter().filter(|note| !note.body.trim().is_empty()) {
            if note.author == document_author {
                reviewee_notes.push(note.body.as_str());
            } else {
                reviewer.get_or_insert(note.author.as_str());
                reviewer_notes.push(note.body.as_str());
            }
        }

        Attribution {
            reviewer: reviewer.unwrap_or_default().to_string(),
            reviewer_comment: reviewer_notes.join(&separator),
            reviewee_comment: reviewee_notes.join(&separator),
        }
    }

    /// The note that represents the thread: the first one with a body.
    pub fn lead_note(&self) -> Option<&Note> {
        self.notes.iter().find(|note| !note.body.trim().is_empty())
    }
}
