pub mod merge;
pub mod session;
pub mod split;
pub mod thread;
pub mod types;

pub use merge::MergeOptions;
pub use types::{Collected, Discussion, Note, Page, ReviewRecord, Thread};

use tracing::{debug, info, instrument};

use crate::backend::{Backend, BackendError};
use types::ReviewSession;

/// Result of one extraction run, ready for export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub additions: usize,
    pub deletions: usize,
    pub session: ReviewSession,
    pub records: Vec<ReviewRecord>,
}

/// Collect everything from `backend` and merge it into ordered records.
///
/// Nothing is returned unless every fetch succeeded.
#[instrument(skip_all, fields(backend = backend.name()))]
pub async fn extract(backend: &dyn Backend, options: &MergeOptions) -> Result<Extraction, BackendError> {
    let collected = backend.collect().await?;
    info!(
        discussions = collected.discussions.len(),
        author = %collected.document_author,
        "collected review discussions"
    );

    let (additions, deletions) = (collected.additions, collected.deletions);
    let merged = merge::merge(collected, options);
    debug!(records = merged.records.len(), session = !merged.session.is_empty(), "merged records");

    Ok(Extraction {
        additions,
        deletions,
        session: merged.session,
        records: merged.records,
    })
}
