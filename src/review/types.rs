/// Review timing metadata taken from a session-marker comment.
/// Fields are empty strings when the marker omits them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewSession {
    /// Review date, e.g. "2023/4/14"
    pub review_date: String,
    /// Start time, e.g. "9:00"
    pub start_time: String,
    /// End time, e.g. "11:30"
    pub end_time: String,
    /// Review duration in minutes
    pub duration_minutes: String,
}

impl ReviewSession {
    pub fn is_empty(&self) -> bool {
        self.review_date.is_empty()
            && self.start_time.is_empty()
            && self.end_time.is_empty()
            && self.duration_minutes.is_empty()
    }
}

/// Sort key of a record.
///
/// Positions are used when the backend supplies no creation time; they sort
/// before any timestamp. Timestamps compare lexicographically, which holds
/// because every backend reports fixed-width ISO-8601.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrderKey {
    Position(usize),
    Timestamp(String),
}

/// One exported review item: a reviewer's remark and the reviewee's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRecord {
    /// URL (or URL with anchor) of the comment or thread
    pub location_ref: String,
    pub reviewer_comment: String,
    pub reviewer_name: String,
    pub reviewee_comment: String,
    pub reviewee_name: String,
    /// Meaningless (always false) unless `has_resolved_status` is set
    pub resolved: bool,
    /// Whether the backend can express resolution for this record
    pub has_resolved_status: bool,
    pub order_key: OrderKey,
}

/// A single comment as reported by a backend.
///
/// A flat (non-threaded) comment is one `Note`; a thread is a sequence of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Note {
    /// Login or username of the author; empty when the backend omits it
    pub author: String,
    pub body: String,
    /// ISO-8601 creation time, if the backend reports one
    pub timestamp: Option<String>,
    /// URL or anchor pointing at this note
    pub location_ref: String,
    /// Notes generated by the backend itself (e.g. GitLab system notes)
    pub system_generated: bool,
}

/// A conversation attached to a code location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    /// Backend identifier, stable across page fetches
    pub id: String,
    /// `None` when the backend has no notion of resolution
    pub resolved: Option<bool>,
    /// Notes in fetch order
    pub notes: Vec<Note>,
}

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor to pass to fetch the page after this one
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Unit handed from an adapter to the merger, in encounter order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discussion {
    Flat(Note),
    Thread(Thread),
}

/// Everything one backend run produces before merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collected {
    /// Author of the pull/merge request (the reviewee)
    pub document_author: String,
    pub additions: usize,
    pub deletions: usize,
    pub discussions: Vec<Discussion>,
    /// A thread led by a session marker carries the session instead of a
    /// review remark. Only GitLab, where every comment is a thread, works this way.
    pub session_threads: bool,
}
