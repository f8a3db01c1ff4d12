use once_cell::sync::Lazy;
use regex::Regex;

use super::types::ReviewSession;

/// "レビューN回目" at the very start of the body, optionally as a top-level bullet.
static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:- )?レビュー([0-9]+)回目").expect("marker pattern is valid"));

static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{4}/[0-9]{1,2}/[0-9]{1,2}").expect("date pattern is valid"));

static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{1,2}:[0-9]{1,2}").expect("time pattern is valid"));

static MINUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+").expect("minutes pattern is valid"));

/// How a single comment body participates in the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    /// Review timing comment; `current` when it is for the targeted iteration
    SessionMarker { current: bool },
    /// Review remark that becomes (part of) a record
    Contributing,
    /// Empty or backend-generated; never exported
    Ignored,
}

/// Classify a comment body. Every body maps to exactly one kind.
pub fn classify(body: &str, system_generated: bool, target_iteration: &str) -> CommentKind {
    if system_generated || body.trim().is_empty() {
        return CommentKind::Ignored;
    }
    if !is_session_marker(body) {
        return CommentKind::Contributing;
    }
    CommentKind::SessionMarker {
        current: is_current_iteration(body, target_iteration),
    }
}

pub fn is_session_marker(body: &str) -> bool {
    MARKER.is_match(body)
}

/// True when the body is a marker for `target_iteration`.
/// Iterations compare as strings, so "01" and "1" differ.
pub fn is_current_iteration(body: &str, target_iteration: &str) -> bool {
    marker_iteration(body) == Some(target_iteration)
}

fn marker_iteration(body: &str) -> Option<&str> {
    MARKER
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Extract the session fields from a current-iteration marker.
///
/// The marker is followed by up to four non-empty lines holding the date,
/// start time, end time and duration, in that order. Labels around the
/// values are ignored. Anything missing is left empty.
pub fn parse(body: &str, target_iteration: &str) -> ReviewSession {
    if !is_current_iteration(body, target_iteration) {
        return ReviewSession::default();
    }

    let normalized = body.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .collect();

    let field = |index: usize, pattern: &Regex| -> String {
        lines
            .get(index)
            .and_then(|line| pattern.find(line))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    };

    ReviewSession {
        review_date: field(1, &DATE),
        start_time: field(2, &TIME),
        end_time: field(3, &TIME),
        duration_minutes: field(4, &MINUTES),
    }
}
