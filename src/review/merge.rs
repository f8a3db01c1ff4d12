use tracing::debug;

use super::session::{self, CommentKind};
use super::split::split;
use super::types::{Collected, Discussion, Note, OrderKey, ReviewRecord, ReviewSession, Thread};

/// Settings that shape how comments become records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Review iteration whose session marker is reported
    pub iteration: String,
    /// Reviewer/reviewee delimiter for flat comments; `None` keeps bodies whole
    pub delimiter: Option<String>,
    /// Prefix for the second and later notes from one side of a thread
    pub postscript_prefix: String,
}

/// Ordered records plus the session of the targeted iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Merged {
    pub session: ReviewSession,
    pub records: Vec<ReviewRecord>,
}

/// Turn encounter-ordered discussions into the final record list.
///
/// Records are stably sorted by [`OrderKey`], so discussions with equal keys
/// keep the order the adapter produced them in.
pub fn merge(collected: Collected, options: &MergeOptions) -> Merged {
    let document_author = collected.document_author.as_str();
    let mut session: Option<ReviewSession> = None;
    let mut records = Vec::new();

    for (position, discussion) in collected.discussions.into_iter().enumerate() {
        match discussion {
            Discussion::Flat(note) => {
                match session::classify(&note.body, note.system_generated, &options.iteration) {
                    CommentKind::SessionMarker { current: true } => {
                        take_session(&mut session, &note, options);
                    }
                    CommentKind::SessionMarker { current: false } | CommentKind::Ignored => {}
                    CommentKind::Contributing => {
                        records.push(flat_record(note, position, document_author, options));
                    }
                }
            }
            Discussion::Thread(thread) => {
                let Some(lead) = thread.lead_note() else {
                    continue;
                };
                let kind = session::classify(&lead.body, lead.system_generated, &options.iteration);
                match kind {
                    CommentKind::Ignored => {}
                    CommentKind::SessionMarker { .. } if collected.session_threads => {
                        let current = thread
                            .notes
                            .iter()
                            .find(|note| session::is_current_iteration(&note.body, &options.iteration));
                        if let Some(note) = current {
                            take_session(&mut session, note, options);
                        }
                    }
                    CommentKind::SessionMarker { .. } | CommentKind::Contributing => {
                        records.push(thread_record(&thread, lead, position, document_author, options));
                    }
                }
            }
        }
    }

    let before = records.len();
    records.retain(|record| {
        !(record.reviewer_comment.trim().is_empty() && record.reviewee_comment.trim().is_empty())
    });
    if records.len() != before {
        debug!(dropped = before - records.len(), "dropped records without comment text");
    }
    records.sort_by(|a, b| a.order_key.cmp(&b.order_key));

    Merged {
        session: session.unwrap_or_default(),
        records,
    }
}

/// Only the first marker of the targeted iteration is kept.
fn take_session(session: &mut Option<ReviewSession>, note: &Note, options: &MergeOptions) {
    if session.is_some() {
        debug!(location = %note.location_ref, "ignoring additional session marker");
        return;
    }
    *session = Some(session::parse(&note.body, &options.iteration));
}

fn order_key(note: &Note, position: usize) -> OrderKey {
    match &note.timestamp {
        Some(timestamp) => OrderKey::Timestamp(timestamp.clone()),
        None => OrderKey::Position(position),
    }
}

fn flat_record(note: Note, position: usize, document_author: &str, options: &MergeOptions) -> ReviewRecord {
    let (reviewer_comment, reviewee_comment) = match &options.delimiter {
        Some(delimiter) => split(&note.body, delimiter),
        None => (note.body.trim().to_string(), String::new()),
    };
    let order_key = order_key(&note, position);
    ReviewRecord {
        location_ref: note.location_ref,
        reviewer_comment,
        reviewer_name: note.author,
        reviewee_comment,
        reviewee_name: document_author.to_string(),
        resolved: false,
        has_resolved_status: false,
        order_key,
    }
}

fn thread_record(
    thread: &Thread,
    lead: &Note,
    position: usize,
    document_author: &str,
    options: &MergeOptions,
) -> ReviewRecord {
    let attribution = thread.attribute(document_author, &options.postscript_prefix);
    ReviewRecord {
        location_ref: lead.location_ref.clone(),
        reviewer_comment: attribution.reviewer_comment,
        reviewer_name: attribution.reviewer,
        reviewee_comment: attribution.reviewee_comment,
        reviewee_name: document_author.to_string(),
        resolved: thread.resolved.unwrap_or(false),
        has_resolved_status: thread.resolved.is_some(),
        order_key: order_key(lead, position),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::thread::tests::note;

    fn options() -> MergeOptions {
        MergeOptions {
            iteration: "1".to_string(),
            delimiter: Some("~~".to_string()),
            postscript_prefix: "(追記)".to_string(),
        }
    }

    fn stamped(author: &str, body: &str, timestamp: &str, location: &str) -> Note {
        Note {
            timestamp: Some(timestamp.to_string()),
            location_ref: location.to_string(),
            ..note(author, body)
        }
    }

    fn collected(discussions: Vec<Discussion>) -> Collected {
        Collected {
            document_author: "alice".to_string(),
            discussions,
            ..Collected::default()
        }
    }

    /// Discussions as GitLab reports them.
    fn session_threads(discussions: Vec<Discussion>) -> Collected {
        Collected {
            session_threads: true,
            ..collected(discussions)
        }
    }

    fn thread(id: &str, resolved: Option<bool>, notes: Vec<Note>) -> Discussion {
        Discussion::Thread(Thread {
            id: id.to_string(),
            resolved,
            notes,
        })
    }

    #[test]
    fn test_orders_by_timestamp_across_sources() {
        let discussions = vec![
            Discussion::Flat(stamped("bob", "flat late", "2023-04-14T03:00:00Z", "f3")),
            Discussion::Flat(stamped("bob", "flat early", "2023-04-14T01:00:00Z", "f1")),
            thread("T", Some(true), vec![stamped("carol", "thread middle", "2023-04-14T02:00:00Z", "t2")]),
        ];
        let merged = merge(collected(discussions), &options());
        let locations: Vec<&str> = merged.records.iter().map(|r| r.location_ref.as_str()).collect();
        assert_eq!(locations, ["f1", "t2", "f3"]);

        let threaded = &merged.records[1];
        assert!(threaded.has_resolved_status);
        assert!(threaded.resolved);
        assert_eq!(threaded.reviewer_name, "carol");
        assert_eq!(threaded.reviewee_name, "alice");
        assert!(!merged.records[0].has_resolved_status);
    }

    #[test]
    fn test_equal_timestamps_keep_flat_first() {
        let discussions = vec![
            Discussion::Flat(stamped("bob", "flat", "2023-04-14T01:00:00Z", "flat")),
            thread("T", Some(false), vec![stamped("bob", "thread", "2023-04-14T01:00:00Z", "thread")]),
        ];
        let merged = merge(collected(discussions), &options());
        assert_eq!(merged.records[0].location_ref, "flat");
        assert_eq!(merged.records[1].location_ref, "thread");
    }

    #[test]
    fn test_positional_order_without_timestamps() {
        let discussions = vec![
            thread("T1", None, vec![Note { location_ref: "a".to_string(), ..note("bob", "one") }]),
            Discussion::Flat(Note { location_ref: "b".to_string(), ..note("bob", "two") }),
            thread("T2", None, vec![Note { location_ref: "c".to_string(), ..note("bob", "three") }]),
        ];
        let merged = merge(collected(discussions), &options());
        let locations: Vec<&str> = merged.records.iter().map(|r| r.location_ref.as_str()).collect();
        assert_eq!(locations, ["a", "b", "c"]);
        assert!(merged.records.iter().all(|r| !r.has_resolved_status && !r.resolved));
    }

    #[test]
    fn test_flat_comment_is_split_on_delimiter() {
        let discussions = vec![Discussion::Flat(note("bob", "変数名を直してください\n~~\n直しました"))];
        let merged = merge(collected(discussions), &options());
        let record = &merged.records[0];
        assert_eq!(record.reviewer_comment, "変数名を直してください");
        assert_eq!(record.reviewer_name, "bob");
        assert_eq!(record.reviewee_comment, "直しました");
        assert_eq!(record.reviewee_name, "alice");
    }

    #[test]
    fn test_without_delimiter_body_stays_whole() {
        let mut opts = options();
        opts.delimiter = None;
        let discussions = vec![Discussion::Flat(note("bob", "a\n~~\nb"))];
        let merged = merge(collected(discussions), &opts);
        assert_eq!(merged.records[0].reviewer_comment, "a\n~~\nb");
        assert!(merged.records[0].reviewee_comment.is_empty());
    }

    #[test]
    fn test_session_markers_are_not_records() {
        let discussions = vec![
            Discussion::Flat(note("bob", "レビュー2回目\n2023/4/1\n9:00\n10:00\n60")),
            Discussion::Flat(note("bob", "- レビュー1回目\n- 2023/4/14\n- 9:00\n- 11:30\n- 30")),
            Discussion::Flat(note("bob", "レビュー1回目\n2099/1/1")),
            Discussion::Flat(note("bob", "real remark")),
        ];
        let merged = merge(collected(discussions), &options());
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.records[0].reviewer_comment, "real remark");
        assert_eq!(merged.session.review_date, "2023/4/14");
        assert_eq!(merged.session.duration_minutes, "30");
    }

    #[test]
    fn test_first_current_marker_wins() {
        let discussions = vec![
            Discussion::Flat(note("bob", "レビュー1回目\n2023/4/14\n9:00")),
            Discussion::Flat(note("carol", "レビュー1回目\n2023/4/15\n13:00")),
        ];
        let merged = merge(collected(discussions), &options());
        assert_eq!(merged.session.review_date, "2023/4/14");
        assert_eq!(merged.session.start_time, "9:00");
    }

    #[test]
    fn test_marker_thread_supplies_session() {
        let discussions = vec![thread(
            "T",
            Some(false),
            vec![
                note("bob", "レビュー時間スレッド\nレビュー2回目"),
                note("bob", "レビュー1回目\n2023/5/1\n13:00"),
            ],
        )];
        // a thread led by a non-marker note is a review thread, not a session source
        let merged = merge(session_threads(discussions), &options());
        assert_eq!(merged.records.len(), 1);
        assert!(merged.session.is_empty());

        let discussions = vec![thread(
            "T",
            Some(false),
            vec![note("bob", "レビュー2回目\n2023/4/1"), note("bob", "レビュー1回目\n2023/5/1\n13:00")],
        )];
        let merged = merge(session_threads(discussions), &options());
        assert!(merged.records.is_empty());
        assert_eq!(merged.session.review_date, "2023/5/1");
        assert_eq!(merged.session.start_time, "13:00");
    }

    #[test]
    fn test_marker_led_review_thread_is_a_record() {
        let discussions = vec![thread(
            "T",
            Some(true),
            vec![
                note("bob", "レビュー1回目\n2023/4/14\n9:00\n10:00\n60"),
                note("carol", "この関数は分割してください"),
                note("alice", "分割しました"),
            ],
        )];
        let merged = merge(collected(discussions), &options());
        assert!(merged.session.is_empty());
        assert_eq!(merged.records.len(), 1);

        let record = &merged.records[0];
        assert_eq!(record.reviewer_name, "bob");
        assert_eq!(
            record.reviewer_comment,
            "レビュー1回目\n2023/4/14\n9:00\n10:00\n60\n(追記)この関数は分割してください"
        );
        assert_eq!(record.reviewee_comment, "分割しました");
        assert!(record.resolved);
        assert!(record.has_resolved_status);
    }

    #[test]
    fn test_thread_location_follows_lead_note() {
        let discussions = vec![thread(
            "T",
            Some(false),
            vec![
                Note {
                    timestamp: Some("2023-04-14T01:00:00Z".to_string()),
                    location_ref: "empty".to_string(),
                    ..note("bob", "")
                },
                stamped("bob", "remark", "2023-04-14T02:00:00Z", "remark"),
            ],
        )];
        let merged = merge(collected(discussions), &options());
        let record = &merged.records[0];
        assert_eq!(record.location_ref, "remark");
        assert_eq!(record.order_key, OrderKey::Timestamp("2023-04-14T02:00:00Z".to_string()));
    }

    #[test]
    fn test_thread_reviewer_is_first_non_author() {
        let discussions = vec![thread(
            "T",
            Some(false),
            vec![note("alice", "please check this"), note("bob", "looks wrong"), note("carol", "agreed")],
        )];
        let merged = merge(session_threads(discussions), &options());
        let record = &merged.records[0];
        assert_eq!(record.reviewer_name, "bob");
        assert_eq!(record.reviewer_comment, "looks wrong\n(追記)agreed");
        assert_eq!(record.reviewee_comment, "please check this");
        assert_eq!(record.location_ref, "");
    }

    #[test]
    fn test_empty_and_system_comments_are_dropped() {
        let discussions = vec![
            Discussion::Flat(note("bob", "")),
            Discussion::Flat(note("bob", "~~")),
            Discussion::Flat(Note {
                system_generated: true,
                ..note("bob", "added 1 commit")
            }),
            thread("T", Some(false), vec![note("bob", "  "), note("alice", "")]),
            thread("S", Some(false), vec![Note { system_generated: true, ..note("bob", "changed the description") }]),
        ];
        let merged = merge(collected(discussions), &options());
        assert!(merged.records.is_empty());
    }
}
