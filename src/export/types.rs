use crate::review::{Extraction, ReviewRecord};

/// First CSV row: diff size and the review session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportHeader {
    /// Added lines; always 0 for GitBucket
    pub additions: usize,
    /// Removed lines; always 0 for GitBucket
    pub deletions: usize,
    pub review_date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: String,
}

/// One exported review item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRow {
    pub url: String,
    pub reviewer_comment: String,
    pub reviewer: String,
    pub reviewee_comment: String,
    pub reviewee: String,
    pub resolved: bool,
    pub has_resolved_status: bool,
}

/// Everything written by one export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewReport {
    pub header: ReportHeader,
    pub rows: Vec<ReviewRow>,
}

impl ReportHeader {
    pub fn fields(&self) -> [String; 6] {
        [
            self.additions.to_string(),
            self.deletions.to_string(),
            self.review_date.clone(),
            self.start_time.clone(),
            self.end_time.clone(),
            self.duration_minutes.clone(),
        ]
    }
}

impl ReviewRow {
    /// CSV fields with both comments folded onto one line.
    pub fn fields(&self) -> [String; 7] {
        [
            self.url.clone(),
            escape(&self.reviewer_comment),
            self.reviewer.clone(),
            escape(&self.reviewee_comment),
            self.reviewee.clone(),
            self.resolved.to_string(),
            self.has_resolved_status.to_string(),
        ]
    }
}

impl From<ReviewRecord> for ReviewRow {
    fn from(record: ReviewRecord) -> Self {
        Self {
            url: record.location_ref,
            reviewer_comment: record.reviewer_comment,
            reviewer: record.reviewer_name,
            reviewee_comment: record.reviewee_comment,
            reviewee: record.reviewee_name,
            resolved: record.resolved,
            has_resolved_status: record.has_resolved_status,
        }
    }
}

impl From<Extraction> for ReviewReport {
    fn from(extraction: Extraction) -> Self {
        Self {
            header: ReportHeader {
                additions: extraction.additions,
                deletions: extraction.deletions,
                review_date: extraction.session.review_date,
                start_time: extraction.session.start_time,
                end_time: extraction.session.end_time,
                duration_minutes: extraction.session.duration_minutes,
            },
            rows: extraction.records.into_iter().map(ReviewRow::from).collect(),
        }
    }
}

/// Fold a comment onto one line: `\` becomes `\\`, LF becomes `\n`, CR is dropped.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a\r\nb"), "a\\nb");
        assert_eq!(escape("C:\\temp\nx"), "C:\\\\temp\\nx");
        assert_eq!(escape("レビュー"), "レビュー");
        assert_eq!(escape(""), "");
    }

    #[test]
    fn test_row_fields() {
        let row = ReviewRow {
            url: "https://example.com/pull/1#c1".to_string(),
            reviewer_comment: "line one\nline two".to_string(),
            reviewer: "bob".to_string(),
            reviewee_comment: String::new(),
            reviewee: "alice".to_string(),
            resolved: false,
            has_resolved_status: true,
        };
        assert_eq!(
            row.fields(),
            [
                "https://example.com/pull/1#c1",
                "line one\\nline two",
                "bob",
                "",
                "alice",
                "false",
                "true"
            ]
            .map(String::from)
        );
    }
}
