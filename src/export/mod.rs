pub mod types;

pub use types::{ReportHeader, ReviewReport, ReviewRow};

use crate::review::Extraction;
use colored::Colorize;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write CSV file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write CSV file: {0}")]
    FileWrite(#[from] io::Error),
}

/// Turn an extraction into the rows that get exported.
pub fn build(extraction: Extraction) -> ReviewReport {
    ReviewReport::from(extraction)
}

/// Write the report as CSV to `output_path`, or print a summary to the
/// terminal when no path is given.
#[instrument(skip(report), fields(rows = report.rows.len()))]
pub fn output(report: &ReviewReport, output_path: Option<&Path>) -> Result<(), ExportError> {
    match output_path {
        None => {
            debug!("writing summary to terminal");
            print_terminal_summary(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing CSV file");
            let file = std::fs::File::create(path)?;
            write_csv(report, file)
        }
    }
}

/// CSV without a column header: the report header row, then one row per
/// record, CRLF-terminated.
pub fn write_csv<W: io::Write>(report: &ReviewReport, out: W) -> Result<(), ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(csv::Terminator::CRLF)
        .from_writer(out);

    writer.write_record(report.header.fields())?;
    for row in &report.rows {
        writer.write_record(row.fields())?;
    }
    writer.flush()?;
    Ok(())
}

fn print_terminal_summary(report: &ReviewReport) {
    let header = &report.header;
    println!();
    println!("+{} -{}", header.additions, header.deletions);
    if header.review_date.is_empty() && header.start_time.is_empty() {
        println!("Review session: {}", "not recorded".yellow());
    } else {
        println!(
            "Review session: {} {}-{} ({} min)",
            header.review_date, header.start_time, header.end_time, header.duration_minutes
        );
    }
    println!();

    println!("═══ Review comments: {} ═══", report.rows.len());
    for row in &report.rows {
        println!("  • {} → {} {}", row.reviewer.bold(), row.reviewee, status_label(row));
        println!("    {}", first_line(&row.reviewer_comment));
        if !row.reviewee_comment.is_empty() {
            println!("    {}", first_line(&row.reviewee_comment).dimmed());
        }
        println!("    {}", row.url.cyan());
    }
    println!();
}

fn status_label(row: &ReviewRow) -> colored::ColoredString {
    match (row.has_resolved_status, row.resolved) {
        (true, true) => "[resolved]".green().bold(),
        (true, false) => "[open]".red().bold(),
        (false, _) => "".normal(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
