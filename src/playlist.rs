use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::fsio;
use crate::video_id;

pub const CHECKED: &str = "-[x] ";
pub const UNCHECKED: &str = "-[ ] ";

const BAR_WIDTH: usize = 50;

static LEADING_BOX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:-\[x\]|-\[ \]|\[x\]|\[ \])\s*").expect("box pattern compiles"));
static ANY_BOX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[x\]|\[ \]").expect("box pattern compiles"));
static LEADING_DASHES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-\s]*").expect("dash pattern compiles"));

#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("spreadsheet not found: {0}")]
    NotFound(PathBuf),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One spreadsheet row. Rows without a URL only carry a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEntry {
    pub title: String,
    pub url: Option<String>,
}

impl VideoEntry {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: Some(url.into()),
        }
    }

    pub fn title_only(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: None,
        }
    }

    /// Video ID derived from the row's URL.
    pub fn video_id(&self) -> Option<String> {
        self.url.as_deref().and_then(video_id::extract)
    }

    /// Title with any checkbox marker removed.
    pub fn clean_title(&self) -> String {
        clean_title(&self.title)
    }
}

/// Remove checkbox markers (`-[x] `, `-[ ] `, `[x]`, `[ ]`) and leading dashes from a title.
pub fn clean_title(title: &str) -> String {
    let cleaned = LEADING_BOX.replace(title, "");
    let cleaned = ANY_BOX.replace_all(&cleaned, "");
    let cleaned = LEADING_DASHES.replace(&cleaned, "");
    cleaned.trim().to_string()
}

/// Whether a raw spreadsheet title carries the checked marker.
pub fn is_checked(title: &str) -> bool {
    title.trim_start().starts_with(CHECKED.trim_end())
}

/// Read spreadsheet rows from a CSV file. Empty rows are skipped with a warning.
pub fn read_rows(path: &Path) -> Result<Vec<VideoEntry>, PlaylistError> {
    if !path.exists() {
        return Err(PlaylistError::NotFound(path.to_path_buf()));
    }
    parse_rows(File::open(path)?)
}

/// Parse header-less `title,url` / `title` CSV rows from any reader.
pub fn parse_rows<R: Read>(reader: R) -> Result<Vec<VideoEntry>, PlaylistError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let title = record.get(0).map(str::trim).unwrap_or_default();
        let url = record.get(1).map(str::trim).filter(|u| !u.is_empty());

        match (title.is_empty(), url) {
            (true, None) => warn!("skipping empty spreadsheet row {}", line + 1),
            (_, Some(url)) => rows.push(VideoEntry::new(title, url)),
            (false, None) => rows.push(VideoEntry::title_only(title)),
        }
    }
    Ok(rows)
}

/// Write rows as header-less CSV, replacing `path` atomically.
pub fn write_rows(path: &Path, rows: &[VideoEntry]) -> Result<(), PlaylistError> {
    let mut buf = Vec::new();
    write_rows_to(&mut buf, rows)?;
    fsio::write_atomic(path, &buf)?;
    Ok(())
}

pub fn write_rows_to<W: Write>(writer: W, rows: &[VideoEntry]) -> Result<(), PlaylistError> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);

    for row in rows {
        match &row.url {
            Some(url) => wtr.write_record([row.title.as_str(), url.as_str()])?,
            None => wtr.write_record([row.title.as_str()])?,
        }
    }

    wtr.flush()?;
    Ok(())
}

// ── Dedup and checkmarks ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Video(String),
    Url(String),
    Title(String),
}

fn row_key(row: &VideoEntry) -> RowKey {
    match &row.url {
        Some(url) => match video_id::extract(url) {
            Some(id) => RowKey::Video(id),
            None => RowKey::Url(url.clone()),
        },
        None => RowKey::Title(row.clean_title()),
    }
}

/// Result of a dedup + checkmark pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Unchecked rows followed by checked rows, with markers applied.
    pub rows: Vec<VideoEntry>,
    pub duplicates_removed: usize,
    pub checked: usize,
}

impl Reconciled {
    pub fn total(&self) -> usize {
        self.rows.len()
    }

    /// Share of rows whose video already has captions, in percent.
    pub fn completion_percentage(&self) -> f64 {
        completion_percentage(self.checked, self.total())
    }
}

pub fn completion_percentage(checked: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        checked as f64 / total as f64 * 100.0
    }
}

/// Drop rows sharing a key (video ID, else URL, else cleaned title), keeping the first occurrence.
///
/// Returns the surviving rows in their original order and the number removed.
pub fn dedup(rows: &[VideoEntry]) -> (Vec<VideoEntry>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(rows.len());
    let mut removed = 0;

    for row in rows {
        if seen.insert(row_key(row)) {
            unique.push(row.clone());
        } else {
            removed += 1;
        }
    }

    (unique, removed)
}

/// Dedup the spreadsheet and mark rows whose video ID is in `captioned`.
pub fn reconcile(rows: &[VideoEntry], captioned: &HashSet<String>) -> Reconciled {
    let (unique, duplicates_removed) = dedup(rows);

    let mut unchecked = Vec::new();
    let mut checked = Vec::new();

    for row in unique {
        let title = row.clean_title();
        let has_captions = row
            .video_id()
            .is_some_and(|id| captioned.contains(&id));

        let marked = VideoEntry {
            title: format!("{}{title}", if has_captions { CHECKED } else { UNCHECKED }),
            url: row.url,
        };
        if has_captions {
            checked.push(marked);
        } else {
            unchecked.push(marked);
        }
    }

    let checked_count = checked.len();
    unchecked.extend(checked);

    Reconciled {
        rows: unchecked,
        duplicates_removed,
        checked: checked_count,
    }
}

/// Render a fixed-width text progress bar, e.g. `|█████-----| 50.00% Complete`.
pub fn progress_bar(percentage: f64) -> String {
    let pct = percentage.clamp(0.0, 100.0);
    let filled = (BAR_WIDTH as f64 * pct / 100.0) as usize;
    format!(
        "|{}{}| {pct:.2}% Complete",
        "█".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

// ── Audit ───────────────────────────────────────────────────────────────

/// A video ID that appears on more than one spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub video_id: String,
    pub title: String,
    /// 1-based row numbers, in file order.
    pub lines: Vec<usize>,
}

/// Consistency report between the spreadsheet and the caption files on disk.
#[derive(Debug, Default)]
pub struct AuditReport {
    pub total_rows: usize,
    pub duplicates: Vec<DuplicateGroup>,
    /// `(video_id, title)` of rows with no caption file.
    pub missing_captions: Vec<(String, String)>,
    /// `(video_id, filename)` of caption files with no spreadsheet row.
    pub orphan_files: Vec<(String, String)>,
}

impl AuditReport {
    pub fn duplicate_rows(&self) -> usize {
        self.duplicates.iter().map(|g| g.lines.len() - 1).sum()
    }

    pub fn is_consistent(&self) -> bool {
        self.duplicates.is_empty() && self.missing_captions.is_empty() && self.orphan_files.is_empty()
    }
}

/// Compare spreadsheet rows against caption filenames without modifying either.
pub fn audit(rows: &[VideoEntry], caption_files: &[String]) -> AuditReport {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, DuplicateGroup> = HashMap::new();

    for (i, row) in rows.iter().enumerate() {
        let Some(id) = row.video_id() else {
            continue;
        };
        by_id
            .entry(id.clone())
            .or_insert_with(|| {
                order.push(id.clone());
                DuplicateGroup {
                    video_id: id,
                    title: row.clean_title(),
                    lines: Vec::new(),
                }
            })
            .lines
            .push(i + 1);
    }

    let files: HashMap<String, &String> = caption_files
        .iter()
        .filter_map(|f| video_id::caption_file_id(f).map(|id| (id, f)))
        .collect();

    let mut report = AuditReport {
        total_rows: rows.len(),
        ..AuditReport::default()
    };

    for id in &order {
        let group = &by_id[id];
        if group.lines.len() > 1 {
            report.duplicates.push(group.clone());
        }
        if !files.contains_key(id) {
            report
                .missing_captions
                .push((id.clone(), group.title.clone()));
        }
    }

    for file in caption_files {
        match video_id::caption_file_id(file) {
            Some(id) if !by_id.contains_key(&id) => report.orphan_files.push((id, file.clone())),
            Some(_) => {}
            None => warn!("no valid video id in caption filename: {file}"),
        }
    }

    report
}
