use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const HEADER: &str = "WEBVTT";

static TIMING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{2}:\d{2}:\d{2}\.\d{3} --> \d{2}:\d{2}:\d{2}\.\d{3}")
        .expect("timing pattern compiles")
});

/// One caption cue: its timing line and the cue text joined onto a single line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionRecord {
    pub timestamp: String,
    pub text: String,
}

impl CaptionRecord {
    pub fn new(timestamp: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            text: text.into(),
        }
    }

    /// Whole seconds at which the cue starts, if the timing line is well formed.
    pub fn start_seconds(&self) -> Option<u64> {
        start_seconds(&self.timestamp)
    }
}

/// Whether a line opens a cue (`HH:MM:SS.mmm --> HH:MM:SS.mmm`, settings allowed after).
pub fn is_timing_line(line: &str) -> bool {
    TIMING_RE.is_match(line)
}

/// Parse a caption track block by block.
///
/// Blocks are runs of non-blank lines. A leading `WEBVTT` header block is
/// dropped; every other block becomes a record whose timestamp is the first
/// line, even when the block carries no text.
pub fn parse(content: &str) -> Vec<CaptionRecord> {
    let mut records = Vec::new();
    let mut first_block = true;

    for block in blocks(content) {
        let Some((head, body)) = block.split_first() else {
            continue;
        };

        if first_block && head.starts_with(HEADER) {
            first_block = false;
            continue;
        }
        first_block = false;

        records.push(CaptionRecord::new(*head, body.join(" ")));
    }

    records
}

/// Parse a caption track line by line, keeping only complete cues.
///
/// A record needs a timing line and at least one text line. A new timing line
/// closes the pending cue even without a separating blank line, and anything
/// before the first timing line (headers, metadata) is ignored.
pub fn parse_strict(content: &str) -> Vec<CaptionRecord> {
    let mut records = Vec::new();
    let mut current: Option<CaptionRecord> = None;

    for line in content.lines().map(str::trim) {
        if line.is_empty() {
            flush(&mut current, &mut records);
        } else if is_timing_line(line) {
            flush(&mut current, &mut records);
            current = Some(CaptionRecord::new(line, ""));
        } else if let Some(record) = current.as_mut() {
            if !record.text.is_empty() {
                record.text.push(' ');
            }
            record.text.push_str(line);
        }
    }
    flush(&mut current, &mut records);

    records
}

/// Serialize records back into a caption track both parsers read unchanged.
pub fn to_vtt(records: &[CaptionRecord]) -> String {
    let mut out = String::from(HEADER);
    out.push_str("\n\n");
    for record in records {
        out.push_str(&record.timestamp);
        out.push('\n');
        if !record.text.is_empty() {
            out.push_str(&record.text);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Whole seconds at the start of a `HH:MM:SS.mmm --> ...` timing line.
pub fn start_seconds(timestamp: &str) -> Option<u64> {
    let start = timestamp.split("-->").next()?.trim();
    let mut parts = start.split(':');
    let hh: u64 = parts.next()?.parse().ok()?;
    let mm: u64 = parts.next()?.parse().ok()?;
    let ss: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !(0.0..=u64::MAX as f64).contains(&ss) {
        return None;
    }
    hh.checked_mul(3600)?
        .checked_add(mm.checked_mul(60)?)?
        .checked_add(ss.floor() as u64)
}

fn flush(current: &mut Option<CaptionRecord>, records: &mut Vec<CaptionRecord>) {
    match current.take() {
        Some(record) if !record.text.is_empty() => records.push(record),
        _ => {}
    }
}

fn blocks(content: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut block = Vec::new();

    for line in content.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            if !block.is_empty() {
                blocks.push(std::mem::take(&mut block));
            }
        } else {
            block.push(line);
        }
    }
    if !block.is_empty() {
        blocks.push(block);
    }

    blocks
}
