use std::path::Path;

use crate::fsio;
use crate::index::SearchHit;
use crate::playlist::{self, AuditReport, VideoEntry};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the video list as a `<ul>` of checkbox + link items.
///
/// Only rows with a URL are listed; rows already marked `-[x]` render checked.
pub fn render_html(rows: &[VideoEntry]) -> (String, usize) {
    let mut html = String::from("<ul id=\"videoList\">\n");
    let mut count = 0;

    for row in rows {
        let Some(url) = &row.url else {
            continue;
        };
        let checked = if playlist::is_checked(&row.title) { " checked" } else { "" };
        html.push_str(&format!(
            "  <li><input type=\"checkbox\"{checked}> <a href=\"{}\" target=\"_blank\">{}</a></li>\n",
            escape_html(url),
            escape_html(&row.clean_title()),
        ));
        count += 1;
    }

    html.push_str("</ul>\n");
    (html, count)
}

/// Write the HTML listing to `path`. Returns the number of items written.
pub fn write_html(path: &Path, rows: &[VideoEntry]) -> Result<usize, ExportError> {
    let (html, count) = render_html(rows);
    fsio::write_atomic(path, html.as_bytes())?;
    Ok(count)
}

/// Format search hits as a console table.
pub fn search_table(hits: &[SearchHit]) -> comfy_table::Table {
    let mut table = comfy_table::Table::new();
    table.set_header(["#", "Video", "Time", "Text", "Link"]);

    for (i, hit) in hits.iter().enumerate() {
        table.add_row([
            (i + 1).to_string(),
            hit.name.clone(),
            hit.timestamp.clone(),
            hit.text.clone(),
            hit.link.clone(),
        ]);
    }

    table
}

/// Format the spreadsheet/caption consistency report as a console table.
pub fn audit_table(report: &AuditReport) -> comfy_table::Table {
    let mut table = comfy_table::Table::new();
    table.set_header(["Issue", "Video", "Detail"]);

    for group in &report.duplicates {
        let lines: Vec<String> = group.lines.iter().map(ToString::to_string).collect();
        table.add_row([
            "duplicate row".to_string(),
            group.video_id.clone(),
            format!("{} (lines {})", group.title, lines.join(", ")),
        ]);
    }
    for (id, title) in &report.missing_captions {
        table.add_row(["no captions".to_string(), id.clone(), title.clone()]);
    }
    for (id, file) in &report.orphan_files {
        table.add_row(["not in spreadsheet".to_string(), id.clone(), file.clone()]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_lists_rows_with_urls() {
        let rows = vec![
            VideoEntry::new("-[ ] Tom & Jerry <live>", "https://youtu.be/abc12345678"),
            VideoEntry::new("-[x] Done", "https://youtu.be/bcd12345678?x=1&y=2"),
            VideoEntry::title_only("-[ ] No link"),
        ];
        let (html, count) = render_html(&rows);

        assert_eq!(count, 2);
        assert!(html.starts_with("<ul id=\"videoList\">\n"));
        assert!(html.contains(
            "<li><input type=\"checkbox\"> <a href=\"https://youtu.be/abc12345678\" target=\"_blank\">Tom &amp; Jerry &lt;live&gt;</a></li>"
        ));
        assert!(html.contains("<input type=\"checkbox\" checked> <a href=\"https://youtu.be/bcd12345678?x=1&amp;y=2\""));
        assert!(!html.contains("No link"));
        assert!(html.ends_with("</ul>\n"));
    }

    #[test]
    fn search_table_has_one_row_per_hit() {
        let hits = vec![SearchHit {
            file: "a-abc12345678.vtt".into(),
            name: "A".into(),
            timestamp: "00:00:01.000 --> 00:00:02.000".into(),
            text: "hello".into(),
            link: "https://www.youtube.com/watch?v=abc12345678&t=1".into(),
        }];
        let rendered = search_table(&hits).to_string();
        assert!(rendered.contains("hello"));
        assert!(rendered.contains("00:00:01.000"));
    }

    #[test]
    fn write_html_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("videos.html");
        let n = write_html(&path, &[VideoEntry::new("A", "https://youtu.be/abc12345678")]).unwrap();
        assert_eq!(n, 1);
        assert!(std::fs::read_to_string(&path).unwrap().contains(">A</a>"));
    }
}
