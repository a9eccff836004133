use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Short function words used as split points when a title has been run together.
const STOPWORDS: &[&str] = &[
    "what", "is", "a", "the", "with", "and", "or", "for", "of", "in", "to", "at", "by",
];

/// Longest stopword looked for inside an already-split token.
const MAX_INNER_WORD: usize = 5;

static UNDERSCORE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_+").expect("underscore pattern compiles"));

#[derive(Debug, thiserror::Error)]
pub enum RenameError {
    #[error("caption directory not found: {0}")]
    MissingDir(PathBuf),
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Make a title safe to use in a filename.
///
/// A possessive `'s` keeps its `s`; other apostrophes are dropped, then
/// everything except letters, digits, space, `-`, `_` and `.` is removed.
pub fn sanitize(title: &str) -> String {
    let title = title.replace("'s", "s").replace("\u{2019}s", "s");
    title
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_numeric() || matches!(c, ' ' | '-' | '_' | '.'))
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Split a run-together token into lowercase words joined by `_`.
///
/// Splits on lower-to-upper case changes and after any accumulated stopword
/// of two or more letters, then breaks long pieces around inner stopwords.
pub fn split_words(text: &str) -> String {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut words: Vec<String> = Vec::new();
    let mut current: String = first.to_lowercase().collect();

    for c in chars {
        let at_stopword = current.chars().count() > 1 && is_stopword(&current);
        if c.is_uppercase() || at_stopword {
            words.push(std::mem::take(&mut current));
        }
        current.extend(c.to_lowercase());
    }
    words.push(current);

    words
        .into_iter()
        .flat_map(|word| split_inner(&word))
        .collect::<Vec<_>>()
        .join("_")
}

/// Greedy left-to-right scan for stopwords inside a token longer than three characters.
fn split_inner(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() <= 3 {
        return vec![word.to_string()];
    }

    let mut pieces = Vec::new();
    let mut pending = String::new();
    let mut i = 0;

    while i < chars.len() {
        let found = (2..=MAX_INNER_WORD)
            .filter(|len| i + len <= chars.len())
            .map(|len| chars[i..i + len].iter().collect::<String>())
            .find(|candidate| is_stopword(candidate));

        match found {
            Some(stopword) => {
                if !pending.is_empty() {
                    pieces.push(std::mem::take(&mut pending));
                }
                i += stopword.chars().count();
                pieces.push(stopword);
            }
            None => {
                pending.push(chars[i]);
                i += 1;
            }
        }
    }
    if !pending.is_empty() {
        pieces.push(pending);
    }

    pieces
}

/// Normalize a title part of a caption filename into `lower_snake_words`.
///
/// Spaces and underscores both separate words.
pub fn clean_filename(name: &str) -> String {
    let safe = sanitize(name);
    let joined = safe
        .split(['_', ' '])
        .map(split_words)
        .collect::<Vec<_>>()
        .join("_");
    UNDERSCORE_RUN
        .replace_all(&joined, "_")
        .trim_matches('_')
        .to_string()
}

/// Name a caption file should have after normalization, or `None` if unchanged.
///
/// A doubled extension (`..vtt`) is repaired first. Only the part before the
/// first `-` or `!` is rewritten; the identifier suffix is kept verbatim.
pub fn normalized_caption_name(filename: &str) -> Option<String> {
    let repaired = match filename.strip_suffix("..vtt") {
        Some(base) => format!("{base}.vtt"),
        None => filename.to_string(),
    };

    let renamed = match repaired.find(['-', '!']) {
        Some(pos) => format!("{}{}", clean_filename(&repaired[..pos]), &repaired[pos..]),
        None => match repaired.strip_suffix(".vtt") {
            Some(base) => format!("{}.vtt", clean_filename(base)),
            None => clean_filename(&repaired),
        },
    };

    (renamed != filename).then_some(renamed)
}

/// A single rename performed by [`rename_caption_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

/// Outcome of a rename pass over the caption directory.
#[derive(Debug, Default)]
pub struct RenameReport {
    pub renamed: Vec<Rename>,
    pub unchanged: usize,
    pub conflicts: Vec<Rename>,
}

/// List `.vtt` files (plain names) directly inside `dir`, sorted by name.
pub fn list_caption_files(dir: &Path) -> Result<Vec<String>, RenameError> {
    if !dir.is_dir() {
        return Err(RenameError::MissingDir(dir.to_path_buf()));
    }

    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".vtt") {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Rename every caption file in `dir` to its normalized name.
///
/// Existing files are never overwritten; such cases are reported as conflicts.
pub fn rename_caption_files(dir: &Path, dry_run: bool) -> Result<RenameReport, RenameError> {
    let mut report = RenameReport::default();

    for name in list_caption_files(dir)? {
        let Some(new_name) = normalized_caption_name(&name) else {
            debug!("no change: {name}");
            report.unchanged += 1;
            continue;
        };

        let rename = Rename {
            from: name,
            to: new_name,
        };
        let target = dir.join(&rename.to);
        if target.exists() {
            warn!("skipping {} -> {}: target exists", rename.from, rename.to);
            report.conflicts.push(rename);
            continue;
        }

        if !dry_run {
            fs::rename(dir.join(&rename.from), &target)?;
        }
        info!("renamed: {} -> {}", rename.from, rename.to);
        report.renamed.push(rename);
    }

    Ok(report)
}
