use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, warn};

use crate::filename::{self, RenameError};
use crate::fsio;
use crate::video_id;
use crate::vtt::{self, CaptionRecord};

const FEATURED: &str = "Featured:";

// ── Error type ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index file is not valid JSON ({path}): {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("caption directory not found: {0}")]
    MissingDir(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<RenameError> for IndexError {
    fn from(e: RenameError) -> Self {
        match e {
            RenameError::MissingDir(dir) => IndexError::MissingDir(dir),
            RenameError::Walk(e) => IndexError::Io(e.into()),
            RenameError::Io(e) => IndexError::Io(e),
        }
    }
}

// ── Public types ────────────────────────────────────────────────────────

/// Captions of one video, stored under its caption filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub url: String,
    pub content: Vec<CaptionRecord>,
}

impl IndexEntry {
    pub fn video_id(&self) -> Option<String> {
        video_id::extract(&self.url)
    }

    /// Entry for a caption file, deriving name and URL from the filename.
    ///
    /// Returns `None` when the filename carries no well-formed identifier.
    pub fn from_caption_file(filename: &str, content: &str) -> Option<Self> {
        let id = video_id::caption_file_id(filename)?;
        Some(Self {
            name: display_name(filename),
            url: video_id::watch_url(&id),
            content: vtt::parse(content),
        })
    }
}

/// A search hit inside one caption cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub file: String,
    pub name: String,
    pub timestamp: String,
    pub text: String,
    /// Watch URL that starts playback at the cue.
    pub link: String,
}

/// Display name for a caption filename: extension and identifier suffix removed,
/// underscores shown as spaces.
pub fn display_name(filename: &str) -> String {
    let stem = video_id::file_stem(filename);
    video_id::strip_from_stem(stem)
        .replace('_', " ")
        .trim()
        .to_string()
}

/// Display ordering: `Featured:` names first, then case-insensitive by name.
pub fn display_order(a_name: &str, b_name: &str) -> Ordering {
    let rank = |name: &str| if name.starts_with(FEATURED) { 0 } else { 1 };
    rank(a_name)
        .cmp(&rank(b_name))
        .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
}

fn deep_link(url: &str, timestamp: &str) -> String {
    match vtt::start_seconds(timestamp) {
        Some(secs) => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}t={secs}")
        }
        None => url.to_string(),
    }
}

// ── Index ───────────────────────────────────────────────────────────────

/// Caption index keyed by filename. Order is applied only when writing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Index {
    entries: HashMap<String, IndexEntry>,
}

struct DisplayOrder<'a>(Vec<(&'a String, &'a IndexEntry)>);

impl Serialize for DisplayOrder<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, entry) in &self.0 {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index from `path`. A missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            debug!("no index at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let data = fs::read_to_string(path)?;
        Self::from_json(&data).map_err(|source| IndexError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        let entries: HashMap<String, IndexEntry> = serde_json::from_str(data)?;
        Ok(Self { entries })
    }

    /// Pretty JSON in display order; `{}` when empty.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&DisplayOrder(self.sorted()))
    }

    /// Write the whole index to `path`, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let json = self.to_json()?;
        fsio::write_atomic(path, json.as_bytes())?;
        Ok(())
    }

    /// Build a fresh index from every caption file in `dir`.
    ///
    /// Files whose name carries no identifier are skipped with a warning.
    pub fn build_from_dir(dir: &Path) -> Result<Self, IndexError> {
        let mut index = Self::new();
        for name in filename::list_caption_files(dir)? {
            let content = fs::read_to_string(dir.join(&name))?;
            match IndexEntry::from_caption_file(&name, &content) {
                Some(entry) => {
                    index.insert(name, entry);
                }
                None => warn!("no valid video id in caption filename, skipping: {name}"),
            }
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, filename: &str) -> Option<&IndexEntry> {
        self.entries.get(filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(filename)
    }

    /// Insert or overwrite an entry, returning the previous one.
    pub fn insert(&mut self, filename: impl Into<String>, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(filename.into(), entry)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut IndexEntry)> {
        self.entries.iter_mut()
    }

    /// Video IDs of all entries whose URL yields one.
    pub fn video_ids(&self) -> HashSet<String> {
        self.entries
            .values()
            .filter_map(IndexEntry::video_id)
            .collect()
    }

    /// Entries in display order; ties on name fall back to filename.
    pub fn sorted(&self) -> Vec<(&String, &IndexEntry)> {
        let mut items: Vec<_> = self.entries.iter().collect();
        items.sort_by(|(ka, a), (kb, b)| display_order(&a.name, &b.name).then_with(|| ka.cmp(kb)));
        items
    }

    /// Case-insensitive substring search over caption text, in display order.
    pub fn search(&self, keyword: &str, limit: Option<usize>) -> Vec<SearchHit> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        self.sorted()
            .into_iter()
            .flat_map(|(file, entry)| {
                let needle = needle.as_str();
                entry
                    .content
                    .iter()
                    .filter(move |rec| rec.text.to_lowercase().contains(needle))
                    .map(move |rec| SearchHit {
                        file: file.clone(),
                        name: entry.name.clone(),
                        timestamp: rec.timestamp.clone(),
                        text: rec.text.clone(),
                        link: deep_link(&entry.url, &rec.timestamp),
                    })
            })
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, id: &str, text: &str) -> IndexEntry {
        IndexEntry {
            name: name.to_string(),
            url: video_id::watch_url(id),
            content: vec![CaptionRecord::new("00:01:05.250 --> 00:01:07.000", text)],
        }
    }

    #[test]
    fn featured_sorts_first_then_case_insensitive() {
        let mut index = Index::new();
        index.insert("z.vtt", entry("Zebra", "zzzzzzzzzzz", ""));
        index.insert("a.vtt", entry("apple", "aaaaaaaaaaa", ""));
        index.insert("f.vtt", entry("Featured: Intro", "fffffffffff", ""));
        index.insert("b.vtt", entry("Banana", "bbbbbbbbbbb", ""));

        let names: Vec<_> = index.sorted().iter().map(|(_, e)| e.name.clone()).collect();
        assert_eq!(names, ["Featured: Intro", "apple", "Banana", "Zebra"]);
    }

    #[test]
    fn featured_then_alphabetical() {
        let mut names = vec!["Zebra", "Featured: Intro", "Apple"];
        names.sort_by(|a, b| display_order(a, b));
        assert_eq!(names, ["Featured: Intro", "Apple", "Zebra"]);
    }

    #[test]
    fn empty_index_serializes_as_empty_object() {
        let index = Index::new();
        assert_eq!(index.to_json().unwrap(), "{}");
        assert_eq!(Index::from_json("{}").unwrap(), index);
    }

    #[test]
    fn json_is_written_in_display_order() {
        let mut index = Index::new();
        index.insert("b-bbbbbbbbbbb.vtt", entry("Beta", "bbbbbbbbbbb", "two"));
        index.insert("a-aaaaaaaaaaa.vtt", entry("Featured: Alpha", "aaaaaaaaaaa", "one"));
        let json = index.to_json().unwrap();

        let alpha = json.find("a-aaaaaaaaaaa.vtt").unwrap();
        let beta = json.find("b-bbbbbbbbbbb.vtt").unwrap();
        assert!(alpha < beta);
        assert!(json.contains("\"timestamp\": \"00:01:05.250 --> 00:01:07.000\""));
        assert_eq!(Index::from_json(&json).unwrap(), index);
    }

    #[test]
    fn load_missing_is_empty_and_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtt_content.json");
        assert!(Index::load(&path).unwrap().is_empty());

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Index::load(&path), Err(IndexError::Corrupt { .. })));
    }

    #[test]
    fn display_name_strips_identifier_suffix() {
        assert_eq!(display_name("My_Title-abc12345678.vtt"), "My Title");
        assert_eq!(display_name("Featured:_Intro-!ab-cd-ef_gh.vtt"), "Featured: Intro");
        assert_eq!(display_name("Two-Part_Title-abc12345678.vtt"), "Two-Part Title");
    }

    #[test]
    fn built_entry_round_trips_identifier() {
        let file = "My_Title-abc12345678.vtt";
        let built = IndexEntry::from_caption_file(file, "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nhi\n")
            .unwrap();
        assert_eq!(video_id::from_filename(file).as_deref(), Some("abc12345678"));
        assert_eq!(built.video_id().as_deref(), Some("abc12345678"));
        assert_eq!(built.name, "My Title");
        assert_eq!(built.content, vec![CaptionRecord::new("00:00:00.000 --> 00:00:01.000", "hi")]);
    }

    #[test]
    fn build_from_dir_indexes_every_caption_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Zebra_Facts-zzzzzzzzzzz.vtt"),
            "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nstripes\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("Featured:_Intro-!ab-cd-ef_gh.vtt"),
            "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nwelcome\n",
        )
        .unwrap();
        fs::write(dir.path().join("noid.vtt"), "WEBVTT\n").unwrap();
        fs::write(dir.path().join("readme.md"), "x").unwrap();

        let index = Index::build_from_dir(dir.path()).unwrap();

        assert_eq!(index.len(), 2);
        let featured = index.get("Featured:_Intro-!ab-cd-ef_gh.vtt").unwrap();
        assert_eq!(featured.url, "https://www.youtube.com/watch?v=ab-cd-ef_gh");
        assert_eq!(index.sorted()[0].1.name, "Featured: Intro");
        assert_eq!(
            index.video_ids(),
            ["zzzzzzzzzzz".to_string(), "ab-cd-ef_gh".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn build_from_dir_skips_malformed_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let track = "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nhi\n";
        fs::write(dir.path().join("Part-2.vtt"), track).unwrap();
        fs::write(dir.path().join("Long-abc123456789.vtt"), track).unwrap();
        fs::write(dir.path().join("Good-abc12345678.vtt"), track).unwrap();

        let index = Index::build_from_dir(dir.path()).unwrap();

        assert_eq!(index.len(), 1);
        assert!(!index.contains("Part-2.vtt"));
        assert!(IndexEntry::from_caption_file("Part-2.vtt", track).is_none());
        for (_, entry) in index.sorted() {
            let id = entry.video_id().expect("every stored url yields an id");
            assert_eq!(entry.url, video_id::watch_url(&id));
        }
    }

    #[test]
    fn build_from_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Index::build_from_dir(&dir.path().join("nope")),
            Err(IndexError::MissingDir(_))
        ));
    }

    #[test]
    fn search_finds_cues_with_deep_links() {
        let mut index = Index::new();
        index.insert("x-xxxxxxxxxxx.vtt", entry("Cooking", "xxxxxxxxxxx", "Add the Garlic now"));
        index.insert("y-yyyyyyyyyyy.vtt", entry("Baking", "yyyyyyyyyyy", "no match here"));

        let hits = index.search("garlic", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Cooking");
        assert_eq!(hits[0].link, "https://www.youtube.com/watch?v=xxxxxxxxxxx&t=65");
        assert!(index.search("   ", None).is_empty());
        assert_eq!(index.search("e", Some(1)).len(), 1);
    }
}
