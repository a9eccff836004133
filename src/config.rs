use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

pub const CAPTION_DIR: &str = "vtt";
pub const DATA_DIR: &str = "data";
pub const SPREADSHEET_FILE: &str = "total_video_list.csv";
pub const INDEX_FILE: &str = "vtt_content.json";
pub const HTML_FILE: &str = "videos.html";

/// Resolved locations of everything the tool reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub caption_dir: PathBuf,
    pub spreadsheet: PathBuf,
    pub index: PathBuf,
    pub html: PathBuf,
}

impl Paths {
    /// Default project layout under `root`: `vtt/` for captions, `data/` for the rest.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let data = root.join(DATA_DIR);
        Self {
            caption_dir: root.join(CAPTION_DIR),
            spreadsheet: data.join(SPREADSHEET_FILE),
            index: data.join(INDEX_FILE),
            html: data.join(HTML_FILE),
        }
    }

    pub fn with_caption_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.caption_dir = dir;
        }
        self
    }

    pub fn with_spreadsheet(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.spreadsheet = path;
        }
        self
    }

    pub fn with_index(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.index = path;
        }
        self
    }

    pub fn with_html(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.html = path;
        }
        self
    }

    /// Create the caption directory and the parent of the index if missing.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        let index_dir = self.index.parent().filter(|p| !p.as_os_str().is_empty());
        for dir in std::iter::once(self.caption_dir.as_path()).chain(index_dir) {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
                info!("created directory: {}", dir.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let paths = Paths::from_root("/srv/site");
        assert_eq!(paths.caption_dir, Path::new("/srv/site/vtt"));
        assert_eq!(paths.spreadsheet, Path::new("/srv/site/data/total_video_list.csv"));
        assert_eq!(paths.index, Path::new("/srv/site/data/vtt_content.json"));
        assert_eq!(paths.html, Path::new("/srv/site/data/videos.html"));
    }

    #[test]
    fn overrides_replace_single_paths() {
        let paths = Paths::from_root(".")
            .with_index(Some(PathBuf::from("out/index.json")))
            .with_caption_dir(None);
        assert_eq!(paths.index, Path::new("out/index.json"));
        assert_eq!(paths.caption_dir, Path::new("./vtt"));
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let root = tempfile::tempdir().unwrap();
        let paths = Paths::from_root(root.path());
        paths.ensure_dirs().unwrap();
        assert!(paths.caption_dir.is_dir());
        assert!(root.path().join("data").is_dir());
    }
}
