use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, info_span, warn};

use crate::config::Paths;
use crate::downloader::{CaptionFetcher, DownloadError};
use crate::filename;
use crate::index::{Index, IndexEntry, IndexError};
use crate::playlist::{self, PlaylistError, VideoEntry};
use crate::resources::{ResourceGate, ResourceSampler, Sleeper};
use crate::video_id;
use crate::vtt;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Playlist(#[from] PlaylistError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A video that is in the spreadsheet but not yet in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub video_id: String,
    pub title: String,
}

/// A video that could not be ingested this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub video_id: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub corrected: usize,
    /// Entries in the index before processing started.
    pub existing: usize,
    pub queued: usize,
    /// Caption filenames added to the index, in processing order.
    pub ingested: Vec<String>,
    pub skipped: Vec<Skipped>,
    pub interrupted: bool,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Re-parse existing caption files before looking for new work.
    pub correct_first: bool,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Process at most this many new videos.
    pub limit: Option<usize>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            correct_first: true,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            limit: None,
        }
    }
}

impl IngestOptions {
    fn next_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let secs = rand::thread_rng()
            .gen_range(self.min_delay.as_secs_f64()..self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Re-parse every indexed caption file still on disk and fix entries whose
/// stored cues differ. The index is saved once, only if something changed.
pub fn correct_index(paths: &Paths) -> Result<usize, IngestError> {
    let _span = info_span!("correct").entered();

    let mut index = Index::load(&paths.index)?;
    let mut corrected = 0;

    for (file, entry) in index.iter_mut() {
        let path = paths.caption_dir.join(file);
        if !path.exists() {
            continue;
        }
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("cannot read {}: {e}", path.display());
                continue;
            }
        };

        let parsed = vtt::parse_strict(&raw);
        if parsed != entry.content {
            debug!("corrected {file}");
            entry.content = parsed;
            corrected += 1;
        }
    }

    if corrected > 0 {
        index.save(&paths.index)?;
        info!("corrected {corrected} entries");
    } else {
        info!("no corrections were necessary");
    }
    Ok(corrected)
}

/// Spreadsheet videos whose ID is not in the index, in spreadsheet order.
///
/// A video listed twice keeps its first title.
pub fn plan(index: &Index, rows: &[VideoEntry]) -> Vec<WorkItem> {
    let known = index.video_ids();
    let mut seen = HashSet::new();
    let mut work = Vec::new();

    for row in rows {
        let Some(url) = row.url.as_deref() else {
            debug!("row without url: {}", row.title);
            continue;
        };
        let Some(id) = video_id::extract(url) else {
            warn!("could not extract video id from {url}");
            continue;
        };
        if known.contains(&id) || !seen.insert(id.clone()) {
            continue;
        }
        work.push(WorkItem {
            video_id: id,
            title: row.clean_title(),
        });
    }

    work
}

/// Drives one ingestion run: correct, load, diff, then fetch new captions one by one.
pub struct Ingestor<'a, S> {
    paths: &'a Paths,
    fetcher: &'a dyn CaptionFetcher,
    gate: ResourceGate<S>,
    sleeper: &'a dyn Sleeper,
    stop: Arc<AtomicBool>,
    options: IngestOptions,
}

impl<'a, S: ResourceSampler> Ingestor<'a, S> {
    pub fn new(
        paths: &'a Paths,
        fetcher: &'a dyn CaptionFetcher,
        gate: ResourceGate<S>,
        sleeper: &'a dyn Sleeper,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            paths,
            fetcher,
            gate,
            sleeper,
            stop,
            options: IngestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn run(&mut self) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();

        if self.options.correct_first {
            report.corrected = correct_index(self.paths)?;
        }

        let mut index = Index::load(&self.paths.index)?;
        let rows = playlist::read_rows(&self.paths.spreadsheet)?;
        report.existing = index.len();
        info!(
            "loaded {} index entries and {} spreadsheet rows",
            index.len(),
            rows.len()
        );

        let mut work = plan(&index, &rows);
        if let Some(limit) = self.options.limit {
            work.truncate(limit);
        }
        report.queued = work.len();
        info!("found {} new videos to process", work.len());

        fs::create_dir_all(&self.paths.caption_dir)?;

        for (n, item) in work.iter().enumerate() {
            let _span = info_span!("video", id = %item.video_id).entered();

            if self.stopped() || !self.gate.wait_until_ready(self.sleeper, &self.stop) {
                self.save_interrupted(&index, &mut report)?;
                break;
            }

            info!("[{}/{}] processing {}", n + 1, work.len(), item.title);
            let url = video_id::watch_url(&item.video_id);
            let fetched = self.fetcher.fetch_captions(&url, &self.paths.caption_dir);

            if self.stopped() {
                if let Ok(temp) = &fetched {
                    discard(temp);
                }
                self.save_interrupted(&index, &mut report)?;
                break;
            }

            match fetched.and_then(|temp| self.store(&mut index, item, &temp)) {
                Ok(file) => {
                    index.save(&self.paths.index)?;
                    info!("saved {file}");
                    report.ingested.push(file);
                }
                Err(e) => {
                    warn!("error processing {} ({}): {e}", item.title, item.video_id);
                    report.skipped.push(Skipped {
                        video_id: item.video_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            if n + 1 < work.len() {
                let delay = self.options.next_delay();
                debug!("waiting {:.2}s before next video", delay.as_secs_f64());
                self.sleeper.sleep(delay);
            }
        }

        info!(
            "ingested {}, skipped {}{}",
            report.ingested.len(),
            report.skipped.len(),
            if report.interrupted { " (interrupted)" } else { "" }
        );
        Ok(report)
    }

    /// Move the fetched track to its final name, parse it, and add it to the index.
    fn store(&self, index: &mut Index, item: &WorkItem, temp: &Path) -> Result<String, DownloadError> {
        if !temp.exists() {
            return Err(DownloadError::MissingOutput(temp.to_path_buf()));
        }

        let name = filename::sanitize(&item.title);
        let file = video_id::caption_filename(&name, &item.video_id);
        let target = self.paths.caption_dir.join(&file);
        debug!("renaming {} to {}", temp.display(), target.display());
        fs::rename(temp, &target)?;

        let raw = fs::read_to_string(&target)?;
        index.insert(
            file.clone(),
            IndexEntry {
                name,
                url: video_id::watch_url(&item.video_id),
                content: vtt::parse_strict(&raw),
            },
        );
        Ok(file)
    }

    fn save_interrupted(&self, index: &Index, report: &mut IngestReport) -> Result<(), IngestError> {
        warn!("interrupted, saving progress");
        index.save(&self.paths.index)?;
        report.interrupted = true;
        Ok(())
    }
}

/// Best-effort removal of a fetched track that will not be stored.
fn discard(temp: &Path) {
    match fs::remove_file(temp) {
        Ok(()) => debug!("removed unused {}", temp.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove {}: {e}", temp.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(title: &str, id: &str) -> VideoEntry {
        VideoEntry::new(title, format!("https://youtu.be/{id}"))
    }

    #[test]
    fn plan_skips_known_duplicate_and_unparseable_rows() {
        let mut index = Index::new();
        index.insert(
            "Old-aaaaaaaaaaa.vtt",
            IndexEntry {
                name: "Old".into(),
                url: video_id::watch_url("aaaaaaaaaaa"),
                content: Vec::new(),
            },
        );
        let rows = vec![
            row("-[x] Old", "aaaaaaaaaaa"),
            row("-[ ] New", "bbbbbbbbbbb"),
            row("New again", "bbbbbbbbbbb"),
            VideoEntry::new("Broken", "https://example.com"),
            VideoEntry::title_only("No url"),
            row("Third", "ccccccccccc"),
        ];

        let work = plan(&index, &rows);

        assert_eq!(
            work,
            vec![
                WorkItem {
                    video_id: "bbbbbbbbbbb".into(),
                    title: "New".into()
                },
                WorkItem {
                    video_id: "ccccccccccc".into(),
                    title: "Third".into()
                },
            ]
        );
    }

    #[test]
    fn delay_stays_in_range() {
        let opts = IngestOptions {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            ..IngestOptions::default()
        };
        for _ in 0..50 {
            let d = opts.next_delay();
            assert!(d >= opts.min_delay && d <= opts.max_delay, "{d:?}");
        }

        let fixed = IngestOptions {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..IngestOptions::default()
        };
        assert_eq!(fixed.next_delay(), Duration::ZERO);
    }

    #[test]
    fn correction_rewrites_only_divergent_entries() {
        let root = tempfile::tempdir().unwrap();
        let paths = Paths::from_root(root.path());
        paths.ensure_dirs().unwrap();

        let good = "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nfine\n";
        let bad = "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nfixed text\n";
        fs::write(paths.caption_dir.join("Good-ggggggggggg.vtt"), good).unwrap();
        fs::write(paths.caption_dir.join("Bad-bbbbbbbbbbb.vtt"), bad).unwrap();

        let mut index = Index::new();
        index.insert(
            "Good-ggggggggggg.vtt",
            IndexEntry {
                name: "Good".into(),
                url: video_id::watch_url("ggggggggggg"),
                content: vtt::parse_strict(good),
            },
        );
        index.insert(
            "Bad-bbbbbbbbbbb.vtt",
            IndexEntry {
                name: "Bad".into(),
                url: video_id::watch_url("bbbbbbbbbbb"),
                content: vec![vtt::CaptionRecord::new("WEBVTT", "")],
            },
        );
        index.insert(
            "Gone-zzzzzzzzzzz.vtt",
            IndexEntry {
                name: "Gone".into(),
                url: video_id::watch_url("zzzzzzzzzzz"),
                content: Vec::new(),
            },
        );
        index.save(&paths.index).unwrap();

        assert_eq!(correct_index(&paths).unwrap(), 1);
        let reloaded = Index::load(&paths.index).unwrap();
        assert_eq!(
            reloaded.get("Bad-bbbbbbbbbbb.vtt").unwrap().content,
            vec![vtt::CaptionRecord::new("00:00:00.000 --> 00:00:01.000", "fixed text")]
        );
        assert!(reloaded.get("Gone-zzzzzzzzzzz.vtt").unwrap().content.is_empty());

        assert_eq!(correct_index(&paths).unwrap(), 0);
    }
}
