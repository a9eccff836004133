use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use transcript_catalog::config::Paths;
use transcript_catalog::downloader::YtDlp;
use transcript_catalog::index::Index;
use transcript_catalog::ingest::{self, IngestOptions, Ingestor};
use transcript_catalog::resources::{GateLimits, ResourceGate, SystemSampler, ThreadSleeper};
use transcript_catalog::{export, filename, playlist};

#[derive(Parser)]
#[command(name = "tcat", about = "Download, index, search and list YouTube caption tracks")]
struct Cli {
    /// debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root holding vtt/ and data/
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Caption directory (default: <root>/vtt)
    #[arg(long, global = true)]
    captions: Option<PathBuf>,

    /// Video list CSV (default: <root>/data/total_video_list.csv)
    #[arg(long, global = true)]
    spreadsheet: Option<PathBuf>,

    /// Caption index JSON (default: <root>/data/vtt_content.json)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download captions for spreadsheet videos missing from the index
    Ingest {
        /// Skip re-parsing existing caption files first
        #[arg(long)]
        skip_correction: bool,
        /// Process at most this many new videos
        #[arg(short, long)]
        limit: Option<usize>,
        /// Minimum pause between videos, in seconds
        #[arg(long, default_value = "1", value_parser = parse_secs)]
        min_delay: Duration,
        /// Maximum pause between videos, in seconds
        #[arg(long, default_value = "10", value_parser = parse_secs)]
        max_delay: Duration,
        /// Wait while CPU usage is above this percentage
        #[arg(long, default_value = "50")]
        max_cpu: f32,
        /// Wait while memory usage is above this percentage
        #[arg(long, default_value = "90")]
        max_memory: f32,
        /// Seconds between resource checks while waiting
        #[arg(long, default_value = "5", value_parser = parse_secs)]
        poll: Duration,
        /// yt-dlp executable
        #[arg(long, default_value = "yt-dlp")]
        yt_dlp: String,
    },

    /// Re-parse caption files and fix index entries that drifted
    Correct,

    /// Rebuild the whole index from the caption directory
    Rebuild,

    /// Dedup the spreadsheet and checkmark videos that have captions
    Check {
        /// Report only, leave the spreadsheet untouched
        #[arg(long)]
        dry_run: bool,
    },

    /// Report duplicate rows and spreadsheet/caption mismatches
    Audit,

    /// Generate the HTML video list
    Html {
        /// Output path (default: <root>/data/videos.html)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Normalize caption filenames by splitting run-together words
    Rename {
        /// Show what would change without renaming
        #[arg(long)]
        dry_run: bool,
    },

    /// Search caption text
    Search {
        /// Search query
        query: String,
        /// Number of results
        #[arg(short, long, default_value = "20")]
        n: usize,
    },
}

fn parse_secs(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{e}"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::from_root(&cli.root)
        .with_caption_dir(cli.captions)
        .with_spreadsheet(cli.spreadsheet)
        .with_index(cli.index);

    match cli.command {
        Command::Ingest {
            skip_correction,
            limit,
            min_delay,
            max_delay,
            max_cpu,
            max_memory,
            poll,
            yt_dlp,
        } => {
            let ytdlp = YtDlp::new(yt_dlp);
            ytdlp.check_available()?;
            paths.ensure_dirs().context("creating project directories")?;

            let stop = Arc::new(AtomicBool::new(false));
            let handler_stop = Arc::clone(&stop);
            ctrlc::set_handler(move || {
                warn!("interrupt received, stopping after saving progress");
                handler_stop.store(true, Ordering::SeqCst);
            })
            .context("installing Ctrl-C handler")?;

            let sleeper = ThreadSleeper::new(Arc::clone(&stop));
            let gate = ResourceGate::new(
                SystemSampler::new(),
                GateLimits {
                    max_cpu_percent: max_cpu,
                    max_memory_percent: max_memory,
                    poll_interval: poll,
                },
            );
            let options = IngestOptions {
                correct_first: !skip_correction,
                min_delay,
                max_delay,
                limit,
            };

            let report = Ingestor::new(&paths, &ytdlp, gate, &sleeper, stop)
                .with_options(options)
                .run()?;

            println!(
                "corrected {}, already indexed {}, queued {}, ingested {}, skipped {}",
                report.corrected,
                report.existing,
                report.queued,
                report.ingested.len(),
                report.skipped.len()
            );
            for skipped in &report.skipped {
                println!("  skipped {}: {}", skipped.video_id, skipped.reason);
            }
            if report.interrupted {
                println!("interrupted; progress saved to {}", paths.index.display());
            }
        }

        Command::Correct => {
            let n = ingest::correct_index(&paths)?;
            println!("corrected {n} entries");
        }

        Command::Rebuild => {
            let index = Index::build_from_dir(&paths.caption_dir)?;
            if index.is_empty() {
                warn!("no .vtt files found in {}", paths.caption_dir.display());
                return Ok(());
            }
            index.save(&paths.index)?;
            println!(
                "index rebuilt with {} files: {}",
                index.len(),
                paths.index.display()
            );
        }

        Command::Check { dry_run } => {
            if !paths.index.exists() {
                bail!("index not found: {}", paths.index.display());
            }
            let index = Index::load(&paths.index)?;
            let rows = playlist::read_rows(&paths.spreadsheet)?;
            info!("loaded {} index entries", index.len());

            let result = playlist::reconcile(&rows, &index.video_ids());
            println!("removed {} duplicate entries", result.duplicates_removed);
            println!(
                "{} unique rows, {} with captions",
                result.total(),
                result.checked
            );
            println!("{}", playlist::progress_bar(result.completion_percentage()));

            if dry_run {
                info!("dry run, spreadsheet not written");
            } else {
                playlist::write_rows(&paths.spreadsheet, &result.rows)?;
                info!("wrote {}", paths.spreadsheet.display());
            }
        }

        Command::Audit => {
            let rows = playlist::read_rows(&paths.spreadsheet)?;
            let files = filename::list_caption_files(&paths.caption_dir)?;
            let report = playlist::audit(&rows, &files);

            println!(
                "{} rows, {} duplicate rows, {} without captions, {} caption files not in spreadsheet",
                report.total_rows,
                report.duplicate_rows(),
                report.missing_captions.len(),
                report.orphan_files.len()
            );
            if report.is_consistent() {
                println!("spreadsheet and caption files agree");
            } else {
                println!("{}", export::audit_table(&report));
            }
        }

        Command::Html { output } => {
            let rows = playlist::read_rows(&paths.spreadsheet)?;
            let out = paths.clone().with_html(output).html;
            let count = export::write_html(&out, &rows)?;
            println!("generated {count} video entries in {}", out.display());
        }

        Command::Rename { dry_run } => {
            let report = filename::rename_caption_files(&paths.caption_dir, dry_run)?;
            println!(
                "{} {}, {} unchanged, {} conflicts",
                if dry_run { "would rename" } else { "renamed" },
                report.renamed.len(),
                report.unchanged,
                report.conflicts.len()
            );
            if !dry_run && !report.renamed.is_empty() {
                info!("run `tcat rebuild` to refresh index keys");
            }
        }

        Command::Search { query, n } => {
            if !paths.index.exists() {
                bail!("index not found: {}", paths.index.display());
            }
            let index = Index::load(&paths.index)?;
            let hits = index.search(&query, Some(n));
            if hits.is_empty() {
                println!("no results found");
            } else {
                println!("{}", export::search_table(&hits));
                println!("{} result(s)", hits.len());
            }
        }
    }

    Ok(())
}
