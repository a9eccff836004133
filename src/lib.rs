//! Maintains a searchable catalog of YouTube caption tracks: a spreadsheet of
//! known videos, a directory of `.vtt` files, and a JSON index built from them.

pub mod config;
pub mod downloader;
pub mod export;
pub mod filename;
pub mod fsio;
pub mod index;
pub mod ingest;
pub mod playlist;
pub mod resources;
pub mod video_id;
pub mod vtt;
