// # Watch History
//
// Resume positions for on-demand items, fed by the controller's checkpoint
// callback. The controller itself knows nothing about persistence.

use crate::config::Config;
use crate::models::{ItemKind, PlaybackItem};
use crate::playback::controller::PositionCheckpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Past this share of the duration an item counts as watched
const WATCHED_PERCENT: f64 = 95.0;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchHistoryEntry {
    pub url: String,
    pub name: String,
    pub item_id: Option<String>,
    pub kind: ItemKind,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl WatchHistoryEntry {
    pub fn progress_percent(&self) -> f64 {
        if self.duration_ms > 0 {
            self.position_ms as f64 / self.duration_ms as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Started but not finished
    pub fn has_progress(&self) -> bool {
        self.position_ms > 0 && self.duration_ms > 0 && self.progress_percent() < WATCHED_PERCENT
    }

    /// Item to play again, resuming where it was left when that makes sense
    pub fn resume_item(&self) -> PlaybackItem {
        PlaybackItem {
            id: self.item_id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            resume_position_ms: if self.kind == ItemKind::OnDemand && self.has_progress() {
                Some(self.position_ms)
            } else {
                None
            },
            kind: self.kind,
        }
    }
}

/// Most recent first, one entry per URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchHistory {
    entries: Vec<WatchHistoryEntry>,
    capacity: usize,
}

impl Default for WatchHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl WatchHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn entries(&self) -> &[WatchHistoryEntry] {
        &self.entries
    }

    pub fn get(&self, url: &str) -> Option<&WatchHistoryEntry> {
        self.entries.iter().find(|e| e.url == url)
    }

    /// Record a checkpoint for `item`, moving it to the front
    pub fn record(&mut self, item: &PlaybackItem, checkpoint: &PositionCheckpoint) {
        self.record_at(item, checkpoint, Utc::now());
    }

    fn record_at(
        &mut self,
        item: &PlaybackItem,
        checkpoint: &PositionCheckpoint,
        timestamp: DateTime<Utc>,
    ) {
        self.entries.retain(|e| e.url != item.url);

        // Live streams have no meaningful position
        let (position_ms, duration_ms) = if item.is_live() {
            (0, 0)
        } else {
            (checkpoint.position_ms, checkpoint.duration_ms)
        };

        self.entries.insert(
            0,
            WatchHistoryEntry {
                url: item.url.clone(),
                name: item.name.clone(),
                item_id: item.id.clone(),
                kind: item.kind,
                position_ms,
                duration_ms,
                timestamp,
            },
        );
        self.entries.truncate(self.capacity);
    }

    /// Entries worth offering a resume for
    pub fn continue_watching(&self) -> Vec<&WatchHistoryEntry> {
        self.entries.iter().filter(|e| e.has_progress()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// History at the configured location; empty when none is configured
    pub fn load_configured(config: &Config) -> Result<Self, HistoryError> {
        match &config.history_path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!("Saved {} history entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Checkpoint callback that records into a shared history
    pub fn checkpoint_recorder(
        history: Arc<Mutex<WatchHistory>>,
    ) -> impl FnMut(&PlaybackItem, &PositionCheckpoint) + Send + 'static {
        move |item: &PlaybackItem, checkpoint: &PositionCheckpoint| {
            history
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .record(item, checkpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn checkpoint(position_ms: u64, duration_ms: u64) -> PositionCheckpoint {
        PositionCheckpoint {
            position_ms,
            duration_ms,
        }
    }

    #[test]
    fn test_progress_rules() {
        let mut history = WatchHistory::default();
        let movie = PlaybackItem::on_demand("Movie", "http://example.test/movie.mkv");

        history.record(&movie, &checkpoint(42_000, 120_000));
        let entry = history.get(&movie.url).unwrap();
        assert!(entry.has_progress());
        assert_eq!(entry.resume_item().resume_position_ms, Some(42_000));

        history.record(&movie, &checkpoint(118_000, 120_000));
        let entry = history.get(&movie.url).unwrap();
        assert!(!entry.has_progress(), "98% watched counts as finished");
        assert_eq!(entry.resume_item().resume_position_ms, None);
        assert_eq!(history.entries().len(), 1);
    }

    #[test]
    fn test_live_items_are_not_resumable() {
        let mut history = WatchHistory::default();
        let news = PlaybackItem::live("News", "http://example.test/news.m3u8");
        history.record(&news, &checkpoint(5_000, 0));
        assert!(history.continue_watching().is_empty());
        assert_eq!(history.get(&news.url).unwrap().position_ms, 0);
    }

    #[test]
    fn test_most_recent_first_and_capped() {
        let mut history = WatchHistory::with_capacity(2);
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for n in 0..3 {
            let item = PlaybackItem::on_demand(format!("Ep {}", n), format!("http://example.test/{}", n));
            history.record_at(&item, &checkpoint(1_000, 10_000), base + chrono::Duration::minutes(n));
        }
        let names: Vec<&str> = history.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Ep 2", "Ep 1"]);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("history.json");

        let mut history = WatchHistory::default();
        let movie = PlaybackItem::on_demand("Movie", "http://example.test/movie.mkv").with_id("m1");
        history.record(&movie, &checkpoint(42_000, 120_000));
        history.save(&path).unwrap();

        let loaded = WatchHistory::load(&path).unwrap();
        assert_eq!(loaded.entries(), history.entries());
        assert!(WatchHistory::load(&temp_dir.path().join("missing.json"))
            .unwrap()
            .entries()
            .is_empty());
    }

    #[test]
    fn test_load_configured_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.json");
        let mut history = WatchHistory::default();
        history.record(
            &PlaybackItem::on_demand("Movie", "http://example.test/movie.mkv"),
            &checkpoint(60_000, 600_000),
        );
        history.save(&path).unwrap();

        let mut config = Config::from_lookup(|_| None);
        config.history_path = Some(path);
        assert_eq!(WatchHistory::load_configured(&config).unwrap().entries().len(), 1);

        config.history_path = None;
        assert!(WatchHistory::load_configured(&config).unwrap().entries().is_empty());
    }

    #[test]
    fn test_checkpoint_recorder_writes_shared_history() {
        let history = Arc::new(Mutex::new(WatchHistory::default()));
        let mut recorder = WatchHistory::checkpoint_recorder(history.clone());
        let movie = PlaybackItem::on_demand("Movie", "http://example.test/movie.mkv");
        recorder(&movie, &checkpoint(1_000, 2_000_000));
        assert_eq!(history.lock().unwrap().continue_watching().len(), 1);
    }
}
