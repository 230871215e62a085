use serde::{Deserialize, Serialize};

/// Whether an item has an unbounded duration or can be seeked and finished
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemKind {
    Live,
    OnDemand,
}

/// A playable resource handed to the playback controller
///
/// Immutable for the duration of one playback attempt; reconnects reuse the
/// same item and take the resume offset from the last checkpoint instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackItem {
    /// Playlist identifier (tvg-id or similar), if the playlist provides one
    pub id: Option<String>,
    pub name: String,
    pub url: String,
    /// Where to resume, in milliseconds. Ignored for live items.
    pub resume_position_ms: Option<u64>,
    pub kind: ItemKind,
}

impl PlaybackItem {
    pub fn live(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            url: url.into(),
            resume_position_ms: None,
            kind: ItemKind::Live,
        }
    }

    pub fn on_demand(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            url: url.into(),
            resume_position_ms: None,
            kind: ItemKind::OnDemand,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_resume_position(mut self, position_ms: u64) -> Self {
        self.resume_position_ms = Some(position_ms);
        self
    }

    pub fn is_live(&self) -> bool {
        self.kind == ItemKind::Live
    }

    /// Identity used to tell "same item again" from "different item".
    /// Falls back to the URL when the playlist has no identifier.
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.url)
    }

    /// Resume offset to pass to the engine, never set for live items
    pub fn start_offset_ms(&self) -> Option<u64> {
        if self.is_live() {
            None
        } else {
            self.resume_position_ms.filter(|ms| *ms > 0)
        }
    }
}

/// An audio or subtitle track as enumerated by the engine.
/// Ids `<= 0` mean "disabled".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: i32,
    pub label: String,
}

impl TrackInfo {
    pub fn new(id: i32, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.id <= 0
    }
}
