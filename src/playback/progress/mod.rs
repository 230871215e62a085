pub mod handle;

use crate::models::PlaybackItem;
use crate::playback::controller::{ConnectionState, PositionCheckpoint};
use crate::playback::error::PlaybackError;
use crate::playback::surface::Surface;
use crate::playback::tracks::TrackState;
pub use handle::PlaybackProgressHandle;
use std::time::Duration;

/// Observations published by the playback controller
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackProgress {
    StateChanged {
        state: ConnectionState,
        status: String,
    },
    ItemStarted {
        item: PlaybackItem,
    },
    /// `fraction` is absent while the user is dragging the seek bar
    PositionUpdate {
        checkpoint: PositionCheckpoint,
        fraction: Option<f32>,
    },
    TracksChanged {
        tracks: TrackState,
    },
    ReconnectScheduled {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    ReconnectCancelled {
        attempt: u32,
    },
    SurfaceChanged {
        attached: Option<Surface>,
    },
    ItemFinished {
        item: PlaybackItem,
    },
    Error {
        error: PlaybackError,
    },
}
