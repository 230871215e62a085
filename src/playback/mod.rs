pub mod continuity;
pub mod controller;
pub mod engine;
pub mod error;
pub mod progress;
pub mod reconnect;
pub mod service;
pub mod surface;
pub mod tracks;

pub use continuity::{EpisodeEntry, EpisodeIndex, EpisodeResolver};
pub use controller::{
    CheckpointSink, ConnectionState, PlaybackController, PlaybackSnapshot, PositionCheckpoint,
};
pub use engine::{
    EngineEvent, EventSink, MediaEngine, SessionHandle, SessionId, SessionRequest, TaggedEvent,
    VideoOutput,
};
pub use error::{EngineInitError, HandoffError, PlaybackError, ServiceError};
pub use progress::PlaybackProgress;
pub use reconnect::ReconnectPolicy;
pub use service::{PlaybackHandle, PlaybackHooks, PlaybackService};
pub use surface::{HandoffMode, Surface};
pub use tracks::{TrackState, DISABLED_TRACK};
