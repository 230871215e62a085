// # Engine Contract
//
// The native media engine is an external collaborator. The controller drives
// it through `MediaEngine`; the surface coordinator only ever sees the
// `VideoOutput` supertrait, so it can move video output around but can never
// create or destroy a session.
//
// Engine callbacks fire on native threads. They are pushed through an
// `EventSink` that tags every event with the session it belongs to, and the
// owner task drops anything tagged with a superseded session.

use crate::models::TrackInfo;
use crate::playback::error::EngineInitError;
use crate::playback::surface::Surface;
use std::fmt;
use tokio::sync::mpsc;
use tracing::trace;

/// Identity of one decode/render session, unique per controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Ownership token for one live session.
///
/// Not `Clone`: the controller holds the only one, and destroying the session
/// consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHandle {
    id: SessionId,
}

impl SessionHandle {
    pub fn new(id: SessionId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// Asynchronous engine notifications
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Playing,
    Paused,
    Stopped,
    PositionChanged { fraction: f32, time_ms: u64 },
    LengthChanged { length_ms: i64 },
    TracksChanged,
    EncounteredError { message: String },
    EndReached,
}

/// Engine event tagged with its originating session
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub session: SessionId,
    pub event: EngineEvent,
}

/// Thread-safe sender handed to the engine for one session
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Queue an event for the owner task. Safe to call from any thread.
    pub fn emit(&self, event: EngineEvent) {
        if self
            .tx
            .send(TaggedEvent {
                session: self.session,
                event,
            })
            .is_err()
        {
            trace!("Event sink for {} closed, dropping event", self.session);
        }
    }
}

/// Everything the engine needs to create a session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub session_id: SessionId,
    pub url: String,
    /// Applied only for on-demand items; the controller never sets it for live ones
    pub start_offset_ms: Option<u64>,
    pub network_caching_ms: u32,
    pub events: EventSink,
}

/// Video output routing. Attach and detach never suspend.
pub trait VideoOutput {
    fn attach_surface(&mut self, session: &SessionHandle, surface: Surface);
    fn detach_surface(&mut self, session: &SessionHandle, surface: Surface);
}

/// Native decode/render engine
pub trait MediaEngine: VideoOutput + Send {
    fn create_session(&mut self, request: SessionRequest) -> Result<SessionHandle, EngineInitError>;
    fn destroy_session(&mut self, session: SessionHandle);

    fn play(&mut self, session: &SessionHandle);
    fn pause(&mut self, session: &SessionHandle);
    fn stop(&mut self, session: &SessionHandle);
    /// `fraction` is in `0.0..=1.0`
    fn seek(&mut self, session: &SessionHandle, fraction: f32);
    /// `volume` is in `0..=100`
    fn set_volume(&mut self, session: &SessionHandle, volume: u8);
    fn set_muted(&mut self, session: &SessionHandle, muted: bool);

    fn set_audio_track(&mut self, session: &SessionHandle, id: i32);
    fn set_subtitle_track(&mut self, session: &SessionHandle, id: i32);
    fn audio_tracks(&self, session: &SessionHandle) -> Vec<TrackInfo>;
    fn subtitle_tracks(&self, session: &SessionHandle) -> Vec<TrackInfo>;
    fn current_audio_track(&self, session: &SessionHandle) -> i32;
    fn current_subtitle_track(&self, session: &SessionHandle) -> i32;
}
