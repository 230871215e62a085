// # Playback Controller
//
// Owns the single decode/render session and the connection state machine.
// Every method runs on the owner task; engine callbacks reach it through the
// tagged event queue and reconnect timers through `ReconnectDue`.
//
// Invariants:
// - at most one `SessionHandle` exists, and the previous one is destroyed
//   before a new one is created
// - events tagged with anything but the live session are discarded
// - `play` and `stop` cancel the pending reconnect before doing anything else
// - the checkpoint survives reconnects and surface changes, and is reset only
//   when a different item starts

use crate::config::Config;
use crate::models::PlaybackItem;
use crate::playback::continuity::EpisodeResolver;
use crate::playback::engine::{
    EngineEvent, EventSink, MediaEngine, SessionHandle, SessionId, SessionRequest, TaggedEvent,
};
use crate::playback::error::{HandoffError, PlaybackError};
use crate::playback::progress::PlaybackProgress;
use crate::playback::reconnect::{ReconnectDue, ReconnectPolicy, ReconnectScheduler};
use crate::playback::surface::{HandoffMode, Surface, SurfaceCoordinator};
use crate::playback::tracks::{AudioFix, TrackState, DISABLED_TRACK};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Loading,
    Playing,
    Paused,
    Reconnecting,
    Stopped,
    Failed,
}

impl ConnectionState {
    /// A session is expected to be producing output
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Loading | ConnectionState::Playing | ConnectionState::Paused
        )
    }
}

/// Last known position of the current item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCheckpoint {
    pub position_ms: u64,
    pub duration_ms: u64,
}

/// Called with the current item and checkpoint on every position tick, on
/// graceful stop and on natural end
pub type CheckpointSink = Box<dyn FnMut(&PlaybackItem, &PositionCheckpoint) + Send>;

/// Everything the UI needs to render the player at once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub state: ConnectionState,
    pub status: String,
    pub item: Option<PlaybackItem>,
    pub checkpoint: PositionCheckpoint,
    pub reconnect_attempt: u32,
    pub max_reconnect_attempts: u32,
    pub tracks: TrackState,
    pub attached_surface: Option<Surface>,
    pub volume: u8,
    pub muted: bool,
}

pub struct PlaybackController {
    engine: Box<dyn MediaEngine>,
    session: Option<SessionHandle>,
    next_session_id: u64,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    progress_tx: mpsc::UnboundedSender<PlaybackProgress>,
    reconnect: ReconnectScheduler,
    policy: ReconnectPolicy,
    surfaces: SurfaceCoordinator,
    handoff_mode: HandoffMode,
    resolver: Option<Box<dyn EpisodeResolver>>,
    checkpoint_sink: Option<CheckpointSink>,

    state: ConnectionState,
    status: String,
    item: Option<PlaybackItem>,
    checkpoint: PositionCheckpoint,
    tracks: TrackState,
    reconnect_attempt: u32,
    user_stopped: bool,
    seeking: bool,
    volume: u8,
    muted: bool,
    network_caching_ms: u32,
}

impl PlaybackController {
    pub fn new(
        engine: Box<dyn MediaEngine>,
        config: &Config,
        events_tx: mpsc::UnboundedSender<TaggedEvent>,
        due_tx: mpsc::UnboundedSender<ReconnectDue>,
        progress_tx: mpsc::UnboundedSender<PlaybackProgress>,
    ) -> Self {
        Self {
            engine,
            session: None,
            next_session_id: 1,
            events_tx,
            progress_tx,
            reconnect: ReconnectScheduler::new(due_tx),
            policy: ReconnectPolicy::with_max_attempts(config.player.max_reconnect_attempts),
            surfaces: SurfaceCoordinator::new(),
            handoff_mode: config.handoff_mode,
            resolver: None,
            checkpoint_sink: None,
            state: ConnectionState::Idle,
            status: "Ready".to_string(),
            item: None,
            checkpoint: PositionCheckpoint::default(),
            tracks: TrackState::default(),
            reconnect_attempt: 0,
            user_stopped: false,
            seeking: false,
            volume: config.player.volume.min(100),
            muted: config.player.muted,
            network_caching_ms: config.network_caching_ms,
        }
    }

    pub fn set_resolver(&mut self, resolver: Box<dyn EpisodeResolver>) {
        self.resolver = Some(resolver);
    }

    pub fn set_checkpoint_sink(&mut self, sink: CheckpointSink) {
        self.checkpoint_sink = Some(sink);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn checkpoint(&self) -> PositionCheckpoint {
        self.checkpoint
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id())
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            status: self.status.clone(),
            item: self.item.clone(),
            checkpoint: self.checkpoint,
            reconnect_attempt: self.reconnect_attempt,
            max_reconnect_attempts: self.policy.max_attempts,
            tracks: self.tracks.clone(),
            attached_surface: self.surfaces.attached(),
            volume: self.volume,
            muted: self.muted,
        }
    }

    // ========== Commands ==========

    pub fn play(&mut self, item: PlaybackItem) {
        self.cancel_pending_reconnect();

        let same_item = self.item.as_ref().is_some_and(|c| c.key() == item.key());
        if !same_item {
            // Seeded from the requested start so a failure before the first
            // position update still resumes there
            self.checkpoint = PositionCheckpoint {
                position_ms: item.start_offset_ms().unwrap_or(0),
                duration_ms: 0,
            };
            self.tracks = TrackState::default();
        }
        self.user_stopped = false;
        self.seeking = false;
        self.reconnect_attempt = 0;

        info!("Playing item: {} ({})", item.name, item.url);
        let start_offset_ms = item.start_offset_ms();
        self.item = Some(item.clone());
        self.emit(PlaybackProgress::ItemStarted { item });
        self.start_session(start_offset_ms);
    }

    pub fn pause(&mut self) {
        if self.state != ConnectionState::Playing {
            debug!("Ignoring pause in state {:?}", self.state);
            return;
        }
        if let Some(session) = &self.session {
            self.engine.pause(session);
        }
    }

    pub fn resume(&mut self) {
        if self.state != ConnectionState::Paused {
            debug!("Ignoring resume in state {:?}", self.state);
            return;
        }
        if let Some(session) = &self.session {
            self.engine.play(session);
        }
    }

    pub fn toggle_play_pause(&mut self) {
        match self.state {
            ConnectionState::Playing => self.pause(),
            ConnectionState::Paused => self.resume(),
            _ => {}
        }
    }

    pub fn stop(&mut self) {
        let had_item = self.state.is_active() || self.state == ConnectionState::Reconnecting;
        self.cancel_pending_reconnect();
        self.user_stopped = true;
        self.seeking = false;

        if let Some(session) = &self.session {
            self.engine.stop(session);
        }
        if had_item {
            self.notify_checkpoint();
        }
        self.set_state(ConnectionState::Stopped, "Stopped".to_string());
    }

    /// Start dragging the seek bar: position fractions stop flowing to the UI
    pub fn begin_seek(&mut self) {
        self.seeking = true;
    }

    pub fn seek(&mut self, fraction: f32) {
        self.seeking = false;

        if self.item.as_ref().is_some_and(|i| i.is_live()) {
            debug!("Ignoring seek on live item");
            return;
        }
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if let Some(session) = &self.session {
            self.engine.seek(session, fraction);
        }
    }

    pub fn set_volume(&mut self, level: u8) {
        self.volume = level.min(100);
        if let Some(session) = &self.session {
            self.engine.set_volume(session, self.volume);
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if let Some(session) = &self.session {
            self.engine.set_muted(session, muted);
        }
    }

    pub fn toggle_mute(&mut self) {
        self.set_muted(!self.muted);
    }

    /// Apply now if the engine already lists the track, otherwise remember it
    /// for the next enumeration. An id <= 0 turns audio off and keeps it off
    /// across re-enumerations and reconnects.
    pub fn select_audio_track(&mut self, id: i32) {
        if id <= 0 {
            self.tracks.disable_audio();
            if let Some(session) = &self.session {
                self.engine.set_audio_track(session, DISABLED_TRACK);
                self.emit_tracks();
            }
            return;
        }

        self.tracks.audio_disabled_by_user = false;
        match &self.session {
            Some(session) if self.tracks.has_audio(id) => {
                self.engine.set_audio_track(session, id);
                self.tracks.pending_audio = None;
                self.tracks.selected_audio = Some(id);
                self.emit_tracks();
            }
            _ => {
                debug!("Audio track {} not enumerated yet, keeping it pending", id);
                self.tracks.pending_audio = Some(id);
            }
        }
    }

    pub fn select_subtitle_track(&mut self, id: i32) {
        if let Some(session) = &self.session {
            self.engine.set_subtitle_track(session, id);
            self.tracks.selected_subtitle = Some(id);
            self.emit_tracks();
        }
    }

    pub fn cancel_reconnect(&mut self) {
        if self.state != ConnectionState::Reconnecting {
            return;
        }
        self.cancel_pending_reconnect();
        self.user_stopped = true;
        self.set_state(ConnectionState::Stopped, "Reconnection cancelled".to_string());
    }

    /// Takes effect from the next failure on
    pub fn set_max_reconnect_attempts(&mut self, max_attempts: u32) {
        info!("Max reconnect attempts set to {}", max_attempts);
        self.policy.max_attempts = max_attempts;
    }

    // ========== Surfaces ==========

    pub fn surface_realized(&mut self, surface: Surface) {
        let before = self.surfaces.attached();
        self.surfaces
            .surface_realized(surface, self.engine.as_mut(), self.session.as_ref());
        self.emit_surface_if_changed(before);
    }

    /// Move video away from `surface` before the caller destroys it
    pub fn surface_closing(&mut self, surface: Surface) {
        let before = self.surfaces.attached();
        self.surfaces
            .surface_closing(surface, self.engine.as_mut(), self.session.as_ref());
        self.emit_surface_if_changed(before);
    }

    /// Move playback from `from` to `to` using the configured mode
    pub fn handoff(&mut self, from: Surface, to: Surface) -> Result<(), HandoffError> {
        let before = self.surfaces.attached();

        match self.handoff_mode {
            HandoffMode::Transfer => {
                self.surfaces
                    .handoff(self.engine.as_mut(), self.session.as_ref(), from, to)?;
            }
            HandoffMode::Recreate => self.recreate_on(from, to)?,
        }

        self.emit_surface_if_changed(before);
        Ok(())
    }

    fn recreate_on(&mut self, from: Surface, to: Surface) -> Result<(), HandoffError> {
        if from == to {
            return Err(HandoffError::SameSurface);
        }
        if self.surfaces.target() != from {
            return Err(HandoffError::NotAttached(from));
        }
        self.surfaces.retarget(to)?;

        if self.session.is_none() || !self.state.is_active() {
            return Ok(());
        }

        info!("Recreating session on {:?} at {:?}", to, self.checkpoint);
        let start_offset_ms = self.resume_offset();
        self.start_session(start_offset_ms);
        Ok(())
    }

    // ========== Engine events ==========

    pub fn handle_engine_event(&mut self, tagged: TaggedEvent) {
        if self.session_id() != Some(tagged.session) {
            trace!("Discarding {:?} from stale {}", tagged.event, tagged.session);
            return;
        }

        match tagged.event {
            EngineEvent::Playing => self.on_playing(),
            EngineEvent::Paused => {
                if self.state == ConnectionState::Playing {
                    self.set_state(ConnectionState::Paused, "Paused".to_string());
                }
            }
            EngineEvent::Stopped => self.on_stopped(),
            EngineEvent::PositionChanged { fraction, time_ms } => {
                self.on_position(fraction, time_ms)
            }
            EngineEvent::LengthChanged { length_ms } => {
                self.checkpoint.duration_ms = length_ms.max(0) as u64;
            }
            EngineEvent::TracksChanged => self.on_tracks_changed(),
            EngineEvent::EncounteredError { message } => {
                self.on_stream_failure(PlaybackError::Stream { message })
            }
            EngineEvent::EndReached => self.on_end_reached(),
        }
    }

    fn on_playing(&mut self) {
        if self.user_stopped {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };

        // Some engines reset audio state per session
        self.engine.set_volume(session, self.volume);
        self.engine.set_muted(session, self.muted);

        if self.reconnect_attempt > 0 {
            info!("Reconnected after {} attempt(s)", self.reconnect_attempt);
        }
        self.reconnect_attempt = 0;

        let name = self.item_name();
        self.set_state(ConnectionState::Playing, format!("Playing: {}", name));
    }

    fn on_stopped(&mut self) {
        if self.user_stopped {
            self.set_state(ConnectionState::Stopped, "Stopped".to_string());
        } else if self.state.is_active() {
            self.on_stream_failure(PlaybackError::Stream {
                message: "Playback stopped unexpectedly".to_string(),
            });
        }
    }

    fn on_position(&mut self, fraction: f32, time_ms: u64) {
        self.checkpoint.position_ms = time_ms;
        let fraction = if self.seeking { None } else { Some(fraction) };
        self.emit(PlaybackProgress::PositionUpdate {
            checkpoint: self.checkpoint,
            fraction,
        });
        self.notify_checkpoint();
    }

    fn on_tracks_changed(&mut self) {
        let Some(session) = &self.session else {
            return;
        };

        let audio = self.engine.audio_tracks(session);
        let subtitles = self.engine.subtitle_tracks(session);
        let current_audio = self.engine.current_audio_track(session);
        let current_subtitle = self.engine.current_subtitle_track(session);

        match self
            .tracks
            .refresh(audio, subtitles, current_audio, current_subtitle)
        {
            Some(AudioFix::ApplyPending(id)) => {
                debug!("Applying selected audio track {}", id);
                self.engine.set_audio_track(session, id);
            }
            Some(AudioFix::AutoSelect(id)) => {
                info!("Engine selected no audio track, switching to track {}", id);
                self.engine.set_audio_track(session, id);
            }
            None => {}
        }
        self.emit_tracks();
    }

    fn on_end_reached(&mut self) {
        if self.user_stopped || !self.state.is_active() {
            return;
        }
        let Some(item) = self.item.clone() else {
            return;
        };

        if item.is_live() {
            self.on_stream_failure(PlaybackError::UnexpectedEnd);
            return;
        }

        self.notify_checkpoint();
        self.set_state(ConnectionState::Stopped, format!("Finished: {}", item.name));
        self.emit(PlaybackProgress::ItemFinished { item: item.clone() });

        let next = self.resolver.as_ref().and_then(|r| r.next_after(&item));
        if let Some(next) = next {
            info!("Continuing with next episode: {}", next.name);
            self.play(next);
        }
    }

    /// Mid-playback failure: schedule a retry, or give up at the cap
    fn on_stream_failure(&mut self, failure: PlaybackError) {
        if self.user_stopped {
            self.set_state(ConnectionState::Stopped, "Stopped".to_string());
            return;
        }
        if !self.state.is_active() {
            trace!("Ignoring {} in state {:?}", failure, self.state);
            return;
        }

        let has_url = self.item.as_ref().is_some_and(|i| !i.url.is_empty());
        if !has_url {
            self.fail(failure);
            return;
        }

        warn!("{}", failure);
        self.reconnect_attempt += 1;
        let attempt = self.reconnect_attempt;

        if !self.policy.allows(attempt) {
            self.fail(PlaybackError::ReconnectExhausted {
                attempts: attempt.saturating_sub(1),
            });
            return;
        }

        // The old handle may already be invalid; resume comes from the checkpoint
        self.tracks.carry_selection_forward();
        self.destroy_session();

        let delay = self.policy.delay_for(attempt);
        self.reconnect.schedule(attempt, delay);
        self.emit(PlaybackProgress::ReconnectScheduled {
            attempt,
            max_attempts: self.policy.max_attempts,
            delay,
        });
        self.set_state(
            ConnectionState::Reconnecting,
            format!(
                "Reconnecting in {}s (attempt {}/{})...",
                delay.as_secs(),
                attempt,
                self.policy.max_attempts
            ),
        );
    }

    pub fn handle_reconnect_due(&mut self, due: ReconnectDue) {
        let Some(attempt) = self.reconnect.take_due(due) else {
            return;
        };
        if self.state != ConnectionState::Reconnecting {
            debug!("Reconnect attempt {} due in state {:?}, skipping", attempt, self.state);
            return;
        }

        info!("Reconnect attempt {}/{}", attempt, self.policy.max_attempts);
        let start_offset_ms = self.resume_offset();
        self.start_session(start_offset_ms);
    }

    /// Tear down for good
    pub fn shutdown(&mut self) {
        self.cancel_pending_reconnect();
        self.destroy_session();
    }

    // ========== Internals ==========

    fn start_session(&mut self, start_offset_ms: Option<u64>) {
        self.tracks.carry_selection_forward();
        self.destroy_session();

        let Some(item) = self.item.clone() else {
            return;
        };

        let session_id = SessionId(self.next_session_id);
        self.next_session_id += 1;

        let request = SessionRequest {
            session_id,
            url: item.url.clone(),
            start_offset_ms,
            network_caching_ms: self.network_caching_ms,
            events: EventSink::new(session_id, self.events_tx.clone()),
        };

        match self.engine.create_session(request) {
            Ok(session) => {
                if session.id() != session_id {
                    warn!("Engine returned {} for requested {}", session.id(), session_id);
                }
                debug!("Created {} (offset {:?})", session.id(), start_offset_ms);

                let before = self.surfaces.attached();
                self.surfaces.bind(self.engine.as_mut(), &session);
                self.engine.set_volume(&session, self.volume);
                self.engine.set_muted(&session, self.muted);
                self.engine.play(&session);
                self.session = Some(session);

                self.emit_surface_if_changed(before);
                self.set_state(ConnectionState::Loading, format!("Loading: {}...", item.name));
            }
            Err(e) => {
                error!("Failed to create session for {}: {}", item.url, e);
                self.fail(PlaybackError::EngineInit(e));
            }
        }
    }

    fn destroy_session(&mut self) {
        if let Some(session) = self.session.take() {
            let before = self.surfaces.attached();
            self.surfaces.release(self.engine.as_mut(), &session);
            debug!("Destroying {}", session.id());
            self.engine.destroy_session(session);
            self.emit_surface_if_changed(before);
        }
        self.tracks.clear_enumeration();
    }

    fn fail(&mut self, failure: PlaybackError) {
        self.cancel_pending_reconnect();
        self.destroy_session();
        error!("Playback failed: {}", failure);
        self.set_state(ConnectionState::Failed, failure.user_message());
        self.emit(PlaybackProgress::Error { error: failure });
    }

    fn cancel_pending_reconnect(&mut self) {
        if self.reconnect.cancel() {
            self.emit(PlaybackProgress::ReconnectCancelled {
                attempt: self.reconnect_attempt,
            });
        }
    }

    /// Offset for a recreated session of the current item; never for live items
    fn resume_offset(&self) -> Option<u64> {
        match &self.item {
            Some(item) if !item.is_live() && self.checkpoint.position_ms > 0 => {
                Some(self.checkpoint.position_ms)
            }
            _ => None,
        }
    }

    fn item_name(&self) -> String {
        self.item
            .as_ref()
            .map(|i| i.name.clone())
            .unwrap_or_default()
    }

    fn notify_checkpoint(&mut self) {
        if let (Some(sink), Some(item)) = (self.checkpoint_sink.as_mut(), self.item.as_ref()) {
            sink(item, &self.checkpoint);
        }
    }

    fn set_state(&mut self, state: ConnectionState, status: String) {
        if self.state == state && self.status == status {
            return;
        }
        info!("Playback {:?} -> {:?}: {}", self.state, state, status);
        self.state = state;
        self.status = status.clone();
        self.emit(PlaybackProgress::StateChanged { state, status });
    }

    fn emit_tracks(&self) {
        self.emit(PlaybackProgress::TracksChanged {
            tracks: self.tracks.clone(),
        });
    }

    fn emit_surface_if_changed(&self, before: Option<Surface>) {
        let attached = self.surfaces.attached();
        if attached != before {
            self.emit(PlaybackProgress::SurfaceChanged { attached });
        }
    }

    fn emit(&self, progress: PlaybackProgress) {
        let _ = self.progress_tx.send(progress);
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
