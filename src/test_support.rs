// Test support utilities for both unit and integration tests

use crate::models::TrackInfo;
use crate::playback::engine::{
    EngineEvent, EventSink, MediaEngine, SessionHandle, SessionId, SessionRequest, VideoOutput,
};
use crate::playback::error::EngineInitError;
use crate::playback::surface::Surface;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Every call the controller made, in order
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Create {
        session: SessionId,
        url: String,
        start_offset_ms: Option<u64>,
        network_caching_ms: u32,
    },
    Destroy(SessionId),
    Play(SessionId),
    Pause(SessionId),
    Stop(SessionId),
    Seek(SessionId, f32),
    SetVolume(SessionId, u8),
    SetMuted(SessionId, bool),
    SetAudioTrack(SessionId, i32),
    SetSubtitleTrack(SessionId, i32),
    Attach(SessionId, Surface),
    Detach(SessionId, Surface),
}

#[derive(Default)]
struct MockEngineState {
    calls: Vec<EngineCall>,
    /// Not reset by `clear_calls`
    creates: Vec<EngineCall>,
    sinks: HashMap<SessionId, EventSink>,
    live_sessions: Vec<SessionId>,
    attachments: Vec<(SessionId, Surface)>,
    violations: Vec<String>,
    create_failures: Vec<String>,
    audio_tracks: Vec<TrackInfo>,
    subtitle_tracks: Vec<TrackInfo>,
    initial_audio_track: i32,
    current_audio: HashMap<SessionId, i32>,
    current_subtitle: HashMap<SessionId, i32>,
}

/// Mock media engine for testing
///
/// Records calls instead of decoding anything. Clones share state, so a test
/// keeps one clone for inspection and for emitting events while the other is
/// owned by the controller. Handle misuse (two live sessions, double attach,
/// detaching what is not attached, calls on destroyed sessions) is recorded
/// as a violation rather than panicking inside the owner task.
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockEngineState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockEngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `count` session creations fail
    pub fn fail_next_creates(&self, count: usize, message: &str) {
        let mut state = self.lock();
        for _ in 0..count {
            state.create_failures.push(message.to_string());
        }
    }

    /// Tracks every new session enumerates, and the audio track the engine
    /// itself picks (`-1` for disabled)
    pub fn set_tracks(&self, audio: Vec<TrackInfo>, subtitles: Vec<TrackInfo>, initial_audio: i32) {
        let mut state = self.lock();
        state.audio_tracks = audio;
        state.subtitle_tracks = subtitles;
        state.initial_audio_track = initial_audio;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Every `Create` call since the engine was built, including those
    /// recorded before the last `clear_calls`
    pub fn creates(&self) -> Vec<EngineCall> {
        self.lock().creates.clone()
    }

    pub fn create_count(&self) -> usize {
        self.lock().creates.len()
    }

    pub fn live_sessions(&self) -> Vec<SessionId> {
        self.lock().live_sessions.clone()
    }

    pub fn latest_session(&self) -> Option<SessionId> {
        self.lock().live_sessions.last().copied()
    }

    /// Surfaces attached to any session right now
    pub fn attached_surfaces(&self) -> Vec<Surface> {
        self.lock().attachments.iter().map(|(_, s)| *s).collect()
    }

    pub fn audio_track_of(&self, session: SessionId) -> Option<i32> {
        self.lock().current_audio.get(&session).copied()
    }

    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    /// Emit through the sink of `session`, even if that session was destroyed
    pub fn emit_to(&self, session: SessionId, event: EngineEvent) {
        let sink = self.lock().sinks.get(&session).cloned();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }

    /// Emit from the newest live session
    pub fn emit(&self, event: EngineEvent) {
        if let Some(session) = self.latest_session() {
            self.emit_to(session, event);
        }
    }

    fn check_live(state: &mut MockEngineState, session: &SessionHandle, call: &str) {
        if !state.live_sessions.contains(&session.id()) {
            state
                .violations
                .push(format!("{} on destroyed {}", call, session.id()));
        }
    }

    fn record(&self, session: &SessionHandle, call: EngineCall, name: &str) {
        let mut state = self.lock();
        Self::check_live(&mut state, session, name);
        state.calls.push(call);
    }
}

impl VideoOutput for MockEngine {
    fn attach_surface(&mut self, session: &SessionHandle, surface: Surface) {
        let mut state = self.lock();
        Self::check_live(&mut state, session, "attach");
        if state.attachments.iter().any(|(_, s)| *s == surface) {
            state
                .violations
                .push(format!("{:?} attached twice", surface));
        }
        if state.attachments.iter().any(|(id, _)| *id == session.id()) {
            state
                .violations
                .push(format!("{} attached to two surfaces", session.id()));
        }
        state.attachments.push((session.id(), surface));
        state.calls.push(EngineCall::Attach(session.id(), surface));
    }

    fn detach_surface(&mut self, session: &SessionHandle, surface: Surface) {
        let mut state = self.lock();
        let before = state.attachments.len();
        state
            .attachments
            .retain(|(id, s)| !(*id == session.id() && *s == surface));
        if state.attachments.len() == before {
            state
                .violations
                .push(format!("{:?} detached while not attached", surface));
        }
        state.calls.push(EngineCall::Detach(session.id(), surface));
    }
}

impl MediaEngine for MockEngine {
    fn create_session(
        &mut self,
        request: SessionRequest,
    ) -> Result<SessionHandle, EngineInitError> {
        let mut state = self.lock();
        let call = EngineCall::Create {
            session: request.session_id,
            url: request.url.clone(),
            start_offset_ms: request.start_offset_ms,
            network_caching_ms: request.network_caching_ms,
        };
        state.creates.push(call.clone());
        state.calls.push(call);

        if !state.create_failures.is_empty() {
            let message = state.create_failures.remove(0);
            return Err(EngineInitError(message));
        }

        if !state.live_sessions.is_empty() {
            let message = format!(
                "{} created while {:?} still live",
                request.session_id, state.live_sessions
            );
            state.violations.push(message);
        }

        let id = request.session_id;
        state.live_sessions.push(id);
        let initial_audio = state.initial_audio_track;
        state.current_audio.insert(id, initial_audio);
        state.current_subtitle.insert(id, -1);
        state.sinks.insert(id, request.events);
        Ok(SessionHandle::new(id))
    }

    fn destroy_session(&mut self, session: SessionHandle) {
        let mut state = self.lock();
        let id = session.id();
        if !state.live_sessions.contains(&id) {
            state.violations.push(format!("{} destroyed twice", id));
        }
        if state.attachments.iter().any(|(s, _)| *s == id) {
            state
                .violations
                .push(format!("{} destroyed while attached", id));
        }
        state.live_sessions.retain(|s| *s != id);
        state.calls.push(EngineCall::Destroy(id));
    }

    fn play(&mut self, session: &SessionHandle) {
        self.record(session, EngineCall::Play(session.id()), "play");
    }

    fn pause(&mut self, session: &SessionHandle) {
        self.record(session, EngineCall::Pause(session.id()), "pause");
    }

    fn stop(&mut self, session: &SessionHandle) {
        self.record(session, EngineCall::Stop(session.id()), "stop");
    }

    fn seek(&mut self, session: &SessionHandle, fraction: f32) {
        self.record(session, EngineCall::Seek(session.id(), fraction), "seek");
    }

    fn set_volume(&mut self, session: &SessionHandle, volume: u8) {
        self.record(session, EngineCall::SetVolume(session.id(), volume), "set_volume");
    }

    fn set_muted(&mut self, session: &SessionHandle, muted: bool) {
        self.record(session, EngineCall::SetMuted(session.id(), muted), "set_muted");
    }

    fn set_audio_track(&mut self, session: &SessionHandle, id: i32) {
        self.record(session, EngineCall::SetAudioTrack(session.id(), id), "set_audio_track");
        self.lock().current_audio.insert(session.id(), id);
    }

    fn set_subtitle_track(&mut self, session: &SessionHandle, id: i32) {
        self.record(
            session,
            EngineCall::SetSubtitleTrack(session.id(), id),
            "set_subtitle_track",
        );
        self.lock().current_subtitle.insert(session.id(), id);
    }

    fn audio_tracks(&self, _session: &SessionHandle) -> Vec<TrackInfo> {
        self.lock().audio_tracks.clone()
    }

    fn subtitle_tracks(&self, _session: &SessionHandle) -> Vec<TrackInfo> {
        self.lock().subtitle_tracks.clone()
    }

    fn current_audio_track(&self, session: &SessionHandle) -> i32 {
        self.lock()
            .current_audio
            .get(&session.id())
            .copied()
            .unwrap_or(-1)
    }

    fn current_subtitle_track(&self, session: &SessionHandle) -> i32 {
        self.lock()
            .current_subtitle
            .get(&session.id())
            .copied()
            .unwrap_or(-1)
    }
}
