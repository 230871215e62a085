use crate::models::TrackInfo;
use serde::{Deserialize, Serialize};

/// Audio and subtitle tracks of the current session, plus an audio selection
/// requested before the engine enumerated anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    pub audio: Vec<TrackInfo>,
    pub subtitles: Vec<TrackInfo>,
    pub selected_audio: Option<i32>,
    pub selected_subtitle: Option<i32>,
    pub pending_audio: Option<i32>,
    /// The user turned audio off; the engine's own choice must not override it
    #[serde(default)]
    pub audio_disabled_by_user: bool,
}

/// Track id engines use for "no track"
pub const DISABLED_TRACK: i32 = -1;

/// What the controller must tell the engine after a re-enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFix {
    /// A user selection has to be (re)applied to the session
    ApplyPending(i32),
    /// The engine picked "disabled" although real tracks exist
    AutoSelect(i32),
}

impl TrackState {
    /// Forget the enumeration of a destroyed session. The pending selection
    /// survives, it is meant for the next session.
    pub fn clear_enumeration(&mut self) {
        self.audio.clear();
        self.subtitles.clear();
        self.selected_audio = None;
        self.selected_subtitle = None;
    }

    /// Remember that the user disabled audio
    pub fn disable_audio(&mut self) {
        self.audio_disabled_by_user = true;
        self.pending_audio = None;
        self.selected_audio = Some(DISABLED_TRACK);
    }

    /// Carry the current audio choice over to a session about to be recreated
    pub fn carry_selection_forward(&mut self) {
        if self.pending_audio.is_none() {
            self.pending_audio = self.selected_audio.filter(|id| *id > 0);
        }
    }

    /// Store a fresh enumeration and decide whether the audio track needs fixing.
    ///
    /// A pending selection wins when it appears in the list, and is cleared.
    /// Audio the user disabled stays disabled. Otherwise, if the engine reports
    /// a disabled audio track while more than one real track exists, the first
    /// real track is chosen.
    pub fn refresh(
        &mut self,
        audio: Vec<TrackInfo>,
        subtitles: Vec<TrackInfo>,
        current_audio: i32,
        current_subtitle: i32,
    ) -> Option<AudioFix> {
        self.audio = label_tracks(audio, "Track");
        self.subtitles = label_tracks(subtitles, "Subtitle");
        self.selected_subtitle = Some(current_subtitle);
        self.selected_audio = Some(current_audio);

        if let Some(pending) = self.pending_audio {
            if self.audio.iter().any(|t| t.id == pending) {
                self.pending_audio = None;
                self.selected_audio = Some(pending);
                return Some(AudioFix::ApplyPending(pending));
            }
        }

        if self.audio_disabled_by_user {
            if current_audio > 0 {
                self.selected_audio = Some(DISABLED_TRACK);
                return Some(AudioFix::ApplyPending(DISABLED_TRACK));
            }
            return None;
        }

        let real: Vec<&TrackInfo> = self.audio.iter().filter(|t| !t.is_disabled()).collect();
        if current_audio <= 0 && real.len() > 1 {
            let first = real[0].id;
            self.selected_audio = Some(first);
            return Some(AudioFix::AutoSelect(first));
        }

        None
    }

    /// Whether `id` can be applied right now
    pub fn has_audio(&self, id: i32) -> bool {
        self.audio.iter().any(|t| t.id == id)
    }
}

fn label_tracks(tracks: Vec<TrackInfo>, prefix: &str) -> Vec<TrackInfo> {
    tracks
        .into_iter()
        .map(|mut t| {
            if t.label.trim().is_empty() {
                t.label = format!("{} {}", prefix, t.id);
            }
            t
        })
        .collect()
}
