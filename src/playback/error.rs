use thiserror::Error;

/// The native backend could not create a session (transport, codec or init failure)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Engine initialization failed: {0}")]
pub struct EngineInitError(pub String);

/// Failures observed by the playback controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error(transparent)]
    EngineInit(#[from] EngineInitError),
    #[error("Stream error: {message}")]
    Stream { message: String },
    #[error("Live stream ended unexpectedly")]
    UnexpectedEnd,
    #[error("Reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl PlaybackError {
    /// Terminal failures are surfaced to the caller; the rest are recovered
    /// locally by reconnecting.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackError::EngineInit(_) | PlaybackError::ReconnectExhausted { .. }
        )
    }

    /// Status line shown to the user
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::EngineInit(e) => format!("Could not start playback: {}", e.0),
            PlaybackError::Stream { message } => format!("Stream error: {}", message),
            PlaybackError::UnexpectedEnd => "Stream ended unexpectedly".to_string(),
            PlaybackError::ReconnectExhausted { attempts } => {
                format!("Could not reconnect after {} attempts", attempts)
            }
        }
    }
}

/// Rejected surface transfers
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffError {
    #[error("Source surface {0:?} is not attached")]
    NotAttached(crate::playback::surface::Surface),
    #[error("Source and destination are the same surface")]
    SameSurface,
    #[error("Destination surface {0:?} is not realized yet")]
    SurfaceNotReady(crate::playback::surface::Surface),
}

/// Errors talking to the playback service task
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Playback service is not running")]
    Closed,
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}
