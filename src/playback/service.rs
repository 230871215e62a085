use crate::config::Config;
use crate::models::PlaybackItem;
use crate::playback::continuity::EpisodeResolver;
use crate::playback::controller::{CheckpointSink, PlaybackController, PlaybackSnapshot};
use crate::playback::engine::{MediaEngine, TaggedEvent};
use crate::playback::error::{HandoffError, ServiceError};
use crate::playback::progress::{PlaybackProgress, PlaybackProgressHandle};
use crate::playback::reconnect::ReconnectDue;
use crate::playback::surface::Surface;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tracing::info;

/// Playback commands sent to the service
#[derive(Debug)]
pub enum PlaybackCommand {
    Play(PlaybackItem),
    Pause,
    Resume,
    TogglePlayPause,
    Stop,
    BeginSeek,
    Seek(f32),
    SetVolume(u8),
    SetMuted(bool),
    ToggleMute,
    SelectAudioTrack(i32),
    SelectSubtitleTrack(i32),
    CancelReconnect,
    SetMaxReconnectAttempts(u32),
    SurfaceReady(Surface),
    SurfaceClosing {
        surface: Surface,
        done: oneshot::Sender<()>,
    },
    Handoff {
        from: Surface,
        to: Surface,
        reply: oneshot::Sender<Result<(), HandoffError>>,
    },
    Snapshot(oneshot::Sender<PlaybackSnapshot>),
}

/// Optional hooks supplied by the embedding application
#[derive(Default)]
pub struct PlaybackHooks {
    pub resolver: Option<Box<dyn EpisodeResolver>>,
    pub checkpoint_sink: Option<CheckpointSink>,
}

/// Handle to the playback service for sending commands
#[derive(Clone)]
pub struct PlaybackHandle {
    command_tx: tokio_mpsc::UnboundedSender<PlaybackCommand>,
    progress_handle: PlaybackProgressHandle,
}

impl PlaybackHandle {
    pub fn play(&self, item: PlaybackItem) {
        let _ = self.command_tx.send(PlaybackCommand::Play(item));
    }

    pub fn pause(&self) {
        let _ = self.command_tx.send(PlaybackCommand::Pause);
    }

    pub fn resume(&self) {
        let _ = self.command_tx.send(PlaybackCommand::Resume);
    }

    pub fn toggle_play_pause(&self) {
        let _ = self.command_tx.send(PlaybackCommand::TogglePlayPause);
    }

    pub fn stop(&self) {
        let _ = self.command_tx.send(PlaybackCommand::Stop);
    }

    pub fn begin_seek(&self) {
        let _ = self.command_tx.send(PlaybackCommand::BeginSeek);
    }

    /// `fraction` of the item's length, clamped to [0, 1]. Ignored for live items.
    pub fn seek(&self, fraction: f32) {
        let _ = self.command_tx.send(PlaybackCommand::Seek(fraction));
    }

    pub fn set_volume(&self, level: u8) {
        let _ = self.command_tx.send(PlaybackCommand::SetVolume(level));
    }

    pub fn set_muted(&self, muted: bool) {
        let _ = self.command_tx.send(PlaybackCommand::SetMuted(muted));
    }

    pub fn toggle_mute(&self) {
        let _ = self.command_tx.send(PlaybackCommand::ToggleMute);
    }

    pub fn select_audio_track(&self, id: i32) {
        let _ = self.command_tx.send(PlaybackCommand::SelectAudioTrack(id));
    }

    pub fn select_subtitle_track(&self, id: i32) {
        let _ = self.command_tx.send(PlaybackCommand::SelectSubtitleTrack(id));
    }

    pub fn cancel_reconnect(&self) {
        let _ = self.command_tx.send(PlaybackCommand::CancelReconnect);
    }

    pub fn set_max_reconnect_attempts(&self, max_attempts: u32) {
        let _ = self
            .command_tx
            .send(PlaybackCommand::SetMaxReconnectAttempts(max_attempts));
    }

    /// The native surface behind `surface` has been created
    pub fn surface_ready(&self, surface: Surface) {
        let _ = self.command_tx.send(PlaybackCommand::SurfaceReady(surface));
    }

    /// Resolves once video has been moved off `surface`; destroy it only after that
    pub async fn surface_closing(&self, surface: Surface) -> Result<(), ServiceError> {
        let (done, done_rx) = oneshot::channel();
        self.command_tx
            .send(PlaybackCommand::SurfaceClosing { surface, done })
            .map_err(|_| ServiceError::Closed)?;
        done_rx.await.map_err(|_| ServiceError::Closed)
    }

    pub async fn handoff(&self, from: Surface, to: Surface) -> Result<(), ServiceError> {
        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(PlaybackCommand::Handoff { from, to, reply })
            .map_err(|_| ServiceError::Closed)?;
        reply_rx
            .await
            .map_err(|_| ServiceError::Closed)?
            .map_err(ServiceError::from)
    }

    pub async fn snapshot(&self) -> Result<PlaybackSnapshot, ServiceError> {
        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(PlaybackCommand::Snapshot(reply))
            .map_err(|_| ServiceError::Closed)?;
        reply_rx.await.map_err(|_| ServiceError::Closed)
    }

    pub fn subscribe_progress(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        self.progress_handle.subscribe_all()
    }
}

/// Owner task: the only place the controller is touched. Commands, engine
/// events and reconnect timers are serialized through one select loop.
pub struct PlaybackService {
    controller: PlaybackController,
    command_rx: tokio_mpsc::UnboundedReceiver<PlaybackCommand>,
    event_rx: tokio_mpsc::UnboundedReceiver<TaggedEvent>,
    due_rx: tokio_mpsc::UnboundedReceiver<ReconnectDue>,
}

impl PlaybackService {
    pub fn start(
        engine: Box<dyn MediaEngine>,
        config: Config,
        hooks: PlaybackHooks,
        runtime_handle: tokio::runtime::Handle,
    ) -> PlaybackHandle {
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = tokio_mpsc::unbounded_channel();
        let (event_tx, event_rx) = tokio_mpsc::unbounded_channel();
        let (due_tx, due_rx) = tokio_mpsc::unbounded_channel();

        let progress_handle = PlaybackProgressHandle::new(progress_rx, runtime_handle.clone());

        let handle = PlaybackHandle {
            command_tx,
            progress_handle,
        };

        let mut controller = PlaybackController::new(engine, &config, event_tx, due_tx, progress_tx);
        if let Some(resolver) = hooks.resolver {
            controller.set_resolver(resolver);
        }
        if let Some(sink) = hooks.checkpoint_sink {
            controller.set_checkpoint_sink(sink);
        }

        let service = PlaybackService {
            controller,
            command_rx,
            event_rx,
            due_rx,
        };
        runtime_handle.spawn(service.run());

        handle
    }

    async fn run(mut self) {
        info!("PlaybackService started");

        loop {
            tokio::select! {
                // Queued notifications are drained before the next command,
                // so every command sees the latest engine state
                biased;
                Some(event) = self.event_rx.recv() => {
                    self.controller.handle_engine_event(event);
                }
                Some(due) = self.due_rx.recv() => {
                    self.controller.handle_reconnect_due(due);
                }
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        self.controller.shutdown();
        info!("PlaybackService stopped");
    }

    fn handle_command(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Play(item) => self.controller.play(item),
            PlaybackCommand::Pause => self.controller.pause(),
            PlaybackCommand::Resume => self.controller.resume(),
            PlaybackCommand::TogglePlayPause => self.controller.toggle_play_pause(),
            PlaybackCommand::Stop => self.controller.stop(),
            PlaybackCommand::BeginSeek => self.controller.begin_seek(),
            PlaybackCommand::Seek(fraction) => self.controller.seek(fraction),
            PlaybackCommand::SetVolume(level) => self.controller.set_volume(level),
            PlaybackCommand::SetMuted(muted) => self.controller.set_muted(muted),
            PlaybackCommand::ToggleMute => self.controller.toggle_mute(),
            PlaybackCommand::SelectAudioTrack(id) => self.controller.select_audio_track(id),
            PlaybackCommand::SelectSubtitleTrack(id) => self.controller.select_subtitle_track(id),
            PlaybackCommand::CancelReconnect => self.controller.cancel_reconnect(),
            PlaybackCommand::SetMaxReconnectAttempts(max) => {
                self.controller.set_max_reconnect_attempts(max)
            }
            PlaybackCommand::SurfaceReady(surface) => self.controller.surface_realized(surface),
            PlaybackCommand::SurfaceClosing { surface, done } => {
                self.controller.surface_closing(surface);
                let _ = done.send(());
            }
            PlaybackCommand::Handoff { from, to, reply } => {
                let _ = reply.send(self.controller.handoff(from, to));
            }
            PlaybackCommand::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
        }
    }
}
