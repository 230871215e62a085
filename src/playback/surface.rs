// # Surface Handoff
//
// Exactly one of {primary, floating, none} receives the session's video at any
// time. A transfer is a detach immediately followed by an attach, with no
// await in between: the engine drops its render target if the pair is split.

use crate::playback::engine::{SessionHandle, VideoOutput};
use crate::playback::error::HandoffError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Surface {
    Primary,
    Floating,
}

impl Surface {
    pub fn other(self) -> Surface {
        match self {
            Surface::Primary => Surface::Floating,
            Surface::Floating => Surface::Primary,
        }
    }
}

/// How the controller moves playback between surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    /// Move the live video output, the session keeps running
    #[default]
    Transfer,
    /// Tear the session down and recreate it on the destination at the last checkpoint
    Recreate,
}

/// Tracks which surface is realized, which one new sessions bind to, and which
/// one is attached right now. Only ever borrows the session.
#[derive(Debug, Clone)]
pub struct SurfaceCoordinator {
    primary_ready: bool,
    floating_ready: bool,
    target: Surface,
    attached: Option<Surface>,
}

impl Default for SurfaceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceCoordinator {
    pub fn new() -> Self {
        Self {
            primary_ready: false,
            floating_ready: false,
            target: Surface::Primary,
            attached: None,
        }
    }

    pub fn attached(&self) -> Option<Surface> {
        self.attached
    }

    /// Surface that the next session binds to
    pub fn target(&self) -> Surface {
        self.target
    }

    pub fn is_ready(&self, surface: Surface) -> bool {
        match surface {
            Surface::Primary => self.primary_ready,
            Surface::Floating => self.floating_ready,
        }
    }

    fn set_ready(&mut self, surface: Surface, ready: bool) {
        match surface {
            Surface::Primary => self.primary_ready = ready,
            Surface::Floating => self.floating_ready = ready,
        }
    }

    /// The native handle behind `surface` now exists. If the session has no
    /// output yet and this is its target, attach now.
    pub fn surface_realized<O: VideoOutput + ?Sized>(
        &mut self,
        surface: Surface,
        output: &mut O,
        session: Option<&SessionHandle>,
    ) {
        debug!("Surface {:?} realized", surface);
        self.set_ready(surface, true);
        if let Some(session) = session {
            if self.attached.is_none() && self.target == surface {
                output.attach_surface(session, surface);
                self.attached = Some(surface);
                info!("Attached {} to {:?}", session.id(), surface);
            }
        }
    }

    /// Bind a freshly created session to the target surface, if it is realized.
    /// Without a realized surface the session decodes with no video output.
    pub fn bind<O: VideoOutput + ?Sized>(&mut self, output: &mut O, session: &SessionHandle) {
        if self.is_ready(self.target) {
            output.attach_surface(session, self.target);
            self.attached = Some(self.target);
            debug!("Bound {} to {:?}", session.id(), self.target);
        } else {
            self.attached = None;
            debug!(
                "{:?} not realized, {} runs without video output",
                self.target,
                session.id()
            );
        }
    }

    /// Detach whatever is attached. Called before the session is destroyed.
    pub fn release<O: VideoOutput + ?Sized>(&mut self, output: &mut O, session: &SessionHandle) {
        if let Some(surface) = self.attached.take() {
            output.detach_surface(session, surface);
            debug!("Released {:?} from {}", surface, session.id());
        }
    }

    /// Move the video output from `from` to `to` in one step.
    ///
    /// With no session there is nothing to move and only the target changes.
    pub fn handoff<O: VideoOutput + ?Sized>(
        &mut self,
        output: &mut O,
        session: Option<&SessionHandle>,
        from: Surface,
        to: Surface,
    ) -> Result<(), HandoffError> {
        if from == to {
            return Err(HandoffError::SameSurface);
        }
        if !self.is_ready(to) {
            return Err(HandoffError::SurfaceNotReady(to));
        }

        let Some(session) = session else {
            self.target = to;
            return Ok(());
        };

        if self.attached != Some(from) {
            return Err(HandoffError::NotAttached(from));
        }

        output.detach_surface(session, from);
        output.attach_surface(session, to);
        self.attached = Some(to);
        self.target = to;

        info!("Handed {} off from {:?} to {:?}", session.id(), from, to);
        Ok(())
    }

    /// Point future sessions at `to` without touching any attachment. Used by
    /// the recreate mode after the old session has been released.
    pub fn retarget(&mut self, to: Surface) -> Result<(), HandoffError> {
        if !self.is_ready(to) {
            return Err(HandoffError::SurfaceNotReady(to));
        }
        self.target = to;
        Ok(())
    }

    /// `surface` is about to be destroyed by an external action. Video is
    /// moved away before returning, so the caller may destroy it afterwards.
    pub fn surface_closing<O: VideoOutput + ?Sized>(
        &mut self,
        surface: Surface,
        output: &mut O,
        session: Option<&SessionHandle>,
    ) {
        let fallback = surface.other();

        if self.attached == Some(surface) {
            if let Some(session) = session {
                if surface == Surface::Floating && self.is_ready(fallback) {
                    output.detach_surface(session, surface);
                    output.attach_surface(session, fallback);
                    self.attached = Some(fallback);
                    info!(
                        "{:?} closing, moved {} to {:?}",
                        surface,
                        session.id(),
                        fallback
                    );
                } else {
                    output.detach_surface(session, surface);
                    self.attached = None;
                    warn!("{:?} closing, {} left without video output", surface, session.id());
                }
            }
        }

        self.set_ready(surface, false);
        if self.target == surface {
            self.target = Surface::Primary;
        }
    }
}
