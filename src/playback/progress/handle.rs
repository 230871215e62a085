use super::PlaybackProgress;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::info;

type SubscriptionId = u64;

#[derive(Default)]
struct Dispatch {
    subscriptions: HashMap<SubscriptionId, tokio_mpsc::UnboundedSender<PlaybackProgress>>,
    next_id: SubscriptionId,
    /// Latest `StateChanged`, replayed to late subscribers
    last_state: Option<PlaybackProgress>,
}

/// Handle for subscribing to playback progress updates
#[derive(Clone)]
pub struct PlaybackProgressHandle {
    dispatch: Arc<Mutex<Dispatch>>,
}

impl PlaybackProgressHandle {
    /// Create a new progress handle and spawn the task that fans updates out
    pub fn new(
        mut progress_rx: tokio_mpsc::UnboundedReceiver<PlaybackProgress>,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        let dispatch = Arc::new(Mutex::new(Dispatch::default()));
        let dispatch_clone = dispatch.clone();

        runtime_handle.spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                let mut dispatch = lock(&dispatch_clone);
                if matches!(progress, PlaybackProgress::StateChanged { .. }) {
                    dispatch.last_state = Some(progress.clone());
                }
                // A failed send means the receiver was dropped
                dispatch
                    .subscriptions
                    .retain(|_, tx| tx.send(progress.clone()).is_ok());
            }
            info!("Playback progress channel closed, exiting");
        });

        Self { dispatch }
    }

    /// Subscribe to all playback progress updates, starting with the current
    /// state if one was published already. The subscription is removed once
    /// the receiver is dropped.
    pub fn subscribe_all(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let mut dispatch = lock(&self.dispatch);

        if let Some(state) = &dispatch.last_state {
            let _ = tx.send(state.clone());
        }
        dispatch.next_id += 1;
        let id = dispatch.next_id;
        dispatch.subscriptions.insert(id, tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.dispatch).subscriptions.len()
    }
}

fn lock(dispatch: &Mutex<Dispatch>) -> MutexGuard<'_, Dispatch> {
    dispatch.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::controller::ConnectionState;

    fn state(state: ConnectionState, status: &str) -> PlaybackProgress {
        PlaybackProgress::StateChanged {
            state,
            status: status.to_string(),
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_current_state() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let handle = PlaybackProgressHandle::new(rx, tokio::runtime::Handle::current());
        let mut early = handle.subscribe_all();

        tx.send(state(ConnectionState::Loading, "Loading: News...")).unwrap();
        tx.send(state(ConnectionState::Playing, "Playing: News")).unwrap();
        assert_eq!(
            early.recv().await,
            Some(state(ConnectionState::Loading, "Loading: News..."))
        );
        assert_eq!(
            early.recv().await,
            Some(state(ConnectionState::Playing, "Playing: News"))
        );

        let mut late = handle.subscribe_all();
        assert_eq!(
            late.recv().await,
            Some(state(ConnectionState::Playing, "Playing: News"))
        );
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let handle = PlaybackProgressHandle::new(rx, tokio::runtime::Handle::current());
        let mut kept = handle.subscribe_all();
        drop(handle.subscribe_all());
        assert_eq!(handle.subscriber_count(), 2);

        tx.send(PlaybackProgress::ReconnectCancelled { attempt: 1 })
            .unwrap();
        assert!(kept.recv().await.is_some());
        assert_eq!(handle.subscriber_count(), 1);
    }
}
