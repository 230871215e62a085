#![allow(dead_code)]

use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout, Instant};
use tuner::config::Config;
use tuner::playback::{
    ConnectionState, PlaybackHandle, PlaybackHooks, PlaybackProgress, PlaybackService,
};
use tuner::test_support::{EngineCall, MockEngine};

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Config with defaults only, independent of the host environment
pub fn default_config() -> Config {
    Config::from_lookup(|_| None)
}

/// Playback service running on the test runtime against a mock engine
pub struct PlaybackFixture {
    pub handle: PlaybackHandle,
    pub engine: MockEngine,
    pub progress_rx: UnboundedReceiver<PlaybackProgress>,
}

impl PlaybackFixture {
    pub fn new() -> Self {
        Self::with(default_config(), PlaybackHooks::default())
    }

    pub fn with(config: Config, hooks: PlaybackHooks) -> Self {
        tracing_init();
        let engine = MockEngine::new();
        let handle = PlaybackService::start(
            Box::new(engine.clone()),
            config,
            hooks,
            tokio::runtime::Handle::current(),
        );
        let progress_rx = handle.subscribe_progress();
        Self {
            handle,
            engine,
            progress_rx,
        }
    }

    /// Wait for a progress message matching `predicate`
    pub async fn wait_for<F>(
        &mut self,
        predicate: F,
        timeout_duration: Duration,
    ) -> Option<PlaybackProgress>
    where
        F: Fn(&PlaybackProgress) -> bool,
    {
        let deadline = Instant::now() + timeout_duration;

        while Instant::now() < deadline {
            match timeout(Duration::from_millis(100), self.progress_rx.recv()).await {
                Ok(Some(progress)) if predicate(&progress) => return Some(progress),
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => continue,
            }
        }

        None
    }

    /// Wait for a state change to `state`
    pub async fn wait_for_state(
        &mut self,
        state: ConnectionState,
        timeout_duration: Duration,
    ) -> bool {
        self.wait_for(
            |p| matches!(p, PlaybackProgress::StateChanged { state: s, .. } if *s == state),
            timeout_duration,
        )
        .await
        .is_some()
    }

    /// Start offsets of every session creation so far
    pub fn start_offsets(&self) -> Vec<Option<u64>> {
        self.engine
            .creates()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Create {
                    start_offset_ms, ..
                } => Some(start_offset_ms),
                _ => None,
            })
            .collect()
    }

    pub fn assert_no_violations(&self) {
        let violations = self.engine.violations();
        assert!(violations.is_empty(), "engine misuse: {:?}", violations);
    }
}
