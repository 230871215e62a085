#![cfg(feature = "test-utils")]

mod support;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::support::{default_config, PlaybackFixture};
use tuner::config::Config;
use tuner::history::WatchHistory;
use tuner::models::PlaybackItem;
use tuner::playback::{
    ConnectionState, EngineEvent, EpisodeEntry, EpisodeIndex, PlaybackError, PlaybackHooks,
    PlaybackProgress, Surface,
};
use tuner::test_support::EngineCall;

const WAIT: Duration = Duration::from_secs(120);

fn news() -> PlaybackItem {
    PlaybackItem::live("News 24", "http://example.test/live/news.m3u8").with_id("ch-24")
}

fn movie() -> PlaybackItem {
    PlaybackItem::on_demand("The Movie", "http://example.test/vod/movie.mkv").with_id("vod-7")
}

fn stream_error() -> EngineEvent {
    EngineEvent::EncounteredError {
        message: "connection reset by peer".to_string(),
    }
}

async fn start_playing(fixture: &mut PlaybackFixture, item: PlaybackItem) {
    fixture.handle.surface_ready(Surface::Primary);
    fixture.handle.play(item);
    assert!(
        fixture.wait_for_state(ConnectionState::Loading, WAIT).await,
        "Should be loading after play"
    );
    fixture.engine.emit(EngineEvent::Playing);
    assert!(
        fixture.wait_for_state(ConnectionState::Playing, WAIT).await,
        "Should be playing once the engine reports it"
    );
}

#[tokio::test(start_paused = true)]
async fn test_live_channel_survives_twelve_errors() {
    let mut fixture = PlaybackFixture::new();
    start_playing(&mut fixture, news()).await;

    for round in 0..12 {
        fixture.engine.emit(stream_error());
        assert!(
            fixture
                .wait_for_state(ConnectionState::Reconnecting, WAIT)
                .await,
            "round {}: should start reconnecting",
            round
        );
        let scheduled_at = Instant::now();

        assert!(
            fixture.wait_for_state(ConnectionState::Loading, WAIT).await,
            "round {}: timer should recreate the session",
            round
        );
        assert!(scheduled_at.elapsed() >= Duration::from_millis(1000));

        fixture.engine.emit(EngineEvent::Playing);
        assert!(fixture.wait_for_state(ConnectionState::Playing, WAIT).await);
    }

    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Playing);
    assert_eq!(snapshot.reconnect_attempt, 0);
    assert_eq!(fixture.engine.create_count(), 13);
    assert_eq!(fixture.engine.live_sessions().len(), 1);
    fixture.assert_no_violations();
}

#[tokio::test(start_paused = true)]
async fn test_on_demand_resumes_where_it_dropped() {
    let history = Arc::new(Mutex::new(WatchHistory::default()));
    let hooks = PlaybackHooks {
        checkpoint_sink: Some(Box::new(WatchHistory::checkpoint_recorder(history.clone()))),
        ..Default::default()
    };
    let mut fixture = PlaybackFixture::with(default_config(), hooks);
    start_playing(&mut fixture, movie()).await;

    fixture.engine.emit(EngineEvent::LengthChanged {
        length_ms: 5_400_000,
    });
    fixture.engine.emit(EngineEvent::PositionChanged {
        fraction: 42_000.0 / 5_400_000.0,
        time_ms: 42_000,
    });
    fixture.engine.emit(stream_error());

    assert!(fixture.wait_for_state(ConnectionState::Loading, WAIT).await);
    assert_eq!(fixture.start_offsets(), vec![None, Some(42_000)]);

    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.checkpoint.position_ms, 42_000);
    assert_eq!(snapshot.checkpoint.duration_ms, 5_400_000);

    let history = history.lock().unwrap();
    let entry = history.get(&movie().url).expect("movie recorded in history");
    assert_eq!(entry.position_ms, 42_000);
    assert_eq!(entry.resume_item().start_offset_ms(), Some(42_000));
}

#[tokio::test(start_paused = true)]
async fn test_play_while_reconnecting_cancels_once() {
    let mut fixture = PlaybackFixture::new();
    start_playing(&mut fixture, news()).await;

    fixture.engine.emit(stream_error());
    assert!(fixture
        .wait_for(
            |p| matches!(p, PlaybackProgress::ReconnectScheduled { attempt: 1, .. }),
            WAIT
        )
        .await
        .is_some());

    fixture.handle.play(movie());

    let mut cancellations = 0;
    while let Some(progress) = fixture
        .wait_for(|_| true, Duration::from_secs(60))
        .await
    {
        if matches!(progress, PlaybackProgress::ReconnectCancelled { .. }) {
            cancellations += 1;
        }
    }
    assert_eq!(cancellations, 1);

    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Loading);
    assert_eq!(snapshot.item, Some(movie()));
    assert_eq!(fixture.engine.create_count(), 2);
    assert_eq!(fixture.engine.live_sessions().len(), 1);
    fixture.assert_no_violations();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_reconnects_fail_for_good() {
    let env: HashMap<&str, &str> = [("TUNER_MAX_RECONNECT_ATTEMPTS", "3")].into();
    let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string()));
    let mut fixture = PlaybackFixture::with(config, PlaybackHooks::default());
    start_playing(&mut fixture, news()).await;

    fixture.engine.emit(stream_error());
    for _ in 0..2 {
        assert!(fixture.wait_for_state(ConnectionState::Loading, WAIT).await);
        fixture.engine.emit(stream_error());
    }

    let error = fixture
        .wait_for(|p| matches!(p, PlaybackProgress::Error { .. }), WAIT)
        .await;
    assert_eq!(
        error,
        Some(PlaybackProgress::Error {
            error: PlaybackError::ReconnectExhausted { attempts: 2 }
        })
    );

    tokio::time::sleep(Duration::from_secs(300)).await;
    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Failed);
    assert_eq!(snapshot.status, "Could not reconnect after 2 attempts");
    assert_eq!(fixture.engine.create_count(), 3);
    assert!(fixture.engine.live_sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_engine_init_failure_is_reported_without_retry() {
    let mut fixture = PlaybackFixture::new();
    fixture.engine.fail_next_creates(1, "unsupported codec");
    fixture.handle.play(news());

    assert!(fixture.wait_for_state(ConnectionState::Failed, WAIT).await);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fixture.engine.create_count(), 1);

    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, "Could not start playback: unsupported codec");

    // A fresh play is allowed after a terminal failure
    fixture.handle.play(news());
    assert!(fixture.wait_for_state(ConnectionState::Loading, WAIT).await);
}

#[tokio::test(start_paused = true)]
async fn test_finished_episode_plays_the_next_one() {
    let episode = |n: u32| EpisodeEntry {
        season: 1,
        episode: n,
        item: PlaybackItem::on_demand(
            format!("Episode {}", n),
            format!("http://example.test/show/s1e{}.mkv", n),
        ),
    };
    let hooks = PlaybackHooks {
        resolver: Some(Box::new(EpisodeIndex::new(vec![episode(2), episode(1)]))),
        ..Default::default()
    };
    let mut fixture = PlaybackFixture::with(default_config(), hooks);
    start_playing(&mut fixture, episode(1).item).await;

    fixture.engine.emit(EngineEvent::PositionChanged {
        fraction: 0.99,
        time_ms: 1_250_000,
    });
    fixture.engine.emit(EngineEvent::EndReached);

    let started = fixture
        .wait_for(|p| matches!(p, PlaybackProgress::ItemStarted { .. }), WAIT)
        .await;
    assert_eq!(
        started,
        Some(PlaybackProgress::ItemStarted {
            item: episode(2).item
        })
    );
    assert_eq!(fixture.start_offsets(), vec![None, None]);

    // The last episode has no successor
    fixture.engine.emit(EngineEvent::Playing);
    fixture.engine.emit(EngineEvent::EndReached);
    assert!(fixture.wait_for_state(ConnectionState::Stopped, WAIT).await);
    let snapshot = fixture.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.item, Some(episode(2).item));
    assert_eq!(fixture.engine.create_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_controls() {
    let mut fixture = PlaybackFixture::new();
    start_playing(&mut fixture, movie()).await;
    let session = fixture.engine.latest_session().unwrap();

    fixture.handle.toggle_play_pause();
    let _ = fixture.handle.snapshot().await.unwrap();
    assert!(fixture.engine.calls().contains(&EngineCall::Pause(session)));

    fixture.engine.emit(EngineEvent::Paused);
    assert!(fixture.wait_for_state(ConnectionState::Paused, WAIT).await);

    fixture.engine.clear_calls();
    fixture.handle.toggle_play_pause();
    fixture.handle.set_volume(150);
    fixture.handle.toggle_mute();
    let snapshot = fixture.handle.snapshot().await.unwrap();

    assert_eq!(snapshot.volume, 100);
    assert!(snapshot.muted);
    assert_eq!(
        fixture.engine.calls(),
        vec![
            EngineCall::Play(session),
            EngineCall::SetVolume(session, 100),
            EngineCall::SetMuted(session, true),
        ]
    );

    fixture.handle.stop();
    assert!(fixture.wait_for_state(ConnectionState::Stopped, WAIT).await);
    fixture.engine.emit(stream_error());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fixture.engine.create_count(), 1);
}
