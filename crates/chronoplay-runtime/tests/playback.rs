mod common;

use std::{path::Path, sync::Arc, sync::atomic::Ordering, thread, time::Duration};

use anyhow::{Context, Result};
use chronoplay_core::{SAVESTATE_FORMAT_VERSION, SaveType, SavestateRecord, SavestateStore};
use chronoplay_runtime::{
    MemorySavestateStore, PlaybackConfig, PlaybackError, PlaybackSettings, ReversiblePlayback,
    Settings,
};
use common::{CounterEngine, STATE_SIZE, counter_of, wait_for};

type Playback = ReversiblePlayback<CounterEngine, MemorySavestateStore>;

fn paused_config() -> PlaybackConfig {
    PlaybackConfig {
        initial_speed: 0.0,
        ..PlaybackConfig::default()
    }
}

/// A playback with a rewind buffer but no scheduler, stepped by hand.
fn manual(engine: CounterEngine) -> (Playback, Arc<MemorySavestateStore>) {
    let store = Arc::new(MemorySavestateStore::new());
    let playback = ReversiblePlayback::new(
        engine,
        Arc::clone(&store),
        Settings::default(),
        paused_config(),
    );
    playback.apply_settings();
    (playback, store)
}

fn steps(playback: &Playback, n: usize) {
    for _ in 0..n {
        playback.step_frame();
    }
}

#[test]
fn savestate_roundtrip_restores_state_and_timestamp() -> Result<()> {
    let (playback, store) = manual(CounterEngine::new(60.0));
    steps(&playback, 100);

    let id = playback.create_savestate().context("savestate created")?;
    let record = store.get_record(&id)?;
    assert_eq!(record.timestamp_frames, 100);
    assert_eq!(record.save_type, SaveType::Manual);
    assert_eq!(record.game_file_name, "counter.bin");
    assert_eq!(record.engine_id, "counter");
    assert_eq!(record.memory.len(), STATE_SIZE);
    assert_eq!(counter_of(&record.memory), 100);

    steps(&playback, 50);
    assert_eq!(playback.with_engine(|e| e.counter), 150);

    assert!(playback.load_savestate(&id));
    assert_eq!(playback.with_engine(|e| e.counter), 100);
    assert_eq!(playback.stats().elapsed_frames, 100);

    // The loaded state is the new present; older history stays reachable.
    playback.step_back_frame();
    assert_eq!(playback.stats().elapsed_frames, 99);
    Ok(())
}

#[test]
fn incompatible_savestate_leaves_everything_unchanged() -> Result<()> {
    let (playback, store) = manual(CounterEngine::new(60.0));
    steps(&playback, 30);

    let bad = SavestateRecord {
        timestamp_frames: 7,
        memory: vec![0; STATE_SIZE / 2],
        ..SavestateRecord::default()
    };
    let id = store.add_record(Path::new("/games/counter.bin"), bad)?;

    let before = playback.stats();
    assert!(!playback.load_savestate(&id));
    assert!(matches!(
        playback.try_load_savestate(&id),
        Err(PlaybackError::IncompatibleSavestate {
            expected: STATE_SIZE,
            actual
        }) if actual == STATE_SIZE / 2
    ));
    assert_eq!(playback.with_engine(|e| e.counter), 30);
    assert_eq!(playback.stats(), before);

    assert!(matches!(
        playback.try_load_savestate("mem:999"),
        Err(PlaybackError::Store(_))
    ));
    Ok(())
}

#[test]
fn standalone_sessions_are_not_persistable() {
    let (playback, store) = manual(CounterEngine::new(60.0).standalone());
    steps(&playback, 5);
    assert!(playback.create_savestate().is_none());
    assert!(matches!(
        playback.try_create_savestate("x"),
        Err(PlaybackError::NotPersistable)
    ));
    assert!(store.is_empty());
    // Rewind still works without a game path.
    assert!(playback.can_seek());
}

#[test]
fn zero_state_size_disables_rewind_and_savestates() {
    let (playback, _store) = manual(CounterEngine::new(60.0).with_state_size(0));
    assert!(!playback.can_seek());

    steps(&playback, 10);
    assert_eq!(playback.with_engine(|e| e.counter), 10);
    let stats = playback.stats();
    assert_eq!(stats.elapsed_frames, 10);
    assert_eq!(stats.total_ms, 0.0);

    playback.step_back_frame();
    assert_eq!(playback.with_engine(|e| e.counter), 10);

    assert!(matches!(
        playback.try_create_savestate(""),
        Err(PlaybackError::SerializationUnsupported)
    ));
    assert!(!playback.load_savestate("mem:1"));
}

#[test]
fn backward_steps_walk_the_history() {
    let (playback, _store) = manual(CounterEngine::new(60.0));
    steps(&playback, 10);

    playback.step_back_frame();
    // Frame 9 is restored, then stepped once to regenerate its output.
    assert_eq!(playback.with_engine(|e| e.counter), 10);
    assert_eq!(playback.stats().elapsed_frames, 9);

    playback.step_back_frame();
    playback.step_back_frame();
    let stats = playback.stats();
    assert_eq!(stats.elapsed_frames, 7);
    assert!((stats.cached_ms - 3.0 / 60.0 * 1000.0).abs() < 1e-9);

    // Recording again discards the redo frames.
    playback.step_frame();
    assert_eq!(playback.stats().cached_ms, 0.0);
}

#[test]
fn backward_step_at_start_of_history_is_a_noop() {
    let (playback, _store) = manual(CounterEngine::new(60.0));
    steps(&playback, 1);
    playback.step_back_frame();
    assert_eq!(playback.with_engine(|e| e.counter), 1);
    assert_eq!(playback.stats().elapsed_frames, 1);
}

#[test]
fn seek_moves_within_the_window_and_clamps() {
    let (playback, _store) = manual(CounterEngine::new(60.0));
    steps(&playback, 120);
    assert_eq!(playback.time_ms(), 2000);
    assert_eq!(playback.total_time_ms(), 60_000);

    playback.seek_time_ms(1000);
    assert_eq!(playback.time_ms(), 1000);
    assert_eq!(playback.cache_time_ms(), 1000);
    assert_eq!(playback.with_engine(|e| e.counter), 60);
    assert_eq!(playback.stats().elapsed_frames, 60);

    playback.seek_time_ms(50_000);
    assert_eq!(playback.time_ms(), 2000);
    assert_eq!(playback.cache_time_ms(), 0);
    assert_eq!(playback.with_engine(|e| e.counter), 120);

    playback.seek_time_ms(0);
    assert_eq!(playback.with_engine(|e| e.counter), 1);

    let before = playback.stats();
    playback.seek_time_ms(playback.time_ms());
    assert_eq!(playback.stats(), before);
}

#[test]
fn capture_failures_still_count_elapsed_frames() -> Result<()> {
    let engine = CounterEngine::new(60.0);
    let fail = Arc::clone(&engine.fail_serialize);
    let (playback, store) = manual(engine);
    steps(&playback, 10);
    let played = playback.stats().played_ms;

    fail.store(true, Ordering::Release);
    steps(&playback, 5);
    let stats = playback.stats();
    assert_eq!(stats.elapsed_frames, 15);
    assert_eq!(stats.capture_failures, 5);
    assert_eq!(stats.played_ms, played);

    // The buffer is stale now, so the savestate must come from the engine.
    assert!(playback.create_savestate().is_none());
    fail.store(false, Ordering::Release);
    let id = playback.create_savestate().context("savestate created")?;
    let record = store.get_record(&id)?;
    assert_eq!(counter_of(&record.memory), 15);
    assert_eq!(record.timestamp_frames, 15);
    Ok(())
}

#[test]
fn settings_changes_reconfigure_the_buffer() {
    let settings = Settings::default();
    let mut playback: Playback = ReversiblePlayback::new(
        CounterEngine::new(60.0),
        Arc::new(MemorySavestateStore::new()),
        settings.clone(),
        paused_config(),
    );
    playback.initialize().unwrap();
    assert_eq!(playback.total_time_ms(), 60_000);
    steps(&playback, 30);

    settings.update(|s| s.max_rewind_time_sec = 20);
    assert!(wait_for(Duration::from_secs(2), || playback.total_time_ms() == 20_000));
    assert_eq!(playback.time_ms(), 500);

    // Clamped to the ten second floor.
    settings.update(|s| s.max_rewind_time_sec = 3);
    assert!(wait_for(Duration::from_secs(2), || playback.total_time_ms() == 10_000));

    settings.set(PlaybackSettings {
        rewind_enabled: false,
        max_rewind_time_sec: 20,
    });
    assert!(wait_for(Duration::from_secs(2), || !playback.can_seek()));
    let stats = playback.stats();
    assert_eq!((stats.played_ms, stats.total_ms, stats.cached_ms), (0.0, 0.0, 0.0));
    assert_eq!(stats.elapsed_frames, 30);

    settings.update(|s| s.rewind_enabled = true);
    assert!(wait_for(Duration::from_secs(2), || playback.can_seek()));
    playback.deinitialize();
    assert_eq!(playback.stats().elapsed_frames, 0);
}

#[test]
fn speed_reports_requested_value_and_derates_rewind() {
    let mut playback: Playback = ReversiblePlayback::new(
        CounterEngine::new(100.0),
        Arc::new(MemorySavestateStore::new()),
        Settings::default(),
        PlaybackConfig::default(),
    );
    playback.initialize().unwrap();
    assert_eq!(playback.speed(), 1.0);

    assert!(wait_for(Duration::from_secs(2), || {
        playback.stats().elapsed_frames >= 60
    }));

    playback.set_speed(-1.0);
    assert_eq!(playback.speed(), -1.0);
    let before = playback.scheduler_stats().unwrap().backward_steps;
    thread::sleep(Duration::from_millis(400));
    let backward = playback.scheduler_stats().unwrap().backward_steps - before;
    // 100 fps * 0.25 over 400 ms is 10 steps.
    assert!((5..=16).contains(&backward), "{backward} backward steps");

    playback.pause_async();
    assert_eq!(playback.speed(), 0.0);
    assert!(playback.can_pause());
}

#[test]
fn set_speed_before_initialize_sets_initial_speed() {
    let mut playback: Playback = ReversiblePlayback::new(
        CounterEngine::new(100.0),
        Arc::new(MemorySavestateStore::new()),
        Settings::default(),
        paused_config(),
    );
    assert_eq!(playback.speed(), 0.0);
    playback.set_speed(2.0);
    playback.initialize().unwrap();
    assert_eq!(playback.speed(), 2.0);
}

#[test]
fn autosave_runs_while_playing() -> Result<()> {
    let store = Arc::new(MemorySavestateStore::new());
    let mut playback: Playback = ReversiblePlayback::new(
        CounterEngine::new(100.0),
        Arc::clone(&store),
        Settings::default(),
        PlaybackConfig {
            autosave_interval: Some(Duration::from_millis(40)),
            ..PlaybackConfig::default()
        },
    );
    playback.initialize()?;
    assert!(wait_for(Duration::from_secs(2), || !store.is_empty()));
    playback.deinitialize();

    let ids = store.ids_for(Path::new("/games/counter.bin"));
    let record = store.get_record(&ids[0])?;
    assert_eq!(record.save_type, SaveType::Auto);
    assert!(record.timestamp_frames > 0);
    Ok(())
}

#[test]
fn savestate_reflects_engine_edits_made_between_steps() -> Result<()> {
    let (playback, store) = manual(CounterEngine::new(60.0));
    steps(&playback, 10);

    playback.with_engine_mut(|e| e.counter = 500);
    let id = playback.create_savestate().context("savestate created")?;
    let record = store.get_record(&id)?;
    assert_eq!(counter_of(&record.memory), 500);
    assert_eq!(record.timestamp_frames, 10);

    // The next captured frame makes the buffer authoritative again.
    steps(&playback, 1);
    let id = playback.create_savestate().context("savestate created")?;
    assert_eq!(counter_of(&store.get_record(&id)?.memory), 501);
    Ok(())
}

#[test]
fn seek_restores_the_rewind_speed_of_a_running_scheduler() {
    let mut playback: Playback = ReversiblePlayback::new(
        CounterEngine::new(60.0),
        Arc::new(MemorySavestateStore::new()),
        Settings::default(),
        paused_config(),
    );
    playback.initialize().unwrap();
    steps(&playback, 120);

    // Slow enough that the scheduler never gets to step during the test.
    playback.set_speed(-0.001);
    playback.seek_time_ms(1000);
    assert_eq!(playback.time_ms(), 1000);
    assert!((playback.speed() + 0.001).abs() < 1e-12, "{}", playback.speed());
    playback.deinitialize();
}

#[test]
fn refused_load_leaves_everything_unchanged() -> Result<()> {
    let engine = CounterEngine::new(60.0);
    let refuse = Arc::clone(&engine.fail_deserialize);
    let (playback, store) = manual(engine);
    steps(&playback, 20);
    let id = playback.create_savestate().context("savestate created")?;
    steps(&playback, 10);

    refuse.store(true, Ordering::Release);
    let before = playback.stats();
    assert!(!playback.load_savestate(&id));
    assert!(matches!(
        playback.try_load_savestate(&id),
        Err(PlaybackError::Engine(_))
    ));
    assert_eq!(playback.with_engine(|e| e.counter), 30);
    assert_eq!(playback.stats(), before);

    refuse.store(false, Ordering::Release);
    let id = playback.create_savestate().context("savestate created")?;
    let record = store.get_record(&id)?;
    assert_eq!(counter_of(&record.memory), 30);
    assert_eq!(record.timestamp_frames, 30);

    // History up to the refused load is intact.
    playback.step_back_frame();
    assert_eq!(playback.stats().elapsed_frames, 29);
    Ok(())
}

#[test]
fn elapsed_frames_track_the_history_after_capture_failures() -> Result<()> {
    let engine = CounterEngine::new(60.0);
    let fail = Arc::clone(&engine.fail_serialize);
    let (playback, store) = manual(engine);
    steps(&playback, 10);
    fail.store(true, Ordering::Release);
    steps(&playback, 5);
    assert_eq!(playback.stats().elapsed_frames, 15);
    fail.store(false, Ordering::Release);

    playback.step_back_frame();
    assert_eq!(playback.stats().elapsed_frames, 14);
    let id = playback.create_savestate().context("savestate created")?;
    assert_eq!(store.get_record(&id)?.timestamp_frames, 14);
    Ok(())
}

#[test]
fn savestate_caption_names_the_game_and_play_time() -> Result<()> {
    let (playback, store) = manual(CounterEngine::new(60.0));
    steps(&playback, 60);
    let id = playback.create_savestate().context("savestate created")?;
    assert_eq!(store.get_record(&id)?.caption, "counter 00:00:01");
    Ok(())
}

#[test]
fn newer_savestate_format_is_rejected() -> Result<()> {
    let (playback, store) = manual(CounterEngine::new(60.0));
    steps(&playback, 12);

    let newer = SavestateRecord {
        format_version: SAVESTATE_FORMAT_VERSION + 1,
        timestamp_frames: 3,
        memory: vec![3; STATE_SIZE],
        ..SavestateRecord::default()
    };
    let id = store.add_record(Path::new("/games/counter.bin"), newer)?;

    let before = playback.stats();
    assert!(matches!(
        playback.try_load_savestate(&id),
        Err(PlaybackError::UnsupportedFormat { found, supported })
            if found == SAVESTATE_FORMAT_VERSION + 1 && supported == SAVESTATE_FORMAT_VERSION
    ));
    assert_eq!(playback.with_engine(|e| e.counter), 12);
    assert_eq!(playback.stats(), before);
    Ok(())
}
